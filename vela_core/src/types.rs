//! The type system value object and the encoded-signature grammar.
//!
//! A [`Type`] is a plain value: the analyzer computes them, stores them on
//! expression nodes, and compares them structurally. Class types carry the
//! class name (fully qualified once resolved) plus any concrete generic
//! arguments; function types carry their parameter and return types.
//!
//! # Encoded signatures
//!
//! Overload resolution and virtual-method matching compare *encoded* type
//! strings rather than structures, so the encoding is part of the stable
//! surface:
//!
//! ```text
//! l b c i f n v        Bool Byte Char Int Float Nil Var
//! o.Full.Class.Name    class or enum reference
//! (i,c,)~f             function: parameters then '~' then return
//! i* i**               one '*' per array dimension
//! ```
//!
//! Parameter lists are comma-terminated (every parameter is followed by a
//! comma, including the last). [`parse_type`] inverts the encoding;
//! `encode(parse(encode(t))) == encode(t)` holds for every well-formed type.

use std::fmt;

// =============================================================================
// TypeKind
// =============================================================================

/// Discriminant for [`Type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// The absence of a value; also the "object" tag in VM headers.
    Nil,
    /// Boolean.
    Bool,
    /// 8-bit integer.
    Byte,
    /// Character.
    Char,
    /// Integer.
    Int,
    /// Floating point.
    Float,
    /// Class or enum reference.
    Class,
    /// Function reference.
    Func,
    /// Inferred; replaced by the analyzer on first assignment.
    Var,
    /// Named alias; expanded before analysis proper.
    Alias,
}

impl TypeKind {
    /// Whether this kind is one of the scalar primitives.
    #[inline]
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            TypeKind::Bool | TypeKind::Byte | TypeKind::Char | TypeKind::Int | TypeKind::Float
        )
    }
}

// =============================================================================
// Type
// =============================================================================

/// A resolved or partially resolved type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    /// Discriminant.
    pub kind: TypeKind,
    /// Class/enum/alias name, or the encoded name of a function type.
    pub name: String,
    /// Array dimension; 0 for scalars.
    pub dimension: u32,
    /// Concrete generic arguments, e.g. the `Int` of `List<Int>`.
    pub generics: Vec<Type>,
    /// Function parameter types (kind == Func).
    pub func_params: Vec<Type>,
    /// Function return type (kind == Func).
    pub func_return: Option<Box<Type>>,
    /// Set once a class/enum name has been resolved to its qualified form.
    pub resolved: bool,
}

impl Type {
    fn primitive(kind: TypeKind) -> Self {
        Self {
            kind,
            name: String::new(),
            dimension: 0,
            generics: Vec::new(),
            func_params: Vec::new(),
            func_return: None,
            resolved: true,
        }
    }

    /// The `Nil` type.
    pub fn nil() -> Self {
        Self::primitive(TypeKind::Nil)
    }

    /// The `Bool` type.
    pub fn bool() -> Self {
        Self::primitive(TypeKind::Bool)
    }

    /// The `Byte` type.
    pub fn byte() -> Self {
        Self::primitive(TypeKind::Byte)
    }

    /// The `Char` type.
    pub fn char() -> Self {
        Self::primitive(TypeKind::Char)
    }

    /// The `Int` type.
    pub fn int() -> Self {
        Self::primitive(TypeKind::Int)
    }

    /// The `Float` type.
    pub fn float() -> Self {
        Self::primitive(TypeKind::Float)
    }

    /// An inferred (`Var`) type awaiting its first assignment.
    pub fn var() -> Self {
        let mut t = Self::primitive(TypeKind::Var);
        t.resolved = false;
        t
    }

    /// An unresolved class or enum reference.
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Class,
            name: name.into(),
            dimension: 0,
            generics: Vec::new(),
            func_params: Vec::new(),
            func_return: None,
            resolved: false,
        }
    }

    /// An alias reference, expanded during the alias-resolution pass.
    pub fn alias(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Alias,
            name: name.into(),
            dimension: 0,
            generics: Vec::new(),
            func_params: Vec::new(),
            func_return: None,
            resolved: false,
        }
    }

    /// A function type.
    pub fn func(params: Vec<Type>, ret: Type) -> Self {
        let mut t = Self {
            kind: TypeKind::Func,
            name: String::new(),
            dimension: 0,
            generics: Vec::new(),
            func_params: params,
            func_return: Some(Box::new(ret)),
            resolved: true,
        };
        t.name = encode_function_type(&t.func_params, t.func_return.as_deref());
        t
    }

    /// Return a copy with the given array dimension.
    pub fn with_dimension(mut self, dimension: u32) -> Self {
        self.dimension = dimension;
        self
    }

    /// Return a copy carrying concrete generic arguments.
    pub fn with_generics(mut self, generics: Vec<Type>) -> Self {
        self.generics = generics;
        self
    }

    /// Whether this type carries concrete generic arguments.
    #[inline]
    pub fn has_generics(&self) -> bool {
        !self.generics.is_empty()
    }

    /// Whether this is a scalar (dimension 0).
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dimension == 0
    }

    /// Encode without the dimension suffix.
    pub fn encode(&self) -> String {
        encode_type(self)
    }

    /// Encode with one `*` per array dimension.
    pub fn encode_with_dims(&self) -> String {
        let mut s = encode_type(self);
        for _ in 0..self.dimension {
            s.push('*');
        }
        s
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Nil => write!(f, "Nil")?,
            TypeKind::Bool => write!(f, "Bool")?,
            TypeKind::Byte => write!(f, "Byte")?,
            TypeKind::Char => write!(f, "Char")?,
            TypeKind::Int => write!(f, "Int")?,
            TypeKind::Float => write!(f, "Float")?,
            TypeKind::Var => write!(f, "Var")?,
            TypeKind::Class | TypeKind::Alias => write!(f, "{}", self.name.replace('#', "->"))?,
            TypeKind::Func => write!(f, "{}", self.name)?,
        }
        for _ in 0..self.dimension {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a type without its dimension suffix.
pub fn encode_type(t: &Type) -> String {
    match t.kind {
        TypeKind::Bool => "l".to_string(),
        TypeKind::Byte => "b".to_string(),
        TypeKind::Int => "i".to_string(),
        TypeKind::Float => "f".to_string(),
        TypeKind::Char => "c".to_string(),
        TypeKind::Nil => "n".to_string(),
        TypeKind::Var => "v".to_string(),
        TypeKind::Alias => String::new(),
        TypeKind::Class => format!("o.{}", t.name),
        TypeKind::Func => {
            if t.name.is_empty() {
                encode_function_type(&t.func_params, t.func_return.as_deref())
            } else {
                t.name.clone()
            }
        }
    }
}

/// Encode a function type: `(param,param,)~return`, dimensions inline.
pub fn encode_function_type(params: &[Type], ret: Option<&Type>) -> String {
    let mut encoded = String::from("(");
    for param in params {
        encoded.push_str(&param.encode_with_dims());
        encoded.push(',');
    }
    encoded.push_str(")~");
    if let Some(ret) = ret {
        encoded.push_str(&ret.encode_with_dims());
    }
    encoded
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse an encoded type string back into a [`Type`].
///
/// Accepts the optional `m.` prefix used when a function type appears as a
/// declaration name. Returns `None` on malformed input.
pub fn parse_type(encoded: &str) -> Option<Type> {
    let mut parser = TypeParser {
        chars: encoded.as_bytes(),
        pos: 0,
    };
    let t = parser.parse()?;
    if parser.pos == parser.chars.len() {
        Some(t)
    } else {
        None
    }
}

struct TypeParser<'a> {
    chars: &'a [u8],
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn parse(&mut self) -> Option<Type> {
        // function-name prefix
        if self.chars[self.pos..].starts_with(b"m.") {
            self.pos += 2;
        }

        let mut base = match self.peek()? {
            b'l' => {
                self.bump();
                Type::bool()
            }
            b'b' => {
                self.bump();
                Type::byte()
            }
            b'c' => {
                self.bump();
                Type::char()
            }
            b'i' => {
                self.bump();
                Type::int()
            }
            b'f' => {
                self.bump();
                Type::float()
            }
            b'n' => {
                self.bump();
                Type::nil()
            }
            b'v' => {
                self.bump();
                Type::var()
            }
            b'o' => {
                self.bump();
                if self.bump()? != b'.' {
                    return None;
                }
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if matches!(c, b',' | b'*' | b')' | b'~') {
                        break;
                    }
                    self.pos += 1;
                }
                let name = std::str::from_utf8(&self.chars[start..self.pos]).ok()?;
                if name.is_empty() {
                    return None;
                }
                let mut t = Type::class(name);
                t.resolved = true;
                t
            }
            b'(' => self.parse_func()?,
            _ => return None,
        };

        while self.peek() == Some(b'*') {
            self.bump();
            base.dimension += 1;
        }

        Some(base)
    }

    fn parse_func(&mut self) -> Option<Type> {
        if self.bump()? != b'(' {
            return None;
        }
        let mut params = Vec::new();
        while self.peek() != Some(b')') {
            let param = self.parse()?;
            if self.bump()? != b',' {
                return None;
            }
            params.push(param);
        }
        self.bump(); // ')'
        if self.bump()? != b'~' {
            return None;
        }
        let ret = self.parse()?;
        Some(Type::func(params, ret))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_primitives() {
        assert_eq!(Type::bool().encode(), "l");
        assert_eq!(Type::byte().encode(), "b");
        assert_eq!(Type::char().encode(), "c");
        assert_eq!(Type::int().encode(), "i");
        assert_eq!(Type::float().encode(), "f");
        assert_eq!(Type::nil().encode(), "n");
        assert_eq!(Type::var().encode(), "v");
    }

    #[test]
    fn test_encode_class() {
        let t = Type::class("System.String");
        assert_eq!(t.encode(), "o.System.String");
        assert_eq!(t.with_dimension(1).encode_with_dims(), "o.System.String*");
    }

    #[test]
    fn test_encode_function() {
        let t = Type::func(vec![Type::int(), Type::char()], Type::float());
        assert_eq!(t.encode(), "(i,c,)~f");
    }

    #[test]
    fn test_encode_nested_function() {
        let inner = Type::func(vec![Type::int()], Type::int());
        let t = Type::func(vec![inner], Type::bool());
        assert_eq!(t.encode(), "((i,)~i,)~l");
    }

    #[test]
    fn test_parse_primitive_array() {
        let t = parse_type("i**").unwrap();
        assert_eq!(t.kind, TypeKind::Int);
        assert_eq!(t.dimension, 2);
    }

    #[test]
    fn test_parse_class() {
        let t = parse_type("o.Collection.List").unwrap();
        assert_eq!(t.kind, TypeKind::Class);
        assert_eq!(t.name, "Collection.List");
        assert!(t.resolved);
    }

    #[test]
    fn test_parse_function() {
        let t = parse_type("(i,o.System.String*,)~f").unwrap();
        assert_eq!(t.kind, TypeKind::Func);
        assert_eq!(t.func_params.len(), 2);
        assert_eq!(t.func_params[1].name, "System.String");
        assert_eq!(t.func_params[1].dimension, 1);
        assert_eq!(t.func_return.as_ref().unwrap().kind, TypeKind::Float);
    }

    #[test]
    fn test_parse_prefixed_function_name() {
        let t = parse_type("m.(i,)~i").unwrap();
        assert_eq!(t.kind, TypeKind::Func);
    }

    #[test]
    fn test_round_trip() {
        let cases = [
            "i",
            "f*",
            "o.System.String",
            "o.System.String**",
            "(i,c,)~o.System.String",
            "((l,)~n,f,)~i*",
            "()~n",
        ];
        for case in cases {
            let parsed = parse_type(case).expect(case);
            let encoded = parsed.encode_with_dims();
            let reparsed = parse_type(&encoded).expect(&encoded);
            assert_eq!(encoded, reparsed.encode_with_dims(), "case {case}");
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_type("").is_none());
        assert!(parse_type("o.").is_none());
        assert!(parse_type("(i)~f").is_none()); // missing terminating comma
        assert!(parse_type("q").is_none());
        assert!(parse_type("i,").is_none()); // trailing junk
    }
}
