//! The parsed descriptor graph the analyzer types and annotates.
//!
//! The parser hands the analyzer a [`Program`]: bundles owning classes,
//! enums and aliases, with methods, statements and expressions stored in
//! flat arenas addressed by typed ids. The analyzer mutates nodes in place
//! (resolving types, attaching symbol entries, selecting call targets,
//! synthesizing alternate methods) and the emitter consumes the result.
//!
//! Arena ids keep the graph cheap to cross-reference: a node never owns
//! another node, it names it.

use vela_core::{SourceLoc, Type};

// =============================================================================
// Ids
// =============================================================================

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);
    };
}

arena_id!(
    /// Index of a class in [`Program::classes`].
    ClassId
);
arena_id!(
    /// Index of an enum in [`Program::enums`].
    EnumId
);
arena_id!(
    /// Index of a method in [`Program::methods`].
    MethodId
);
arena_id!(
    /// Index of a statement in [`Program::stmts`].
    StmtId
);
arena_id!(
    /// Index of an expression in [`Program::exprs`].
    ExprId
);
arena_id!(
    /// Index of a symbol entry in the symbol-table manager.
    EntryId
);

// =============================================================================
// Program
// =============================================================================

/// A parsed compilation unit plus its flat node arenas.
#[derive(Debug, Default)]
pub struct Program {
    /// Source file this unit was parsed from.
    pub file_name: String,
    /// Bundle names referenced by `use` directives.
    pub uses: Vec<String>,
    /// Declared bundles, in source order.
    pub bundles: Vec<Bundle>,
    /// All classes, addressed by [`ClassId`].
    pub classes: Vec<Class>,
    /// All enums, addressed by [`EnumId`].
    pub enums: Vec<Enum>,
    /// All methods, addressed by [`MethodId`].
    pub methods: Vec<Method>,
    /// All statements, addressed by [`StmtId`].
    pub stmts: Vec<Stmt>,
    /// All expressions, addressed by [`ExprId`].
    pub exprs: Vec<Expr>,
    /// Program entry point, set once the analyzer finds it.
    pub start: Option<(ClassId, MethodId)>,
}

impl Program {
    /// Create an empty program for the given source file.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    /// Append a class, returning its id.
    pub fn add_class(&mut self, class: Class) -> ClassId {
        let id = ClassId(self.classes.len());
        self.classes.push(class);
        id
    }

    /// Append a method, returning its id.
    pub fn add_method(&mut self, method: Method) -> MethodId {
        let id = MethodId(self.methods.len());
        self.methods.push(method);
        id
    }

    /// Append a statement, returning its id.
    pub fn add_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len());
        self.stmts.push(stmt);
        id
    }

    /// Append an expression, returning its id.
    pub fn add_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len());
        self.exprs.push(expr);
        id
    }

    /// Find a program class by its fully qualified name, trying each `use`
    /// prefix for unqualified names.
    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        if let Some(pos) = self.classes.iter().position(|c| c.name == name) {
            return Some(ClassId(pos));
        }
        for bundle in &self.bundles {
            let qualified = format!("{}.{}", bundle.name, name);
            if let Some(pos) = self.classes.iter().position(|c| c.name == qualified) {
                return Some(ClassId(pos));
            }
        }
        for use_name in &self.uses {
            let qualified = format!("{use_name}.{name}");
            if let Some(pos) = self.classes.iter().position(|c| c.name == qualified) {
                return Some(ClassId(pos));
            }
        }
        None
    }

    /// Find a program enum by name, trying `use` prefixes.
    pub fn find_enum(&self, name: &str) -> Option<EnumId> {
        if let Some(pos) = self.enums.iter().position(|e| e.name == name) {
            return Some(EnumId(pos));
        }
        for use_name in &self.uses {
            let qualified = format!("{use_name}.{name}");
            if let Some(pos) = self.enums.iter().position(|e| e.name == qualified) {
                return Some(EnumId(pos));
            }
        }
        None
    }

    /// Find an alias by name across every bundle.
    pub fn find_alias(&self, name: &str) -> Option<&Alias> {
        self.bundles
            .iter()
            .flat_map(|b| b.aliases.iter())
            .find(|a| a.name == name || a.name.ends_with(&format!(".{name}")))
    }

    /// Whether a bundle with the given name was declared.
    pub fn has_bundle(&self, name: &str) -> bool {
        self.bundles.iter().any(|b| b.name == name)
    }
}

/// A named namespace owning classes, enums and aliases.
#[derive(Debug, Default)]
pub struct Bundle {
    /// Bundle name; empty for the default bundle.
    pub name: String,
    /// Classes declared in this bundle.
    pub classes: Vec<ClassId>,
    /// Enums declared in this bundle.
    pub enums: Vec<EnumId>,
    /// Aliases declared in this bundle.
    pub aliases: Vec<Alias>,
}

/// A named set of type abbreviations.
#[derive(Debug, Clone)]
pub struct Alias {
    /// Alias group name, e.g. `Func`.
    pub name: String,
    /// Member name → aliased type.
    pub types: Vec<(String, Type)>,
}

impl Alias {
    /// Look up a member of the alias group.
    pub fn get(&self, member: &str) -> Option<&Type> {
        self.types.iter().find(|(n, _)| n == member).map(|(_, t)| t)
    }
}

// =============================================================================
// Classes and enums
// =============================================================================

/// A generic parameter declared on a class, optionally constrained by a
/// backing interface.
#[derive(Debug, Clone)]
pub struct GenericParam {
    /// Parameter name, e.g. `T`.
    pub name: String,
    /// Constraint every concrete argument must satisfy.
    pub backing: Option<Type>,
}

/// Where a class's parent lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// Parent declared in this program.
    Program(ClassId),
    /// Parent provided by a linked library, by qualified name.
    Library(String),
}

/// A parsed class declaration.
#[derive(Debug)]
pub struct Class {
    /// Declaration site.
    pub loc: SourceLoc,
    /// Fully qualified name.
    pub name: String,
    /// Owning bundle name.
    pub bundle_name: String,
    /// Interfaces are classes whose methods are all unimplemented.
    pub is_interface: bool,
    /// Virtual classes require children to implement their virtual methods.
    pub is_virtual: bool,
    /// Non-public classes are invisible outside their bundle.
    pub is_public: bool,
    /// Declared generic parameters.
    pub generics: Vec<GenericParam>,
    /// Declared parent name, if any.
    pub parent_name: Option<String>,
    /// Resolved parent, bound during the parent pass.
    pub parent: Option<ParentRef>,
    /// Declared interface names.
    pub interface_names: Vec<String>,
    /// Class-level declaration statements.
    pub statements: Vec<StmtId>,
    /// Methods, including analyzer-synthesized alternates and lambdas.
    pub methods: Vec<MethodId>,
    /// Program classes deriving from this one.
    pub children: Vec<ClassId>,
    /// Set when the class is referenced; unreferenced classes can be
    /// dropped by the emitter.
    pub called: bool,
}

impl Class {
    /// Create a class with the given name in a bundle.
    pub fn new(loc: SourceLoc, bundle_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            loc,
            name: name.into(),
            bundle_name: bundle_name.into(),
            is_interface: false,
            is_virtual: false,
            is_public: true,
            generics: Vec::new(),
            parent_name: None,
            parent: None,
            interface_names: Vec::new(),
            statements: Vec::new(),
            methods: Vec::new(),
            children: Vec::new(),
            called: false,
        }
    }

    /// Whether the class declares generic parameters.
    #[inline]
    pub fn has_generics(&self) -> bool {
        !self.generics.is_empty()
    }

    /// Look up a declared generic parameter by name.
    pub fn generic(&self, name: &str) -> Option<&GenericParam> {
        self.generics.iter().find(|g| g.name == name)
    }

    /// Index of a generic parameter by name.
    pub fn generic_index(&self, name: &str) -> Option<usize> {
        self.generics.iter().position(|g| g.name == name)
    }
}

/// A parsed enum declaration.
#[derive(Debug)]
pub struct Enum {
    /// Declaration site.
    pub loc: SourceLoc,
    /// Fully qualified name (`Owner#Name` for class-scoped enums).
    pub name: String,
    /// Item name → value.
    pub items: Vec<(String, i64)>,
}

impl Enum {
    /// Look up an item's value.
    pub fn item(&self, name: &str) -> Option<i64> {
        self.items.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

// =============================================================================
// Methods
// =============================================================================

/// Method kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Public constructor.
    PublicNew,
    /// Private constructor.
    PrivateNew,
    /// Public instance method.
    PublicMethod,
    /// Private instance method.
    PrivateMethod,
    /// Bundle-level function.
    Function,
}

impl MethodKind {
    /// Whether this kind is a constructor.
    #[inline]
    pub fn is_new(self) -> bool {
        matches!(self, MethodKind::PublicNew | MethodKind::PrivateNew)
    }

    /// Whether this kind is private.
    #[inline]
    pub fn is_private(self) -> bool {
        matches!(self, MethodKind::PrivateNew | MethodKind::PrivateMethod)
    }
}

/// A parsed method.
#[derive(Debug)]
pub struct Method {
    /// Declaration site.
    pub loc: SourceLoc,
    /// Parsed name, `Class:method`.
    pub name: String,
    /// Unqualified user-facing name.
    pub user_name: String,
    /// Owning class.
    pub cls: ClassId,
    /// Kind.
    pub kind: MethodKind,
    /// Static flag.
    pub is_static: bool,
    /// Virtual methods have no body and must be implemented by children.
    pub is_virtual: bool,
    /// Synthesized from a lambda literal.
    pub is_lambda: bool,
    /// Synthesized default-parameter alternate.
    pub is_alt: bool,
    /// Parameter declarations (each a `Declaration` statement).
    pub params: Vec<StmtId>,
    /// Declared return type.
    pub return_type: Type,
    /// Body statements.
    pub statements: Vec<StmtId>,
    /// Canonical encoded signature, `Class:method:params,`.
    pub encoded_name: String,
    /// The method this alternate was expanded from.
    pub original: Option<MethodId>,
    /// Set when the body uses short-circuit logical operators; the frame
    /// reserves an extra temp slot.
    pub has_and_or: bool,
}

impl Method {
    /// Create a method shell; parameters and statements attach afterwards.
    pub fn new(
        loc: SourceLoc,
        cls: ClassId,
        name: impl Into<String>,
        kind: MethodKind,
        return_type: Type,
    ) -> Self {
        let name = name.into();
        let user_name = name
            .rsplit(':')
            .next()
            .unwrap_or(name.as_str())
            .to_string();
        Self {
            loc,
            name,
            user_name,
            cls,
            kind,
            is_static: false,
            is_virtual: false,
            is_lambda: false,
            is_alt: false,
            params: Vec::new(),
            return_type,
            statements: Vec::new(),
            encoded_name: String::new(),
            original: None,
            has_and_or: false,
        }
    }
}

// =============================================================================
// Statements
// =============================================================================

/// Assignment flavors; the operation forms fold a calculation into the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// Plain store.
    Assign,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
}

/// One `if`/`else if` link; `next` chains the following `else if`.
#[derive(Debug)]
pub struct IfStmt {
    /// Branch condition.
    pub cond: ExprId,
    /// Statements of the `if` arm.
    pub if_stmts: Vec<StmtId>,
    /// The chained `else if`, itself an `If` statement.
    pub next: Option<StmtId>,
    /// Statements of the final `else` arm.
    pub else_stmts: Option<Vec<StmtId>>,
}

/// Statement payloads.
#[derive(Debug)]
pub enum StmtKind {
    /// A variable declaration, optionally with an initializing assignment.
    Declaration {
        /// The declared symbol.
        entry: EntryId,
        /// Initializer, itself an `Assignment` statement.
        assignment: Option<StmtId>,
    },
    /// A store into a variable.
    Assignment {
        /// Operation flavor.
        op: AssignOp,
        /// Target variable expression.
        variable: ExprId,
        /// Stored value.
        value: ExprId,
    },
    /// An expression evaluated for effect.
    Simple(ExprId),
    /// A method call in statement position.
    MethodCall(ExprId),
    /// Conditional chain.
    If(IfStmt),
    /// `select` over labeled arms.
    Select {
        /// Scrutinee.
        eval: ExprId,
        /// Labeled arms: label expressions and their statements.
        arms: Vec<(Vec<ExprId>, Vec<StmtId>)>,
        /// The `other` arm.
        other: Option<Vec<StmtId>>,
    },
    /// Pre-test loop.
    While {
        /// Loop condition.
        cond: ExprId,
        /// Body statements.
        body: Vec<StmtId>,
    },
    /// Post-test loop.
    DoWhile {
        /// Body statements.
        body: Vec<StmtId>,
        /// Loop condition.
        cond: ExprId,
    },
    /// Counted loop.
    For {
        /// Initializer statement.
        pre: StmtId,
        /// Loop condition.
        cond: ExprId,
        /// Per-iteration update statement.
        update: StmtId,
        /// Body statements.
        body: Vec<StmtId>,
    },
    /// Return, with an optional value.
    Return(Option<ExprId>),
    /// Cleanup block run on every exit from the enclosing method.
    Leaving(Vec<StmtId>),
    /// Mutual-exclusion block over a variable.
    Critical {
        /// Guarded variable.
        variable: ExprId,
        /// Body statements.
        body: Vec<StmtId>,
    },
}

/// A statement node.
#[derive(Debug)]
pub struct Stmt {
    /// Source site.
    pub loc: SourceLoc,
    /// Payload.
    pub kind: StmtKind,
}

// =============================================================================
// Expressions
// =============================================================================

/// Binary calculation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `=` equality
    Eq,
    /// `<>` inequality
    Neq,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `<=`
    LessEq,
    /// `>=`
    GreaterEq,
    /// `&` logical and
    And,
    /// `|` logical or
    Or,
}

impl CalcOp {
    /// Whether the result type is `Bool` regardless of operands.
    #[inline]
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            CalcOp::Eq
                | CalcOp::Neq
                | CalcOp::Less
                | CalcOp::Greater
                | CalcOp::LessEq
                | CalcOp::GreaterEq
                | CalcOp::And
                | CalcOp::Or
        )
    }

    /// Whether this is a short-circuit logical operator.
    #[inline]
    pub fn is_logical(self) -> bool {
        matches!(self, CalcOp::And | CalcOp::Or)
    }
}

/// How a method call was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    /// `Class->New(…)`
    NewInstance,
    /// `receiver->Method(…)` or `Class->Method(…)`
    Method,
    /// `Parent(…)`
    Parent,
    /// `Enum->Item`
    EnumItem,
    /// `array->New[…]`
    NewArray,
}

/// Resolved target of a method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// A method of a program class.
    Program(MethodId),
    /// A library method, `(class name, encoded signature)`.
    Library(String, String),
    /// Call through a variable of function type.
    Variable(EntryId),
}

/// A method-call expression's payload.
#[derive(Debug)]
pub struct MethodCallData {
    /// Syntax shape.
    pub call_type: CallType,
    /// Receiver variable or class/enum name.
    pub variable_name: String,
    /// Called method name; empty for variable-function calls.
    pub method_name: String,
    /// Actual arguments.
    pub params: Vec<ExprId>,
    /// Receiver symbol entry, when the receiver is a variable.
    pub entry: Option<EntryId>,
    /// Explicit concrete generic arguments, `Class<A,B>->New(…)`.
    pub concrete_types: Vec<Type>,
    /// Resolved call target.
    pub target: Option<CallTarget>,
    /// Resolved enum item `(enum name, value)`.
    pub enum_item: Option<(String, i64)>,
    /// The class the call was first attempted on, before parent retries.
    pub original_class: Option<ClassId>,
    /// Return type a lambda instantiation must produce.
    pub func_return: Option<Type>,
}

impl MethodCallData {
    /// A `receiver->Method(args)` call.
    pub fn method(
        variable_name: impl Into<String>,
        method_name: impl Into<String>,
        params: Vec<ExprId>,
    ) -> Self {
        Self {
            call_type: CallType::Method,
            variable_name: variable_name.into(),
            method_name: method_name.into(),
            params,
            entry: None,
            concrete_types: Vec::new(),
            target: None,
            enum_item: None,
            original_class: None,
            func_return: None,
        }
    }

    /// A `Class->New(args)` instantiation.
    pub fn new_instance(class_name: impl Into<String>, params: Vec<ExprId>) -> Self {
        let mut call = Self::method(class_name, "New", params);
        call.call_type = CallType::NewInstance;
        call
    }

    /// A `Parent(args)` constructor call.
    pub fn parent(params: Vec<ExprId>) -> Self {
        let mut call = Self::method("", "New", params);
        call.call_type = CallType::Parent;
        call
    }
}

/// Expression payloads.
#[derive(Debug)]
pub enum ExprKind {
    /// Integer literal.
    IntLit(i64),
    /// Float literal.
    FloatLit(f64),
    /// Character literal.
    CharLit(char),
    /// Boolean literal.
    BoolLit(bool),
    /// String literal.
    StringLit(String),
    /// The `Nil` literal.
    Nil,
    /// A variable reference, optionally indexed, optionally carrying a
    /// pre or post operation (`++x` / `x++` forms lowered to operation
    /// assignments). A variable may carry one or the other, never both.
    Variable {
        /// Variable name as written.
        name: String,
        /// Array indices, when indexed.
        indices: Option<Vec<ExprId>>,
        /// Resolved symbol entry.
        entry: Option<EntryId>,
        /// Operation assignment applied before evaluation.
        pre_stmt: Option<StmtId>,
        /// Operation assignment applied after evaluation.
        post_stmt: Option<StmtId>,
    },
    /// A binary calculation.
    Calc {
        /// Operator.
        op: CalcOp,
        /// Left operand.
        left: ExprId,
        /// Right operand.
        right: ExprId,
    },
    /// Ternary conditional.
    Cond {
        /// Condition.
        cond: ExprId,
        /// Value when true.
        if_expr: ExprId,
        /// Value when false.
        else_expr: ExprId,
    },
    /// A method call.
    MethodCall(MethodCallData),
    /// A lambda literal lowered into a synthetic method.
    Lambda {
        /// The synthesized method holding the body.
        method: MethodId,
        /// Explicit function type, when declared.
        lambda_type: Option<Type>,
        /// The instantiation call synthesized once the lambda is typed.
        call: Option<ExprId>,
        /// Capture map: (copy entry, original entry) pairs.
        closures: Vec<(EntryId, EntryId)>,
    },
    /// `expr->TypeOf(Class)` runtime type test.
    TypeOf {
        /// Tested expression.
        expr: ExprId,
        /// Class the test is against.
        check: Type,
    },
}

/// An expression node.
///
/// Every expression carries its computed `eval_type` and an optional
/// `cast_type`, explicit from the source or inferred by the analyzer. A
/// trailing `method_call` chains postfix calls (`a->B()->C()`).
#[derive(Debug)]
pub struct Expr {
    /// Source site.
    pub loc: SourceLoc,
    /// Payload.
    pub kind: ExprKind,
    /// Computed type.
    pub eval_type: Option<Type>,
    /// Requested or inferred cast.
    pub cast_type: Option<Type>,
    /// Chained postfix call.
    pub method_call: Option<ExprId>,
}

impl Expr {
    /// Create an untyped expression node.
    pub fn new(loc: SourceLoc, kind: ExprKind) -> Self {
        Self {
            loc,
            kind,
            eval_type: None,
            cast_type: None,
            method_call: None,
        }
    }

    /// The type overload resolution sees: the cast when present, the
    /// computed type otherwise.
    pub fn effective_type(&self) -> Option<&Type> {
        self.cast_type.as_ref().or(self.eval_type.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_ids() {
        let mut prgm = Program::new("t.vl");
        let e1 = prgm.add_expr(Expr::new(SourceLoc::synthetic(), ExprKind::IntLit(1)));
        let e2 = prgm.add_expr(Expr::new(SourceLoc::synthetic(), ExprKind::IntLit(2)));
        assert_ne!(e1, e2);
        assert!(matches!(prgm.exprs[e2.0].kind, ExprKind::IntLit(2)));
    }

    #[test]
    fn test_find_class_with_use_prefix() {
        let mut prgm = Program::new("t.vl");
        prgm.uses.push("App".to_string());
        let id = prgm.add_class(Class::new(SourceLoc::synthetic(), "App", "App.Point"));
        prgm.bundles.push(Bundle {
            name: "App".to_string(),
            classes: vec![id],
            ..Default::default()
        });

        assert_eq!(prgm.find_class("App.Point"), Some(id));
        assert_eq!(prgm.find_class("Point"), Some(id));
        assert_eq!(prgm.find_class("Missing"), None);
    }

    #[test]
    fn test_method_user_name() {
        let m = Method::new(
            SourceLoc::synthetic(),
            ClassId(0),
            "App.Point:Scale",
            MethodKind::PublicMethod,
            Type::nil(),
        );
        assert_eq!(m.user_name, "Scale");
    }
}
