//! Linked-library descriptors and lookup.
//!
//! The linker proper (file format, loading) lives with the toolchain
//! driver; the analyzer only needs the loaded view: classes, enums and
//! aliases searchable by qualified name or through the program's `use`
//! list. The built-in `System` bundle is always present; it carries the
//! root class, the string class and the primitive holder classes the
//! boxing transforms synthesize calls against.

use rustc_hash::FxHashMap;
use vela_core::{encode_function_type, SYSTEM_BASE_NAME};
use vela_core::{Type, TypeKind};

/// A method exported by a library class.
#[derive(Debug, Clone)]
pub struct LibraryMethod {
    /// Unqualified name.
    pub name: String,
    /// Canonical encoded signature, `Class:method:params,`.
    pub encoded_name: String,
    /// Parameter types.
    pub param_types: Vec<Type>,
    /// Return type.
    pub return_type: Type,
    /// Constructor flag.
    pub is_new: bool,
    /// Static flag.
    pub is_static: bool,
    /// Virtual flag.
    pub is_virtual: bool,
}

impl LibraryMethod {
    /// Create a method descriptor, computing its encoded signature.
    pub fn new(cls_name: &str, name: &str, param_types: Vec<Type>, return_type: Type) -> Self {
        let mut encoded = format!("{cls_name}:{name}:");
        for p in &param_types {
            encoded.push_str(&p.encode_with_dims());
            encoded.push(',');
        }
        Self {
            name: name.to_string(),
            encoded_name: encoded,
            param_types,
            return_type,
            is_new: name == "New",
            is_static: false,
            is_virtual: false,
        }
    }
}

/// A class exported by a library.
#[derive(Debug, Clone, Default)]
pub struct LibraryClass {
    /// Fully qualified name.
    pub name: String,
    /// Interface flag.
    pub is_interface: bool,
    /// Virtual flag.
    pub is_virtual: bool,
    /// Parent class name; empty for the root.
    pub parent_name: String,
    /// Implemented interface names.
    pub interface_names: Vec<String>,
    /// Generic parameter names with optional backing interfaces.
    pub generics: Vec<(String, Option<Type>)>,
    /// Exported methods.
    pub methods: Vec<LibraryMethod>,
    /// Known library subclasses, for upcast checks.
    pub children: Vec<String>,
}

impl LibraryClass {
    /// Create a class descriptor.
    pub fn new(name: &str, parent_name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent_name: parent_name.to_string(),
            ..Default::default()
        }
    }

    /// All methods with the given unqualified name.
    pub fn methods_named(&self, name: &str) -> Vec<&LibraryMethod> {
        self.methods.iter().filter(|m| m.name == name).collect()
    }

    /// Whether the class declares generic parameters.
    #[inline]
    pub fn has_generics(&self) -> bool {
        !self.generics.is_empty()
    }

    /// Index of a generic parameter by name.
    pub fn generic_index(&self, name: &str) -> Option<usize> {
        self.generics.iter().position(|(n, _)| n == name)
    }
}

/// An enum exported by a library.
#[derive(Debug, Clone)]
pub struct LibraryEnum {
    /// Fully qualified name.
    pub name: String,
    /// Item name → value.
    pub items: FxHashMap<String, i64>,
}

/// An alias group exported by a library.
#[derive(Debug, Clone)]
pub struct LibraryAlias {
    /// Group name.
    pub name: String,
    /// Member name → aliased type.
    pub types: FxHashMap<String, Type>,
}

/// The loaded-library view the analyzer searches.
#[derive(Debug)]
pub struct Linker {
    classes: FxHashMap<String, LibraryClass>,
    enums: FxHashMap<String, LibraryEnum>,
    aliases: FxHashMap<String, LibraryAlias>,
    bundles: Vec<String>,
}

impl Linker {
    /// Create a linker holding only the built-in `System` bundle.
    pub fn new() -> Self {
        let mut linker = Self {
            classes: FxHashMap::default(),
            enums: FxHashMap::default(),
            aliases: FxHashMap::default(),
            bundles: vec!["System".to_string()],
        };
        install_system_bundle(&mut linker);
        linker
    }

    /// Register a library class.
    pub fn add_class(&mut self, cls: LibraryClass) {
        if let Some(bundle) = cls.name.rsplit_once('.').map(|(b, _)| b.to_string()) {
            if !self.bundles.contains(&bundle) {
                self.bundles.push(bundle);
            }
        }
        self.classes.insert(cls.name.clone(), cls);
    }

    /// Register a library enum.
    pub fn add_enum(&mut self, eenum: LibraryEnum) {
        self.enums.insert(eenum.name.clone(), eenum);
    }

    /// Register a library alias group.
    pub fn add_alias(&mut self, alias: LibraryAlias) {
        self.aliases.insert(alias.name.clone(), alias);
    }

    /// Whether any library declares the bundle.
    pub fn has_bundle(&self, name: &str) -> bool {
        self.bundles.iter().any(|b| b == name)
    }

    /// Find a class by qualified name, then by each `use` prefix.
    pub fn search_class(&self, name: &str, uses: &[String]) -> Option<&LibraryClass> {
        if let Some(cls) = self.classes.get(name) {
            return Some(cls);
        }
        uses.iter()
            .find_map(|u| self.classes.get(&format!("{u}.{name}")))
    }

    /// Find an enum by qualified name, then by each `use` prefix.
    pub fn search_enum(&self, name: &str, uses: &[String]) -> Option<&LibraryEnum> {
        if let Some(e) = self.enums.get(name) {
            return Some(e);
        }
        uses.iter().find_map(|u| self.enums.get(&format!("{u}.{name}")))
    }

    /// Find an alias group by name, then by each `use` prefix.
    pub fn search_alias(&self, name: &str, uses: &[String]) -> Option<&LibraryAlias> {
        if let Some(a) = self.aliases.get(name) {
            return Some(a);
        }
        uses.iter()
            .find_map(|u| self.aliases.get(&format!("{u}.{name}")))
    }
}

impl Default for Linker {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Built-in System bundle
// =============================================================================

/// The holder class wrapping each primitive, or `None` for non-primitives.
pub fn holder_class_for(kind: TypeKind) -> Option<&'static str> {
    match kind {
        TypeKind::Bool => Some("System.BoolHolder"),
        TypeKind::Byte => Some("System.ByteHolder"),
        TypeKind::Char => Some("System.CharHolder"),
        TypeKind::Int => Some("System.IntHolder"),
        TypeKind::Float => Some("System.FloatHolder"),
        _ => None,
    }
}

/// Whether `name` is one of the primitive holder classes.
pub fn is_holder_class(name: &str) -> bool {
    matches!(
        name,
        "System.BoolHolder"
            | "System.ByteHolder"
            | "System.CharHolder"
            | "System.IntHolder"
            | "System.FloatHolder"
    )
}

/// The primitive a holder class wraps.
pub fn held_type(name: &str) -> Option<Type> {
    match name {
        "System.BoolHolder" => Some(Type::bool()),
        "System.ByteHolder" => Some(Type::byte()),
        "System.CharHolder" => Some(Type::char()),
        "System.IntHolder" => Some(Type::int()),
        "System.FloatHolder" => Some(Type::float()),
        _ => None,
    }
}

fn install_system_bundle(linker: &mut Linker) {
    let mut base = LibraryClass::new(SYSTEM_BASE_NAME, "");
    base.methods.push(LibraryMethod::new(
        SYSTEM_BASE_NAME,
        "New",
        vec![],
        Type::class(SYSTEM_BASE_NAME),
    ));
    linker.add_class(base);

    let mut string = LibraryClass::new("System.String", SYSTEM_BASE_NAME);
    string.methods.push(LibraryMethod::new(
        "System.String",
        "New",
        vec![],
        Type::class("System.String"),
    ));
    string.methods.push(LibraryMethod::new(
        "System.String",
        "Size",
        vec![],
        Type::int(),
    ));
    string.methods.push(LibraryMethod::new(
        "System.String",
        "Append",
        vec![Type::class("System.String")],
        Type::class("System.String"),
    ));
    linker.add_class(string);

    for (holder, held) in [
        ("System.BoolHolder", Type::bool()),
        ("System.ByteHolder", Type::byte()),
        ("System.CharHolder", Type::char()),
        ("System.IntHolder", Type::int()),
        ("System.FloatHolder", Type::float()),
    ] {
        let mut cls = LibraryClass::new(holder, SYSTEM_BASE_NAME);
        cls.interface_names.push("System.Compare".to_string());
        cls.methods
            .push(LibraryMethod::new(holder, "New", vec![held.clone()], Type::class(holder)));
        cls.methods
            .push(LibraryMethod::new(holder, "Get", vec![], held.clone()));
        cls.methods
            .push(LibraryMethod::new(holder, "Set", vec![held], Type::nil()));
        linker.add_class(cls);
    }

    // the comparison interface generic constraints commonly name
    let compare = LibraryClass {
        name: "System.Compare".to_string(),
        is_interface: true,
        is_virtual: true,
        parent_name: SYSTEM_BASE_NAME.to_string(),
        ..Default::default()
    };
    linker.add_class(compare);

    let mut func_alias = LibraryAlias {
        name: "System.Func".to_string(),
        types: FxHashMap::default(),
    };
    func_alias.types.insert(
        "Unary".to_string(),
        vela_core::types::parse_type(&format!(
            "m.{}",
            encode_function_type(&[Type::int()], Some(&Type::int()))
        ))
        .expect("well-formed alias type"),
    );
    linker.add_alias(func_alias);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_bundle_present() {
        let linker = Linker::new();
        assert!(linker.has_bundle("System"));
        assert!(linker.search_class(SYSTEM_BASE_NAME, &[]).is_some());
        assert!(linker.search_class("String", &["System".to_string()]).is_some());
        assert!(linker.search_class("String", &[]).is_none());
    }

    #[test]
    fn test_holder_lookup() {
        assert_eq!(holder_class_for(TypeKind::Int), Some("System.IntHolder"));
        assert_eq!(holder_class_for(TypeKind::Class), None);
        assert!(is_holder_class("System.FloatHolder"));
        assert_eq!(held_type("System.CharHolder").unwrap().kind, TypeKind::Char);
    }

    #[test]
    fn test_holder_get_signature() {
        let linker = Linker::new();
        let holder = linker.search_class("System.IntHolder", &[]).unwrap();
        let get = &holder.methods_named("Get")[0];
        assert_eq!(get.encoded_name, "System.IntHolder:Get:");
        assert_eq!(get.return_type.kind, TypeKind::Int);
    }
}
