//! The contextual analyzer.
//!
//! Analysis runs as ordered passes over the parsed program:
//!
//! 1. load/verify `use` references against program and library bundles
//! 2. expand alias types
//! 3. synthesize alternates for methods with default parameters
//! 4. re-encode method signatures with fully qualified class names
//! 5. bind parents (defaulting to `System.Base`) and associate children
//! 6. analyze enums, classes (generics, parents, interfaces, declarations)
//! 7. reject declarations shadowing parent-chain entries
//! 8. analyze every method body
//! 9. verify the entry point for the build target
//!
//! Errors are collected throughout; the driver aborts after any pass that
//! recorded a batch. The analyzer never unwinds across a pass boundary:
//! a failed lookup simply records its diagnostic and moves on.

mod calls;
mod casts;
mod classes;
mod expressions;
mod generics;
mod lambdas;
mod methods;

use crate::ast::{ClassId, EntryId, EnumId, ExprId, MethodId, ParentRef, Program};
use crate::errors::ErrorBatch;
use crate::library::Linker;
use crate::options::{CompilerOptions, TargetKind};
use crate::symbols::SymbolTableManager;
use vela_core::{SourceLoc, Type, TypeKind, SYSTEM_BASE_NAME};

/// A class reference that may live in the program or a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClsRef {
    /// Program class.
    Program(ClassId),
    /// Library class, by qualified name.
    Library(String),
}

/// The analyzer state machine.
pub struct ContextAnalyzer {
    pub(crate) program: Program,
    pub(crate) symbols: SymbolTableManager,
    pub(crate) linker: Linker,
    pub(crate) options: CompilerOptions,
    pub(crate) errors: ErrorBatch,

    pub(crate) current_class: Option<ClassId>,
    pub(crate) current_method: Option<MethodId>,

    // lambda capture context: the enclosing method/table while a lambda
    // body is analyzed
    pub(crate) capture_method: Option<MethodId>,
    pub(crate) capture_lambda: Option<ExprId>,

    // derived-lambda bookkeeping: (lambda literal, enclosing call)
    pub(crate) lambda_inferred: (Option<ExprId>, Option<ExprId>),
    pub(crate) alt_error_method_names: Vec<String>,

    pub(crate) main_found: bool,
    pub(crate) web_found: bool,
}

/// Analyze a parsed program against the linked libraries.
///
/// On success the descriptor graph comes back fully typed and annotated;
/// on failure the ordered error batch is returned instead.
pub fn analyze(
    program: Program,
    symbols: SymbolTableManager,
    linker: Linker,
    options: CompilerOptions,
) -> Result<Program, ErrorBatch> {
    let mut analyzer = ContextAnalyzer {
        program,
        symbols,
        linker,
        options,
        errors: ErrorBatch::new(),
        current_class: None,
        current_method: None,
        capture_method: None,
        capture_lambda: None,
        lambda_inferred: (None, None),
        alt_error_method_names: Vec::new(),
        main_found: false,
        web_found: false,
    };

    analyzer.run();

    if analyzer.errors.is_empty() {
        Ok(analyzer.program)
    } else {
        Err(analyzer.errors)
    }
}

impl ContextAnalyzer {
    fn run(&mut self) {
        self.check_uses();
        self.resolve_alias_types();
        self.expand_default_parameters();
        self.encode_signatures();
        self.bind_parents();
        if !self.errors.is_empty() {
            return;
        }

        for bundle_index in 0..self.program.bundles.len() {
            let enums: Vec<EnumId> = self.program.bundles[bundle_index].enums.clone();
            for eid in enums {
                self.analyze_enum(eid);
            }

            let classes: Vec<ClassId> = self.program.bundles[bundle_index].classes.clone();
            for &cid in &classes {
                self.analyze_class(cid);
            }
            self.analyze_duplicate_entries(&classes);
            for &cid in &classes {
                self.analyze_methods(cid);
            }
        }

        self.check_entry_points();
    }

    // =========================================================================
    // Top-level passes
    // =========================================================================

    /// Every `use` must name a bundle in the program or a linked library.
    fn check_uses(&mut self) {
        let file = self.program.file_name.clone();
        for name in self.program.uses.clone() {
            if !self.program.has_bundle(&name) && !self.linker.has_bundle(&name) {
                self.errors.add_file(
                    &file,
                    format!("Bundle name '{name}' not defined in program or linked libraries"),
                );
            }
        }
    }

    /// Replace alias types on symbol entries and method returns.
    fn resolve_alias_types(&mut self) {
        // entries are append-only; entries created later never carry aliases
        for index in 0..self.symbols.len() {
            let eid = EntryId(index);
            let entry = self.symbols.entry(eid);
            if entry.ty.kind == TypeKind::Alias {
                let (name, loc) = (entry.ty.name.clone(), entry.loc.clone());
                if let Some(resolved) = self.resolve_alias(&name, &loc) {
                    let dim = self.symbols.entry(eid).ty.dimension;
                    self.symbols.entry_mut(eid).ty = resolved.with_dimension(dim);
                }
            }
        }

        for index in 0..self.program.methods.len() {
            if self.program.methods[index].return_type.kind == TypeKind::Alias {
                let name = self.program.methods[index].return_type.name.clone();
                let loc = self.program.methods[index].loc.clone();
                if let Some(resolved) = self.resolve_alias(&name, &loc) {
                    self.program.methods[index].return_type = resolved;
                }
            }
        }
    }

    /// Expand `Group#Member` alias references; nested aliases are invalid.
    pub(crate) fn resolve_alias(&mut self, name: &str, loc: &SourceLoc) -> Option<Type> {
        let (group, member) = match name.split_once('#') {
            Some((g, m)) => (g, m),
            None => (name, ""),
        };

        let resolved = if let Some(alias) = self.program.find_alias(group) {
            alias.get(member).cloned()
        } else {
            self.linker
                .search_alias(group, &self.program.uses)
                .and_then(|a| a.types.get(member).cloned())
        };

        let Some(resolved) = resolved else {
            if name.is_empty() {
                self.errors.add(loc, "Invalid alias");
            } else {
                self.errors.add(
                    loc,
                    format!("Undefined alias: '{}'", name.replace('#', "->")),
                );
            }
            return None;
        };

        if resolved.kind == TypeKind::Alias {
            self.errors.add(loc, "Invalid nested alias reference");
            return None;
        }

        Some(resolved)
    }

    /// Canonical signature for every non-lambda method.
    fn encode_signatures(&mut self) {
        for index in 0..self.program.methods.len() {
            if !self.program.methods[index].is_lambda {
                self.encode_method_signature(MethodId(index));
            }
        }
    }

    pub(crate) fn encode_method_signature(&mut self, mid: MethodId) {
        let cls = self.program.methods[mid.0].cls;
        let cls_name = self.program.classes[cls.0].name.clone();
        let user_name = self.program.methods[mid.0].user_name.clone();
        let params = self.program.methods[mid.0].params.clone();

        let mut encoded = format!("{cls_name}:{user_name}:");
        for pid in params {
            let entry = match &self.program.stmts[pid.0].kind {
                crate::ast::StmtKind::Declaration { entry, .. } => Some(*entry),
                _ => None,
            };
            if let Some(entry) = entry {
                let mut ty = self.symbols.entry(entry).ty.clone();
                if ty.kind == TypeKind::Class {
                    self.qualify_class_name(&mut ty);
                    self.symbols.entry_mut(entry).ty = ty.clone();
                }
                encoded.push_str(&ty.encode_with_dims());
                encoded.push(',');
            }
        }
        self.program.methods[mid.0].encoded_name = encoded;
    }

    /// Rewrite a class type's name to its fully qualified form, without
    /// reporting failures.
    pub(crate) fn qualify_class_name(&mut self, ty: &mut Type) {
        if ty.resolved || ty.kind != TypeKind::Class {
            return;
        }
        if let Some(cid) = self.program.find_class(&ty.name) {
            ty.name = self.program.classes[cid.0].name.clone();
            ty.resolved = true;
        } else if let Some(lib) = self.linker.search_class(&ty.name, &self.program.uses) {
            ty.name = lib.name.clone();
            ty.resolved = true;
        }
    }

    /// Bind every class to its parent, defaulting to `System.Base`.
    fn bind_parents(&mut self) {
        for index in 0..self.program.classes.len() {
            let cid = ClassId(index);
            if self.program.classes[index].parent_name.is_none()
                && self.program.classes[index].name != SYSTEM_BASE_NAME
            {
                self.program.classes[index].parent_name = Some(SYSTEM_BASE_NAME.to_string());
            }

            let Some(parent_name) = self.program.classes[index].parent_name.clone() else {
                continue;
            };

            if let Some(pid) = self.program.find_class(&parent_name) {
                self.program.classes[index].parent = Some(ParentRef::Program(pid));
                self.program.classes[pid.0].children.push(cid);
            } else if let Some(lib) = self.linker.search_class(&parent_name, &self.program.uses) {
                let qualified = lib.name.clone();
                self.program.classes[index].parent = Some(ParentRef::Library(qualified));
            } else {
                let loc = self.program.classes[index].loc.clone();
                self.errors
                    .add(&loc, "Attempting to inherit from an undefined class type");
            }
        }
    }

    /// Verify the entry point the build target requires.
    fn check_entry_points(&mut self) {
        let file = self.program.file_name.clone();
        match self.options.target {
            TargetKind::Executable => {
                if !self.main_found {
                    self.errors
                        .add_file(&file, "The 'Main(args)' function was not defined");
                }
            }
            TargetKind::Web => {
                if !self.web_found {
                    self.errors
                        .add_file(&file, "The 'Action(args)' function was not defined");
                }
            }
            TargetKind::Library => {}
        }
    }

    // =========================================================================
    // Shared lookups
    // =========================================================================

    pub(crate) fn error(&mut self, loc: &SourceLoc, message: impl Into<String>) {
        self.errors.add(loc, message);
    }

    pub(crate) fn expr_loc(&self, id: ExprId) -> SourceLoc {
        self.program.exprs[id.0].loc.clone()
    }

    pub(crate) fn search_program_classes(&self, name: &str) -> Option<ClassId> {
        self.program.find_class(name)
    }

    pub(crate) fn search_program_enums(&self, name: &str) -> Option<EnumId> {
        self.program.find_enum(name)
    }

    pub(crate) fn has_program_library_class(&self, name: &str) -> bool {
        self.program.find_class(name).is_some()
            || self.linker.search_class(name, &self.program.uses).is_some()
    }

    pub(crate) fn has_program_library_enum(&self, name: &str) -> bool {
        self.program.find_enum(name).is_some()
            || self.linker.search_enum(name, &self.program.uses).is_some()
    }

    /// Resolve a name to a program or library class.
    pub(crate) fn get_program_library_class(&self, name: &str) -> Option<ClsRef> {
        if let Some(cid) = self.program.find_class(name) {
            return Some(ClsRef::Program(cid));
        }
        self.linker
            .search_class(name, &self.program.uses)
            .map(|lib| ClsRef::Library(lib.name.clone()))
    }

    /// Resolve a class/enum type in the context of `klass`, rewriting its
    /// name to the qualified form and flagging it resolved.
    ///
    /// Generic parameter names resolve to their backing interface when one
    /// is declared, and stay opaque (erased) otherwise.
    pub(crate) fn resolve_class_enum_type(&mut self, ty: &mut Type, klass: ClassId) -> bool {
        if ty.resolved {
            return true;
        }

        if let Some(cid) = self.program.find_class(&ty.name) {
            self.program.classes[cid.0].called = true;
            ty.name = self.program.classes[cid.0].name.clone();
            ty.resolved = true;
            return true;
        }

        if let Some(lib) = self.linker.search_class(&ty.name, &self.program.uses) {
            ty.name = lib.name.clone();
            ty.resolved = true;
            return true;
        }

        // generic parameter of the context class
        let generic = self.program.classes[klass.0].generic(&ty.name).cloned();
        if let Some(generic) = generic {
            if let Some(mut backing) = generic.backing {
                if self.resolve_class_enum_type(&mut backing, klass) {
                    ty.name = backing.name;
                    ty.resolved = true;
                    return true;
                }
            } else {
                ty.resolved = true;
                return true;
            }
        }

        if self.program.find_enum(&ty.name).is_some() {
            ty.resolved = true;
            return true;
        }
        let scoped = format!("{}#{}", self.program.classes[klass.0].name, ty.name);
        if self.program.find_enum(&scoped).is_some() {
            ty.name = scoped;
            ty.resolved = true;
            return true;
        }

        if let Some(lib_enum) = self.linker.search_enum(&ty.name, &self.program.uses) {
            ty.name = lib_enum.name.clone();
            ty.resolved = true;
            return true;
        }

        false
    }

    /// Look up a variable, local scope first, then class, then the
    /// program parent chain.
    pub(crate) fn get_entry(&self, name: &str) -> Option<EntryId> {
        if let Some(mid) = self.current_method {
            let owner = &self.program.methods[mid.0].name;
            if let Some(id) = self.symbols.get(owner, &format!("{owner}:{name}")) {
                return Some(id);
            }
        }

        let cid = self.current_class?;
        let owner = &self.program.classes[cid.0].name;
        if let Some(id) = self.symbols.get(owner, &format!("{owner}:{name}")) {
            return Some(id);
        }

        let mut parent = self.program.classes[cid.0].parent.clone();
        while let Some(ParentRef::Program(pid)) = parent {
            let owner = &self.program.classes[pid.0].name;
            if let Some(id) = self.symbols.get(owner, &format!("{owner}:{name}")) {
                return Some(id);
            }
            parent = self.program.classes[pid.0].parent.clone();
        }

        None
    }

    /// The type overload resolution sees for an expression: the innermost
    /// chained call's cast or eval type.
    pub(crate) fn get_expression_type(&self, mut id: ExprId) -> Option<Type> {
        while let Some(next) = self.program.exprs[id.0].method_call {
            id = next;
        }
        self.program.exprs[id.0].effective_type().cloned()
    }

    /// Whether an expression evaluates to a scalar (indexed variables
    /// collapse their array dimension).
    pub(crate) fn is_scalar(&self, id: ExprId) -> bool {
        let expr = &self.program.exprs[id.0];
        if let crate::ast::ExprKind::Variable { indices, .. } = &expr.kind {
            if indices.is_some() {
                return true;
            }
        }
        match self.get_expression_type(id) {
            Some(ty) => ty.dimension == 0,
            None => true,
        }
    }

    /// Whether a static context illegally references an instance entry.
    pub(crate) fn invalid_static(&self, entry: EntryId) -> bool {
        let Some(mid) = self.current_method else {
            return false;
        };
        let method = &self.program.methods[mid.0];
        let entry = self.symbols.entry(entry);
        method.is_static && !entry.is_local && !entry.is_static && self.capture_lambda.is_none()
    }
}
