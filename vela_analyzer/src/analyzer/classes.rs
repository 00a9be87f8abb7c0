//! Class-level analysis: enums, generics declarations, parents,
//! interfaces, virtual-method conformance, duplicate entries, and
//! default-parameter expansion.

use super::ContextAnalyzer;
use crate::ast::{ClassId, EnumId, Method, MethodId, ParentRef, StmtKind};
use vela_core::{SYSTEM_BASE_NAME, TypeKind};

impl ContextAnalyzer {
    // =========================================================================
    // Enums
    // =========================================================================

    pub(crate) fn analyze_enum(&mut self, eid: EnumId) {
        let (name, loc) = {
            let e = &self.program.enums[eid.0];
            (e.name.clone(), e.loc.clone())
        };

        if self
            .linker
            .search_class(&name, &self.program.uses)
            .is_some()
            || self.linker.search_enum(&name, &self.program.uses).is_some()
        {
            self.error(
                &loc,
                format!(
                    "Enum '{}' defined in program and shared libraries",
                    name.replace('#', "->")
                ),
            );
        }
    }

    // =========================================================================
    // Classes
    // =========================================================================

    pub(crate) fn analyze_class(&mut self, cid: ClassId) {
        self.current_class = Some(cid);
        self.current_method = None;
        self.program.classes[cid.0].called = true;

        let (name, loc) = {
            let c = &self.program.classes[cid.0];
            (c.name.clone(), c.loc.clone())
        };

        if self
            .linker
            .search_class(&name, &self.program.uses)
            .is_some()
            || self.linker.search_enum(&name, &self.program.uses).is_some()
        {
            self.error(&loc, format!("Class '{name}' defined in shared libraries"));
        }

        self.analyze_generic_declarations(cid);
        self.check_parent(cid);
        self.analyze_interfaces(cid);

        // class-level declarations
        for sid in self.program.classes[cid.0].statements.clone() {
            self.current_method = None;
            self.analyze_declaration(sid, cid);
        }
    }

    /// Generic parameter names may not shadow real classes; backing
    /// interfaces must resolve.
    fn analyze_generic_declarations(&mut self, cid: ClassId) {
        let loc = self.program.classes[cid.0].loc.clone();
        let generics = self.program.classes[cid.0].generics.clone();

        for (index, generic) in generics.into_iter().enumerate() {
            if self.has_program_library_class(&generic.name) {
                self.error(
                    &loc,
                    format!(
                        "Generic reference '{}' previously defined as a class",
                        generic.name
                    ),
                );
            }

            if let Some(mut backing) = generic.backing {
                if self.resolve_class_enum_type(&mut backing, cid) {
                    self.program.classes[cid.0].generics[index].backing = Some(backing);
                } else {
                    self.error(
                        &loc,
                        format!("Undefined backing generic interface: '{}'", backing.name),
                    );
                }
            }
        }
    }

    /// Parents must be plain classes: not interfaces, not generic.
    fn check_parent(&mut self, cid: ClassId) {
        let loc = self.program.classes[cid.0].loc.clone();
        let name = self.program.classes[cid.0].name.clone();

        match self.program.classes[cid.0].parent.clone() {
            Some(ParentRef::Program(pid)) => {
                let parent = &self.program.classes[pid.0];
                if parent.is_interface || parent.has_generics() {
                    self.error(
                        &loc,
                        format!("Class '{name}' cannot be derived from a generic or interface"),
                    );
                }
            }
            Some(ParentRef::Library(lib_name)) => {
                if let Some(lib) = self.linker.search_class(&lib_name, &self.program.uses) {
                    if lib.is_interface {
                        self.error(&loc, "Classes cannot be derived from interfaces");
                    }
                }
            }
            None => {}
        }
    }

    /// Every declared interface must exist, be an interface, and have its
    /// virtual methods implemented.
    fn analyze_interfaces(&mut self, cid: ClassId) {
        let loc = self.program.classes[cid.0].loc.clone();
        let interface_names = self.program.classes[cid.0].interface_names.clone();

        for interface_name in interface_names {
            if let Some(iid) = self.search_program_classes(&interface_name) {
                let is_interface = self.program.classes[iid.0].is_interface;
                if !is_interface {
                    self.error(
                        &loc,
                        format!("Class '{interface_name}' is not an interface"),
                    );
                    continue;
                }
                self.program.classes[iid.0].called = true;
                self.program.classes[iid.0].children.push(cid);
                if !self.analyze_virtual_methods(cid, iid) {
                    let name = self.program.classes[iid.0].name.clone();
                    self.error(
                        &loc,
                        format!(
                            "Not all virtual methods have been implemented for the class/interface: {name}"
                        ),
                    );
                }
            } else if let Some(lib) = self
                .linker
                .search_class(&interface_name, &self.program.uses)
                .cloned()
            {
                if !lib.is_interface {
                    self.error(
                        &loc,
                        format!("Class '{interface_name}' is not an interface"),
                    );
                    continue;
                }
                if !self.analyze_library_virtual_methods(cid, &lib) {
                    self.error(
                        &loc,
                        format!(
                            "Not all virtual methods have been implemented for the class/interface: {}",
                            lib.name
                        ),
                    );
                }
            } else {
                self.error(&loc, format!("Undefined interface: '{interface_name}'"));
            }
        }
    }

    // =========================================================================
    // Virtual-method conformance
    // =========================================================================

    /// Check every virtual method of `virtual_class` against the
    /// implementations `impl_class` provides.
    pub(crate) fn analyze_virtual_methods(
        &mut self,
        impl_class: ClassId,
        virtual_class: ClassId,
    ) -> bool {
        let mut all_implemented = true;
        let virtual_methods: Vec<MethodId> = self.program.classes[virtual_class.0]
            .methods
            .iter()
            .copied()
            .filter(|m| self.program.methods[m.0].is_virtual)
            .collect();

        for vmid in virtual_methods {
            let (v_user, v_suffix, v_return, v_static, v_kind) = {
                let m = &self.program.methods[vmid.0];
                (
                    m.user_name.clone(),
                    Self::signature_suffix(&m.encoded_name),
                    m.return_type.clone(),
                    m.is_static,
                    m.kind,
                )
            };

            let found = self.program.classes[impl_class.0]
                .methods
                .iter()
                .copied()
                .find(|m| {
                    let method = &self.program.methods[m.0];
                    !method.is_virtual
                        && method.user_name == v_user
                        && Self::signature_suffix(&method.encoded_name) == v_suffix
                });

            match found {
                Some(imid) => {
                    let (i_return, i_static, i_kind, i_loc) = {
                        let m = &self.program.methods[imid.0];
                        (
                            m.return_type.clone(),
                            m.is_static,
                            m.kind,
                            m.loc.clone(),
                        )
                    };
                    if i_return.encode_with_dims() != v_return.encode_with_dims() {
                        self.error(&i_loc, "Virtual method return types do not match");
                    }
                    if i_static != v_static {
                        self.error(&i_loc, "Virtual method static modifiers do not match");
                    }
                    if i_kind.is_new() || v_kind.is_new() {
                        self.error(&i_loc, "Constructors cannot be virtual");
                    }
                }
                None => all_implemented = false,
            }
        }

        all_implemented
    }

    fn analyze_library_virtual_methods(
        &mut self,
        impl_class: ClassId,
        lib: &crate::library::LibraryClass,
    ) -> bool {
        let mut all_implemented = true;
        for lib_method in lib.methods.iter().filter(|m| m.is_virtual) {
            let suffix = Self::signature_suffix(&lib_method.encoded_name);
            let found = self.program.classes[impl_class.0]
                .methods
                .iter()
                .any(|m| {
                    let method = &self.program.methods[m.0];
                    !method.is_virtual
                        && method.user_name == lib_method.name
                        && Self::signature_suffix(&method.encoded_name) == suffix
                });
            if !found {
                all_implemented = false;
            }
        }
        all_implemented
    }

    /// The `name:params,` tail of an encoded signature, dropping the class
    /// qualifier so signatures compare across classes.
    fn signature_suffix(encoded: &str) -> &str {
        match encoded.split_once(':') {
            Some((_, rest)) => rest,
            None => encoded,
        }
    }

    // =========================================================================
    // Duplicate entries
    // =========================================================================

    /// Instance and class variables may not shadow a parent-chain entry.
    pub(crate) fn analyze_duplicate_entries(&mut self, classes: &[ClassId]) {
        for &cid in classes {
            for sid in self.program.classes[cid.0].statements.clone() {
                let StmtKind::Declaration { entry, .. } = &self.program.stmts[sid.0].kind else {
                    continue;
                };
                let entry = *entry;
                let short = self.symbols.entry(entry).short_name().to_string();
                let loc = self.symbols.entry(entry).loc.clone();

                let mut parent = self.program.classes[cid.0].parent.clone();
                let mut duplicate = false;
                while let Some(ParentRef::Program(pid)) = parent {
                    let owner = self.program.classes[pid.0].name.clone();
                    if self.symbols.get(&owner, &format!("{owner}:{short}")).is_some() {
                        duplicate = true;
                        break;
                    }
                    parent = self.program.classes[pid.0].parent.clone();
                }

                if duplicate {
                    self.error(
                        &loc,
                        format!("Declaration name '{short}' defined in a parent class"),
                    );
                }
            }
        }
    }

    // =========================================================================
    // Default-parameter expansion
    // =========================================================================

    /// Validate and expand every method carrying default parameter values.
    pub(crate) fn expand_default_parameters(&mut self) {
        for index in 0..self.program.methods.len() {
            self.add_default_parameter_methods(MethodId(index));
        }
    }

    fn add_default_parameter_methods(&mut self, mid: MethodId) {
        let params = self.program.methods[mid.0].params.clone();
        let defaults: Vec<bool> = params
            .iter()
            .map(|sid| {
                matches!(
                    self.program.stmts[sid.0].kind,
                    StmtKind::Declaration {
                        assignment: Some(_),
                        ..
                    }
                )
            })
            .collect();

        if !defaults.last().copied().unwrap_or(false) {
            return;
        }

        let loc = self.program.methods[mid.0].loc.clone();
        if self.program.methods[mid.0].is_virtual {
            self.error(
                &loc,
                "Virtual methods and interfaces cannot contain default parameter values",
            );
            return;
        }

        // only a trailing run of defaults is valid
        let first_default = defaults.iter().position(|&d| d).unwrap_or(0);
        if defaults[first_default..].iter().any(|&d| !d) {
            self.error(&loc, "Only trailing parameters may have default values");
            return;
        }

        self.generate_parameter_methods(mid, &params, first_default);
    }

    /// One alternate per non-empty prefix of fixed parameters; defaulted
    /// tails become body assignments, and the emitter chains the alternate
    /// into the original.
    fn generate_parameter_methods(
        &mut self,
        mid: MethodId,
        params: &[crate::ast::StmtId],
        first_default: usize,
    ) {
        let template = {
            let m = &self.program.methods[mid.0];
            (
                m.loc.clone(),
                m.cls,
                m.name.clone(),
                m.kind,
                m.is_static,
                m.return_type.clone(),
            )
        };

        for cut in first_default..params.len() {
            let (loc, cls, name, kind, is_static, return_type) = template.clone();
            let mut alt = Method::new(loc.clone(), cls, name, kind, return_type);
            alt.is_static = is_static;
            alt.is_alt = true;
            alt.original = Some(mid);
            alt.params = params[..cut].to_vec();

            for &sid in &params[cut..] {
                if let StmtKind::Declaration {
                    assignment: Some(assign),
                    entry,
                } = &self.program.stmts[sid.0].kind
                {
                    let (assign, entry) = (*assign, *entry);
                    let declared = self.symbols.entry(entry).ty.clone();
                    // the defaulted value adopts the parameter's type
                    if let StmtKind::Assignment { value, .. } = &self.program.stmts[assign.0].kind {
                        let value = *value;
                        self.program.exprs[value.0].eval_type = Some(declared);
                    }
                    alt.statements.push(assign);
                }
            }

            let amid = self.program.add_method(alt);
            self.encode_method_signature(amid);

            let encoded = self.program.methods[amid.0].encoded_name.clone();
            let duplicate = self.program.classes[cls.0]
                .methods
                .iter()
                .any(|m| self.program.methods[m.0].encoded_name == encoded);
            if duplicate {
                let user_name = self.program.methods[mid.0].user_name.clone();
                self.error(
                    &loc,
                    format!("Method or function already overloaded '{user_name}'"),
                );
            } else {
                self.program.classes[cls.0].methods.push(amid);
            }
        }
    }

    // =========================================================================
    // Methods driver
    // =========================================================================

    pub(crate) fn analyze_methods(&mut self, cid: ClassId) {
        self.current_class = Some(cid);

        for mid in self.program.classes[cid.0].methods.clone() {
            self.analyze_method(mid);
        }

        // parent virtual conformance
        match self.program.classes[cid.0].parent.clone() {
            Some(ParentRef::Program(pid)) => {
                if self.program.classes[pid.0].is_virtual
                    && !self.analyze_virtual_methods(cid, pid)
                {
                    let name = self.program.classes[pid.0].name.clone();
                    let loc = self.program.classes[cid.0].loc.clone();
                    self.error(
                        &loc,
                        format!(
                            "Not all virtual methods have been implemented for the class/interface: {name}"
                        ),
                    );
                }
            }
            Some(ParentRef::Library(lib_name)) if lib_name != SYSTEM_BASE_NAME => {
                if let Some(lib) = self.linker.search_class(&lib_name, &self.program.uses).cloned()
                {
                    if lib.is_virtual && !self.analyze_library_virtual_methods(cid, &lib) {
                        let loc = self.program.classes[cid.0].loc.clone();
                        self.error(
                            &loc,
                            format!(
                                "Not all virtual methods have been implemented for the class/interface: {}",
                                lib.name
                            ),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    /// Whether an entry's declared type resolves for use sites; records
    /// the diagnostic when it does not.
    pub(crate) fn check_entry_type(&mut self, entry: crate::ast::EntryId, cid: ClassId) {
        let mut ty = self.symbols.entry(entry).ty.clone();
        if ty.kind == TypeKind::Class {
            let loc = self.symbols.entry(entry).loc.clone();
            if !self.resolve_class_enum_type(&mut ty, cid) {
                self.error(
                    &loc,
                    format!(
                        "Undefined class or enum: '{}'",
                        ty.name.replace('#', "->")
                    ),
                );
            }
            self.symbols.entry_mut(entry).ty = ty;
        }
    }
}
