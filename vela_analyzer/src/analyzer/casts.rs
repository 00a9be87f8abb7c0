//! Cast analysis: the assignment (right-cast) matrix, class-to-class
//! casts, boxing/unboxing synthesis, and generic type equality.

use super::{ClsRef, ContextAnalyzer};
use crate::ast::{ExprId, ExprKind, MethodCallData, ParentRef};
use crate::library::{holder_class_for, is_holder_class};
use vela_core::{SourceLoc, Type, TypeKind, SYSTEM_BASE_NAME};

impl ContextAnalyzer {
    // =========================================================================
    // Right casts
    // =========================================================================

    /// Check that `expression` can flow into a slot of type `left`,
    /// annotating implicit conversions and synthesizing box/unbox calls.
    ///
    /// Returns the replacement expression when one was synthesized.
    pub(crate) fn analyze_right_cast(
        &mut self,
        left: &Type,
        expression: ExprId,
        is_scalar: bool,
    ) -> Option<ExprId> {
        let Some(right) = self.get_expression_type(expression) else {
            return None;
        };
        let loc = self.expr_loc(expression);

        if !is_scalar {
            // arrays: same element kind, same dimensions
            if left.kind != right.kind
                || left.dimension != right.dimension
                || (left.kind == TypeKind::Class && left.name != right.name)
            {
                if right.kind != TypeKind::Nil {
                    self.error(&loc, "Invalid array cast");
                }
            }
            return None;
        }

        match left.kind {
            TypeKind::Var => {
                if right.kind == TypeKind::Var {
                    self.error(&loc, "Invalid operation using classes: Var and Var");
                }
                None
            }

            TypeKind::Nil => {
                self.error(&loc, "Invalid operation with 'Nil' value");
                None
            }

            TypeKind::Byte | TypeKind::Char | TypeKind::Int => {
                self.right_cast_integer(left, &right, expression, &loc)
            }

            TypeKind::Float => match right.kind {
                TypeKind::Float => None,
                TypeKind::Byte | TypeKind::Char | TypeKind::Int => {
                    self.program.exprs[expression.0].cast_type = Some(left.clone());
                    None
                }
                TypeKind::Nil => {
                    if left.dimension < 1 {
                        self.error(&loc, "Invalid cast with classes: System.Float and Nil");
                    }
                    None
                }
                TypeKind::Class => self.unbox_or_error(left, &right, expression, &loc),
                _ => {
                    self.error(
                        &loc,
                        format!("Invalid cast with classes: System.Float and {right}"),
                    );
                    None
                }
            },

            TypeKind::Bool => match right.kind {
                TypeKind::Bool => None,
                TypeKind::Class => self.unbox_or_error(left, &right, expression, &loc),
                _ => {
                    self.error(
                        &loc,
                        format!("Invalid cast with classes: System.Bool and {right}"),
                    );
                    None
                }
            },

            TypeKind::Class => match right.kind {
                TypeKind::Nil => None,
                TypeKind::Bool
                | TypeKind::Byte
                | TypeKind::Char
                | TypeKind::Int
                | TypeKind::Float => {
                    // enums accept their integer values
                    if self.has_program_library_enum(&left.name) {
                        return None;
                    }
                    if is_holder_class(&left.name) {
                        return self.box_expression_to_holder(&right, expression);
                    }
                    self.error(
                        &loc,
                        format!(
                            "Invalid cast with classes: {} and {right}",
                            left.name.replace('#', "->")
                        ),
                    );
                    None
                }
                TypeKind::Class => {
                    self.analyze_class_cast(left, &right, &loc, false);
                    None
                }
                TypeKind::Var => None,
                _ => {
                    self.error(
                        &loc,
                        format!(
                            "Invalid operation using classes: {} and function reference",
                            left.name.replace('#', "->")
                        ),
                    );
                    None
                }
            },

            TypeKind::Func => {
                if right.kind != TypeKind::Func {
                    self.error(&loc, "Invalid operation using a function reference");
                    return None;
                }
                let left_name = left.name.trim_start_matches("m.");
                let right_name = right.name.trim_start_matches("m.");
                if left_name != right_name {
                    self.error(&loc, "Function signatures do not match");
                }
                None
            }

            TypeKind::Alias => None,
        }
    }

    fn right_cast_integer(
        &mut self,
        left: &Type,
        right: &Type,
        expression: ExprId,
        loc: &SourceLoc,
    ) -> Option<ExprId> {
        let left_name = match left.kind {
            TypeKind::Byte => "System.Byte",
            TypeKind::Char => "System.Char",
            _ => "System.Int",
        };
        match right.kind {
            TypeKind::Byte | TypeKind::Char | TypeKind::Int => {
                // narrowing between the integer kinds is implicit
                let is_float = self.program.exprs[expression.0]
                    .eval_type
                    .as_ref()
                    .is_some_and(|t| t.kind == TypeKind::Float);
                if !is_float {
                    self.program.exprs[expression.0].eval_type = Some(left.clone());
                }
                None
            }
            TypeKind::Float => {
                self.program.exprs[expression.0].cast_type = Some(left.clone());
                None
            }
            TypeKind::Nil => {
                if left.dimension < 1 {
                    self.error(loc, format!("Invalid cast with classes: {left_name} and Nil"));
                }
                None
            }
            TypeKind::Class => self.unbox_or_error(left, right, expression, loc),
            TypeKind::Bool => {
                self.error(
                    loc,
                    format!("Invalid cast with classes: {left_name} and System.Bool"),
                );
                None
            }
            TypeKind::Var | TypeKind::Alias => None,
            TypeKind::Func => {
                self.error(
                    loc,
                    format!("Invalid operation using classes: {left_name} and function reference"),
                );
                None
            }
        }
    }

    fn unbox_or_error(
        &mut self,
        left: &Type,
        right: &Type,
        expression: ExprId,
        loc: &SourceLoc,
    ) -> Option<ExprId> {
        if self.has_program_library_enum(&right.name) {
            return None;
        }
        if let Some(unboxed) = self.unboxing_expression(expression) {
            return Some(unboxed);
        }
        self.error(
            loc,
            format!(
                "Invalid cast with classes: {left} and {}",
                right.name.replace('#', "->")
            ),
        );
        None
    }

    // =========================================================================
    // Boxing and unboxing
    // =========================================================================

    /// Synthesize `Holder->New(expr)` for a primitive flowing into a
    /// holder slot.
    pub(crate) fn box_expression_to_holder(
        &mut self,
        from_ty: &Type,
        from: ExprId,
    ) -> Option<ExprId> {
        let holder = holder_class_for(from_ty.kind)?;
        let loc = self.expr_loc(from);

        let call = MethodCallData::new_instance(holder, vec![from]);
        let boxed = self.program.add_expr(crate::ast::Expr::new(
            loc,
            ExprKind::MethodCall(call),
        ));
        self.analyze_method_call(boxed);
        Some(boxed)
    }

    /// Synthesize a `Get()` call unwrapping a holder-typed expression.
    ///
    /// Variables get a fresh `var->Get()` call; call expressions get
    /// `Get()` chained onto them. Other shapes do not unbox.
    pub(crate) fn unboxing_expression(&mut self, from: ExprId) -> Option<ExprId> {
        let from_ty = self.get_expression_type(from)?;
        if from_ty.kind != TypeKind::Class || !is_holder_class(&from_ty.name) {
            return None;
        }
        let loc = self.expr_loc(from);

        match &self.program.exprs[from.0].kind {
            ExprKind::Variable { name, .. } => {
                let call = MethodCallData::method(name.clone(), "Get", vec![]);
                let get = self
                    .program
                    .add_expr(crate::ast::Expr::new(loc, ExprKind::MethodCall(call)));
                self.analyze_method_call(get);
                Some(get)
            }
            ExprKind::MethodCall(_) => {
                let call = MethodCallData::method("", "Get", vec![]);
                let get = self
                    .program
                    .add_expr(crate::ast::Expr::new(loc, ExprKind::MethodCall(call)));
                self.program.exprs[from.0].method_call = Some(get);
                self.analyze_chained_call(from, get);
                Some(from)
            }
            _ => None,
        }
    }

    // =========================================================================
    // Class casts
    // =========================================================================

    /// Validate a class-to-class (or enum) cast.
    pub(crate) fn analyze_class_cast(
        &mut self,
        left: &Type,
        right: &Type,
        loc: &SourceLoc,
        generic_check: bool,
    ) {
        let mut left = left.clone();
        let mut right = right.clone();

        let current_has_generics = self
            .current_class
            .is_some_and(|cid| self.program.classes[cid.0].has_generics());
        if current_has_generics || left.has_generics() || right.has_generics() {
            self.check_generic_equal_types(&left, &right, Some(loc));
        }

        // generic parameters cast through their backing interfaces
        if let Some(cid) = self.current_class {
            for ty in [&mut left, &mut right] {
                if let Some(generic) = self.program.classes[cid.0].generic(&ty.name) {
                    if let Some(backing) = &generic.backing {
                        *ty = backing.clone();
                    }
                }
            }
        }

        let left_is_enum = self.is_known_enum(&left.name);
        let right_is_enum = self.is_known_enum(&right.name);

        if left_is_enum || right_is_enum {
            if left_is_enum && right_is_enum {
                let left_name = self.qualified_enum_name(&left.name);
                let right_name = self.qualified_enum_name(&right.name);
                if left_name != right_name {
                    self.error(
                        loc,
                        format!(
                            "Invalid cast between enums: '{}' and '{}'",
                            left_name.replace('#', "->"),
                            right_name.replace('#', "->")
                        ),
                    );
                }
            } else {
                self.error(loc, "Invalid cast between enum and class");
            }
            return;
        }

        // generic-to-generic casts must name the same parameter
        if let Some(cid) = self.current_class {
            let left_generic = self.program.classes[cid.0].generic(&left.name).is_some();
            let right_generic = self.program.classes[cid.0].generic(&right.name).is_some();
            if left_generic || right_generic {
                if left_generic && right_generic {
                    if left.name != right.name {
                        self.error(
                            loc,
                            format!(
                                "Invalid cast between generics: '{}' and '{}'",
                                left.name, right.name
                            ),
                        );
                    }
                } else {
                    self.error(
                        loc,
                        format!(
                            "Invalid cast between generic: '{}' and class/enum '{}'",
                            left.name, right.name
                        ),
                    );
                }
                return;
            }
        }

        let Some(left_cls) = self.get_program_library_class(&left.name) else {
            self.error(loc, "Invalid class, enum or method call context");
            return;
        };
        let Some(right_cls) = self.get_program_library_class(&right.name) else {
            self.error(loc, "Invalid class, enum or return type cast");
            return;
        };

        let left_name = self.cls_ref_name(&left_cls);

        // downcast: the target appears in the source's parent chain or
        // interfaces
        if self.valid_down_cast(&left_name, &right_cls) {
            self.mark_called(&left_cls);
            self.mark_called(&right_cls);
            return;
        }

        // upcast: resolved at runtime when the target is reachable below
        // the source, or the source is an interface
        let right_is_interface = match &right_cls {
            ClsRef::Program(cid) => self.program.classes[cid.0].is_interface,
            ClsRef::Library(name) => self
                .linker
                .search_class(name, &self.program.uses)
                .is_some_and(|c| c.is_interface),
        };
        if right_is_interface || self.valid_up_cast(&left_name, &right_cls) {
            self.mark_called(&left_cls);
            self.mark_called(&right_cls);
            let _ = generic_check;
            return;
        }

        self.error(
            loc,
            format!(
                "Invalid cast between classes: '{}' and '{}'",
                left.name.replace('#', "->"),
                right.name.replace('#', "->")
            ),
        );
    }

    fn is_known_enum(&self, name: &str) -> bool {
        self.has_program_library_enum(name)
            || self.current_class.is_some_and(|cid| {
                let scoped = format!("{}#{}", self.program.classes[cid.0].name, name);
                self.program.find_enum(&scoped).is_some()
            })
    }

    fn qualified_enum_name(&self, name: &str) -> String {
        if let Some(eid) = self.program.find_enum(name) {
            return self.program.enums[eid.0].name.clone();
        }
        if let Some(cid) = self.current_class {
            let scoped = format!("{}#{}", self.program.classes[cid.0].name, name);
            if let Some(eid) = self.program.find_enum(&scoped) {
                return self.program.enums[eid.0].name.clone();
            }
        }
        self.linker
            .search_enum(name, &self.program.uses)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| name.to_string())
    }

    fn mark_called(&mut self, cls: &ClsRef) {
        if let ClsRef::Program(cid) = cls {
            self.program.classes[cid.0].called = true;
        }
    }

    // =========================================================================
    // Hierarchy walks
    // =========================================================================

    /// Whether `from` (or an ancestor) is `to_name` or implements it.
    pub(crate) fn valid_down_cast(&self, to_name: &str, from: &ClsRef) -> bool {
        if to_name == SYSTEM_BASE_NAME {
            return true;
        }

        let mut cursor = Some(from.clone());
        while let Some(current) = cursor {
            let (name, interface_names, parent) = match &current {
                ClsRef::Program(cid) => {
                    let c = &self.program.classes[cid.0];
                    (
                        c.name.clone(),
                        c.interface_names.clone(),
                        match &c.parent {
                            Some(ParentRef::Program(pid)) => Some(ClsRef::Program(*pid)),
                            Some(ParentRef::Library(lib)) => Some(ClsRef::Library(lib.clone())),
                            None => None,
                        },
                    )
                }
                ClsRef::Library(lib_name) => {
                    match self.linker.search_class(lib_name, &self.program.uses) {
                        Some(lib) => (
                            lib.name.clone(),
                            lib.interface_names.clone(),
                            if lib.parent_name.is_empty() {
                                None
                            } else {
                                Some(ClsRef::Library(lib.parent_name.clone()))
                            },
                        ),
                        None => return false,
                    }
                }
            };

            if name == to_name {
                return true;
            }
            for interface in &interface_names {
                if let Some(cls) = self.get_program_library_class(interface) {
                    if self.cls_ref_name(&cls) == to_name {
                        return true;
                    }
                }
            }

            cursor = parent;
        }

        false
    }

    /// Whether `to_name` is reachable beneath `from` (through children or
    /// interface implementations), making the cast checkable at runtime.
    pub(crate) fn valid_up_cast(&self, to_name: &str, from: &ClsRef) -> bool {
        let from_name = self.cls_ref_name(from);
        if from_name == SYSTEM_BASE_NAME || from_name == to_name {
            return true;
        }

        let (interface_names, children): (Vec<String>, Vec<ClsRef>) = match from {
            ClsRef::Program(cid) => {
                let c = &self.program.classes[cid.0];
                (
                    c.interface_names.clone(),
                    c.children.iter().map(|&id| ClsRef::Program(id)).collect(),
                )
            }
            ClsRef::Library(lib_name) => {
                match self.linker.search_class(lib_name, &self.program.uses) {
                    Some(lib) => (
                        lib.interface_names.clone(),
                        lib.children
                            .iter()
                            .map(|n| ClsRef::Library(n.clone()))
                            .collect(),
                    ),
                    None => return false,
                }
            }
        };

        for interface in &interface_names {
            if let Some(cls) = self.get_program_library_class(interface) {
                if self.cls_ref_name(&cls) == to_name {
                    return true;
                }
            }
        }

        children.iter().any(|child| self.valid_up_cast(to_name, child))
    }

    // =========================================================================
    // Generic equality
    // =========================================================================

    /// Whether two generic-carrying types are compatible: same erased
    /// class, same arity, pairwise-equal arguments after backing-interface
    /// substitution. With a location, mismatches are reported; without,
    /// the check is silent.
    pub(crate) fn check_generic_equal_types(
        &mut self,
        left: &Type,
        right: &Type,
        loc: Option<&SourceLoc>,
    ) -> bool {
        let check_only = loc.is_none();

        let left_cls = self.get_program_library_class(&left.name);
        let right_cls = self.get_program_library_class(&right.name);
        let (Some(left_cls), Some(right_cls)) = (left_cls, right_cls) else {
            return false;
        };
        if self.cls_ref_name(&left_cls) != self.cls_ref_name(&right_cls) {
            return true;
        }

        if left.generics.len() != right.generics.len() {
            if check_only {
                return false;
            }
            self.error(loc.unwrap(), "Concrete size mismatch");
            return true;
        }

        for (left_generic, right_generic) in left.generics.iter().zip(&right.generics) {
            let left_name = self.backed_generic_name(left_generic);
            let right_name = self.backed_generic_name(right_generic);
            if left_name != right_name {
                if check_only {
                    return false;
                }
                self.error(
                    loc.unwrap(),
                    format!(
                        "Cannot map generic/concrete class to concrete class: '{left_name}' and '{right_name}'"
                    ),
                );
            }
        }

        true
    }

    /// A generic argument compares by its backing interface when its class
    /// declares one.
    fn backed_generic_name(&self, ty: &Type) -> String {
        if let Some(cid) = self.current_class {
            if let Some(generic) = self.program.classes[cid.0].generic(&ty.name) {
                if let Some(backing) = &generic.backing {
                    return backing.name.clone();
                }
            }
        }
        match self.get_program_library_class(&ty.name) {
            Some(cls) => self.cls_ref_name(&cls),
            None => ty.name.clone(),
        }
    }
}
