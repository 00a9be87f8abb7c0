//! Method-call analysis and overload selection.
//!
//! Resolution is a scored match of the actual arguments against every
//! candidate signature:
//!
//! - `0`  exact match
//! - `1`  permissible implicit conversion (numeric widening, upcast,
//!   `Nil` to class, enum to int)
//! - `-1` incompatible, candidate rejected
//!
//! Boxing and unboxing are transforms over the argument list computed per
//! candidate; only the winner's transforms are applied to the tree. A
//! candidate whose parameters all match exactly wins outright; otherwise
//! the most exact parameters win, and ties are ambiguous. Unresolved calls
//! retry up the parent chain, then fall back to a variable of function
//! type, and an untyped-lambda argument can derive its type from a sole
//! function-typed candidate.

use super::{ClsRef, ContextAnalyzer};
use crate::ast::{CallTarget, CallType, ClassId, ExprId, ExprKind, MethodId, ParentRef};
use crate::library::{held_type, holder_class_for, is_holder_class, LibraryMethod};
use smallvec::SmallVec;
use vela_core::{Type, TypeKind};

/// Per-candidate parameter scores.
type Scores = SmallVec<[i32; 4]>;

/// Outcome of scoring a candidate list.
#[derive(Debug, PartialEq, Eq)]
pub enum Selection {
    /// Index of the winning candidate.
    Found(usize),
    /// Two or more candidates tied.
    Ambiguous,
    /// No candidate survived.
    None,
}

/// Pick a winner from per-candidate parameter scores.
///
/// Pure over its input: identical score lists always produce the same
/// selection.
pub fn select_overload(matches: &[Scores]) -> Selection {
    let valid: Vec<usize> = matches
        .iter()
        .enumerate()
        .filter(|(_, scores)| scores.iter().all(|&s| s >= 0))
        .map(|(i, _)| i)
        .collect();

    if valid.is_empty() {
        return Selection::None;
    }

    let exact: Vec<usize> = valid
        .iter()
        .copied()
        .filter(|&i| matches[i].iter().all(|&s| s == 0))
        .collect();
    match exact.len() {
        1 => return Selection::Found(exact[0]),
        n if n > 1 => return Selection::Ambiguous,
        _ => {}
    }

    let zeros = |i: usize| matches[i].iter().filter(|&&s| s == 0).count();
    let best = valid.iter().copied().max_by_key(|&i| zeros(i)).unwrap();
    if valid.iter().filter(|&&i| zeros(i) == zeros(best)).count() > 1 {
        return Selection::Ambiguous;
    }
    Selection::Found(best)
}

/// An argument transform the winning candidate requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transform {
    /// Use the argument as written.
    Keep,
    /// Wrap the primitive in its holder class.
    Box,
    /// Unwrap the holder with a synthesized `Get()`.
    Unbox,
}

impl ContextAnalyzer {
    // =========================================================================
    // Entry
    // =========================================================================

    pub(crate) fn analyze_method_call(&mut self, eid: ExprId) {
        let (call_type, variable_name, method_name) = {
            let ExprKind::MethodCall(data) = &self.program.exprs[eid.0].kind else {
                return;
            };
            (
                data.call_type,
                data.variable_name.clone(),
                data.method_name.clone(),
            )
        };
        let loc = self.expr_loc(eid);

        match call_type {
            CallType::Parent => self.analyze_parent_call(eid),
            CallType::EnumItem => self.analyze_enum_call(eid, &variable_name, &method_name),
            CallType::NewArray => self.analyze_new_array_call(eid),
            CallType::NewInstance => {
                if let Some(cid) = self.search_program_classes(&variable_name) {
                    self.analyze_program_method_call(cid, eid, false);
                } else if let Some(lib) = self
                    .linker
                    .search_class(&variable_name, &self.program.uses)
                    .map(|c| c.name.clone())
                {
                    self.analyze_library_method_call(&lib, eid, false);
                } else {
                    self.error(&loc, format!("Undefined class: '{variable_name}'"));
                }
            }
            CallType::Method => {
                // receiver resolution order: variable, program class,
                // library class, enum
                if let Some(entry) = self.get_entry(&variable_name) {
                    if let ExprKind::MethodCall(data) = &mut self.program.exprs[eid.0].kind {
                        data.entry = Some(entry);
                    }
                    let receiver = self.symbols.entry(entry).ty.clone();
                    match receiver.kind {
                        TypeKind::Class => {
                            if let Some(cid) = self.search_program_classes(&receiver.name) {
                                self.analyze_program_method_call(cid, eid, true);
                            } else if let Some(lib) = self
                                .linker
                                .search_class(&receiver.name, &self.program.uses)
                                .map(|c| c.name.clone())
                            {
                                self.analyze_library_method_call(&lib, eid, true);
                            } else {
                                self.error(
                                    &loc,
                                    format!("Undefined class or enum: '{}'", receiver.name),
                                );
                            }
                        }
                        TypeKind::Func => self.analyze_variable_function_call(eid, entry),
                        _ => self.error(&loc, "Invalid method call context"),
                    }
                } else if let Some(cid) = self.search_program_classes(&variable_name) {
                    self.analyze_program_method_call(cid, eid, false);
                } else if let Some(lib) = self
                    .linker
                    .search_class(&variable_name, &self.program.uses)
                    .map(|c| c.name.clone())
                {
                    self.analyze_library_method_call(&lib, eid, false);
                } else if self.has_program_library_enum(&variable_name) {
                    self.analyze_enum_call(eid, &variable_name, &method_name);
                } else if variable_name.is_empty() {
                    // unqualified call on the current class
                    if let Some(cid) = self.current_class {
                        self.analyze_program_method_call(cid, eid, true);
                    }
                } else {
                    self.error(
                        &loc,
                        format!("Undefined class reference: '{variable_name}'"),
                    );
                }
            }
        }
    }

    /// A chained postfix call evaluates against the receiver's type.
    pub(crate) fn analyze_chained_call(&mut self, receiver: ExprId, chained: ExprId) {
        if self.program.exprs[chained.0].eval_type.is_some() {
            return;
        }
        let loc = self.expr_loc(chained);
        let Some(receiver_ty) = self.program.exprs[receiver.0]
            .effective_type()
            .cloned()
        else {
            return;
        };

        if receiver_ty.kind != TypeKind::Class {
            self.error(&loc, "Invalid method call context");
            return;
        }

        if let Some(cid) = self.search_program_classes(&receiver_ty.name) {
            self.analyze_program_method_call(cid, chained, true);
        } else if let Some(lib) = self
            .linker
            .search_class(&receiver_ty.name, &self.program.uses)
            .map(|c| c.name.clone())
        {
            self.analyze_library_method_call(&lib, chained, true);
        } else if self.has_program_library_enum(&receiver_ty.name) {
            self.error(&loc, "Invalid enum reference");
        } else {
            self.error(
                &loc,
                format!("Undefined class or enum: '{}'", receiver_ty.name),
            );
        }
    }

    // =========================================================================
    // Special call shapes
    // =========================================================================

    fn analyze_parent_call(&mut self, eid: ExprId) {
        let loc = self.expr_loc(eid);
        let Some(cid) = self.current_class else {
            return;
        };
        match self.program.classes[cid.0].parent.clone() {
            Some(ParentRef::Program(pid)) => self.analyze_program_method_call(pid, eid, true),
            Some(ParentRef::Library(lib_name)) => {
                self.analyze_library_method_call(&lib_name, eid, true)
            }
            None => self.error(&loc, "Class has no parent to call"),
        }
    }

    fn analyze_enum_call(&mut self, eid: ExprId, enum_name: &str, item_name: &str) {
        let loc = self.expr_loc(eid);

        // program enum, bare or class-scoped
        let scoped = self
            .current_class
            .map(|cid| format!("{}#{}", self.program.classes[cid.0].name, enum_name));
        let found = self
            .search_program_enums(enum_name)
            .or_else(|| scoped.as_deref().and_then(|s| self.search_program_enums(s)));

        if let Some(enum_id) = found {
            let qualified = self.program.enums[enum_id.0].name.clone();
            match self.program.enums[enum_id.0].item(item_name) {
                Some(value) => self.set_enum_result(eid, &qualified, item_name, value),
                None => self.error(&loc, format!("Undefined enum item: '{item_name}'")),
            }
            return;
        }

        if let Some(lib_enum) = self
            .linker
            .search_enum(enum_name, &self.program.uses)
            .cloned()
        {
            match lib_enum.items.get(item_name) {
                Some(&value) => self.set_enum_result(eid, &lib_enum.name, item_name, value),
                None => self.error(&loc, format!("Undefined enum item: '{item_name}'")),
            }
            return;
        }

        self.error(&loc, format!("Undefined enum: '{enum_name}'"));
    }

    fn set_enum_result(&mut self, eid: ExprId, enum_name: &str, _item: &str, value: i64) {
        let mut ty = Type::class(enum_name);
        ty.resolved = true;
        if let ExprKind::MethodCall(data) = &mut self.program.exprs[eid.0].kind {
            data.enum_item = Some((enum_name.to_string(), value));
        }
        self.program.exprs[eid.0].eval_type = Some(ty);
    }

    fn analyze_new_array_call(&mut self, eid: ExprId) {
        let params = match &self.program.exprs[eid.0].kind {
            ExprKind::MethodCall(data) => data.params.clone(),
            _ => return,
        };
        for param in params {
            self.analyze_expression(param);
            if !self.is_integer_expression(param) {
                let loc = self.expr_loc(param);
                self.error(&loc, "Expected an integer dimension size");
            }
        }
    }

    // =========================================================================
    // Program-class calls
    // =========================================================================

    pub(crate) fn analyze_program_method_call(
        &mut self,
        klass: ClassId,
        eid: ExprId,
        is_expr: bool,
    ) {
        self.check_lambda_inferred_types(eid);

        let params = match &self.program.exprs[eid.0].kind {
            ExprKind::MethodCall(data) => data.params.clone(),
            _ => return,
        };
        for param in &params {
            self.analyze_expression(*param);
        }

        let method = self.resolve_method_call(klass, eid).or_else(|| {
            // last chance: exact encoded-name lookup
            let (method_name, encoded_args) = {
                let ExprKind::MethodCall(data) = &self.program.exprs[eid.0].kind else {
                    return None;
                };
                (data.method_name.clone(), self.encode_method_call(&data.params))
            };
            let cls_name = self.program.classes[klass.0].name.clone();
            let encoded = format!("{cls_name}:{method_name}:{encoded_args}");
            self.program.classes[klass.0]
                .methods
                .iter()
                .copied()
                .find(|m| self.program.methods[m.0].encoded_name == encoded)
        });

        let Some(method) = method else {
            // retry up the hierarchy, then as a variable-function call
            match self.program.classes[klass.0].parent.clone() {
                Some(ParentRef::Program(pid)) => {
                    if let ExprKind::MethodCall(data) = &mut self.program.exprs[eid.0].kind {
                        data.original_class.get_or_insert(klass);
                    }
                    self.analyze_program_method_call(pid, eid, is_expr);
                }
                Some(ParentRef::Library(lib_name)) => {
                    if let ExprKind::MethodCall(data) = &mut self.program.exprs[eid.0].kind {
                        data.original_class.get_or_insert(klass);
                    }
                    self.analyze_library_method_call(&lib_name, eid, is_expr);
                }
                None => {
                    let entry = {
                        let ExprKind::MethodCall(data) = &self.program.exprs[eid.0].kind else {
                            return;
                        };
                        self.get_entry(&data.method_name)
                    };
                    match entry {
                        Some(entry)
                            if self.symbols.entry(entry).ty.kind == TypeKind::Func =>
                        {
                            self.analyze_variable_function_call(eid, entry)
                        }
                        _ => self.report_unresolved_call(eid),
                    }
                }
            }
            return;
        };

        self.finish_program_call(klass, eid, method, is_expr);
    }

    fn finish_program_call(
        &mut self,
        klass: ClassId,
        eid: ExprId,
        method: MethodId,
        is_expr: bool,
    ) {
        let loc = self.expr_loc(eid);
        let (m_kind, m_static, m_return, m_cls) = {
            let m = &self.program.methods[method.0];
            (m.kind, m.is_static, m.return_type.clone(), m.cls)
        };

        // private methods are reachable only through the parent chain
        if let Some(current_mid) = self.current_method {
            let caller_cls = self.program.methods[current_mid.0].cls;
            if m_cls != caller_cls && !m_static && m_kind.is_private() {
                let mut reachable = false;
                let mut parent = self.program.classes[caller_cls.0].parent.clone();
                while let Some(ParentRef::Program(pid)) = parent {
                    if pid == m_cls {
                        reachable = true;
                        break;
                    }
                    parent = self.program.classes[pid.0].parent.clone();
                }
                if !reachable {
                    self.error(&loc, "Cannot reference a private method from this context");
                }
            }
        }

        // bundle visibility
        let (is_public, bundle_name, is_virtual_cls) = {
            let c = &self.program.classes[klass.0];
            (c.is_public, c.bundle_name.clone(), c.is_virtual || c.is_interface)
        };
        if let Some(current_cid) = self.current_class {
            if !is_public && self.program.classes[current_cid.0].bundle_name != bundle_name {
                let name = self.program.classes[klass.0].name.clone();
                self.error(
                    &loc,
                    format!("Cannot access private class '{name}' from this bundle scope"),
                );
            }
        }

        // instance calls need an instance
        let has_receiver = {
            let ExprKind::MethodCall(data) = &self.program.exprs[eid.0].kind else {
                return;
            };
            data.entry.is_some()
        };
        let caller_static = self
            .current_method
            .is_some_and(|mid| self.program.methods[mid.0].is_static);
        if !is_expr && !has_receiver && caller_static && !m_static && !m_kind.is_new() {
            self.error(&loc, "Cannot reference an instance method from this context");
        }

        // virtual classes cannot be instantiated
        if m_kind.is_new() && is_virtual_cls {
            let parent_is_klass = self.current_class.is_some_and(|cid| {
                self.program.classes[cid.0].parent == Some(ParentRef::Program(klass))
            });
            if !parent_is_klass {
                self.error(
                    &loc,
                    "Cannot create an instance of a virtual class or interface",
                );
            }
        }

        self.program.classes[klass.0].called = true;
        if let ExprKind::MethodCall(data) = &mut self.program.exprs[eid.0].kind {
            data.original_class.get_or_insert(klass);
            data.target = Some(CallTarget::Program(method));
        }

        // concrete generics for instantiations and self-typed returns
        let has_generics = self.program.classes[klass.0].has_generics();
        let mut eval_type = m_return.clone();
        if has_generics {
            let cls_name = self.program.classes[klass.0].name.clone();
            let same_cls_return = m_return.kind == TypeKind::Class && m_return.name == cls_name;
            let concrete_types = self.concrete_types_for_call(eid);
            if m_kind.is_new() || same_cls_return {
                if concrete_types.len() != self.program.classes[klass.0].generics.len() {
                    self.error(
                        &loc,
                        format!("Cannot create an unqualified instance of class: '{cls_name}'"),
                    );
                } else {
                    self.validate_generic_concrete_mapping(
                        &concrete_types,
                        &ClsRef::Program(klass),
                        &loc,
                    );
                }
            }
            eval_type = self.resolve_generic_type(&m_return, eid, &ClsRef::Program(klass), true);
            if (m_kind.is_new() || same_cls_return) && eval_type.kind == TypeKind::Class {
                eval_type.generics = concrete_types;
            }
        }

        if eval_type.kind == TypeKind::Class {
            let mut resolved = eval_type.clone();
            let context = self.current_class.unwrap_or(klass);
            if !self.resolve_class_enum_type(&mut resolved, context) {
                self.error(
                    &loc,
                    format!(
                        "Undefined class or enum: '{}'",
                        resolved.name.replace('#', "->")
                    ),
                );
            }
            eval_type = resolved;
        }

        self.program.exprs[eid.0].eval_type = Some(eval_type);
    }

    fn report_unresolved_call(&mut self, eid: ExprId) {
        let loc = self.expr_loc(eid);
        let name = {
            let ExprKind::MethodCall(data) = &self.program.exprs[eid.0].kind else {
                return;
            };
            if data.method_name.is_empty() {
                data.variable_name.clone()
            } else {
                data.method_name.clone()
            }
        };
        let mut message = format!(
            "Undefined function/method call: '{name}(..)'\n\tEnsure the object and it's calling parameters are properly casted"
        );
        if !self.alt_error_method_names.is_empty() {
            message.push_str("\n\tAlternatives:");
            for alt in std::mem::take(&mut self.alt_error_method_names) {
                message.push_str("\n\t\t");
                message.push_str(&alt);
            }
        }
        self.error(&loc, message);
    }

    // =========================================================================
    // Overload resolution, program classes
    // =========================================================================

    fn resolve_method_call(&mut self, klass: ClassId, eid: ExprId) -> Option<MethodId> {
        let (method_name, params) = {
            let ExprKind::MethodCall(data) = &self.program.exprs[eid.0].kind else {
                return None;
            };
            (data.method_name.clone(), data.params.clone())
        };

        let candidates: Vec<MethodId> = self.program.classes[klass.0]
            .methods
            .iter()
            .copied()
            .filter(|m| {
                let method = &self.program.methods[m.0];
                method.user_name == method_name && method.params.len() == params.len()
            })
            .collect();

        let mut matches: Vec<Scores> = Vec::new();
        let mut transforms: Vec<Vec<Transform>> = Vec::new();
        for &candidate in &candidates {
            let formals = self.program_formal_types(candidate, eid, klass);
            let (scores, candidate_transforms) = self.score_candidate(&params, &formals);
            matches.push(scores);
            transforms.push(candidate_transforms);
        }

        match select_overload(&matches) {
            Selection::Found(index) => {
                let winner = candidates[index];
                let formals = self.program_formal_types(winner, eid, klass);
                self.apply_transforms(eid, &params, &transforms[index]);
                self.cast_arguments(eid, &formals);
                Some(winner)
            }
            Selection::Ambiguous => {
                let loc = self.expr_loc(eid);
                self.error(
                    &loc,
                    format!("Ambiguous function/method call: '{method_name}(..)'"),
                );
                None
            }
            Selection::None => {
                // derived lambda: one candidate whose sole parameter is a
                // function type can type an untyped lambda argument
                if let Some(&candidate) = candidates.first() {
                    if candidates.len() == 1 {
                        if let Some(derived) = self.derive_lambda_for_program(candidate, eid, klass)
                        {
                            return Some(derived);
                        }
                    }
                }
                self.alt_error_method_names = candidates
                    .iter()
                    .map(|m| self.program.methods[m.0].encoded_name.clone())
                    .collect();
                None
            }
        }
    }

    fn program_formal_types(&mut self, method: MethodId, eid: ExprId, klass: ClassId) -> Vec<Type> {
        let param_stmts = self.program.methods[method.0].params.clone();
        let mut formals = Vec::with_capacity(param_stmts.len());
        for sid in param_stmts {
            let ty = match &self.program.stmts[sid.0].kind {
                crate::ast::StmtKind::Declaration { entry, .. } => {
                    self.symbols.entry(*entry).ty.clone()
                }
                _ => Type::nil(),
            };
            formals.push(self.resolve_generic_type(&ty, eid, &ClsRef::Program(klass), false));
        }
        formals
    }

    fn derive_lambda_for_program(
        &mut self,
        candidate: MethodId,
        eid: ExprId,
        klass: ClassId,
    ) -> Option<MethodId> {
        let (Some(lambda), Some(call)) = self.lambda_inferred else {
            return None;
        };
        if call != eid {
            return None;
        }

        let formals = self.program_formal_types(candidate, eid, klass);
        let [formal] = formals.as_slice() else {
            return None;
        };
        if formal.kind != TypeKind::Func {
            return None;
        }

        let params: Vec<Type> = formal
            .func_params
            .iter()
            .map(|p| self.resolve_generic_type(p, eid, &ClsRef::Program(klass), false))
            .collect();
        let ret = formal
            .func_return
            .as_deref()
            .map(|r| self.resolve_generic_type(r, eid, &ClsRef::Program(klass), false))
            .unwrap_or_else(Type::nil);

        self.build_lambda_function(lambda, &Type::func(params, ret));
        self.lambda_inferred = (None, None);
        Some(candidate)
    }

    // =========================================================================
    // Library-class calls
    // =========================================================================

    pub(crate) fn analyze_library_method_call(
        &mut self,
        lib_name: &str,
        eid: ExprId,
        _is_expr: bool,
    ) {
        self.check_lambda_inferred_types(eid);

        let params = match &self.program.exprs[eid.0].kind {
            ExprKind::MethodCall(data) => data.params.clone(),
            _ => return,
        };
        for param in &params {
            self.analyze_expression(*param);
        }

        let Some(lib) = self.linker.search_class(lib_name, &self.program.uses).cloned() else {
            let loc = self.expr_loc(eid);
            self.error(&loc, format!("Undefined class or enum: '{lib_name}'"));
            return;
        };

        let (call_type, method_name) = {
            let ExprKind::MethodCall(data) = &self.program.exprs[eid.0].kind else {
                return;
            };
            (data.call_type, data.method_name.clone())
        };
        let lookup_name = if call_type == CallType::Parent {
            "New".to_string()
        } else {
            method_name.clone()
        };

        let candidates: Vec<LibraryMethod> = lib
            .methods_named(&lookup_name)
            .into_iter()
            .filter(|m| m.param_types.len() == params.len())
            .cloned()
            .collect();

        let mut matches: Vec<Scores> = Vec::new();
        let mut transforms: Vec<Vec<Transform>> = Vec::new();
        for candidate in &candidates {
            let formals: Vec<Type> = candidate
                .param_types
                .iter()
                .map(|t| self.resolve_generic_type(t, eid, &ClsRef::Library(lib.name.clone()), false))
                .collect();
            let (scores, candidate_transforms) = self.score_candidate(&params, &formals);
            matches.push(scores);
            transforms.push(candidate_transforms);
        }

        match select_overload(&matches) {
            Selection::Found(index) => {
                let winner = candidates[index].clone();
                let formals: Vec<Type> = winner
                    .param_types
                    .iter()
                    .map(|t| {
                        self.resolve_generic_type(t, eid, &ClsRef::Library(lib.name.clone()), false)
                    })
                    .collect();
                self.apply_transforms(eid, &params, &transforms[index]);
                self.cast_arguments(eid, &formals);

                let mut eval_type = self.resolve_generic_type(
                    &winner.return_type,
                    eid,
                    &ClsRef::Library(lib.name.clone()),
                    true,
                );
                if lib.has_generics() && winner.is_new {
                    let concrete_types = self.concrete_types_for_call(eid);
                    let loc = self.expr_loc(eid);
                    if concrete_types.len() != lib.generics.len() {
                        self.error(
                            &loc,
                            format!(
                                "Cannot create an unqualified instance of class: '{}'",
                                lib.name
                            ),
                        );
                    } else {
                        self.validate_generic_concrete_mapping(
                            &concrete_types,
                            &ClsRef::Library(lib.name.clone()),
                            &loc,
                        );
                        if eval_type.kind == TypeKind::Class {
                            eval_type.generics = concrete_types;
                        }
                    }
                }

                if let ExprKind::MethodCall(data) = &mut self.program.exprs[eid.0].kind {
                    data.target = Some(CallTarget::Library(
                        lib.name.clone(),
                        winner.encoded_name.clone(),
                    ));
                }
                self.program.exprs[eid.0].eval_type = Some(eval_type);
            }
            Selection::Ambiguous => {
                let loc = self.expr_loc(eid);
                self.error(
                    &loc,
                    format!("Ambiguous function/method call: '{lookup_name}(..)'"),
                );
            }
            Selection::None => {
                if candidates.len() == 1 {
                    if let Some(winner) =
                        self.derive_lambda_for_library(&candidates[0], eid, &lib.name)
                    {
                        if let ExprKind::MethodCall(data) = &mut self.program.exprs[eid.0].kind {
                            data.target = Some(CallTarget::Library(
                                lib.name.clone(),
                                winner.encoded_name.clone(),
                            ));
                        }
                        self.program.exprs[eid.0].eval_type = Some(winner.return_type.clone());
                        return;
                    }
                }

                // retry the library parent chain
                if !lib.parent_name.is_empty() {
                    let parent = lib.parent_name.clone();
                    self.analyze_library_method_call(&parent, eid, _is_expr);
                    return;
                }

                self.alt_error_method_names =
                    candidates.iter().map(|m| m.encoded_name.clone()).collect();
                self.report_unresolved_call(eid);
            }
        }
    }

    fn derive_lambda_for_library(
        &mut self,
        candidate: &LibraryMethod,
        eid: ExprId,
        lib_name: &str,
    ) -> Option<LibraryMethod> {
        let (Some(lambda), Some(call)) = self.lambda_inferred else {
            return None;
        };
        if call != eid {
            return None;
        }
        let [formal] = candidate.param_types.as_slice() else {
            return None;
        };
        if formal.kind != TypeKind::Func {
            return None;
        }

        let cls_ref = ClsRef::Library(lib_name.to_string());
        let params: Vec<Type> = formal
            .func_params
            .iter()
            .map(|p| self.resolve_generic_type(p, eid, &cls_ref, false))
            .collect();
        let ret = formal
            .func_return
            .as_deref()
            .map(|r| self.resolve_generic_type(r, eid, &cls_ref, false))
            .unwrap_or_else(Type::nil);

        self.build_lambda_function(lambda, &Type::func(params, ret));
        self.lambda_inferred = (None, None);
        Some(candidate.clone())
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    fn score_candidate(
        &mut self,
        params: &[ExprId],
        formals: &[Type],
    ) -> (Scores, Vec<Transform>) {
        let mut scores = Scores::new();
        let mut transforms = Vec::with_capacity(params.len());

        for (&param, formal) in params.iter().zip(formals) {
            let calling = self.get_expression_type(param);
            let (effective, transform) = match calling {
                Some(calling) => self.boxed_calling_type(&calling, formal),
                None => {
                    scores.push(-1);
                    transforms.push(Transform::Keep);
                    continue;
                }
            };
            let scalar = self.is_scalar(param);
            scores.push(self.match_param(&effective, scalar, formal));
            transforms.push(transform);
        }

        (scores, transforms)
    }

    /// The type a candidate scores against after boxing or unboxing the
    /// actual toward the formal.
    fn boxed_calling_type(&self, calling: &Type, formal: &Type) -> (Type, Transform) {
        if formal.kind == TypeKind::Class
            && formal.dimension == 0
            && is_holder_class(&formal.name)
            && calling.kind.is_primitive()
            && calling.dimension == 0
        {
            if let Some(holder) = holder_class_for(calling.kind) {
                let mut boxed = Type::class(holder);
                boxed.resolved = true;
                return (boxed, Transform::Box);
            }
        }

        if formal.kind.is_primitive()
            && calling.kind == TypeKind::Class
            && calling.dimension == 0
            && is_holder_class(&calling.name)
        {
            if let Some(held) = held_type(&calling.name) {
                return (held, Transform::Unbox);
            }
        }

        (calling.clone(), Transform::Keep)
    }

    /// Score one actual against one formal.
    pub(crate) fn match_param(&mut self, calling: &Type, calling_scalar: bool, formal: &Type) -> i32 {
        // arrays: kind and dimensionality must line up exactly
        if !calling_scalar || calling.dimension > 0 {
            if calling.kind == formal.kind && calling.dimension == formal.dimension {
                if calling.kind == TypeKind::Class {
                    return if self.class_enum_names_match(calling, formal) {
                        0
                    } else {
                        -1
                    };
                }
                return 0;
            }
            return -1;
        }

        // exact primitive match
        if calling.kind != TypeKind::Class
            && formal.kind != TypeKind::Class
            && calling.kind != TypeKind::Func
            && formal.kind != TypeKind::Func
            && formal.dimension == 0
            && calling.kind == formal.kind
        {
            return 0;
        }

        if formal.dimension != 0 {
            return -1;
        }

        match calling.kind {
            TypeKind::Nil => {
                if formal.kind == TypeKind::Class {
                    1
                } else {
                    -1
                }
            }

            TypeKind::Bool => -1,

            TypeKind::Byte | TypeKind::Char | TypeKind::Int | TypeKind::Float => match formal.kind
            {
                TypeKind::Byte | TypeKind::Char | TypeKind::Int | TypeKind::Float => 1,
                _ => -1,
            },

            TypeKind::Class => {
                if formal.kind == TypeKind::Class {
                    if self.class_enum_names_match(calling, formal) {
                        if calling.has_generics() || formal.has_generics() {
                            return if self.check_generic_equal_types(calling, formal, None) {
                                0
                            } else {
                                -1
                            };
                        }
                        return 0;
                    }
                    // relative match: the actual's class derives from the
                    // formal's
                    let from = self.get_program_library_class(&calling.name);
                    if let Some(from) = from {
                        let to_name = self
                            .get_program_library_class(&formal.name)
                            .map(|r| self.cls_ref_name(&r));
                        if let Some(to_name) = to_name {
                            return if self.valid_down_cast(&to_name, &from) { 1 } else { -1 };
                        }
                    }
                    -1
                } else if formal.kind == TypeKind::Int {
                    // enums pass as integers
                    if self.has_program_library_enum(&calling.name) {
                        1
                    } else {
                        -1
                    }
                } else {
                    -1
                }
            }

            TypeKind::Func => {
                if formal.kind != TypeKind::Func {
                    return -1;
                }
                let calling_name = if calling.name.is_empty() {
                    vela_core::encode_function_type(
                        &calling.func_params,
                        calling.func_return.as_deref(),
                    )
                } else {
                    calling.name.trim_start_matches("m.").to_string()
                };
                let formal_name = if formal.name.is_empty() {
                    vela_core::encode_function_type(
                        &formal.func_params,
                        formal.func_return.as_deref(),
                    )
                } else {
                    formal.name.trim_start_matches("m.").to_string()
                };
                if calling_name == formal_name {
                    0
                } else {
                    -1
                }
            }

            TypeKind::Alias | TypeKind::Var => -1,
        }
    }

    pub(crate) fn cls_ref_name(&self, cls: &ClsRef) -> String {
        match cls {
            ClsRef::Program(cid) => self.program.classes[cid.0].name.clone(),
            ClsRef::Library(name) => name.clone(),
        }
    }

    /// Whether two class/enum types name the same resolved class or enum.
    fn class_enum_names_match(&mut self, calling: &Type, formal: &Type) -> bool {
        let resolve = |analyzer: &ContextAnalyzer, name: &str| -> Option<String> {
            if let Some(cid) = analyzer.search_program_classes(name) {
                return Some(analyzer.program.classes[cid.0].name.clone());
            }
            if let Some(cid) = analyzer.current_class {
                if analyzer.program.classes[cid.0].generic(name).is_some() {
                    return Some(name.to_string());
                }
            }
            if let Some(lib) = analyzer.linker.search_class(name, &analyzer.program.uses) {
                return Some(lib.name.clone());
            }
            if let Some(eid) = analyzer.search_program_enums(name) {
                return Some(analyzer.program.enums[eid.0].name.clone());
            }
            analyzer
                .linker
                .search_enum(name, &analyzer.program.uses)
                .map(|e| e.name.clone())
        };

        match (resolve(self, &calling.name), resolve(self, &formal.name)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    // =========================================================================
    // Transforms and final casts
    // =========================================================================

    fn apply_transforms(&mut self, eid: ExprId, params: &[ExprId], transforms: &[Transform]) {
        for (index, (&param, &transform)) in params.iter().zip(transforms).enumerate() {
            let replacement = match transform {
                Transform::Keep => None,
                Transform::Box => {
                    let ty = self.get_expression_type(param);
                    ty.and_then(|t| self.box_expression_to_holder(&t, param))
                }
                Transform::Unbox => self.unboxing_expression(param),
            };
            if let Some(replacement) = replacement {
                if let ExprKind::MethodCall(data) = &mut self.program.exprs[eid.0].kind {
                    data.params[index] = replacement;
                }
            }
        }
    }

    fn cast_arguments(&mut self, eid: ExprId, formals: &[Type]) {
        let params = match &self.program.exprs[eid.0].kind {
            ExprKind::MethodCall(data) => data.params.clone(),
            _ => return,
        };
        for (&param, formal) in params.iter().zip(formals) {
            // a call that produces Nil cannot be an argument
            if let ExprKind::MethodCall(_) = &self.program.exprs[param.0].kind {
                if self.program.exprs[param.0].eval_type.as_ref().map(|t| t.kind)
                    == Some(TypeKind::Nil)
                {
                    let loc = self.expr_loc(param);
                    self.error(&loc, "Invalid operation with 'Nil' value");
                }
            }
            let is_scalar = self.is_scalar(param);
            if let Some(replacement) = self.analyze_right_cast(formal, param, is_scalar) {
                let index = params.iter().position(|&p| p == param).unwrap();
                if let ExprKind::MethodCall(data) = &mut self.program.exprs[eid.0].kind {
                    data.params[index] = replacement;
                }
            }
        }
    }

    // =========================================================================
    // Variable-function calls
    // =========================================================================

    /// Call through a variable of function type.
    fn analyze_variable_function_call(&mut self, eid: ExprId, entry: crate::ast::EntryId) {
        let loc = self.expr_loc(eid);
        let func = self.symbols.entry(entry).ty.clone();
        let params = match &self.program.exprs[eid.0].kind {
            ExprKind::MethodCall(data) => data.params.clone(),
            _ => return,
        };

        if func.func_params.len() != params.len() {
            self.error(&loc, "Function reference parameter size mismatch");
            return;
        }

        for param in &params {
            self.analyze_expression(*param);
        }
        let formals = func.func_params.clone();
        self.cast_arguments(eid, &formals);

        if let ExprKind::MethodCall(data) = &mut self.program.exprs[eid.0].kind {
            data.target = Some(CallTarget::Variable(entry));
        }
        let eval = func.func_return.as_deref().cloned().unwrap_or_else(Type::nil);
        self.program.exprs[eid.0].eval_type = Some(eval);
    }

    // =========================================================================
    // Support
    // =========================================================================

    /// Remember calls whose single argument is an untyped lambda; the
    /// derived-lambda path may type it later.
    fn check_lambda_inferred_types(&mut self, eid: ExprId) {
        let ExprKind::MethodCall(data) = &self.program.exprs[eid.0].kind else {
            return;
        };
        let single_lambda = data.params.len() == 1
            && matches!(
                self.program.exprs[data.params[0].0].kind,
                ExprKind::Lambda { .. }
            );
        if single_lambda {
            self.lambda_inferred.1 = Some(eid);
        } else {
            self.lambda_inferred = (None, None);
        }
    }

    /// The encoded argument list of a call site, for exact-name lookup.
    fn encode_method_call(&self, params: &[ExprId]) -> String {
        let mut encoded = String::new();
        for &param in params {
            let Some(ty) = self.program.exprs[param.0]
                .cast_type
                .clone()
                .or_else(|| self.program.exprs[param.0].eval_type.clone())
            else {
                continue;
            };
            encoded.push_str(&ty.encode());
            if !self.is_scalar(param) {
                for _ in 0..ty.dimension {
                    encoded.push('*');
                }
            }
            encoded.push(',');
        }
        encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_select_exact_wins_outright() {
        let matches: Vec<Scores> = vec![smallvec![1, 0], smallvec![0, 0]];
        assert_eq!(select_overload(&matches), Selection::Found(1));
    }

    #[test]
    fn test_select_rejects_incompatible() {
        let matches: Vec<Scores> = vec![smallvec![0, -1], smallvec![1, 1]];
        assert_eq!(select_overload(&matches), Selection::Found(1));
    }

    #[test]
    fn test_select_ambiguous_tie() {
        let matches: Vec<Scores> = vec![smallvec![0, 1], smallvec![1, 0]];
        assert_eq!(select_overload(&matches), Selection::Ambiguous);
    }

    #[test]
    fn test_select_none() {
        let matches: Vec<Scores> = vec![smallvec![-1], smallvec![-1]];
        assert_eq!(select_overload(&matches), Selection::None);
    }

    #[test]
    fn test_select_deterministic() {
        let matches: Vec<Scores> = vec![smallvec![1, 0, 0], smallvec![0, 1, 1]];
        let first = select_overload(&matches);
        for _ in 0..10 {
            assert_eq!(select_overload(&matches), first);
        }
    }
}
