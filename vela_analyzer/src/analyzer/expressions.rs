//! Expression analysis: literals, variables (including lambda captures
//! and `Var` inference), calculations, conditionals and type tests.

use super::ContextAnalyzer;
use crate::ast::{ExprId, ExprKind};
use crate::symbols::SymbolEntry;
use vela_core::{Type, TypeKind};

impl ContextAnalyzer {
    // =========================================================================
    // Dispatch
    // =========================================================================

    pub(crate) fn analyze_expression(&mut self, eid: ExprId) {
        match &self.program.exprs[eid.0].kind {
            ExprKind::IntLit(_) => self.program.exprs[eid.0].eval_type = Some(Type::int()),
            ExprKind::FloatLit(_) => self.program.exprs[eid.0].eval_type = Some(Type::float()),
            ExprKind::CharLit(_) => self.program.exprs[eid.0].eval_type = Some(Type::char()),
            ExprKind::BoolLit(_) => self.program.exprs[eid.0].eval_type = Some(Type::bool()),
            ExprKind::Nil => self.program.exprs[eid.0].eval_type = Some(Type::nil()),
            ExprKind::StringLit(_) => {
                let mut ty = Type::class("System.String");
                ty.resolved = true;
                self.program.exprs[eid.0].eval_type = Some(ty);
            }

            ExprKind::Variable { .. } => self.analyze_variable(eid),
            ExprKind::Calc { .. } => self.analyze_calculation(eid),
            ExprKind::Cond { .. } => self.analyze_conditional(eid),
            ExprKind::MethodCall(_) => self.analyze_method_call(eid),
            ExprKind::Lambda { .. } => self.analyze_lambda(eid),
            ExprKind::TypeOf { .. } => self.analyze_type_of(eid),
        }

        // chained postfix calls evaluate against this expression's type
        if let Some(chained) = self.program.exprs[eid.0].method_call {
            self.analyze_chained_call(eid, chained);
        }
    }

    // =========================================================================
    // Variables
    // =========================================================================

    pub(crate) fn analyze_variable(&mut self, eid: ExprId) {
        let (pre_stmt, post_stmt) = match &self.program.exprs[eid.0].kind {
            ExprKind::Variable {
                pre_stmt,
                post_stmt,
                ..
            } => (*pre_stmt, *post_stmt),
            _ => return,
        };

        self.resolve_variable(eid);

        // a variable carries a pre or post operation, never both
        if pre_stmt.is_some() && post_stmt.is_some() {
            let loc = self.expr_loc(eid);
            self.error(&loc, "Variable cannot have pre and post operations");
        } else if let Some(pre) = pre_stmt {
            self.analyze_statement(pre, false);
        } else if let Some(post) = post_stmt {
            self.analyze_statement(post, false);
        }
    }

    fn resolve_variable(&mut self, eid: ExprId) {
        let (name, indices) = match &self.program.exprs[eid.0].kind {
            ExprKind::Variable { name, indices, .. } => (name.clone(), indices.clone()),
            _ => return,
        };
        let loc = self.expr_loc(eid);

        if let Some(entry) = self.get_entry(&name) {
            if self.has_program_library_enum(&name) || self.has_program_library_class(&name) {
                self.error(
                    &loc,
                    format!("Variable '{name}' already used to define a class, enum or function"),
                );
            }

            let ty = self.symbols.entry(entry).ty.clone();
            if self.program.exprs[eid.0].eval_type.is_none() {
                self.program.exprs[eid.0].eval_type = Some(ty.clone());
            }
            if let ExprKind::Variable { entry: slot, .. } = &mut self.program.exprs[eid.0].kind {
                *slot = Some(entry);
            }

            if let Some(indices) = &indices {
                if ty.dimension as usize == indices.len() {
                    for &index in indices {
                        self.analyze_expression(index);
                        if !self.is_integer_expression(index) {
                            let loc = self.expr_loc(index);
                            self.error(&loc, "Expected an integer index");
                        }
                    }
                    // indexing collapses the dimension
                    let mut element = ty.clone();
                    element.dimension = 0;
                    self.program.exprs[eid.0].eval_type = Some(element);
                } else {
                    self.error(&loc, "Dimension size mismatch or uninitialized type");
                }
            }

            if self.invalid_static(entry) {
                self.error(
                    &loc,
                    "Cannot reference an instance variable from this context",
                );
            }
            return;
        }

        // inside a lambda body, unresolved names may capture from the
        // enclosing method
        let in_lambda = self
            .current_method
            .is_some_and(|mid| self.program.methods[mid.0].is_lambda);
        if in_lambda {
            if self.capture_variable(eid, &name) {
                return;
            }
        } else if let Some(mid) = self.current_method {
            // first sighting of an inferred variable
            let method_name = self.program.methods[mid.0].name.clone();
            let scoped = format!("{method_name}:{name}");
            let entry = self.symbols.add_entry_for(
                &method_name,
                SymbolEntry {
                    loc: loc.clone(),
                    name: scoped,
                    ty: Type::var(),
                    is_static: false,
                    is_local: true,
                },
            );
            self.program.exprs[eid.0].eval_type = Some(Type::var());
            if let ExprKind::Variable { entry: slot, .. } = &mut self.program.exprs[eid.0].kind {
                *slot = Some(entry);
            }
            return;
        }

        if !in_lambda {
            self.error(&loc, format!("Undefined variable: '{name}'"));
        }
    }

    /// Resolve a lambda-body name against the enclosing method's scope,
    /// creating (or reusing) the closure copy entry.
    fn capture_variable(&mut self, eid: ExprId, name: &str) -> bool {
        let (Some(capture_mid), Some(lambda_eid)) = (self.capture_method, self.capture_lambda)
        else {
            return false;
        };

        let capture_owner = self.program.methods[capture_mid.0].name.clone();
        let scoped = format!("{capture_owner}:{name}");
        let Some(original) = self.symbols.get(&capture_owner, &scoped) else {
            let loc = self.expr_loc(eid);
            self.error(&loc, format!("Undefined variable: '{name}'"));
            return true;
        };

        // one copy per captured original, reused on later sightings
        let existing = match &self.program.exprs[lambda_eid.0].kind {
            ExprKind::Lambda { closures, .. } => closures
                .iter()
                .find(|(_, orig)| *orig == original)
                .map(|(copy, _)| *copy),
            _ => None,
        };

        let copy = match existing {
            Some(copy) => copy,
            None => {
                let mid = self.current_method.expect("lambda body has a method");
                let lambda_owner = self.program.methods[mid.0].name.clone();
                let ty = self.symbols.entry(original).ty.clone();
                let loc = self.expr_loc(eid);
                let copy = self.symbols.add_entry_for(
                    &lambda_owner,
                    SymbolEntry {
                        loc,
                        name: format!("{lambda_owner}:{name}"),
                        ty,
                        is_static: false,
                        is_local: false,
                    },
                );
                if let ExprKind::Lambda { closures, .. } =
                    &mut self.program.exprs[lambda_eid.0].kind
                {
                    closures.push((copy, original));
                }
                copy
            }
        };

        let ty = self.symbols.entry(copy).ty.clone();
        self.program.exprs[eid.0].eval_type = Some(ty);
        if let ExprKind::Variable { entry: slot, .. } = &mut self.program.exprs[eid.0].kind {
            *slot = Some(copy);
        }
        true
    }

    // =========================================================================
    // Calculations
    // =========================================================================

    pub(crate) fn analyze_calculation(&mut self, eid: ExprId) {
        let (op, left, right) = match &self.program.exprs[eid.0].kind {
            ExprKind::Calc { op, left, right } => (*op, *left, *right),
            _ => return,
        };

        self.analyze_expression(left);
        self.analyze_expression(right);
        let loc = self.expr_loc(eid);

        if op.is_logical() {
            self.require_boolean(left);
            self.require_boolean(right);
            if let Some(mid) = self.current_method {
                self.program.methods[mid.0].has_and_or = true;
            }
            self.program.exprs[eid.0].eval_type = Some(Type::bool());
            return;
        }

        let left_ty = self.get_expression_type(left);
        let right_ty = self.get_expression_type(right);
        let (Some(left_ty), Some(right_ty)) = (left_ty, right_ty) else {
            self.error(&loc, "Invalid operation");
            return;
        };

        if op.is_predicate() {
            self.check_comparable(&left_ty, &right_ty, &loc);
            self.program.exprs[eid.0].eval_type = Some(Type::bool());
            return;
        }

        // arithmetic promotion
        let result = self.promote_calculation(&left_ty, &right_ty, &loc);
        if let Some(result) = result {
            // narrower operand adopts the promoted type
            if result.kind == TypeKind::Float {
                for (side, ty) in [(left, &left_ty), (right, &right_ty)] {
                    if ty.kind != TypeKind::Float {
                        self.program.exprs[side.0].cast_type = Some(Type::float());
                    }
                }
            }
            self.program.exprs[eid.0].eval_type = Some(result);
        }
    }

    fn check_comparable(&mut self, left: &Type, right: &Type, loc: &vela_core::SourceLoc) {
        let numeric = |k: TypeKind| {
            matches!(
                k,
                TypeKind::Int | TypeKind::Byte | TypeKind::Char | TypeKind::Float
            )
        };
        match (left.kind, right.kind) {
            (a, b) if numeric(a) && numeric(b) => {}
            (TypeKind::Bool, TypeKind::Bool) => {}
            (TypeKind::Class, TypeKind::Class) => {
                // enum-to-enum comparisons must stay within one enum
                let left_enum = self.has_program_library_enum(&left.name);
                let right_enum = self.has_program_library_enum(&right.name);
                if left_enum && right_enum && left.name != right.name {
                    self.error(
                        loc,
                        format!(
                            "Invalid cast between enums: '{}' and '{}'",
                            left.name.replace('#', "->"),
                            right.name.replace('#', "->")
                        ),
                    );
                }
            }
            (TypeKind::Class, TypeKind::Nil) | (TypeKind::Nil, TypeKind::Class) => {}
            (TypeKind::Class, k) if numeric(k) && self.has_program_library_enum(&left.name) => {}
            (k, TypeKind::Class) if numeric(k) && self.has_program_library_enum(&right.name) => {}
            _ => self.error(loc, "Invalid operation"),
        }
    }

    fn promote_calculation(
        &mut self,
        left: &Type,
        right: &Type,
        loc: &vela_core::SourceLoc,
    ) -> Option<Type> {
        let numeric = |k: TypeKind| {
            matches!(
                k,
                TypeKind::Int | TypeKind::Byte | TypeKind::Char | TypeKind::Float
            )
        };
        if !numeric(left.kind) || !numeric(right.kind) {
            self.error(loc, "Expected a numeric expression");
            return None;
        }
        if left.kind == TypeKind::Float || right.kind == TypeKind::Float {
            return Some(Type::float());
        }
        Some(Type::int())
    }

    // =========================================================================
    // Conditionals
    // =========================================================================

    fn analyze_conditional(&mut self, eid: ExprId) {
        let (cond, if_expr, else_expr) = match &self.program.exprs[eid.0].kind {
            ExprKind::Cond {
                cond,
                if_expr,
                else_expr,
            } => (*cond, *if_expr, *else_expr),
            _ => return,
        };

        self.analyze_expression(cond);
        self.require_boolean(cond);
        self.analyze_expression(if_expr);
        self.analyze_expression(else_expr);

        if let Some(if_ty) = self.get_expression_type(if_expr) {
            let is_scalar = self.is_scalar(else_expr);
            self.analyze_right_cast(&if_ty, else_expr, is_scalar);
            self.program.exprs[eid.0].eval_type = Some(if_ty);
        }
    }

    // =========================================================================
    // Type tests
    // =========================================================================

    fn analyze_type_of(&mut self, eid: ExprId) {
        let (expr, mut check) = match &self.program.exprs[eid.0].kind {
            ExprKind::TypeOf { expr, check } => (*expr, check.clone()),
            _ => return,
        };
        let loc = self.expr_loc(eid);

        self.analyze_expression(expr);
        let expr_ty = self.get_expression_type(expr);
        if expr_ty.map(|t| t.kind) != Some(TypeKind::Class) {
            self.error(&loc, "Invalid 'TypeOf' check");
        }
        if check.kind != TypeKind::Class {
            self.error(&loc, "Invalid 'TypeOf' check");
        } else if let Some(cid) = self.current_class {
            if !self.resolve_class_enum_type(&mut check, cid) {
                self.error(
                    &loc,
                    format!("Undefined class or enum: '{}'", check.name.replace('#', "->")),
                );
            }
            if let ExprKind::TypeOf { check: slot, .. } = &mut self.program.exprs[eid.0].kind {
                *slot = check;
            }
        }

        self.program.exprs[eid.0].eval_type = Some(Type::bool());
    }
}
