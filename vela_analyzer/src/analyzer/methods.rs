//! Method analysis: statement walking, declarations, and return-path
//! validation.

use super::ContextAnalyzer;
use crate::ast::{
    CallType, ClassId, ExprId, ExprKind, MethodId, ParentRef, StmtId, StmtKind,
};
use vela_core::{SYSTEM_BASE_NAME, TypeKind};

impl ContextAnalyzer {
    // =========================================================================
    // Method driver
    // =========================================================================

    pub(crate) fn analyze_method(&mut self, mid: MethodId) {
        self.current_method = Some(mid);
        let cid = self.program.methods[mid.0].cls;
        self.current_class = Some(cid);

        for sid in self.program.methods[mid.0].params.clone() {
            self.analyze_declaration(sid, cid);
        }

        if self.program.methods[mid.0].is_virtual {
            return;
        }

        let statements = self.program.methods[mid.0].statements.clone();
        let mut leaving_seen = false;
        for &sid in &statements {
            if matches!(self.program.stmts[sid.0].kind, StmtKind::Leaving(_)) {
                if leaving_seen {
                    let loc = self.program.stmts[sid.0].loc.clone();
                    self.error(&loc, "Method may only define one 'leaving' block");
                    continue;
                }
                leaving_seen = true;
            }
            self.analyze_statement(sid, true);
        }

        self.check_parent_call(mid, &statements);
        self.check_return_coverage(mid, &statements);
        self.check_entry_point(mid);
    }

    /// Constructors of derived classes must lead with a `Parent(…)` call.
    fn check_parent_call(&mut self, mid: MethodId, statements: &[StmtId]) {
        let method = &self.program.methods[mid.0];
        if !method.kind.is_new() {
            return;
        }
        let cid = method.cls;
        let loc = method.loc.clone();

        let has_real_parent = match self.program.classes[cid.0].parent.clone() {
            Some(ParentRef::Program(_)) => true,
            Some(ParentRef::Library(name)) => name != SYSTEM_BASE_NAME,
            None => false,
        };
        if !has_real_parent || self.program.classes[cid.0].is_interface {
            return;
        }

        let leads_with_parent = statements.first().is_some_and(|sid| {
            if let StmtKind::MethodCall(eid) = self.program.stmts[sid.0].kind {
                if let ExprKind::MethodCall(data) = &self.program.exprs[eid.0].kind {
                    return data.call_type == CallType::Parent;
                }
            }
            false
        });

        if !leads_with_parent {
            self.error(&loc, "Parent call required");
        }
    }

    /// Every path of a value-returning method must end in `return`.
    fn check_return_coverage(&mut self, mid: MethodId, statements: &[StmtId]) {
        let method = &self.program.methods[mid.0];
        if method.kind.is_new()
            || method.return_type.kind == TypeKind::Nil
            || method.is_alt
        {
            return;
        }
        let loc = method.loc.clone();
        if !self.analyze_return_paths(statements) {
            self.error(&loc, "All method/function paths must return a value");
        }
    }

    /// Record the entry point when this method's signature matches the
    /// build target's expected form.
    fn check_entry_point(&mut self, mid: MethodId) {
        let (cid, encoded, is_static, loc) = {
            let m = &self.program.methods[mid.0];
            (m.cls, m.encoded_name.clone(), m.is_static, m.loc.clone())
        };
        let cls_name = self.program.classes[cid.0].name.clone();

        let main_str = format!("{cls_name}:Main:o.System.String*,");
        let web_str = format!("{cls_name}:Action:o.Web.FastCgi.Request,o.Web.FastCgi.Response,");
        let is_lib = matches!(self.options.target, crate::options::TargetKind::Library);
        let is_web = matches!(self.options.target, crate::options::TargetKind::Web);

        if encoded == main_str {
            if self.main_found {
                self.error(&loc, "The 'Main(args)' function has already been defined");
            } else if is_static {
                self.program.classes[cid.0].called = true;
                self.program.start = Some((cid, mid));
                self.main_found = true;
            }
            if self.main_found && (is_lib || is_web) {
                self.error(
                    &loc,
                    "Libraries and web applications may not define a 'Main(args)' function",
                );
            }
        } else if is_web && encoded == web_str {
            if self.web_found {
                self.error(&loc, "The 'Action(args)' function has already been defined");
            } else if is_static {
                self.program.classes[cid.0].called = true;
                self.program.start = Some((cid, mid));
                self.web_found = true;
            }
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub(crate) fn analyze_statements(&mut self, statements: &[StmtId]) {
        if let Some(owner) = self.current_table_owner() {
            self.symbols.table_mut(&owner).new_scope();
        }
        for &sid in statements {
            self.analyze_statement(sid, false);
        }
        if let Some(owner) = self.current_table_owner() {
            self.symbols.table_mut(&owner).previous_scope();
        }
    }

    fn current_table_owner(&self) -> Option<String> {
        self.current_method
            .map(|mid| self.program.methods[mid.0].name.clone())
    }

    pub(crate) fn analyze_statement(&mut self, sid: StmtId, outermost: bool) {
        let loc = self.program.stmts[sid.0].loc.clone();
        match &self.program.stmts[sid.0].kind {
            StmtKind::Declaration { .. } => {
                if let Some(cid) = self.current_class {
                    self.analyze_declaration(sid, cid);
                }
            }

            StmtKind::Assignment { .. } => self.analyze_assignment(sid),

            StmtKind::Simple(eid) => {
                let eid = *eid;
                self.analyze_expression(eid);
            }

            StmtKind::MethodCall(eid) => {
                let eid = *eid;
                self.analyze_expression(eid);
            }

            StmtKind::If(if_stmt) => {
                let cond = if_stmt.cond;
                let if_stmts = if_stmt.if_stmts.clone();
                let next = if_stmt.next;
                let else_stmts = if_stmt.else_stmts.clone();

                self.analyze_expression(cond);
                self.require_boolean(cond);
                self.analyze_statements(&if_stmts);
                if let Some(next) = next {
                    self.analyze_statement(next, false);
                }
                if let Some(else_stmts) = else_stmts {
                    self.analyze_statements(&else_stmts);
                }
            }

            StmtKind::Select { eval, arms, other } => {
                let eval = *eval;
                let arms = arms.clone();
                let other = other.clone();

                self.analyze_expression(eval);
                if !self.is_integer_expression(eval) {
                    let loc = self.expr_loc(eval);
                    self.error(&loc, "Expected integer or enum expression");
                }

                let mut seen_labels: Vec<i64> = Vec::new();
                for (labels, stmts) in &arms {
                    for &label in labels {
                        self.analyze_expression(label);
                        if let Some(value) = self.constant_label_value(label) {
                            if seen_labels.contains(&value) {
                                let loc = self.expr_loc(label);
                                self.error(&loc, "Duplicate select value");
                            } else {
                                seen_labels.push(value);
                            }
                        } else {
                            let loc = self.expr_loc(label);
                            self.error(&loc, "Expected integer or enum constant");
                        }
                    }
                    self.analyze_statements(stmts);
                }
                if let Some(other) = &other {
                    self.analyze_statements(other);
                }
            }

            StmtKind::While { cond, body } => {
                let cond = *cond;
                let body = body.clone();
                self.analyze_expression(cond);
                self.require_boolean(cond);
                self.analyze_statements(&body);
            }

            StmtKind::DoWhile { body, cond } => {
                let cond = *cond;
                let body = body.clone();
                self.analyze_statements(&body);
                self.analyze_expression(cond);
                self.require_boolean(cond);
            }

            StmtKind::For {
                pre,
                cond,
                update,
                body,
            } => {
                let (pre, cond, update) = (*pre, *cond, *update);
                let body = body.clone();

                if let Some(owner) = self.current_table_owner() {
                    self.symbols.table_mut(&owner).new_scope();
                }
                self.analyze_statement(pre, false);
                self.analyze_expression(cond);
                self.require_boolean(cond);
                self.analyze_statement(update, false);
                for &body_stmt in &body {
                    self.analyze_statement(body_stmt, false);
                }
                if let Some(owner) = self.current_table_owner() {
                    self.symbols.table_mut(&owner).previous_scope();
                }
            }

            StmtKind::Return(value) => {
                let value = *value;
                self.analyze_return(sid, value, &loc);
            }

            StmtKind::Leaving(body) => {
                let body = body.clone();
                if !outermost {
                    self.error(&loc, "A 'leaving' block must be defined at method scope");
                }
                self.analyze_statements(&body);
            }

            StmtKind::Critical { variable, body } => {
                let variable = *variable;
                let body = body.clone();
                self.analyze_expression(variable);
                match self.get_expression_type(variable) {
                    Some(ty) if ty.kind == TypeKind::Class => {}
                    _ => {
                        let loc = self.expr_loc(variable);
                        self.error(&loc, "Expected an object guard");
                    }
                }
                self.analyze_statements(&body);
            }
        }
    }

    fn analyze_return(&mut self, _sid: StmtId, value: Option<ExprId>, loc: &vela_core::SourceLoc) {
        let Some(mid) = self.current_method else {
            self.error(loc, "Return statement outside of a method");
            return;
        };
        let return_type = self.program.methods[mid.0].return_type.clone();
        let is_new = self.program.methods[mid.0].kind.is_new();

        match value {
            Some(value) => {
                self.analyze_expression(value);
                if is_new {
                    self.error(loc, "Constructors cannot return a value");
                } else if return_type.kind == TypeKind::Nil {
                    self.error(loc, "Cannot return a value from a 'Nil' method");
                } else {
                    let is_scalar = self.is_scalar(value);
                    self.analyze_right_cast(&return_type, value, is_scalar);
                }
            }
            None => {
                if !is_new && return_type.kind != TypeKind::Nil {
                    self.error(loc, "Return statement requires a value");
                }
            }
        }
    }

    pub(crate) fn require_boolean(&mut self, eid: ExprId) {
        match self.get_expression_type(eid) {
            Some(ty) if ty.kind == TypeKind::Bool && ty.dimension == 0 => {}
            _ => {
                let loc = self.expr_loc(eid);
                self.error(&loc, "Expected Bool expression");
            }
        }
    }

    pub(crate) fn is_integer_expression(&self, eid: ExprId) -> bool {
        match self.get_expression_type(eid) {
            Some(ty) => match ty.kind {
                TypeKind::Int | TypeKind::Byte | TypeKind::Char => true,
                // enums evaluate as integers
                TypeKind::Class => self.has_program_library_enum(&ty.name),
                _ => false,
            },
            None => false,
        }
    }

    /// Constant value of a select label: integer/char literal or resolved
    /// enum item.
    fn constant_label_value(&self, eid: ExprId) -> Option<i64> {
        match &self.program.exprs[eid.0].kind {
            ExprKind::IntLit(v) => Some(*v),
            ExprKind::CharLit(c) => Some(*c as i64),
            ExprKind::MethodCall(data) => data.enum_item.as_ref().map(|(_, v)| *v),
            _ => None,
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    pub(crate) fn analyze_declaration(&mut self, sid: StmtId, cid: ClassId) {
        let StmtKind::Declaration { entry, assignment } = &self.program.stmts[sid.0].kind else {
            let loc = self.program.stmts[sid.0].loc.clone();
            self.error(&loc, "Undefined variable entry");
            return;
        };
        let (entry, assignment) = (*entry, *assignment);
        let loc = self.symbols.entry(entry).loc.clone();

        let kind = self.symbols.entry(entry).ty.kind;
        match kind {
            TypeKind::Class => {
                self.check_entry_type(entry, cid);
                let ty = self.symbols.entry(entry).ty.clone();
                if ty.has_generics() {
                    self.validate_declared_generics(&ty, &loc, cid);
                }
            }
            TypeKind::Func => {
                // canonical function-type name for signature matching
                let mut ty = self.symbols.entry(entry).ty.clone();
                let encoded = format!(
                    "m.{}",
                    vela_core::encode_function_type(&ty.func_params, ty.func_return.as_deref())
                );
                ty.name = encoded;
                self.symbols.entry_mut(entry).ty = ty;
            }
            _ => {}
        }

        let is_static = self.symbols.entry(entry).is_static;
        let is_local = self.symbols.entry(entry).is_local;
        if is_static && self.current_method.is_some() {
            self.error(&loc, "Static variables can only be declared at class scope");
        }
        if !is_local && assignment.is_some() {
            self.error(&loc, "Variables cannot be initialized at class scope");
        }

        if let Some(assignment) = assignment {
            if is_local {
                self.analyze_statement(assignment, false);
            }
        }
    }

    // =========================================================================
    // Assignments
    // =========================================================================

    pub(crate) fn analyze_assignment(&mut self, sid: StmtId) {
        let StmtKind::Assignment {
            op,
            variable,
            value,
        } = &self.program.stmts[sid.0].kind
        else {
            return;
        };
        let (op, variable, value) = (*op, *variable, *value);

        self.analyze_expression(variable);
        self.analyze_expression(value);

        // infer `Var` declarations from the assigned value
        if let Some(var_ty) = self.get_expression_type(variable) {
            if var_ty.kind == TypeKind::Var {
                if let Some(value_ty) = self.get_expression_type(value) {
                    if value_ty.kind == TypeKind::Var {
                        let loc = self.expr_loc(value);
                        self.error(&loc, "Invalid operation using classes: Var and Var");
                    } else if value_ty.kind == TypeKind::Nil {
                        let loc = self.expr_loc(value);
                        self.error(&loc, "Cannot infer type from 'Nil'");
                    } else {
                        self.set_variable_type(variable, value_ty);
                    }
                }
                return;
            }
        }

        if op != crate::ast::AssignOp::Assign {
            // operation assignments stay in the numeric domain
            for side in [variable, value] {
                match self.get_expression_type(side).map(|t| t.kind) {
                    Some(
                        TypeKind::Int | TypeKind::Byte | TypeKind::Char | TypeKind::Float,
                    ) => {}
                    _ => {
                        let loc = self.expr_loc(side);
                        self.error(&loc, "Expected a numeric expression");
                    }
                }
            }
        }

        if let Some(left) = self.get_expression_type(variable) {
            let is_scalar = self.is_scalar(value);
            if let Some(replacement) = self.analyze_right_cast(&left, value, is_scalar) {
                if let StmtKind::Assignment { value, .. } =
                    &mut self.program.stmts[sid.0].kind
                {
                    *value = replacement;
                }
            }
        }
    }

    /// Propagate an inferred type onto a variable expression and its entry.
    fn set_variable_type(&mut self, variable: ExprId, ty: vela_core::Type) {
        self.program.exprs[variable.0].eval_type = Some(ty.clone());
        if let ExprKind::Variable {
            entry: Some(entry), ..
        } = &self.program.exprs[variable.0].kind
        {
            self.symbols.entry_mut(*entry).ty = ty;
        }
    }

    // =========================================================================
    // Return paths
    // =========================================================================

    /// Whether every execution path through `statements` ends in `return`.
    pub(crate) fn analyze_return_paths(&mut self, statements: &[StmtId]) -> bool {
        let Some(&last) = statements.last() else {
            return false;
        };

        match &self.program.stmts[last.0].kind {
            StmtKind::Return(_) => true,
            StmtKind::If(_) => self.return_paths_if(last),
            StmtKind::Select { .. } => self.return_paths_select(last),
            _ => false,
        }
    }

    fn return_paths_if(&mut self, sid: StmtId) -> bool {
        let StmtKind::If(if_stmt) = &self.program.stmts[sid.0].kind else {
            return false;
        };
        let if_stmts = if_stmt.if_stmts.clone();
        let next = if_stmt.next;
        let else_stmts = if_stmt.else_stmts.clone();

        let if_ok = self.analyze_return_paths(&if_stmts);
        let if_else_ok = match next {
            Some(next) => self.return_paths_if(next),
            None => false,
        };
        let else_ok = match &else_stmts {
            Some(stmts) => self.analyze_return_paths(stmts),
            None => {
                if !if_else_ok {
                    return false;
                }
                false
            }
        };

        if next.is_none() {
            return if_ok && (else_ok || if_else_ok);
        }
        if_ok && if_else_ok
    }

    fn return_paths_select(&mut self, sid: StmtId) -> bool {
        let StmtKind::Select { arms, other, .. } = &self.program.stmts[sid.0].kind else {
            return false;
        };
        let arms: Vec<Vec<StmtId>> = arms.iter().map(|(_, stmts)| stmts.clone()).collect();
        let other = other.clone();

        for arm in &arms {
            if !self.analyze_return_paths(arm) {
                return false;
            }
        }
        match other {
            Some(other) => self.analyze_return_paths(&other),
            None => false,
        }
    }
}
