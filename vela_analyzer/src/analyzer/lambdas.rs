//! Lambda compilation: typed or inferred lambda literals lower into
//! synthetic methods of the enclosing class, with captured variables
//! copied into the lambda's closure.

use super::ContextAnalyzer;
use crate::ast::{CallTarget, CallType, ExprId, ExprKind, MethodCallData, StmtKind};
use vela_core::{Type, TypeKind};

impl ContextAnalyzer {
    /// Analyze a lambda literal.
    ///
    /// Explicitly typed lambdas compile immediately. An untyped lambda in
    /// argument position defers to the derived-lambda path of overload
    /// resolution; anywhere else it is an error.
    pub(crate) fn analyze_lambda(&mut self, eid: ExprId) {
        let (lambda_type, already_built) = match &self.program.exprs[eid.0].kind {
            ExprKind::Lambda {
                lambda_type, call, ..
            } => (lambda_type.clone(), call.is_some()),
            _ => return,
        };
        if already_built {
            return;
        }

        let is_inferred = self.lambda_inferred.1.is_some();

        match lambda_type {
            Some(mut lambda_type) => {
                // alias'd lambda types expand first
                if lambda_type.kind == TypeKind::Alias {
                    let loc = self.expr_loc(eid);
                    let name = lambda_type.name.clone();
                    match self.resolve_alias(&name, &loc) {
                        Some(resolved) => lambda_type = resolved,
                        None => return,
                    }
                }
                self.build_lambda_function(eid, &lambda_type);
            }
            None if is_inferred => {
                self.lambda_inferred.0 = Some(eid);
            }
            None => {
                let loc = self.expr_loc(eid);
                self.error(&loc, "Invalid lambda type");
            }
        }
    }

    /// Lower a lambda into its synthetic method and synthesize the
    /// function-value instantiation.
    pub(crate) fn build_lambda_function(&mut self, eid: ExprId, lambda_type: &Type) {
        let mid = match &self.program.exprs[eid.0].kind {
            ExprKind::Lambda { method, .. } => *method,
            _ => return,
        };
        let loc = self.expr_loc(eid);

        if lambda_type.kind != TypeKind::Func {
            self.error(&loc, "Invalid lambda type");
            return;
        }

        let params = self.program.methods[mid.0].params.clone();
        if lambda_type.func_params.len() != params.len() {
            self.error(&loc, "Declaration and parameter size mismatch");
            return;
        }

        // frames that build function values reserve the temp slot
        if let Some(current) = self.current_method {
            self.program.methods[current.0].has_and_or = true;
        }

        // type the parameters and return from the function type
        let return_type = lambda_type
            .func_return
            .as_deref()
            .cloned()
            .unwrap_or_else(Type::nil);
        self.program.methods[mid.0].return_type = return_type;
        for (sid, ty) in params.iter().zip(&lambda_type.func_params) {
            if let StmtKind::Declaration { entry, .. } = &self.program.stmts[sid.0].kind {
                self.symbols.entry_mut(*entry).ty = ty.clone();
            }
        }

        // register on the enclosing class
        let Some(cid) = self.current_class else {
            return;
        };
        self.program.methods[mid.0].is_lambda = true;
        self.program.methods[mid.0].cls = cid;
        if !self.program.classes[cid.0].methods.contains(&mid) {
            self.program.classes[cid.0].methods.push(mid);
        }
        self.encode_method_signature(mid);

        // analyze the body under the capture context, then restore
        let outer_method = self.current_method;
        let outer_lambda = self.capture_lambda;
        let outer_capture = self.capture_method;
        self.capture_lambda = Some(eid);
        self.capture_method = outer_method;

        self.analyze_method(mid);

        self.current_method = outer_method;
        self.capture_method = outer_capture;
        self.capture_lambda = outer_lambda;

        // the lambda expression becomes a function value of its own type
        let mut call_data = MethodCallData::method(
            self.program.classes[cid.0].name.clone(),
            self.program.methods[mid.0].user_name.clone(),
            Vec::new(),
        );
        call_data.call_type = CallType::Method;
        call_data.target = Some(CallTarget::Program(mid));
        call_data.func_return = lambda_type.func_return.as_deref().cloned();

        let call = self.program.add_expr(crate::ast::Expr::new(
            loc,
            ExprKind::MethodCall(call_data),
        ));
        self.program.exprs[call.0].eval_type = Some(lambda_type.clone());

        if let ExprKind::Lambda { call: slot, .. } = &mut self.program.exprs[eid.0].kind {
            *slot = Some(call);
        }
        self.program.exprs[eid.0].eval_type = Some(lambda_type.clone());
    }
}
