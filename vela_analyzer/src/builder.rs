//! Programmatic construction of the descriptor graph.
//!
//! The parser drives this API to materialize a [`Program`] plus its
//! symbol tables; tests use it directly. Every node gets a distinct
//! source line so diagnostics stay ordered and addressable.

use crate::ast::{
    Alias, AssignOp, Bundle, CalcOp, Class, ClassId, Enum, EnumId, Expr, ExprId, ExprKind,
    GenericParam, IfStmt, Method, MethodCallData, MethodId, MethodKind, Program, Stmt, StmtId,
    StmtKind,
};
use crate::symbols::{SymbolEntry, SymbolTableManager};
use std::sync::Arc;
use vela_core::{SourceLoc, Type};

/// Builds a [`Program`] and its symbol tables in source order.
#[derive(Debug)]
pub struct ProgramBuilder {
    program: Program,
    symbols: SymbolTableManager,
    file: Arc<str>,
    line: u32,
    lambda_count: usize,
}

impl ProgramBuilder {
    /// Start a program for the given source file.
    pub fn new(file: &str) -> Self {
        let mut program = Program::new(file);
        program.bundles.push(Bundle::default());
        Self {
            program,
            symbols: SymbolTableManager::new(),
            file: file.into(),
            line: 0,
            lambda_count: 0,
        }
    }

    /// Finish, handing back the program and its symbol tables.
    pub fn finish(self) -> (Program, SymbolTableManager) {
        (self.program, self.symbols)
    }

    fn next_loc(&mut self) -> SourceLoc {
        self.line += 1;
        SourceLoc {
            file: self.file.clone(),
            line: self.line,
        }
    }

    // =========================================================================
    // Bundles, classes, enums
    // =========================================================================

    /// Open a bundle; later classes and enums land in it. The bundle name
    /// is added to the `use` list automatically.
    pub fn bundle(&mut self, name: &str) {
        if self.program.bundles.len() == 1 && self.program.bundles[0].name.is_empty() {
            self.program.bundles[0].name = name.to_string();
        } else {
            self.program.bundles.push(Bundle {
                name: name.to_string(),
                ..Default::default()
            });
        }
        if !self.program.uses.iter().any(|u| u == name) {
            self.program.uses.push(name.to_string());
        }
    }

    /// Reference another bundle.
    pub fn use_bundle(&mut self, name: &str) {
        self.program.uses.push(name.to_string());
    }

    fn qualified(&self, name: &str) -> String {
        let bundle = &self.program.bundles.last().expect("bundle").name;
        if bundle.is_empty() {
            name.to_string()
        } else {
            format!("{bundle}.{name}")
        }
    }

    /// Declare a class in the current bundle.
    pub fn class(&mut self, name: &str) -> ClassId {
        let loc = self.next_loc();
        let qualified = self.qualified(name);
        let bundle_name = self.program.bundles.last().expect("bundle").name.clone();
        let cid = self.program.add_class(Class::new(loc, bundle_name, qualified));
        self.program.bundles.last_mut().expect("bundle").classes.push(cid);
        cid
    }

    /// Mark a class as an interface (all methods virtual).
    pub fn make_interface(&mut self, cid: ClassId) {
        self.program.classes[cid.0].is_interface = true;
        self.program.classes[cid.0].is_virtual = true;
    }

    /// Mark a class virtual.
    pub fn make_virtual_class(&mut self, cid: ClassId) {
        self.program.classes[cid.0].is_virtual = true;
    }

    /// Set a class's declared parent by name.
    pub fn set_parent(&mut self, cid: ClassId, name: &str) {
        self.program.classes[cid.0].parent_name = Some(name.to_string());
    }

    /// Declare an implemented interface by name.
    pub fn add_interface(&mut self, cid: ClassId, name: &str) {
        self.program.classes[cid.0]
            .interface_names
            .push(name.to_string());
    }

    /// Declare a generic parameter, optionally backed by an interface.
    pub fn add_generic(&mut self, cid: ClassId, name: &str, backing: Option<&str>) {
        self.program.classes[cid.0].generics.push(GenericParam {
            name: name.to_string(),
            backing: backing.map(Type::class),
        });
    }

    /// Declare an enum in the current bundle.
    pub fn enumeration(&mut self, name: &str, items: &[(&str, i64)]) -> EnumId {
        let loc = self.next_loc();
        let qualified = self.qualified(name);
        let eid = EnumId(self.program.enums.len());
        self.program.enums.push(Enum {
            loc,
            name: qualified,
            items: items.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
        });
        self.program.bundles.last_mut().expect("bundle").enums.push(eid);
        eid
    }

    /// Declare an alias group in the current bundle.
    pub fn alias(&mut self, name: &str, members: &[(&str, Type)]) {
        let qualified = self.qualified(name);
        self.program.bundles.last_mut().expect("bundle").aliases.push(Alias {
            name: qualified,
            types: members
                .iter()
                .map(|(n, t)| (n.to_string(), t.clone()))
                .collect(),
        });
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// Declare an instance variable on a class.
    pub fn instance_var(&mut self, cid: ClassId, name: &str, ty: Type) -> StmtId {
        let loc = self.next_loc();
        let owner = self.program.classes[cid.0].name.clone();
        let entry = self.symbols.add_entry_for(
            &owner,
            SymbolEntry {
                loc: loc.clone(),
                name: format!("{owner}:{name}"),
                ty,
                is_static: false,
                is_local: false,
            },
        );
        let sid = self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::Declaration {
                entry,
                assignment: None,
            },
        });
        self.program.classes[cid.0].statements.push(sid);
        sid
    }

    // =========================================================================
    // Methods
    // =========================================================================

    /// Declare a method with typed parameters.
    pub fn method(
        &mut self,
        cid: ClassId,
        name: &str,
        kind: MethodKind,
        params: &[(&str, Type)],
        return_type: Type,
    ) -> MethodId {
        let loc = self.next_loc();
        let cls_name = self.program.classes[cid.0].name.clone();
        let parsed_name = format!("{cls_name}:{name}");

        let mut method = Method::new(loc, cid, parsed_name.clone(), kind, return_type);
        for (param_name, param_ty) in params {
            let loc = self.next_loc();
            let entry = self.symbols.add_entry_for(
                &parsed_name,
                SymbolEntry {
                    loc: loc.clone(),
                    name: format!("{parsed_name}:{param_name}"),
                    ty: param_ty.clone(),
                    is_static: false,
                    is_local: true,
                },
            );
            let sid = self.program.add_stmt(Stmt {
                loc,
                kind: StmtKind::Declaration {
                    entry,
                    assignment: None,
                },
            });
            method.params.push(sid);
        }

        let mid = self.program.add_method(method);
        self.program.classes[cid.0].methods.push(mid);
        mid
    }

    /// Mark a method static.
    pub fn make_static(&mut self, mid: MethodId) {
        self.program.methods[mid.0].is_static = true;
    }

    /// Mark a method virtual (no body; children must implement it).
    pub fn make_virtual(&mut self, mid: MethodId) {
        self.program.methods[mid.0].is_virtual = true;
        let cid = self.program.methods[mid.0].cls;
        self.program.classes[cid.0].is_virtual = true;
    }

    /// Attach a default value to a declared parameter.
    pub fn default_param(&mut self, mid: MethodId, index: usize, value: ExprId) {
        let sid = self.program.methods[mid.0].params[index];
        let entry = match &self.program.stmts[sid.0].kind {
            StmtKind::Declaration { entry, .. } => *entry,
            _ => return,
        };
        let loc = self.program.stmts[sid.0].loc.clone();
        let name = self.symbols.entry(entry).short_name().to_string();
        let variable = self.var(&name);
        let assignment = self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::Assignment {
                op: AssignOp::Assign,
                variable,
                value,
            },
        });
        if let StmtKind::Declaration { assignment: slot, .. } =
            &mut self.program.stmts[sid.0].kind
        {
            *slot = Some(assignment);
        }
    }

    /// Append a body statement to a method.
    pub fn push_stmt(&mut self, mid: MethodId, sid: StmtId) {
        self.program.methods[mid.0].statements.push(sid);
    }

    /// Declare a local variable inside a method, optionally initialized.
    pub fn local(
        &mut self,
        mid: MethodId,
        name: &str,
        ty: Type,
        init: Option<ExprId>,
    ) -> (StmtId, EntryHandle) {
        let loc = self.next_loc();
        let owner = self.program.methods[mid.0].name.clone();
        let entry = self.symbols.add_entry_for(
            &owner,
            SymbolEntry {
                loc: loc.clone(),
                name: format!("{owner}:{name}"),
                ty,
                is_static: false,
                is_local: true,
            },
        );

        let assignment = init.map(|value| {
            let variable = self.var(name);
            self.program.add_stmt(Stmt {
                loc: loc.clone(),
                kind: StmtKind::Assignment {
                    op: AssignOp::Assign,
                    variable,
                    value,
                },
            })
        });

        let sid = self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::Declaration { entry, assignment },
        });
        self.program.methods[mid.0].statements.push(sid);
        (sid, EntryHandle(entry))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// An assignment statement (not attached to any method).
    pub fn assign(&mut self, variable: ExprId, value: ExprId) -> StmtId {
        let loc = self.next_loc();
        self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::Assignment {
                op: AssignOp::Assign,
                variable,
                value,
            },
        })
    }

    /// A return statement.
    pub fn ret(&mut self, value: Option<ExprId>) -> StmtId {
        let loc = self.next_loc();
        self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::Return(value),
        })
    }

    /// An if/else chain link.
    pub fn if_stmt(
        &mut self,
        cond: ExprId,
        if_stmts: Vec<StmtId>,
        next: Option<StmtId>,
        else_stmts: Option<Vec<StmtId>>,
    ) -> StmtId {
        let loc = self.next_loc();
        self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::If(IfStmt {
                cond,
                if_stmts,
                next,
                else_stmts,
            }),
        })
    }

    /// A select statement.
    pub fn select(
        &mut self,
        eval: ExprId,
        arms: Vec<(Vec<ExprId>, Vec<StmtId>)>,
        other: Option<Vec<StmtId>>,
    ) -> StmtId {
        let loc = self.next_loc();
        self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::Select { eval, arms, other },
        })
    }

    /// A while loop.
    pub fn while_stmt(&mut self, cond: ExprId, body: Vec<StmtId>) -> StmtId {
        let loc = self.next_loc();
        self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::While { cond, body },
        })
    }

    /// A method call in statement position.
    pub fn call_stmt(&mut self, call: ExprId) -> StmtId {
        let loc = self.next_loc();
        self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::MethodCall(call),
        })
    }

    /// A `leaving` cleanup block.
    pub fn leaving(&mut self, body: Vec<StmtId>) -> StmtId {
        let loc = self.next_loc();
        self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::Leaving(body),
        })
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expr(&mut self, kind: ExprKind) -> ExprId {
        let loc = self.next_loc();
        self.program.add_expr(Expr::new(loc, kind))
    }

    /// Integer literal.
    pub fn int(&mut self, value: i64) -> ExprId {
        self.expr(ExprKind::IntLit(value))
    }

    /// Float literal.
    pub fn float(&mut self, value: f64) -> ExprId {
        self.expr(ExprKind::FloatLit(value))
    }

    /// Character literal.
    pub fn char_lit(&mut self, value: char) -> ExprId {
        self.expr(ExprKind::CharLit(value))
    }

    /// Boolean literal.
    pub fn boolean(&mut self, value: bool) -> ExprId {
        self.expr(ExprKind::BoolLit(value))
    }

    /// String literal.
    pub fn string(&mut self, value: &str) -> ExprId {
        self.expr(ExprKind::StringLit(value.to_string()))
    }

    /// The `Nil` literal.
    pub fn nil(&mut self) -> ExprId {
        self.expr(ExprKind::Nil)
    }

    /// A variable reference.
    pub fn var(&mut self, name: &str) -> ExprId {
        self.expr(ExprKind::Variable {
            name: name.to_string(),
            indices: None,
            entry: None,
            pre_stmt: None,
            post_stmt: None,
        })
    }

    /// Attach a pre operation statement to a variable reference.
    pub fn set_pre_stmt(&mut self, variable: ExprId, stmt: StmtId) {
        if let ExprKind::Variable { pre_stmt, .. } = &mut self.program.exprs[variable.0].kind {
            *pre_stmt = Some(stmt);
        }
    }

    /// Attach a post operation statement to a variable reference.
    pub fn set_post_stmt(&mut self, variable: ExprId, stmt: StmtId) {
        if let ExprKind::Variable { post_stmt, .. } = &mut self.program.exprs[variable.0].kind {
            *post_stmt = Some(stmt);
        }
    }

    /// An operation assignment (`x += 1` and friends).
    pub fn op_assign(&mut self, op: AssignOp, variable: ExprId, value: ExprId) -> StmtId {
        let loc = self.next_loc();
        self.program.add_stmt(Stmt {
            loc,
            kind: StmtKind::Assignment {
                op,
                variable,
                value,
            },
        })
    }

    /// A binary calculation.
    pub fn calc(&mut self, op: CalcOp, left: ExprId, right: ExprId) -> ExprId {
        self.expr(ExprKind::Calc { op, left, right })
    }

    /// A `receiver->Method(args)` call.
    pub fn call(&mut self, receiver: &str, method: &str, params: Vec<ExprId>) -> ExprId {
        self.expr(ExprKind::MethodCall(MethodCallData::method(
            receiver, method, params,
        )))
    }

    /// A `Class->New(args)` instantiation.
    pub fn new_instance(&mut self, class_name: &str, params: Vec<ExprId>) -> ExprId {
        self.expr(ExprKind::MethodCall(MethodCallData::new_instance(
            class_name, params,
        )))
    }

    /// A `Class<A,B>->New(args)` instantiation with concrete generics.
    pub fn new_instance_with_generics(
        &mut self,
        class_name: &str,
        concrete: Vec<Type>,
        params: Vec<ExprId>,
    ) -> ExprId {
        let mut data = MethodCallData::new_instance(class_name, params);
        data.concrete_types = concrete;
        self.expr(ExprKind::MethodCall(data))
    }

    /// A `Parent(args)` constructor call.
    pub fn parent_call(&mut self, params: Vec<ExprId>) -> ExprId {
        self.expr(ExprKind::MethodCall(MethodCallData::parent(params)))
    }

    /// An `Enum->Item` reference.
    pub fn enum_item(&mut self, enum_name: &str, item: &str) -> ExprId {
        let mut data = MethodCallData::method(enum_name, item, Vec::new());
        data.call_type = crate::ast::CallType::EnumItem;
        self.expr(ExprKind::MethodCall(data))
    }

    /// A lambda literal. `params` are the declared parameter names; with
    /// an explicit `lambda_type` the lambda compiles immediately,
    /// otherwise its type is inferred from the call site.
    pub fn lambda(
        &mut self,
        enclosing: ClassId,
        params: &[&str],
        lambda_type: Option<Type>,
        body: Vec<StmtId>,
    ) -> ExprId {
        self.lambda_count += 1;
        let loc = self.next_loc();
        let cls_name = self.program.classes[enclosing.0].name.clone();
        let parsed_name = format!("{cls_name}:#{}", self.lambda_count);

        let mut method = Method::new(
            loc,
            enclosing,
            parsed_name.clone(),
            MethodKind::Function,
            Type::nil(),
        );
        method.is_lambda = true;
        method.is_static = true;
        for param_name in params {
            let loc = self.next_loc();
            let entry = self.symbols.add_entry_for(
                &parsed_name,
                SymbolEntry {
                    loc: loc.clone(),
                    name: format!("{parsed_name}:{param_name}"),
                    ty: Type::var(),
                    is_static: false,
                    is_local: true,
                },
            );
            let sid = self.program.add_stmt(Stmt {
                loc,
                kind: StmtKind::Declaration {
                    entry,
                    assignment: None,
                },
            });
            method.params.push(sid);
        }
        method.statements = body;
        let mid = self.program.add_method(method);

        self.expr(ExprKind::Lambda {
            method: mid,
            lambda_type,
            call: None,
            closures: Vec::new(),
        })
    }
}

/// Opaque handle to a created symbol entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryHandle(pub crate::ast::EntryId);
