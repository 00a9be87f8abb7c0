//! End-to-end analyzer runs over programs built with the construction API.

use vela_analyzer::ast::{AssignOp, CalcOp, ExprKind, MethodKind, Program};
use vela_analyzer::builder::ProgramBuilder;
use vela_analyzer::{analyze, CompilerOptions, ErrorBatch, Linker};
use vela_core::Type;

fn run_library(b: ProgramBuilder) -> Result<Program, ErrorBatch> {
    let (program, symbols) = b.finish();
    analyze(program, symbols, Linker::new(), CompilerOptions::library("t.vl"))
}

// =============================================================================
// Entry points
// =============================================================================

#[test]
fn executable_requires_main() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Empty");
    b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());

    let (program, symbols) = b.finish();
    let err = analyze(
        program,
        symbols,
        Linker::new(),
        CompilerOptions::executable("t.vl"),
    )
    .unwrap_err();
    assert!(err.contains("The 'Main(args)' function was not defined"));
}

#[test]
fn executable_with_main_compiles() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Hello");
    let main = b.method(
        cls,
        "Main",
        MethodKind::Function,
        &[("args", Type::class("System.String").with_dimension(1))],
        Type::nil(),
    );
    b.make_static(main);

    let (program, symbols) = b.finish();
    let program = analyze(
        program,
        symbols,
        Linker::new(),
        CompilerOptions::executable("t.vl"),
    )
    .unwrap();
    assert!(program.start.is_some());
}

// =============================================================================
// Overload selection
// =============================================================================

fn overload_fixture(second_arg_float: bool) -> Result<Program, ErrorBatch> {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Calc");
    b.method(
        cls,
        "f",
        MethodKind::PublicMethod,
        &[("a", Type::int()), ("b", Type::float())],
        Type::nil(),
    );
    b.method(
        cls,
        "f",
        MethodKind::PublicMethod,
        &[("a", Type::float()), ("b", Type::int())],
        Type::nil(),
    );
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());

    let one = b.int(1);
    let second = if second_arg_float { b.float(1.0) } else { b.int(1) };
    let call = b.call("", "f", vec![one, second]);
    let stmt = b.call_stmt(call);
    b.push_stmt(run, stmt);

    run_library(b)
}

#[test]
fn overload_same_scores_is_ambiguous() {
    let err = overload_fixture(false).unwrap_err();
    assert!(err.contains("Ambiguous"), "{err}");
}

#[test]
fn overload_exact_match_resolves() {
    assert!(overload_fixture(true).is_ok());
}

// =============================================================================
// Generic backing constraints
// =============================================================================

fn generics_fixture(concrete: Type) -> Result<Program, ErrorBatch> {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let list = b.class("List");
    b.add_generic(list, "T", Some("System.Compare"));
    b.method(
        list,
        "New",
        MethodKind::PublicNew,
        &[],
        Type::class("App.List"),
    );
    let _plain = {
        let cid = b.class("Plain");
        b.method(cid, "New", MethodKind::PublicNew, &[], Type::class("App.Plain"));
        cid
    };

    let user = b.class("User");
    let run = b.method(user, "Run", MethodKind::PublicMethod, &[], Type::nil());
    let call = b.new_instance_with_generics("List", vec![concrete], vec![]);
    let stmt = b.call_stmt(call);
    b.push_stmt(run, stmt);

    run_library(b)
}

#[test]
fn generic_backing_accepts_int() {
    assert!(generics_fixture(Type::int()).is_ok());
}

#[test]
fn generic_backing_rejects_incompatible_class() {
    let err = generics_fixture(Type::class("Plain")).unwrap_err();
    assert!(
        err.contains("incompatible with backing class/interface"),
        "{err}"
    );
}

// =============================================================================
// Derived lambdas
// =============================================================================

#[test]
fn untyped_lambda_derives_from_sole_candidate() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Fn");
    b.method(
        cls,
        "g",
        MethodKind::PublicMethod,
        &[("x", Type::func(vec![Type::int()], Type::int()))],
        Type::nil(),
    );
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());

    let x = b.var("x");
    let one = b.int(1);
    let sum = b.calc(CalcOp::Add, x, one);
    let ret = b.ret(Some(sum));
    let lambda = b.lambda(cls, &["x"], None, vec![ret]);
    let call = b.call("", "g", vec![lambda]);
    let stmt = b.call_stmt(call);
    b.push_stmt(run, stmt);

    let program = run_library(b).unwrap();

    // the lambda now carries its derived function type
    let lambda_ty = program
        .exprs
        .iter()
        .find_map(|e| match &e.kind {
            ExprKind::Lambda { .. } => e.eval_type.clone(),
            _ => None,
        })
        .expect("typed lambda");
    assert_eq!(lambda_ty.encode(), "(i,)~i");
}

#[test]
fn lambda_captures_one_copy_per_variable() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Cap");
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());

    let five = b.int(5);
    b.local(run, "x", Type::int(), Some(five));

    // \a => a + x + x, two sightings of the captured x
    let a = b.var("a");
    let x1 = b.var("x");
    let x2 = b.var("x");
    let inner = b.calc(CalcOp::Add, x1, x2);
    let sum = b.calc(CalcOp::Add, a, inner);
    let ret = b.ret(Some(sum));
    let lambda = b.lambda(
        cls,
        &["a"],
        Some(Type::func(vec![Type::int()], Type::int())),
        vec![ret],
    );
    let stmt = b.call_stmt(lambda);
    b.push_stmt(run, stmt);

    let program = run_library(b).unwrap();
    let closures = program
        .exprs
        .iter()
        .find_map(|e| match &e.kind {
            ExprKind::Lambda { closures, .. } => Some(closures.clone()),
            _ => None,
        })
        .expect("lambda");
    assert_eq!(closures.len(), 1);
}

// =============================================================================
// Return paths
// =============================================================================

#[test]
fn return_paths_if_else_covered() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Paths");
    let m = b.method(cls, "Pick", MethodKind::PublicMethod, &[], Type::int());

    let one = b.int(1);
    let r1 = b.ret(Some(one));
    let two = b.int(2);
    let r2 = b.ret(Some(two));
    let cond = b.boolean(true);
    let if_stmt = b.if_stmt(cond, vec![r1], None, Some(vec![r2]));
    b.push_stmt(m, if_stmt);

    assert!(run_library(b).is_ok());
}

#[test]
fn return_paths_missing_else_rejected() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Paths");
    let m = b.method(cls, "Pick", MethodKind::PublicMethod, &[], Type::int());

    let one = b.int(1);
    let r1 = b.ret(Some(one));
    let cond = b.boolean(true);
    let if_stmt = b.if_stmt(cond, vec![r1], None, None);
    b.push_stmt(m, if_stmt);

    let err = run_library(b).unwrap_err();
    assert!(err.contains("All method/function paths must return a value"));
}

#[test]
fn return_paths_else_if_chain_with_gap_rejected() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Paths");
    let m = b.method(cls, "Pick", MethodKind::PublicMethod, &[("n", Type::int())], Type::int());

    // if { return } else if { n := 0 } else { return }
    let one = b.int(1);
    let r1 = b.ret(Some(one));
    let n = b.var("n");
    let zero = b.int(0);
    let filler = b.assign(n, zero);
    let three = b.int(3);
    let r3 = b.ret(Some(three));

    let cond2 = b.boolean(false);
    let else_if = b.if_stmt(cond2, vec![filler], None, Some(vec![r3]));
    let cond1 = b.boolean(true);
    let chain = b.if_stmt(cond1, vec![r1], Some(else_if), None);
    b.push_stmt(m, chain);

    let err = run_library(b).unwrap_err();
    assert!(err.contains("All method/function paths must return a value"));
}

#[test]
fn return_paths_else_if_chain_fully_covered() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Paths");
    let m = b.method(cls, "Pick", MethodKind::PublicMethod, &[], Type::int());

    let one = b.int(1);
    let r1 = b.ret(Some(one));
    let two = b.int(2);
    let r2 = b.ret(Some(two));
    let three = b.int(3);
    let r3 = b.ret(Some(three));

    let cond2 = b.boolean(false);
    let else_if = b.if_stmt(cond2, vec![r2], None, Some(vec![r3]));
    let cond1 = b.boolean(true);
    let chain = b.if_stmt(cond1, vec![r1], Some(else_if), None);
    b.push_stmt(m, chain);

    assert!(run_library(b).is_ok());
}

#[test]
fn return_paths_select_requires_other() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Paths");
    let m = b.method(cls, "Pick", MethodKind::PublicMethod, &[("n", Type::int())], Type::int());

    let n = b.var("n");
    let zero = b.int(0);
    let one = b.int(1);
    let r1 = b.ret(Some(one));
    let select = b.select(n, vec![(vec![zero], vec![r1])], None);
    b.push_stmt(m, select);

    let err = run_library(b).unwrap_err();
    assert!(err.contains("All method/function paths must return a value"));
}

// =============================================================================
// Hierarchy rules
// =============================================================================

#[test]
fn constructor_requires_parent_call() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let base = b.class("Base");
    b.method(base, "New", MethodKind::PublicNew, &[], Type::class("App.Base"));

    let child = b.class("Child");
    b.set_parent(child, "App.Base");
    b.method(child, "New", MethodKind::PublicNew, &[], Type::class("App.Child"));

    let err = run_library(b).unwrap_err();
    assert!(err.contains("Parent call required"));
}

#[test]
fn constructor_with_parent_call_compiles() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let base = b.class("Base");
    b.method(base, "New", MethodKind::PublicNew, &[], Type::class("App.Base"));

    let child = b.class("Child");
    b.set_parent(child, "App.Base");
    let ctor = b.method(child, "New", MethodKind::PublicNew, &[], Type::class("App.Child"));
    let parent = b.parent_call(vec![]);
    let stmt = b.call_stmt(parent);
    b.push_stmt(ctor, stmt);

    assert!(run_library(b).is_ok());
}

#[test]
fn interface_cannot_be_parent() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let iface = b.class("Walker");
    b.make_interface(iface);

    let child = b.class("Robot");
    b.set_parent(child, "App.Walker");

    let err = run_library(b).unwrap_err();
    assert!(err.contains("derived from a generic or interface"));
}

#[test]
fn unimplemented_virtual_method_rejected() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let base = b.class("Shape");
    let area = b.method(base, "Area", MethodKind::PublicMethod, &[], Type::float());
    b.make_virtual(area);

    let child = b.class("Circle");
    b.set_parent(child, "App.Shape");

    let err = run_library(b).unwrap_err();
    assert!(err.contains("Not all virtual methods have been implemented"));
}

#[test]
fn implemented_virtual_method_accepted() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let base = b.class("Shape");
    let area = b.method(base, "Area", MethodKind::PublicMethod, &[], Type::float());
    b.make_virtual(area);

    let child = b.class("Circle");
    b.set_parent(child, "App.Shape");
    let impl_area = b.method(child, "Area", MethodKind::PublicMethod, &[], Type::float());
    let half = b.float(0.5);
    let ret = b.ret(Some(half));
    b.push_stmt(impl_area, ret);

    assert!(run_library(b).is_ok());
}

#[test]
fn instance_variable_shadowing_parent_rejected() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let base = b.class("Base");
    b.instance_var(base, "count", Type::int());

    let child = b.class("Child");
    b.set_parent(child, "App.Base");
    b.instance_var(child, "count", Type::int());

    let err = run_library(b).unwrap_err();
    assert!(err.contains("defined in a parent class"));
}

// =============================================================================
// Boxing and unboxing
// =============================================================================

#[test]
fn primitive_boxes_into_holder_parameter() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Boxes");
    b.method(
        cls,
        "Keep",
        MethodKind::PublicMethod,
        &[("h", Type::class("System.IntHolder"))],
        Type::nil(),
    );
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());
    let five = b.int(5);
    let call = b.call("", "Keep", vec![five]);
    let stmt = b.call_stmt(call);
    b.push_stmt(run, stmt);

    let program = run_library(b).unwrap();

    // the argument was rewritten into a holder instantiation
    let boxed = program.exprs.iter().any(|e| match &e.kind {
        ExprKind::MethodCall(data) => {
            data.variable_name == "System.IntHolder" && data.method_name == "New"
        }
        _ => false,
    });
    assert!(boxed);
}

#[test]
fn holder_unboxes_into_primitive_parameter() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Boxes");
    b.method(
        cls,
        "Take",
        MethodKind::PublicMethod,
        &[("i", Type::int())],
        Type::nil(),
    );
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());
    let seven = b.int(7);
    let init = b.new_instance("System.IntHolder", vec![seven]);
    b.local(run, "h", Type::class("System.IntHolder"), Some(init));
    let h = b.var("h");
    let call = b.call("", "Take", vec![h]);
    let stmt = b.call_stmt(call);
    b.push_stmt(run, stmt);

    let program = run_library(b).unwrap();

    // a Get() call was synthesized on the holder
    let unboxed = program.exprs.iter().any(|e| match &e.kind {
        ExprKind::MethodCall(data) => data.variable_name == "h" && data.method_name == "Get",
        _ => false,
    });
    assert!(unboxed);
}

// =============================================================================
// Default parameters
// =============================================================================

#[test]
fn default_parameter_expands_alternate() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Log");
    let write = b.method(
        cls,
        "Write",
        MethodKind::PublicMethod,
        &[("text", Type::class("System.String")), ("level", Type::int())],
        Type::nil(),
    );
    let zero = b.int(0);
    b.default_param(write, 1, zero);

    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());
    let text = b.string("ready");
    let call = b.call("", "Write", vec![text]);
    let stmt = b.call_stmt(call);
    b.push_stmt(run, stmt);

    assert!(run_library(b).is_ok());
}

#[test]
fn leading_default_parameter_rejected() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Log");
    let write = b.method(
        cls,
        "Write",
        MethodKind::PublicMethod,
        &[("level", Type::int()), ("text", Type::class("System.String"))],
        Type::nil(),
    );
    let zero = b.int(0);
    b.default_param(write, 0, zero);
    let text_default = b.string("x");
    b.default_param(write, 1, text_default);

    // leading default alone is invalid
    let mut b2 = ProgramBuilder::new("t2.vl");
    b2.bundle("App");
    let cls2 = b2.class("Log");
    let write2 = b2.method(
        cls2,
        "Write",
        MethodKind::PublicMethod,
        &[("level", Type::int()), ("text", Type::class("System.String"))],
        Type::nil(),
    );
    let zero2 = b2.int(0);
    b2.default_param(write2, 0, zero2);

    assert!(run_library(b).is_ok()); // both defaulted: legal
    let err = run_library(b2).unwrap_err();
    assert!(err.contains("Only trailing parameters may have default values"));
}

// =============================================================================
// Casting and enums
// =============================================================================

#[test]
fn bool_rejects_integer_assignment() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Casts");
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());
    let five = b.int(5);
    b.local(run, "flag", Type::bool(), Some(five));

    let err = run_library(b).unwrap_err();
    assert!(err.contains("System.Bool"));
}

#[test]
fn nil_assigns_to_class_slot() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Casts");
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());
    let nil = b.nil();
    b.local(run, "s", Type::class("System.String"), Some(nil));

    assert!(run_library(b).is_ok());
}

#[test]
fn select_rejects_duplicate_labels() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    b.enumeration("Color", &[("Red", 0), ("Green", 1)]);
    let cls = b.class("Paint");
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[("n", Type::int())], Type::nil());

    let n = b.var("n");
    let red1 = b.enum_item("Color", "Red");
    let red2 = b.enum_item("Color", "Red");
    let select = b.select(n, vec![(vec![red1], vec![]), (vec![red2], vec![])], None);
    b.push_stmt(run, select);

    let err = run_library(b).unwrap_err();
    assert!(err.contains("Duplicate select value"));
}

#[test]
fn uninitialized_inferred_variable_rejected_in_calculation() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Uses");
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::int());
    let ghost = b.var("ghost");
    let one = b.int(1);
    let sum = b.calc(CalcOp::Add, ghost, one);
    let ret = b.ret(Some(sum));
    b.push_stmt(run, ret);

    // `ghost` infers as Var on first sighting; using it numerically fails
    let err = run_library(b).unwrap_err();
    assert!(err.contains("Expected a numeric expression"));
}

#[test]
fn variable_with_pre_and_post_operations_rejected() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Ops");
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::int());
    let init = b.int(0);
    b.local(run, "x", Type::int(), Some(init));

    // x carrying both a pre and a post operation
    let x = b.var("x");
    let pre_var = b.var("x");
    let one = b.int(1);
    let pre = b.op_assign(AssignOp::Add, pre_var, one);
    let post_var = b.var("x");
    let step = b.int(1);
    let post = b.op_assign(AssignOp::Sub, post_var, step);
    b.set_pre_stmt(x, pre);
    b.set_post_stmt(x, post);

    let ret = b.ret(Some(x));
    b.push_stmt(run, ret);

    let err = run_library(b).unwrap_err();
    assert!(err.contains("Variable cannot have pre and post operations"));
}

#[test]
fn variable_post_operation_accepted() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Ops");
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::int());
    let init = b.int(0);
    b.local(run, "x", Type::int(), Some(init));

    let x = b.var("x");
    let post_var = b.var("x");
    let one = b.int(1);
    let post = b.op_assign(AssignOp::Add, post_var, one);
    b.set_post_stmt(x, post);

    let ret = b.ret(Some(x));
    b.push_stmt(run, ret);

    assert!(run_library(b).is_ok());
}

#[test]
fn var_local_infers_from_assignment() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    let cls = b.class("Infer");
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::int());
    let five = b.int(5);
    b.local(run, "x", Type::var(), Some(five));
    let x = b.var("x");
    let one = b.int(1);
    let sum = b.calc(CalcOp::Add, x, one);
    let ret = b.ret(Some(sum));
    b.push_stmt(run, ret);

    assert!(run_library(b).is_ok());
}

// =============================================================================
// Aliases
// =============================================================================

#[test]
fn alias_expands_to_function_type() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    b.alias("Ops", &[("Unary", Type::func(vec![Type::int()], Type::int()))]);
    let cls = b.class("Uses");
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());
    b.local(run, "f", Type::alias("App.Ops#Unary"), None);

    assert!(run_library(b).is_ok());
}

#[test]
fn nested_alias_rejected() {
    let mut b = ProgramBuilder::new("t.vl");
    b.bundle("App");
    b.alias("Inner", &[("F", Type::func(vec![], Type::nil()))]);
    b.alias("Outer", &[("G", Type::alias("App.Inner#F"))]);
    let cls = b.class("Uses");
    let run = b.method(cls, "Run", MethodKind::PublicMethod, &[], Type::nil());
    b.local(run, "f", Type::alias("App.Outer#G"), None);

    let err = run_library(b).unwrap_err();
    assert!(err.contains("Invalid nested alias reference"));
}
