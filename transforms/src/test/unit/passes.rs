//! SSA, call flattening, statement normalization, and incore outlining.

use std::sync::Arc;

use tessera_dtype::DType;
use tessera_ir::{
    Function, FunctionKind, Program, ScopeKind, Span, Stmt, Type, structural_equal,
};

use crate::passes::{
    convert_to_ssa, flatten_call_expr, flatten_single_stmt, normalize_stmt_structure,
    outline_incore_scopes,
};
use crate::test::{body_stmts, op_call, tensor_ty, var, var_expr};
use crate::verifier::PropertyVerifier;

// =========================================================================
// convert_to_ssa
// =========================================================================

#[test]
fn ssa_renames_reassignments_and_uses() {
    let tensor = tensor_ty(DType::Float32, &[4]);
    let a = var("a", tensor.clone());
    let c = var("c", tensor.clone());
    let c_again = var("c", tensor.clone());
    let d = var("d", tensor.clone());
    // c = add(a, a); c = mul(c, c); d = add(c, c); return d
    let body = Stmt::seq(
        [
            Stmt::assign(
                Arc::clone(&c),
                op_call("tensor.add", vec![var_expr(&a), var_expr(&a)]),
                Span::unknown(),
            ),
            Stmt::assign(
                Arc::clone(&c_again),
                op_call("tensor.mul", vec![var_expr(&c), var_expr(&c)]),
                Span::unknown(),
            ),
            Stmt::assign(
                Arc::clone(&d),
                op_call("tensor.add", vec![var_expr(&c_again), var_expr(&c_again)]),
                Span::unknown(),
            ),
            Stmt::return_([var_expr(&d)], Span::unknown()),
        ],
        Span::unknown(),
    );
    let f =
        Function::new("f", vec![a], vec![tensor], body, Span::unknown(), FunctionKind::Opaque);
    let program = Program::new([f], "test", Span::unknown());

    let result = convert_to_ssa().run(&program).unwrap();
    let text = result.get("f").unwrap().to_string();
    assert!(text.contains("c_1: "), "dump:\n{text}");
    assert!(text.contains("tensor.add(c_1, c_1)"), "dump:\n{text}");
    // The first definition keeps its name.
    assert!(text.contains("c: "), "dump:\n{text}");

    // Idempotent once in SSA form.
    let again = convert_to_ssa().run(&result).unwrap();
    assert!(structural_equal(&result, &again, false));
}

#[test]
fn ssa_renames_assignment_shadowing_param() {
    let tensor = tensor_ty(DType::Float32, &[4]);
    let a = var("a", tensor.clone());
    let a_shadow = var("a", tensor.clone());
    let body = Stmt::seq(
        [
            Stmt::assign(
                Arc::clone(&a_shadow),
                op_call("tensor.exp", vec![var_expr(&a)]),
                Span::unknown(),
            ),
            Stmt::return_([var_expr(&a_shadow)], Span::unknown()),
        ],
        Span::unknown(),
    );
    let f =
        Function::new("f", vec![a], vec![tensor], body, Span::unknown(), FunctionKind::Opaque);
    let program = Program::new([f], "test", Span::unknown());

    let result = convert_to_ssa().run(&program).unwrap();
    let text = result.get("f").unwrap().to_string();
    assert!(text.contains("a_1: "), "dump:\n{text}");
    assert!(text.contains("return a_1"), "dump:\n{text}");
}

// =========================================================================
// flatten_call_expr
// =========================================================================

#[test]
fn nested_call_arguments_are_hoisted() {
    let tensor = tensor_ty(DType::Float32, &[4]);
    let a = var("a", tensor.clone());
    // d = add(exp(a), a)
    let inner = op_call("tensor.exp", vec![var_expr(&a)]);
    let outer = op_call("tensor.add", vec![inner, var_expr(&a)]);
    let d = var("d", tensor.clone());
    let body = Stmt::seq(
        [
            Stmt::assign(Arc::clone(&d), outer, Span::unknown()),
            Stmt::return_([var_expr(&d)], Span::unknown()),
        ],
        Span::unknown(),
    );
    let f =
        Function::new("f", vec![a], vec![tensor], body, Span::unknown(), FunctionKind::Opaque);
    let program = Program::new([f], "test", Span::unknown());

    let result = flatten_call_expr().run(&program).unwrap();
    let function = result.get("f").unwrap();
    let text = function.to_string();
    assert!(text.contains("_t0: "), "dump:\n{text}");
    assert!(text.contains("tensor.exp(a)"), "dump:\n{text}");
    assert!(text.contains("tensor.add(_t0, a)"), "dump:\n{text}");

    // Flat body: hoisted assign + original assign + return.
    assert_eq!(body_stmts(function).len(), 3);

    let mut diagnostics = Vec::new();
    crate::verifier::NoNestedCallsVerifier.verify(&result, &mut diagnostics);
    assert!(diagnostics.is_empty(), "unexpected: {diagnostics:?}");
}

// =========================================================================
// normalize_stmt_structure / flatten_single_stmt
// =========================================================================

#[test]
fn bodies_are_wrapped_and_unwrapped() {
    let tensor = tensor_ty(DType::Float32, &[4]);
    let a = var("a", tensor.clone());
    // Bare return as the function body (no Seq).
    let body = Stmt::return_([var_expr(&a)], Span::unknown());
    let f = Function::new(
        "f",
        vec![a],
        vec![tensor],
        body,
        Span::unknown(),
        FunctionKind::Opaque,
    );
    let program = Program::new([f], "test", Span::unknown());

    let normalized = normalize_stmt_structure().run(&program).unwrap();
    assert!(matches!(normalized.get("f").unwrap().body.as_ref(), Stmt::Seq { .. }));
    let mut diagnostics = Vec::new();
    crate::verifier::NormalizedStmtStructureVerifier.verify(&normalized, &mut diagnostics);
    assert!(diagnostics.is_empty(), "unexpected: {diagnostics:?}");

    let flattened = flatten_single_stmt().run(&normalized).unwrap();
    assert!(matches!(flattened.get("f").unwrap().body.as_ref(), Stmt::Return { .. }));
    let mut diagnostics = Vec::new();
    crate::verifier::FlattenedSingleStmtVerifier.verify(&flattened, &mut diagnostics);
    assert!(diagnostics.is_empty(), "unexpected: {diagnostics:?}");
}

// =========================================================================
// outline_incore_scopes
// =========================================================================

#[test]
fn incore_scope_is_outlined_into_a_function() {
    let tensor = tensor_ty(DType::Float32, &[64]);
    let x = var("x", tensor.clone());
    let y = var("y", tensor.clone());
    let scope_body = Stmt::seq(
        [Stmt::assign(
            Arc::clone(&y),
            op_call("tensor.add", vec![var_expr(&x), var_expr(&x)]),
            Span::unknown(),
        )],
        Span::unknown(),
    );
    let body = Stmt::seq(
        [
            Stmt::scope(ScopeKind::InCore, scope_body, Span::unknown()),
            Stmt::return_([var_expr(&y)], Span::unknown()),
        ],
        Span::unknown(),
    );
    let main = Function::new(
        "main",
        vec![x],
        vec![tensor.clone()],
        body,
        Span::unknown(),
        FunctionKind::Opaque,
    );
    let program = Program::new([main], "test", Span::unknown());

    let result = outline_incore_scopes().run(&program).unwrap();
    assert_eq!(result.functions.len(), 2);

    let incore = result.get("main_incore_0").unwrap();
    assert!(incore.is_incore());
    assert_eq!(incore.params.len(), 1);
    assert_eq!(incore.params[0].name, "x");
    assert_eq!(incore.return_types.len(), 1);
    let text = incore.to_string();
    assert!(text.contains("tensor.add(x, x)"), "dump:\n{text}");
    assert!(text.contains("return y"), "dump:\n{text}");

    let main = result.get("main").unwrap();
    let text = main.to_string();
    assert!(text.contains("@main_incore_0(x)"), "dump:\n{text}");
    assert!(text.contains("return y"), "dump:\n{text}");

    // No scopes left: the produced property holds.
    let mut diagnostics = Vec::new();
    crate::verifier::SplitIncoreOrchVerifier.verify(&result, &mut diagnostics);
    assert!(diagnostics.is_empty(), "unexpected: {diagnostics:?}");
}

#[test]
fn scalar_free_vars_become_params_too() {
    let tensor = tensor_ty(DType::Float32, &[8]);
    let x = var("x", tensor.clone());
    let k = var("k", Type::scalar(DType::Int32));
    let y = var("y", tensor.clone());
    let scope_body = Stmt::seq(
        [Stmt::assign(
            Arc::clone(&y),
            op_call("tensor.add_scalar", vec![var_expr(&x), var_expr(&k)]),
            Span::unknown(),
        )],
        Span::unknown(),
    );
    let body = Stmt::seq(
        [
            Stmt::scope(ScopeKind::InCore, scope_body, Span::unknown()),
            Stmt::return_([var_expr(&y)], Span::unknown()),
        ],
        Span::unknown(),
    );
    let main = Function::new(
        "main",
        vec![x, k],
        vec![tensor],
        body,
        Span::unknown(),
        FunctionKind::Opaque,
    );
    let program = Program::new([main], "test", Span::unknown());

    let result = outline_incore_scopes().run(&program).unwrap();
    let incore = result.get("main_incore_0").unwrap();
    let names: Vec<&str> = incore.params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["x", "k"]);
}

/// Outlining then lowering: the two passes compose.
#[test]
fn outline_then_convert_pipeline() {
    let tensor = tensor_ty(DType::Float32, &[64]);
    let x = var("x", tensor.clone());
    let y = var("y", tensor.clone());
    let scope_body = Stmt::seq(
        [Stmt::assign(
            Arc::clone(&y),
            op_call("tensor.add", vec![var_expr(&x), var_expr(&x)]),
            Span::unknown(),
        )],
        Span::unknown(),
    );
    let body = Stmt::seq(
        [
            Stmt::scope(ScopeKind::InCore, scope_body, Span::unknown()),
            Stmt::return_([var_expr(&y)], Span::unknown()),
        ],
        Span::unknown(),
    );
    let main = Function::new(
        "main",
        vec![x],
        vec![tensor],
        body,
        Span::unknown(),
        FunctionKind::Opaque,
    );
    let program = Program::new([main], "test", Span::unknown());

    let outlined = outline_incore_scopes().run(&program).unwrap();
    let lowered = crate::passes::convert_tensor_to_block_ops().run(&outlined).unwrap();

    let text = lowered.to_string();
    assert!(text.contains("block.load"), "dump:\n{text}");
    assert!(text.contains("block.add"), "dump:\n{text}");
    assert!(text.contains("block.store"), "dump:\n{text}");
    assert!(text.contains("tensor.create"), "dump:\n{text}");
}
