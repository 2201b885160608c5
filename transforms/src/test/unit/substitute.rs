//! Substitution contract: identity preservation and the scalar-operand
//! invariant.

use std::sync::Arc;

use tessera_dtype::DType;
use tessera_ir::{BinaryOp, Expr, MemorySpace, Span, Type};

use crate::substitute::{VarMap, substitute};
use crate::test::{dim, op_call, var, var_expr};

#[test]
fn empty_map_returns_the_same_pointer() {
    let a = var("a", Type::scalar(DType::Int32));
    let expr = op_call("block.add", vec![var_expr(&a), var_expr(&a)]);
    let result = substitute(&expr, &VarMap::new()).unwrap();
    assert!(Arc::ptr_eq(&result, &expr));
}

#[test]
fn unmapped_expr_returns_the_same_pointer() {
    let a = var("a", Type::tile(DType::Float32, [dim(4)], MemorySpace::UB));
    let expr = op_call("block.exp", vec![var_expr(&a)]);
    let mut map = VarMap::new();
    map.insert("unrelated".to_string(), var("x", Type::scalar(DType::Int32)));
    let result = substitute(&expr, &map).unwrap();
    assert!(Arc::ptr_eq(&result, &expr));
}

#[test]
fn mapped_var_is_replaced_in_calls_and_tuples() {
    let tensor = crate::test::tensor_ty(DType::Float32, &[4]);
    let a = var("a", tensor.clone());
    let tile = var("a_tile", Type::tile(DType::Float32, [dim(4)], MemorySpace::UB));
    let mut map = VarMap::new();
    map.insert("a".to_string(), Arc::clone(&tile));

    let tuple = Expr::make_tuple([var_expr(&a), dim(1)], Span::unknown());
    let expr = Expr::tuple_get(tuple, 0, Span::unknown());
    let result = substitute(&expr, &map).unwrap();
    assert!(!Arc::ptr_eq(&result, &expr));
    assert!(result.to_string().contains("a_tile"));

    // The replacement is the mapped var itself, not a copy.
    let Expr::TupleGetItem { tuple: new_tuple, .. } = result.as_ref() else { unreachable!() };
    let Expr::MakeTuple { elements, .. } = new_tuple.as_ref() else { unreachable!() };
    assert!(Arc::ptr_eq(elements[0].as_var().unwrap(), &tile));
}

#[test]
fn scalar_operand_substitution_is_an_internal_error() {
    let k = var("k", Type::scalar(DType::Int32));
    let expr = Expr::binary(
        BinaryOp::Add,
        var_expr(&k),
        Expr::const_int(1, DType::Int32, Span::unknown()),
        Span::unknown(),
    );
    let mut map = VarMap::new();
    map.insert("k".to_string(), var("k_tile", Type::scalar(DType::Int32)));

    let err = substitute(&expr, &map).unwrap_err();
    assert!(err.to_string().contains("internal invariant"), "unexpected: {err}");
}

#[test]
fn scalar_operands_without_mappings_are_fine() {
    let k = var("k", Type::scalar(DType::Int32));
    let expr = Expr::binary(
        BinaryOp::Mul,
        var_expr(&k),
        var_expr(&k),
        Span::unknown(),
    );
    let mut map = VarMap::new();
    map.insert("other".to_string(), var("o", Type::scalar(DType::Int32)));
    let result = substitute(&expr, &map).unwrap();
    assert!(Arc::ptr_eq(&result, &expr));
}
