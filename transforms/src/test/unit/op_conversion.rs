//! Conversion registry semantics: simple rules, custom rules, overrides.

use std::sync::Arc;

use test_case::test_case;
use tessera_dtype::DType;
use tessera_ir::{
    Callee, Expr, KwArg, MemorySpace, OpRegistry, Span, Type, structural_equal,
};

use crate::op_conversion::{ConversionCtx, ConversionFunc, OpConversionRegistry};
use crate::test::{dim, var, var_expr};

#[test_case("tensor.add", "block.add")]
#[test_case("tensor.sub", "block.sub")]
#[test_case("tensor.mul", "block.mul")]
#[test_case("tensor.div", "block.div")]
#[test_case("tensor.maximum", "block.maximum")]
#[test_case("tensor.add_scalar", "block.adds")]
#[test_case("tensor.sub_scalar", "block.subs")]
#[test_case("tensor.mul_scalar", "block.muls")]
#[test_case("tensor.div_scalar", "block.divs")]
#[test_case("tensor.exp", "block.exp")]
#[test_case("tensor.reshape", "block.reshape")]
#[test_case("tensor.transpose", "block.transpose")]
fn default_table_maps(from: &str, to: &str) {
    let registry = OpConversionRegistry::global();
    assert!(registry.has_conversion(from), "{from} missing from default table");

    let tile = var("t", Type::tile(DType::Float32, [dim(8), dim(8)], MemorySpace::UB));
    let args = match to {
        "block.reshape" => {
            vec![var_expr(&tile), Expr::make_tuple([dim(64)], Span::unknown())]
        }
        "block.adds" | "block.subs" | "block.muls" | "block.divs" => {
            vec![var_expr(&tile), Expr::const_int(2, DType::Int32, Span::unknown())]
        }
        "block.exp" | "block.transpose" => vec![var_expr(&tile)],
        _ => vec![var_expr(&tile), var_expr(&tile)],
    };

    let rule = registry.lookup(from).unwrap();
    let result = rule(&args, &[], &Span::unknown()).unwrap();
    assert!(result.prologue.is_empty());
    let call = result.result.as_call().unwrap();
    assert_eq!(call.callee.name(), to);
}

/// `register_simple(x, y)` then `lookup(x)` yields a rule that produces a
/// bare `Call(op = y, args, kwargs)` with an empty prologue.
#[test]
fn simple_rule_contract() {
    let registry = OpConversionRegistry::global();
    registry.register_simple("tensor.maximum", "block.maximum");

    let tile = var("t", Type::tile(DType::Float32, [dim(4)], MemorySpace::UB));
    let args = vec![var_expr(&tile), var_expr(&tile)];
    let rule = registry.lookup("tensor.maximum").unwrap();
    let result = rule(&args, &[], &Span::unknown()).unwrap();

    assert!(result.prologue.is_empty());
    let expected = OpRegistry::global()
        .create("block.maximum", args, vec![], Span::unknown())
        .unwrap();
    assert!(structural_equal(&result.result, &expected, false));
}

#[test]
fn lookup_missing_is_none() {
    let registry = OpConversionRegistry::global();
    assert!(!registry.has_conversion("tensor.no_such_op"));
    assert!(registry.lookup("tensor.no_such_op").is_none());
}

/// A simple rule naming a nonexistent target op fails at invocation time,
/// not at registration.
#[test]
fn missing_target_op_fails_at_invocation() {
    let registry = OpConversionRegistry::global();
    registry.register_simple("tensor.test_bogus_target", "block.does_not_exist");

    let rule = registry.lookup("tensor.test_bogus_target").unwrap();
    let err = rule(&[], &[], &Span::unknown()).unwrap_err();
    assert!(err.to_string().contains("block.does_not_exist"), "unexpected: {err}");
}

/// Last-writer-wins override.
#[test]
fn reregistration_replaces() {
    let registry = OpConversionRegistry::global();
    registry.register_simple("tensor.test_override", "block.add");

    let marker: ConversionFunc = Arc::new(|_args, _kwargs, span| {
        Ok(crate::op_conversion::ConversionResult::expr(Expr::const_int(
            42,
            DType::Int32,
            span.clone(),
        )))
    });
    registry.register_custom("tensor.test_override", marker);

    let rule = registry.lookup("tensor.test_override").unwrap();
    let result = rule(&[], &[], &Span::unknown()).unwrap();
    match result.result.as_ref() {
        Expr::ConstInt { value: 42, .. } => {}
        other => panic!("override did not take effect: {other}"),
    }
}

/// A custom rule staging matmul operands through `block.move` into the
/// matrix-unit buffers, built with the prologue ctx.
#[test]
fn custom_matmul_rule_with_prologue() {
    let registry = OpConversionRegistry::global();
    let rule: ConversionFunc = Arc::new(|args, _kwargs, span| {
        let ops = OpRegistry::global();
        let mut ctx = ConversionCtx::new(span.clone());
        let lhs = ctx.let_(
            "lhs_l0a",
            ops.create(
                "block.move",
                vec![args[0].clone()],
                vec![("target_memory".to_string(), KwArg::Memory(MemorySpace::L0A))],
                span.clone(),
            )?,
        )?;
        let rhs = ctx.let_(
            "rhs_l0b",
            ops.create(
                "block.move",
                vec![args[1].clone()],
                vec![("target_memory".to_string(), KwArg::Memory(MemorySpace::L0B))],
                span.clone(),
            )?,
        )?;
        let result = ops.create("block.matmul", vec![lhs, rhs], vec![], span.clone())?;
        Ok(ctx.finish(result))
    });
    registry.register_custom("tensor.test_matmul", rule);

    let lhs = var("a", Type::tile(DType::Float16, [dim(16), dim(32)], MemorySpace::UB));
    let rhs = var("b", Type::tile(DType::Float16, [dim(32), dim(64)], MemorySpace::UB));
    let rule = registry.lookup("tensor.test_matmul").unwrap();
    let result = rule(&[var_expr(&lhs), var_expr(&rhs)], &[], &Span::unknown()).unwrap();

    assert_eq!(result.prologue.len(), 2);
    let call = result.result.as_call().unwrap();
    assert_eq!(call.callee.name(), "block.matmul");
    assert!(matches!(call.callee, Callee::Op(_)));
    let (_, shape, _) = call.ty.as_ref().unwrap().as_tile().unwrap();
    assert_eq!(shape.len(), 2);

    // Prologue operands landed in the matrix-unit memory spaces.
    let first = result.prologue[0].as_assign().unwrap();
    let (_, _, memory) = first.0.ty.as_tile().unwrap();
    assert_eq!(memory, MemorySpace::L0A);
}
