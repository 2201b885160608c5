//! Proptest strategies for scalar expression trees.

use proptest::prelude::*;
use tessera_dtype::DType;

use crate::{BinaryOp, Expr, ExprRef, Span, Type, UnaryOp, Var};

pub fn arb_span() -> impl Strategy<Value = Span> {
    ("[a-z]{1,8}", 0u32..1000, 0u32..200).prop_map(|(file, line, column)| {
        Span::new(format!("{file}.py"), line, column)
    })
}

fn arb_binary_op() -> impl Strategy<Value = BinaryOp> {
    prop::sample::select(vec![
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Min,
        BinaryOp::Max,
    ])
}

fn arb_leaf() -> impl Strategy<Value = ExprRef> {
    prop_oneof![
        (any::<i64>(), arb_span())
            .prop_map(|(value, span)| Expr::const_int(value, DType::Int64, span)),
        (any::<f64>(), arb_span())
            .prop_map(|(value, span)| Expr::const_float(value, DType::Float64, span)),
        ("[a-z]{1,5}", arb_span())
            .prop_map(|(name, span)| Expr::var(Var::new(name, Type::scalar(DType::Int32), span))),
    ]
}

pub fn arb_expr() -> impl Strategy<Value = ExprRef> {
    arb_leaf().prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (arb_binary_op(), inner.clone(), inner.clone(), arb_span())
                .prop_map(|(op, lhs, rhs, span)| Expr::binary(op, lhs, rhs, span)),
            (inner.clone(), arb_span())
                .prop_map(|(operand, span)| Expr::unary(UnaryOp::Neg, operand, span)),
            (prop::collection::vec(inner.clone(), 1..4), arb_span())
                .prop_map(|(elements, span)| Expr::make_tuple(elements, span)),
        ]
    })
}

/// Rebuild an expression with every span replaced, leaving structure intact.
pub fn respan(expr: &ExprRef) -> ExprRef {
    let span = Span::unknown();
    match expr.as_ref() {
        Expr::Var(var) => {
            Expr::var(Var::new(var.name.clone(), var.ty.clone(), span))
        }
        Expr::ConstInt { value, dtype, .. } => Expr::const_int(*value, *dtype, span),
        Expr::ConstFloat { value, dtype, .. } => Expr::const_float(*value, *dtype, span),
        Expr::Binary { op, lhs, rhs, .. } => Expr::binary(*op, respan(lhs), respan(rhs), span),
        Expr::Unary { op, operand, .. } => Expr::unary(*op, respan(operand), span),
        Expr::Call(call) => Expr::call(
            call.callee.clone(),
            call.args.iter().map(respan),
            call.kwargs.clone(),
            call.ty.clone(),
            span,
        ),
        Expr::MakeTuple { elements, .. } => {
            Expr::make_tuple(elements.iter().map(respan), span)
        }
        Expr::TupleGetItem { tuple, index, .. } => Expr::tuple_get(respan(tuple), *index, span),
    }
}
