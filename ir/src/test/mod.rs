pub mod property;
pub mod unit;

use std::sync::Arc;

use tessera_dtype::DType;

use crate::{Expr, ExprRef, Span, Type, TypeRef, Var, VarRef};

/// Constant shape dimension.
pub fn dim(value: i64) -> ExprRef {
    Expr::const_int(value, DType::Int64, Span::unknown())
}

/// Rank-1 tensor type.
pub fn tensor1(dtype: DType, size: i64) -> TypeRef {
    Type::tensor(dtype, [dim(size)])
}

/// Rank-2 tensor type.
pub fn tensor2(dtype: DType, rows: i64, cols: i64) -> TypeRef {
    Type::tensor(dtype, [dim(rows), dim(cols)])
}

pub fn scalar_var(name: &str, dtype: DType) -> VarRef {
    Var::new(name, Type::scalar(dtype), Span::unknown())
}

pub fn var_expr(var: &VarRef) -> ExprRef {
    Expr::var(Arc::clone(var))
}
