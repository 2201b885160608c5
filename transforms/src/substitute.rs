//! Name-keyed variable substitution over expressions.
//!
//! Rebuilds an expression with `Var` leaves replaced through the map. The
//! routine is identity-preserving: when nothing changes, the original
//! handle is returned unchanged so downstream sharing (and pointer-keyed
//! caches) stay intact.

use std::sync::Arc;

use tessera_ir::{Expr, ExprRef, VarRef};

use crate::error::{Error, Result};

pub type VarMap = std::collections::HashMap<String, VarRef>;

/// Replace mapped variables throughout `expr`.
///
/// `Binary`/`Unary` operands are scalar by construction and may never refer
/// to a tensor/tile variable; a substitution that would fire inside one of
/// them indicates a broken invariant upstream and is reported as an
/// internal error.
pub fn substitute(expr: &ExprRef, var_map: &VarMap) -> Result<ExprRef> {
    if var_map.is_empty() {
        return Ok(expr.clone());
    }
    match expr.as_ref() {
        Expr::Var(var) => match var_map.get(&var.name) {
            Some(replacement) => Ok(Expr::var(Arc::clone(replacement))),
            None => Ok(expr.clone()),
        },
        Expr::Call(call) => {
            let mut new_args = Vec::with_capacity(call.args.len());
            let mut changed = false;
            for arg in &call.args {
                let new_arg = substitute(arg, var_map)?;
                changed |= !Arc::ptr_eq(&new_arg, arg);
                new_args.push(new_arg);
            }
            if !changed {
                return Ok(expr.clone());
            }
            Ok(Expr::call(
                call.callee.clone(),
                new_args,
                call.kwargs.clone(),
                call.ty.clone(),
                call.span.clone(),
            ))
        }
        Expr::MakeTuple { elements, span } => {
            let mut new_elements = Vec::with_capacity(elements.len());
            let mut changed = false;
            for element in elements {
                let new_element = substitute(element, var_map)?;
                changed |= !Arc::ptr_eq(&new_element, element);
                new_elements.push(new_element);
            }
            if !changed {
                return Ok(expr.clone());
            }
            Ok(Expr::make_tuple(new_elements, span.clone()))
        }
        Expr::TupleGetItem { tuple, index, span } => {
            let new_tuple = substitute(tuple, var_map)?;
            if Arc::ptr_eq(&new_tuple, tuple) {
                return Ok(expr.clone());
            }
            Ok(Expr::tuple_get(new_tuple, *index, span.clone()))
        }
        Expr::Binary { lhs, rhs, .. } => {
            let new_lhs = substitute(lhs, var_map)?;
            let new_rhs = substitute(rhs, var_map)?;
            if !Arc::ptr_eq(&new_lhs, lhs) || !Arc::ptr_eq(&new_rhs, rhs) {
                return Err(Error::internal(
                    "binary operand substitution attempted: scalar expressions must not \
                     reference tensor/tile variables",
                ));
            }
            Ok(expr.clone())
        }
        Expr::Unary { operand, .. } => {
            let new_operand = substitute(operand, var_map)?;
            if !Arc::ptr_eq(&new_operand, operand) {
                return Err(Error::internal(
                    "unary operand substitution attempted: scalar expressions must not \
                     reference tensor/tile variables",
                ));
            }
            Ok(expr.clone())
        }
        Expr::ConstInt { .. } | Expr::ConstFloat { .. } => Ok(expr.clone()),
    }
}
