//! Statement/expression shape normalization passes.
//!
//! - `flatten_call_expr`: hoists calls out of call arguments into fresh
//!   temporaries, so every call's arguments are call-free.
//! - `normalize_stmt_structure`: wraps every body position in a `Seq`.
//! - `flatten_single_stmt`: collapses one-element `Seq`s recursively.

use std::sync::Arc;

use tessera_ir::{Expr, ExprRef, Function, Span, Stmt, StmtRef, Var};

use crate::error::{Error, Result};
use crate::pass::{Pass, function_pass};
use crate::property::props;

// =========================================================================
// flatten_call_expr
// =========================================================================

pub fn flatten_call_expr() -> Pass {
    function_pass(
        |function| {
            let mut counter = 0usize;
            let body = flatten_calls_in_stmt(&function.body, &mut counter)?;
            if Arc::ptr_eq(&body, &function.body) {
                return Ok(function.clone());
            }
            Ok(Function::new(
                function.name.clone(),
                function.params.clone(),
                function.return_types.clone(),
                body,
                function.span.clone(),
                function.kind,
            ))
        },
        "FlattenCallExpr",
        props::FLATTEN_CALL_EXPR,
    )
}

fn flatten_calls_in_stmt(stmt: &StmtRef, counter: &mut usize) -> Result<StmtRef> {
    match stmt.as_ref() {
        Stmt::Assign { var, value, span } => {
            let mut prologue = Vec::new();
            // The top-level call keeps its position; only nested calls in
            // its arguments are hoisted.
            let new_value = match value.as_ref() {
                Expr::Call(_) => hoist_in_children(value, &mut prologue, counter, span)?,
                _ => hoist_calls(value, &mut prologue, counter, span)?,
            };
            if prologue.is_empty() && Arc::ptr_eq(&new_value, value) {
                return Ok(stmt.clone());
            }
            prologue.push(Stmt::assign(Arc::clone(var), new_value, span.clone()));
            Ok(Stmt::seq(prologue, span.clone()))
        }
        Stmt::Eval { expr, span } => {
            let mut prologue = Vec::new();
            let new_expr = match expr.as_ref() {
                Expr::Call(_) => hoist_in_children(expr, &mut prologue, counter, span)?,
                _ => hoist_calls(expr, &mut prologue, counter, span)?,
            };
            if prologue.is_empty() && Arc::ptr_eq(&new_expr, expr) {
                return Ok(stmt.clone());
            }
            prologue.push(Stmt::eval(new_expr, span.clone()));
            Ok(Stmt::seq(prologue, span.clone()))
        }
        Stmt::Return { values, span } => {
            let mut prologue = Vec::new();
            let mut new_values = Vec::with_capacity(values.len());
            let mut changed = false;
            for value in values {
                let new_value = hoist_calls(value, &mut prologue, counter, span)?;
                changed |= !Arc::ptr_eq(&new_value, value);
                new_values.push(new_value);
            }
            if prologue.is_empty() && !changed {
                return Ok(stmt.clone());
            }
            prologue.push(Stmt::return_(new_values, span.clone()));
            Ok(Stmt::seq(prologue, span.clone()))
        }
        Stmt::Seq { stmts, span } => {
            let mut new_stmts = Vec::with_capacity(stmts.len());
            let mut changed = false;
            for child in stmts {
                let new_child = flatten_calls_in_stmt(child, counter)?;
                let child_changed = !Arc::ptr_eq(&new_child, child);
                changed |= child_changed;
                // A non-Seq child that came back as a Seq gained a hoisted
                // prologue; splice it directly into this sequence.
                let was_seq = matches!(child.as_ref(), Stmt::Seq { .. });
                match new_child.as_ref() {
                    Stmt::Seq { stmts: inner, .. } if child_changed && !was_seq => {
                        new_stmts.extend(inner.iter().cloned())
                    }
                    _ => new_stmts.push(new_child),
                }
            }
            if !changed {
                return Ok(stmt.clone());
            }
            Ok(Stmt::seq(new_stmts, span.clone()))
        }
        Stmt::If { cond, then_body, else_body, span } => {
            let new_then = flatten_calls_in_stmt(then_body, counter)?;
            let new_else = match else_body {
                Some(else_body) => Some(flatten_calls_in_stmt(else_body, counter)?),
                None => None,
            };
            let unchanged = Arc::ptr_eq(&new_then, then_body)
                && match (&new_else, else_body) {
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                    (None, None) => true,
                    _ => false,
                };
            if unchanged {
                return Ok(stmt.clone());
            }
            Ok(Stmt::if_(cond.clone(), new_then, new_else, span.clone()))
        }
        Stmt::For { var, start, stop, step, body, span } => {
            let new_body = flatten_calls_in_stmt(body, counter)?;
            if Arc::ptr_eq(&new_body, body) {
                return Ok(stmt.clone());
            }
            Ok(Stmt::for_(
                Arc::clone(var),
                start.clone(),
                stop.clone(),
                step.clone(),
                new_body,
                span.clone(),
            ))
        }
        Stmt::Scope { kind, body, span } => {
            let new_body = flatten_calls_in_stmt(body, counter)?;
            if Arc::ptr_eq(&new_body, body) {
                return Ok(stmt.clone());
            }
            Ok(Stmt::scope(*kind, new_body, span.clone()))
        }
    }
}

/// Hoist every call in `expr` (including `expr` itself) into temporaries.
fn hoist_calls(
    expr: &ExprRef,
    prologue: &mut Vec<StmtRef>,
    counter: &mut usize,
    span: &Span,
) -> Result<ExprRef> {
    let expr = hoist_in_children(expr, prologue, counter, span)?;
    if !matches!(expr.as_ref(), Expr::Call(_)) {
        return Ok(expr);
    }
    let ty = expr
        .ty()
        .ok_or_else(|| Error::internal("cannot hoist a valueless call into a temporary"))?;
    let name = format!("_t{}", *counter);
    *counter += 1;
    let var = Var::new(name, ty, span.clone());
    prologue.push(Stmt::assign(Arc::clone(&var), expr, span.clone()));
    Ok(Expr::var(var))
}

/// Hoist calls out of `expr`'s children, leaving `expr`'s own kind alone.
fn hoist_in_children(
    expr: &ExprRef,
    prologue: &mut Vec<StmtRef>,
    counter: &mut usize,
    span: &Span,
) -> Result<ExprRef> {
    match expr.as_ref() {
        Expr::Call(call) => {
            let mut new_args = Vec::with_capacity(call.args.len());
            let mut changed = false;
            for arg in &call.args {
                let new_arg = hoist_calls(arg, prologue, counter, span)?;
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
        Expr::MakeTuple { elements, span: tuple_span } => {
            let mut new_elements = Vec::with_capacity(elements.len());
            let mut changed = false;
            for element in elements {
                let new_element = hoist_calls(element, prologue, counter, span)?;
                changed |= !Arc::ptr_eq(&new_element, element);
                new_elements.push(new_element);
            }
            if !changed {
                return Ok(expr.clone());
            }
            Ok(Expr::make_tuple(new_elements, tuple_span.clone()))
        }
        Expr::TupleGetItem { tuple, index, span: item_span } => {
            let new_tuple = hoist_calls(tuple, prologue, counter, span)?;
            if Arc::ptr_eq(&new_tuple, tuple) {
                return Ok(expr.clone());
            }
            Ok(Expr::tuple_get(new_tuple, *index, item_span.clone()))
        }
        _ => Ok(expr.clone()),
    }
}

// =========================================================================
// normalize_stmt_structure / flatten_single_stmt
// =========================================================================

pub fn normalize_stmt_structure() -> Pass {
    function_pass(
        |function| {
            let body = normalize_stmt(&function.body, true)?;
            if Arc::ptr_eq(&body, &function.body) {
                return Ok(function.clone());
            }
            Ok(Function::new(
                function.name.clone(),
                function.params.clone(),
                function.return_types.clone(),
                body,
                function.span.clone(),
                function.kind,
            ))
        },
        "NormalizeStmtStructure",
        props::NORMALIZE_STMT_STRUCTURE,
    )
}

/// Ensure every body position is a `Seq`; `wrap` marks body positions.
fn normalize_stmt(stmt: &StmtRef, wrap: bool) -> Result<StmtRef> {
    let normalized = match stmt.as_ref() {
        Stmt::Seq { stmts, span } => {
            let mut new_stmts = Vec::with_capacity(stmts.len());
            let mut changed = false;
            for child in stmts {
                let new_child = normalize_stmt(child, false)?;
                changed |= !Arc::ptr_eq(&new_child, child);
                new_stmts.push(new_child);
            }
            if changed { Stmt::seq(new_stmts, span.clone()) } else { stmt.clone() }
        }
        Stmt::If { cond, then_body, else_body, span } => {
            let new_then = normalize_stmt(then_body, true)?;
            let new_else = match else_body {
                Some(else_body) => Some(normalize_stmt(else_body, true)?),
                None => None,
            };
            let unchanged = Arc::ptr_eq(&new_then, then_body)
                && match (&new_else, else_body) {
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                    (None, None) => true,
                    _ => false,
                };
            if unchanged {
                stmt.clone()
            } else {
                Stmt::if_(cond.clone(), new_then, new_else, span.clone())
            }
        }
        Stmt::For { var, start, stop, step, body, span } => {
            let new_body = normalize_stmt(body, true)?;
            if Arc::ptr_eq(&new_body, body) {
                stmt.clone()
            } else {
                Stmt::for_(
                    Arc::clone(var),
                    start.clone(),
                    stop.clone(),
                    step.clone(),
                    new_body,
                    span.clone(),
                )
            }
        }
        Stmt::Scope { kind, body, span } => {
            let new_body = normalize_stmt(body, true)?;
            if Arc::ptr_eq(&new_body, body) {
                stmt.clone()
            } else {
                Stmt::scope(*kind, new_body, span.clone())
            }
        }
        Stmt::Assign { .. } | Stmt::Eval { .. } | Stmt::Return { .. } => stmt.clone(),
    };
    if wrap && !matches!(normalized.as_ref(), Stmt::Seq { .. }) {
        let span = normalized.span().clone();
        return Ok(Stmt::seq([normalized], span));
    }
    Ok(normalized)
}

pub fn flatten_single_stmt() -> Pass {
    function_pass(
        |function| {
            let body = flatten_stmt(&function.body)?;
            if Arc::ptr_eq(&body, &function.body) {
                return Ok(function.clone());
            }
            Ok(Function::new(
                function.name.clone(),
                function.params.clone(),
                function.return_types.clone(),
                body,
                function.span.clone(),
                function.kind,
            ))
        },
        "FlattenSingleStmt",
        props::FLATTEN_SINGLE_STMT,
    )
}

fn flatten_stmt(stmt: &StmtRef) -> Result<StmtRef> {
    match stmt.as_ref() {
        Stmt::Seq { stmts, span } => {
            if stmts.len() == 1 {
                return flatten_stmt(&stmts[0]);
            }
            let mut new_stmts = Vec::with_capacity(stmts.len());
            let mut changed = false;
            for child in stmts {
                let new_child = flatten_stmt(child)?;
                changed |= !Arc::ptr_eq(&new_child, child);
                new_stmts.push(new_child);
            }
            if changed { Ok(Stmt::seq(new_stmts, span.clone())) } else { Ok(stmt.clone()) }
        }
        Stmt::If { cond, then_body, else_body, span } => {
            let new_then = flatten_stmt(then_body)?;
            let new_else = match else_body {
                Some(else_body) => Some(flatten_stmt(else_body)?),
                None => None,
            };
            let unchanged = Arc::ptr_eq(&new_then, then_body)
                && match (&new_else, else_body) {
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                    (None, None) => true,
                    _ => false,
                };
            if unchanged {
                Ok(stmt.clone())
            } else {
                Ok(Stmt::if_(cond.clone(), new_then, new_else, span.clone()))
            }
        }
        Stmt::For { var, start, stop, step, body, span } => {
            let new_body = flatten_stmt(body)?;
            if Arc::ptr_eq(&new_body, body) {
                Ok(stmt.clone())
            } else {
                Ok(Stmt::for_(
                    Arc::clone(var),
                    start.clone(),
                    stop.clone(),
                    step.clone(),
                    new_body,
                    span.clone(),
                ))
            }
        }
        Stmt::Scope { kind, body, span } => {
            let new_body = flatten_stmt(body)?;
            if Arc::ptr_eq(&new_body, body) {
                Ok(stmt.clone())
            } else {
                Ok(Stmt::scope(*kind, new_body, span.clone()))
            }
        }
        Stmt::Assign { .. } | Stmt::Eval { .. } | Stmt::Return { .. } => Ok(stmt.clone()),
    }
}
