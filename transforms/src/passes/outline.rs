//! Outline `InCore` scope regions into standalone functions.

use std::collections::HashSet;
use std::sync::Arc;

use tessera_ir::{
    Callee, Expr, ExprRef, Function, FunctionKind, GlobalVar, Program, ProgramRef, ScopeKind,
    Stmt, StmtRef, Type, Var, VarRef,
};

use crate::error::{Error, Result};
use crate::pass::{Pass, program_pass};
use crate::property::props;

/// Extracts every top-level `InCore` scope of a non-InCore function into a
/// fresh `InCore` function `{fn}_incore_{i}`, replacing the scope with a
/// call. Free variables of the region become parameters; region
/// definitions used afterwards become return values.
///
/// Scopes nested inside `If`/`For` are left in place; the
/// `SplitIncoreOrch` verifier reports them.
pub fn outline_incore_scopes() -> Pass {
    program_pass(
        |program: &ProgramRef| {
            let mut rewritten = Vec::new();
            let mut outlined = Vec::new();
            for function in program.functions() {
                if function.is_incore() {
                    rewritten.push(function.clone());
                    continue;
                }
                rewritten.push(outline_function(function, &mut outlined)?);
            }
            rewritten.extend(outlined);
            Ok(Program::new(rewritten, program.name.clone(), program.span.clone()))
        },
        "OutlineIncoreScopes",
        props::OUTLINE_INCORE_SCOPES,
    )
}

fn outline_function(
    function: &Arc<Function>,
    outlined: &mut Vec<Arc<Function>>,
) -> Result<Arc<Function>> {
    let stmts = Stmt::flatten(&function.body);
    let mut new_stmts = Vec::with_capacity(stmts.len());
    let mut scope_index = 0usize;
    let mut changed = false;

    for (position, stmt) in stmts.iter().enumerate() {
        let Stmt::Scope { kind: ScopeKind::InCore, body, span } = stmt.as_ref() else {
            new_stmts.push(stmt.clone());
            continue;
        };
        changed = true;

        let region = Stmt::flatten(body);
        let defined = assigned_vars(&region);
        let defined_names: HashSet<&str> = defined.iter().map(|v| v.name.as_str()).collect();

        // Free variables of the region, in first-use order.
        let mut params = Vec::new();
        let mut seen = HashSet::new();
        for var in var_uses(&region) {
            if !defined_names.contains(var.name.as_str()) && seen.insert(var.name.clone()) {
                params.push(var);
            }
        }

        // Region definitions referenced by later statements.
        let mut used_after = HashSet::new();
        for later in &stmts[position + 1..] {
            for var in var_uses(&[later.clone()]) {
                used_after.insert(var.name.clone());
            }
        }
        let outputs: Vec<VarRef> =
            defined.iter().filter(|v| used_after.contains(&v.name)).cloned().collect();

        let name = format!("{}_incore_{}", function.name, scope_index);
        scope_index += 1;

        // The outlined function returns the escaping definitions.
        let mut incore_body = region.clone();
        incore_body.push(Stmt::return_(
            outputs.iter().map(|v| Expr::var(Arc::clone(v))),
            span.clone(),
        ));
        let return_types: Vec<_> = outputs.iter().map(|v| v.ty.clone()).collect();
        let incore = Function::new(
            name.clone(),
            params.clone(),
            return_types.clone(),
            Stmt::seq(incore_body, span.clone()),
            span.clone(),
            FunctionKind::InCore,
        );
        outlined.push(incore);

        // Replace the scope with a call at the original position.
        let call_ty = match return_types.len() {
            0 => None,
            1 => Some(return_types[0].clone()),
            _ => Some(Type::tuple(return_types.clone())),
        };
        let call = Expr::call(
            Callee::Global(GlobalVar::new(name.clone(), span.clone())),
            params.iter().map(|p| Expr::var(Arc::clone(p))),
            vec![],
            call_ty.clone(),
            span.clone(),
        );
        match outputs.len() {
            0 => new_stmts.push(Stmt::eval(call, span.clone())),
            1 => {
                let out = &outputs[0];
                let var = Var::new(out.name.clone(), out.ty.clone(), out.span.clone());
                new_stmts.push(Stmt::assign(var, call, span.clone()));
            }
            _ => {
                let tuple_ty = call_ty
                    .ok_or_else(|| Error::internal("multi-output call lost its tuple type"))?;
                let tuple_var = Var::new(format!("{name}_ret"), tuple_ty, span.clone());
                new_stmts.push(Stmt::assign(Arc::clone(&tuple_var), call, span.clone()));
                for (index, out) in outputs.iter().enumerate() {
                    let var = Var::new(out.name.clone(), out.ty.clone(), out.span.clone());
                    new_stmts.push(Stmt::assign(
                        var,
                        Expr::tuple_get(Expr::var(Arc::clone(&tuple_var)), index, span.clone()),
                        span.clone(),
                    ));
                }
            }
        }
    }

    if !changed {
        return Ok(function.clone());
    }
    Ok(Function::new(
        function.name.clone(),
        function.params.clone(),
        function.return_types.clone(),
        Stmt::seq(new_stmts, function.span.clone()),
        function.span.clone(),
        function.kind,
    ))
}

/// Variables assigned (or bound by a loop) anywhere in `stmts`, in order.
fn assigned_vars(stmts: &[StmtRef]) -> Vec<VarRef> {
    let mut vars = Vec::new();
    for stmt in stmts {
        walk(stmt, &mut |stmt| match stmt {
            Stmt::Assign { var, .. } | Stmt::For { var, .. } => vars.push(Arc::clone(var)),
            _ => {}
        });
    }
    vars
}

/// Every variable reference in `stmts`, in traversal order.
fn var_uses(stmts: &[StmtRef]) -> Vec<VarRef> {
    let mut vars = Vec::new();
    let mut record = |expr: &ExprRef| {
        expr.for_each_var(&mut |var| vars.push(Arc::clone(var)));
    };
    for stmt in stmts {
        walk(stmt, &mut |stmt| match stmt {
            Stmt::Assign { value, .. } => record(value),
            Stmt::Eval { expr, .. } => record(expr),
            Stmt::If { cond, .. } => record(cond),
            Stmt::For { start, stop, step, .. } => {
                record(start);
                record(stop);
                record(step);
            }
            Stmt::Return { values, .. } => values.iter().for_each(&mut record),
            Stmt::Seq { .. } | Stmt::Scope { .. } => {}
        });
    }
    vars
}

fn walk(stmt: &StmtRef, f: &mut impl FnMut(&Stmt)) {
    f(stmt.as_ref());
    match stmt.as_ref() {
        Stmt::Seq { stmts, .. } => stmts.iter().for_each(|child| walk(child, f)),
        Stmt::If { then_body, else_body, .. } => {
            walk(then_body, f);
            if let Some(else_body) = else_body {
                walk(else_body, f);
            }
        }
        Stmt::For { body, .. } | Stmt::Scope { body, .. } => walk(body, f),
        _ => {}
    }
}
