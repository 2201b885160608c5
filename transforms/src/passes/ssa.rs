//! SSA conversion: rename re-assigned variables and substitute later uses.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_ir::{Function, Stmt, StmtRef, Var};

use crate::error::Result;
use crate::pass::{Pass, function_pass};
use crate::property::props;
use crate::substitute::{VarMap, substitute};

/// Converts each function to SSA form: the second and later assignments to
/// a name become `name_1`, `name_2`, ... and every subsequent use is
/// redirected to the latest definition.
///
/// Branch bodies are processed in statement order against a single
/// environment; the structured front-end never re-assigns a name across
/// sibling branches before this pass runs.
pub fn convert_to_ssa() -> Pass {
    function_pass(
        |function| {
            let mut state = SsaState::default();
            for param in &function.params {
                state.definitions.insert(param.name.clone(), 1);
            }
            let body = state.rewrite(&function.body)?;
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
        "ConvertToSSA",
        props::CONVERT_TO_SSA,
    )
}

#[derive(Default)]
struct SsaState {
    /// Definition count per base name (params count as one definition).
    definitions: HashMap<String, usize>,
    /// Latest renamed var per original name.
    env: VarMap,
}

impl SsaState {
    fn define(&mut self, var: &Arc<Var>) -> Option<Arc<Var>> {
        let count = self.definitions.entry(var.name.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            return None;
        }
        let renamed = Var::new(
            format!("{}_{}", var.name, *count - 1),
            var.ty.clone(),
            var.span.clone(),
        );
        self.env.insert(var.name.clone(), Arc::clone(&renamed));
        Some(renamed)
    }

    fn rewrite(&mut self, stmt: &StmtRef) -> Result<StmtRef> {
        match stmt.as_ref() {
            Stmt::Assign { var, value, span } => {
                let new_value = substitute(value, &self.env)?;
                let renamed = self.define(var);
                match renamed {
                    Some(new_var) => Ok(Stmt::assign(new_var, new_value, span.clone())),
                    None if Arc::ptr_eq(&new_value, value) => Ok(stmt.clone()),
                    None => Ok(Stmt::assign(Arc::clone(var), new_value, span.clone())),
                }
            }
            Stmt::Eval { expr, span } => {
                let new_expr = substitute(expr, &self.env)?;
                if Arc::ptr_eq(&new_expr, expr) {
                    Ok(stmt.clone())
                } else {
                    Ok(Stmt::eval(new_expr, span.clone()))
                }
            }
            Stmt::Return { values, span } => {
                let mut new_values = Vec::with_capacity(values.len());
                let mut changed = false;
                for value in values {
                    let new_value = substitute(value, &self.env)?;
                    changed |= !Arc::ptr_eq(&new_value, value);
                    new_values.push(new_value);
                }
                if changed {
                    Ok(Stmt::return_(new_values, span.clone()))
                } else {
                    Ok(stmt.clone())
                }
            }
            Stmt::Seq { stmts, span } => {
                let mut new_stmts = Vec::with_capacity(stmts.len());
                let mut changed = false;
                for child in stmts {
                    let new_child = self.rewrite(child)?;
                    changed |= !Arc::ptr_eq(&new_child, child);
                    new_stmts.push(new_child);
                }
                if changed { Ok(Stmt::seq(new_stmts, span.clone())) } else { Ok(stmt.clone()) }
            }
            Stmt::If { cond, then_body, else_body, span } => {
                let new_cond = substitute(cond, &self.env)?;
                let new_then = self.rewrite(then_body)?;
                let new_else = match else_body {
                    Some(else_body) => Some(self.rewrite(else_body)?),
                    None => None,
                };
                let unchanged = Arc::ptr_eq(&new_cond, cond)
                    && Arc::ptr_eq(&new_then, then_body)
                    && match (&new_else, else_body) {
                        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                        (None, None) => true,
                        _ => false,
                    };
                if unchanged {
                    Ok(stmt.clone())
                } else {
                    Ok(Stmt::if_(new_cond, new_then, new_else, span.clone()))
                }
            }
            Stmt::For { var, start, stop, step, body, span } => {
                let new_start = substitute(start, &self.env)?;
                let new_stop = substitute(stop, &self.env)?;
                let new_step = substitute(step, &self.env)?;
                let renamed = self.define(var);
                let new_body = self.rewrite(body)?;
                let unchanged = renamed.is_none()
                    && Arc::ptr_eq(&new_start, start)
                    && Arc::ptr_eq(&new_stop, stop)
                    && Arc::ptr_eq(&new_step, step)
                    && Arc::ptr_eq(&new_body, body);
                if unchanged {
                    Ok(stmt.clone())
                } else {
                    Ok(Stmt::for_(
                        renamed.unwrap_or_else(|| Arc::clone(var)),
                        new_start,
                        new_stop,
                        new_step,
                        new_body,
                        span.clone(),
                    ))
                }
            }
            Stmt::Scope { kind, body, span } => {
                let new_body = self.rewrite(body)?;
                if Arc::ptr_eq(&new_body, body) {
                    Ok(stmt.clone())
                } else {
                    Ok(Stmt::scope(*kind, new_body, span.clone()))
                }
            }
        }
    }
}
