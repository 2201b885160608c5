//! Built-in property verifiers.
//!
//! One verifier per property tag; names equal property names. The
//! `IncoreBlockOps` verifier lives next to the pass that produces the
//! property, in [`crate::passes::convert_tensor_to_block_ops`].

use tessera_ir::{Expr, Function, Program, Stmt, StmtRef, structural_equal};

use super::{Diagnostic, PropertyVerifier};

/// Pre-order walk over a statement tree, including nested bodies.
pub(crate) fn walk_stmts(stmt: &StmtRef, f: &mut impl FnMut(&StmtRef)) {
    f(stmt);
    match stmt.as_ref() {
        Stmt::Seq { stmts, .. } => {
            for child in stmts {
                walk_stmts(child, f);
            }
        }
        Stmt::If { then_body, else_body, .. } => {
            walk_stmts(then_body, f);
            if let Some(else_body) = else_body {
                walk_stmts(else_body, f);
            }
        }
        Stmt::For { body, .. } | Stmt::Scope { body, .. } => walk_stmts(body, f),
        Stmt::Assign { .. } | Stmt::Eval { .. } | Stmt::Return { .. } => {}
    }
}

fn walk_exprs(expr: &tessera_ir::ExprRef, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match expr.as_ref() {
        Expr::Binary { lhs, rhs, .. } => {
            walk_exprs(lhs, f);
            walk_exprs(rhs, f);
        }
        Expr::Unary { operand, .. } => walk_exprs(operand, f),
        Expr::Call(call) => {
            for arg in &call.args {
                walk_exprs(arg, f);
            }
        }
        Expr::MakeTuple { elements, .. } => {
            for element in elements {
                walk_exprs(element, f);
            }
        }
        Expr::TupleGetItem { tuple, .. } => walk_exprs(tuple, f),
        Expr::Var(_) | Expr::ConstInt { .. } | Expr::ConstFloat { .. } => {}
    }
}

fn stmt_exprs(stmt: &Stmt) -> Vec<tessera_ir::ExprRef> {
    match stmt {
        Stmt::Assign { value, .. } => vec![value.clone()],
        Stmt::Eval { expr, .. } => vec![expr.clone()],
        Stmt::If { cond, .. } => vec![cond.clone()],
        Stmt::For { start, stop, step, .. } => {
            vec![start.clone(), stop.clone(), step.clone()]
        }
        Stmt::Return { values, .. } => values.to_vec(),
        Stmt::Seq { .. } | Stmt::Scope { .. } => vec![],
    }
}

// =========================================================================
// TypeChecked
// =========================================================================

pub struct TypeCheckedVerifier;

impl PropertyVerifier for TypeCheckedVerifier {
    fn name(&self) -> &'static str {
        "TypeChecked"
    }

    fn verify(&self, program: &Program, diagnostics: &mut Vec<Diagnostic>) {
        for function in program.functions() {
            self.check_function(function, diagnostics);
        }
    }
}

impl TypeCheckedVerifier {
    fn check_function(&self, function: &Function, diagnostics: &mut Vec<Diagnostic>) {
        walk_stmts(&function.body, &mut |stmt| match stmt.as_ref() {
            Stmt::Assign { var, value, span } => match value.ty() {
                Some(value_ty) => {
                    if !structural_equal(&var.ty, &value_ty, false) {
                        diagnostics.push(Diagnostic::error(
                            "TypeChecked",
                            format!(
                                "assignment to {} has type {} but value has type {} in {}",
                                var.name, var.ty, value_ty, function.name
                            ),
                            Some(span.clone()),
                        ));
                    }
                }
                None => diagnostics.push(Diagnostic::error(
                    "TypeChecked",
                    format!("assignment to {} from a valueless expression in {}",
                        var.name, function.name),
                    Some(span.clone()),
                )),
            },
            Stmt::Return { values, span } => {
                if values.len() != function.return_types.len() {
                    diagnostics.push(Diagnostic::error(
                        "TypeChecked",
                        format!(
                            "{} returns {} values but declares {}",
                            function.name,
                            values.len(),
                            function.return_types.len()
                        ),
                        Some(span.clone()),
                    ));
                    return;
                }
                for (i, (value, expected)) in
                    values.iter().zip(&function.return_types).enumerate()
                {
                    let Some(actual) = value.ty() else {
                        diagnostics.push(Diagnostic::error(
                            "TypeChecked",
                            format!("return value {i} of {} has no type", function.name),
                            Some(span.clone()),
                        ));
                        continue;
                    };
                    if !structural_equal(expected, &actual, false) {
                        diagnostics.push(Diagnostic::error(
                            "TypeChecked",
                            format!(
                                "return value {i} of {} has type {actual}, declared {expected}",
                                function.name
                            ),
                            Some(span.clone()),
                        ));
                    }
                }
            }
            _ => {}
        });
    }
}

// =========================================================================
// SSAForm
// =========================================================================

pub struct SSAFormVerifier;

impl PropertyVerifier for SSAFormVerifier {
    fn name(&self) -> &'static str {
        "SSAForm"
    }

    fn verify(&self, program: &Program, diagnostics: &mut Vec<Diagnostic>) {
        for function in program.functions() {
            let mut defined: std::collections::HashSet<String> =
                function.params.iter().map(|p| p.name.clone()).collect();
            walk_stmts(&function.body, &mut |stmt| {
                let (var, span) = match stmt.as_ref() {
                    Stmt::Assign { var, span, .. } => (var, span),
                    Stmt::For { var, span, .. } => (var, span),
                    _ => return,
                };
                if !defined.insert(var.name.clone()) {
                    diagnostics.push(Diagnostic::error(
                        "SSAForm",
                        format!("variable {} assigned more than once in {}",
                            var.name, function.name),
                        Some(span.clone()),
                    ));
                }
            });
        }
    }
}

// =========================================================================
// NoNestedCalls
// =========================================================================

pub struct NoNestedCallsVerifier;

impl PropertyVerifier for NoNestedCallsVerifier {
    fn name(&self) -> &'static str {
        "NoNestedCalls"
    }

    fn verify(&self, program: &Program, diagnostics: &mut Vec<Diagnostic>) {
        for function in program.functions() {
            walk_stmts(&function.body, &mut |stmt| {
                for expr in stmt_exprs(stmt) {
                    walk_exprs(&expr, &mut |node| {
                        let Expr::Call(call) = node else { return };
                        for arg in &call.args {
                            let mut nested = false;
                            walk_exprs(arg, &mut |inner| {
                                nested |= matches!(inner, Expr::Call(_));
                            });
                            if nested {
                                diagnostics.push(Diagnostic::error(
                                    "NoNestedCalls",
                                    format!(
                                        "call to {} has a nested call argument in {}",
                                        call.callee.name(),
                                        function.name
                                    ),
                                    Some(call.span.clone()),
                                ));
                            }
                        }
                    });
                }
            });
        }
    }
}

// =========================================================================
// NormalizedStmtStructure / FlattenedSingleStmt
// =========================================================================

pub struct NormalizedStmtStructureVerifier;

impl PropertyVerifier for NormalizedStmtStructureVerifier {
    fn name(&self) -> &'static str {
        "NormalizedStmtStructure"
    }

    fn verify(&self, program: &Program, diagnostics: &mut Vec<Diagnostic>) {
        let mut require_seq = |owner: &str, stmt: &StmtRef, diagnostics: &mut Vec<Diagnostic>| {
            if !matches!(stmt.as_ref(), Stmt::Seq { .. }) {
                diagnostics.push(Diagnostic::error(
                    "NormalizedStmtStructure",
                    format!("{owner} body is not a statement sequence"),
                    Some(stmt.span().clone()),
                ));
            }
        };
        for function in program.functions() {
            require_seq(&format!("function {}", function.name), &function.body, diagnostics);
            walk_stmts(&function.body, &mut |stmt| match stmt.as_ref() {
                Stmt::If { then_body, else_body, .. } => {
                    require_seq("if-then", then_body, diagnostics);
                    if let Some(else_body) = else_body {
                        require_seq("if-else", else_body, diagnostics);
                    }
                }
                Stmt::For { body, .. } => require_seq("for", body, diagnostics),
                Stmt::Scope { body, .. } => require_seq("scope", body, diagnostics),
                _ => {}
            });
        }
    }
}

pub struct FlattenedSingleStmtVerifier;

impl PropertyVerifier for FlattenedSingleStmtVerifier {
    fn name(&self) -> &'static str {
        "FlattenedSingleStmt"
    }

    fn verify(&self, program: &Program, diagnostics: &mut Vec<Diagnostic>) {
        for function in program.functions() {
            walk_stmts(&function.body, &mut |stmt| {
                if let Stmt::Seq { stmts, span } = stmt.as_ref()
                    && stmts.len() == 1
                {
                    diagnostics.push(Diagnostic::error(
                        "FlattenedSingleStmt",
                        format!("single-statement sequence in {}", function.name),
                        Some(span.clone()),
                    ));
                }
            });
        }
    }
}

// =========================================================================
// SplitIncoreOrch
// =========================================================================

pub struct SplitIncoreOrchVerifier;

impl PropertyVerifier for SplitIncoreOrchVerifier {
    fn name(&self) -> &'static str {
        "SplitIncoreOrch"
    }

    fn verify(&self, program: &Program, diagnostics: &mut Vec<Diagnostic>) {
        for function in program.functions() {
            walk_stmts(&function.body, &mut |stmt| {
                if let Stmt::Scope { kind, span, .. } = stmt.as_ref() {
                    diagnostics.push(Diagnostic::error(
                        "SplitIncoreOrch",
                        format!("unoutlined {kind} scope remains in {}", function.name),
                        Some(span.clone()),
                    ));
                }
            });
            if function.is_incore() {
                for stmt in Stmt::flatten(&function.body) {
                    if !matches!(
                        stmt.as_ref(),
                        Stmt::Assign { .. } | Stmt::Eval { .. } | Stmt::Return { .. }
                    ) {
                        diagnostics.push(Diagnostic::error(
                            "SplitIncoreOrch",
                            format!(
                                "InCore function {} body is not a flat statement list",
                                function.name
                            ),
                            Some(stmt.span().clone()),
                        ));
                    }
                }
            }
        }
    }
}

// =========================================================================
// HasMemRefs
// =========================================================================

pub struct HasMemRefsVerifier;

impl PropertyVerifier for HasMemRefsVerifier {
    fn name(&self) -> &'static str {
        "HasMemRefs"
    }

    fn verify(&self, program: &Program, diagnostics: &mut Vec<Diagnostic>) {
        for function in program.functions() {
            let mut check = |var: &tessera_ir::VarRef, diagnostics: &mut Vec<Diagnostic>| {
                if var.ty.is_tile() && var.mem.is_none() {
                    diagnostics.push(Diagnostic::error(
                        "HasMemRefs",
                        format!("tile variable {} in {} has no memory descriptor",
                            var.name, function.name),
                        Some(var.span.clone()),
                    ));
                }
            };
            for param in &function.params {
                check(param, diagnostics);
            }
            walk_stmts(&function.body, &mut |stmt| {
                if let Stmt::Assign { var, .. } = stmt.as_ref() {
                    check(var, diagnostics);
                }
            });
        }
    }
}
