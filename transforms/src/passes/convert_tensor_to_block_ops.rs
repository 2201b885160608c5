//! Tensor→block lowering for `InCore` functions.
//!
//! Phase 1 rewrites every `InCore` function: tensor parameters are loaded
//! into tiles at entry, tensor ops in the body are rewritten through the
//! conversion registry, and tile-valued returns are stored into appended
//! output tensor parameters at exit. Phase 2 rewrites every caller: it
//! creates the output tensors (`tensor.create`) and threads them as extra
//! call arguments. The split is load-bearing: a caller can only be
//! rewritten once the callee's added-output count is final.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_dtype::DType;

use tessera_ir::{
    Call, Callee, Expr, ExprRef, Function, FunctionRef, KwArg, MemorySpace, OpRegistry, Program,
    ProgramRef, Span, Stmt, StmtRef, Type, TypeRef, Var,
};

use crate::error::{Error, Result};
use crate::op_conversion::OpConversionRegistry;
use crate::pass::{Pass, program_pass};
use crate::property::props;
use crate::substitute::{VarMap, substitute};
use crate::verifier::{Diagnostic, PropertyVerifier};

pub fn convert_tensor_to_block_ops() -> Pass {
    program_pass(
        |program: &ProgramRef| {
            // Phase 1: lower InCore functions, recording added outputs.
            let mut added_outputs: HashMap<String, usize> = HashMap::new();
            let mut transformed: HashMap<String, FunctionRef> = HashMap::new();
            let mut phase1 = Vec::with_capacity(program.functions.len());
            for function in program.functions() {
                if function.is_incore() {
                    let result = transform_incore_function(function)?;
                    added_outputs.insert(function.name.clone(), result.added_outputs);
                    transformed.insert(function.name.clone(), result.function.clone());
                    phase1.push(result.function);
                } else {
                    phase1.push(function.clone());
                }
            }

            // Phase 2: thread the new outputs through every call site.
            let mut phase2 = Vec::with_capacity(phase1.len());
            for function in phase1 {
                if function.is_incore() {
                    phase2.push(function);
                } else {
                    phase2.push(update_call_sites(&function, &added_outputs, &transformed)?);
                }
            }

            Ok(Program::new(phase2, program.name.clone(), program.span.clone()))
        },
        "ConvertTensorToBlockOps",
        props::CONVERT_TENSOR_TO_BLOCK_OPS,
    )
}

/// `(0, 0, ...)` offsets tuple for load/store.
fn zero_offsets(ndim: usize, span: &Span) -> ExprRef {
    let zeros = (0..ndim).map(|_| Expr::const_int(0, DType::Int64, span.clone()));
    Expr::make_tuple(zeros, span.clone())
}

fn shape_tuple(shape: &[ExprRef], span: &Span) -> ExprRef {
    Expr::make_tuple(shape.iter().cloned(), span.clone())
}

fn expr_type(expr: &ExprRef, what: &str) -> Result<TypeRef> {
    expr.ty().ok_or_else(|| Error::internal(format!("{what} has no value type")))
}

struct IncoreTransform {
    function: FunctionRef,
    added_outputs: usize,
}

fn transform_incore_function(function: &FunctionRef) -> Result<IncoreTransform> {
    let conv_registry = OpConversionRegistry::global();
    let op_registry = OpRegistry::global();
    let span = &function.span;

    // Original tensor var name -> tile replacement.
    let mut tensor_to_tile: VarMap = VarMap::new();
    let mut new_stmts: Vec<StmtRef> = Vec::new();

    // Load prologue: one block.load per tensor parameter. Scalar params
    // pass through untouched.
    for param in &function.params {
        let Some((_, shape)) = param.ty.as_tensor() else { continue };

        let offsets = zero_offsets(shape.len(), span);
        let shapes = shape_tuple(shape, span);
        let load = op_registry.create(
            "block.load",
            vec![Expr::var(Arc::clone(param)), offsets, shapes],
            vec![("target_memory".to_string(), KwArg::Memory(MemorySpace::UB))],
            span.clone(),
        )?;

        let tile_var = Var::new(
            format!("{}_tile", param.name),
            expr_type(&load, "block.load call")?,
            span.clone(),
        );
        new_stmts.push(Stmt::assign(Arc::clone(&tile_var), load, span.clone()));
        tensor_to_tile.insert(param.name.clone(), tile_var);
    }

    // Body rewrite.
    let body = Stmt::flatten(&function.body);
    let mut return_stmt: Option<StmtRef> = None;
    for stmt in &body {
        if matches!(stmt.as_ref(), Stmt::Return { .. }) {
            return_stmt = Some(stmt.clone());
            continue;
        }

        let Stmt::Assign { var, value, span: stmt_span } = stmt.as_ref() else {
            // Non-assign statements pass through.
            new_stmts.push(stmt.clone());
            continue;
        };

        // Only calls to plain ops are candidates for conversion; everything
        // else (non-calls, function calls, unregistered ops) just has its
        // tensor vars substituted.
        let convertible = value
            .as_call()
            .filter(|call| matches!(call.callee, Callee::Op(_)))
            .and_then(|call| conv_registry.lookup(call.callee.name()).map(|rule| (call, rule)));

        let Some((call, converter)) = convertible else {
            let new_value = substitute(value, &tensor_to_tile)?;
            if Arc::ptr_eq(&new_value, value) {
                new_stmts.push(stmt.clone());
            } else {
                let new_var = Var::new(
                    var.name.clone(),
                    expr_type(&new_value, "substituted value")?,
                    var.span.clone(),
                );
                new_stmts.push(Stmt::assign(Arc::clone(&new_var), new_value, stmt_span.clone()));
                tensor_to_tile.insert(var.name.clone(), new_var);
            }
            continue;
        };

        let mut substituted_args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            substituted_args.push(substitute(arg, &tensor_to_tile)?);
        }

        let converted = converter(&substituted_args, &call.kwargs, &call.span)?;
        new_stmts.extend(converted.prologue);

        let tile_var = Var::new(
            format!("{}_tile", var.name),
            expr_type(&converted.result, "conversion result")?,
            var.span.clone(),
        );
        new_stmts.push(Stmt::assign(Arc::clone(&tile_var), converted.result, stmt_span.clone()));
        tensor_to_tile.insert(var.name.clone(), tile_var);
    }

    // Store epilogue: every tile-valued return is written back into an
    // appended output tensor parameter.
    let return_stmt = return_stmt
        .ok_or_else(|| Error::internal(format!(
            "InCore function {} has no return statement",
            function.name
        )))?;
    let return_values = return_stmt
        .as_return()
        .ok_or_else(|| Error::internal("captured statement is not a return"))?;

    let mut new_params = function.params.clone();
    let mut new_return_types = Vec::with_capacity(return_values.len());
    let mut new_return_exprs = Vec::with_capacity(return_values.len());
    let mut added_outputs = 0usize;

    for (index, value) in return_values.iter().enumerate() {
        let ret_expr = substitute(value, &tensor_to_tile)?;
        let ret_ty = expr_type(&ret_expr, "return value")?;

        let Some((_, tile_shape, _)) = ret_ty.as_tile() else {
            new_return_types.push(ret_ty);
            new_return_exprs.push(ret_expr);
            continue;
        };

        let orig_ty = function.return_types.get(index).ok_or_else(|| {
            Error::internal(format!("return value {index} has no declared type"))
        })?;
        if !orig_ty.is_tensor() {
            return Err(Error::internal(format!(
                "return type {index} of {} should be TensorType but is {}",
                function.name,
                orig_ty.kind_name()
            )));
        }

        let out_name = format!("out_{added_outputs}");
        let out_param = Var::new(out_name.clone(), orig_ty.clone(), span.clone());
        new_params.push(Arc::clone(&out_param));

        let offsets = zero_offsets(tile_shape.len(), span);
        let shapes = shape_tuple(tile_shape, span);
        let store = op_registry.create(
            "block.store",
            vec![ret_expr, offsets, shapes, Expr::var(out_param)],
            vec![],
            span.clone(),
        )?;
        let store_ty = expr_type(&store, "block.store call")?;

        let store_var = Var::new(out_name, store_ty.clone(), span.clone());
        new_stmts.push(Stmt::assign(Arc::clone(&store_var), store, span.clone()));

        new_return_types.push(store_ty);
        new_return_exprs.push(Expr::var(store_var));
        added_outputs += 1;
    }

    new_stmts.push(Stmt::return_(new_return_exprs, return_stmt.span().clone()));

    let function = Function::new(
        function.name.clone(),
        new_params,
        new_return_types,
        Stmt::seq(new_stmts, span.clone()),
        span.clone(),
        tessera_ir::FunctionKind::InCore,
    );
    Ok(IncoreTransform { function, added_outputs })
}

/// Rewrite calls to transformed InCore functions inside a caller.
///
/// Only top-level statements are processed; a call to a transformed InCore
/// function from a nested `If`/`For` body is rejected as an internal error
/// (the `SplitIncoreOrch` prerequisite makes flat callers the expected
/// input).
fn update_call_sites(
    function: &FunctionRef,
    added_outputs: &HashMap<String, usize>,
    transformed: &HashMap<String, FunctionRef>,
) -> Result<FunctionRef> {
    let op_registry = OpRegistry::global();
    let span = &function.span;

    let body = Stmt::flatten(&function.body);
    let mut new_stmts: Vec<StmtRef> = Vec::with_capacity(body.len());
    let mut changed = false;
    let mut var_map: VarMap = VarMap::new();

    for stmt in &body {
        reject_nested_incore_calls(stmt, added_outputs, &function.name)?;

        if let Stmt::Return { values, span: ret_span } = stmt.as_ref() {
            if var_map.is_empty() {
                new_stmts.push(stmt.clone());
                continue;
            }
            let mut new_values = Vec::with_capacity(values.len());
            for value in values {
                new_values.push(substitute(value, &var_map)?);
            }
            new_stmts.push(Stmt::return_(new_values, ret_span.clone()));
            continue;
        }

        let Stmt::Assign { var, value, span: stmt_span } = stmt.as_ref() else {
            new_stmts.push(stmt.clone());
            continue;
        };

        let substituted = substitute(value, &var_map)?;

        // A rewrite is needed only for calls to InCore functions that
        // gained outputs; anything else is re-issued when substitution
        // changed it.
        let incore_target = substituted.as_call().and_then(|call| {
            let global = call.callee.as_global()?;
            (added_outputs.get(&global.name).copied().unwrap_or(0) > 0)
                .then(|| (call, global.name.clone()))
        });

        let Some((call, target_name)) = incore_target else {
            if Arc::ptr_eq(&substituted, value) {
                new_stmts.push(stmt.clone());
            } else {
                let new_var = Var::new(
                    var.name.clone(),
                    expr_type(&substituted, "substituted value")?,
                    var.span.clone(),
                );
                var_map.insert(var.name.clone(), Arc::clone(&new_var));
                new_stmts.push(Stmt::assign(new_var, substituted, stmt_span.clone()));
                changed = true;
            }
            continue;
        };

        let num_outputs = added_outputs[&target_name];
        let incore_function = transformed.get(&target_name).ok_or_else(|| {
            Error::internal(format!("transformed InCore function not found: {target_name}"))
        })?;

        // The added output params sit at the tail of the transformed
        // signature; create one tensor per output and pass it along.
        let orig_param_count = incore_function.params.len() - num_outputs;
        let mut extra_args: Vec<ExprRef> = Vec::with_capacity(num_outputs);
        for index in 0..num_outputs {
            let out_param = &incore_function.params[orig_param_count + index];
            let Some((dtype, shape)) = out_param.ty.as_tensor() else {
                return Err(Error::internal(format!(
                    "output parameter {} of {target_name} is not TensorType",
                    out_param.name
                )));
            };

            let create = op_registry.create(
                "tensor.create",
                vec![shape_tuple(shape, span)],
                vec![("dtype".to_string(), KwArg::DType(dtype))],
                span.clone(),
            )?;
            let out_var = Var::new(
                format!("out_{index}"),
                expr_type(&create, "tensor.create call")?,
                span.clone(),
            );
            new_stmts.push(Stmt::assign(Arc::clone(&out_var), create, span.clone()));
            extra_args.push(Expr::var(out_var));
        }

        let mut new_args: Vec<ExprRef> = call.args.to_vec();
        new_args.extend(extra_args);

        let new_return_ty = match incore_function.return_types.len() {
            0 => None,
            1 => Some(incore_function.return_types[0].clone()),
            _ => Some(Type::tuple(incore_function.return_types.iter().cloned())),
        };

        let new_call = Expr::call(
            call.callee.clone(),
            new_args,
            call.kwargs.clone(),
            new_return_ty.clone(),
            call.span.clone(),
        );
        let new_return_ty = new_return_ty.ok_or_else(|| {
            Error::internal(format!(
                "call to {target_name} binds a result but the function returns nothing"
            ))
        })?;
        let new_var = Var::new(var.name.clone(), new_return_ty, var.span.clone());
        var_map.insert(var.name.clone(), Arc::clone(&new_var));
        new_stmts.push(Stmt::assign(new_var, new_call, stmt_span.clone()));
        changed = true;
    }

    if !changed {
        return Ok(function.clone());
    }
    Ok(Function::new(
        function.name.clone(),
        function.params.clone(),
        function.return_types.clone(),
        Stmt::seq(new_stmts, span.clone()),
        span.clone(),
        function.kind,
    ))
}

/// Known limitation: call-site rewriting handles top-level statements only.
/// Rather than silently miscompiling, a transformed-callee call inside a
/// nested body aborts the pass.
fn reject_nested_incore_calls(
    stmt: &StmtRef,
    added_outputs: &HashMap<String, usize>,
    caller: &str,
) -> Result<()> {
    let nested_bodies: Vec<&StmtRef> = match stmt.as_ref() {
        Stmt::If { then_body, else_body, .. } => {
            let mut bodies = vec![then_body];
            bodies.extend(else_body);
            bodies
        }
        Stmt::For { body, .. } | Stmt::Scope { body, .. } => vec![body],
        _ => return Ok(()),
    };
    for body in nested_bodies {
        let mut offender: Option<String> = None;
        find_incore_calls(body, added_outputs, &mut offender);
        if let Some(name) = offender {
            return Err(Error::internal(format!(
                "call to transformed InCore function {name} from a nested scope in {caller} \
                 is not supported"
            )));
        }
        reject_nested_incore_calls(body, added_outputs, caller)?;
    }
    Ok(())
}

fn find_incore_calls(
    stmt: &StmtRef,
    added_outputs: &HashMap<String, usize>,
    offender: &mut Option<String>,
) {
    let mut check_expr = |expr: &ExprRef| {
        if offender.is_some() {
            return;
        }
        if let Some(Call { callee: Callee::Global(global), .. }) = expr.as_call()
            && added_outputs.get(&global.name).copied().unwrap_or(0) > 0
        {
            *offender = Some(global.name.clone());
        }
    };
    match stmt.as_ref() {
        Stmt::Assign { value, .. } => check_expr(value),
        Stmt::Eval { expr, .. } => check_expr(expr),
        Stmt::Return { values, .. } => values.iter().for_each(&mut check_expr),
        Stmt::Seq { stmts, .. } => {
            for child in stmts {
                find_incore_calls(child, added_outputs, offender);
            }
        }
        Stmt::If { then_body, else_body, .. } => {
            find_incore_calls(then_body, added_outputs, offender);
            if let Some(else_body) = else_body {
                find_incore_calls(else_body, added_outputs, offender);
            }
        }
        Stmt::For { body, .. } | Stmt::Scope { body, .. } => {
            find_incore_calls(body, added_outputs, offender)
        }
    }
}

// =========================================================================
// IncoreBlockOps property verifier
// =========================================================================

/// Flags tensor ops that survived lowering inside `InCore` functions.
///
/// An op is flagged only when the op registry tags it `TensorOp` *and* a
/// conversion exists for it; classification goes through the category tag,
/// never the name prefix.
pub struct IncoreBlockOpsVerifier;

impl PropertyVerifier for IncoreBlockOpsVerifier {
    fn name(&self) -> &'static str {
        "IncoreBlockOps"
    }

    fn verify(&self, program: &Program, diagnostics: &mut Vec<Diagnostic>) {
        for function in program.functions() {
            if !function.is_incore() {
                continue;
            }
            check_stmt(&function.body, diagnostics);
        }
    }
}

fn check_stmt(stmt: &StmtRef, diagnostics: &mut Vec<Diagnostic>) {
    let mut check_call = |expr: &ExprRef, span: &Span| {
        let Some(call) = expr.as_call() else { return };
        // Op calls use a plain op; a global callee is a function call.
        let Callee::Op(op) = &call.callee else { return };

        let op_registry = OpRegistry::global();
        let Some(entry) = op_registry.lookup(&op.name) else { return };
        if entry.category == tessera_ir::OpCategory::TensorOp
            && OpConversionRegistry::global().has_conversion(&op.name)
        {
            diagnostics.push(Diagnostic::error(
                "IncoreBlockOps",
                format!("Tensor op '{}' found in InCore function (should have been converted)",
                    op.name),
                Some(span.clone()),
            ));
        }
    };
    match stmt.as_ref() {
        Stmt::Assign { value, span, .. } => check_call(value, span),
        Stmt::Eval { expr, span } => check_call(expr, span),
        Stmt::Seq { stmts, .. } => {
            for child in stmts {
                check_stmt(child, diagnostics);
            }
        }
        Stmt::If { then_body, else_body, .. } => {
            check_stmt(then_body, diagnostics);
            if let Some(else_body) = else_body {
                check_stmt(else_body, diagnostics);
            }
        }
        Stmt::For { body, .. } | Stmt::Scope { body, .. } => check_stmt(body, diagnostics),
        Stmt::Return { .. } => {}
    }
}
