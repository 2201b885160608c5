//! Memory planning for lowered `InCore` functions: memref assignment,
//! lifetime-based reuse, pipe synchronization, and alloc insertion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tessera_ir::{
    Expr, Function, FunctionRef, KwArg, MemRef, MemorySpace, OpRegistry, Stmt, StmtRef, Type, Var,
    VarRef,
};

use crate::error::{Error, Result};
use crate::pass::{Pass, function_pass};
use crate::property::props;
use crate::substitute::{VarMap, substitute};

/// Element count × dtype width, when the shape is fully constant.
fn type_bytes(ty: &Type) -> Option<u64> {
    let (dtype, shape) = match ty {
        Type::Tensor { dtype, shape } => (dtype, shape),
        Type::Tile { dtype, shape, .. } => (dtype, shape),
        _ => return None,
    };
    let mut elements = 1u64;
    for dim in shape.iter() {
        match dim.as_ref() {
            Expr::ConstInt { value, .. } if *value >= 0 => elements *= *value as u64,
            _ => return None,
        }
    }
    Some(elements * dtype.bytes() as u64)
}

// =========================================================================
// init_mem_ref
// =========================================================================

/// Attaches a fresh `MemRef` to every tile variable (its own memory space)
/// and every tensor parameter (`DDR`). Non-InCore functions pass through.
pub fn init_mem_ref() -> Pass {
    function_pass(
        |function| {
            if !function.is_incore() {
                return Ok(function.clone());
            }
            let mut next_id = 0usize;
            let mut env = VarMap::new();

            let params: Vec<VarRef> = function
                .params
                .iter()
                .map(|param| {
                    if !param.ty.is_tensor() {
                        return Arc::clone(param);
                    }
                    let memref = Arc::new(MemRef::new(
                        next_id,
                        MemorySpace::DDR,
                        type_bytes(&param.ty),
                    ));
                    next_id += 1;
                    let var = Arc::new(Var {
                        name: param.name.clone(),
                        ty: param.ty.clone(),
                        mem: Some(memref),
                        span: param.span.clone(),
                    });
                    env.insert(param.name.clone(), Arc::clone(&var));
                    var
                })
                .collect();

            let mut new_stmts = Vec::new();
            for stmt in Stmt::flatten(&function.body) {
                new_stmts.push(assign_memref(&stmt, &mut env, &mut next_id)?);
            }

            Ok(Function::new(
                function.name.clone(),
                params,
                function.return_types.clone(),
                Stmt::seq(new_stmts, function.span.clone()),
                function.span.clone(),
                function.kind,
            ))
        },
        "InitMemRef",
        props::INIT_MEM_REF,
    )
}

fn assign_memref(stmt: &StmtRef, env: &mut VarMap, next_id: &mut usize) -> Result<StmtRef> {
    match stmt.as_ref() {
        Stmt::Assign { var, value, span } => {
            let value = substitute(value, env)?;
            let Some((_, _, memory)) = var.ty.as_tile() else {
                return Ok(Stmt::assign(Arc::clone(var), value, span.clone()));
            };
            let memref = Arc::new(MemRef::new(*next_id, memory, type_bytes(&var.ty)));
            *next_id += 1;
            let new_var = Arc::new(Var {
                name: var.name.clone(),
                ty: var.ty.clone(),
                mem: Some(memref),
                span: var.span.clone(),
            });
            env.insert(var.name.clone(), Arc::clone(&new_var));
            Ok(Stmt::assign(new_var, value, span.clone()))
        }
        Stmt::Eval { expr, span } => Ok(Stmt::eval(substitute(expr, env)?, span.clone())),
        Stmt::Return { values, span } => {
            let mut new_values = Vec::with_capacity(values.len());
            for value in values {
                new_values.push(substitute(value, env)?);
            }
            Ok(Stmt::return_(new_values, span.clone()))
        }
        _ => Ok(stmt.clone()),
    }
}

// =========================================================================
// basic_memory_reuse
// =========================================================================

/// Linear-scan reuse: a tile whose lifetime has ended donates its `MemRef`
/// to a later tile of the same space and size.
pub fn basic_memory_reuse() -> Pass {
    function_pass(
        |function| {
            if !function.is_incore() {
                return Ok(function.clone());
            }
            let stmts = Stmt::flatten(&function.body);

            // Last statement index referencing each variable.
            let mut last_use: HashMap<String, usize> = HashMap::new();
            for (index, stmt) in stmts.iter().enumerate() {
                for_each_used_var(stmt, &mut |var| {
                    last_use.insert(var.name.clone(), index);
                });
            }

            let mut env = VarMap::new();
            let mut live: Vec<(String, Arc<MemRef>)> = Vec::new();
            let mut free: Vec<Arc<MemRef>> = Vec::new();
            let mut new_stmts = Vec::with_capacity(stmts.len());
            let mut changed = false;

            for (index, stmt) in stmts.iter().enumerate() {
                // Retire memrefs whose holder is dead by now.
                live.retain(|(name, memref)| {
                    if last_use.get(name).is_none_or(|&last| last < index) {
                        free.push(Arc::clone(memref));
                        false
                    } else {
                        true
                    }
                });

                let Stmt::Assign { var, value, span } = stmt.as_ref() else {
                    let new_stmt = resubstitute(stmt, &env)?;
                    changed |= !Arc::ptr_eq(&new_stmt, stmt);
                    new_stmts.push(new_stmt);
                    continue;
                };
                let original_value = value;
                let value = substitute(value, &env)?;
                changed |= !Arc::ptr_eq(&value, original_value);

                let (new_var, reused) = match (&var.mem, var.ty.is_tile()) {
                    (Some(memref), true) => match take_compatible(&mut free, memref) {
                        Some(donor) => {
                            let renamed = Arc::new(Var {
                                name: var.name.clone(),
                                ty: var.ty.clone(),
                                mem: Some(Arc::clone(&donor)),
                                span: var.span.clone(),
                            });
                            live.push((var.name.clone(), donor));
                            env.insert(var.name.clone(), Arc::clone(&renamed));
                            (renamed, true)
                        }
                        None => {
                            live.push((var.name.clone(), Arc::clone(memref)));
                            (Arc::clone(var), false)
                        }
                    },
                    _ => (Arc::clone(var), false),
                };
                changed |= reused;
                new_stmts.push(Stmt::assign(new_var, value, span.clone()));
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
        },
        "BasicMemoryReuse",
        props::BASIC_MEMORY_REUSE,
    )
}

fn take_compatible(free: &mut Vec<Arc<MemRef>>, needed: &Arc<MemRef>) -> Option<Arc<MemRef>> {
    let position = free
        .iter()
        .position(|candidate| candidate.space == needed.space && candidate.bytes == needed.bytes)?;
    Some(free.swap_remove(position))
}

fn resubstitute(stmt: &StmtRef, env: &VarMap) -> Result<StmtRef> {
    match stmt.as_ref() {
        Stmt::Eval { expr, span } => {
            let new_expr = substitute(expr, env)?;
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
                let new_value = substitute(value, env)?;
                changed |= !Arc::ptr_eq(&new_value, value);
                new_values.push(new_value);
            }
            if changed {
                Ok(Stmt::return_(new_values, span.clone()))
            } else {
                Ok(stmt.clone())
            }
        }
        _ => Ok(stmt.clone()),
    }
}

fn for_each_used_var(stmt: &StmtRef, f: &mut impl FnMut(&VarRef)) {
    match stmt.as_ref() {
        Stmt::Assign { value, .. } => value.for_each_var(f),
        Stmt::Eval { expr, .. } => expr.for_each_var(f),
        Stmt::Return { values, .. } => values.iter().for_each(|value| value.for_each_var(f)),
        _ => {}
    }
}

// =========================================================================
// insert_sync
// =========================================================================

/// Hardware pipe an op executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipe {
    /// Memory transfer engine (loads, stores, moves).
    Mte,
    /// Vector unit.
    Vector,
    /// Matrix unit.
    Cube,
    Scalar,
}

impl Pipe {
    fn as_str(self) -> &'static str {
        match self {
            Self::Mte => "MTE",
            Self::Vector => "V",
            Self::Cube => "M",
            Self::Scalar => "S",
        }
    }
}

fn pipe_of(op_name: &str) -> Pipe {
    match op_name {
        "block.load" | "block.store" | "block.move" => Pipe::Mte,
        "block.matmul" => Pipe::Cube,
        "block.add" | "block.sub" | "block.mul" | "block.div" | "block.maximum"
        | "block.adds" | "block.subs" | "block.muls" | "block.divs" | "block.exp"
        | "block.cast" | "block.reshape" | "block.transpose" => Pipe::Vector,
        _ => Pipe::Scalar,
    }
}

/// Inserts `block.sync_src`/`block.sync_dst` pairs wherever a value crosses
/// from one pipe to another, with a fresh event id per edge.
pub fn insert_sync() -> Pass {
    function_pass(
        |function| {
            if !function.is_incore() {
                return Ok(function.clone());
            }
            let op_registry = OpRegistry::global();
            let stmts = Stmt::flatten(&function.body);

            let mut producer: HashMap<String, Pipe> = HashMap::new();
            let mut synced: HashSet<(String, &'static str)> = HashSet::new();
            let mut event = 0i64;
            let mut new_stmts = Vec::with_capacity(stmts.len());
            let mut changed = false;

            for stmt in &stmts {
                let call_expr = match stmt.as_ref() {
                    Stmt::Assign { value, .. } => Some(value),
                    Stmt::Eval { expr, .. } => Some(expr),
                    _ => None,
                };

                if let Some(expr) = call_expr
                    && let Some(call) = expr.as_call()
                {
                    if let tessera_ir::Callee::Op(op) = &call.callee {
                        let consumer_pipe = pipe_of(&op.name);
                        let mut crossing: Vec<(String, Pipe)> = Vec::new();
                        expr.for_each_var(&mut |var: &VarRef| {
                            if let Some(&source) = producer.get(&var.name)
                                && source != consumer_pipe
                                && synced.insert((var.name.clone(), consumer_pipe.as_str()))
                            {
                                crossing.push((var.name.clone(), source));
                            }
                        });
                        for (_, source) in crossing {
                            let sync_span = stmt.span().clone();
                            let sync_src = op_registry.create(
                                "block.sync_src",
                                vec![],
                                vec![
                                    ("pipe".to_string(), KwArg::Str(source.as_str().to_string())),
                                    ("event".to_string(), KwArg::Int(event)),
                                ],
                                sync_span.clone(),
                            )?;
                            let sync_dst = op_registry.create(
                                "block.sync_dst",
                                vec![],
                                vec![
                                    (
                                        "pipe".to_string(),
                                        KwArg::Str(consumer_pipe.as_str().to_string()),
                                    ),
                                    ("event".to_string(), KwArg::Int(event)),
                                ],
                                sync_span.clone(),
                            )?;
                            event += 1;
                            new_stmts.push(Stmt::eval(sync_src, sync_span.clone()));
                            new_stmts.push(Stmt::eval(sync_dst, sync_span));
                            changed = true;
                        }
                        if let Stmt::Assign { var, .. } = stmt.as_ref() {
                            producer.insert(var.name.clone(), consumer_pipe);
                        }
                    }
                }
                new_stmts.push(stmt.clone());
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
        },
        "InsertSync",
        props::INSERT_SYNC,
    )
}

// =========================================================================
// add_alloc
// =========================================================================

/// Prepends one `block.alloc` per unique on-chip `MemRef` in each `InCore`
/// function, in first-appearance order.
pub fn add_alloc() -> Pass {
    function_pass(
        |function: &FunctionRef| {
            if !function.is_incore() {
                return Ok(function.clone());
            }
            let op_registry = OpRegistry::global();

            let mut seen: HashSet<usize> = HashSet::new();
            let mut memrefs: Vec<Arc<MemRef>> = Vec::new();
            let mut record = |var: &VarRef| {
                if let Some(memref) = &var.mem
                    && memref.space != MemorySpace::DDR
                    && seen.insert(memref.id)
                {
                    memrefs.push(Arc::clone(memref));
                }
            };
            for param in &function.params {
                record(param);
            }
            for stmt in Stmt::flatten(&function.body) {
                if let Stmt::Assign { var, .. } = stmt.as_ref() {
                    record(var);
                }
            }

            if memrefs.is_empty() {
                return Ok(function.clone());
            }

            let mut new_stmts = Vec::new();
            for memref in memrefs {
                let bytes = memref.bytes.ok_or_else(|| {
                    Error::internal(format!(
                        "memref {} in {} has no static size to allocate",
                        memref.id, function.name
                    ))
                })?;
                let alloc = op_registry.create(
                    "block.alloc",
                    vec![],
                    vec![
                        ("id".to_string(), KwArg::Int(memref.id as i64)),
                        ("memory".to_string(), KwArg::Memory(memref.space)),
                        ("bytes".to_string(), KwArg::Int(bytes as i64)),
                    ],
                    function.span.clone(),
                )?;
                new_stmts.push(Stmt::eval(alloc, function.span.clone()));
            }
            new_stmts.extend(Stmt::flatten(&function.body));

            Ok(Function::new(
                function.name.clone(),
                function.params.clone(),
                function.return_types.clone(),
                Stmt::seq(new_stmts, function.span.clone()),
                function.span.clone(),
                function.kind,
            ))
        },
        "AddAlloc",
        props::ADD_ALLOC,
    )
}
