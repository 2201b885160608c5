//! Primitive operator registry.
//!
//! Maps operator names to metadata (category, result-type inference) and
//! builds typed [`Call`] nodes. Population happens once at process start;
//! afterwards the registry is read from many threads. Re-registration
//! replaces the previous entry.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use smallvec::SmallVec;
use snafu::OptionExt;
use tessera_dtype::DType;

use crate::error::{InvalidOpArgsSnafu, OpNotFoundSnafu, Result};
use crate::expr::{Callee, Expr, ExprRef, KwArg, Op};
use crate::span::Span;
use crate::types::{MemorySpace, Type, TypeRef};

/// Operator classification used by verifiers; never inferred from the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::AsRefStr)]
pub enum OpCategory {
    TensorOp,
    BlockOp,
    SyncOp,
}

/// Computes the result type of a call from its arguments, or `None` for
/// valueless ops. The first parameter is the op name, for diagnostics.
pub type InferFn = fn(&str, &[ExprRef], &[(String, KwArg)]) -> Result<Option<TypeRef>>;

#[derive(Debug, Clone)]
pub struct OpEntry {
    pub name: String,
    pub category: OpCategory,
    pub infer: InferFn,
}

impl OpEntry {
    pub fn new(name: impl Into<String>, category: OpCategory, infer: InferFn) -> Self {
        Self { name: name.into(), category, infer }
    }
}

pub struct OpRegistry {
    entries: RwLock<HashMap<String, OpEntry>>,
}

static REGISTRY: Lazy<OpRegistry> = Lazy::new(OpRegistry::with_defaults);

impl OpRegistry {
    /// Process-wide registry, pre-populated with the built-in op table.
    pub fn global() -> &'static OpRegistry {
        &REGISTRY
    }

    fn with_defaults() -> Self {
        let registry = Self { entries: RwLock::new(HashMap::new()) };
        registry.populate_defaults();
        registry
    }

    /// Register an entry, replacing any previous one with the same name.
    pub fn register(&self, entry: OpEntry) {
        tracing::debug!(op = %entry.name, category = %entry.category, "registering op");
        self.entries.write().insert(entry.name.clone(), entry);
    }

    pub fn lookup(&self, name: &str) -> Option<OpEntry> {
        self.entries.read().get(name).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn category(&self, name: &str) -> Option<OpCategory> {
        self.entries.read().get(name).map(|e| e.category)
    }

    /// Build a typed `Call` to a registered op.
    pub fn create(
        &self,
        name: &str,
        args: Vec<ExprRef>,
        kwargs: Vec<(String, KwArg)>,
        span: Span,
    ) -> Result<ExprRef> {
        let entry = self.lookup(name).context(OpNotFoundSnafu { name })?;
        let ty = (entry.infer)(name, &args, &kwargs)?;
        Ok(Expr::call(Callee::Op(Op::new(name)), args, kwargs, ty, span))
    }

    fn populate_defaults(&self) {
        use OpCategory::*;

        // Tensor-level ops (pre-lowering).
        for name in ["tensor.add", "tensor.sub", "tensor.mul", "tensor.div", "tensor.maximum"] {
            self.register(OpEntry::new(name, TensorOp, infer_first_arg));
        }
        for name in
            ["tensor.add_scalar", "tensor.sub_scalar", "tensor.mul_scalar", "tensor.div_scalar"]
        {
            self.register(OpEntry::new(name, TensorOp, infer_first_arg));
        }
        self.register(OpEntry::new("tensor.exp", TensorOp, infer_first_arg));
        self.register(OpEntry::new("tensor.cast", TensorOp, infer_cast));
        self.register(OpEntry::new("tensor.reshape", TensorOp, infer_reshape));
        self.register(OpEntry::new("tensor.transpose", TensorOp, infer_transpose));
        self.register(OpEntry::new("tensor.create", TensorOp, infer_tensor_create));

        // Block/tile-level ops (post-lowering).
        for name in ["block.add", "block.sub", "block.mul", "block.div", "block.maximum"] {
            self.register(OpEntry::new(name, BlockOp, infer_first_arg));
        }
        for name in ["block.adds", "block.subs", "block.muls", "block.divs"] {
            self.register(OpEntry::new(name, BlockOp, infer_first_arg));
        }
        self.register(OpEntry::new("block.exp", BlockOp, infer_first_arg));
        self.register(OpEntry::new("block.cast", BlockOp, infer_cast));
        self.register(OpEntry::new("block.reshape", BlockOp, infer_reshape));
        self.register(OpEntry::new("block.transpose", BlockOp, infer_transpose));
        self.register(OpEntry::new("block.load", BlockOp, infer_load));
        self.register(OpEntry::new("block.store", BlockOp, infer_store));
        self.register(OpEntry::new("block.move", BlockOp, infer_move));
        self.register(OpEntry::new("block.matmul", BlockOp, infer_matmul));
        self.register(OpEntry::new("block.alloc", BlockOp, infer_none));

        // Pipe synchronization.
        self.register(OpEntry::new("block.sync_src", SyncOp, infer_none));
        self.register(OpEntry::new("block.sync_dst", SyncOp, infer_none));
    }
}

// =========================================================================
// Result-type inference
// =========================================================================

fn arg_ty(op: &str, args: &[ExprRef], index: usize) -> Result<TypeRef> {
    let arg = args.get(index).context(InvalidOpArgsSnafu {
        op,
        message: format!("missing positional argument {index}"),
    })?;
    arg.ty().context(InvalidOpArgsSnafu {
        op,
        message: format!("argument {index} has no value type"),
    })
}

fn kwarg<'a>(kwargs: &'a [(String, KwArg)], name: &str) -> Option<&'a KwArg> {
    kwargs.iter().find(|(key, _)| key == name).map(|(_, value)| value)
}

fn kwarg_dtype(op: &str, kwargs: &[(String, KwArg)]) -> Result<DType> {
    match kwarg(kwargs, "dtype") {
        Some(KwArg::DType(dtype)) => Ok(*dtype),
        _ => InvalidOpArgsSnafu { op, message: "missing dtype keyword argument" }.fail(),
    }
}

fn tuple_elements(op: &str, args: &[ExprRef], index: usize) -> Result<SmallVec<[ExprRef; 4]>> {
    let arg = args.get(index).context(InvalidOpArgsSnafu {
        op,
        message: format!("missing positional argument {index}"),
    })?;
    match arg.as_ref() {
        Expr::MakeTuple { elements, .. } => Ok(elements.clone()),
        _ => InvalidOpArgsSnafu { op, message: format!("argument {index} must be a tuple") }.fail(),
    }
}

/// Elementwise ops and scalar broadcasts return the type of their first
/// argument.
fn infer_first_arg(
    op: &str,
    args: &[ExprRef],
    _kwargs: &[(String, KwArg)],
) -> Result<Option<TypeRef>> {
    Ok(Some(arg_ty(op, args, 0)?))
}

fn infer_cast(op: &str, args: &[ExprRef], kwargs: &[(String, KwArg)]) -> Result<Option<TypeRef>> {
    let dtype = kwarg_dtype(op, kwargs)?;
    let ty = match arg_ty(op, args, 0)?.as_ref() {
        Type::Scalar(_) => Type::scalar(dtype),
        Type::Tensor { shape, .. } => Type::tensor(dtype, shape.iter().cloned()),
        Type::Tile { shape, memory, .. } => Type::tile(dtype, shape.iter().cloned(), *memory),
        other => {
            return InvalidOpArgsSnafu {
                op,
                message: format!("cannot cast a value of {}", other.kind_name()),
            }
            .fail();
        }
    };
    Ok(Some(ty))
}

fn infer_reshape(op: &str, args: &[ExprRef], _kwargs: &[(String, KwArg)]) -> Result<Option<TypeRef>> {
    let new_shape = tuple_elements(op, args, 1)?;
    let ty = match arg_ty(op, args, 0)?.as_ref() {
        Type::Tensor { dtype, .. } => Type::tensor(*dtype, new_shape),
        Type::Tile { dtype, memory, .. } => Type::tile(*dtype, new_shape, *memory),
        other => {
            return InvalidOpArgsSnafu {
                op,
                message: format!("cannot reshape a value of {}", other.kind_name()),
            }
            .fail();
        }
    };
    Ok(Some(ty))
}

fn infer_transpose(
    op: &str,
    args: &[ExprRef],
    _kwargs: &[(String, KwArg)],
) -> Result<Option<TypeRef>> {
    let ty = match arg_ty(op, args, 0)?.as_ref() {
        Type::Tensor { dtype, shape } => Type::tensor(*dtype, shape.iter().rev().cloned()),
        Type::Tile { dtype, shape, memory } => {
            Type::tile(*dtype, shape.iter().rev().cloned(), *memory)
        }
        other => {
            return InvalidOpArgsSnafu {
                op,
                message: format!("cannot transpose a value of {}", other.kind_name()),
            }
            .fail();
        }
    };
    Ok(Some(ty))
}

/// `tensor.create(shape, dtype=...)` -> fresh tensor.
fn infer_tensor_create(
    op: &str,
    args: &[ExprRef],
    kwargs: &[(String, KwArg)],
) -> Result<Option<TypeRef>> {
    let shape = tuple_elements(op, args, 0)?;
    let dtype = kwarg_dtype(op, kwargs)?;
    Ok(Some(Type::tensor(dtype, shape)))
}

/// `block.load(tensor, offsets, shapes, target_memory=...)` -> tile.
fn infer_load(op: &str, args: &[ExprRef], kwargs: &[(String, KwArg)]) -> Result<Option<TypeRef>> {
    let src = arg_ty(op, args, 0)?;
    let (dtype, shape) = src.as_tensor().context(InvalidOpArgsSnafu {
        op,
        message: format!("source must be a tensor, got {}", src.kind_name()),
    })?;
    let memory = match kwarg(kwargs, "target_memory") {
        Some(KwArg::Memory(memory)) => *memory,
        _ => MemorySpace::UB,
    };
    Ok(Some(Type::tile(dtype, shape.iter().cloned(), memory)))
}

/// `block.store(tile, offsets, shapes, out)` -> the output tensor.
fn infer_store(op: &str, args: &[ExprRef], _kwargs: &[(String, KwArg)]) -> Result<Option<TypeRef>> {
    let tile = arg_ty(op, args, 0)?;
    snafu::ensure!(
        tile.is_tile(),
        InvalidOpArgsSnafu { op, message: format!("value must be a tile, got {}", tile.kind_name()) }
    );
    let out = arg_ty(op, args, 3)?;
    snafu::ensure!(
        out.is_tensor(),
        InvalidOpArgsSnafu {
            op,
            message: format!("destination must be a tensor, got {}", out.kind_name()),
        }
    );
    Ok(Some(out))
}

/// `block.move(tile, target_memory=...)` -> tile in the target space.
fn infer_move(op: &str, args: &[ExprRef], kwargs: &[(String, KwArg)]) -> Result<Option<TypeRef>> {
    let src = arg_ty(op, args, 0)?;
    let (dtype, shape, _) = src.as_tile().context(InvalidOpArgsSnafu {
        op,
        message: format!("source must be a tile, got {}", src.kind_name()),
    })?;
    let memory = match kwarg(kwargs, "target_memory") {
        Some(KwArg::Memory(memory)) => *memory,
        _ => {
            return InvalidOpArgsSnafu { op, message: "missing target_memory keyword argument" }
                .fail();
        }
    };
    Ok(Some(Type::tile(dtype, shape.iter().cloned(), memory)))
}

/// `block.matmul(a: [m, k], b: [k, n])` -> `[m, n]` tile in the accumulator
/// dtype of the left operand.
fn infer_matmul(op: &str, args: &[ExprRef], _kwargs: &[(String, KwArg)]) -> Result<Option<TypeRef>> {
    let lhs = arg_ty(op, args, 0)?;
    let rhs = arg_ty(op, args, 1)?;
    let (dtype, lhs_shape, memory) = lhs.as_tile().context(InvalidOpArgsSnafu {
        op,
        message: format!("lhs must be a tile, got {}", lhs.kind_name()),
    })?;
    let (_, rhs_shape, _) = rhs.as_tile().context(InvalidOpArgsSnafu {
        op,
        message: format!("rhs must be a tile, got {}", rhs.kind_name()),
    })?;
    snafu::ensure!(
        lhs_shape.len() == 2 && rhs_shape.len() == 2,
        InvalidOpArgsSnafu { op, message: "operands must be rank-2 tiles" }
    );
    let shape = [lhs_shape[0].clone(), rhs_shape[1].clone()];
    Ok(Some(Type::tile(dtype, shape, memory)))
}

fn infer_none(_op: &str, _args: &[ExprRef], _kwargs: &[(String, KwArg)]) -> Result<Option<TypeRef>> {
    Ok(None)
}
