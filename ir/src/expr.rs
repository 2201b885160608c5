use std::sync::Arc;

use smallvec::SmallVec;
use tessera_dtype::DType;

use crate::memref::MemRef;
use crate::span::Span;
use crate::types::{Type, TypeRef};

pub type ExprRef = Arc<Expr>;
pub type VarRef = Arc<Var>;

/// A named, typed value.
///
/// Two `Var` allocations are distinct bindings even when their names
/// coincide; identity (`Arc::ptr_eq`) is what SSA reasons about.
#[derive(Debug)]
pub struct Var {
    pub name: String,
    pub ty: TypeRef,
    /// Memory descriptor attached by the memory-planning passes.
    pub mem: Option<Arc<MemRef>>,
    pub span: Span,
}

impl Var {
    pub fn new(name: impl Into<String>, ty: TypeRef, span: Span) -> VarRef {
        Arc::new(Self { name: name.into(), ty, mem: None, span })
    }

    pub fn with_mem(name: impl Into<String>, ty: TypeRef, mem: Arc<MemRef>, span: Span) -> VarRef {
        Arc::new(Self { name: name.into(), ty, mem: Some(mem), span })
    }
}

/// Primitive operator referenced by name from a [`Call`].
#[derive(Debug)]
pub struct Op {
    pub name: String,
}

impl Op {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }
}

/// Reference to a named function in the enclosing program.
#[derive(Debug)]
pub struct GlobalVar {
    pub name: String,
    pub span: Span,
}

impl GlobalVar {
    pub fn new(name: impl Into<String>, span: Span) -> Arc<Self> {
        Arc::new(Self { name: name.into(), span })
    }
}

/// Callee of a [`Call`]: a primitive op or a function reference.
#[derive(Debug, Clone)]
pub enum Callee {
    Op(Arc<Op>),
    Global(Arc<GlobalVar>),
}

impl Callee {
    pub fn name(&self) -> &str {
        match self {
            Self::Op(op) => &op.name,
            Self::Global(gv) => &gv.name,
        }
    }

    pub fn as_op(&self) -> Option<&Arc<Op>> {
        match self {
            Self::Op(op) => Some(op),
            Self::Global(_) => None,
        }
    }

    pub fn as_global(&self) -> Option<&Arc<GlobalVar>> {
        match self {
            Self::Global(gv) => Some(gv),
            Self::Op(_) => None,
        }
    }
}

/// Keyword-argument value.
///
/// Call kwargs are heterogeneous but drawn from a small closed set of kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum KwArg {
    Memory(crate::types::MemorySpace),
    DType(DType),
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::AsRefStr, strum::FromRepr)]
#[repr(u8)]
pub enum BinaryOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Mod = 4,
    Min = 5,
    Max = 6,
    Eq = 7,
    Ne = 8,
    Lt = 9,
    Le = 10,
    Gt = 11,
    Ge = 12,
    And = 13,
    Or = 14,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::AsRefStr, strum::FromRepr)]
#[repr(u8)]
pub enum UnaryOp {
    Neg = 0,
    Not = 1,
}

/// Operator or function invocation.
///
/// `ty` is the statically computed result type; `None` models a call that
/// produces no value (sync ops, allocs).
#[derive(Debug)]
pub struct Call {
    pub callee: Callee,
    pub args: SmallVec<[ExprRef; 4]>,
    pub kwargs: Vec<(String, KwArg)>,
    pub ty: Option<TypeRef>,
    pub span: Span,
}

/// Expression node.
///
/// `Binary`/`Unary` are scalar arithmetic by construction; tensor and tile
/// computation always goes through `Call`.
#[derive(Debug)]
pub enum Expr {
    Var(VarRef),
    ConstInt { value: i64, dtype: DType, span: Span },
    ConstFloat { value: f64, dtype: DType, span: Span },
    Binary { op: BinaryOp, lhs: ExprRef, rhs: ExprRef, span: Span },
    Unary { op: UnaryOp, operand: ExprRef, span: Span },
    Call(Call),
    MakeTuple { elements: SmallVec<[ExprRef; 4]>, span: Span },
    TupleGetItem { tuple: ExprRef, index: usize, span: Span },
}

impl Expr {
    pub fn var(var: VarRef) -> ExprRef {
        Arc::new(Self::Var(var))
    }

    pub fn const_int(value: i64, dtype: DType, span: Span) -> ExprRef {
        Arc::new(Self::ConstInt { value, dtype, span })
    }

    pub fn const_float(value: f64, dtype: DType, span: Span) -> ExprRef {
        Arc::new(Self::ConstFloat { value, dtype, span })
    }

    pub fn binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef, span: Span) -> ExprRef {
        Arc::new(Self::Binary { op, lhs, rhs, span })
    }

    pub fn unary(op: UnaryOp, operand: ExprRef, span: Span) -> ExprRef {
        Arc::new(Self::Unary { op, operand, span })
    }

    pub fn call(
        callee: Callee,
        args: impl IntoIterator<Item = ExprRef>,
        kwargs: Vec<(String, KwArg)>,
        ty: Option<TypeRef>,
        span: Span,
    ) -> ExprRef {
        Arc::new(Self::Call(Call { callee, args: args.into_iter().collect(), kwargs, ty, span }))
    }

    pub fn make_tuple(elements: impl IntoIterator<Item = ExprRef>, span: Span) -> ExprRef {
        Arc::new(Self::MakeTuple { elements: elements.into_iter().collect(), span })
    }

    pub fn tuple_get(tuple: ExprRef, index: usize, span: Span) -> ExprRef {
        Arc::new(Self::TupleGetItem { tuple, index, span })
    }

    /// Statically computed type of this expression, `None` for valueless
    /// calls (and tuples containing them).
    pub fn ty(&self) -> Option<TypeRef> {
        match self {
            Self::Var(var) => Some(var.ty.clone()),
            Self::ConstInt { dtype, .. } | Self::ConstFloat { dtype, .. } => {
                Some(Type::scalar(*dtype))
            }
            Self::Binary { op, lhs, .. } => {
                if op.is_comparison() {
                    Some(Type::scalar(DType::Bool))
                } else {
                    lhs.ty()
                }
            }
            Self::Unary { operand, .. } => operand.ty(),
            Self::Call(call) => call.ty.clone(),
            Self::MakeTuple { elements, .. } => {
                let tys: Option<SmallVec<[TypeRef; 4]>> = elements.iter().map(|e| e.ty()).collect();
                tys.map(|tys| Type::tuple(tys))
            }
            Self::TupleGetItem { tuple, index, .. } => {
                let ty = tuple.ty()?;
                ty.as_tuple().and_then(|elements| elements.get(*index).cloned())
            }
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            Self::Var(var) => &var.span,
            Self::ConstInt { span, .. }
            | Self::ConstFloat { span, .. }
            | Self::Binary { span, .. }
            | Self::Unary { span, .. }
            | Self::MakeTuple { span, .. }
            | Self::TupleGetItem { span, .. } => span,
            Self::Call(call) => &call.span,
        }
    }

    pub fn as_var(&self) -> Option<&VarRef> {
        match self {
            Self::Var(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Self::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Visit every `Var` reference in this expression tree.
    pub fn for_each_var(&self, f: &mut impl FnMut(&VarRef)) {
        match self {
            Self::Var(var) => f(var),
            Self::ConstInt { .. } | Self::ConstFloat { .. } => {}
            Self::Binary { lhs, rhs, .. } => {
                lhs.for_each_var(f);
                rhs.for_each_var(f);
            }
            Self::Unary { operand, .. } => operand.for_each_var(f),
            Self::Call(call) => {
                for arg in &call.args {
                    arg.for_each_var(f);
                }
            }
            Self::MakeTuple { elements, .. } => {
                for element in elements {
                    element.for_each_var(f);
                }
            }
            Self::TupleGetItem { tuple, .. } => tuple.for_each_var(f),
        }
    }
}
