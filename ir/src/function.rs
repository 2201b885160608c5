use std::sync::Arc;

use crate::expr::VarRef;
use crate::span::Span;
use crate::stmt::StmtRef;
use crate::types::TypeRef;

pub type FunctionRef = Arc<Function>;

/// Execution class of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::AsRefStr, strum::FromRepr)]
#[repr(u8)]
pub enum FunctionKind {
    /// Unclassified host-level function.
    Opaque = 0,
    /// Tiles work and calls InCore functions.
    Orchestration = 1,
    /// Executes inside a single compute unit; operates on tiles after
    /// lowering.
    InCore = 2,
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<VarRef>,
    pub return_types: Vec<TypeRef>,
    pub body: StmtRef,
    pub span: Span,
    pub kind: FunctionKind,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        params: Vec<VarRef>,
        return_types: Vec<TypeRef>,
        body: StmtRef,
        span: Span,
        kind: FunctionKind,
    ) -> FunctionRef {
        Arc::new(Self { name: name.into(), params, return_types, body, span, kind })
    }

    pub fn is_incore(&self) -> bool {
        self.kind == FunctionKind::InCore
    }
}
