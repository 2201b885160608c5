use std::sync::Arc;

use smallvec::SmallVec;

use crate::expr::{ExprRef, VarRef};
use crate::span::Span;

pub type StmtRef = Arc<Stmt>;

/// Kind of a lexical region marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::AsRefStr, strum::FromRepr)]
#[repr(u8)]
pub enum ScopeKind {
    /// Region to be outlined into an `InCore` function.
    InCore = 0,
}

/// Statement node.
#[derive(Debug)]
pub enum Stmt {
    /// Binds a fresh variable; in SSA form each name is bound once.
    Assign { var: VarRef, value: ExprRef, span: Span },
    /// Side-effecting expression without a binding.
    Eval { expr: ExprRef, span: Span },
    Seq { stmts: Vec<StmtRef>, span: Span },
    If { cond: ExprRef, then_body: StmtRef, else_body: Option<StmtRef>, span: Span },
    For { var: VarRef, start: ExprRef, stop: ExprRef, step: ExprRef, body: StmtRef, span: Span },
    Return { values: SmallVec<[ExprRef; 4]>, span: Span },
    /// Region marker consumed by the outlining pass; none survive past it.
    Scope { kind: ScopeKind, body: StmtRef, span: Span },
}

impl Stmt {
    pub fn assign(var: VarRef, value: ExprRef, span: Span) -> StmtRef {
        Arc::new(Self::Assign { var, value, span })
    }

    pub fn eval(expr: ExprRef, span: Span) -> StmtRef {
        Arc::new(Self::Eval { expr, span })
    }

    pub fn seq(stmts: impl IntoIterator<Item = StmtRef>, span: Span) -> StmtRef {
        Arc::new(Self::Seq { stmts: stmts.into_iter().collect(), span })
    }

    pub fn if_(cond: ExprRef, then_body: StmtRef, else_body: Option<StmtRef>, span: Span) -> StmtRef {
        Arc::new(Self::If { cond, then_body, else_body, span })
    }

    pub fn for_(
        var: VarRef,
        start: ExprRef,
        stop: ExprRef,
        step: ExprRef,
        body: StmtRef,
        span: Span,
    ) -> StmtRef {
        Arc::new(Self::For { var, start, stop, step, body, span })
    }

    pub fn return_(values: impl IntoIterator<Item = ExprRef>, span: Span) -> StmtRef {
        Arc::new(Self::Return { values: values.into_iter().collect(), span })
    }

    pub fn scope(kind: ScopeKind, body: StmtRef, span: Span) -> StmtRef {
        Arc::new(Self::Scope { kind, body, span })
    }

    pub fn span(&self) -> &Span {
        match self {
            Self::Assign { span, .. }
            | Self::Eval { span, .. }
            | Self::Seq { span, .. }
            | Self::If { span, .. }
            | Self::For { span, .. }
            | Self::Return { span, .. }
            | Self::Scope { span, .. } => span,
        }
    }

    pub fn as_assign(&self) -> Option<(&VarRef, &ExprRef)> {
        match self {
            Self::Assign { var, value, .. } => Some((var, value)),
            _ => None,
        }
    }

    pub fn as_return(&self) -> Option<&[ExprRef]> {
        match self {
            Self::Return { values, .. } => Some(values),
            _ => None,
        }
    }

    /// View a body as a flat statement list: the children of a `Seq`, or the
    /// statement itself as a single-element list.
    pub fn flatten(this: &StmtRef) -> Vec<StmtRef> {
        match this.as_ref() {
            Self::Seq { stmts, .. } => stmts.clone(),
            _ => vec![this.clone()],
        }
    }
}
