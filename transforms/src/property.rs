//! The IR property lattice.
//!
//! Properties are declarative tags describing the shape of the IR. The
//! pipeline carries a set of them alongside the program; passes declare
//! which tags they need, produce, and break. Passes never inspect the set
//! at runtime — verifiers check tags against the actual IR on demand.

use enumset::{EnumSet, EnumSetType, enum_set};

/// A structural fact the IR can satisfy.
///
/// Verifier names equal property names, which is what lets the pipeline
/// map a pass's `required`/`produced` tags onto verifier runs.
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::AsRefStr, strum::Display, strum::EnumIter, strum::IntoStaticStr)]
#[derive(EnumSetType)]
#[enumset(repr = "u16")]
pub enum IRProperty {
    TypeChecked,
    SSAForm,
    NoNestedCalls,
    NormalizedStmtStructure,
    FlattenedSingleStmt,
    SplitIncoreOrch,
    HasMemRefs,
    IncoreBlockOps,
}

impl IRProperty {
    pub fn name(&self) -> &'static str {
        (*self).into()
    }
}

pub type IRPropertySet = EnumSet<IRProperty>;

/// Property contract of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassProperties {
    /// Tags that must hold before the pass runs.
    pub required: IRPropertySet,
    /// Tags guaranteed to hold after the pass runs.
    pub produced: IRPropertySet,
    /// Tags the pass breaks.
    pub invalidated: IRPropertySet,
}

/// Property contracts of the built-in passes.
pub mod props {
    use super::{IRProperty::*, PassProperties, enum_set};

    pub const IDENTITY: PassProperties = PassProperties {
        required: enum_set!(),
        produced: enum_set!(),
        invalidated: enum_set!(),
    };

    pub const CONVERT_TO_SSA: PassProperties = PassProperties {
        required: enum_set!(TypeChecked),
        produced: enum_set!(SSAForm),
        invalidated: enum_set!(NormalizedStmtStructure | FlattenedSingleStmt),
    };

    pub const FLATTEN_CALL_EXPR: PassProperties = PassProperties {
        required: enum_set!(TypeChecked),
        produced: enum_set!(NoNestedCalls),
        invalidated: enum_set!(NormalizedStmtStructure | FlattenedSingleStmt),
    };

    pub const NORMALIZE_STMT_STRUCTURE: PassProperties = PassProperties {
        required: enum_set!(TypeChecked),
        produced: enum_set!(NormalizedStmtStructure),
        invalidated: enum_set!(FlattenedSingleStmt),
    };

    pub const FLATTEN_SINGLE_STMT: PassProperties = PassProperties {
        required: enum_set!(TypeChecked),
        produced: enum_set!(FlattenedSingleStmt),
        invalidated: enum_set!(NormalizedStmtStructure),
    };

    pub const OUTLINE_INCORE_SCOPES: PassProperties = PassProperties {
        required: enum_set!(SSAForm),
        produced: enum_set!(SplitIncoreOrch),
        invalidated: enum_set!(),
    };

    pub const CONVERT_TENSOR_TO_BLOCK_OPS: PassProperties = PassProperties {
        required: enum_set!(SplitIncoreOrch),
        produced: enum_set!(IncoreBlockOps),
        invalidated: enum_set!(),
    };

    pub const INIT_MEM_REF: PassProperties = PassProperties {
        required: enum_set!(SSAForm),
        produced: enum_set!(HasMemRefs),
        invalidated: enum_set!(),
    };

    pub const BASIC_MEMORY_REUSE: PassProperties = PassProperties {
        required: enum_set!(HasMemRefs),
        produced: enum_set!(),
        invalidated: enum_set!(),
    };

    pub const INSERT_SYNC: PassProperties = PassProperties {
        required: enum_set!(HasMemRefs),
        produced: enum_set!(),
        invalidated: enum_set!(),
    };

    pub const ADD_ALLOC: PassProperties = PassProperties {
        required: enum_set!(HasMemRefs),
        produced: enum_set!(),
        invalidated: enum_set!(),
    };

    pub const RUN_VERIFIER: PassProperties = PassProperties {
        required: enum_set!(),
        produced: enum_set!(),
        invalidated: enum_set!(),
    };
}
