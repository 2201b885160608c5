//! Tessera intermediate representation.
//!
//! An immutable, reference-counted IR for tensor/tile programs. Nodes are
//! built bottom-up, shared via [`std::sync::Arc`], and never mutated in
//! place; transforms produce fresh trees and leave their inputs intact.
//!
//! # Module Organization
//!
//! - `expr`/`stmt`/`types` - the node model (expressions, statements, types)
//! - `function`/`program` - top-level containers
//! - `op_registry` - primitive operator metadata and typed `Call` construction
//! - [`structural`] - span-insensitive hashing and equality
//! - [`serialization`] - sharing-preserving binary codec
//! - [`display`] - compact text dump used by diagnostics

pub mod display;
pub mod error;
mod expr;
mod function;
mod memref;
mod op_registry;
mod program;
pub mod serialization;
mod span;
mod stmt;
pub mod structural;
mod types;

#[cfg(test)]
pub mod test;

pub use error::{Error, Result};
pub use expr::{
    BinaryOp, Call, Callee, Expr, ExprRef, GlobalVar, KwArg, Op, UnaryOp, Var, VarRef,
};
pub use function::{Function, FunctionKind, FunctionRef};
pub use memref::MemRef;
pub use op_registry::{InferFn, OpCategory, OpEntry, OpRegistry};
pub use program::{Program, ProgramRef};
pub use span::Span;
pub use stmt::{ScopeKind, Stmt, StmtRef};
pub use structural::{assert_structural_equal, structural_equal, structural_hash};
pub use types::{MemorySpace, Type, TypeRef};
