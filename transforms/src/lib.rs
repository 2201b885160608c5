//! IR transformation layer for tessera.
//!
//! This crate implements the pass framework (property-tracking pipelines
//! with optional verification), the property verifiers, the op-conversion
//! registry, and the built-in passes up to and including the tensor→block
//! lowering.
//!
//! # Module Organization
//!
//! - [`property`] - the IR property lattice and per-pass property records
//! - [`pass`] - `Pass`, factories, and `PassPipeline`
//! - [`verifier`] - diagnostics, `PropertyVerifier`, `IRVerifier`
//! - [`op_conversion`] - tensor-op → block-op rewrite rules
//! - [`substitute`] - identity-preserving variable substitution
//! - [`passes`] - the built-in pass factories

pub mod error;
pub mod op_conversion;
pub mod pass;
pub mod passes;
pub mod property;
pub mod substitute;
pub mod verifier;

#[cfg(test)]
pub mod test;

pub use error::{Error, Result};
pub use op_conversion::{ConversionCtx, ConversionFunc, ConversionResult, OpConversionRegistry};
pub use pass::{Pass, PassPipeline, VerificationMode, function_pass, program_pass};
pub use passes::{
    add_alloc, basic_memory_reuse, convert_tensor_to_block_ops, convert_to_ssa, flatten_call_expr,
    flatten_single_stmt, identity, init_mem_ref, insert_sync, normalize_stmt_structure,
    outline_incore_scopes, run_verifier,
};
pub use property::{IRProperty, IRPropertySet, PassProperties};
pub use substitute::{VarMap, substitute};
pub use verifier::{Diagnostic, IRVerifier, PropertyVerifier, Severity};
