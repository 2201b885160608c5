//! Built-in pass factories.

pub mod convert_tensor_to_block_ops;
mod identity;
mod memory;
mod normalize;
mod outline;
mod run_verifier;
mod ssa;

pub use convert_tensor_to_block_ops::convert_tensor_to_block_ops;
pub use identity::identity;
pub use memory::{add_alloc, basic_memory_reuse, init_mem_ref, insert_sync};
pub use normalize::{flatten_call_expr, flatten_single_stmt, normalize_stmt_structure};
pub use outline::outline_incore_scopes;
pub use run_verifier::run_verifier;
pub use ssa::convert_to_ssa;
