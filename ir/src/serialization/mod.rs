//! Sharing-preserving binary codec for IR trees.
//!
//! The stream is a sequence of MessagePack values (written through `rmp`'s
//! primitive layer, so all markers and multi-byte scalars follow the
//! MessagePack wire conventions). Every IR node is encoded as an array
//! `[tag, id, fields...]` on its first occurrence; any later occurrence of
//! the same pointer is the two-element array `[REF, id]`. The per-session
//! reference table is what makes aliasing observable after a round-trip:
//! two positions that share one node in memory decode to two handles of one
//! node again.
//!
//! Tag bytes and field order are fixed per node kind (see [`tags`]) and are
//! part of the stable format; unknown tags are a decode error. The IR is
//! acyclic, so the table is pure DAG compression: a back-reference always
//! points at a node that finished decoding earlier.
//!
//! Spans are serialized inline (never reference-counted); they carry no
//! semantics and deduplicating them would buy nothing.

mod deserializer;
mod rw;
mod serializer;
pub mod tags;

use crate::error::Result;
use crate::expr::ExprRef;
use crate::function::FunctionRef;
use crate::program::ProgramRef;
use crate::stmt::StmtRef;
use crate::types::TypeRef;

pub use deserializer::Deserializer;
pub use serializer::Serializer;

pub fn serialize_expr(expr: &ExprRef) -> Result<Vec<u8>> {
    let mut serializer = Serializer::new();
    serializer.write_expr(expr)?;
    Ok(serializer.finish())
}

pub fn deserialize_expr(bytes: &[u8]) -> Result<ExprRef> {
    Deserializer::new(bytes).read_expr_root()
}

pub fn serialize_stmt(stmt: &StmtRef) -> Result<Vec<u8>> {
    let mut serializer = Serializer::new();
    serializer.write_stmt(stmt)?;
    Ok(serializer.finish())
}

pub fn deserialize_stmt(bytes: &[u8]) -> Result<StmtRef> {
    Deserializer::new(bytes).read_stmt_root()
}

pub fn serialize_type(ty: &TypeRef) -> Result<Vec<u8>> {
    let mut serializer = Serializer::new();
    serializer.write_type(ty)?;
    Ok(serializer.finish())
}

pub fn deserialize_type(bytes: &[u8]) -> Result<TypeRef> {
    Deserializer::new(bytes).read_type_root()
}

pub fn serialize_function(function: &FunctionRef) -> Result<Vec<u8>> {
    let mut serializer = Serializer::new();
    serializer.write_function(function)?;
    Ok(serializer.finish())
}

pub fn deserialize_function(bytes: &[u8]) -> Result<FunctionRef> {
    Deserializer::new(bytes).read_function_root()
}

pub fn serialize_program(program: &ProgramRef) -> Result<Vec<u8>> {
    let mut serializer = Serializer::new();
    serializer.write_program(program)?;
    Ok(serializer.finish())
}

pub fn deserialize_program(bytes: &[u8]) -> Result<ProgramRef> {
    Deserializer::new(bytes).read_program_root()
}
