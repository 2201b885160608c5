//! Node tag bytes of the serialized format.
//!
//! Stable: never reorder or reuse a value. `REF` marks a back-reference
//! `[REF, id]` to an already-emitted node.

pub const REF: u8 = 0x00;

// Types.
pub const TYPE_SCALAR: u8 = 0x01;
pub const TYPE_TENSOR: u8 = 0x02;
pub const TYPE_TILE: u8 = 0x03;
pub const TYPE_TUPLE: u8 = 0x04;
pub const TYPE_MEMREF: u8 = 0x05;

// Expressions.
pub const EXPR_VAR: u8 = 0x10;
pub const EXPR_CONST_INT: u8 = 0x11;
pub const EXPR_CONST_FLOAT: u8 = 0x12;
pub const EXPR_BINARY: u8 = 0x13;
pub const EXPR_UNARY: u8 = 0x14;
pub const EXPR_CALL: u8 = 0x15;
pub const EXPR_MAKE_TUPLE: u8 = 0x16;
pub const EXPR_TUPLE_GET: u8 = 0x17;

// Shared leaf nodes.
pub const NODE_VAR: u8 = 0x18;
pub const NODE_OP: u8 = 0x19;
pub const NODE_GLOBAL: u8 = 0x1a;
pub const NODE_MEMREF: u8 = 0x1b;

// Statements.
pub const STMT_ASSIGN: u8 = 0x20;
pub const STMT_EVAL: u8 = 0x21;
pub const STMT_SEQ: u8 = 0x22;
pub const STMT_IF: u8 = 0x23;
pub const STMT_FOR: u8 = 0x24;
pub const STMT_RETURN: u8 = 0x25;
pub const STMT_SCOPE: u8 = 0x26;

// Containers.
pub const FUNCTION: u8 = 0x30;
pub const PROGRAM: u8 = 0x31;

// Kwarg value kinds (scoped to the kwarg triple, not node tags).
pub const KWARG_MEMORY: u8 = 0;
pub const KWARG_DTYPE: u8 = 1;
pub const KWARG_INT: u8 = 2;
pub const KWARG_FLOAT: u8 = 3;
pub const KWARG_BOOL: u8 = 4;
pub const KWARG_STR: u8 = 5;

// Callee kinds.
pub const CALLEE_OP: u8 = 0;
pub const CALLEE_GLOBAL: u8 = 1;
