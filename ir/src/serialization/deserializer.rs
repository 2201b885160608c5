use std::collections::HashMap;
use std::sync::Arc;

use rmp::decode::Bytes;
use smallvec::SmallVec;
use snafu::OptionExt;
use tessera_dtype::DType;

use crate::error::{BadBackRefSnafu, DeserializeSnafu, Error, Result};
use crate::expr::{Callee, Expr, ExprRef, GlobalVar, KwArg, Op, Var, VarRef};
use crate::function::{Function, FunctionKind, FunctionRef};
use crate::memref::MemRef;
use crate::program::{Program, ProgramRef};
use crate::span::Span;
use crate::stmt::{ScopeKind, Stmt, StmtRef};
use crate::types::{MemorySpace, Type, TypeRef};

use super::rw::*;
use super::tags;

/// A decoded node in the reference table.
#[derive(Clone)]
enum Node {
    Type(TypeRef),
    Expr(ExprRef),
    Stmt(StmtRef),
    Var(VarRef),
    Op(Arc<Op>),
    Global(Arc<GlobalVar>),
    MemRef(Arc<MemRef>),
    Function(FunctionRef),
    Program(ProgramRef),
}

impl Node {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Type(_) => "type",
            Self::Expr(_) => "expr",
            Self::Stmt(_) => "stmt",
            Self::Var(_) => "var",
            Self::Op(_) => "op",
            Self::Global(_) => "global",
            Self::MemRef(_) => "memref",
            Self::Function(_) => "function",
            Self::Program(_) => "program",
        }
    }
}

/// Streaming decoder; rebuilds the id → node table as nodes arrive, so a
/// back-reference always resolves to the same `Arc` and input aliasing is
/// reproduced exactly.
pub struct Deserializer<'a> {
    rd: Bytes<'a>,
    nodes: HashMap<u32, Node>,
}

impl<'a> Deserializer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { rd: Bytes::new(bytes), nodes: HashMap::new() }
    }

    pub fn read_expr_root(mut self) -> Result<ExprRef> {
        self.read_expr()
    }

    pub fn read_stmt_root(mut self) -> Result<StmtRef> {
        self.read_stmt()
    }

    pub fn read_type_root(mut self) -> Result<TypeRef> {
        self.read_type()
    }

    pub fn read_function_root(mut self) -> Result<FunctionRef> {
        self.read_function()
    }

    pub fn read_program_root(mut self) -> Result<ProgramRef> {
        self.read_program()
    }

    /// Reads the `[tag, id]` header of the next node. For back-references
    /// the resolved node is returned instead.
    fn node_header(&mut self) -> Result<(u8, u32, Option<Node>)> {
        let arity = r_array(&mut self.rd)?;
        snafu::ensure!(
            arity >= 2,
            DeserializeSnafu { message: format!("node array too short: {arity}") }
        );
        let tag = r_u8(&mut self.rd)?;
        let id = r_u32(&mut self.rd)?;
        if tag == tags::REF {
            let node = self.nodes.get(&id).cloned().context(BadBackRefSnafu { id })?;
            return Ok((tag, id, Some(node)));
        }
        Ok((tag, id, None))
    }

    fn register(&mut self, id: u32, node: Node) {
        self.nodes.insert(id, node);
    }

    fn read_span(&mut self) -> Result<Span> {
        let arity = r_array(&mut self.rd)?;
        snafu::ensure!(
            arity == 3,
            DeserializeSnafu { message: format!("span array has arity {arity}") }
        );
        let file = r_str(&mut self.rd)?;
        let line = r_u32(&mut self.rd)?;
        let column = r_u32(&mut self.rd)?;
        Ok(Span::new(file, line, column))
    }

    fn read_dtype(&mut self) -> Result<DType> {
        let raw = r_u8(&mut self.rd)?;
        DType::from_repr(raw)
            .context(DeserializeSnafu { message: format!("invalid dtype code {raw}") })
    }

    fn read_memory_space(&mut self) -> Result<MemorySpace> {
        let raw = r_u8(&mut self.rd)?;
        MemorySpace::from_repr(raw)
            .context(DeserializeSnafu { message: format!("invalid memory-space code {raw}") })
    }

    pub fn read_type(&mut self) -> Result<TypeRef> {
        let (tag, id, backref) = self.node_header()?;
        if let Some(node) = backref {
            return match node {
                Node::Type(ty) => Ok(ty),
                other => mismatch("type", other),
            };
        }
        let ty = match tag {
            tags::TYPE_SCALAR => Type::scalar(self.read_dtype()?),
            tags::TYPE_TENSOR => {
                let dtype = self.read_dtype()?;
                let shape = self.read_expr_seq()?;
                Type::tensor(dtype, shape)
            }
            tags::TYPE_TILE => {
                let dtype = self.read_dtype()?;
                let memory = self.read_memory_space()?;
                let shape = self.read_expr_seq()?;
                Type::tile(dtype, shape, memory)
            }
            tags::TYPE_TUPLE => {
                let len = r_array(&mut self.rd)?;
                let mut elements = SmallVec::<[TypeRef; 4]>::new();
                for _ in 0..len {
                    elements.push(self.read_type()?);
                }
                Type::tuple(elements)
            }
            tags::TYPE_MEMREF => Type::memref_handle(),
            tag => return Err(Error::UnknownTag { tag }),
        };
        self.register(id, Node::Type(ty.clone()));
        Ok(ty)
    }

    fn read_expr_seq(&mut self) -> Result<SmallVec<[ExprRef; 4]>> {
        let len = r_array(&mut self.rd)?;
        let mut exprs = SmallVec::new();
        for _ in 0..len {
            exprs.push(self.read_expr()?);
        }
        Ok(exprs)
    }

    fn read_memref(&mut self) -> Result<Arc<MemRef>> {
        let (tag, id, backref) = self.node_header()?;
        if let Some(node) = backref {
            return match node {
                Node::MemRef(memref) => Ok(memref),
                other => mismatch("memref", other),
            };
        }
        snafu::ensure!(tag == tags::NODE_MEMREF, DeserializeSnafu {
            message: format!("expected memref node, got tag {tag:#04x}"),
        });
        let mrid = r_u64(&mut self.rd)? as usize;
        let space = self.read_memory_space()?;
        let bytes = match r_array(&mut self.rd)? {
            0 => None,
            1 => Some(r_u64(&mut self.rd)?),
            n => {
                return DeserializeSnafu { message: format!("option array has arity {n}") }.fail();
            }
        };
        let memref = Arc::new(MemRef::new(mrid, space, bytes));
        self.register(id, Node::MemRef(memref.clone()));
        Ok(memref)
    }

    pub fn read_var(&mut self) -> Result<VarRef> {
        let (tag, id, backref) = self.node_header()?;
        if let Some(node) = backref {
            return match node {
                Node::Var(var) => Ok(var),
                other => mismatch("var", other),
            };
        }
        snafu::ensure!(tag == tags::NODE_VAR, DeserializeSnafu {
            message: format!("expected var node, got tag {tag:#04x}"),
        });
        let name = r_str(&mut self.rd)?;
        let ty = self.read_type()?;
        let mem = match r_array(&mut self.rd)? {
            0 => None,
            1 => Some(self.read_memref()?),
            n => {
                return DeserializeSnafu { message: format!("option array has arity {n}") }.fail();
            }
        };
        let span = self.read_span()?;
        let var = Arc::new(Var { name, ty, mem, span });
        self.register(id, Node::Var(var.clone()));
        Ok(var)
    }

    fn read_callee(&mut self) -> Result<Callee> {
        let arity = r_array(&mut self.rd)?;
        snafu::ensure!(
            arity == 2,
            DeserializeSnafu { message: format!("callee array has arity {arity}") }
        );
        match r_u8(&mut self.rd)? {
            tags::CALLEE_OP => {
                let (tag, id, backref) = self.node_header()?;
                if let Some(node) = backref {
                    return match node {
                        Node::Op(op) => Ok(Callee::Op(op)),
                        other => mismatch("op", other),
                    };
                }
                snafu::ensure!(tag == tags::NODE_OP, DeserializeSnafu {
                    message: format!("expected op node, got tag {tag:#04x}"),
                });
                let op = Op::new(r_str(&mut self.rd)?);
                self.register(id, Node::Op(op.clone()));
                Ok(Callee::Op(op))
            }
            tags::CALLEE_GLOBAL => {
                let (tag, id, backref) = self.node_header()?;
                if let Some(node) = backref {
                    return match node {
                        Node::Global(global) => Ok(Callee::Global(global)),
                        other => mismatch("global", other),
                    };
                }
                snafu::ensure!(tag == tags::NODE_GLOBAL, DeserializeSnafu {
                    message: format!("expected global node, got tag {tag:#04x}"),
                });
                let name = r_str(&mut self.rd)?;
                let span = self.read_span()?;
                let global = GlobalVar::new(name, span);
                self.register(id, Node::Global(global.clone()));
                Ok(Callee::Global(global))
            }
            kind => DeserializeSnafu { message: format!("invalid callee kind {kind}") }.fail(),
        }
    }

    fn read_kwargs(&mut self) -> Result<Vec<(String, KwArg)>> {
        let len = r_array(&mut self.rd)?;
        let mut kwargs = Vec::with_capacity(len as usize);
        for _ in 0..len {
            let arity = r_array(&mut self.rd)?;
            snafu::ensure!(
                arity == 3,
                DeserializeSnafu { message: format!("kwarg array has arity {arity}") }
            );
            let name = r_str(&mut self.rd)?;
            let value = match r_u8(&mut self.rd)? {
                tags::KWARG_MEMORY => KwArg::Memory(self.read_memory_space()?),
                tags::KWARG_DTYPE => KwArg::DType(self.read_dtype()?),
                tags::KWARG_INT => KwArg::Int(r_i64(&mut self.rd)?),
                tags::KWARG_FLOAT => KwArg::Float(r_f64(&mut self.rd)?),
                tags::KWARG_BOOL => KwArg::Bool(r_bool(&mut self.rd)?),
                tags::KWARG_STR => KwArg::Str(r_str(&mut self.rd)?),
                kind => {
                    return DeserializeSnafu { message: format!("invalid kwarg kind {kind}") }
                        .fail();
                }
            };
            kwargs.push((name, value));
        }
        Ok(kwargs)
    }

    fn read_opt_type(&mut self) -> Result<Option<TypeRef>> {
        match r_array(&mut self.rd)? {
            0 => Ok(None),
            1 => Ok(Some(self.read_type()?)),
            n => DeserializeSnafu { message: format!("option array has arity {n}") }.fail(),
        }
    }

    pub fn read_expr(&mut self) -> Result<ExprRef> {
        let (tag, id, backref) = self.node_header()?;
        if let Some(node) = backref {
            return match node {
                Node::Expr(expr) => Ok(expr),
                other => mismatch("expr", other),
            };
        }
        let expr = match tag {
            tags::EXPR_VAR => Expr::var(self.read_var()?),
            tags::EXPR_CONST_INT => {
                let value = r_i64(&mut self.rd)?;
                let dtype = self.read_dtype()?;
                let span = self.read_span()?;
                Expr::const_int(value, dtype, span)
            }
            tags::EXPR_CONST_FLOAT => {
                let value = r_f64(&mut self.rd)?;
                let dtype = self.read_dtype()?;
                let span = self.read_span()?;
                Expr::const_float(value, dtype, span)
            }
            tags::EXPR_BINARY => {
                let raw = r_u8(&mut self.rd)?;
                let op = crate::expr::BinaryOp::from_repr(raw)
                    .context(DeserializeSnafu { message: format!("invalid binary op {raw}") })?;
                let lhs = self.read_expr()?;
                let rhs = self.read_expr()?;
                let span = self.read_span()?;
                Expr::binary(op, lhs, rhs, span)
            }
            tags::EXPR_UNARY => {
                let raw = r_u8(&mut self.rd)?;
                let op = crate::expr::UnaryOp::from_repr(raw)
                    .context(DeserializeSnafu { message: format!("invalid unary op {raw}") })?;
                let operand = self.read_expr()?;
                let span = self.read_span()?;
                Expr::unary(op, operand, span)
            }
            tags::EXPR_CALL => {
                let callee = self.read_callee()?;
                let args = self.read_expr_seq()?;
                let kwargs = self.read_kwargs()?;
                let ty = self.read_opt_type()?;
                let span = self.read_span()?;
                Expr::call(callee, args, kwargs, ty, span)
            }
            tags::EXPR_MAKE_TUPLE => {
                let elements = self.read_expr_seq()?;
                let span = self.read_span()?;
                Expr::make_tuple(elements, span)
            }
            tags::EXPR_TUPLE_GET => {
                let tuple = self.read_expr()?;
                let index = r_u64(&mut self.rd)? as usize;
                let span = self.read_span()?;
                Expr::tuple_get(tuple, index, span)
            }
            tag => return Err(Error::UnknownTag { tag }),
        };
        self.register(id, Node::Expr(expr.clone()));
        Ok(expr)
    }

    pub fn read_stmt(&mut self) -> Result<StmtRef> {
        let (tag, id, backref) = self.node_header()?;
        if let Some(node) = backref {
            return match node {
                Node::Stmt(stmt) => Ok(stmt),
                other => mismatch("stmt", other),
            };
        }
        let stmt = match tag {
            tags::STMT_ASSIGN => {
                let var = self.read_var()?;
                let value = self.read_expr()?;
                let span = self.read_span()?;
                Stmt::assign(var, value, span)
            }
            tags::STMT_EVAL => {
                let expr = self.read_expr()?;
                let span = self.read_span()?;
                Stmt::eval(expr, span)
            }
            tags::STMT_SEQ => {
                let len = r_array(&mut self.rd)?;
                let mut stmts = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    stmts.push(self.read_stmt()?);
                }
                let span = self.read_span()?;
                Stmt::seq(stmts, span)
            }
            tags::STMT_IF => {
                let cond = self.read_expr()?;
                let then_body = self.read_stmt()?;
                let else_body = match r_array(&mut self.rd)? {
                    0 => None,
                    1 => Some(self.read_stmt()?),
                    n => {
                        return DeserializeSnafu {
                            message: format!("option array has arity {n}"),
                        }
                        .fail();
                    }
                };
                let span = self.read_span()?;
                Stmt::if_(cond, then_body, else_body, span)
            }
            tags::STMT_FOR => {
                let var = self.read_var()?;
                let start = self.read_expr()?;
                let stop = self.read_expr()?;
                let step = self.read_expr()?;
                let body = self.read_stmt()?;
                let span = self.read_span()?;
                Stmt::for_(var, start, stop, step, body, span)
            }
            tags::STMT_RETURN => {
                let values = self.read_expr_seq()?;
                let span = self.read_span()?;
                Stmt::return_(values, span)
            }
            tags::STMT_SCOPE => {
                let raw = r_u8(&mut self.rd)?;
                let kind = ScopeKind::from_repr(raw)
                    .context(DeserializeSnafu { message: format!("invalid scope kind {raw}") })?;
                let body = self.read_stmt()?;
                let span = self.read_span()?;
                Stmt::scope(kind, body, span)
            }
            tag => return Err(Error::UnknownTag { tag }),
        };
        self.register(id, Node::Stmt(stmt.clone()));
        Ok(stmt)
    }

    pub fn read_function(&mut self) -> Result<FunctionRef> {
        let (tag, id, backref) = self.node_header()?;
        if let Some(node) = backref {
            return match node {
                Node::Function(function) => Ok(function),
                other => mismatch("function", other),
            };
        }
        snafu::ensure!(tag == tags::FUNCTION, DeserializeSnafu {
            message: format!("expected function node, got tag {tag:#04x}"),
        });
        let name = r_str(&mut self.rd)?;
        let raw = r_u8(&mut self.rd)?;
        let kind = FunctionKind::from_repr(raw)
            .context(DeserializeSnafu { message: format!("invalid function kind {raw}") })?;
        let len = r_array(&mut self.rd)?;
        let mut params = Vec::with_capacity(len as usize);
        for _ in 0..len {
            params.push(self.read_var()?);
        }
        let len = r_array(&mut self.rd)?;
        let mut return_types = Vec::with_capacity(len as usize);
        for _ in 0..len {
            return_types.push(self.read_type()?);
        }
        let body = self.read_stmt()?;
        let span = self.read_span()?;
        let function = Function::new(name, params, return_types, body, span, kind);
        self.register(id, Node::Function(function.clone()));
        Ok(function)
    }

    pub fn read_program(&mut self) -> Result<ProgramRef> {
        let (tag, id, backref) = self.node_header()?;
        if let Some(node) = backref {
            return match node {
                Node::Program(program) => Ok(program),
                other => mismatch("program", other),
            };
        }
        snafu::ensure!(tag == tags::PROGRAM, DeserializeSnafu {
            message: format!("expected program node, got tag {tag:#04x}"),
        });
        let name = r_str(&mut self.rd)?;
        let len = r_array(&mut self.rd)?;
        let mut functions = Vec::with_capacity(len as usize);
        for _ in 0..len {
            functions.push(self.read_function()?);
        }
        let span = self.read_span()?;
        let program = Program::new(functions, name, span);
        self.register(id, Node::Program(program.clone()));
        Ok(program)
    }
}

fn mismatch<T>(expected: &str, found: Node) -> Result<T> {
    DeserializeSnafu {
        message: format!("back-reference kind mismatch: expected {expected}, found {}",
            found.kind_name()),
    }
    .fail()
}
