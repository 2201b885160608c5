use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::expr::{Call, Callee, Expr, ExprRef, GlobalVar, KwArg, Op, VarRef};
use crate::function::{Function, FunctionRef};
use crate::memref::MemRef;
use crate::program::ProgramRef;
use crate::span::Span;
use crate::stmt::{Stmt, StmtRef};
use crate::types::{Type, TypeRef};

use super::rw::*;
use super::tags;

/// Streaming encoder with a per-session reference table.
///
/// The table is keyed by pointer address; it holds no strong references, so
/// the caller must keep the root alive for the duration of the session
/// (guaranteed by the `&` borrows on the write methods).
pub struct Serializer {
    out: Vec<u8>,
    ids: HashMap<usize, u32>,
    next_id: u32,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    pub fn new() -> Self {
        Self { out: Vec::new(), ids: HashMap::new(), next_id: 0 }
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }

    /// First occurrence: assigns and returns a fresh id. Later occurrences:
    /// writes a `[REF, id]` back-reference and returns `None`.
    fn begin_node<T>(&mut self, node: &Arc<T>) -> Result<Option<u32>> {
        let key = Arc::as_ptr(node) as usize;
        if let Some(&id) = self.ids.get(&key) {
            w_array(&mut self.out, 2)?;
            w_u8(&mut self.out, tags::REF)?;
            w_u32(&mut self.out, id)?;
            return Ok(None);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(key, id);
        Ok(Some(id))
    }

    fn header(&mut self, arity: u32, tag: u8, id: u32) -> Result<()> {
        w_array(&mut self.out, arity)?;
        w_u8(&mut self.out, tag)?;
        w_u32(&mut self.out, id)
    }

    fn write_span(&mut self, span: &Span) -> Result<()> {
        w_array(&mut self.out, 3)?;
        w_str(&mut self.out, &span.file)?;
        w_u32(&mut self.out, span.line)?;
        w_u32(&mut self.out, span.column)
    }

    pub fn write_type(&mut self, ty: &TypeRef) -> Result<()> {
        let Some(id) = self.begin_node(ty)? else { return Ok(()) };
        match ty.as_ref() {
            Type::Scalar(dtype) => {
                self.header(3, tags::TYPE_SCALAR, id)?;
                w_u8(&mut self.out, *dtype as u8)
            }
            Type::Tensor { dtype, shape } => {
                self.header(4, tags::TYPE_TENSOR, id)?;
                w_u8(&mut self.out, *dtype as u8)?;
                w_array(&mut self.out, shape.len() as u32)?;
                shape.iter().try_for_each(|dim| self.write_expr(dim))
            }
            Type::Tile { dtype, shape, memory } => {
                self.header(5, tags::TYPE_TILE, id)?;
                w_u8(&mut self.out, *dtype as u8)?;
                w_u8(&mut self.out, *memory as u8)?;
                w_array(&mut self.out, shape.len() as u32)?;
                shape.iter().try_for_each(|dim| self.write_expr(dim))
            }
            Type::Tuple(elements) => {
                self.header(3, tags::TYPE_TUPLE, id)?;
                w_array(&mut self.out, elements.len() as u32)?;
                elements.iter().try_for_each(|element| self.write_type(element))
            }
            Type::MemRefHandle => self.header(2, tags::TYPE_MEMREF, id),
        }
    }

    fn write_memref(&mut self, memref: &Arc<MemRef>) -> Result<()> {
        let Some(id) = self.begin_node(memref)? else { return Ok(()) };
        self.header(5, tags::NODE_MEMREF, id)?;
        w_u64(&mut self.out, memref.id as u64)?;
        w_u8(&mut self.out, memref.space as u8)?;
        match memref.bytes {
            Some(bytes) => {
                w_array(&mut self.out, 1)?;
                w_u64(&mut self.out, bytes)?;
            }
            None => w_array(&mut self.out, 0)?,
        }
        Ok(())
    }

    pub fn write_var(&mut self, var: &VarRef) -> Result<()> {
        let Some(id) = self.begin_node(var)? else { return Ok(()) };
        self.header(6, tags::NODE_VAR, id)?;
        w_str(&mut self.out, &var.name)?;
        self.write_type(&var.ty)?;
        match &var.mem {
            Some(memref) => {
                w_array(&mut self.out, 1)?;
                self.write_memref(memref)?;
            }
            None => w_array(&mut self.out, 0)?,
        }
        self.write_span(&var.span)
    }

    fn write_op(&mut self, op: &Arc<Op>) -> Result<()> {
        let Some(id) = self.begin_node(op)? else { return Ok(()) };
        self.header(3, tags::NODE_OP, id)?;
        w_str(&mut self.out, &op.name)
    }

    fn write_global(&mut self, global: &Arc<GlobalVar>) -> Result<()> {
        let Some(id) = self.begin_node(global)? else { return Ok(()) };
        self.header(4, tags::NODE_GLOBAL, id)?;
        w_str(&mut self.out, &global.name)?;
        self.write_span(&global.span)
    }

    fn write_callee(&mut self, callee: &Callee) -> Result<()> {
        w_array(&mut self.out, 2)?;
        match callee {
            Callee::Op(op) => {
                w_u8(&mut self.out, tags::CALLEE_OP)?;
                self.write_op(op)
            }
            Callee::Global(global) => {
                w_u8(&mut self.out, tags::CALLEE_GLOBAL)?;
                self.write_global(global)
            }
        }
    }

    fn write_kwargs(&mut self, kwargs: &[(String, KwArg)]) -> Result<()> {
        w_array(&mut self.out, kwargs.len() as u32)?;
        for (name, value) in kwargs {
            w_array(&mut self.out, 3)?;
            w_str(&mut self.out, name)?;
            match value {
                KwArg::Memory(memory) => {
                    w_u8(&mut self.out, tags::KWARG_MEMORY)?;
                    w_u8(&mut self.out, *memory as u8)?;
                }
                KwArg::DType(dtype) => {
                    w_u8(&mut self.out, tags::KWARG_DTYPE)?;
                    w_u8(&mut self.out, *dtype as u8)?;
                }
                KwArg::Int(v) => {
                    w_u8(&mut self.out, tags::KWARG_INT)?;
                    w_i64(&mut self.out, *v)?;
                }
                KwArg::Float(v) => {
                    w_u8(&mut self.out, tags::KWARG_FLOAT)?;
                    w_f64(&mut self.out, *v)?;
                }
                KwArg::Bool(v) => {
                    w_u8(&mut self.out, tags::KWARG_BOOL)?;
                    w_bool(&mut self.out, *v)?;
                }
                KwArg::Str(v) => {
                    w_u8(&mut self.out, tags::KWARG_STR)?;
                    w_str(&mut self.out, v)?;
                }
            }
        }
        Ok(())
    }

    fn write_opt_type(&mut self, ty: &Option<TypeRef>) -> Result<()> {
        match ty {
            Some(ty) => {
                w_array(&mut self.out, 1)?;
                self.write_type(ty)
            }
            None => w_array(&mut self.out, 0),
        }
    }

    pub fn write_expr(&mut self, expr: &ExprRef) -> Result<()> {
        let Some(id) = self.begin_node(expr)? else { return Ok(()) };
        match expr.as_ref() {
            Expr::Var(var) => {
                self.header(3, tags::EXPR_VAR, id)?;
                self.write_var(var)
            }
            Expr::ConstInt { value, dtype, span } => {
                self.header(5, tags::EXPR_CONST_INT, id)?;
                w_i64(&mut self.out, *value)?;
                w_u8(&mut self.out, *dtype as u8)?;
                self.write_span(span)
            }
            Expr::ConstFloat { value, dtype, span } => {
                self.header(5, tags::EXPR_CONST_FLOAT, id)?;
                w_f64(&mut self.out, *value)?;
                w_u8(&mut self.out, *dtype as u8)?;
                self.write_span(span)
            }
            Expr::Binary { op, lhs, rhs, span } => {
                self.header(6, tags::EXPR_BINARY, id)?;
                w_u8(&mut self.out, *op as u8)?;
                self.write_expr(lhs)?;
                self.write_expr(rhs)?;
                self.write_span(span)
            }
            Expr::Unary { op, operand, span } => {
                self.header(5, tags::EXPR_UNARY, id)?;
                w_u8(&mut self.out, *op as u8)?;
                self.write_expr(operand)?;
                self.write_span(span)
            }
            Expr::Call(Call { callee, args, kwargs, ty, span }) => {
                self.header(7, tags::EXPR_CALL, id)?;
                self.write_callee(callee)?;
                w_array(&mut self.out, args.len() as u32)?;
                args.iter().try_for_each(|arg| self.write_expr(arg))?;
                self.write_kwargs(kwargs)?;
                self.write_opt_type(ty)?;
                self.write_span(span)
            }
            Expr::MakeTuple { elements, span } => {
                self.header(4, tags::EXPR_MAKE_TUPLE, id)?;
                w_array(&mut self.out, elements.len() as u32)?;
                elements.iter().try_for_each(|element| self.write_expr(element))?;
                self.write_span(span)
            }
            Expr::TupleGetItem { tuple, index, span } => {
                self.header(5, tags::EXPR_TUPLE_GET, id)?;
                self.write_expr(tuple)?;
                w_u64(&mut self.out, *index as u64)?;
                self.write_span(span)
            }
        }
    }

    pub fn write_stmt(&mut self, stmt: &StmtRef) -> Result<()> {
        let Some(id) = self.begin_node(stmt)? else { return Ok(()) };
        match stmt.as_ref() {
            Stmt::Assign { var, value, span } => {
                self.header(5, tags::STMT_ASSIGN, id)?;
                self.write_var(var)?;
                self.write_expr(value)?;
                self.write_span(span)
            }
            Stmt::Eval { expr, span } => {
                self.header(4, tags::STMT_EVAL, id)?;
                self.write_expr(expr)?;
                self.write_span(span)
            }
            Stmt::Seq { stmts, span } => {
                self.header(4, tags::STMT_SEQ, id)?;
                w_array(&mut self.out, stmts.len() as u32)?;
                stmts.iter().try_for_each(|child| self.write_stmt(child))?;
                self.write_span(span)
            }
            Stmt::If { cond, then_body, else_body, span } => {
                self.header(6, tags::STMT_IF, id)?;
                self.write_expr(cond)?;
                self.write_stmt(then_body)?;
                match else_body {
                    Some(else_body) => {
                        w_array(&mut self.out, 1)?;
                        self.write_stmt(else_body)?;
                    }
                    None => w_array(&mut self.out, 0)?,
                }
                self.write_span(span)
            }
            Stmt::For { var, start, stop, step, body, span } => {
                self.header(8, tags::STMT_FOR, id)?;
                self.write_var(var)?;
                self.write_expr(start)?;
                self.write_expr(stop)?;
                self.write_expr(step)?;
                self.write_stmt(body)?;
                self.write_span(span)
            }
            Stmt::Return { values, span } => {
                self.header(4, tags::STMT_RETURN, id)?;
                w_array(&mut self.out, values.len() as u32)?;
                values.iter().try_for_each(|value| self.write_expr(value))?;
                self.write_span(span)
            }
            Stmt::Scope { kind, body, span } => {
                self.header(5, tags::STMT_SCOPE, id)?;
                w_u8(&mut self.out, *kind as u8)?;
                self.write_stmt(body)?;
                self.write_span(span)
            }
        }
    }

    pub fn write_function(&mut self, function: &FunctionRef) -> Result<()> {
        let Some(id) = self.begin_node(function)? else { return Ok(()) };
        let Function { name, params, return_types, body, span, kind } = function.as_ref();
        self.header(8, tags::FUNCTION, id)?;
        w_str(&mut self.out, name)?;
        w_u8(&mut self.out, *kind as u8)?;
        w_array(&mut self.out, params.len() as u32)?;
        params.iter().try_for_each(|param| self.write_var(param))?;
        w_array(&mut self.out, return_types.len() as u32)?;
        return_types.iter().try_for_each(|ty| self.write_type(ty))?;
        self.write_stmt(body)?;
        self.write_span(span)
    }

    pub fn write_program(&mut self, program: &ProgramRef) -> Result<()> {
        let Some(id) = self.begin_node(program)? else { return Ok(()) };
        self.header(5, tags::PROGRAM, id)?;
        w_str(&mut self.out, &program.name)?;
        w_array(&mut self.out, program.functions.len() as u32)?;
        program.functions.values().try_for_each(|function| self.write_function(function))?;
        self.write_span(&program.span)
    }
}
