//! Compact text dump of IR trees.
//!
//! One line per statement, Python-ish expression syntax. This is the
//! diagnostic surface used in verifier reports and structural-mismatch
//! messages, not a round-trippable pretty-printer.

use std::fmt;

use crate::expr::{Call, Callee, Expr, KwArg};
use crate::function::Function;
use crate::program::Program;
use crate::stmt::Stmt;
use crate::types::Type;

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(dtype) => write!(f, "{}", dtype.short_name()),
            Self::Tensor { dtype, shape } => {
                write!(f, "Tensor[{}; ", dtype.short_name())?;
                write_list(f, shape.iter())?;
                write!(f, "]")
            }
            Self::Tile { dtype, shape, memory } => {
                write!(f, "Tile[{}; ", dtype.short_name())?;
                write_list(f, shape.iter())?;
                write!(f, " @ {memory}]")
            }
            Self::Tuple(elements) => {
                write!(f, "(")?;
                write_list(f, elements.iter())?;
                write!(f, ")")
            }
            Self::MemRefHandle => write!(f, "memref"),
        }
    }
}

impl fmt::Display for KwArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(memory) => write!(f, "{memory}"),
            Self::DType(dtype) => write!(f, "{}", dtype.short_name()),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(var) => write!(f, "{}", var.name),
            Self::ConstInt { value, dtype, .. } => write!(f, "{value}{}", dtype.short_name()),
            Self::ConstFloat { value, dtype, .. } => write!(f, "{value}{}", dtype.short_name()),
            Self::Binary { op, lhs, rhs, .. } => write!(f, "({lhs} {op} {rhs})"),
            Self::Unary { op, operand, .. } => write!(f, "{op}({operand})"),
            Self::Call(call) => call.write(f),
            Self::MakeTuple { elements, .. } => {
                write!(f, "(")?;
                write_list(f, elements.iter())?;
                write!(f, ")")
            }
            Self::TupleGetItem { tuple, index, .. } => write!(f, "{tuple}[{index}]"),
        }
    }
}

impl Call {
    fn write(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.callee {
            Callee::Op(op) => write!(f, "{}(", op.name)?,
            Callee::Global(gv) => write!(f, "@{}(", gv.name)?,
        }
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{arg}")?;
        }
        for (key, value) in &self.kwargs {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{key}={value}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_stmt(f, self, 0)
    }
}

fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, indent: usize) -> fmt::Result {
    let pad = "  ".repeat(indent);
    match stmt {
        Stmt::Assign { var, value, .. } => {
            writeln!(f, "{pad}{}: {} = {value}", var.name, var.ty)
        }
        Stmt::Eval { expr, .. } => writeln!(f, "{pad}{expr}"),
        Stmt::Seq { stmts, .. } => {
            for child in stmts {
                write_stmt(f, child, indent)?;
            }
            Ok(())
        }
        Stmt::If { cond, then_body, else_body, .. } => {
            writeln!(f, "{pad}if {cond}:")?;
            write_stmt(f, then_body, indent + 1)?;
            if let Some(else_body) = else_body {
                writeln!(f, "{pad}else:")?;
                write_stmt(f, else_body, indent + 1)?;
            }
            Ok(())
        }
        Stmt::For { var, start, stop, step, body, .. } => {
            writeln!(f, "{pad}for {} in range({start}, {stop}, {step}):", var.name)?;
            write_stmt(f, body, indent + 1)
        }
        Stmt::Return { values, .. } => {
            write!(f, "{pad}return ")?;
            write_list(f, values.iter())?;
            writeln!(f)
        }
        Stmt::Scope { kind, body, .. } => {
            writeln!(f, "{pad}scope {kind}:")?;
            write_stmt(f, body, indent + 1)
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", param.name, param.ty)?;
        }
        write!(f, ") -> (")?;
        write_list(f, self.return_types.iter())?;
        writeln!(f, ") [{}]:", self.kind)?;
        write_stmt(f, &self.body, 1)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "program {}:", self.name)?;
        for function in self.functions.values() {
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

fn write_list<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
