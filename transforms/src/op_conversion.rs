//! Tensor-op → block-op conversion registry.
//!
//! A process-wide table mapping source op names to rewrite rules. Two
//! registration styles:
//!
//! - simple: a name mapping (`tensor.add` → `block.add`) that synthesizes a
//!   rule building the target call through the op registry;
//! - custom: an arbitrary rewrite producing prologue statements plus a
//!   result expression.
//!
//! Re-registering a name replaces the previous rule. Registration happens
//! at startup; lookups may then come from many threads.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use tessera_ir::{ExprRef, KwArg, OpRegistry, Span, Stmt, StmtRef, Var, VarRef};

use crate::error::{Error, Result};

/// Outcome of one conversion rule.
#[derive(Clone, Debug)]
pub struct ConversionResult {
    /// Statements to insert before the rewritten assignment.
    pub prologue: Vec<StmtRef>,
    pub result: ExprRef,
}

impl ConversionResult {
    /// Simple case: a bare result expression.
    pub fn expr(result: ExprRef) -> Self {
        Self { prologue: Vec::new(), result }
    }

    pub fn with_prologue(prologue: Vec<StmtRef>, result: ExprRef) -> Self {
        Self { prologue, result }
    }
}

/// A conversion rule. Arguments arrive already substituted to tile values.
pub type ConversionFunc =
    Arc<dyn Fn(&[ExprRef], &[(String, KwArg)], &Span) -> Result<ConversionResult> + Send + Sync>;

pub struct OpConversionRegistry {
    conversions: RwLock<HashMap<String, ConversionFunc>>,
}

static REGISTRY: Lazy<OpConversionRegistry> = Lazy::new(OpConversionRegistry::with_defaults);

impl OpConversionRegistry {
    pub fn global() -> &'static OpConversionRegistry {
        &REGISTRY
    }

    fn with_defaults() -> Self {
        let registry = Self { conversions: RwLock::new(HashMap::new()) };

        // Elementwise binary ops.
        registry.register_simple("tensor.add", "block.add");
        registry.register_simple("tensor.sub", "block.sub");
        registry.register_simple("tensor.mul", "block.mul");
        registry.register_simple("tensor.div", "block.div");
        registry.register_simple("tensor.maximum", "block.maximum");

        // Scalar-broadcast ops.
        registry.register_simple("tensor.add_scalar", "block.adds");
        registry.register_simple("tensor.sub_scalar", "block.subs");
        registry.register_simple("tensor.mul_scalar", "block.muls");
        registry.register_simple("tensor.div_scalar", "block.divs");

        // Unary ops.
        registry.register_simple("tensor.exp", "block.exp");
        registry.register_simple("tensor.cast", "block.cast");

        // Shape ops.
        registry.register_simple("tensor.reshape", "block.reshape");
        registry.register_simple("tensor.transpose", "block.transpose");

        registry
    }

    /// Register a name mapping. The synthesized rule resolves `to_op` at
    /// invocation time, so a missing target surfaces as `OpNotFound` when
    /// the rule runs, not here.
    pub fn register_simple(&self, from_op: impl Into<String>, to_op: impl Into<String>) {
        let from_op = from_op.into();
        let to_op = to_op.into();
        tracing::debug!(from = %from_op, to = %to_op, "registering simple op conversion");
        let rule: ConversionFunc = Arc::new(move |args, kwargs, span| {
            let call = OpRegistry::global().create(
                &to_op,
                args.to_vec(),
                kwargs.to_vec(),
                span.clone(),
            )?;
            Ok(ConversionResult::expr(call))
        });
        self.conversions.write().insert(from_op, rule);
    }

    /// Register a custom rule, replacing any previous rule for `from_op`.
    pub fn register_custom(&self, from_op: impl Into<String>, func: ConversionFunc) {
        let from_op = from_op.into();
        tracing::debug!(from = %from_op, "registering custom op conversion");
        self.conversions.write().insert(from_op, func);
    }

    pub fn lookup(&self, op_name: &str) -> Option<ConversionFunc> {
        self.conversions.read().get(op_name).cloned()
    }

    pub fn has_conversion(&self, op_name: &str) -> bool {
        self.conversions.read().contains_key(op_name)
    }
}

/// Prologue builder for custom conversion rules.
///
/// ```ignore
/// let rule: ConversionFunc = Arc::new(|args, _kwargs, span| {
///     let mut ctx = ConversionCtx::new(span.clone());
///     let lhs = ctx.let_("lhs_l0a", block_move(args[0].clone(), MemorySpace::L0A, span)?)?;
///     let rhs = ctx.let_("rhs_l0b", block_move(args[1].clone(), MemorySpace::L0B, span)?)?;
///     let result = block_matmul(lhs, rhs, span)?;
///     Ok(ctx.finish(result))
/// });
/// ```
pub struct ConversionCtx {
    stmts: Vec<StmtRef>,
    span: Span,
}

impl ConversionCtx {
    pub fn new(span: Span) -> Self {
        Self { stmts: Vec::new(), span }
    }

    /// Bind `value` to a fresh variable and emit the assignment into the
    /// prologue. Returns the variable as an expression.
    pub fn let_(&mut self, name: impl Into<String>, value: ExprRef) -> Result<ExprRef> {
        let name = name.into();
        let ty = value.ty().ok_or_else(|| {
            Error::internal(format!("conversion binding {name} has no value type"))
        })?;
        let var: VarRef = Var::new(name, ty, self.span.clone());
        self.stmts.push(Stmt::assign(Arc::clone(&var), value, self.span.clone()));
        Ok(tessera_ir::Expr::var(var))
    }

    /// Emit a raw statement into the prologue.
    pub fn emit(&mut self, stmt: StmtRef) {
        self.stmts.push(stmt);
    }

    pub fn finish(self, result: ExprRef) -> ConversionResult {
        ConversionResult::with_prologue(self.stmts, result)
    }
}
