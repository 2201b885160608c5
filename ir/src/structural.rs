//! Span-insensitive structural hashing and equality.
//!
//! Two trees compare equal when they have the same shape, types, names and
//! constants; `Span`s (and derived memory annotations) never participate.
//! With `enable_auto_mapping`, variables compare by introduction index
//! instead of name, giving α-equivalence: `x + x` equals `y + y` but not
//! `x + y`.
//!
//! Contract: `structural_equal(a, b, m)` implies
//! `structural_hash(a, m) == structural_hash(b, m)`.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::expr::{Call, Callee, Expr, KwArg, Var};
use crate::function::Function;
use crate::program::Program;
use crate::stmt::Stmt;
use crate::types::Type;

/// Node kinds that participate in structural comparison.
pub trait StructuralNode {
    #[doc(hidden)]
    fn hash_node(&self, cx: &mut HashCtx);
    #[doc(hidden)]
    fn eq_node(&self, other: &Self, cx: &mut EqCtx) -> bool;
    #[doc(hidden)]
    fn summary(&self) -> String;
}

/// Structural hash, ignoring spans.
pub fn structural_hash<N: StructuralNode>(node: &N, enable_auto_mapping: bool) -> u64 {
    let mut cx = HashCtx::new(enable_auto_mapping);
    node.hash_node(&mut cx);
    cx.hasher.finish()
}

/// Structural equality, ignoring spans.
pub fn structural_equal<N: StructuralNode>(lhs: &N, rhs: &N, enable_auto_mapping: bool) -> bool {
    let mut cx = EqCtx::new(enable_auto_mapping);
    lhs.eq_node(rhs, &mut cx)
}

/// Like [`structural_equal`] but reports the first divergence, with the
/// offending subtrees printed.
pub fn assert_structural_equal<N: StructuralNode>(
    lhs: &N,
    rhs: &N,
    enable_auto_mapping: bool,
) -> Result<()> {
    let mut cx = EqCtx::new(enable_auto_mapping);
    if lhs.eq_node(rhs, &mut cx) {
        return Ok(());
    }
    let (path, lhs, rhs) = cx.failure.unwrap_or_else(|| {
        ("<root>".to_string(), lhs.summary(), rhs.summary())
    });
    Err(Error::StructuralMismatch { path, lhs, rhs })
}

// =========================================================================
// Contexts
// =========================================================================

#[doc(hidden)]
pub struct HashCtx {
    auto_map: bool,
    vars: HashMap<String, u64>,
    hasher: DefaultHasher,
}

impl HashCtx {
    fn new(auto_map: bool) -> Self {
        Self { auto_map, vars: HashMap::new(), hasher: DefaultHasher::new() }
    }

    fn tag(&mut self, tag: u8) {
        tag.hash(&mut self.hasher);
    }

    fn var_name(&mut self, name: &str) {
        if self.auto_map {
            let next = self.vars.len() as u64;
            let index = *self.vars.entry(name.to_string()).or_insert(next);
            index.hash(&mut self.hasher);
        } else {
            name.hash(&mut self.hasher);
        }
    }
}

#[doc(hidden)]
pub struct EqCtx {
    auto_map: bool,
    lhs_vars: HashMap<String, usize>,
    rhs_vars: HashMap<String, usize>,
    path: Vec<String>,
    failure: Option<(String, String, String)>,
}

impl EqCtx {
    fn new(auto_map: bool) -> Self {
        Self {
            auto_map,
            lhs_vars: HashMap::new(),
            rhs_vars: HashMap::new(),
            path: Vec::new(),
            failure: None,
        }
    }

    fn descend<T>(&mut self, segment: impl Into<String>, f: impl FnOnce(&mut Self) -> T) -> T {
        self.path.push(segment.into());
        let result = f(self);
        self.path.pop();
        result
    }

    /// Record the first divergence only; outer frames propagate `false`
    /// without overwriting the leaf report.
    fn fail<L: StructuralNode + ?Sized, R: StructuralNode + ?Sized>(
        &mut self,
        lhs: &L,
        rhs: &R,
    ) -> bool {
        if self.failure.is_none() {
            let path = if self.path.is_empty() { "<root>".to_string() } else { self.path.join(".") };
            self.failure = Some((path, lhs.summary(), rhs.summary()));
        }
        false
    }

    fn fail_msg(&mut self, lhs: impl Into<String>, rhs: impl Into<String>) -> bool {
        if self.failure.is_none() {
            let path = if self.path.is_empty() { "<root>".to_string() } else { self.path.join(".") };
            self.failure = Some((path, lhs.into(), rhs.into()));
        }
        false
    }

    fn vars_match(&mut self, lhs: &Var, rhs: &Var) -> bool {
        if !self.auto_map {
            return lhs.name == rhs.name;
        }
        match (self.lhs_vars.get(&lhs.name).copied(), self.rhs_vars.get(&rhs.name).copied()) {
            (Some(l), Some(r)) => l == r,
            (None, None) => {
                let index = self.lhs_vars.len();
                self.lhs_vars.insert(lhs.name.clone(), index);
                self.rhs_vars.insert(rhs.name.clone(), index);
                true
            }
            _ => false,
        }
    }
}

// =========================================================================
// Hashing
// =========================================================================

// Tag space is private to this module; serialization has its own.
mod tags {
    pub const SCALAR: u8 = 1;
    pub const TENSOR: u8 = 2;
    pub const TILE: u8 = 3;
    pub const TUPLE_TY: u8 = 4;
    pub const MEMREF_TY: u8 = 5;
    pub const VAR: u8 = 10;
    pub const CONST_INT: u8 = 11;
    pub const CONST_FLOAT: u8 = 12;
    pub const BINARY: u8 = 13;
    pub const UNARY: u8 = 14;
    pub const CALL: u8 = 15;
    pub const MAKE_TUPLE: u8 = 16;
    pub const TUPLE_GET: u8 = 17;
    pub const ASSIGN: u8 = 20;
    pub const EVAL: u8 = 21;
    pub const SEQ: u8 = 22;
    pub const IF: u8 = 23;
    pub const FOR: u8 = 24;
    pub const RETURN: u8 = 25;
    pub const SCOPE: u8 = 26;
    pub const FUNCTION: u8 = 30;
    pub const PROGRAM: u8 = 31;
    pub const OP_CALLEE: u8 = 40;
    pub const GLOBAL_CALLEE: u8 = 41;
}

impl StructuralNode for Type {
    fn hash_node(&self, cx: &mut HashCtx) {
        match self {
            Self::Scalar(dtype) => {
                cx.tag(tags::SCALAR);
                dtype.hash(&mut cx.hasher);
            }
            Self::Tensor { dtype, shape } => {
                cx.tag(tags::TENSOR);
                dtype.hash(&mut cx.hasher);
                shape.len().hash(&mut cx.hasher);
                for dim in shape {
                    dim.hash_node(cx);
                }
            }
            Self::Tile { dtype, shape, memory } => {
                cx.tag(tags::TILE);
                dtype.hash(&mut cx.hasher);
                memory.hash(&mut cx.hasher);
                shape.len().hash(&mut cx.hasher);
                for dim in shape {
                    dim.hash_node(cx);
                }
            }
            Self::Tuple(elements) => {
                cx.tag(tags::TUPLE_TY);
                elements.len().hash(&mut cx.hasher);
                for element in elements {
                    element.hash_node(cx);
                }
            }
            Self::MemRefHandle => cx.tag(tags::MEMREF_TY),
        }
    }

    fn eq_node(&self, other: &Self, cx: &mut EqCtx) -> bool {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => a == b || cx.fail(self, other),
            (Self::Tensor { dtype: da, shape: sa }, Self::Tensor { dtype: db, shape: sb }) => {
                if da != db || sa.len() != sb.len() {
                    return cx.fail(self, other);
                }
                sa.iter().zip(sb).enumerate().all(|(i, (a, b))| {
                    cx.descend(format!("shape[{i}]"), |cx| a.eq_node(b, cx))
                })
            }
            (
                Self::Tile { dtype: da, shape: sa, memory: ma },
                Self::Tile { dtype: db, shape: sb, memory: mb },
            ) => {
                if da != db || ma != mb || sa.len() != sb.len() {
                    return cx.fail(self, other);
                }
                sa.iter().zip(sb).enumerate().all(|(i, (a, b))| {
                    cx.descend(format!("shape[{i}]"), |cx| a.eq_node(b, cx))
                })
            }
            (Self::Tuple(a), Self::Tuple(b)) => {
                if a.len() != b.len() {
                    return cx.fail(self, other);
                }
                a.iter().zip(b).enumerate().all(|(i, (a, b))| {
                    cx.descend(format!("element[{i}]"), |cx| a.eq_node(b, cx))
                })
            }
            (Self::MemRefHandle, Self::MemRefHandle) => true,
            _ => cx.fail(self, other),
        }
    }

    fn summary(&self) -> String {
        self.to_string()
    }
}

impl StructuralNode for Expr {
    fn hash_node(&self, cx: &mut HashCtx) {
        match self {
            Self::Var(var) => {
                cx.tag(tags::VAR);
                cx.var_name(&var.name);
                var.ty.hash_node(cx);
            }
            Self::ConstInt { value, dtype, .. } => {
                cx.tag(tags::CONST_INT);
                value.hash(&mut cx.hasher);
                dtype.hash(&mut cx.hasher);
            }
            Self::ConstFloat { value, dtype, .. } => {
                cx.tag(tags::CONST_FLOAT);
                value.to_bits().hash(&mut cx.hasher);
                dtype.hash(&mut cx.hasher);
            }
            Self::Binary { op, lhs, rhs, .. } => {
                cx.tag(tags::BINARY);
                op.hash(&mut cx.hasher);
                lhs.hash_node(cx);
                rhs.hash_node(cx);
            }
            Self::Unary { op, operand, .. } => {
                cx.tag(tags::UNARY);
                op.hash(&mut cx.hasher);
                operand.hash_node(cx);
            }
            Self::Call(call) => {
                cx.tag(tags::CALL);
                match &call.callee {
                    Callee::Op(op) => {
                        cx.tag(tags::OP_CALLEE);
                        op.name.hash(&mut cx.hasher);
                    }
                    Callee::Global(gv) => {
                        cx.tag(tags::GLOBAL_CALLEE);
                        gv.name.hash(&mut cx.hasher);
                    }
                }
                call.args.len().hash(&mut cx.hasher);
                for arg in &call.args {
                    arg.hash_node(cx);
                }
                call.kwargs.len().hash(&mut cx.hasher);
                for (key, value) in &call.kwargs {
                    key.hash(&mut cx.hasher);
                    hash_kwarg(value, cx);
                }
                match &call.ty {
                    Some(ty) => {
                        cx.tag(1);
                        ty.hash_node(cx);
                    }
                    None => cx.tag(0),
                }
            }
            Self::MakeTuple { elements, .. } => {
                cx.tag(tags::MAKE_TUPLE);
                elements.len().hash(&mut cx.hasher);
                for element in elements {
                    element.hash_node(cx);
                }
            }
            Self::TupleGetItem { tuple, index, .. } => {
                cx.tag(tags::TUPLE_GET);
                index.hash(&mut cx.hasher);
                tuple.hash_node(cx);
            }
        }
    }

    fn eq_node(&self, other: &Self, cx: &mut EqCtx) -> bool {
        // Pointer-identity fast path is only sound without auto-mapping:
        // skipping a shared subtree would skip its variable introductions.
        if !cx.auto_map && std::ptr::eq(self, other) {
            return true;
        }
        match (self, other) {
            (Self::Var(a), Self::Var(b)) => {
                if !cx.vars_match(a, b) {
                    return cx.fail(self, other);
                }
                cx.descend("type", |cx| a.ty.eq_node(&b.ty, cx))
            }
            (
                Self::ConstInt { value: va, dtype: da, .. },
                Self::ConstInt { value: vb, dtype: db, .. },
            ) => (va == vb && da == db) || cx.fail(self, other),
            (
                Self::ConstFloat { value: va, dtype: da, .. },
                Self::ConstFloat { value: vb, dtype: db, .. },
            ) => (va.to_bits() == vb.to_bits() && da == db) || cx.fail(self, other),
            (
                Self::Binary { op: oa, lhs: la, rhs: ra, .. },
                Self::Binary { op: ob, lhs: lb, rhs: rb, .. },
            ) => {
                if oa != ob {
                    return cx.fail(self, other);
                }
                cx.descend("lhs", |cx| la.eq_node(lb, cx))
                    && cx.descend("rhs", |cx| ra.eq_node(rb, cx))
            }
            (
                Self::Unary { op: oa, operand: a, .. },
                Self::Unary { op: ob, operand: b, .. },
            ) => {
                if oa != ob {
                    return cx.fail(self, other);
                }
                cx.descend("operand", |cx| a.eq_node(b, cx))
            }
            (Self::Call(a), Self::Call(b)) => eq_call(a, b, cx, self, other),
            (Self::MakeTuple { elements: ea, .. }, Self::MakeTuple { elements: eb, .. }) => {
                if ea.len() != eb.len() {
                    return cx.fail(self, other);
                }
                ea.iter().zip(eb).enumerate().all(|(i, (a, b))| {
                    cx.descend(format!("element[{i}]"), |cx| a.eq_node(b, cx))
                })
            }
            (
                Self::TupleGetItem { tuple: ta, index: ia, .. },
                Self::TupleGetItem { tuple: tb, index: ib, .. },
            ) => {
                if ia != ib {
                    return cx.fail(self, other);
                }
                cx.descend("tuple", |cx| ta.eq_node(tb, cx))
            }
            _ => cx.fail(self, other),
        }
    }

    fn summary(&self) -> String {
        self.to_string()
    }
}

fn hash_kwarg(value: &KwArg, cx: &mut HashCtx) {
    match value {
        KwArg::Memory(memory) => {
            cx.tag(0);
            memory.hash(&mut cx.hasher);
        }
        KwArg::DType(dtype) => {
            cx.tag(1);
            dtype.hash(&mut cx.hasher);
        }
        KwArg::Int(value) => {
            cx.tag(2);
            value.hash(&mut cx.hasher);
        }
        KwArg::Float(value) => {
            cx.tag(3);
            value.to_bits().hash(&mut cx.hasher);
        }
        KwArg::Bool(value) => {
            cx.tag(4);
            value.hash(&mut cx.hasher);
        }
        KwArg::Str(value) => {
            cx.tag(5);
            value.hash(&mut cx.hasher);
        }
    }
}

fn eq_call(a: &Call, b: &Call, cx: &mut EqCtx, lhs_expr: &Expr, rhs_expr: &Expr) -> bool {
    let callee_matches = match (&a.callee, &b.callee) {
        (Callee::Op(oa), Callee::Op(ob)) => oa.name == ob.name,
        (Callee::Global(ga), Callee::Global(gb)) => ga.name == gb.name,
        _ => false,
    };
    if !callee_matches || a.args.len() != b.args.len() || a.kwargs.len() != b.kwargs.len() {
        return cx.fail(lhs_expr, rhs_expr);
    }
    for (i, (ka, kb)) in a.kwargs.iter().zip(&b.kwargs).enumerate() {
        if ka.0 != kb.0 || !kwarg_eq(&ka.1, &kb.1) {
            return cx.descend(format!("kwargs[{i}]"), |cx| {
                cx.fail_msg(format!("{}={}", ka.0, ka.1), format!("{}={}", kb.0, kb.1))
            });
        }
    }
    if !a
        .args
        .iter()
        .zip(&b.args)
        .enumerate()
        .all(|(i, (x, y))| cx.descend(format!("args[{i}]"), |cx| x.eq_node(y, cx)))
    {
        return false;
    }
    match (&a.ty, &b.ty) {
        (None, None) => true,
        (Some(ta), Some(tb)) => cx.descend("type", |cx| ta.eq_node(tb, cx)),
        _ => cx.fail(lhs_expr, rhs_expr),
    }
}

fn kwarg_eq(a: &KwArg, b: &KwArg) -> bool {
    match (a, b) {
        // Bitwise float compare keeps the hash/equality laws aligned.
        (KwArg::Float(x), KwArg::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

impl StructuralNode for Stmt {
    fn hash_node(&self, cx: &mut HashCtx) {
        match self {
            Self::Assign { var, value, .. } => {
                cx.tag(tags::ASSIGN);
                cx.var_name(&var.name);
                var.ty.hash_node(cx);
                value.hash_node(cx);
            }
            Self::Eval { expr, .. } => {
                cx.tag(tags::EVAL);
                expr.hash_node(cx);
            }
            Self::Seq { stmts, .. } => {
                cx.tag(tags::SEQ);
                stmts.len().hash(&mut cx.hasher);
                for stmt in stmts {
                    stmt.hash_node(cx);
                }
            }
            Self::If { cond, then_body, else_body, .. } => {
                cx.tag(tags::IF);
                cond.hash_node(cx);
                then_body.hash_node(cx);
                match else_body {
                    Some(else_body) => {
                        cx.tag(1);
                        else_body.hash_node(cx);
                    }
                    None => cx.tag(0),
                }
            }
            Self::For { var, start, stop, step, body, .. } => {
                cx.tag(tags::FOR);
                cx.var_name(&var.name);
                var.ty.hash_node(cx);
                start.hash_node(cx);
                stop.hash_node(cx);
                step.hash_node(cx);
                body.hash_node(cx);
            }
            Self::Return { values, .. } => {
                cx.tag(tags::RETURN);
                values.len().hash(&mut cx.hasher);
                for value in values {
                    value.hash_node(cx);
                }
            }
            Self::Scope { kind, body, .. } => {
                cx.tag(tags::SCOPE);
                kind.hash(&mut cx.hasher);
                body.hash_node(cx);
            }
        }
    }

    fn eq_node(&self, other: &Self, cx: &mut EqCtx) -> bool {
        if !cx.auto_map && std::ptr::eq(self, other) {
            return true;
        }
        match (self, other) {
            (Self::Assign { var: va, value: ea, .. }, Self::Assign { var: vb, value: eb, .. }) => {
                if !cx.vars_match(va, vb) {
                    return cx.fail(self, other);
                }
                cx.descend("var.type", |cx| va.ty.eq_node(&vb.ty, cx))
                    && cx.descend("value", |cx| ea.eq_node(eb, cx))
            }
            (Self::Eval { expr: a, .. }, Self::Eval { expr: b, .. }) => {
                cx.descend("expr", |cx| a.eq_node(b, cx))
            }
            (Self::Seq { stmts: sa, .. }, Self::Seq { stmts: sb, .. }) => {
                if sa.len() != sb.len() {
                    return cx.fail_msg(
                        format!("sequence of {} statements", sa.len()),
                        format!("sequence of {} statements", sb.len()),
                    );
                }
                sa.iter().zip(sb).enumerate().all(|(i, (a, b))| {
                    cx.descend(format!("stmts[{i}]"), |cx| a.eq_node(b, cx))
                })
            }
            (
                Self::If { cond: ca, then_body: ta, else_body: ea, .. },
                Self::If { cond: cb, then_body: tb, else_body: eb, .. },
            ) => {
                if !cx.descend("cond", |cx| ca.eq_node(cb, cx)) {
                    return false;
                }
                if !cx.descend("then", |cx| ta.eq_node(tb, cx)) {
                    return false;
                }
                match (ea, eb) {
                    (None, None) => true,
                    (Some(a), Some(b)) => cx.descend("else", |cx| a.eq_node(b, cx)),
                    _ => cx.fail(self, other),
                }
            }
            (
                Self::For { var: va, start: sa, stop: pa, step: ta, body: ba, .. },
                Self::For { var: vb, start: sb, stop: pb, step: tb, body: bb, .. },
            ) => {
                if !cx.vars_match(va, vb) {
                    return cx.fail(self, other);
                }
                cx.descend("var.type", |cx| va.ty.eq_node(&vb.ty, cx))
                    && cx.descend("start", |cx| sa.eq_node(sb, cx))
                    && cx.descend("stop", |cx| pa.eq_node(pb, cx))
                    && cx.descend("step", |cx| ta.eq_node(tb, cx))
                    && cx.descend("body", |cx| ba.eq_node(bb, cx))
            }
            (Self::Return { values: va, .. }, Self::Return { values: vb, .. }) => {
                if va.len() != vb.len() {
                    return cx.fail(self, other);
                }
                va.iter().zip(vb).enumerate().all(|(i, (a, b))| {
                    cx.descend(format!("values[{i}]"), |cx| a.eq_node(b, cx))
                })
            }
            (
                Self::Scope { kind: ka, body: ba, .. },
                Self::Scope { kind: kb, body: bb, .. },
            ) => {
                if ka != kb {
                    return cx.fail(self, other);
                }
                cx.descend("body", |cx| ba.eq_node(bb, cx))
            }
            _ => cx.fail(self, other),
        }
    }

    fn summary(&self) -> String {
        self.to_string().trim_end().to_string()
    }
}

impl StructuralNode for Function {
    fn hash_node(&self, cx: &mut HashCtx) {
        cx.tag(tags::FUNCTION);
        self.name.hash(&mut cx.hasher);
        self.kind.hash(&mut cx.hasher);
        self.params.len().hash(&mut cx.hasher);
        for param in &self.params {
            cx.var_name(&param.name);
            param.ty.hash_node(cx);
        }
        self.return_types.len().hash(&mut cx.hasher);
        for ty in &self.return_types {
            ty.hash_node(cx);
        }
        self.body.hash_node(cx);
    }

    fn eq_node(&self, other: &Self, cx: &mut EqCtx) -> bool {
        if self.name != other.name
            || self.kind != other.kind
            || self.params.len() != other.params.len()
            || self.return_types.len() != other.return_types.len()
        {
            return cx.fail_msg(signature_of(self), signature_of(other));
        }
        for (i, (pa, pb)) in self.params.iter().zip(&other.params).enumerate() {
            if !cx.vars_match(pa, pb) {
                return cx.fail_msg(signature_of(self), signature_of(other));
            }
            if !cx.descend(format!("params[{i}].type"), |cx| pa.ty.eq_node(&pb.ty, cx)) {
                return false;
            }
        }
        for (i, (ta, tb)) in self.return_types.iter().zip(&other.return_types).enumerate() {
            if !cx.descend(format!("return_types[{i}]"), |cx| ta.eq_node(tb, cx)) {
                return false;
            }
        }
        cx.descend("body", |cx| self.body.eq_node(&other.body, cx))
    }

    fn summary(&self) -> String {
        signature_of(self)
    }
}

fn signature_of(function: &Function) -> String {
    let params: Vec<String> =
        function.params.iter().map(|p| format!("{}: {}", p.name, p.ty)).collect();
    format!("fn {}({}) [{}]", function.name, params.join(", "), function.kind)
}

impl StructuralNode for Program {
    fn hash_node(&self, cx: &mut HashCtx) {
        cx.tag(tags::PROGRAM);
        self.name.hash(&mut cx.hasher);
        self.functions.len().hash(&mut cx.hasher);
        for (name, function) in &self.functions {
            name.hash(&mut cx.hasher);
            function.hash_node(cx);
        }
    }

    fn eq_node(&self, other: &Self, cx: &mut EqCtx) -> bool {
        if self.name != other.name || self.functions.len() != other.functions.len() {
            return cx.fail_msg(
                format!("program {} with {} functions", self.name, self.functions.len()),
                format!("program {} with {} functions", other.name, other.functions.len()),
            );
        }
        self.functions.iter().zip(&other.functions).all(|((na, fa), (nb, fb))| {
            if na != nb {
                return cx.fail_msg(format!("function {na}"), format!("function {nb}"));
            }
            cx.descend(format!("functions[{na}]"), |cx| fa.eq_node(fb, cx))
        })
    }

    fn summary(&self) -> String {
        format!("program {}", self.name)
    }
}

// Arc transparency: comparing handles compares the nodes.
impl<N: StructuralNode> StructuralNode for Arc<N> {
    fn hash_node(&self, cx: &mut HashCtx) {
        self.as_ref().hash_node(cx);
    }

    fn eq_node(&self, other: &Self, cx: &mut EqCtx) -> bool {
        self.as_ref().eq_node(other.as_ref(), cx)
    }

    fn summary(&self) -> String {
        self.as_ref().summary()
    }
}
