
use std::sync::Arc;

use tessera_dtype::DType;
use tessera_ir::{
    Callee, Expr, ExprRef, Function, FunctionKind, GlobalVar, OpRegistry, Program, ProgramRef,
    Span, Stmt, Type, TypeRef, Var, VarRef,
};

pub fn dim(value: i64) -> ExprRef {
    Expr::const_int(value, DType::Int64, Span::unknown())
}

pub fn tensor_ty(dtype: DType, shape: &[i64]) -> TypeRef {
    Type::tensor(dtype, shape.iter().map(|size| dim(*size)))
}

pub fn var(name: &str, ty: TypeRef) -> VarRef {
    Var::new(name, ty, Span::unknown())
}

pub fn var_expr(v: &VarRef) -> ExprRef {
    Expr::var(Arc::clone(v))
}

pub fn op_call(name: &str, args: Vec<ExprRef>) -> ExprRef {
    OpRegistry::global().create(name, args, vec![], Span::unknown()).unwrap()
}

pub fn global_call(name: &str, args: Vec<ExprRef>, ty: Option<TypeRef>) -> ExprRef {
    Expr::call(
        Callee::Global(GlobalVar::new(name, Span::unknown())),
        args,
        vec![],
        ty,
        Span::unknown(),
    )
}

/// Scenario fixture: an InCore `f(a, b) -> tensor.add(a, b)` called from an
/// orchestration `main`.
pub fn incore_add_program() -> ProgramRef {
    let elem = tensor_ty(DType::Float32, &[16, 16]);

    let a = var("a", elem.clone());
    let b = var("b", elem.clone());
    let add = op_call("tensor.add", vec![var_expr(&a), var_expr(&b)]);
    let c = var("c", elem.clone());
    let f_body = Stmt::seq(
        [
            Stmt::assign(Arc::clone(&c), add, Span::unknown()),
            Stmt::return_([var_expr(&c)], Span::unknown()),
        ],
        Span::unknown(),
    );
    let f = Function::new(
        "f",
        vec![a, b],
        vec![elem.clone()],
        f_body,
        Span::unknown(),
        FunctionKind::InCore,
    );

    let x = var("x", elem.clone());
    let y = var("y", elem.clone());
    let d = var("d", elem.clone());
    let call = global_call("f", vec![var_expr(&x), var_expr(&y)], Some(elem.clone()));
    let main_body = Stmt::seq(
        [
            Stmt::assign(Arc::clone(&d), call, Span::unknown()),
            Stmt::return_([var_expr(&d)], Span::unknown()),
        ],
        Span::unknown(),
    );
    let main = Function::new(
        "main",
        vec![x, y],
        vec![elem],
        main_body,
        Span::unknown(),
        FunctionKind::Orchestration,
    );

    Program::new([f, main], "test", Span::unknown())
}

/// Flat statement list of a function body.
pub fn body_stmts(function: &Function) -> Vec<tessera_ir::StmtRef> {
    Stmt::flatten(&function.body)
}
