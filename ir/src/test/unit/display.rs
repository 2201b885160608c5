//! Text dump sanity checks; the dump is the diagnostic surface so its
//! overall shape is load-bearing for error messages.

use std::sync::Arc;

use tessera_dtype::DType;

use crate::test::{dim, tensor1, var_expr};
use crate::{Expr, Function, FunctionKind, KwArg, MemorySpace, OpRegistry, Span, Stmt, Var};

#[test]
fn function_dump_lists_statements() {
    let param = Var::new("a", tensor1(DType::Float32, 16), Span::unknown());
    let offsets = Expr::make_tuple([dim(0)], Span::unknown());
    let shapes = Expr::make_tuple([dim(16)], Span::unknown());
    let load = OpRegistry::global()
        .create(
            "block.load",
            vec![var_expr(&param), offsets, shapes],
            vec![("target_memory".into(), KwArg::Memory(MemorySpace::UB))],
            Span::unknown(),
        )
        .unwrap();
    let tile = Var::new("a_tile", load.ty().unwrap(), Span::unknown());
    let body = Stmt::seq(
        [
            Stmt::assign(Arc::clone(&tile), load, Span::unknown()),
            Stmt::return_([var_expr(&tile)], Span::unknown()),
        ],
        Span::unknown(),
    );
    let f = Function::new(
        "main",
        vec![param],
        vec![tensor1(DType::Float32, 16)],
        body,
        Span::unknown(),
        FunctionKind::InCore,
    );

    let text = f.to_string();
    assert!(text.contains("fn main(a: Tensor[f32; 16i64])"), "dump:\n{text}");
    assert!(text.contains("block.load(a, (0i64), (16i64), target_memory=UB)"), "dump:\n{text}");
    assert!(text.contains("a_tile: Tile[f32; 16i64 @ UB]"), "dump:\n{text}");
    assert!(text.contains("return a_tile"), "dump:\n{text}");
    assert!(text.contains("[InCore]"), "dump:\n{text}");
}

#[test]
fn global_calls_are_prefixed() {
    let call = Expr::call(
        crate::Callee::Global(crate::GlobalVar::new("helper", Span::unknown())),
        [dim(1)],
        vec![],
        None,
        Span::unknown(),
    );
    assert_eq!(call.to_string(), "@helper(1i64)");
}
