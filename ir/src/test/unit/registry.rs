//! Op registry behavior: typed `Call` construction and lookup semantics.

use tessera_dtype::DType;

use crate::test::{dim, tensor2, var_expr};
use crate::{
    Error, Expr, KwArg, MemorySpace, OpCategory, OpRegistry, Span, Type, Var,
};

fn tensor_arg(name: &str) -> crate::ExprRef {
    var_expr(&Var::new(name, tensor2(DType::Float32, 16, 16), Span::unknown()))
}

#[test]
fn load_infers_tile_type() {
    let offsets = Expr::make_tuple([dim(0), dim(0)], Span::unknown());
    let shapes = Expr::make_tuple([dim(16), dim(16)], Span::unknown());
    let load = OpRegistry::global()
        .create(
            "block.load",
            vec![tensor_arg("a"), offsets, shapes],
            vec![("target_memory".into(), KwArg::Memory(MemorySpace::UB))],
            Span::unknown(),
        )
        .unwrap();
    let ty = load.ty().unwrap();
    let (dtype, shape, memory) = ty.as_tile().unwrap();
    assert_eq!(dtype, DType::Float32);
    assert_eq!(shape.len(), 2);
    assert_eq!(memory, MemorySpace::UB);
}

#[test]
fn store_returns_destination_tensor_type() {
    let tile =
        var_expr(&Var::new("t", Type::tile(DType::Float32, [dim(16)], MemorySpace::UB), Span::unknown()));
    let out = var_expr(&Var::new("out", crate::test::tensor1(DType::Float32, 16), Span::unknown()));
    let offsets = Expr::make_tuple([dim(0)], Span::unknown());
    let shapes = Expr::make_tuple([dim(16)], Span::unknown());
    let store = OpRegistry::global()
        .create("block.store", vec![tile, offsets, shapes, out], vec![], Span::unknown())
        .unwrap();
    assert!(store.ty().unwrap().is_tensor());
}

#[test]
fn tensor_create_builds_tensor() {
    let shape = Expr::make_tuple([dim(32), dim(8)], Span::unknown());
    let create = OpRegistry::global()
        .create(
            "tensor.create",
            vec![shape],
            vec![("dtype".into(), KwArg::DType(DType::Float16))],
            Span::unknown(),
        )
        .unwrap();
    let ty = create.ty().unwrap();
    let (dtype, shape) = ty.as_tensor().unwrap();
    assert_eq!(dtype, DType::Float16);
    assert_eq!(shape.len(), 2);
}

#[test]
fn matmul_shape_inference() {
    let a = var_expr(&Var::new(
        "a",
        Type::tile(DType::Float16, [dim(16), dim(32)], MemorySpace::L0A),
        Span::unknown(),
    ));
    let b = var_expr(&Var::new(
        "b",
        Type::tile(DType::Float16, [dim(32), dim(64)], MemorySpace::L0B),
        Span::unknown(),
    ));
    let matmul =
        OpRegistry::global().create("block.matmul", vec![a, b], vec![], Span::unknown()).unwrap();
    let ty = matmul.ty().unwrap();
    let (_, shape, _) = ty.as_tile().unwrap();
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    assert_eq!(dims, ["16i64", "64i64"]);
}

#[test]
fn unknown_op_is_not_found() {
    let err = OpRegistry::global()
        .create("tensor.nonexistent", vec![], vec![], Span::unknown())
        .unwrap_err();
    match err {
        Error::OpNotFound { name } => assert_eq!(name, "tensor.nonexistent"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn categories_are_tagged_not_inferred_from_names() {
    let registry = OpRegistry::global();
    assert_eq!(registry.category("tensor.add"), Some(OpCategory::TensorOp));
    assert_eq!(registry.category("block.add"), Some(OpCategory::BlockOp));
    assert_eq!(registry.category("block.sync_src"), Some(OpCategory::SyncOp));
    assert_eq!(registry.category("no.such.op"), None);
}

#[test]
fn cast_kwarg_is_required() {
    let err = OpRegistry::global()
        .create("tensor.cast", vec![tensor_arg("a")], vec![], Span::unknown())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOpArgs { .. }));
}

#[test]
fn sync_ops_have_no_value() {
    let sync = OpRegistry::global()
        .create(
            "block.sync_src",
            vec![],
            vec![("pipe".into(), KwArg::Str("MTE".into())), ("event".into(), KwArg::Int(0))],
            Span::unknown(),
        )
        .unwrap();
    assert!(sync.ty().is_none());
}
