//! Memory-planning pass tests, run on lowered fixtures.

use std::sync::Arc;

use tessera_dtype::DType;
use tessera_ir::{Function, FunctionKind, FunctionRef, MemorySpace, Program, ProgramRef, Span, Stmt};

use crate::passes::{
    add_alloc, basic_memory_reuse, convert_tensor_to_block_ops, init_mem_ref, insert_sync,
};
use crate::test::{incore_add_program, op_call, tensor_ty, var, var_expr};
use crate::verifier::{HasMemRefsVerifier, PropertyVerifier};

fn lowered_fixture() -> ProgramRef {
    convert_tensor_to_block_ops().run(&incore_add_program()).unwrap()
}

/// `c = add(a, a); d = mul(c, c); return d`, lowered. The intermediate
/// tile dies before the last one is defined, so reuse can fire.
fn lowered_chain_fixture() -> ProgramRef {
    let tensor = tensor_ty(DType::Float32, &[64]);
    let a = var("a", tensor.clone());
    let c = var("c", tensor.clone());
    let d = var("d", tensor.clone());
    let body = Stmt::seq(
        [
            Stmt::assign(
                Arc::clone(&c),
                op_call("tensor.add", vec![var_expr(&a), var_expr(&a)]),
                Span::unknown(),
            ),
            Stmt::assign(
                Arc::clone(&d),
                op_call("tensor.mul", vec![var_expr(&c), var_expr(&c)]),
                Span::unknown(),
            ),
            Stmt::return_([var_expr(&d)], Span::unknown()),
        ],
        Span::unknown(),
    );
    let f =
        Function::new("f", vec![a], vec![tensor], body, Span::unknown(), FunctionKind::InCore);
    let program = Program::new([f], "test", Span::unknown());
    convert_tensor_to_block_ops().run(&program).unwrap()
}

fn tile_assign_vars(function: &FunctionRef) -> Vec<tessera_ir::VarRef> {
    Stmt::flatten(&function.body)
        .iter()
        .filter_map(|stmt| stmt.as_assign().map(|(var, _)| var.clone()))
        .filter(|var| var.ty.is_tile())
        .collect()
}

#[test]
fn init_mem_ref_attaches_descriptors() {
    let program = init_mem_ref().run(&lowered_fixture()).unwrap();
    let f = program.get("f").unwrap();

    // Tensor params live in DDR.
    for param in f.params.iter().filter(|p| p.ty.is_tensor()) {
        let memref = param.mem.as_ref().expect("tensor param without memref");
        assert_eq!(memref.space, MemorySpace::DDR);
        assert_eq!(memref.bytes, Some(16 * 16 * 4));
    }

    // Tile vars live in their tile memory space, each with its own id.
    let tiles = tile_assign_vars(f);
    assert_eq!(tiles.len(), 3);
    for tile in &tiles {
        let memref = tile.mem.as_ref().expect("tile var without memref");
        assert_eq!(memref.space, MemorySpace::UB);
        assert_eq!(memref.bytes, Some(16 * 16 * 4));
    }
    let ids: std::collections::HashSet<usize> =
        tiles.iter().map(|t| t.mem.as_ref().unwrap().id).collect();
    assert_eq!(ids.len(), 3);

    let mut diagnostics = Vec::new();
    HasMemRefsVerifier.verify(&program, &mut diagnostics);
    assert!(diagnostics.is_empty(), "unexpected: {diagnostics:?}");

    // Orchestration functions are untouched.
    assert!(program.get("main").unwrap().params.iter().all(|p| p.mem.is_none()));
}

#[test]
fn memory_reuse_shares_dead_allocations() {
    let program = basic_memory_reuse()
        .run(&init_mem_ref().run(&lowered_chain_fixture()).unwrap())
        .unwrap();
    let f = program.get("f").unwrap();
    let tiles = tile_assign_vars(f);
    assert_eq!(tiles.len(), 3);

    let ids: Vec<usize> = tiles.iter().map(|t| t.mem.as_ref().unwrap().id).collect();
    // d_tile reuses a_tile's buffer: a_tile is dead once c_tile exists.
    assert_eq!(ids[2], ids[0], "no reuse happened: {ids:?}");
    assert_ne!(ids[1], ids[0]);
}

#[test]
fn reuse_never_steals_a_live_buffer() {
    // In the two-input fixture every tile is live into its consumer, so
    // all three allocations must stay distinct.
    let program = basic_memory_reuse()
        .run(&init_mem_ref().run(&lowered_fixture()).unwrap())
        .unwrap();
    let f = program.get("f").unwrap();
    let ids: std::collections::HashSet<usize> =
        tile_assign_vars(f).iter().map(|t| t.mem.as_ref().unwrap().id).collect();
    assert_eq!(ids.len(), 3);
}

#[test]
fn insert_sync_pairs_cross_pipe_edges() {
    let program = insert_sync()
        .run(&init_mem_ref().run(&lowered_fixture()).unwrap())
        .unwrap();
    let text = program.get("f").unwrap().to_string();

    // Loads (MTE) feed the add (V), and the add feeds the store (MTE).
    assert!(text.contains("block.sync_src"), "dump:\n{text}");
    assert!(text.contains("block.sync_dst"), "dump:\n{text}");
    assert_eq!(
        text.matches("block.sync_src").count(),
        text.matches("block.sync_dst").count(),
        "unbalanced sync pair:\n{text}"
    );
    // Sync lands before the first consumer.
    let src_pos = text.find("block.sync_src").unwrap();
    let add_pos = text.find("block.add").unwrap();
    assert!(src_pos < add_pos, "sync after consumer:\n{text}");
}

#[test]
fn add_alloc_prepends_one_alloc_per_memref() {
    let with_memrefs = init_mem_ref().run(&lowered_fixture()).unwrap();
    let program = add_alloc().run(&with_memrefs).unwrap();
    let f = program.get("f").unwrap();
    let stmts = Stmt::flatten(&f.body);

    // Three UB tiles -> three allocs, before everything else. DDR params
    // get no alloc.
    let alloc_count = f.to_string().matches("block.alloc").count();
    assert_eq!(alloc_count, 3, "dump:\n{f}");
    for stmt in &stmts[..alloc_count] {
        assert!(stmt.to_string().contains("block.alloc"));
    }
}

#[test]
fn reuse_reduces_alloc_count() {
    let planned = basic_memory_reuse()
        .run(&init_mem_ref().run(&lowered_chain_fixture()).unwrap())
        .unwrap();
    let program = add_alloc().run(&planned).unwrap();
    let f = program.get("f").unwrap();
    assert_eq!(f.to_string().matches("block.alloc").count(), 2, "dump:\n{f}");
}
