//! Pipeline property bookkeeping and verification wiring.

use enumset::enum_set;

use crate::pass::{PassPipeline, VerificationMode};
use crate::passes::{convert_tensor_to_block_ops, convert_to_ssa, identity, run_verifier};
use crate::property::IRProperty;
use crate::test::incore_add_program;

/// The scenario pipeline: SSA → lowering → verifier, fully verified, on a
/// valid input. The final sweep disables the memref rule (the memory passes
/// have not run) and the SSA rule (output threading re-binds the `out_N`
/// name by design).
#[test]
fn verified_pipeline_on_valid_input() {
    let mut pipeline = PassPipeline::new();
    pipeline
        .add_pass(convert_to_ssa())
        .add_pass(convert_tensor_to_block_ops())
        .add_pass(run_verifier(&["HasMemRefs", "SSAForm"]))
        .set_verification_mode(VerificationMode::BeforeAndAfter)
        .set_initial_properties(enum_set!(
            IRProperty::TypeChecked | IRProperty::SplitIncoreOrch
        ));

    let result = pipeline.run(&incore_add_program()).unwrap();
    assert!(result.get("f").unwrap().is_incore());
    assert_eq!(result.get("f").unwrap().params.len(), 3);
}

#[test]
fn pass_names_in_order() {
    let mut pipeline = PassPipeline::new();
    pipeline.add_pass(convert_to_ssa()).add_pass(convert_tensor_to_block_ops());
    assert_eq!(pipeline.pass_names(), ["ConvertToSSA", "ConvertTensorToBlockOps"]);
}

/// A required property missing from the tracked set aborts the run when
/// Before-verification is on.
#[test]
fn missing_required_property_fails() {
    let mut pipeline = PassPipeline::new();
    pipeline
        .add_pass(convert_tensor_to_block_ops())
        .set_verification_mode(VerificationMode::Before);
    // No initial properties: SplitIncoreOrch is not in the set.
    let err = pipeline.run(&incore_add_program()).unwrap_err();
    assert!(err.to_string().contains("SplitIncoreOrch"), "unexpected error: {err}");
}

/// Without verification the same pipeline runs: properties are tags for
/// verifiers, not execution prerequisites.
#[test]
fn properties_are_not_execution_prerequisites() {
    let mut pipeline = PassPipeline::new();
    pipeline.add_pass(convert_tensor_to_block_ops());
    pipeline.run(&incore_add_program()).unwrap();
}

/// Universal invariant: the identity pass renames and otherwise leaves the
/// program alone.
#[test]
fn identity_renames_functions() {
    let program = incore_add_program();
    let result = identity().run(&program).unwrap();

    assert!(result.get("f_identity").is_some());
    assert!(result.get("main_identity").is_some());
    let before = program.get("f").unwrap();
    let after = result.get("f_identity").unwrap();
    assert!(std::sync::Arc::ptr_eq(&before.body, &after.body));
    assert_eq!(before.kind, after.kind);
}

/// Passes are value-like and shareable across pipelines.
#[test]
fn passes_are_cheaply_cloneable() {
    let pass = identity();
    let clone = pass.clone();
    let mut a = PassPipeline::new();
    let mut b = PassPipeline::new();
    a.add_pass(pass);
    b.add_pass(clone);
    a.run(&incore_add_program()).unwrap();
    b.run(&incore_add_program()).unwrap();
}
