use crate::error::Error;
use crate::pass::{Pass, program_pass};
use crate::property::props;
use crate::verifier::{IRVerifier, Severity};

/// A pass that runs the default verifier set (minus `disabled_rules`) and
/// fails on any error-severity finding. Warnings are logged and kept
/// non-fatal.
pub fn run_verifier(disabled_rules: &[&str]) -> Pass {
    let disabled: Vec<String> = disabled_rules.iter().map(|rule| rule.to_string()).collect();
    program_pass(
        move |program| {
            let mut verifier = IRVerifier::create_default();
            for rule in &disabled {
                verifier.disable_rule(rule);
            }
            let diagnostics = verifier.verify(program);
            if diagnostics.iter().any(|d| d.severity == Severity::Error) {
                return Err(Error::VerificationFailed {
                    report: IRVerifier::generate_report(&diagnostics),
                });
            }
            if !diagnostics.is_empty() {
                tracing::warn!(
                    "verifier warnings\n{}",
                    IRVerifier::generate_report(&diagnostics)
                );
            }
            Ok(program.clone())
        },
        "RunVerifier",
        props::RUN_VERIFIER,
    )
}
