//! IR verification: diagnostics, the verifier trait, and the aggregate
//! `IRVerifier`.
//!
//! Verifiers never panic and never return errors; every finding flows
//! through the diagnostics vector. Only [`IRVerifier::verify_or_throw`]
//! elevates error-severity findings into a failure.

mod rules;

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use tessera_ir::{Program, Span};

use crate::error::{Error, Result};

pub use rules::{
    FlattenedSingleStmtVerifier, HasMemRefsVerifier, NoNestedCallsVerifier,
    NormalizedStmtStructureVerifier, SSAFormVerifier, SplitIncoreOrchVerifier,
    TypeCheckedVerifier,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[derive(strum::Display, strum::AsRefStr)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single verifier finding. Collected, never thrown.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Name of the verifier (or subsystem) that produced the finding.
    pub source: String,
    pub code: u32,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        source: impl Into<String>,
        code: u32,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self { severity, source: source.into(), code, message: message.into(), span }
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>, span: Option<Span>) -> Self {
        Self::new(Severity::Error, source, 0, message, span)
    }

    pub fn warning(
        source: impl Into<String>,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self::new(Severity::Warning, source, 0, message, span)
    }
}

/// A stateless program analyzer checking one property.
pub trait PropertyVerifier: Send + Sync {
    /// Unique name; equals the property name it checks.
    fn name(&self) -> &'static str;

    /// Examine the program, appending findings. Must not panic or throw.
    fn verify(&self, program: &Program, diagnostics: &mut Vec<Diagnostic>);
}

/// Ordered collection of verifiers with per-rule enable/disable.
pub struct IRVerifier {
    rules: Vec<Arc<dyn PropertyVerifier>>,
    disabled: HashSet<String>,
}

impl Default for IRVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IRVerifier {
    pub fn new() -> Self {
        Self { rules: Vec::new(), disabled: HashSet::new() }
    }

    /// All built-in verifiers, in lattice order.
    pub fn create_default() -> Self {
        let mut verifier = Self::new();
        verifier.add_rule(Arc::new(TypeCheckedVerifier));
        verifier.add_rule(Arc::new(SSAFormVerifier));
        verifier.add_rule(Arc::new(NoNestedCallsVerifier));
        verifier.add_rule(Arc::new(NormalizedStmtStructureVerifier));
        verifier.add_rule(Arc::new(FlattenedSingleStmtVerifier));
        verifier.add_rule(Arc::new(SplitIncoreOrchVerifier));
        verifier.add_rule(Arc::new(HasMemRefsVerifier));
        verifier.add_rule(Arc::new(
            crate::passes::convert_tensor_to_block_ops::IncoreBlockOpsVerifier,
        ));
        verifier
    }

    /// Add a rule; a rule with an already-present name is ignored.
    pub fn add_rule(&mut self, rule: Arc<dyn PropertyVerifier>) {
        if self.rules.iter().any(|existing| existing.name() == rule.name()) {
            return;
        }
        self.rules.push(rule);
    }

    pub fn enable_rule(&mut self, name: &str) {
        self.disabled.remove(name);
    }

    pub fn disable_rule(&mut self, name: &str) {
        self.disabled.insert(name.to_string());
    }

    pub fn is_rule_enabled(&self, name: &str) -> bool {
        !self.disabled.contains(name)
    }

    /// Run every enabled rule; never fails.
    pub fn verify(&self, program: &Program) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for rule in &self.rules {
            if self.is_rule_enabled(rule.name()) {
                rule.verify(program, &mut diagnostics);
            }
        }
        diagnostics
    }

    /// Run one rule by name (skipping it when disabled or unknown).
    /// Returns whether a rule with that name exists.
    pub fn run_rule(&self, name: &str, program: &Program, diagnostics: &mut Vec<Diagnostic>) -> bool {
        let Some(rule) = self.rules.iter().find(|rule| rule.name() == name) else {
            return false;
        };
        if self.is_rule_enabled(name) {
            rule.verify(program, diagnostics);
        }
        true
    }

    /// Aggregate findings and fail on any error-severity diagnostic.
    pub fn verify_or_throw(&self, program: &Program) -> Result<()> {
        let diagnostics = self.verify(program);
        if diagnostics.iter().any(|d| d.severity == Severity::Error) {
            return Err(Error::VerificationFailed { report: Self::generate_report(&diagnostics) });
        }
        Ok(())
    }

    pub fn generate_report(diagnostics: &[Diagnostic]) -> String {
        let mut report = String::new();
        for diagnostic in diagnostics {
            let _ = write!(
                &mut report,
                "[{}] {} ({}): {}",
                diagnostic.severity, diagnostic.source, diagnostic.code, diagnostic.message
            );
            if let Some(span) = &diagnostic.span {
                let _ = write!(&mut report, " at {span}");
            }
            report.push('\n');
        }
        report
    }
}
