//! Pass handles and the property-tracking pipeline.

use std::sync::Arc;

use tessera_ir::{FunctionRef, Program, ProgramRef};

use crate::error::{Error, Result};
use crate::property::{IRPropertySet, PassProperties};
use crate::verifier::{Diagnostic, IRVerifier, Severity};

type BoxedTransform = Box<dyn Fn(&ProgramRef) -> Result<ProgramRef> + Send + Sync>;

struct PassInner {
    name: String,
    properties: PassProperties,
    transform: BoxedTransform,
}

/// An opaque, cheap-to-clone handle around a program transform.
///
/// Passes are values: clone them freely, share them across pipelines.
#[derive(Clone)]
pub struct Pass {
    inner: Arc<PassInner>,
}

impl Pass {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn properties(&self) -> &PassProperties {
        &self.inner.properties
    }

    pub fn required(&self) -> IRPropertySet {
        self.inner.properties.required
    }

    pub fn produced(&self) -> IRPropertySet {
        self.inner.properties.produced
    }

    pub fn invalidated(&self) -> IRPropertySet {
        self.inner.properties.invalidated
    }

    /// Execute the pass. The input program is never mutated.
    pub fn run(&self, program: &ProgramRef) -> Result<ProgramRef> {
        (self.inner.transform)(program)
    }
}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass").field("name", &self.inner.name).finish()
    }
}

/// Build a pass from a per-function transform.
///
/// The transform is applied to every function independently; ordering and
/// program name are preserved.
pub fn function_pass<F>(transform: F, name: impl Into<String>, properties: PassProperties) -> Pass
where
    F: Fn(&FunctionRef) -> Result<FunctionRef> + Send + Sync + 'static,
{
    let name = name.into();
    program_pass(
        move |program: &ProgramRef| {
            let functions = program
                .functions
                .values()
                .map(|function| transform(function))
                .collect::<Result<Vec<_>>>()?;
            Ok(Program::new(functions, program.name.clone(), program.span.clone()))
        },
        name,
        properties,
    )
}

/// Build a pass from a whole-program transform. Use when cross-function
/// information (call sites, added parameters) is needed.
pub fn program_pass<F>(transform: F, name: impl Into<String>, properties: PassProperties) -> Pass
where
    F: Fn(&ProgramRef) -> Result<ProgramRef> + Send + Sync + 'static,
{
    Pass {
        inner: Arc::new(PassInner {
            name: name.into(),
            properties,
            transform: Box::new(transform),
        }),
    }
}

/// When the pipeline runs verifiers relative to each pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationMode {
    #[default]
    None,
    Before,
    After,
    BeforeAndAfter,
}

impl VerificationMode {
    fn includes_before(self) -> bool {
        matches!(self, Self::Before | Self::BeforeAndAfter)
    }

    fn includes_after(self) -> bool {
        matches!(self, Self::After | Self::BeforeAndAfter)
    }
}

/// Ordered pass sequence with property bookkeeping.
///
/// The pipeline threads the program through each pass, removing each pass's
/// `invalidated` tags and adding its `produced` tags. With verification
/// enabled it runs the verifiers whose names match the relevant tags and
/// fails fast on the first error-severity diagnostic.
#[derive(Default)]
pub struct PassPipeline {
    passes: Vec<Pass>,
    verification_mode: VerificationMode,
    initial_properties: IRPropertySet,
}

impl PassPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: Pass) -> &mut Self {
        self.passes.push(pass);
        self
    }

    pub fn set_verification_mode(&mut self, mode: VerificationMode) -> &mut Self {
        self.verification_mode = mode;
        self
    }

    /// Properties known to hold before the pipeline runs.
    pub fn set_initial_properties(&mut self, properties: IRPropertySet) -> &mut Self {
        self.initial_properties = properties;
        self
    }

    pub fn pass_names(&self) -> Vec<String> {
        self.passes.iter().map(|pass| pass.name().to_string()).collect()
    }

    pub fn run(&self, program: &ProgramRef) -> Result<ProgramRef> {
        let verifier = IRVerifier::create_default();
        let mut current = program.clone();
        let mut properties = self.initial_properties;

        for pass in &self.passes {
            tracing::debug!(pass = pass.name(), properties = ?properties, "running pass");

            if self.verification_mode.includes_before() {
                let mut diagnostics = Vec::new();
                for tag in pass.required() {
                    if !properties.contains(tag) {
                        diagnostics.push(Diagnostic::error(
                            "PassPipeline",
                            format!(
                                "pass {} requires property {} which is not in the tracked set",
                                pass.name(),
                                tag
                            ),
                            None,
                        ));
                    }
                    verifier.run_rule(tag.name(), &current, &mut diagnostics);
                }
                self.check(pass.name(), "before", diagnostics)?;
            }

            current = pass.run(&current)?;
            properties -= pass.invalidated();
            properties |= pass.produced();

            if self.verification_mode.includes_after() {
                let mut diagnostics = Vec::new();
                for tag in pass.produced() {
                    verifier.run_rule(tag.name(), &current, &mut diagnostics);
                }
                self.check(pass.name(), "after", diagnostics)?;
            }
        }

        Ok(current)
    }

    fn check(&self, pass: &str, stage: &str, diagnostics: Vec<Diagnostic>) -> Result<()> {
        if diagnostics.is_empty() {
            return Ok(());
        }
        let report = IRVerifier::generate_report(&diagnostics);
        if diagnostics.iter().any(|d| d.severity == Severity::Error) {
            tracing::error!(pass, stage, "verification failed\n{report}");
            return Err(Error::VerificationFailed { report });
        }
        tracing::warn!(pass, stage, "verifier warnings\n{report}");
        Ok(())
    }
}
