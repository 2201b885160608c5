use std::sync::Arc;

use indexmap::IndexMap;

use crate::function::FunctionRef;
use crate::span::Span;

pub type ProgramRef = Arc<Program>;

/// Ordered collection of functions keyed by global name.
///
/// Insertion order is significant: passes must return programs with the same
/// function ordering they received.
#[derive(Debug)]
pub struct Program {
    pub functions: IndexMap<String, FunctionRef>,
    pub name: String,
    pub span: Span,
}

impl Program {
    pub fn new(
        functions: impl IntoIterator<Item = FunctionRef>,
        name: impl Into<String>,
        span: Span,
    ) -> ProgramRef {
        let functions = functions.into_iter().map(|f| (f.name.clone(), f)).collect();
        Arc::new(Self { functions, name: name.into(), span })
    }

    pub fn get(&self, name: &str) -> Option<&FunctionRef> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionRef> {
        self.functions.values()
    }
}
