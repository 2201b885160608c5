use tessera_ir::Function;

use crate::pass::{Pass, function_pass};
use crate::property::props;

/// Renames every function to `name + "_identity"` and leaves bodies
/// untouched. Exists so tests can observe that a pipeline actually ran.
pub fn identity() -> Pass {
    function_pass(
        |function| {
            Ok(Function::new(
                format!("{}_identity", function.name),
                function.params.clone(),
                function.return_types.clone(),
                function.body.clone(),
                function.span.clone(),
                function.kind,
            ))
        },
        "Identity",
        props::IDENTITY,
    )
}
