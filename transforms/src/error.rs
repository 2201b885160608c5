use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Error-severity diagnostics stopped a pipeline or verifier pass.
    #[snafu(display("verification failed:\n{report}"))]
    VerificationFailed { report: String },

    /// Error bubbling up from the IR layer (op lookup, internal invariants,
    /// structural assertions).
    #[snafu(context(false), display("{source}"))]
    Ir { source: tessera_ir::Error },
}

impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Ir { source: tessera_ir::Error::Internal { message: message.into() } }
    }
}
