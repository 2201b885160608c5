use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Programmer error inside the IR core; callers cannot recover.
    #[snafu(display("internal invariant violated: {message}"))]
    Internal { message: String },

    /// Lookup of an unregistered operator name.
    #[snafu(display("op not found in registry: {name}"))]
    OpNotFound { name: String },

    /// Arguments that do not fit the operator signature.
    #[snafu(display("invalid arguments for op {op}: {message}"))]
    InvalidOpArgs { op: String, message: String },

    /// `assert_structural_equal` divergence (the `ValueError` of this core).
    #[snafu(display("structural mismatch at {path}:\n  left:  {lhs}\n  right: {rhs}"))]
    StructuralMismatch { path: String, lhs: String, rhs: String },

    #[snafu(display("serialization failed: {message}"))]
    Serialize { message: String },

    #[snafu(display("deserialization failed: {message}"))]
    Deserialize { message: String },

    /// A node tag the decoder does not know.
    #[snafu(display("unknown node tag {tag:#04x} in stream"))]
    UnknownTag { tag: u8 },

    /// A back-reference to an id the decoder has not seen.
    #[snafu(display("back-reference to undefined node id {id}"))]
    BadBackRef { id: u32 },
}
