//! Link- and load-level error types.

use snafu::Snafu;

use crate::context::ContextId;

/// Result type for device operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while linking binaries into execution contexts.
///
/// These implicate the context or the driver rather than the generated
/// source, and are surfaced separately from compile failures.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The context rejected an otherwise-valid binary image.
    #[snafu(display("module load failed in context {context}: {reason}"))]
    Link { context: ContextId, reason: String },

    /// Entry symbol absent from a linked module.
    #[snafu(display("function '{name}' not found in module"))]
    FunctionNotFound { name: String },

    #[cfg(feature = "cuda")]
    /// CUDA driver error.
    #[snafu(display("CUDA driver error: {source}"))]
    Driver { source: cudarc::driver::DriverError },
}
