//! Error types for kernel building.

use std::path::PathBuf;

use snafu::Snafu;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while turning generated source into a launchable
/// kernel.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The device compiler rejected the generated source. Fatal to the
    /// requesting kernel build; carries the full diagnostic log and the
    /// offending source for postmortem.
    #[snafu(display("device compilation failed:\n{log}"))]
    CompileFailed { log: String, source_text: String },

    /// The context rejected an otherwise-valid binary at link time. Distinct
    /// from a compile failure: this implicates the context, not the source.
    #[snafu(display("module link failed: {source}"))]
    Link { source: iskra_device::Error },

    /// Persistent store fault. Loses caching benefit only, never
    /// correctness.
    #[snafu(display("persistent kernel store error: {reason}"))]
    Store { reason: String },

    /// IO failure underneath the persistent store.
    #[snafu(display("io error at {}: {source}", path.display()))]
    Io { path: PathBuf, source: std::io::Error },
}
