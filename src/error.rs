//! Error taxonomy for the isolation core
//!
//! Every failure surfaced by this crate falls into one of the buckets below.
//! A test case failing its own assertions is *not* an error here: it is
//! encoded in the returned [`TestRunResult`](crate::suite::TestRunResult) and
//! belongs to the reporting collaborator. Only infrastructural failures
//! (missing module, broken control channel, crashed child) use this type.
//!
//! Resolver-internal per-candidate faults never reach this type at all; they
//! are logged at debug level and skipped by design.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that occur while standing up, driving, or tearing down an
/// isolated test run.
#[derive(Debug, Error)]
pub enum IsolationError {
    /// Precondition failure: the test module does not exist or is not a file.
    /// Raised before any side effect, so there is nothing to undo.
    #[error("test module not found: {}", .path.display())]
    ModuleNotFound { path: PathBuf },

    /// Isolation facility failure: spawning the runner process, wiring its
    /// pipes, or tearing the context down.
    #[error("isolated context failure: {0}")]
    Context(String),

    /// Malformed or unexpected traffic on the control channel.
    #[error("control protocol error: {0}")]
    Protocol(String),

    /// The test module could not be loaded or assembled into a runnable
    /// suite inside the isolated context. Carried across the channel
    /// verbatim, never wrapped further.
    #[error("suite build failed: {0}")]
    SuiteBuild(String),

    /// Infrastructural failure while executing the suite inside the
    /// isolated context.
    #[error("test run failed: {0}")]
    Run(String),

    /// A module artifact exists but does not conform to the artifact format.
    #[error("malformed module artifact {}: {reason}", .path.display())]
    BadArtifact { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type for isolation-core operations.
pub type Result<T> = std::result::Result<T, IsolationError>;
