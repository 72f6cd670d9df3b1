#![forbid(unsafe_code)]
//! Isolated test-run core
//!
//! Runs a test suite in an execution universe separate from the caller's,
//! so test code that crashes, leaks state, or changes the working directory
//! cannot corrupt (or be corrupted by) the host process. The isolated
//! context is a child OS process driven over a small JSON control channel;
//! host state touched by a run - the process working directory and the
//! context itself - is restored and torn down on every exit path.
//!
//! Surrounding concerns (test discovery, report formatting, CLI) belong to
//! collaborators; this crate's boundary is
//! [`IsolationCoordinator::run_test`] plus the fallback module resolver
//! that backs the isolated context's loader.
//!
//! ## Panic Policy
//!
//! Production code uses `Result` with `?`; the `isolation` and `runner`
//! modules enforce `#![deny(clippy::unwrap_used)]`. `.unwrap()` is
//! acceptable in test code only.

pub mod error;
pub mod events;
pub mod isolation;
pub mod module;
pub mod protocol;
pub mod resolver;
pub mod runner;
pub mod settings;
pub mod suite;

pub use error::{IsolationError, Result};
pub use events::{NullListener, TestEventListener};
pub use isolation::{IsolationCoordinator, TestRunRequest};
pub use module::ModuleIdentity;
pub use resolver::{assemble_probe_paths, FallbackResolver};
pub use settings::HostSettings;
pub use suite::{SuiteManifest, TestOutcome, TestRunResult, TestStatus};
