//! Host side of the isolation boundary
//!
//! ## Modules
//!
//! - `context` - isolated context lifecycle (child process, control pipes)
//! - `proxy` - cross-boundary handle driving the remote runner
//! - `coordinator` - the public run contract with its cleanup guarantees
//!
//! ## Design
//!
//! The isolated execution context is a child OS process: a crash in test
//! code kills the child, never the host. The control channel is the child's
//! stdin/stdout carrying the line-delimited JSON protocol from
//! [`crate::protocol`]. Probe paths for fallback module resolution are
//! passed to the child at startup, so the resolver exists inside the
//! context before any module load can need it.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod context;
pub mod coordinator;
pub mod proxy;

pub use context::{ContextOptions, IsolatedContext};
pub use coordinator::{IsolationCoordinator, TestRunRequest};
pub use proxy::RunnerProxy;
