//! Child side of the isolation boundary
//!
//! This is what executes inside an isolated context: a protocol server loop
//! over stdin/stdout, a module loader with fallback probe-path resolution,
//! and a context-local configuration file. The host never calls into this
//! module directly; it reaches it through the `isotest-runner` binary.
//!
//! ## Modules
//!
//! - `config` - context-local runner configuration
//! - `loader` - module loading with fallback resolution
//! - `service` - the configure/build/run/shutdown protocol loop

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod loader;
pub mod service;

pub use config::RunnerConfig;
pub use loader::ModuleLoader;
pub use service::{serve, RunnerOptions};
