//! Host-side configuration feeding probe-path assembly
//!
//! The host carries exactly two knobs: its own base directory (the last
//! probe entry, and the anchor relative search-path entries resolve
//! against) and an optional private search path. The default construction
//! reads the search path from the `ISOTEST_PATH` environment variable;
//! embedders and tests construct settings explicitly.

use std::path::PathBuf;

use crate::error::{IsolationError, Result};

/// Environment variable holding the host's private module search path,
/// entries separated by the platform path-list separator.
pub const SEARCH_PATH_ENV: &str = "ISOTEST_PATH";

/// Host configuration consulted when assembling probe paths.
#[derive(Debug, Clone)]
pub struct HostSettings {
    /// The host's own base directory; appended as the final probe entry.
    pub base_dir: PathBuf,
    /// Configured private search path, if any. Split on the platform
    /// path-list separator; relative entries resolve against `base_dir`.
    pub private_search_path: Option<String>,
}

impl HostSettings {
    pub fn new(base_dir: impl Into<PathBuf>, private_search_path: Option<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            private_search_path,
        }
    }

    /// Settings for the current process: base dir is the executable's
    /// directory, search path comes from [`SEARCH_PATH_ENV`].
    pub fn from_environment() -> Result<Self> {
        let exe = std::env::current_exe()?;
        let base_dir = exe
            .parent()
            .ok_or_else(|| {
                IsolationError::Context("host executable has no containing directory".to_string())
            })?
            .to_path_buf();
        let private_search_path = std::env::var(SEARCH_PATH_ENV)
            .ok()
            .filter(|raw| !raw.is_empty());
        Ok(Self {
            base_dir,
            private_search_path,
        })
    }
}
