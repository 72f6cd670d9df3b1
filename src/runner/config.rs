//! Context-local runner configuration
//!
//! An optional JSON file supplied per run; the host passes its path to the
//! child at startup. An absent file means defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Runtime knobs for the runner inside an isolated context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Stop executing after the first failing test; remaining tests are
    /// reported as skipped.
    pub fail_fast: bool,
    /// Stream the suite's stdout/stderr text back to the host sinks.
    pub capture_output: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            capture_output: true,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load configuration if a path was supplied, defaults otherwise.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert!(!config.fail_fast);
        assert!(config.capture_output);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("isotest_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"fail_fast": true}"#).unwrap();

        let config = RunnerConfig::load(&path).unwrap();
        assert!(config.fail_fast);
        assert!(config.capture_output);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = std::env::temp_dir().join("isotest_config_missing.json");
        assert!(RunnerConfig::load(&missing).is_err());
        assert!(RunnerConfig::load_optional(None).is_ok());
    }
}
