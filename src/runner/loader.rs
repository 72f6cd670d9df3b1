//! Module loading inside the isolated context
//!
//! Normal resolution looks for modules in the context's base directory (the
//! test module by its configured file name, required modules by their
//! conventional `<name>.<ext>` file name). When normal resolution cannot
//! produce a module with the requested declared identity, the loader falls
//! back to the probe-path scan.

use std::path::PathBuf;

use crate::error::{IsolationError, Result};
use crate::module::{self, module_extension, ModuleIdentity};
use crate::resolver::FallbackResolver;
use crate::suite::SuiteManifest;

/// Loads the test module and resolves its declared requirements.
pub struct ModuleLoader {
    base_dir: PathBuf,
    resolver: FallbackResolver,
}

impl ModuleLoader {
    pub fn new(base_dir: PathBuf, probe_paths: Vec<PathBuf>) -> Self {
        Self {
            base_dir,
            resolver: FallbackResolver::new(probe_paths),
        }
    }

    /// Load the test module named `file_name` (relative to the base
    /// directory), decode its suite manifest, and resolve every module the
    /// suite requires. Any failure here is a suite-build failure.
    pub fn load_suite(&self, file_name: &str) -> Result<SuiteManifest> {
        let path = self.base_dir.join(file_name);
        let artifact = module::load(&path).map_err(|e| {
            IsolationError::SuiteBuild(format!("cannot load test module `{file_name}`: {e}"))
        })?;
        let manifest = SuiteManifest::from_payload(&artifact.payload).map_err(|e| {
            IsolationError::SuiteBuild(format!(
                "test module `{file_name}` carries no readable suite: {e}"
            ))
        })?;

        for required in &manifest.requires {
            self.require(required)?;
        }

        Ok(manifest)
    }

    /// Resolve one required module: conventional file name first, fallback
    /// probe scan second.
    fn require(&self, identity: &ModuleIdentity) -> Result<()> {
        let conventional = self
            .base_dir
            .join(format!("{}.{}", identity.name, module_extension()));
        if let Ok(declared) = module::read_identity(&conventional) {
            if declared == *identity {
                return Ok(());
            }
        }

        tracing::debug!(module = %identity, "normal resolution failed, probing fallback paths");
        match self.resolver.resolve(identity) {
            Some(resolved) => {
                tracing::debug!(
                    module = %identity,
                    path = %resolved.path.display(),
                    "requirement satisfied via fallback resolver"
                );
                Ok(())
            }
            None => Err(IsolationError::SuiteBuild(format!(
                "unresolved module dependency: {identity}"
            ))),
        }
    }
}
