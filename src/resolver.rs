//! Fallback module resolver
//!
//! When the isolated context's loader cannot find a required module through
//! normal means, the resolver scans an ordered list of probe directories for
//! an artifact whose declared identity exactly matches the requested one.
//! First match wins; order among files within one directory is whatever the
//! filesystem yields.
//!
//! Resolution is best-effort by design: a missing directory, an unreadable
//! entry, or a non-inspectable candidate is logged at debug level and
//! skipped, never escalated. One bad directory entry must not compromise
//! resolution.

use std::fs;
use std::path::{Path, PathBuf};

use crate::module::{self, ModuleArtifact, ModuleIdentity};
use crate::settings::HostSettings;

/// Assemble the ordered probe-path list for a run.
///
/// The host's private search path is split on the platform path-list
/// separator, each entry resolved against the host base directory, and the
/// base directory itself appended as the final fallback entry. Order encodes
/// priority; duplicates are permitted.
pub fn assemble_probe_paths(settings: &HostSettings) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(raw) = &settings.private_search_path {
        for entry in std::env::split_paths(raw) {
            if entry.as_os_str().is_empty() {
                continue;
            }
            paths.push(resolve_entry(&settings.base_dir, &entry));
        }
    }

    paths.push(settings.base_dir.clone());
    paths
}

fn resolve_entry(base_dir: &Path, entry: &Path) -> PathBuf {
    if entry.is_absolute() {
        entry.to_path_buf()
    } else {
        base_dir.join(entry)
    }
}

/// A module located and loaded through the fallback scan.
#[derive(Debug)]
pub struct ResolvedModule {
    pub path: PathBuf,
    pub artifact: ModuleArtifact,
}

/// Scans probe directories for a module with a requested declared identity.
#[derive(Debug)]
pub struct FallbackResolver {
    probe_paths: Vec<PathBuf>,
}

impl FallbackResolver {
    pub fn new(probe_paths: Vec<PathBuf>) -> Self {
        Self { probe_paths }
    }

    pub fn probe_paths(&self) -> &[PathBuf] {
        &self.probe_paths
    }

    /// Resolve `requested` against the probe paths, in priority order.
    ///
    /// Returns the first candidate whose declared identity is structurally
    /// equal to `requested`, fully loaded. `None` means unresolved; the
    /// caller's own loader reports its failure from there.
    pub fn resolve(&self, requested: &ModuleIdentity) -> Option<ResolvedModule> {
        for dir in &self.probe_paths {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable probe directory");
                    continue;
                }
            };

            for entry in entries {
                let path = match entry {
                    Ok(entry) => entry.path(),
                    Err(e) => {
                        tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                        continue;
                    }
                };
                if path.extension().and_then(|ext| ext.to_str()) != Some(module::module_extension())
                {
                    continue;
                }

                match module::read_identity(&path) {
                    Ok(identity) if identity == *requested => {
                        match module::load(&path) {
                            Ok(artifact) => {
                                tracing::debug!(
                                    module = %requested,
                                    path = %path.display(),
                                    "resolved module via probe path"
                                );
                                return Some(ResolvedModule { path, artifact });
                            }
                            Err(e) => {
                                tracing::debug!(path = %path.display(), error = %e, "matched candidate failed to load");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "skipping non-inspectable candidate");
                    }
                }
            }
        }

        None
    }
}
