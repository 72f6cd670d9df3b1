//! Module artifacts and declared identity
//!
//! A test module is a single file carrying a self-describing header so that
//! its declared identity can be read *without* loading the whole artifact:
//!
//! ```text
//! +----------------+------------------+---------------------+-----------+
//! | magic (8 bytes)| header len (u32) | identity header JSON| payload   |
//! +----------------+------------------+---------------------+-----------+
//! ```
//!
//! Artifact files use the platform's loadable-module extension
//! (`std::env::consts::DLL_EXTENSION`), which is what the fallback resolver
//! enumerates when probing directories.
//!
//! Identity comparison is exact structural equality on the full
//! name/version tuple. It is never weakened to a filename match: two
//! differently-versioned modules with the same file name must not be
//! conflated.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IsolationError, Result};

/// Leading magic bytes of a module artifact (includes a format version).
pub const ARTIFACT_MAGIC: &[u8; 8] = b"ISOMOD\x00\x01";

/// Upper bound on the identity header, to reject garbage length prefixes
/// before allocating.
const MAX_HEADER_LEN: usize = 64 * 1024;

/// The structured identity a module declares about itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub name: String,
    pub version: String,
}

impl ModuleIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// The platform extension module artifacts carry (`so`, `dylib`, `dll`).
pub fn module_extension() -> &'static str {
    std::env::consts::DLL_EXTENSION
}

/// A fully loaded module artifact: declared identity plus opaque payload.
#[derive(Debug, Clone)]
pub struct ModuleArtifact {
    pub identity: ModuleIdentity,
    pub payload: Vec<u8>,
}

/// Read only the declared identity of the artifact at `path`.
///
/// Reads the magic, the length prefix, and the identity header; the payload
/// is not touched.
pub fn read_identity(path: &Path) -> Result<ModuleIdentity> {
    let mut file = fs::File::open(path)?;

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic != ARTIFACT_MAGIC {
        return Err(bad_artifact(path, "unrecognized magic bytes"));
    }

    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf)?;
    let header_len = u32::from_le_bytes(len_buf) as usize;
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return Err(bad_artifact(path, "identity header length out of range"));
    }

    let mut header = vec![0u8; header_len];
    file.read_exact(&mut header)?;
    serde_json::from_slice(&header)
        .map_err(|e| bad_artifact(path, &format!("unreadable identity header: {e}")))
}

/// Load the full artifact at `path`: identity header plus payload.
pub fn load(path: &Path) -> Result<ModuleArtifact> {
    let bytes = fs::read(path)?;
    if bytes.len() < ARTIFACT_MAGIC.len() + 4 || bytes[..ARTIFACT_MAGIC.len()] != ARTIFACT_MAGIC[..] {
        return Err(bad_artifact(path, "unrecognized magic bytes"));
    }

    let len_start = ARTIFACT_MAGIC.len();
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&bytes[len_start..len_start + 4]);
    let header_len = u32::from_le_bytes(len_buf) as usize;
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return Err(bad_artifact(path, "identity header length out of range"));
    }

    let header_start = len_start + 4;
    let payload_start = header_start + header_len;
    if bytes.len() < payload_start {
        return Err(bad_artifact(path, "truncated identity header"));
    }

    let identity: ModuleIdentity = serde_json::from_slice(&bytes[header_start..payload_start])
        .map_err(|e| bad_artifact(path, &format!("unreadable identity header: {e}")))?;

    Ok(ModuleArtifact {
        identity,
        payload: bytes[payload_start..].to_vec(),
    })
}

/// Write a module artifact to `path`.
///
/// Used by tooling that produces test modules, and by tests.
pub fn write(path: &Path, identity: &ModuleIdentity, payload: &[u8]) -> Result<()> {
    let header = serde_json::to_vec(identity)?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| bad_artifact(path, "identity header too large"))?;

    let mut bytes = Vec::with_capacity(ARTIFACT_MAGIC.len() + 4 + header.len() + payload.len());
    bytes.extend_from_slice(ARTIFACT_MAGIC);
    bytes.extend_from_slice(&header_len.to_le_bytes());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(payload);

    fs::write(path, bytes)?;
    Ok(())
}

fn bad_artifact(path: &Path, reason: &str) -> IsolationError {
    IsolationError::BadArtifact {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
