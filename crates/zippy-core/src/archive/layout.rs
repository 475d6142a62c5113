//! Payload layout convention.
//!
//! Application sources sit at the archive root, installed dependencies under
//! `deps/`, and the manifest under a fixed marker name. The marker's presence
//! is what distinguishes a zippy payload from an arbitrary zip file.

use crate::config::{AppConfig, LayoutConfig};
use crate::error::{Result, ZippyError};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// How the archive's program is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryPoint {
    /// A script or executable, run as a supervised child process.
    Script {
        /// Archive-relative path, slash separated.
        path: String,
        /// Program that runs the script; the script itself is executed when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interpreter: Option<String>,
    },
    /// A native module, imported and run inside the launcher process.
    Module {
        /// Dotted module name.
        name: String,
    },
}

impl EntryPoint {
    pub fn script(path: impl Into<String>) -> Self {
        EntryPoint::Script {
            path: path.into(),
            interpreter: None,
        }
    }

    pub fn module(name: impl Into<String>) -> Self {
        EntryPoint::Module { name: name.into() }
    }

    /// Human-readable reference used in logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            EntryPoint::Script {
                path,
                interpreter: Some(interp),
            } => format!("{} (via {})", path, interp),
            EntryPoint::Script { path, .. } => path.clone(),
            EntryPoint::Module { name } => format!("module {}", name),
        }
    }
}

/// Contents of the marker entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub entry: EntryPoint,
    /// Native modules imported before the entry point runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preload: Vec<String>,
    #[serde(default)]
    pub created_by: String,
}

impl Manifest {
    pub fn new(entry: EntryPoint) -> Self {
        Self {
            format_version: LayoutConfig::FORMAT_VERSION,
            entry,
            preload: Vec::new(),
            created_by: format!("{} {}", AppConfig::APP_NAME, AppConfig::VERSION),
        }
    }

    pub fn with_preload(mut self, modules: Vec<String>) -> Self {
        self.preload = modules;
        self
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse and validate a manifest read from an archive.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes).map_err(|e| {
            ZippyError::integrity(format!("Unreadable manifest: {}", e), None)
        })?;

        if manifest.format_version == 0 || manifest.format_version > LayoutConfig::FORMAT_VERSION
        {
            return Err(ZippyError::integrity(
                format!(
                    "Unsupported archive format version {} (supported: {})",
                    manifest.format_version,
                    LayoutConfig::FORMAT_VERSION
                ),
                None,
            ));
        }

        if let EntryPoint::Script { path, .. } = &manifest.entry {
            if !is_safe_entry_name(path) {
                return Err(ZippyError::integrity(
                    format!("Entry point escapes the archive root: {}", path),
                    None,
                ));
            }
        }

        Ok(manifest)
    }
}

/// Archive name of a file under the dependency subtree.
pub fn deps_entry_name(relative: &str) -> String {
    format!("{}/{}", LayoutConfig::DEPS_DIR, relative)
}

/// Convert a relative filesystem path to a slash-separated archive name.
///
/// Returns `None` for paths that are absolute, empty, or contain `..`.
pub fn archive_name(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// True when an archive name stays inside the extraction root.
pub fn is_safe_entry_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('/') || name.contains('\\') || name.contains('\0') {
        return false;
    }
    // Windows drive prefixes such as `C:`
    if name.len() >= 2 && name.as_bytes()[1] == b':' {
        return false;
    }
    name.split('/').all(|part| part != "..")
}
