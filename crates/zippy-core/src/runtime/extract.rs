//! Extraction root lifecycle.

use crate::archive::{Archive, Manifest};
use crate::config::ExtractionConfig;
use crate::error::{Result, ZippyError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How the extraction directory came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootOrigin {
    /// Fresh uniquely named temporary directory.
    Temporary,
    /// Override path that did not exist and was created by the launcher.
    CreatedOverride,
    /// Override path that already existed; it belongs to the caller.
    ExistingOverride,
}

/// The directory an archive is extracted into.
///
/// Launcher-created roots are removed by [`ExtractionRoot::cleanup`] or, at the
/// latest, when the value is dropped. Removal is best-effort: failures are
/// logged and never escalated.
#[derive(Debug)]
pub struct ExtractionRoot {
    path: PathBuf,
    origin: RootOrigin,
    cleaned: bool,
}

impl ExtractionRoot {
    /// Resolve the destination: the override when given, else a new temp dir.
    pub fn prepare(override_dir: Option<&Path>) -> Result<Self> {
        match override_dir.filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => {
                let origin = if dir.exists() {
                    RootOrigin::ExistingOverride
                } else {
                    RootOrigin::CreatedOverride
                };
                std::fs::create_dir_all(dir).map_err(|e| ZippyError::io_with_path(e, dir))?;
                debug!("Using extraction override {} ({:?})", dir.display(), origin);
                Ok(Self {
                    path: dir.to_path_buf(),
                    origin,
                    cleaned: false,
                })
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(ExtractionConfig::TEMP_DIR_PREFIX)
                    .tempdir()?;
                Ok(Self {
                    path: dir.keep(),
                    origin: RootOrigin::Temporary,
                    cleaned: false,
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> RootOrigin {
        self.origin
    }

    /// Whether [`ExtractionRoot::cleanup`] will delete the directory.
    pub fn is_owned(&self) -> bool {
        self.origin != RootOrigin::ExistingOverride
    }

    /// Join an archive-relative, slash-separated path onto the root.
    pub fn join(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.path.clone(), |acc, part| acc.join(part))
    }

    /// Remove the directory if the launcher owns it. Never fails.
    pub fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        if !self.is_owned() {
            debug!(
                "Leaving caller-supplied extraction directory {} in place",
                self.path.display()
            );
            return;
        }

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed extraction root {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove extraction root {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for ExtractionRoot {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Extract `archive_path` into a prepared root and return its manifest.
///
/// The manifest is read and validated before anything is written.
pub fn extract(archive_path: &Path, root: &ExtractionRoot) -> Result<Manifest> {
    let mut archive = Archive::open(archive_path)?;
    let manifest = archive.manifest()?;
    let count = archive.extract_to(root.path())?;
    info!("Extracted {} files into {}", count, root.path().display());
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_temporary_root_is_removed() {
        let mut root = ExtractionRoot::prepare(None).unwrap();
        let path = root.path().to_path_buf();
        assert!(path.is_dir());
        assert_eq!(root.origin(), RootOrigin::Temporary);
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(ExtractionConfig::TEMP_DIR_PREFIX));

        root.cleanup();
        assert!(!path.exists());
    }

    #[test]
    fn test_created_override_is_removed_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let override_dir = temp_dir.path().join("run1");

        {
            let root = ExtractionRoot::prepare(Some(&override_dir)).unwrap();
            assert_eq!(root.origin(), RootOrigin::CreatedOverride);
            assert!(override_dir.is_dir());
        }

        assert!(!override_dir.exists());
    }

    #[test]
    fn test_existing_override_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("keep.txt"), "mine").unwrap();

        let mut root = ExtractionRoot::prepare(Some(temp_dir.path())).unwrap();
        assert_eq!(root.origin(), RootOrigin::ExistingOverride);
        root.cleanup();

        assert!(temp_dir.path().join("keep.txt").exists());
    }

    #[test]
    fn test_empty_override_means_temporary() {
        let root = ExtractionRoot::prepare(Some(Path::new(""))).unwrap();
        assert_eq!(root.origin(), RootOrigin::Temporary);
    }

    #[test]
    fn test_join_archive_path() {
        let root = ExtractionRoot::prepare(None).unwrap();
        assert_eq!(
            root.join("app/main.sh"),
            root.path().join("app").join("main.sh")
        );
    }

    #[test]
    fn test_cleanup_twice_is_harmless() {
        let mut root = ExtractionRoot::prepare(None).unwrap();
        root.cleanup();
        root.cleanup();
    }
}
