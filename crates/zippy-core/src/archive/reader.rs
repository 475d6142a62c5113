//! Reading an archive, including one embedded behind an executable prefix.
//!
//! The zip end-of-central-directory record is located by scanning back from
//! the end of the file, so a shebang line or a whole runtime executable in
//! front of the archive does not affect opening it.

use super::layout::{is_safe_entry_name, Manifest};
use crate::config::LayoutConfig;
use crate::error::{Result, ZippyError};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// An opened archive file.
pub struct Archive {
    path: PathBuf,
    zip: ZipArchive<File>,
    names: HashSet<String>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("entries", &self.names.len())
            .finish()
    }
}

impl Archive {
    /// Open an archive by trailer scan.
    ///
    /// Any failure to locate or parse the central directory is an
    /// [`ZippyError::ArchiveIntegrity`] error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| ZippyError::io_with_path(e, &path))?;

        let zip = ZipArchive::new(file).map_err(|e| {
            ZippyError::integrity(format!("Not a readable archive: {}", e), Some(path.clone()))
        })?;
        let names = zip.file_names().map(str::to_string).collect();

        debug!("Opened archive {} ({} entries)", path.display(), zip.len());

        Ok(Self { path, zip, names })
    }

    /// Check whether a file carries a zippy payload (an archive with a manifest).
    pub fn has_payload(path: impl AsRef<Path>) -> bool {
        match Archive::open(path) {
            Ok(archive) => archive.contains(LayoutConfig::MANIFEST_ENTRY),
            Err(_) => false,
        }
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    /// Whether an entry with this exact (case-sensitive) name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Entry names in central directory order.
    pub fn entry_names(&self) -> Vec<String> {
        self.zip.file_names().map(str::to_string).collect()
    }

    /// Read an entry's bytes fully into memory.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.zip.by_name(name).map_err(|e| {
            ZippyError::integrity(
                format!("Cannot read entry {}: {}", name, e),
                Some(self.path.clone()),
            )
        })?;

        let mut buf = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut buf).map_err(|e| {
            ZippyError::integrity(
                format!("Corrupt entry {}: {}", name, e),
                Some(self.path.clone()),
            )
        })?;
        Ok(buf)
    }

    /// Read and validate the manifest.
    pub fn manifest(&mut self) -> Result<Manifest> {
        if !self.contains(LayoutConfig::MANIFEST_ENTRY) {
            return Err(ZippyError::integrity(
                format!("Missing marker entry {}", LayoutConfig::MANIFEST_ENTRY),
                Some(self.path.clone()),
            ));
        }
        let bytes = self.read_entry(LayoutConfig::MANIFEST_ENTRY)?;
        Manifest::from_json_bytes(&bytes)
    }

    /// Extract every entry below `dest`.
    ///
    /// All names are validated before anything is written, so an archive with a
    /// traversal entry leaves no files behind.
    pub fn extract_to(&mut self, dest: &Path) -> Result<usize> {
        for i in 0..self.zip.len() {
            let file = self.zip.by_index_raw(i).map_err(|e| {
                ZippyError::integrity(
                    format!("Failed to read zip entry {}: {}", i, e),
                    Some(self.path.clone()),
                )
            })?;
            if !is_safe_entry_name(file.name()) || file.enclosed_name().is_none() {
                return Err(ZippyError::integrity(
                    format!("Entry path escapes the extraction root: {}", file.name()),
                    Some(PathBuf::from(file.name())),
                ));
            }
        }

        info!("Extracting {} to {}", self.path.display(), dest.display());
        std::fs::create_dir_all(dest).map_err(|e| ZippyError::io_with_path(e, dest))?;

        let mut written = 0;
        for i in 0..self.zip.len() {
            let mut file = self.zip.by_index(i).map_err(|e| {
                ZippyError::integrity(
                    format!("Failed to read zip entry {}: {}", i, e),
                    Some(self.path.clone()),
                )
            })?;

            let Some(relative) = file.enclosed_name() else {
                return Err(ZippyError::integrity(
                    format!("Entry path escapes the extraction root: {}", file.name()),
                    None,
                ));
            };
            let outpath = dest.join(relative);

            if file.is_dir() {
                std::fs::create_dir_all(&outpath)
                    .map_err(|e| ZippyError::io_with_path(e, &outpath))?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ZippyError::io_with_path(e, parent))?;
            }

            let mut outfile =
                File::create(&outpath).map_err(|e| ZippyError::io_with_path(e, &outpath))?;
            std::io::copy(&mut file, &mut outfile).map_err(|e| {
                ZippyError::integrity(
                    format!("Failed to extract {}: {}", file.name(), e),
                    Some(outpath.clone()),
                )
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = file.unix_mode() {
                    let perms = std::fs::Permissions::from_mode(mode & 0o7777);
                    if let Err(e) = std::fs::set_permissions(&outpath, perms) {
                        tracing::warn!("Failed to restore mode of {}: {}", outpath.display(), e);
                    }
                }
            }

            written += 1;
        }

        debug!("Extracted {} files", written);
        Ok(written)
    }
}
