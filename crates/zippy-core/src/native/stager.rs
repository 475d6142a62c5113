//! Staging a module's bytes somewhere the dynamic loader can open by path.
//!
//! The preferred stager places the bytes in an anonymous memory-backed file
//! and hands the loader its `/proc/self/fd/N` alias, so the image never
//! touches the filesystem. The fallback stager writes the bytes into a fresh
//! temporary directory under the entry's own base filename.

use super::naming::base_filename;
use crate::config::LoaderConfig;
use crate::error::{Result, ZippyError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a loaded image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Anonymous memory-backed descriptor.
    Memory,
    /// Temporary file written by the disk fallback.
    TempFile,
    /// A file found on the module search path.
    SearchPath(PathBuf),
}

/// The resource behind a staged image's path.
#[derive(Debug)]
enum Backing {
    #[cfg(unix)]
    Descriptor(#[allow(dead_code)] std::os::fd::OwnedFd),
    Directory(#[allow(dead_code)] tempfile::TempDir),
}

/// Bytes staged at a path the dynamic loader accepts.
///
/// Dropping it closes the descriptor or removes the temporary directory.
/// After a successful load, [`StagedImage::retain`] keeps a memory-backed
/// descriptor open so its number, and the `/proc/self/fd/N` alias the loader
/// recorded for the image, cannot be reused by a later module.
#[derive(Debug)]
pub struct StagedImage {
    path: PathBuf,
    source: LoadSource,
    _backing: Backing,
}

impl StagedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &LoadSource {
        &self.source
    }

    /// Release the staging area, keeping whatever must outlive the load.
    ///
    /// Temporary directories are removed here; descriptors are handed back.
    pub(crate) fn retain(self) -> Option<RetainedImage> {
        match self._backing {
            #[cfg(unix)]
            Backing::Descriptor(fd) => Some(RetainedImage(fd)),
            Backing::Directory(_) => None,
        }
    }
}

/// Descriptor of a loaded memory-backed image, held by its module.
#[cfg(unix)]
#[derive(Debug)]
pub(crate) struct RetainedImage(#[allow(dead_code)] std::os::fd::OwnedFd);

#[cfg(not(unix))]
#[derive(Debug)]
#[allow(dead_code)]
pub(crate) struct RetainedImage;

/// A technique for exposing module bytes to the dynamic loader.
pub trait ImageStager: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Stage `bytes` for the module `module`, read from archive entry `entry`.
    fn stage(&self, module: &str, entry: &str, bytes: &[u8]) -> Result<StagedImage>;
}

/// Stages images in anonymous, close-on-exec memory files.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemfdStager;

impl ImageStager for MemfdStager {
    fn name(&self) -> &'static str {
        "memfd"
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    fn stage(&self, module: &str, _entry: &str, bytes: &[u8]) -> Result<StagedImage> {
        use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
        use std::ffi::CString;
        use std::io::{Seek, SeekFrom, Write};
        use std::os::fd::AsRawFd;

        let tag = CString::new(module.replace('\0', "_"))
            .map_err(|e| ZippyError::load(module, e.to_string()))?;
        let fd = memfd_create(tag.as_c_str(), MemFdCreateFlag::MFD_CLOEXEC)?;

        let mut file = std::fs::File::from(fd);
        file.write_all(bytes)?;
        file.seek(SeekFrom::Start(0))?;

        let path = PathBuf::from(format!("/proc/self/fd/{}", file.as_raw_fd()));
        // Without procfs the alias cannot be opened; treat that as the
        // technique being unavailable.
        if !path.exists() {
            return Err(ZippyError::load(
                module,
                format!("{} is not reachable (is /proc mounted?)", path.display()),
            ));
        }

        debug!("Staged {} ({} bytes) at {}", module, bytes.len(), path.display());
        Ok(StagedImage {
            path,
            source: LoadSource::Memory,
            _backing: Backing::Descriptor(file.into()),
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    fn stage(&self, module: &str, _entry: &str, _bytes: &[u8]) -> Result<StagedImage> {
        Err(ZippyError::load(
            module,
            "memory-backed descriptors are not available on this platform",
        ))
    }
}

/// Stages images as files in a fresh temporary directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct TempFileStager;

impl ImageStager for TempFileStager {
    fn name(&self) -> &'static str {
        "tempfile"
    }

    fn stage(&self, module: &str, entry: &str, bytes: &[u8]) -> Result<StagedImage> {
        let dir = tempfile::Builder::new()
            .prefix(LoaderConfig::FALLBACK_DIR_PREFIX)
            .tempdir()?;
        let path = dir.path().join(base_filename(entry));
        std::fs::write(&path, bytes).map_err(|e| ZippyError::io_with_path(e, &path))?;

        debug!("Staged {} ({} bytes) at {}", module, bytes.len(), path.display());
        Ok(StagedImage {
            path,
            source: LoadSource::TempFile,
            _backing: Backing::Directory(dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempfile_stager_keeps_base_filename() {
        let staged = TempFileStager
            .stage("pkg.fast", "deps/pkg/fast.so", b"bytes")
            .unwrap();

        assert_eq!(staged.source(), &LoadSource::TempFile);
        assert_eq!(staged.path().file_name().unwrap(), "fast.so");
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"bytes");
    }

    #[test]
    fn test_tempfile_stager_removes_file_on_drop() {
        let staged = TempFileStager.stage("m", "m.so", b"x").unwrap();
        let dir = staged.path().parent().unwrap().to_path_buf();
        drop(staged);
        assert!(!dir.exists());
    }

    #[test]
    fn test_tempfile_stager_names_are_unique() {
        let a = TempFileStager.stage("m", "m.so", b"a").unwrap();
        let b = TempFileStager.stage("m", "m.so", b"b").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_retain_removes_tempfile_directory() {
        let staged = TempFileStager.stage("m", "m.so", b"x").unwrap();
        let dir = staged.path().parent().unwrap().to_path_buf();
        assert!(staged.retain().is_none());
        assert!(!dir.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_retained_descriptor_keeps_alias_reserved() {
        let Ok(staged) = MemfdStager.stage("mod_a", "deps/mod_a.so", b"first") else {
            return;
        };
        let path = staged.path().to_path_buf();
        let retained = staged.retain();
        assert!(retained.is_some());

        let Ok(next) = MemfdStager.stage("mod_b", "deps/mod_b.so", b"second") else {
            return;
        };
        assert_ne!(next.path(), path);
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memfd_stager_exposes_bytes_through_proc_alias() {
        let staged = match MemfdStager.stage("mod_native", "deps/mod_native.so", b"payload") {
            Ok(staged) => staged,
            // Sandboxes without procfs or memfd_create
            Err(_) => return,
        };

        assert_eq!(staged.source(), &LoadSource::Memory);
        assert!(staged.path().starts_with("/proc/self/fd"));
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"payload");
    }
}
