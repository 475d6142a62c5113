//! Writing the two-segment container: launch prefix, then a zip archive.

use super::layout::is_safe_entry_name;
use crate::config::BuildConfig;
use crate::error::{Result, ZippyError};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Bytes written in front of the archive so the file is directly executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPrefix {
    /// An interpreter line such as `#!/usr/bin/env zippy-run`.
    Shebang(String),
    /// A runtime executable copied verbatim; it boots itself from its own file.
    Stub(PathBuf),
    /// No prefix; the result is a plain zip file.
    None,
}

impl Default for LaunchPrefix {
    fn default() -> Self {
        LaunchPrefix::Shebang(BuildConfig::DEFAULT_SHEBANG.to_string())
    }
}

impl LaunchPrefix {
    /// Materialize the prefix bytes.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        match self {
            LaunchPrefix::Shebang(line) => {
                let line = line.trim_end_matches('\n');
                if !line.starts_with("#!") {
                    return Err(ZippyError::Config {
                        message: format!("Launch prefix must start with '#!': {}", line),
                    });
                }
                Ok(format!("{}\n", line).into_bytes())
            }
            LaunchPrefix::Stub(path) => {
                std::fs::read(path).map_err(|e| ZippyError::io_with_path(e, path))
            }
            LaunchPrefix::None => Ok(Vec::new()),
        }
    }
}

/// Streams entries into an archive behind a launch prefix.
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    names: HashSet<String>,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Write the prefix and start the archive segment.
    ///
    /// Entry offsets are recorded relative to the start of the file, so the
    /// result opens with any zip reader without adjustment.
    pub fn new(mut inner: W, prefix: &LaunchPrefix) -> Result<Self> {
        let bytes = prefix.bytes()?;
        inner.write_all(&bytes)?;
        debug!("Wrote {} byte launch prefix", bytes.len());

        Ok(Self {
            zip: ZipWriter::new(inner),
            names: HashSet::new(),
        })
    }

    fn options(mode: Option<u32>, size: u64) -> SimpleFileOptions {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size >= u64::from(u32::MAX));
        match mode {
            Some(mode) => options.unix_permissions(mode & 0o7777),
            None => options,
        }
    }

    fn claim(&mut self, name: &str) -> Result<()> {
        if !is_safe_entry_name(name) {
            return Err(ZippyError::integrity(
                format!("Refusing to write unsafe entry name: {}", name),
                None,
            ));
        }
        if !self.names.insert(name.to_string()) {
            return Err(ZippyError::integrity(
                format!("Duplicate archive entry: {}", name),
                None,
            ));
        }
        Ok(())
    }

    /// Whether an entry has already been written.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Add an in-memory entry.
    pub fn add_bytes(&mut self, name: &str, bytes: &[u8], mode: Option<u32>) -> Result<()> {
        self.claim(name)?;
        self.zip
            .start_file(name, Self::options(mode, bytes.len() as u64))?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    /// Add a file from disk, keeping its unix permission bits.
    pub fn add_file(&mut self, name: &str, path: &Path) -> Result<()> {
        self.claim(name)?;
        let mut source = File::open(path).map_err(|e| ZippyError::io_with_path(e, path))?;
        let metadata = source
            .metadata()
            .map_err(|e| ZippyError::io_with_path(e, path))?;

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };
        #[cfg(not(unix))]
        let mode = None;

        self.zip.start_file(name, Self::options(mode, metadata.len()))?;
        std::io::copy(&mut source, &mut self.zip).map_err(|e| ZippyError::io_with_path(e, path))?;
        Ok(())
    }

    /// Write the central directory and return the underlying writer.
    pub fn finish(self) -> Result<W> {
        let mut inner = self.zip.finish()?;
        inner.flush()?;
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archive;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_shebang_prefix_gets_newline() {
        let prefix = LaunchPrefix::Shebang("#!/usr/bin/env zippy-run".into());
        assert_eq!(prefix.bytes().unwrap(), b"#!/usr/bin/env zippy-run\n".to_vec());
    }

    #[test]
    fn test_shebang_prefix_must_start_with_hashbang() {
        let prefix = LaunchPrefix::Shebang("/usr/bin/env zippy-run".into());
        assert!(prefix.bytes().is_err());
    }

    #[test]
    fn test_rejects_duplicates_and_traversal() {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), &LaunchPrefix::None).unwrap();
        writer.add_bytes("a.txt", b"one", None).unwrap();

        assert!(writer.add_bytes("a.txt", b"two", None).is_err());
        assert!(writer.add_bytes("../b.txt", b"two", None).is_err());
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn test_prefixed_archive_opens_by_trailer_scan() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.zpy");

        let file = File::create(&path).unwrap();
        let mut writer = ArchiveWriter::new(file, &LaunchPrefix::default()).unwrap();
        writer.add_bytes("hello.txt", b"hello world", Some(0o644)).unwrap();
        writer.finish().unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert!(raw.starts_with(b"#!/usr/bin/env zippy-run\n"));

        let mut archive = Archive::open(&path).unwrap();
        assert_eq!(archive.read_entry("hello.txt").unwrap(), b"hello world");
    }

    #[test]
    fn test_stub_prefix_copies_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let stub = temp_dir.path().join("stub");
        std::fs::write(&stub, b"\x7fELF-not-really").unwrap();

        let bytes = LaunchPrefix::Stub(stub).bytes().unwrap();
        assert_eq!(bytes, b"\x7fELF-not-really");
    }
}
