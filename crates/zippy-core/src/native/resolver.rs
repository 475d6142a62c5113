//! Module resolvers.
//!
//! Resolution is an explicit, ordered chain of [`ModuleResolver`]s. Each link
//! either produces a bound module, declines with [`Resolution::NotFound`] so
//! the next link is consulted, or fails with an error that ends the request.

use super::library::Library;
use super::module::NativeModule;
use super::naming::{candidate_filenames, module_path};
use super::stager::{ImageStager, LoadSource, MemfdStager, TempFileStager};
use crate::archive::{deps_entry_name, Archive};
use crate::error::{Result, ZippyError};
use crate::platform;
use crate::search_path::SearchPath;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of asking one resolver for a module.
#[derive(Debug)]
pub enum Resolution {
    Found(NativeModule),
    /// Not provided by this resolver; defer to the next one.
    NotFound,
}

/// One link of the resolution chain.
pub trait ModuleResolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Resolve a dotted module name.
    fn resolve(&self, module: &str) -> Result<Resolution>;
}

/// Loads native modules straight out of the running archive.
///
/// Probes `deps/<path><suffix>` then `<path><suffix>` for every host suffix,
/// stages the first matching entry with the primary stager (memory-backed by
/// default) and falls back to the disk stager exactly once if staging or
/// loading fails.
pub struct ArchiveResolver {
    archive: Mutex<Archive>,
    primary: Option<Box<dyn ImageStager>>,
    fallback: Box<dyn ImageStager>,
}

impl std::fmt::Debug for ArchiveResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveResolver")
            .field("primary", &self.primary.as_ref().map(|s| s.name()))
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl ArchiveResolver {
    /// Resolver with the memory-backed stager, where the host has one, and
    /// the temp-file fallback.
    pub fn new(archive: Archive) -> Self {
        let primary: Option<Box<dyn ImageStager>> = if platform::supports_memory_backed_files() {
            Some(Box::new(MemfdStager))
        } else {
            None
        };
        Self::with_stagers(archive, primary, Box::new(TempFileStager))
    }

    /// Open the archive at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Archive::open(path)?))
    }

    /// Resolver with explicit stagers; `primary: None` means disk only.
    pub fn with_stagers(
        archive: Archive,
        primary: Option<Box<dyn ImageStager>>,
        fallback: Box<dyn ImageStager>,
    ) -> Self {
        Self {
            archive: Mutex::new(archive),
            primary,
            fallback,
        }
    }

    /// Disable the memory-backed technique.
    pub fn without_memory_backing(mut self) -> Self {
        self.primary = None;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Archive>> {
        self.archive
            .lock()
            .map_err(|e| ZippyError::Other(format!("Failed to acquire archive lock: {}", e)))
    }

    /// Archive entry that would satisfy `module`, if any.
    pub fn find_entry(&self, module: &str) -> Result<Option<String>> {
        let archive = self.lock()?;
        let candidates = candidate_filenames(module)?;

        let found = candidates
            .iter()
            .map(|c| deps_entry_name(c))
            .chain(candidates.iter().cloned())
            .find(|entry| archive.contains(entry));
        Ok(found)
    }

    fn load(&self, module: &str, entry: &str) -> Result<NativeModule> {
        let bytes = self.lock()?.read_entry(entry)?;

        if let Some(primary) = &self.primary {
            match primary.stage(module, entry, &bytes) {
                Ok(staged) => match Library::open(module, staged.path()) {
                    Ok(library) => {
                        info!("Loaded {} from {} via {}", module, entry, primary.name());
                        let source = staged.source().clone();
                        return NativeModule::bind(module, library, source, staged.retain());
                    }
                    Err(e) => warn!(
                        "{} rejected by the {} path, retrying from disk: {}",
                        module,
                        primary.name(),
                        e
                    ),
                },
                Err(e) => debug!("{} staging unavailable for {}: {}", primary.name(), module, e),
            }
        }

        let staged = self.fallback.stage(module, entry, &bytes)?;
        let library = Library::open(module, staged.path())?;
        info!("Loaded {} from {} via {}", module, entry, self.fallback.name());
        let source = staged.source().clone();
        NativeModule::bind(module, library, source, staged.retain())
    }
}

impl ModuleResolver for ArchiveResolver {
    fn name(&self) -> &str {
        "archive"
    }

    fn resolve(&self, module: &str) -> Result<Resolution> {
        match self.find_entry(module)? {
            Some(entry) => Ok(Resolution::Found(self.load(module, &entry)?)),
            None => Ok(Resolution::NotFound),
        }
    }
}

/// Loads native modules from files on a search path.
#[derive(Debug, Clone)]
pub struct FilesystemResolver {
    search_path: SearchPath,
}

impl FilesystemResolver {
    pub fn new(search_path: SearchPath) -> Self {
        Self { search_path }
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }
}

impl ModuleResolver for FilesystemResolver {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn resolve(&self, module: &str) -> Result<Resolution> {
        let base = module_path(module)?;
        let candidates = candidate_filenames(module)?;

        for dir in self.search_path.dirs() {
            for candidate in &candidates {
                let path = dir.join(candidate);
                if path.is_file() {
                    let library = Library::open(module, &path)?;
                    info!("Loaded {} from {}", module, path.display());
                    return NativeModule::bind(module, library, LoadSource::SearchPath(path), None)
                        .map(Resolution::Found);
                }
            }
        }

        debug!("{} ({}) not on search path", module, base);
        Ok(Resolution::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveWriter, LaunchPrefix};
    use crate::native::naming::host_suffixes;
    use std::fs::File;
    use tempfile::TempDir;

    fn archive_with(entries: &[(&str, &[u8])]) -> (TempDir, Archive) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.zpy");
        let mut writer =
            ArchiveWriter::new(File::create(&path).unwrap(), &LaunchPrefix::default()).unwrap();
        for (name, bytes) in entries {
            writer.add_bytes(name, bytes, None).unwrap();
        }
        writer.finish().unwrap();
        let archive = Archive::open(&path).unwrap();
        (temp_dir, archive)
    }

    #[test]
    fn test_find_entry_prefers_deps_and_specific_suffix() {
        let suffixes = host_suffixes();
        let tagged = format!("fast{}", suffixes[0]);
        let generic = format!("fast{}", suffixes.last().unwrap());
        let deps_generic = format!("deps/{}", generic);
        let (_dir, archive) = archive_with(&[
            (tagged.as_str(), &b"root tagged"[..]),
            (generic.as_str(), &b"root generic"[..]),
            (deps_generic.as_str(), &b"deps generic"[..]),
        ]);
        let resolver = ArchiveResolver::new(archive);

        assert_eq!(resolver.find_entry("fast").unwrap(), Some(deps_generic));
    }

    #[test]
    fn test_find_entry_maps_dots_to_directories() {
        let entry = format!("pkg/sub/fast{}", host_suffixes().last().unwrap());
        let (_dir, archive) = archive_with(&[(entry.as_str(), &b"x"[..])]);
        let resolver = ArchiveResolver::new(archive);

        assert_eq!(resolver.find_entry("pkg.sub.fast").unwrap(), Some(entry));
        assert_eq!(resolver.find_entry("pkg.sub").unwrap(), None);
    }

    #[test]
    fn test_missing_module_declines() {
        let (_dir, archive) = archive_with(&[("app/main.sh", &b"#!/bin/sh"[..])]);
        let resolver = ArchiveResolver::new(archive);

        assert!(matches!(
            resolver.resolve("absent").unwrap(),
            Resolution::NotFound
        ));
    }

    #[test]
    fn test_without_memory_backing_keeps_only_the_fallback() {
        let (_dir, archive) = archive_with(&[]);
        let resolver = ArchiveResolver::new(archive).without_memory_backing();

        assert!(resolver.primary.is_none());
        assert_eq!(resolver.fallback.name(), "tempfile");
    }

    #[test]
    fn test_invalid_name_is_an_error() {
        let (_dir, archive) = archive_with(&[]);
        let resolver = ArchiveResolver::new(archive);
        assert!(resolver.resolve("a..b").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_malformed_image_is_a_load_error() {
        let entry = format!("deps/broken{}", host_suffixes().last().unwrap());
        let (_dir, archive) = archive_with(&[(entry.as_str(), &b"not an image"[..])]);
        let resolver = ArchiveResolver::new(archive);

        let err = resolver.resolve("broken").unwrap_err();
        assert!(matches!(err, ZippyError::Load { .. }), "{err:?}");
    }

    #[test]
    fn test_filesystem_resolver_declines_when_absent() {
        let dir = TempDir::new().unwrap();
        let resolver = FilesystemResolver::new(SearchPath::from_dirs([dir.path()]));
        assert!(matches!(
            resolver.resolve("absent").unwrap(),
            Resolution::NotFound
        ));
    }
}
