//! Archive build pipeline.
//!
//! Collects a source tree and an optional dependency directory and writes
//! them, with the manifest, into a self-executing archive:
//!
//! 1. Resolve dependencies: run the installer on a dependency manifest, or use
//!    a pre-populated directory.
//! 2. Collect files with the fixed exclusion list applied.
//! 3. Check that the entry point is part of the payload.
//! 4. Write prefix, manifest, sources and `deps/` into a temp file beside the
//!    output, then persist it and mark it executable.
//!
//! Any failure leaves no archive at the output path.

mod installer;

pub use installer::DependencyInstaller;

use crate::archive::{
    archive_name, deps_entry_name, ArchiveWriter, EntryPoint, LaunchPrefix, Manifest,
};
use crate::config::{AppConfig, BuildConfig, LayoutConfig};
use crate::error::{Result, ZippyError};
use crate::native::candidate_filenames;
use crate::platform;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Where the archive's `deps/` subtree comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DependencySource {
    /// No dependencies.
    None,
    /// Install from `requirements.txt` in the source root if it exists.
    #[default]
    Auto,
    /// Install from this manifest; it must exist.
    Manifest(PathBuf),
    /// Use an already populated directory as-is.
    Directory(PathBuf),
}

/// Summary of a finished build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub output: PathBuf,
    pub entry: EntryPoint,
    pub source_files: usize,
    pub dependency_files: usize,
}

/// Builds one archive.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    source_dir: PathBuf,
    output: PathBuf,
    entry: EntryPoint,
    prefix: LaunchPrefix,
    dependencies: DependencySource,
    installer: DependencyInstaller,
    preload: Vec<String>,
}

impl ArchiveBuilder {
    pub fn new(source_dir: impl AsRef<Path>, output: impl AsRef<Path>, entry: EntryPoint) -> Self {
        Self {
            source_dir: source_dir.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            entry,
            prefix: LaunchPrefix::default(),
            dependencies: DependencySource::default(),
            installer: DependencyInstaller::default(),
            preload: Vec::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: LaunchPrefix) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn with_dependencies(mut self, dependencies: DependencySource) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_installer(mut self, installer: DependencyInstaller) -> Self {
        self.installer = installer;
        self
    }

    /// Native modules the runtime imports before a module entry runs.
    pub fn with_preload(mut self, modules: Vec<String>) -> Self {
        self.preload = modules;
        self
    }

    pub fn build(&self) -> Result<BuildReport> {
        let source_dir = std::fs::canonicalize(&self.source_dir)
            .map_err(|e| ZippyError::io_with_path(e, &self.source_dir))?;
        if !source_dir.is_dir() {
            return Err(ZippyError::Config {
                message: format!("Source is not a directory: {}", source_dir.display()),
            });
        }
        let output = absolute_output(&self.output)?;
        info!(
            "Building {} from {}",
            output.display(),
            source_dir.display()
        );

        // The installer's target directory lives until the archive is written.
        let installed = match &self.dependencies {
            DependencySource::Auto => {
                let manifest = source_dir.join(BuildConfig::DEFAULT_DEP_MANIFEST);
                if manifest.is_file() {
                    Some(self.install(&manifest)?)
                } else {
                    None
                }
            }
            DependencySource::Manifest(manifest) => Some(self.install(manifest)?),
            DependencySource::None | DependencySource::Directory(_) => None,
        };
        let deps_dir = match (&self.dependencies, &installed) {
            (_, Some(target)) => Some(target.path().to_path_buf()),
            (DependencySource::Directory(dir), None) => {
                if !dir.is_dir() {
                    return Err(ZippyError::Config {
                        message: format!("Dependency directory not found: {}", dir.display()),
                    });
                }
                Some(dir.clone())
            }
            _ => None,
        };

        let sources = collect_files(&source_dir, Some(&output))?;
        let dependencies = match &deps_dir {
            Some(dir) => collect_files(dir, Some(&output))?
                .into_iter()
                .map(|(name, path)| (deps_entry_name(&name), path))
                .collect(),
            None => Vec::new(),
        };
        debug!(
            "Collected {} source files and {} dependency files",
            sources.len(),
            dependencies.len()
        );

        self.check_entry(&source_dir, &sources, &dependencies)?;

        let manifest = Manifest::new(self.entry.clone()).with_preload(self.preload.clone());
        self.write(&output, &manifest, sources.iter().chain(dependencies.iter()))?;

        info!("Wrote {}", output.display());
        Ok(BuildReport {
            output,
            entry: self.entry.clone(),
            source_files: sources.len(),
            dependency_files: dependencies.len(),
        })
    }

    fn install(&self, manifest: &Path) -> Result<TempDir> {
        if !manifest.is_file() {
            return Err(ZippyError::DependencyManifestMissing(manifest.to_path_buf()));
        }
        let target = tempfile::Builder::new()
            .prefix(&format!("{}_deps_", AppConfig::APP_NAME))
            .tempdir()?;
        self.installer.install(manifest, target.path())?;
        Ok(target)
    }

    fn check_entry(
        &self,
        source_dir: &Path,
        sources: &[(String, PathBuf)],
        dependencies: &[(String, PathBuf)],
    ) -> Result<()> {
        let has = |name: &str| {
            sources
                .iter()
                .chain(dependencies.iter())
                .any(|(entry, _)| entry == name)
        };

        match &self.entry {
            EntryPoint::Script { path, .. } => {
                if has(path.as_str()) {
                    Ok(())
                } else {
                    Err(ZippyError::EntryNotFound(source_dir.join(path)))
                }
            }
            EntryPoint::Module { name } => {
                let found = candidate_filenames(name)?
                    .iter()
                    .any(|c| has(c.as_str()) || has(deps_entry_name(c).as_str()));
                if found {
                    Ok(())
                } else {
                    Err(ZippyError::EntryNotFound(PathBuf::from(name)))
                }
            }
        }
    }

    fn write<'a>(
        &self,
        output: &Path,
        manifest: &Manifest,
        files: impl Iterator<Item = &'a (String, PathBuf)>,
    ) -> Result<()> {
        let parent = output.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| ZippyError::io_with_path(e, parent))?;

        let mut temp =
            NamedTempFile::new_in(parent).map_err(|e| ZippyError::io_with_path(e, parent))?;
        let mut writer = ArchiveWriter::new(temp.as_file_mut(), &self.prefix)?;
        writer.add_bytes(
            LayoutConfig::MANIFEST_ENTRY,
            &manifest.to_json_bytes()?,
            Some(0o644),
        )?;
        for (name, path) in files {
            writer.add_file(name, path)?;
        }
        writer.finish()?;

        temp.persist(output)
            .map_err(|e| ZippyError::io_with_path(e.error, output))?;
        platform::set_executable(output)
    }
}

fn absolute_output(output: &Path) -> Result<PathBuf> {
    let output = if output.is_absolute() {
        output.to_path_buf()
    } else {
        std::env::current_dir()?.join(output)
    };
    // Resolve the parent so the output can be recognised inside the source tree.
    match (output.parent(), output.file_name()) {
        (Some(parent), Some(name)) if parent.is_dir() => {
            Ok(std::fs::canonicalize(parent)
                .map_err(|e| ZippyError::io_with_path(e, parent))?
                .join(name))
        }
        _ => Ok(output),
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        return BuildConfig::EXCLUDED_DIRS.contains(&name.as_ref());
    }
    BuildConfig::EXCLUDED_FILES.contains(&name.as_ref())
        || entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| BuildConfig::EXCLUDED_EXTENSIONS.contains(&ext))
}

/// Regular files under `root` as `(archive name, path)`, sorted by name.
fn collect_files(root: &Path, skip: Option<&Path>) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() || Some(entry.path()) == skip {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        match archive_name(relative) {
            Some(name) => files.push((name, entry.path().to_path_buf())),
            None => warn!(
                "Skipping file with unrepresentable name: {}",
                entry.path().display()
            ),
        }
    }

    Ok(files)
}
