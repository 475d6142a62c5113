//! Runtime bootstrap: extract a payload, publish its search paths and start
//! its entry point.
//!
//! ```text
//! open archive -> extract to root -> [root/deps, root, ...] -> entry
//!                                                               |
//!                    script: supervised child <-----------------+
//!                    module: imported and run in-process <------+
//!                                                 cleanup of root on every path
//! ```
//!
//! Extraction always completes before anything is published or launched.

mod extract;

pub use extract::{extract, ExtractionRoot, RootOrigin};

use crate::archive::{Archive, EntryPoint, Manifest};
use crate::config::{ExtractionConfig, RuntimeConfig};
use crate::error::{Result, ZippyError};
use crate::native::{self, ModuleImporter};
use crate::platform;
use crate::process::{EntryCommand, Supervisor};
use crate::search_path::SearchEnvironment;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An extracted payload, ready to run.
///
/// Dropping a `Bootstrap` removes a launcher-owned extraction root, so the
/// directory is cleaned up on early returns and unwinding as well.
#[derive(Debug)]
pub struct Bootstrap {
    archive: PathBuf,
    root: ExtractionRoot,
    manifest: Manifest,
    search: SearchEnvironment,
    config: RuntimeConfig,
}

impl Bootstrap {
    /// Extract `archive` and compute the search environment.
    pub fn prepare(archive: impl AsRef<Path>, config: &RuntimeConfig) -> Result<Self> {
        let archive = archive.as_ref();
        let archive =
            std::fs::canonicalize(archive).map_err(|e| ZippyError::io_with_path(e, archive))?;

        let root = ExtractionRoot::prepare(config.extract_dir.as_deref())?;
        // `root` is dropped, and cleaned up, if extraction fails.
        let manifest = extract(&archive, &root)?;
        let search = SearchEnvironment::for_bundle(root.path());
        info!(
            "Prepared {} (entry: {})",
            archive.display(),
            manifest.entry.describe()
        );

        Ok(Self {
            archive,
            root,
            manifest,
            search,
            config: config.clone(),
        })
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn root(&self) -> &ExtractionRoot {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn search_environment(&self) -> &SearchEnvironment {
        &self.search
    }

    /// Extracted path of a script entry point.
    pub fn entry_path(&self) -> Result<Option<PathBuf>> {
        match &self.manifest.entry {
            EntryPoint::Script { path, .. } => {
                let entry = self.root.join(path);
                if entry.is_file() {
                    Ok(Some(entry))
                } else {
                    Err(ZippyError::EntryNotFound(entry))
                }
            }
            EntryPoint::Module { .. } => Ok(None),
        }
    }

    /// A fresh importer over this payload: archive first, then the search path.
    pub fn importer(&self) -> Result<ModuleImporter> {
        ModuleImporter::for_archive(
            &self.archive,
            self.search.module_path.clone(),
            &self.config,
        )
    }

    /// Run the entry point and clean up. Returns the exit code to report.
    pub fn run(mut self, args: &[OsString]) -> Result<i32> {
        let result = match self.manifest.entry.clone() {
            EntryPoint::Script { interpreter, .. } => self.run_script(interpreter, args),
            EntryPoint::Module { name } => self.run_module(&name, args),
        };
        self.root.cleanup();
        result
    }

    fn run_script(&self, interpreter: Option<String>, args: &[OsString]) -> Result<i32> {
        let entry = self
            .entry_path()?
            .ok_or_else(|| ZippyError::Other("script entry without a path".to_string()))?;
        if interpreter.is_none() && !platform::is_executable(&entry) {
            platform::set_executable(&entry)?;
        }

        let command = EntryCommand::new(&entry)
            .with_interpreter(interpreter)
            .with_args(args.iter().cloned())
            .with_search_environment(&self.search)?
            .with_env(ExtractionConfig::ARCHIVE_ENV, &self.archive)
            .with_env(ExtractionConfig::ROOT_ENV, self.root.path());

        Supervisor::new().run(&command)
    }

    fn run_module(&self, name: &str, args: &[OsString]) -> Result<i32> {
        self.search.export()?;
        std::env::set_var(ExtractionConfig::ARCHIVE_ENV, &self.archive);
        std::env::set_var(ExtractionConfig::ROOT_ENV, self.root.path());

        let private;
        let importer: &ModuleImporter = if native::global().is_none() {
            native::install_global(self.importer()?)?
        } else {
            debug!("Global importer already installed, using a private one");
            private = self.importer()?;
            &private
        };

        for module in &self.manifest.preload {
            importer.import(module)?;
        }

        let module = importer
            .find(name)?
            .ok_or_else(|| ZippyError::EntryNotFound(PathBuf::from(name)))?;

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.archive.clone().into_os_string());
        argv.extend(args.iter().cloned());
        module.run_main(&argv)
    }
}

/// Extract and run an archive; the extraction root is removed afterwards
/// unless it is a pre-existing override directory.
pub fn launch(archive: impl AsRef<Path>, args: &[OsString], config: &RuntimeConfig) -> Result<i32> {
    Bootstrap::prepare(archive, config)?.run(args)
}

/// The running executable, if it carries a payload.
pub fn self_archive() -> Result<Option<PathBuf>> {
    let exe = std::env::current_exe()?;
    if Archive::has_payload(&exe) {
        Ok(Some(exe))
    } else {
        Ok(None)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::archive::{ArchiveWriter, LaunchPrefix};
    use crate::config::LayoutConfig;
    use std::fs::File;
    use tempfile::TempDir;

    fn write_archive(path: &Path, manifest: &Manifest, files: &[(&str, &str, u32)]) {
        let mut writer =
            ArchiveWriter::new(File::create(path).unwrap(), &LaunchPrefix::default()).unwrap();
        writer
            .add_bytes(
                LayoutConfig::MANIFEST_ENTRY,
                &manifest.to_json_bytes().unwrap(),
                None,
            )
            .unwrap();
        for (name, body, mode) in files {
            writer.add_bytes(name, body.as_bytes(), Some(*mode)).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_launch_script_returns_child_code() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("app.zpy");
        write_archive(
            &archive,
            &Manifest::new(EntryPoint::script("app/main.sh")),
            &[("app/main.sh", "#!/bin/sh\nexit \"$1\"\n", 0o755)],
        );

        let code = launch(&archive, &[OsString::from("5")], &RuntimeConfig::new()).unwrap();
        assert_eq!(code, 5);
    }

    #[test]
    fn test_launch_cleans_created_override() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("app.zpy");
        let run_dir = temp_dir.path().join("run1");
        write_archive(
            &archive,
            &Manifest::new(EntryPoint::Script {
                path: "app/main.sh".to_string(),
                interpreter: Some("sh".to_string()),
            }),
            &[("app/main.sh", "test -n \"$ZIPPY_ROOT\" && exit 0; exit 9\n", 0o644)],
        );

        let config = RuntimeConfig::new().with_extract_dir(&run_dir);
        let code = launch(&archive, &[], &config).unwrap();

        assert_eq!(code, 0);
        assert!(!run_dir.exists());
    }

    #[test]
    fn test_missing_script_entry() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("app.zpy");
        let run_dir = temp_dir.path().join("run1");
        write_archive(
            &archive,
            &Manifest::new(EntryPoint::script("app/missing.sh")),
            &[("app/other.sh", "exit 0\n", 0o755)],
        );

        let config = RuntimeConfig::new().with_extract_dir(&run_dir);
        let err = launch(&archive, &[], &config).unwrap_err();

        assert!(matches!(err, ZippyError::EntryNotFound(_)));
        assert!(!run_dir.exists());
    }

    #[test]
    fn test_plain_zip_is_rejected_before_extraction() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("plain.zip");
        let run_dir = temp_dir.path().join("run1");
        let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("app/main.sh", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.finish().unwrap();

        let config = RuntimeConfig::new().with_extract_dir(&run_dir);
        let err = launch(&archive, &[], &config).unwrap_err();

        assert!(matches!(err, ZippyError::ArchiveIntegrity { .. }));
        assert!(!run_dir.exists());
    }

    #[test]
    fn test_existing_override_survives_launch() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("app.zpy");
        let run_dir = TempDir::new().unwrap();
        write_archive(
            &archive,
            &Manifest::new(EntryPoint::script("app/main.sh")),
            &[("app/main.sh", "#!/bin/sh\nexit 0\n", 0o755)],
        );

        let config = RuntimeConfig::new().with_extract_dir(run_dir.path());
        launch(&archive, &[], &config).unwrap();

        assert!(run_dir.path().join("app/main.sh").exists());
    }
}
