//! External dependency installer.
//!
//! The installer is an opaque program (pip by default) that populates a target
//! directory from a dependency manifest. Only its exit status and stderr are
//! interpreted.

use crate::config::BuildConfig;
use crate::error::{Result, ZippyError};
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use tracing::{error, info};

/// Program plus argument template, with `{manifest}` and `{target}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInstaller {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DependencyInstaller {
    fn default() -> Self {
        Self::new(
            BuildConfig::DEFAULT_INSTALLER,
            BuildConfig::DEFAULT_INSTALLER_ARGS.iter().copied(),
        )
    }
}

impl DependencyInstaller {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Arguments with placeholders substituted.
    pub fn render_args(&self, manifest: &Path, target: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                BuildConfig::MANIFEST_PLACEHOLDER => manifest.as_os_str().to_os_string(),
                BuildConfig::TARGET_PLACEHOLDER => target.as_os_str().to_os_string(),
                other => OsString::from(
                    other
                        .replace(
                            BuildConfig::MANIFEST_PLACEHOLDER,
                            &manifest.to_string_lossy(),
                        )
                        .replace(BuildConfig::TARGET_PLACEHOLDER, &target.to_string_lossy()),
                ),
            })
            .collect()
    }

    /// Install the dependencies named by `manifest` into `target`.
    pub fn install(&self, manifest: &Path, target: &Path) -> Result<()> {
        if !manifest.is_file() {
            return Err(ZippyError::DependencyManifestMissing(manifest.to_path_buf()));
        }
        std::fs::create_dir_all(target).map_err(|e| ZippyError::io_with_path(e, target))?;

        info!(
            "Installing dependencies from {} with {}",
            manifest.display(),
            self.program
        );
        let output = Command::new(&self.program)
            .args(self.render_args(manifest, target))
            .output()
            .map_err(|e| ZippyError::DependencyInstall {
                message: format!("Failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Dependency installation failed: {}", stderr);
            return Err(ZippyError::DependencyInstall {
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_pip() {
        let installer = DependencyInstaller::default();
        let args = installer.render_args(Path::new("/src/requirements.txt"), Path::new("/t"));

        assert_eq!(installer.program, "pip");
        assert_eq!(
            args,
            vec![
                OsString::from("install"),
                OsString::from("--upgrade"),
                OsString::from("-r"),
                OsString::from("/src/requirements.txt"),
                OsString::from("-t"),
                OsString::from("/t"),
            ]
        );
    }

    #[test]
    fn test_embedded_placeholder() {
        let installer = DependencyInstaller::new("tool", ["--into={target}"]);
        let args = installer.render_args(Path::new("m"), Path::new("/out"));
        assert_eq!(args, vec![OsString::from("--into=/out")]);
    }

    #[test]
    fn test_missing_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let err = DependencyInstaller::default()
            .install(&temp_dir.path().join("requirements.txt"), temp_dir.path())
            .unwrap_err();
        assert!(matches!(err, ZippyError::DependencyManifestMissing(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_installer_populates_target() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join("requirements.txt");
        std::fs::write(&manifest, "helper\n").unwrap();
        let target = temp_dir.path().join("deps");

        let installer = DependencyInstaller::new(
            "sh",
            ["-c", "cp \"$0\" \"$1/installed.txt\"", "{manifest}", "{target}"],
        );
        installer.install(&manifest, &target).unwrap();

        assert_eq!(
            std::fs::read_to_string(target.join("installed.txt")).unwrap(),
            "helper\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_carries_stderr() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join("requirements.txt");
        std::fs::write(&manifest, "nope\n").unwrap();

        let installer =
            DependencyInstaller::new("sh", ["-c", "echo 'no matching distribution' >&2; exit 1"]);
        let err = installer
            .install(&manifest, &temp_dir.path().join("deps"))
            .unwrap_err();

        match err {
            ZippyError::DependencyInstall { message } => {
                assert!(message.contains("no matching distribution"), "{message}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
