//! Centralized configuration for zippy.
//!
//! Constant tables for the archive layout, extraction, search paths, the
//! native module loader, supervision and the build pipeline, plus the
//! [`RuntimeConfig`] read from the environment at launch.

use std::path::PathBuf;
use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "zippy";
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
}

/// Fixed relative paths inside an archive.
pub struct LayoutConfig;

impl LayoutConfig {
    /// Marker entry holding the manifest. Its presence identifies a payload.
    pub const MANIFEST_ENTRY: &'static str = "__zippy__.json";
    /// Subtree holding installed dependencies.
    pub const DEPS_DIR: &'static str = "deps";
    pub const FORMAT_VERSION: u32 = 1;
}

/// Configuration for extraction on launch.
pub struct ExtractionConfig;

impl ExtractionConfig {
    /// Overrides the extraction directory when set and non-empty.
    pub const EXTRACT_DIR_ENV: &'static str = "ZIPPY_EXTRACT_DIR";
    pub const TEMP_DIR_PREFIX: &'static str = "zippy_";
    /// Exported to the entry point: path of the running archive.
    pub const ARCHIVE_ENV: &'static str = "ZIPPY_ARCHIVE";
    /// Exported to the entry point: extraction root.
    pub const ROOT_ENV: &'static str = "ZIPPY_ROOT";
}

/// Search path variables.
pub struct SearchPathConfig;

impl SearchPathConfig {
    /// Module search path read, extended and re-exported on launch.
    pub const MODULE_PATH_ENV: &'static str = "ZIPPY_PATH";

    /// Variable the platform's dynamic loader consults for shared libraries.
    pub fn library_path_env() -> &'static str {
        #[cfg(target_os = "macos")]
        {
            "DYLD_LIBRARY_PATH"
        }
        #[cfg(windows)]
        {
            "PATH"
        }
        #[cfg(not(any(target_os = "macos", windows)))]
        {
            "LD_LIBRARY_PATH"
        }
    }
}

/// Native module loader configuration.
pub struct LoaderConfig;

impl LoaderConfig {
    /// Version of the native module ABI encoded in tagged suffixes.
    pub const MODULE_ABI_VERSION: u32 = 1;
    /// Optional export called once when a module is bound.
    pub const INIT_SYMBOL: &'static str = "zippy_module_init";
    /// Export called by the in-process run mode.
    pub const MAIN_SYMBOL: &'static str = "zippy_main";
    /// Disables the memory-backed technique when set and non-empty.
    pub const NO_MEMFD_ENV: &'static str = "ZIPPY_NO_MEMFD";
    pub const FALLBACK_DIR_PREFIX: &'static str = "zippy_ext_";
}

/// Process supervision timing.
pub struct SupervisorConfig;

impl SupervisorConfig {
    /// Grace period between SIGTERM and SIGKILL on forced termination.
    pub const FORCE_KILL_TIMEOUT: Duration = Duration::from_millis(2000);
    /// Exit code recorded when the supervisor has to terminate the child itself.
    pub const INTERRUPTED_EXIT_CODE: i32 = 1;
    /// Exit codes of signaled children are reported as `SIGNAL_EXIT_BASE + signo`.
    pub const SIGNAL_EXIT_BASE: i32 = 128;
    /// Longest the supervisor sleeps between child status checks; a signal
    /// wakes it early.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
}

/// Build pipeline configuration.
pub struct BuildConfig;

impl BuildConfig {
    pub const DEFAULT_SHEBANG: &'static str = "#!/usr/bin/env zippy-run";
    /// Dependency manifest picked up automatically from the source root.
    pub const DEFAULT_DEP_MANIFEST: &'static str = "requirements.txt";
    pub const DEFAULT_INSTALLER: &'static str = "pip";
    pub const DEFAULT_INSTALLER_ARGS: &'static [&'static str] =
        &["install", "--upgrade", "-r", "{manifest}", "-t", "{target}"];
    pub const MANIFEST_PLACEHOLDER: &'static str = "{manifest}";
    pub const TARGET_PLACEHOLDER: &'static str = "{target}";
    /// Directory names never copied into an archive.
    pub const EXCLUDED_DIRS: &'static [&'static str] =
        &[".git", ".hg", ".svn", "__pycache__", "target"];
    /// File names never copied into an archive.
    pub const EXCLUDED_FILES: &'static [&'static str] = &[".DS_Store"];
    /// File extensions never copied into an archive.
    pub const EXCLUDED_EXTENSIONS: &'static [&'static str] = &["pyc", "pyo"];
}

/// Settings read once at launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Caller-supplied extraction directory.
    pub extract_dir: Option<PathBuf>,
    /// Whether the memory-backed technique may be attempted.
    pub memory_backing: bool,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self {
            extract_dir: None,
            memory_backing: true,
        }
    }

    /// Read the runtime settings from the process environment.
    pub fn from_env() -> Self {
        let extract_dir = non_empty_env(ExtractionConfig::EXTRACT_DIR_ENV).map(PathBuf::from);
        let memory_backing = non_empty_env(LoaderConfig::NO_MEMFD_ENV).is_none();
        Self {
            extract_dir,
            memory_backing,
        }
    }

    /// Use an explicit extraction directory.
    pub fn with_extract_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extract_dir = Some(dir.into());
        self
    }

    /// Enable or disable the memory-backed loading technique.
    pub fn with_memory_backing(mut self, enabled: bool) -> Self {
        self.memory_backing = enabled;
        self
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_config_builder() {
        let config = RuntimeConfig::new()
            .with_extract_dir("/tmp/run1")
            .with_memory_backing(false);

        assert_eq!(config.extract_dir, Some(PathBuf::from("/tmp/run1")));
        assert!(!config.memory_backing);
    }

    #[test]
    fn test_new_enables_memory_backing() {
        assert!(RuntimeConfig::new().memory_backing);
        assert!(RuntimeConfig::new().extract_dir.is_none());
    }

    #[test]
    fn test_installer_args_carry_placeholders() {
        let args = BuildConfig::DEFAULT_INSTALLER_ARGS;
        assert!(args.contains(&BuildConfig::MANIFEST_PLACEHOLDER));
        assert!(args.contains(&BuildConfig::TARGET_PLACEHOLDER));
    }
}
