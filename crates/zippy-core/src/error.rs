//! Error types for zippy.
//!
//! Every failure the build pipeline and the runtime can report is a variant of
//! [`ZippyError`]. A module that is simply absent from every resolver is not an
//! error; see [`crate::native::Resolution::NotFound`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the zippy library.
#[derive(Debug, Error)]
pub enum ZippyError {
    // Archive errors
    #[error("Archive integrity error: {message}")]
    ArchiveIntegrity {
        message: String,
        /// Archive file or entry path involved, if known
        path: Option<PathBuf>,
    },

    #[error("Entry point not found: {0}")]
    EntryNotFound(PathBuf),

    #[error("Zip error: {message}")]
    Zip {
        message: String,
        #[source]
        source: Option<zip::result::ZipError>,
    },

    // Build errors
    #[error("Dependency installation failed: {message}")]
    DependencyInstall { message: String },

    #[error("Dependency manifest not found: {0}")]
    DependencyManifestMissing(PathBuf),

    // Native module errors
    #[error("Failed to load native module {module}: {message}")]
    Load { module: String, message: String },

    #[error("No module named {module}")]
    ModuleNotFound { module: String },

    #[error("Invalid module name {name:?}: {reason}")]
    InvalidModuleName { name: String, reason: String },

    // Process errors
    #[error("Process launch failed for {program}: {message}")]
    LaunchFailed { program: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for zippy operations.
pub type Result<T> = std::result::Result<T, ZippyError>;

impl From<std::io::Error> for ZippyError {
    fn from(err: std::io::Error) -> Self {
        ZippyError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ZippyError {
    fn from(err: serde_json::Error) -> Self {
        ZippyError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<zip::result::ZipError> for ZippyError {
    fn from(err: zip::result::ZipError) -> Self {
        ZippyError::Zip {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(unix)]
impl From<nix::errno::Errno> for ZippyError {
    fn from(err: nix::errno::Errno) -> Self {
        ZippyError::from(std::io::Error::from(err))
    }
}

impl ZippyError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ZippyError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an archive integrity error.
    pub fn integrity(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        ZippyError::ArchiveIntegrity {
            message: message.into(),
            path,
        }
    }

    /// Create a load error for a module.
    pub fn load(module: impl Into<String>, message: impl Into<String>) -> Self {
        ZippyError::Load {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Process exit code used when this error ends a run before the entry point
    /// produced one of its own.
    ///
    /// - 1: generic failure
    /// - 2: archive unreadable or tampered
    /// - 3: entry point missing
    /// - 4: native module failed to load
    /// - 5: dependency installation failed (build only)
    pub fn exit_code(&self) -> i32 {
        match self {
            ZippyError::ArchiveIntegrity { .. } | ZippyError::Zip { .. } => 2,
            ZippyError::EntryNotFound(_) => 3,
            ZippyError::Load { .. }
            | ZippyError::ModuleNotFound { .. }
            | ZippyError::InvalidModuleName { .. } => 4,
            ZippyError::DependencyInstall { .. } | ZippyError::DependencyManifestMissing(_) => 5,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ZippyError = io_err.into();
        assert!(matches!(err, ZippyError::Io { path: None, .. }));
    }

    #[test]
    fn test_io_with_path_keeps_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ZippyError::io_with_path(io_err, "/tmp/x");
        match err {
            ZippyError::Io { path, .. } => assert_eq!(path, Some(PathBuf::from("/tmp/x"))),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ZippyError::integrity("bad", None).exit_code(), 2);
        assert_eq!(ZippyError::EntryNotFound("app/main.sh".into()).exit_code(), 3);
        assert_eq!(ZippyError::load("m", "boom").exit_code(), 4);
        assert_eq!(
            ZippyError::DependencyInstall {
                message: "pip".into()
            }
            .exit_code(),
            5
        );
        assert_eq!(ZippyError::Other("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_display_messages() {
        let err = ZippyError::ModuleNotFound {
            module: "pkg.fast".into(),
        };
        assert_eq!(err.to_string(), "No module named pkg.fast");

        let err = ZippyError::EntryNotFound("/tmp/run1/app/main.sh".into());
        assert!(err.to_string().contains("/tmp/run1/app/main.sh"));
    }
}
