//! Platform-specific file permission handling.

use crate::error::Result;
use std::path::Path;
use tracing::debug;

/// Make a built archive executable.
///
/// # Platform Behavior
/// - **Linux/macOS**: Adds the execute bits to the existing mode (like `chmod +x`)
/// - **Windows**: No-op (Windows determines executability by file extension)
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        let mode = permissions.mode();
        // Mirror read bits into execute bits, so 0o644 becomes 0o755.
        permissions.set_mode(mode | ((mode & 0o444) >> 2));
        std::fs::set_permissions(path, permissions)?;
        debug!("Set executable permissions on: {}", path.display());
    }

    #[cfg(windows)]
    {
        debug!("Skipping executable bit on Windows for: {}", path.display());
    }

    Ok(())
}

/// Check if a file has executable permissions.
///
/// # Platform Behavior
/// - **Linux/macOS**: Checks if any execute bit is set
/// - **Windows**: Returns true for common executable extensions (.exe, .bat, .cmd, .ps1)
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            metadata.permissions().mode() & 0o111 != 0
        } else {
            false
        }
    }

    #[cfg(windows)]
    {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            matches!(ext_lower.as_str(), "exe" | "bat" | "cmd" | "ps1" | "com")
        } else {
            false
        }
    }
}
