//! Platform abstraction layer for cross-platform compatibility.
//!
//! OS-specific `#[cfg]` blocks for permissions and process control live here
//! rather than being scattered throughout the codebase.
//!
//! - `permissions` - executable bits on built archives
//! - `process` - liveness checks, signal delivery and forced termination
//!
//! The native module loader keeps its own platform code in
//! [`crate::native`], since memory-backed descriptors and the dynamic loader
//! are tied to that module's lifecycle.

pub mod permissions;
pub mod process;

pub use permissions::{is_executable, set_executable};
pub use process::{is_process_alive, Termination};
#[cfg(unix)]
pub use process::terminate_process;

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "darwin"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}

/// Returns true if memory-backed descriptors can exist on this platform at all.
///
/// A `true` here is only a capability hint; creating one can still fail at
/// runtime (old kernel, seccomp filter, missing `/proc`).
pub fn supports_memory_backed_files() -> bool {
    cfg!(any(target_os = "linux", target_os = "android", target_os = "freebsd"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_platform() {
        let platform = current_platform();
        assert!(["linux", "windows", "darwin", "unknown"].contains(&platform));
    }

    #[test]
    fn test_memory_backed_capability() {
        #[cfg(target_os = "linux")]
        assert!(supports_memory_backed_files());
        #[cfg(target_os = "macos")]
        assert!(!supports_memory_backed_files());
    }
}
