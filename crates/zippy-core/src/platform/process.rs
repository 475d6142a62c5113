//! Platform-specific process management.
//!
//! Liveness checks and forced termination of a supervised child. The child is
//! always our own direct descendant, so termination also reaps it.

use crate::error::{Result, ZippyError};
use tracing::{debug, warn};

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: Uses `kill(pid, 0)` signal check
/// - **Other platforms**: Assumes the process exists
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        // Signal `None` performs the permission/existence check only.
        kill(Pid::from_raw(raw), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        warn!("Process alive check not implemented for this platform");
        true
    }
}

/// Outcome of a forced termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited after SIGTERM.
    Graceful,
    /// The process had to be killed with SIGKILL.
    Killed,
    /// The process was already gone.
    AlreadyExited,
}

/// Terminate a child process gracefully, then forcefully if needed, and reap it.
///
/// # Platform Behavior
/// - **Linux/macOS**: Sends SIGTERM, polls for `timeout_ms`, then SIGKILL
/// - **Other platforms**: Unsupported; use `std::process::Child::kill`
#[cfg(unix)]
pub fn terminate_process(pid: u32, timeout_ms: u64) -> Result<Termination> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    use nix::unistd::Pid;
    use std::thread::sleep;
    use std::time::Duration;

    let raw = i32::try_from(pid).map_err(|_| ZippyError::Other(format!("Invalid PID {}", pid)))?;
    let nix_pid = Pid::from_raw(raw);

    // First try SIGTERM (graceful)
    debug!("Sending SIGTERM to process {}", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
        if e == Errno::ESRCH {
            return Ok(Termination::AlreadyExited);
        }
        warn!("Failed to send SIGTERM to {}: {}", pid, e);
    }

    let wait_interval = Duration::from_millis(100);
    let iterations = (timeout_ms / 100).max(1);

    for _ in 0..iterations {
        match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {}
            Ok(status) => {
                debug!("Process {} terminated gracefully: {:?}", pid, status);
                return Ok(Termination::Graceful);
            }
            Err(Errno::ECHILD) => return Ok(Termination::AlreadyExited),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
        sleep(wait_interval);
    }

    debug!("Process {} still running, sending SIGKILL", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGKILL) {
        if e == Errno::ESRCH {
            return Ok(Termination::AlreadyExited);
        }
        return Err(ZippyError::Other(format!(
            "Failed to kill process {}: {}",
            pid, e
        )));
    }

    // Reap the zombie; SIGKILL cannot be ignored so this returns promptly.
    loop {
        match waitpid(nix_pid, None) {
            Ok(status) => {
                debug!("Reaped process {}: {:?}", pid, status);
                break;
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Termination::Killed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(4_000_000_000));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_reaps_child() {
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();

        let outcome = terminate_process(pid, 1000).unwrap();

        assert_eq!(outcome, Termination::Graceful);
        assert!(!is_process_alive(pid));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_escalates_to_sigkill() {
        let child = std::process::Command::new("sh")
            .args(["-c", "trap '' TERM; while :; do sleep 0.05; done"])
            .spawn()
            .unwrap();
        let pid = child.id();
        // Give the shell time to install its trap.
        std::thread::sleep(std::time::Duration::from_millis(300));

        let outcome = terminate_process(pid, 200).unwrap();

        assert_eq!(outcome, Termination::Killed);
        assert!(!is_process_alive(pid));
    }
}
