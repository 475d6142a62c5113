//! Two-process supervision of a script entry point.
//!
//! The supervisor spawns the entry as a child, forwards interrupt and
//! termination signals to it unchanged, and reports the child's exit code.
//! Signal delivery and child status are merged into one control loop that
//! drives the [`ChildState`] machine:
//!
//! ```text
//! loop: forward pending signals -> non-blocking wait -> sleep until signal or tick
//! ```
//!
//! Pending signals are drained before every status check, so a signal that
//! arrives during the spawn or between two checks is still forwarded.

use super::child::{ChildHandle, ChildState, EntryCommand};
use crate::config::SupervisorConfig;
use crate::error::Result;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs a child to completion.
#[derive(Debug, Clone)]
pub struct Supervisor {
    force_kill_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            force_kill_timeout: SupervisorConfig::FORCE_KILL_TIMEOUT,
        }
    }

    /// Grace period between SIGTERM and SIGKILL when forcing termination.
    pub fn with_force_kill_timeout(mut self, timeout: Duration) -> Self {
        self.force_kill_timeout = timeout;
        self
    }

    /// Spawn `command`, wait for it and return the exit code to report.
    ///
    /// A signaled child reports `128 + signo`. If the child cannot be waited
    /// for or a signal cannot be forwarded, it is terminated and 1 is returned.
    pub fn run(&self, command: &EntryCommand) -> Result<i32> {
        self.start(command)?.wait()
    }

    /// Install the signal handlers, then spawn `command`.
    ///
    /// Signals received from here on are forwarded once [`Supervised::wait`]
    /// runs, including those that arrive before it is called.
    #[cfg(unix)]
    pub fn start(&self, command: &EntryCommand) -> Result<Supervised> {
        let signals = super::signals::SignalGuard::install()?;
        let handle = ChildHandle::spawn(command)?;
        Ok(Supervised {
            handle,
            force_kill_timeout: self.force_kill_timeout,
            signals,
        })
    }

    /// Install the interrupt hook, then spawn `command`.
    #[cfg(not(unix))]
    pub fn start(&self, command: &EntryCommand) -> Result<Supervised> {
        interrupts::install();
        let handle = ChildHandle::spawn(command)?;
        Ok(Supervised {
            handle,
            force_kill_timeout: self.force_kill_timeout,
        })
    }
}

/// A spawned child plus whatever receives signals on its behalf.
#[derive(Debug)]
pub struct Supervised {
    handle: ChildHandle,
    #[cfg_attr(not(unix), allow(dead_code))]
    force_kill_timeout: Duration,
    #[cfg(unix)]
    signals: super::signals::SignalGuard,
}

impl Supervised {
    pub fn pid(&self) -> u32 {
        self.handle.pid()
    }

    pub fn state(&self) -> ChildState {
        self.handle.state()
    }

    /// Wait for the child, forwarding signals, and return the exit code.
    pub fn wait(mut self) -> Result<i32> {
        let code = self.wait_loop()?;
        info!("Entry exited with code {} ({})", code, self.handle.state());
        Ok(code)
    }

    #[cfg(unix)]
    fn wait_loop(&mut self) -> Result<i32> {
        use crate::error::ZippyError;
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
        use nix::unistd::Pid;

        let pid = self.handle.pid();
        let nix_pid = Pid::from_raw(
            i32::try_from(pid).map_err(|_| ZippyError::Other(format!("Invalid PID {}", pid)))?,
        );

        loop {
            for signal in self.signals.take_pending() {
                info!("Forwarding {} to child {}", signal, pid);
                match kill(nix_pid, signal) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => {
                        warn!("Could not forward {} to {}: {}", signal, pid, e);
                        return self.force_terminate();
                    }
                }
            }

            match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {}
                Ok(WaitStatus::Exited(_, code)) => {
                    self.handle.transition(ChildState::Exited(code))?;
                    return Ok(code);
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    let code = SupervisorConfig::SIGNAL_EXIT_BASE + signal as i32;
                    debug!("Child {} terminated by {}", pid, signal);
                    self.handle.transition(ChildState::Exited(code))?;
                    return Ok(code);
                }
                Ok(other) => debug!("Child {} status change: {:?}", pid, other),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    warn!("Waiting for child {} failed: {}", pid, e);
                    return self.force_terminate();
                }
            }

            self.signals.wait_for_signal();
        }
    }

    #[cfg(unix)]
    fn force_terminate(&mut self) -> Result<i32> {
        let pid = self.handle.pid();
        if !crate::platform::is_process_alive(pid) {
            debug!("Child {} already gone", pid);
            self.handle.transition(ChildState::Killed)?;
            return Ok(SupervisorConfig::INTERRUPTED_EXIT_CODE);
        }
        let timeout_ms = u64::try_from(self.force_kill_timeout.as_millis()).unwrap_or(u64::MAX);
        match crate::platform::terminate_process(pid, timeout_ms) {
            Ok(outcome) => debug!("Child {} terminated: {:?}", pid, outcome),
            Err(e) => warn!("Failed to terminate child {}: {}", pid, e),
        }
        self.handle.transition(ChildState::Killed)?;
        Ok(SupervisorConfig::INTERRUPTED_EXIT_CODE)
    }

    #[cfg(not(unix))]
    fn wait_loop(&mut self) -> Result<i32> {
        loop {
            if let Some(status) = self.handle.child_mut().try_wait()? {
                let code = status.code().unwrap_or(SupervisorConfig::INTERRUPTED_EXIT_CODE);
                self.handle.transition(ChildState::Exited(code))?;
                return Ok(code);
            }

            if interrupts::take() {
                // No portable way to forward the identical signal here.
                warn!("Interrupted, terminating child {}", self.handle.pid());
                if let Err(e) = self.handle.child_mut().kill() {
                    warn!("Failed to kill child: {}", e);
                }
                let _ = self.handle.child_mut().wait();
                self.handle.transition(ChildState::Killed)?;
                return Ok(SupervisorConfig::INTERRUPTED_EXIT_CODE);
            }

            std::thread::sleep(SupervisorConfig::POLL_INTERVAL);
        }
    }
}

#[cfg(not(unix))]
mod interrupts {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Once;
    use tracing::debug;

    static INTERRUPTED: AtomicBool = AtomicBool::new(false);
    static INSTALL: Once = Once::new();

    pub fn install() {
        INTERRUPTED.store(false, Ordering::SeqCst);
        INSTALL.call_once(|| {
            if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst)) {
                debug!("Interrupt handler not installed: {}", e);
            }
        });
    }

    pub fn take() -> bool {
        INTERRUPTED.swap(false, Ordering::SeqCst)
    }
}
