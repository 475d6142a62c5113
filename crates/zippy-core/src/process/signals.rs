//! Interrupt and termination handlers for the supervisor.
//!
//! The handler records which signals arrived and writes one byte to a wakeup
//! socket. The supervisor drains the recorded set before every wait and then
//! sleeps on the socket, so a signal that lands at any point (during the
//! spawn, or between a check and the next sleep) still wakes the loop.

#![allow(unsafe_code)]

use crate::config::SupervisorConfig;
use crate::error::Result;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::ffi::c_int;
use std::io::{ErrorKind, Read};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use tracing::{debug, warn};

/// Signals forwarded unchanged to the child.
pub const FORWARDED_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTERM];

/// Bit `n` is set when signal `n` arrived and has not been taken yet.
static PENDING: AtomicU32 = AtomicU32::new(0);

/// Write end of the active guard's wakeup socket, or -1.
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn record_signal(signo: c_int) {
    if (0..32).contains(&signo) {
        PENDING.fetch_or(1 << signo, Ordering::SeqCst);
    }
    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = 1u8;
        // SAFETY: write(2) is async-signal-safe. The socket is non-blocking;
        // a full buffer already holds a pending wakeup.
        unsafe {
            libc::write(fd, (&byte as *const u8).cast(), 1);
        }
    }
}

/// Installed handlers; the previous dispositions come back on drop.
#[derive(Debug)]
pub struct SignalGuard {
    previous: Vec<(Signal, SigAction)>,
    wake_tx: UnixStream,
    wake_rx: UnixStream,
}

impl SignalGuard {
    pub fn install() -> Result<Self> {
        let (wake_tx, wake_rx) = UnixStream::pair()?;
        wake_tx.set_nonblocking(true)?;
        wake_rx.set_read_timeout(Some(SupervisorConfig::POLL_INTERVAL))?;

        PENDING.store(0, Ordering::SeqCst);
        WAKE_FD.store(wake_tx.as_raw_fd(), Ordering::SeqCst);

        let action = SigAction::new(
            SigHandler::Handler(record_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        let mut guard = Self {
            previous: Vec::with_capacity(FORWARDED_SIGNALS.len()),
            wake_tx,
            wake_rx,
        };
        for signal in FORWARDED_SIGNALS {
            // SAFETY: `record_signal` only touches atomics and calls write(2),
            // both async-signal-safe.
            let old = unsafe { sigaction(signal, &action) }?;
            guard.previous.push((signal, old));
        }
        debug!("Installed forwarding handlers for {:?}", FORWARDED_SIGNALS);
        Ok(guard)
    }

    /// Signals received since the last call, in ascending signal order.
    pub fn take_pending(&self) -> Vec<Signal> {
        decode(PENDING.swap(0, Ordering::SeqCst))
    }

    /// Sleep until a signal arrives or the poll interval passes.
    ///
    /// Returns true when woken by a signal.
    pub fn wait_for_signal(&self) -> bool {
        let mut buf = [0u8; 16];
        match (&self.wake_rx).read(&mut buf) {
            Ok(n) => n > 0,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                false
            }
            Err(e) => {
                warn!("Wakeup socket failed, polling instead: {}", e);
                std::thread::sleep(SupervisorConfig::POLL_INTERVAL);
                false
            }
        }
    }
}

fn decode(bits: u32) -> Vec<Signal> {
    FORWARDED_SIGNALS
        .into_iter()
        .filter(|signal| bits & (1 << (*signal as i32)) != 0)
        .collect()
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        for (signal, old) in self.previous.drain(..).rev() {
            // SAFETY: restores a disposition previously returned by sigaction.
            if let Err(e) = unsafe { sigaction(signal, &old) } {
                warn!("Failed to restore handler for {}: {}", signal, e);
            }
        }
        // Only detach our own socket; a newer guard may have replaced it.
        let _ = WAKE_FD.compare_exchange(
            self.wake_tx.as_raw_fd(),
            -1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, Instant};

    #[test]
    fn test_decode_pending_bits() {
        let bits = (1 << Signal::SIGTERM as i32) | (1 << Signal::SIGINT as i32);
        assert_eq!(decode(bits), vec![Signal::SIGINT, Signal::SIGTERM]);
        assert!(decode(0).is_empty());
        // Only forwarded signals are reported.
        assert!(decode(1 << Signal::SIGHUP as i32).is_empty());
    }

    #[test]
    fn test_wakeup_byte_ends_the_wait_early() {
        let guard = SignalGuard::install().unwrap();
        (&guard.wake_tx).write_all(&[1]).unwrap();

        let started = Instant::now();
        assert!(guard.wait_for_signal());
        assert!(started.elapsed() < SupervisorConfig::POLL_INTERVAL + Duration::from_secs(1));
    }

    #[test]
    fn test_wait_without_signal_times_out() {
        let guard = SignalGuard::install().unwrap();
        // Drain anything a concurrent test's signal may have queued.
        while guard.wait_for_signal() {}
        assert!(!guard.wait_for_signal());
    }
}
