//! Signal forwarding through the public supervisor API.
//!
//! Kept as its own test binary: the handlers are process-wide, and a
//! signal sent to this process must not land in an unrelated test.

#![cfg(unix)]

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::{Duration, Instant};
use zippy_core::process::{EntryCommand, Supervisor};

#[test]
fn test_signal_sent_right_after_spawn_reaches_child() {
    // Runs for about five seconds unless interrupted.
    let script = "trap 'exit 7' TERM; i=0; while [ $i -lt 100 ]; do sleep 0.05; i=$((i+1)); done; exit 0";
    let command = EntryCommand::new("sh").with_args(["-c", script]);

    let supervised = Supervisor::new().start(&command).unwrap();
    let started = Instant::now();
    kill(Pid::this(), Signal::SIGTERM).unwrap();
    let code = supervised.wait().unwrap();

    // Before the trap is set the default action applies (143); after it, 7.
    assert!(code == 7 || code == 128 + 15, "unexpected exit code {code}");
    assert!(
        started.elapsed() < Duration::from_secs(4),
        "signal was not forwarded promptly ({:?})",
        started.elapsed()
    );
}
