//! Shared plumbing for the `zippy` and `zippy-run` binaries.

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zippy_core::ZippyError;

/// Environment variable holding a tracing filter, e.g. `ZIPPY_LOG=debug`.
pub const LOG_ENV: &str = "ZIPPY_LOG";

/// Install the stderr subscriber.
///
/// `--debug` wins; otherwise `ZIPPY_LOG` is used when set, else `default`.
/// Logs go to stderr so the entry program owns stdout.
pub fn init_logging(debug: bool, default: Level) {
    let filter = if debug {
        EnvFilter::new(Level::DEBUG.as_str())
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default.as_str()))
    };

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<ZippyError>()
        .map(ZippyError::exit_code)
        .unwrap_or(1)
}

/// Print a failure and return the exit code to use.
pub fn report(program: &str, err: &anyhow::Error) -> i32 {
    eprintln!("{}: {:#}", program, err);
    exit_code(err)
}
