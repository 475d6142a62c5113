//! zippy-run - runtime launcher for zippy archives.
//!
//! Invoked by an archive's shebang line as `zippy-run <archive> [args..]`.
//! When the executable itself carries a payload (a stub-prefixed archive) it
//! runs that payload and passes every argument through.
//!
//! Arguments are not parsed here: everything after the archive belongs to the
//! entry point. Logging is controlled by `ZIPPY_LOG` only.

use anyhow::{bail, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::{debug, Level};
use zippy_core::{runtime, RuntimeConfig};

fn main() {
    zippy_cli::init_logging(false, Level::WARN);

    match run(std::env::args_os().skip(1).collect()) {
        Ok(code) => std::process::exit(code),
        Err(e) => std::process::exit(zippy_cli::report("zippy-run", &e)),
    }
}

fn run(mut args: Vec<OsString>) -> Result<i32> {
    let archive = match runtime::self_archive()? {
        Some(exe) => {
            debug!("Booting embedded payload of {}", exe.display());
            exe
        }
        None => {
            if args.is_empty() {
                bail!("usage: zippy-run <archive> [args...]");
            }
            PathBuf::from(args.remove(0))
        }
    };

    Ok(runtime::launch(&archive, &args, &RuntimeConfig::from_env())?)
}
