//! Process supervision for script entry points.
//!
//! A script entry runs as a child of the launcher. The launcher stays in the
//! foreground, forwards SIGINT/SIGTERM to the child and exits with the
//! child's code once it is reaped.
//!
//! # Example
//!
//! ```rust,no_run
//! use zippy_core::process::{EntryCommand, Supervisor};
//!
//! let command = EntryCommand::new("/tmp/run1/app/main.sh").with_args(["--verbose"]);
//! let code = Supervisor::new().run(&command)?;
//! std::process::exit(code);
//! # Ok::<(), zippy_core::ZippyError>(())
//! ```

mod child;
#[cfg(unix)]
mod signals;
mod supervisor;

pub use child::{ChildHandle, ChildState, EntryCommand};
pub use supervisor::{Supervised, Supervisor};
