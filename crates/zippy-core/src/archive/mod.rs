//! Archive container.
//!
//! A zippy archive is a single file: an executable launch prefix followed by
//! a standard zip archive. Readers locate the archive by trailer scan from the
//! end of the file, so the same file can be executed directly and opened with
//! ordinary zip tooling.
//!
//! # Layout
//!
//! ```text
//! #!/usr/bin/env zippy-run      <- launch prefix (or a runtime executable)
//! PK..                          <- zip archive
//!   __zippy__.json              <- manifest / marker
//!   app/main.sh                 <- application source at the root
//!   deps/helper.sh              <- installed dependencies
//! ```

mod layout;
mod reader;
mod writer;

pub use layout::{archive_name, deps_entry_name, is_safe_entry_name, EntryPoint, Manifest};
pub use reader::Archive;
pub use writer::{ArchiveWriter, LaunchPrefix};
