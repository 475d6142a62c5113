//! In-memory native module loading.
//!
//! When the running program asks for a native module by dotted name, the
//! [`ModuleImporter`] consults its resolver chain in order. The
//! [`ArchiveResolver`] sits first: it maps the name to an archive entry using
//! the host's suffix conventions, reads the entry's bytes, and stages them in
//! an anonymous memory-backed descriptor whose `/proc/self/fd/N` alias is
//! handed to the dynamic loader. If that technique is unavailable or the
//! loader rejects the alias, the bytes are written to a temporary file and
//! loaded from there instead; callers see the same bound module either way.
//!
//! ```rust,no_run
//! use zippy_core::native::ModuleImporter;
//! use zippy_core::{RuntimeConfig, SearchPath};
//!
//! # fn main() -> zippy_core::Result<()> {
//! let importer = ModuleImporter::for_archive(
//!     "/path/to/app.zpy",
//!     SearchPath::new(),
//!     &RuntimeConfig::new(),
//! )?;
//! let module = importer.import("mod_native")?;
//! assert!(module.has_symbol("zippy_main") || !module.is_runnable());
//! # Ok(())
//! # }
//! ```

mod importer;
mod library;
mod module;
mod naming;
mod resolver;
mod stager;

pub use importer::{global, import, install_global, ModuleImporter};
pub use library::Library;
pub use module::NativeModule;
pub use naming::{
    base_filename, candidate_filenames, host_platform, host_suffixes, module_path,
    validate_module_name,
};
pub use resolver::{ArchiveResolver, FilesystemResolver, ModuleResolver, Resolution};
pub use stager::{ImageStager, LoadSource, MemfdStager, StagedImage, TempFileStager};
