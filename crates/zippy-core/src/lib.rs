//! # zippy-core
//!
//! Self-executing application archives.
//!
//! An archive is a launch prefix (a shebang line or a runtime stub) followed by
//! a zip payload holding the application sources, its installed dependencies
//! under `deps/`, and a small manifest. At launch the payload is extracted to
//! a working directory, the bundle's directories are put in front of the
//! search paths, and the entry point is started: scripts as a supervised child
//! process, native modules in-process.
//!
//! Native modules requested at runtime are loaded straight out of the archive
//! through an anonymous memory-backed file where the platform allows it, and
//! through a temporary file otherwise.
//!
//! ## Modules
//!
//! - [`archive`] - container format and payload layout
//! - [`build`] - archive build pipeline
//! - [`runtime`] - extraction and bootstrap
//! - [`search_path`] - ordered search path lists
//! - [`native`] - native module resolution and loading
//! - [`process`] - child process supervision
//! - [`platform`] - OS-specific helpers
//!
//! ## Example
//!
//! ```rust,no_run
//! use zippy_core::archive::EntryPoint;
//! use zippy_core::build::ArchiveBuilder;
//! use zippy_core::{runtime, RuntimeConfig};
//!
//! let report = ArchiveBuilder::new("./myapp", "./myapp.zpy", EntryPoint::script("app/main.sh"))
//!     .build()?;
//! let code = runtime::launch(&report.output, &[], &RuntimeConfig::from_env())?;
//! std::process::exit(code);
//! # Ok::<(), zippy_core::ZippyError>(())
//! ```

pub mod archive;
pub mod build;
pub mod config;
pub mod error;
pub mod native;
pub mod platform;
pub mod process;
pub mod runtime;
pub mod search_path;

pub use archive::{Archive, ArchiveWriter, EntryPoint, LaunchPrefix, Manifest};
pub use build::{ArchiveBuilder, BuildReport, DependencyInstaller, DependencySource};
pub use config::RuntimeConfig;
pub use error::{Result, ZippyError};
pub use native::{ModuleImporter, NativeModule};
pub use runtime::{launch, Bootstrap, ExtractionRoot, RootOrigin};
pub use search_path::{SearchEnvironment, SearchPath};
