//! Bound native modules.

#![allow(unsafe_code)]

use super::library::Library;
use super::stager::{LoadSource, RetainedImage};
use crate::config::LoaderConfig;
use crate::error::{Result, ZippyError};
use std::ffi::{c_char, c_int, CString, OsString};
use tracing::debug;

/// Signature of the optional module initializer.
type InitFn = unsafe extern "C" fn() -> c_int;
/// Signature of the entry function used by the in-process run mode.
type MainFn = unsafe extern "C" fn(c_int, *const *const c_char) -> c_int;

/// A native module bound into the process.
///
/// Modules are never unloaded; the registry holds them for the process
/// lifetime.
#[derive(Debug)]
pub struct NativeModule {
    name: String,
    source: LoadSource,
    library: Library,
    _retained: Option<RetainedImage>,
}

impl NativeModule {
    /// Bind a freshly loaded image as a module.
    ///
    /// The same procedure runs for archive-staged and search-path images: if the
    /// image exports `zippy_module_init` it is called once and must return 0.
    /// `retained` is whatever keeps the image's staged path valid; the module
    /// holds it for as long as the image is mapped.
    pub(crate) fn bind(
        name: &str,
        library: Library,
        source: LoadSource,
        retained: Option<RetainedImage>,
    ) -> Result<Self> {
        // SAFETY: the init export is declared by the module ABI as
        // `extern "C" fn() -> c_int`.
        if let Some(init) = unsafe { library.get::<InitFn>(LoaderConfig::INIT_SYMBOL) } {
            debug!("Running {} for {}", LoaderConfig::INIT_SYMBOL, name);
            // SAFETY: see above; the image stays mapped for the process lifetime.
            let status = unsafe { init() };
            if status != 0 {
                // The image stays mapped, so its descriptor stays reserved too.
                std::mem::forget(retained);
                return Err(ZippyError::load(
                    name,
                    format!("{} returned {}", LoaderConfig::INIT_SYMBOL, status),
                ));
            }
        }

        Ok(Self {
            name: name.to_string(),
            source,
            library,
            _retained: retained,
        })
    }

    /// Dotted module name it was imported as.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the image was loaded from.
    pub fn source(&self) -> &LoadSource {
        &self.source
    }

    /// Path handed to the dynamic loader.
    pub fn origin(&self) -> &str {
        self.library.origin()
    }

    /// Whether the module exports a symbol.
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.library.has_symbol(symbol)
    }

    /// Look up an exported symbol.
    ///
    /// # Safety
    ///
    /// `T` must be a pointer-sized type matching the symbol's real type.
    pub unsafe fn symbol<T: Copy>(&self, symbol: &str) -> Option<T> {
        // SAFETY: forwarded to the caller.
        unsafe { self.library.get::<T>(symbol) }
    }

    /// Whether the module can be run as an entry point.
    pub fn is_runnable(&self) -> bool {
        self.has_symbol(LoaderConfig::MAIN_SYMBOL)
    }

    /// Call the module's `zippy_main(argc, argv)` and return its exit code.
    pub fn run_main(&self, args: &[OsString]) -> Result<i32> {
        // SAFETY: the main export is declared by the module ABI as
        // `extern "C" fn(c_int, *const *const c_char) -> c_int`.
        let main = unsafe { self.library.get::<MainFn>(LoaderConfig::MAIN_SYMBOL) }
            .ok_or_else(|| {
                ZippyError::load(
                    &self.name,
                    format!("module does not export {}", LoaderConfig::MAIN_SYMBOL),
                )
            })?;

        let c_args = args
            .iter()
            .map(|arg| CString::new(arg.to_string_lossy().into_owned()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ZippyError::Other(format!("argument contains NUL byte: {}", e)))?;
        let mut argv: Vec<*const c_char> = c_args.iter().map(|a| a.as_ptr()).collect();
        argv.push(std::ptr::null());
        let argc = c_int::try_from(c_args.len())
            .map_err(|_| ZippyError::Other("too many arguments".to_string()))?;

        debug!("Calling {}.{} with {} args", self.name, LoaderConfig::MAIN_SYMBOL, argc);
        // SAFETY: argv is a NULL-terminated array of valid C strings that
        // outlives the call.
        Ok(unsafe { main(argc, argv.as_ptr()) })
    }
}
