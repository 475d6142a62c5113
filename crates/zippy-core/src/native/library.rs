//! Dynamic library handles.
//!
//! Thin wrapper over the platform's dynamic loader. Handles are never closed:
//! once a native image is bound it stays mapped for the lifetime of the
//! process, the same as any normally imported native module.

#![allow(unsafe_code)]

use crate::error::{Result, ZippyError};
use std::path::Path;

/// A loaded shared library image.
pub struct Library {
    handle: LibraryHandle,
    /// Path the image was loaded from (may be a `/proc/self/fd` alias).
    origin: String,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("origin", &self.origin).finish()
    }
}

impl Library {
    /// Load a shared library from a path.
    ///
    /// # Platform Behavior
    /// - **Unix**: `dlopen(path, RTLD_NOW | RTLD_LOCAL)`, so unresolved symbols
    ///   fail here rather than at first call
    /// - **Other platforms**: unsupported
    pub fn open(module: &str, path: &Path) -> Result<Self> {
        let origin = path
            .to_str()
            .ok_or_else(|| ZippyError::load(module, format!("non UTF-8 path {:?}", path)))?
            .to_string();
        let handle = LibraryHandle::load(module, &origin)?;
        Ok(Self { handle, origin })
    }

    /// Path the image was loaded from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether the image exports a symbol.
    pub fn has_symbol(&self, name: &str) -> bool {
        self.handle.address(name).is_some()
    }

    /// Get a function pointer (or other pointer-sized value) by name.
    ///
    /// # Safety
    ///
    /// `T` must be a pointer-sized type matching the symbol's real type, and
    /// the value must not outlive the process (images are never unloaded, so
    /// that holds for function pointers).
    pub unsafe fn get<T: Copy>(&self, name: &str) -> Option<T> {
        debug_assert_eq!(
            std::mem::size_of::<T>(),
            std::mem::size_of::<*mut std::ffi::c_void>()
        );
        let address = self.handle.address(name)?;
        // SAFETY: caller guarantees T is pointer-sized and matches the symbol.
        Some(unsafe { std::mem::transmute_copy::<*mut std::ffi::c_void, T>(&address) })
    }
}

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(not(unix))]
type LibraryHandle = UnsupportedLibrary;

#[cfg(unix)]
struct UnixLibrary {
    handle: std::ptr::NonNull<std::ffi::c_void>,
}

// SAFETY: a dlopen handle is process-global and the dl* functions are
// thread-safe; the handle is never closed, so it cannot dangle.
#[cfg(unix)]
unsafe impl Send for UnixLibrary {}
#[cfg(unix)]
unsafe impl Sync for UnixLibrary {}

#[cfg(unix)]
impl UnixLibrary {
    fn load(module: &str, path: &str) -> Result<Self> {
        use std::ffi::CString;

        let c_path = CString::new(path)
            .map_err(|e| ZippyError::load(module, format!("invalid path: {}", e)))?;

        // SAFETY: c_path is a valid NUL-terminated string for the call's duration.
        // Loading runs the image's initializers; that is the point of the call.
        let raw = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };

        match std::ptr::NonNull::new(raw) {
            Some(handle) => Ok(Self { handle }),
            None => Err(ZippyError::load(
                module,
                format!("{}: {}", path, last_dl_error()),
            )),
        }
    }

    fn address(&self, name: &str) -> Option<*mut std::ffi::c_void> {
        let c_name = std::ffi::CString::new(name).ok()?;
        // SAFETY: the handle came from a successful dlopen and is never closed.
        let address = unsafe { libc::dlsym(self.handle.as_ptr(), c_name.as_ptr()) };
        if address.is_null() {
            None
        } else {
            Some(address)
        }
    }
}

#[cfg(unix)]
fn last_dl_error() -> String {
    // SAFETY: dlerror returns either NULL or a NUL-terminated string owned by
    // the loader, valid until the next dl* call on this thread.
    unsafe {
        let err = libc::dlerror();
        if err.is_null() {
            "unknown dynamic loader error".to_string()
        } else {
            std::ffi::CStr::from_ptr(err).to_string_lossy().into_owned()
        }
    }
}

#[cfg(not(unix))]
struct UnsupportedLibrary;

#[cfg(not(unix))]
impl UnsupportedLibrary {
    fn load(module: &str, _path: &str) -> Result<Self> {
        Err(ZippyError::load(
            module,
            "native modules are not supported on this platform",
        ))
    }

    fn address(&self, _name: &str) -> Option<*mut std::ffi::c_void> {
        None
    }
}
