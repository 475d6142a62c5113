//! A minimal native module implementing the zippy module ABI.
//!
//! Built as a `cdylib` and packed into archives by the integration tests.

use std::ffi::{c_char, c_int, CStr};
use std::sync::atomic::{AtomicU32, Ordering};

static INIT_CALLS: AtomicU32 = AtomicU32::new(0);

/// Called once when the module is bound.
#[no_mangle]
pub extern "C" fn zippy_module_init() -> c_int {
    INIT_CALLS.fetch_add(1, Ordering::SeqCst);
    0
}

/// How often `zippy_module_init` ran in this image.
#[no_mangle]
pub extern "C" fn zippy_fixture_init_calls() -> u32 {
    INIT_CALLS.load(Ordering::SeqCst)
}

#[no_mangle]
pub extern "C" fn zippy_fixture_answer() -> c_int {
    42
}

/// Entry point for the in-process run mode.
///
/// Returns the integer given as the first argument after the program name,
/// 0 without arguments and 64 when it is not a number.
///
/// # Safety
///
/// `argv` must hold `argc` valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn zippy_main(argc: c_int, argv: *const *const c_char) -> c_int {
    if argc < 2 || argv.is_null() {
        return 0;
    }
    let arg = unsafe { *argv.add(1) };
    if arg.is_null() {
        return 0;
    }
    unsafe { CStr::from_ptr(arg) }
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(64)
}
