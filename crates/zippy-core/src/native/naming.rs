//! Module naming and the host's native-module suffix conventions.
//!
//! A dotted module name `pkg.sub.fast` maps to the relative path
//! `pkg/sub/fast`, which is then tried with each host suffix in order, most
//! specific first:
//!
//! | Platform | Trial order |
//! |----------|-------------|
//! | Linux    | `.zippy1-x86_64-linux-gnu.so`, `.abi1.so`, `.so` |
//! | macOS    | `.zippy1-aarch64-darwin.so`, `.abi1.so`, `.so`, `.dylib` |
//! | Windows  | `.zippy1-x86_64-windows.dll`, `.dll` |

use crate::config::LoaderConfig;
use crate::error::{Result, ZippyError};
use crate::platform;

/// Native-module filename suffixes recognized on this host, most specific first.
pub fn host_suffixes() -> Vec<String> {
    let abi = LoaderConfig::MODULE_ABI_VERSION;
    let arch = std::env::consts::ARCH;

    #[cfg(target_os = "linux")]
    {
        let env = if cfg!(target_env = "musl") { "musl" } else { "gnu" };
        vec![
            format!(".zippy{}-{}-linux-{}.so", abi, arch, env),
            format!(".abi{}.so", abi),
            ".so".to_string(),
        ]
    }

    #[cfg(target_os = "macos")]
    {
        vec![
            format!(".zippy{}-{}-darwin.so", abi, arch),
            format!(".abi{}.so", abi),
            ".so".to_string(),
            ".dylib".to_string(),
        ]
    }

    #[cfg(windows)]
    {
        vec![format!(".zippy{}-{}-windows.dll", abi, arch), ".dll".to_string()]
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
    {
        vec![
            format!(".zippy{}-{}-{}.so", abi, arch, platform::current_platform()),
            format!(".abi{}.so", abi),
            ".so".to_string(),
        ]
    }
}

/// Validate a dotted module name.
pub fn validate_module_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| ZippyError::InvalidModuleName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(invalid("contains a path separator"));
    }
    if name.split('.').any(str::is_empty) {
        return Err(invalid("empty component"));
    }
    Ok(())
}

/// Relative path of a module without suffix: `pkg.sub.fast` -> `pkg/sub/fast`.
pub fn module_path(name: &str) -> Result<String> {
    validate_module_name(name)?;
    Ok(name.replace('.', "/"))
}

/// Every filename the module could have on this host, in trial order.
pub fn candidate_filenames(name: &str) -> Result<Vec<String>> {
    let base = module_path(name)?;
    Ok(host_suffixes()
        .into_iter()
        .map(|suffix| format!("{}{}", base, suffix))
        .collect())
}

/// Last path component of an archive entry name.
pub fn base_filename(entry: &str) -> &str {
    entry.rsplit('/').next().unwrap_or(entry)
}

/// Platform name used in diagnostics.
pub fn host_platform() -> &'static str {
    platform::current_platform()
}
