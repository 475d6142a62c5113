//! Ordered search path lists.
//!
//! After extraction the bundle's dependency directory and its root are put in
//! front of whatever the environment already provides, so bundled copies
//! shadow environment-provided ones:
//!
//! ```text
//! [<root>/deps, <root>, ...inherited]
//! ```

use crate::config::{LayoutConfig, SearchPathConfig};
use crate::error::{Result, ZippyError};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An ordered list of directories; earlier entries win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from directories, dropping empty entries and duplicates.
    pub fn from_dirs<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut path = Self::new();
        for dir in dirs {
            path.push(dir);
        }
        path
    }

    /// Parse a platform path-list value (`:`-separated on Unix).
    pub fn from_value(value: &OsStr) -> Self {
        Self::from_dirs(std::env::split_paths(value))
    }

    /// Read a path-list environment variable; unset means empty.
    pub fn from_env(var: &str) -> Self {
        std::env::var_os(var)
            .map(|value| Self::from_value(&value))
            .unwrap_or_default()
    }

    /// `[root/deps, root, ...inherited]`.
    pub fn for_bundle(root: &Path, inherited: &SearchPath) -> Self {
        let mut path = Self::from_dirs([root.join(LayoutConfig::DEPS_DIR), root.to_path_buf()]);
        for dir in &inherited.dirs {
            path.push(dir.clone());
        }
        path
    }

    fn push(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if dir.as_os_str().is_empty() || self.dirs.contains(&dir) {
            return;
        }
        self.dirs.push(dir);
    }

    /// Put a directory in front; an existing occurrence moves to the front.
    pub fn prepend(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.dirs.retain(|d| d != &dir);
        self.dirs.insert(0, dir);
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// First directory containing `relative`, joined with it.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Option<PathBuf> {
        let relative = relative.as_ref();
        self.dirs
            .iter()
            .map(|dir| dir.join(relative))
            .find(|candidate| candidate.is_file())
    }

    /// Render as a platform path-list value.
    pub fn to_env_value(&self) -> Result<OsString> {
        std::env::join_paths(&self.dirs).map_err(|e| ZippyError::Config {
            message: format!("Cannot build search path: {}", e),
        })
    }
}

/// The module and library search paths published to the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEnvironment {
    pub module_path: SearchPath,
    pub library_path: SearchPath,
}

impl SearchEnvironment {
    /// Extend the inherited variables of the current process with the bundle.
    pub fn for_bundle(root: &Path) -> Self {
        Self::for_bundle_with(
            root,
            &SearchPath::from_env(SearchPathConfig::MODULE_PATH_ENV),
            &SearchPath::from_env(SearchPathConfig::library_path_env()),
        )
    }

    /// Same as [`SearchEnvironment::for_bundle`] with explicit inherited lists.
    pub fn for_bundle_with(root: &Path, modules: &SearchPath, libraries: &SearchPath) -> Self {
        Self {
            module_path: SearchPath::for_bundle(root, modules),
            library_path: SearchPath::for_bundle(root, libraries),
        }
    }

    /// `(variable, value)` pairs to publish.
    pub fn vars(&self) -> Result<Vec<(&'static str, OsString)>> {
        Ok(vec![
            (
                SearchPathConfig::MODULE_PATH_ENV,
                self.module_path.to_env_value()?,
            ),
            (
                SearchPathConfig::library_path_env(),
                self.library_path.to_env_value()?,
            ),
        ])
    }

    /// Publish into the current process environment.
    pub fn export(&self) -> Result<()> {
        for (key, value) in self.vars()? {
            debug!("export {}={}", key, value.to_string_lossy());
            std::env::set_var(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bundle_order() {
        let inherited = SearchPath::from_dirs(["/opt/lib", "/usr/lib"]);
        let path = SearchPath::for_bundle(Path::new("/tmp/run1"), &inherited);

        assert_eq!(
            path.dirs(),
            &[
                PathBuf::from("/tmp/run1/deps"),
                PathBuf::from("/tmp/run1"),
                PathBuf::from("/opt/lib"),
                PathBuf::from("/usr/lib"),
            ]
        );
    }

    #[test]
    fn test_duplicates_and_empties_dropped() {
        let path = SearchPath::from_dirs(["/a", "", "/b", "/a"]);
        assert_eq!(path.dirs(), &[PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_prepend_moves_existing() {
        let mut path = SearchPath::from_dirs(["/a", "/b"]);
        path.prepend("/b");
        assert_eq!(path.dirs(), &[PathBuf::from("/b"), PathBuf::from("/a")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_env_value_round_trip() {
        let path = SearchPath::from_value(OsStr::new("/a::/b"));
        assert_eq!(path.dirs().len(), 2);
        assert_eq!(path.to_env_value().unwrap(), OsString::from("/a:/b"));
    }

    #[test]
    fn test_deps_copy_shadows_inherited_copy() {
        let root = TempDir::new().unwrap();
        let external = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("deps")).unwrap();
        std::fs::write(root.path().join("deps/helper.sh"), "bundled").unwrap();
        std::fs::write(external.path().join("helper.sh"), "external").unwrap();

        let inherited = SearchPath::from_dirs([external.path()]);
        let path = SearchPath::for_bundle(root.path(), &inherited);

        let found = path.resolve("helper.sh").unwrap();
        assert_eq!(found, root.path().join("deps/helper.sh"));
        assert_eq!(std::fs::read_to_string(found).unwrap(), "bundled");
    }

    #[test]
    fn test_resolve_falls_through_to_inherited() {
        let root = TempDir::new().unwrap();
        let external = TempDir::new().unwrap();
        std::fs::write(external.path().join("only_here.sh"), "x").unwrap();

        let path = SearchPath::for_bundle(root.path(), &SearchPath::from_dirs([external.path()]));
        assert_eq!(
            path.resolve("only_here.sh"),
            Some(external.path().join("only_here.sh"))
        );
        assert_eq!(path.resolve("nowhere.sh"), None);
    }

    #[test]
    fn test_environment_vars() {
        let env = SearchEnvironment::for_bundle_with(
            Path::new("/tmp/run1"),
            &SearchPath::new(),
            &SearchPath::from_dirs(["/usr/local/lib"]),
        );
        let vars = env.vars().unwrap();

        assert_eq!(vars[0].0, SearchPathConfig::MODULE_PATH_ENV);
        assert_eq!(vars[1].0, SearchPathConfig::library_path_env());
        let libs = SearchPath::from_value(&vars[1].1);
        assert_eq!(libs.dirs().last().unwrap(), &PathBuf::from("/usr/local/lib"));
        assert_eq!(libs.dirs()[0], PathBuf::from("/tmp/run1/deps"));
    }
}
