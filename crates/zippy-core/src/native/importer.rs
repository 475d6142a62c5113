//! The importer: resolver chain plus the loaded-module registry.
//!
//! Every import goes through [`ModuleImporter::import`], which holds the
//! registry lock for the whole request. A name is resolved and bound at most
//! once; later requests return the cached module.

use super::module::NativeModule;
use super::resolver::{ArchiveResolver, FilesystemResolver, ModuleResolver, Resolution};
use crate::archive::Archive;
use crate::config::RuntimeConfig;
use crate::error::{Result, ZippyError};
use crate::search_path::SearchPath;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

/// Resolves and caches native modules for the process.
pub struct ModuleImporter {
    resolvers: Vec<Box<dyn ModuleResolver>>,
    registry: Mutex<HashMap<String, Arc<NativeModule>>>,
}

impl std::fmt::Debug for ModuleImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleImporter")
            .field("resolvers", &self.resolver_names())
            .finish()
    }
}

impl Default for ModuleImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleImporter {
    /// An importer with an empty chain.
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Append a resolver to the end of the chain.
    pub fn with_resolver(mut self, resolver: impl ModuleResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// The standard chain for a running archive: the archive resolver first,
    /// then the filesystem resolver over `search_path`.
    pub fn for_archive(
        archive: impl AsRef<Path>,
        search_path: SearchPath,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        let mut archive_resolver = ArchiveResolver::new(Archive::open(archive)?);
        if !config.memory_backing {
            archive_resolver = archive_resolver.without_memory_backing();
        }

        Ok(Self::new()
            .with_resolver(archive_resolver)
            .with_resolver(FilesystemResolver::new(search_path)))
    }

    /// Names of the resolvers in consultation order.
    pub fn resolver_names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<NativeModule>>>> {
        self.registry
            .lock()
            .map_err(|e| ZippyError::Other(format!("Failed to acquire module registry lock: {}", e)))
    }

    /// Get-or-load a module; `Ok(None)` when no resolver provides it.
    pub fn find(&self, module: &str) -> Result<Option<Arc<NativeModule>>> {
        let mut registry = self.lock()?;
        if let Some(loaded) = registry.get(module) {
            debug!("{} already loaded", module);
            return Ok(Some(Arc::clone(loaded)));
        }

        for resolver in &self.resolvers {
            match resolver.resolve(module)? {
                Resolution::Found(bound) => {
                    let bound = Arc::new(bound);
                    registry.insert(module.to_string(), Arc::clone(&bound));
                    return Ok(Some(bound));
                }
                Resolution::NotFound => {
                    debug!("{} declined {}", resolver.name(), module);
                }
            }
        }

        Ok(None)
    }

    /// Get-or-load a module; a miss in every resolver is [`ZippyError::ModuleNotFound`].
    pub fn import(&self, module: &str) -> Result<Arc<NativeModule>> {
        self.find(module)?.ok_or_else(|| ZippyError::ModuleNotFound {
            module: module.to_string(),
        })
    }

    /// A previously loaded module, without resolving.
    pub fn get(&self, module: &str) -> Option<Arc<NativeModule>> {
        self.lock().ok()?.get(module).cloned()
    }

    /// Names of all loaded modules, sorted.
    pub fn loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

static GLOBAL_IMPORTER: OnceLock<ModuleImporter> = OnceLock::new();

/// Install the process-wide importer. Fails if one is already installed.
pub fn install_global(importer: ModuleImporter) -> Result<&'static ModuleImporter> {
    GLOBAL_IMPORTER
        .set(importer)
        .map_err(|_| ZippyError::Config {
            message: "A global module importer is already installed".to_string(),
        })?;
    global().ok_or_else(|| ZippyError::Other("global importer vanished".to_string()))
}

/// The process-wide importer, if installed.
pub fn global() -> Option<&'static ModuleImporter> {
    GLOBAL_IMPORTER.get()
}

/// Import through the process-wide importer.
pub fn import(module: &str) -> Result<Arc<NativeModule>> {
    global()
        .ok_or_else(|| ZippyError::Config {
            message: "No global module importer installed".to_string(),
        })?
        .import(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Declines everything and counts how often it was asked.
    struct Counting(Arc<AtomicUsize>);

    impl ModuleResolver for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn resolve(&self, _module: &str) -> Result<Resolution> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Resolution::NotFound)
        }
    }

    /// Fails every request.
    struct Failing;

    impl ModuleResolver for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn resolve(&self, module: &str) -> Result<Resolution> {
            Err(ZippyError::load(module, "boom"))
        }
    }

    #[test]
    fn test_miss_consults_every_resolver_in_order() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let importer = ModuleImporter::new()
            .with_resolver(Counting(Arc::clone(&first)))
            .with_resolver(Counting(Arc::clone(&second)));

        assert_eq!(importer.resolver_names(), vec!["counting", "counting"]);
        assert!(importer.find("absent").unwrap().is_none());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_import_miss_is_module_not_found() {
        let importer = ModuleImporter::new();
        let err = importer.import("absent").unwrap_err();
        assert!(matches!(err, ZippyError::ModuleNotFound { .. }));
        assert!(importer.loaded().is_empty());
    }

    #[test]
    fn test_error_stops_the_chain() {
        let after = Arc::new(AtomicUsize::new(0));
        let importer = ModuleImporter::new()
            .with_resolver(Failing)
            .with_resolver(Counting(Arc::clone(&after)));

        assert!(importer.import("m").is_err());
        assert_eq!(after.load(Ordering::SeqCst), 0);
        assert!(importer.get("m").is_none());
    }
}
