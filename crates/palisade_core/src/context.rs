//! Shared services handed to plugins and loaders.
//!
//! A [`Context`] bundles the plugin manager, the directory layout, and a
//! type-keyed registry of framework libraries (command routing, covalence,
//! timers...). Plugins reach shared machinery through it instead of
//! holding references to server internals.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::args::HookValue;
use crate::config::FrameworkConfig;
use crate::manager::PluginManager;

/// Server-side services shared with every plugin.
pub struct Context {
    manager: Arc<PluginManager>,
    libraries: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl Context {
    pub fn new(
        manager: Arc<PluginManager>,
        config_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            libraries: RwLock::new(HashMap::new()),
            config_dir: config_dir.into(),
            data_dir: data_dir.into(),
        })
    }

    /// Builds a context with the directory layout from a framework config.
    pub fn from_config(manager: Arc<PluginManager>, config: &FrameworkConfig) -> Arc<Self> {
        Self::new(
            manager,
            &config.directories.config_dir,
            &config.directories.data_dir,
        )
    }

    /// Returns the plugin manager backing this context.
    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    /// Registers a shared library instance, keyed by its concrete type.
    ///
    /// Registering a second instance of the same type replaces the first.
    pub fn register_library<T: Any + Send + Sync>(&self, library: Arc<T>) {
        let mut libraries = self
            .libraries
            .write()
            .unwrap_or_else(|e| e.into_inner());
        libraries.insert(TypeId::of::<T>(), library);
    }

    /// Looks up a previously registered library by type.
    pub fn library<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let libraries = self
            .libraries
            .read()
            .unwrap_or_else(|e| e.into_inner());
        let entry = libraries.get(&TypeId::of::<T>())?.clone();
        entry.downcast::<T>().ok()
    }

    /// Broadcasts a hook to every subscribed plugin.
    ///
    /// Convenience for `context.manager().call_hook(...)`.
    pub fn call_hook(&self, hook: &str, args: &mut [HookValue]) -> Option<HookValue> {
        self.manager.call_hook(hook, args)
    }

    /// Directory where plugin config files live.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Directory where plugin data files live.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config_dir", &self.config_dir)
            .field("data_dir", &self.data_dir)
            .field("plugins", &self.manager.plugin_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Plugin;

    struct Timers {
        resolution_ms: u64,
    }

    #[test]
    fn libraries_round_trip_by_type() {
        let context = Context::new(PluginManager::new(), "config", "data");
        context.register_library(Arc::new(Timers { resolution_ms: 10 }));

        let timers = context.library::<Timers>().unwrap();
        assert_eq!(timers.resolution_ms, 10);
        assert!(context.library::<String>().is_none());
    }

    #[test]
    fn registering_same_type_replaces() {
        let context = Context::new(PluginManager::new(), "config", "data");
        context.register_library(Arc::new(Timers { resolution_ms: 10 }));
        context.register_library(Arc::new(Timers { resolution_ms: 50 }));

        assert_eq!(context.library::<Timers>().unwrap().resolution_ms, 50);
    }

    #[test]
    fn call_hook_routes_through_manager() {
        let manager = PluginManager::new();
        let plugin = Plugin::builder("Echo", "Echo", "tests", "1.0.0")
            .hook("OnPing", crate::args::HookSignature::empty(), |_, _| {
                Ok(Some(HookValue::Int(7)))
            })
            .build();
        manager.add_plugin(plugin).unwrap();

        let context = Context::new(manager, "config", "data");
        assert_eq!(context.call_hook("OnPing", &mut []), Some(HookValue::Int(7)));
    }

    #[test]
    fn directories_come_from_config() {
        let mut config = FrameworkConfig::default();
        config.directories.config_dir = "srv/conf".to_string();
        config.directories.data_dir = "srv/data".to_string();

        let context = Context::from_config(PluginManager::new(), &config);
        assert_eq!(context.config_dir(), Path::new("srv/conf"));
        assert_eq!(context.data_dir(), Path::new("srv/data"));
    }
}
