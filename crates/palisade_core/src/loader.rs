//! Plugin discovery and lifecycle.
//!
//! A [`PluginLoader`] knows how to produce plugins from some source and
//! drives their lifecycle: construct, configure, add to the manager, fire
//! `Init`, and the reverse on unload. [`CatalogLoader`] is the in-process
//! implementation; plugins register a constructor under their name.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use crate::args::HookValue;
use crate::context::Context;
use crate::error::PluginError;
use crate::plugin::{panic_message, Plugin};

/// Produces and tears down plugins from one source.
#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// Names of the plugins this loader can produce.
    async fn scan(&self) -> Vec<String>;

    /// Construct, configure, and start the named plugin.
    async fn load(&self, name: &str, context: &Arc<Context>) -> Result<Arc<Plugin>, PluginError>;

    /// Stop and remove a loaded plugin.
    async fn unload(&self, name: &str, context: &Arc<Context>) -> Result<(), PluginError>;

    /// Unload then load again. Loaders whose factories build fresh
    /// instances get a true reload from the default implementation.
    async fn reload(&self, name: &str, context: &Arc<Context>) -> Result<Arc<Plugin>, PluginError> {
        self.unload(name, context).await?;
        self.load(name, context).await
    }
}

type PluginFactoryFn = dyn Fn() -> Arc<Plugin> + Send + Sync;

/// Loads plugins from registered constructor functions.
#[derive(Default)]
pub struct CatalogLoader {
    factories: DashMap<String, Arc<PluginFactoryFn>>,
}

impl CatalogLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a plugin name. Registering the same
    /// name again replaces the previous factory.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    fn factory(&self, name: &str) -> Option<Arc<PluginFactoryFn>> {
        self.factories.get(name).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl PluginLoader for CatalogLoader {
    async fn scan(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    async fn load(&self, name: &str, context: &Arc<Context>) -> Result<Arc<Plugin>, PluginError> {
        let factory = self
            .factory(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        // A constructor is plugin code too: a panic must not take the
        // host down, it fails this one load.
        let plugin = catch_unwind(AssertUnwindSafe(|| factory())).map_err(|payload| {
            PluginError::LoadFailed {
                plugin: name.to_string(),
                reason: panic_message(payload),
            }
        })?;
        if plugin.name() != name {
            return Err(PluginError::LoadFailed {
                plugin: name.to_string(),
                reason: format!("factory produced plugin '{}'", plugin.name()),
            });
        }

        plugin.set_config_path(context.config_dir().join(format!("{name}.json")));
        if let Err(err) = plugin.load_config() {
            // Defaults stay in effect; the plugin records the failure.
            plugin.raise_error(format!("Failed to load config: {err}"));
        }

        context.manager().add_plugin(plugin.clone())?;
        plugin.call_hook("Init", &mut []);
        plugin.set_loaded(true);
        context
            .manager()
            .call_hook("OnPluginLoaded", &mut [HookValue::Text(name.to_string())]);

        info!(
            "Loaded plugin {} v{} by {}",
            plugin.title(),
            plugin.version(),
            plugin.author()
        );
        Ok(plugin)
    }

    async fn unload(&self, name: &str, context: &Arc<Context>) -> Result<(), PluginError> {
        let plugin = context
            .manager()
            .get_plugin(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        plugin.call_hook("Unload", &mut []);
        plugin.set_loaded(false);
        context.manager().remove_plugin(name)?;
        context
            .manager()
            .call_hook("OnPluginUnloaded", &mut [HookValue::Text(name.to_string())]);

        info!(
            "Unloaded plugin {} v{} by {}",
            plugin.title(),
            plugin.version(),
            plugin.author()
        );
        Ok(())
    }
}

impl std::fmt::Debug for CatalogLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogLoader")
            .field("plugins", &self.factories.len())
            .finish()
    }
}
