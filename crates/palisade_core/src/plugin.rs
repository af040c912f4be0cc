//! The plugin abstraction.
//!
//! A [`Plugin`] wraps one loaded script unit: its identity, its hook table,
//! its timing telemetry, its config, the covalence commands it declares,
//! and the observers other components hang on its removal and error
//! transitions. Plugins are built with [`PluginBuilder`] (usually through
//! the [`bind_hooks!`](crate::bind_hooks) macro) and then shared as
//! `Arc<Plugin>`.

use std::any::Any;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use serde_json::Value;
use tracing::{error, warn};

use crate::args::{HookSignature, HookValue};
use crate::config::PluginConfig;
use crate::error::{ConfigError, HookError};
use crate::manager::PluginManager;
use crate::table::HookTable;
use crate::telemetry::HookTelemetry;

/// Observer fired while a plugin is being removed from its manager.
pub type RemovalObserverFn = dyn Fn(&Plugin) + Send + Sync;

/// Observer fired when a plugin raises an error.
pub type ErrorObserverFn = dyn Fn(&Plugin, &str) + Send + Sync;

/// A covalence command declared by a plugin: the aliases it answers to,
/// the permissions a caller must hold, and the hook method that serves it.
#[derive(Debug, Clone)]
pub struct CovalenceCommandSpec {
    pub aliases: Vec<String>,
    pub permissions: Vec<String>,
    pub method: String,
}

/// One loaded plugin.
pub struct Plugin {
    name: String,
    title: String,
    author: String,
    version: String,
    is_core: bool,
    loaded: AtomicBool,
    hooks: HookTable,
    telemetry: HookTelemetry,
    manager: Mutex<Weak<PluginManager>>,
    config: Mutex<PluginConfig>,
    covalence_commands: Mutex<Vec<CovalenceCommandSpec>>,
    last_error: Mutex<Option<String>>,
    removal_observers: Mutex<Vec<(String, Arc<RemovalObserverFn>)>>,
    error_observers: Mutex<Vec<(String, Arc<ErrorObserverFn>)>>,
}

impl Plugin {
    pub fn builder(
        name: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        version: impl Into<String>,
    ) -> PluginBuilder {
        PluginBuilder::new(name, title, author, version)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Core plugins are privileged: their commands cannot be overridden,
    /// they may subscribe to internal hooks, and they skip telemetry.
    pub fn is_core(&self) -> bool {
        self.is_core
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::SeqCst);
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    pub fn telemetry(&self) -> &HookTelemetry {
        &self.telemetry
    }

    /// The manager this plugin is currently added to, if any.
    pub fn manager(&self) -> Option<Arc<PluginManager>> {
        self.lock(&self.manager).upgrade()
    }

    /// Call a hook on this plugin.
    ///
    /// Every method bound to `hook` runs in table order against the shared
    /// argument slice; the last method's return value is the result. A
    /// handler error or panic aborts the remaining methods, is logged, and
    /// yields `None`; the caller is never crashed by a plugin.
    pub fn call_hook(&self, hook: &str, args: &mut [HookValue]) -> Option<HookValue> {
        self.dispatch_hook(hook, args).ok().flatten()
    }

    /// Like [`call_hook`](Self::call_hook), but surfaces the failure so the
    /// manager can count it. The error is already logged here.
    pub(crate) fn dispatch_hook(
        &self,
        hook: &str,
        args: &mut [HookValue],
    ) -> Result<Option<HookValue>, HookError> {
        let methods = self.hooks.methods(hook);
        if methods.is_empty() {
            return Ok(None);
        }

        let depth = self.telemetry.enter();
        let started = (depth == 0 && !self.is_core).then(Instant::now);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut last = None;
            for method in methods {
                last = method.invoke(self, args)?;
            }
            Ok::<_, HookError>(last)
        }));

        if let Some(started) = started {
            let report = self.telemetry.record(hook, started.elapsed());
            if let Some(duration) = report.slow_call {
                warn!(
                    "Calling hook '{}' on plugin '{} v{}' took {}ms",
                    hook,
                    self.name,
                    self.version,
                    duration.as_millis()
                );
            }
            if let Some(average) = report.window_average {
                warn!(
                    "Calling hook '{}' on plugin '{} v{}' took average {}ms",
                    hook,
                    self.name,
                    self.version,
                    average.as_millis()
                );
            }
        }
        self.telemetry.exit();

        let result = match outcome {
            Ok(inner) => inner,
            Err(payload) => Err(HookError::Panicked(panic_message(payload))),
        };
        if let Err(err) = &result {
            error!(
                "Failed to call hook '{}' on plugin '{} v{}': {}",
                hook, self.name, self.version, err
            );
        }
        result
    }

    /// Run a command callback under the same telemetry and panic boundary
    /// as a hook call.
    pub fn invoke_command(&self, command: &str, run: impl FnOnce()) {
        let depth = self.telemetry.enter();
        let started = (depth == 0 && !self.is_core).then(Instant::now);

        let outcome = catch_unwind(AssertUnwindSafe(run));

        if let Some(started) = started {
            let report = self
                .telemetry
                .record(&format!("command.{command}"), started.elapsed());
            if let Some(duration) = report.slow_call {
                warn!(
                    "Executing command '{}' on plugin '{} v{}' took {}ms",
                    command,
                    self.name,
                    self.version,
                    duration.as_millis()
                );
            }
        }
        self.telemetry.exit();

        if let Err(payload) = outcome {
            error!(
                "Failed to run command '{}' on plugin '{} v{}': {}",
                command,
                self.name,
                self.version,
                panic_message(payload)
            );
        }
    }

    /// Record an error against this plugin: logged, stored, and delivered
    /// to every error observer.
    pub fn raise_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("Plugin '{} v{}' error: {}", self.name, self.version, message);
        *self.lock(&self.last_error) = Some(message.clone());

        let observers: Vec<Arc<ErrorObserverFn>> = self
            .lock(&self.error_observers)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(self, &message);
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock(&self.last_error).clone()
    }

    /// Register a removal observer under `key`; registering the same key
    /// again replaces the previous observer, so repeat registration is
    /// idempotent. Observers fire once, during removal, and are dropped
    /// afterwards.
    pub fn on_removed(
        &self,
        key: impl Into<String>,
        observer: impl Fn(&Plugin) + Send + Sync + 'static,
    ) {
        Self::install(&mut self.lock(&self.removal_observers), key.into(), Arc::new(observer));
    }

    /// Register an error observer under `key`, with the same replace-on-key
    /// semantics as [`on_removed`](Self::on_removed).
    pub fn on_error(
        &self,
        key: impl Into<String>,
        observer: impl Fn(&Plugin, &str) + Send + Sync + 'static,
    ) {
        Self::install(&mut self.lock(&self.error_observers), key.into(), Arc::new(observer));
    }

    fn install<T: ?Sized>(
        observers: &mut Vec<(String, Arc<T>)>,
        key: String,
        observer: Arc<T>,
    ) {
        if let Some(slot) = observers.iter_mut().find(|(existing, _)| *existing == key) {
            slot.1 = observer;
        } else {
            observers.push((key, observer));
        }
    }

    /// Declare a covalence command served by `method`.
    pub fn add_covalence_command(&self, aliases: &[&str], permissions: &[&str], method: impl Into<String>) {
        let spec = CovalenceCommandSpec {
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            method: method.into(),
        };
        self.lock(&self.covalence_commands).push(spec);
    }

    /// Snapshot of the covalence commands this plugin declares.
    pub fn covalence_commands(&self) -> Vec<CovalenceCommandSpec> {
        self.lock(&self.covalence_commands).clone()
    }

    pub fn set_config_path(&self, path: impl Into<PathBuf>) {
        self.lock(&self.config).set_path(path.into());
    }

    /// Load the plugin's config file: missing files are created from the
    /// declared defaults, unreadable files fall back to the defaults and
    /// surface the failure to the caller.
    pub fn load_config(&self) -> Result<(), ConfigError> {
        self.lock(&self.config).load()
    }

    pub fn save_config(&self) -> Result<(), ConfigError> {
        self.lock(&self.config).save()
    }

    /// Snapshot of the current config document.
    pub fn config(&self) -> Value {
        self.lock(&self.config).document().clone()
    }

    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.lock(&self.config).get(key).cloned()
    }

    pub fn set_config_value(&self, key: &str, value: Value) {
        self.lock(&self.config).set(key, value);
    }

    /// Wire the manager backref and subscribe every hook in the table.
    /// Called by the manager after the plugin enters its loaded set.
    pub(crate) fn handle_added(self: &Arc<Self>, manager: &Arc<PluginManager>) {
        *self.lock(&self.manager) = Arc::downgrade(manager);
        for hook in self.hooks.hook_names() {
            manager.subscribe(hook, self);
        }
    }

    /// Clear the backref and deliver removal observers. The observer list
    /// is consumed, so the removal event unsubscribes itself.
    pub(crate) fn handle_removed(&self) {
        *self.lock(&self.manager) = Weak::new();
        let observers = mem::take(&mut *self.lock(&self.removal_observers));
        for (_, observer) in observers {
            observer(self);
        }
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("is_core", &self.is_core)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Assembles a [`Plugin`].
///
/// Hook bindings added here fire in the order they were added; shared/base
/// layers should therefore bind before the plugin's own hooks.
pub struct PluginBuilder {
    name: String,
    title: String,
    author: String,
    version: String,
    is_core: bool,
    hooks: HookTable,
    default_config: Value,
    covalence_commands: Vec<CovalenceCommandSpec>,
}

impl PluginBuilder {
    fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            author: author.into(),
            version: version.into(),
            is_core: false,
            hooks: HookTable::new(),
            default_config: Value::Object(serde_json::Map::new()),
            covalence_commands: Vec::new(),
        }
    }

    /// Mark the plugin as a privileged core plugin.
    pub fn core(mut self) -> Self {
        self.is_core = true;
        self
    }

    /// Bind a hook method.
    pub fn hook<F>(mut self, hook: impl Into<String>, signature: HookSignature, handler: F) -> Self
    where
        F: Fn(&Plugin, &mut [HookValue]) -> Result<Option<HookValue>, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.bind(hook, signature, handler);
        self
    }

    /// Declare the default config document written on first load.
    pub fn default_config(mut self, defaults: Value) -> Self {
        self.default_config = defaults;
        self
    }

    /// Declare a covalence command served by `method`.
    pub fn covalence_command(
        mut self,
        aliases: &[&str],
        permissions: &[&str],
        method: impl Into<String>,
    ) -> Self {
        self.covalence_commands.push(CovalenceCommandSpec {
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            method: method.into(),
        });
        self
    }

    pub fn build(self) -> Arc<Plugin> {
        Arc::new(Plugin {
            name: self.name,
            title: self.title,
            author: self.author,
            version: self.version,
            is_core: self.is_core,
            loaded: AtomicBool::new(false),
            hooks: self.hooks,
            telemetry: HookTelemetry::new(),
            manager: Mutex::new(Weak::new()),
            config: Mutex::new(PluginConfig::new(self.default_config)),
            covalence_commands: Mutex::new(self.covalence_commands),
            last_error: Mutex::new(None),
            removal_observers: Mutex::new(Vec::new()),
            error_observers: Mutex::new(Vec::new()),
        })
    }
}

/// Bind several hooks on a [`PluginBuilder`] with one declaration per line.
///
/// Two forms exist: `hook => handler` binds with an empty signature, and
/// `hook, signature => handler` declares the parameter list.
#[macro_export]
macro_rules! bind_hooks {
    ($builder:expr; $($hook:expr => $handler:expr),* $(,)?) => {{
        let mut builder = $builder;
        $( builder = builder.hook($hook, $crate::HookSignature::empty(), $handler); )*
        builder
    }};
    ($builder:expr; $($hook:expr, $signature:expr => $handler:expr),* $(,)?) => {{
        let mut builder = $builder;
        $( builder = builder.hook($hook, $signature, $handler); )*
        builder
    }};
}
