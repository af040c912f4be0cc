//! The plugin manager: loaded-plugin set, hook subscriptions, and the
//! conflict-aware broadcast.
//!
//! Subscriber lists are snapshotted out of the map before any handler runs,
//! so handlers are free to subscribe, unsubscribe, or even unload plugins
//! while a broadcast is in flight; such changes take effect on the next
//! broadcast.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::args::HookValue;
use crate::error::PluginError;
use crate::plugin::Plugin;
use crate::telemetry::{DispatchMonitor, DispatchStats};

/// Hooks whose name starts with this prefix are internal: only core
/// plugins may subscribe to them.
const INTERNAL_HOOK_PREFIX: &str = "I";

/// Minimum gap between deprecated-hook warnings for the same hook name.
const DEPRECATION_WARNING_INTERVAL: Duration = Duration::from_secs(300);

/// Owns the loaded plugins and routes hook broadcasts to subscribers.
pub struct PluginManager {
    loaded_plugins: DashMap<String, Arc<Plugin>>,
    hook_subscriptions: DashMap<String, Vec<Arc<Plugin>>>,
    deprecation_warned: DashMap<String, Instant>,
    monitor: DispatchMonitor,
}

impl PluginManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            loaded_plugins: DashMap::new(),
            hook_subscriptions: DashMap::new(),
            deprecation_warned: DashMap::new(),
            monitor: DispatchMonitor::new(),
        })
    }

    /// Add a plugin under its (unique) name and subscribe its hook table.
    pub fn add_plugin(self: &Arc<Self>, plugin: Arc<Plugin>) -> Result<(), PluginError> {
        use dashmap::mapref::entry::Entry;
        match self.loaded_plugins.entry(plugin.name().to_string()) {
            Entry::Occupied(_) => {
                return Err(PluginError::AlreadyLoaded(plugin.name().to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(plugin.clone());
            }
        }
        plugin.handle_added(self);
        debug!("✅ Plugin '{} v{}' added to manager", plugin.name(), plugin.version());
        Ok(())
    }

    /// Remove a plugin: it leaves every subscription list, then its removal
    /// observers fire, and only then is the object handed back.
    pub fn remove_plugin(&self, name: &str) -> Result<Arc<Plugin>, PluginError> {
        let (_, plugin) = self
            .loaded_plugins
            .remove(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        for mut entry in self.hook_subscriptions.iter_mut() {
            entry.value_mut().retain(|existing| !Arc::ptr_eq(existing, &plugin));
        }
        self.hook_subscriptions.retain(|_, subscribers| !subscribers.is_empty());

        plugin.handle_removed();
        debug!("🧹 Plugin '{}' removed from manager", plugin.name());
        Ok(plugin)
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<Plugin>> {
        self.loaded_plugins.get(name).map(|entry| entry.value().clone())
    }

    pub fn plugins(&self) -> Vec<Arc<Plugin>> {
        self.loaded_plugins.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn plugin_count(&self) -> usize {
        self.loaded_plugins.len()
    }

    /// Subscribe a plugin to a hook. No-ops when the plugin is not in the
    /// loaded set, when a non-core plugin targets an internal hook, or when
    /// the plugin is already subscribed; repeat subscription never doubles
    /// dispatch.
    pub fn subscribe(&self, hook: &str, plugin: &Arc<Plugin>) {
        if !self.loaded_plugins.contains_key(plugin.name()) {
            return;
        }
        if !plugin.is_core() && hook.starts_with(INTERNAL_HOOK_PREFIX) {
            return;
        }

        let mut subscribers = self
            .hook_subscriptions
            .entry(hook.to_string())
            .or_default();
        if subscribers.iter().any(|existing| Arc::ptr_eq(existing, plugin)) {
            return;
        }
        subscribers.push(plugin.clone());
        debug!("📝 Plugin '{}' subscribed to hook '{}'", plugin.name(), hook);
    }

    /// Unsubscribe a plugin from a hook. A no-op for non-subscribers and
    /// for plugins no longer in the loaded set.
    pub fn unsubscribe(&self, hook: &str, plugin: &Arc<Plugin>) {
        if !self.loaded_plugins.contains_key(plugin.name()) {
            return;
        }
        if let Some(mut subscribers) = self.hook_subscriptions.get_mut(hook) {
            subscribers.retain(|existing| !Arc::ptr_eq(existing, plugin));
        }
    }

    /// Snapshot of the current subscribers for a hook, in subscription
    /// order.
    pub fn subscribers(&self, hook: &str) -> Vec<Arc<Plugin>> {
        self.hook_subscriptions
            .get(hook)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Broadcast a hook to every subscriber, sharing one argument slice.
    ///
    /// The last non-null return value wins. When several subscribers return
    /// non-null values that disagree with the winner, a conflict warning
    /// lists every disagreeing plugin plus the winner; the winning value is
    /// still returned. One failing subscriber never stops the others.
    pub fn call_hook(&self, hook: &str, args: &mut [HookValue]) -> Option<HookValue> {
        self.monitor.record_call();
        let subscribers = self.subscribers(hook);
        if subscribers.is_empty() {
            return None;
        }

        let mut returned: Vec<(String, HookValue)> = Vec::new();
        for plugin in &subscribers {
            match plugin.dispatch_hook(hook, args) {
                Ok(Some(value)) => returned.push((plugin.name().to_string(), value)),
                Ok(None) => {}
                Err(_) => self.monitor.record_failure(),
            }
        }
        self.monitor.record_returns(returned.len() as u64);

        let (winner, final_value) = returned.last()?.clone();
        if returned.len() > 1 {
            let mut conflicting: Vec<String> = returned[..returned.len() - 1]
                .iter()
                .filter(|(_, value)| *value != final_value)
                .map(|(name, value)| format!("{name} - {value}"))
                .collect();
            if !conflicting.is_empty() {
                conflicting.push(format!("{winner} ({final_value})"));
                warn!(
                    "Calling hook '{}' resulted in a conflict between the following plugins: {}",
                    hook,
                    conflicting.join(", ")
                );
                self.monitor.record_conflict();
            }
        }
        Some(final_value)
    }

    /// Broadcast a deprecated hook.
    ///
    /// Refuses to fire once `expires` has passed. Otherwise warns at most
    /// once per five minutes per hook name, naming the first subscriber,
    /// and then dispatches normally.
    pub fn call_deprecated_hook(
        &self,
        old_hook: &str,
        new_hook: &str,
        expires: DateTime<Utc>,
        args: &mut [HookValue],
    ) -> Option<HookValue> {
        if Utc::now() > expires {
            return None;
        }
        let subscribers = self.subscribers(old_hook);
        let first = subscribers.first()?;

        if self.deprecation_warning_due(old_hook, Instant::now()) {
            warn!(
                "'{} v{}' is using deprecated hook '{}', which will stop working on {}. \
                 Please ask the author to update to '{}'",
                first.name(),
                first.version(),
                old_hook,
                expires.format("%A, %B %d, %Y"),
                new_hook
            );
        }
        self.call_hook(old_hook, args)
    }

    pub(crate) fn deprecation_warning_due(&self, hook: &str, now: Instant) -> bool {
        let mut due = false;
        self.deprecation_warned
            .entry(hook.to_string())
            .and_modify(|last| {
                if now.saturating_duration_since(*last) >= DEPRECATION_WARNING_INTERVAL {
                    *last = now;
                    due = true;
                }
            })
            .or_insert_with(|| {
                due = true;
                now
            });
        due
    }

    /// Snapshot of the dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        self.monitor.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{HookSignature, ParamSpec};
    use crate::error::HookError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_plugin(name: &str, hook: &str, counter: Arc<AtomicUsize>) -> Arc<Plugin> {
        Plugin::builder(name, name, "tests", "1.0.0")
            .hook(hook, HookSignature::empty(), move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .build()
    }

    fn returning_plugin(name: &str, hook: &str, value: i64) -> Arc<Plugin> {
        Plugin::builder(name, name, "tests", "1.0.0")
            .hook(hook, HookSignature::empty(), move |_, _| {
                Ok(Some(HookValue::Int(value)))
            })
            .build()
    }

    #[test]
    fn plugins_subscribe_their_hook_table_on_add() {
        let manager = PluginManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let plugin = counting_plugin("Counter", "OnTick", counter.clone());

        manager.add_plugin(plugin).unwrap();
        manager.call_hook("OnTick", &mut []);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn double_subscribe_dispatches_once() {
        let manager = PluginManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let plugin = counting_plugin("Counter", "OnTick", counter.clone());

        manager.add_plugin(plugin.clone()).unwrap();
        // Added plugins are already subscribed to their table.
        manager.subscribe("OnTick", &plugin);
        manager.subscribe("OnTick", &plugin);

        manager.call_hook("OnTick", &mut []);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_dispatch_and_tolerates_strangers() {
        let manager = PluginManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let plugin = counting_plugin("Counter", "OnTick", counter.clone());

        manager.add_plugin(plugin.clone()).unwrap();
        manager.call_hook("OnTick", &mut []);
        manager.unsubscribe("OnTick", &plugin);
        manager.call_hook("OnTick", &mut []);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Unsubscribing a non-subscriber is a no-op.
        manager.unsubscribe("OnOther", &plugin);
    }

    #[test]
    fn unsubscribe_after_removal_is_a_no_op() {
        let manager = PluginManager::new();
        let plugin = returning_plugin("Gone", "OnTick", 1);

        manager.add_plugin(plugin.clone()).unwrap();
        manager.remove_plugin("Gone").unwrap();
        manager.unsubscribe("OnTick", &plugin);
        assert!(manager.subscribers("OnTick").is_empty());
    }

    #[test]
    fn subscribe_requires_loaded_membership() {
        let manager = PluginManager::new();
        let plugin = returning_plugin("Drifter", "OnTick", 1);

        manager.subscribe("OnTick", &plugin);
        assert!(manager.subscribers("OnTick").is_empty());
    }

    #[test]
    fn internal_hooks_are_core_only() {
        let manager = PluginManager::new();
        let outsider = Plugin::builder("Outsider", "Outsider", "tests", "1.0.0")
            .hook("IOnServerCommand", HookSignature::empty(), |_, _| Ok(None))
            .build();
        let core = Plugin::builder("GameCore", "Game Core", "tests", "1.0.0")
            .core()
            .hook("IOnServerCommand", HookSignature::empty(), |_, _| Ok(None))
            .build();

        manager.add_plugin(outsider).unwrap();
        manager.add_plugin(core.clone()).unwrap();

        let subscribers = manager.subscribers("IOnServerCommand");
        assert_eq!(subscribers.len(), 1);
        assert!(Arc::ptr_eq(&subscribers[0], &core));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let manager = PluginManager::new();
        manager.add_plugin(returning_plugin("Twin", "OnTick", 1)).unwrap();

        let result = manager.add_plugin(returning_plugin("Twin", "OnTick", 2));
        assert!(matches!(result, Err(PluginError::AlreadyLoaded(name)) if name == "Twin"));
    }

    #[test]
    fn removal_strips_subscriptions_and_fires_observers() {
        let manager = PluginManager::new();
        let removed = Arc::new(AtomicUsize::new(0));
        let plugin = returning_plugin("Leaver", "OnTick", 1);
        let counter = removed.clone();
        plugin.on_removed("test", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.add_plugin(plugin).unwrap();
        assert_eq!(manager.subscribers("OnTick").len(), 1);

        manager.remove_plugin("Leaver").unwrap();
        assert!(manager.subscribers("OnTick").is_empty());
        assert_eq!(manager.plugin_count(), 0);
        assert_eq!(removed.load(Ordering::SeqCst), 1);

        assert!(matches!(
            manager.remove_plugin("Leaver"),
            Err(PluginError::NotFound(_))
        ));
    }

    #[test]
    fn last_non_null_return_wins() {
        let manager = PluginManager::new();
        manager.add_plugin(returning_plugin("First", "OnVote", 1)).unwrap();
        manager
            .add_plugin(
                Plugin::builder("Quiet", "Quiet", "tests", "1.0.0")
                    .hook("OnVote", HookSignature::empty(), |_, _| Ok(None))
                    .build(),
            )
            .unwrap();
        manager.add_plugin(returning_plugin("Last", "OnVote", 3)).unwrap();

        assert_eq!(manager.call_hook("OnVote", &mut []), Some(HookValue::Int(3)));
    }

    #[test]
    fn disagreeing_values_log_a_conflict() {
        let manager = PluginManager::new();
        manager.add_plugin(returning_plugin("Alpha", "OnVote", 1)).unwrap();
        manager.add_plugin(returning_plugin("Beta", "OnVote", 2)).unwrap();
        manager.add_plugin(returning_plugin("Gamma", "OnVote", 2)).unwrap();

        let result = manager.call_hook("OnVote", &mut []);
        assert_eq!(result, Some(HookValue::Int(2)));

        let stats = manager.stats();
        assert_eq!(stats.conflicts, 1);
        assert_eq!(stats.values_returned, 3);
    }

    #[test]
    fn agreeing_values_are_not_a_conflict() {
        let manager = PluginManager::new();
        manager.add_plugin(returning_plugin("Alpha", "OnVote", 2)).unwrap();
        manager.add_plugin(returning_plugin("Beta", "OnVote", 2)).unwrap();

        assert_eq!(manager.call_hook("OnVote", &mut []), Some(HookValue::Int(2)));
        assert_eq!(manager.stats().conflicts, 0);
    }

    #[test]
    fn no_subscribers_yields_none() {
        let manager = PluginManager::new();
        assert_eq!(manager.call_hook("OnNothing", &mut []), None);
        assert_eq!(manager.stats().hook_calls, 1);
    }

    #[test]
    fn one_failing_subscriber_does_not_stop_the_rest() {
        let manager = PluginManager::new();
        manager
            .add_plugin(
                Plugin::builder("Broken", "Broken", "tests", "1.0.0")
                    .hook("OnSave", HookSignature::empty(), |_, _| {
                        Err(HookError::handler("database offline"))
                    })
                    .build(),
            )
            .unwrap();
        manager.add_plugin(returning_plugin("Healthy", "OnSave", 7)).unwrap();

        assert_eq!(manager.call_hook("OnSave", &mut []), Some(HookValue::Int(7)));
        assert_eq!(manager.stats().handler_failures, 1);
    }

    #[test]
    fn subscribers_share_the_argument_slice() {
        let manager = PluginManager::new();
        let writer = Plugin::builder("Writer", "Writer", "tests", "1.0.0")
            .hook(
                "OnAmount",
                HookSignature::of([ParamSpec::int("amount")]),
                |_, args| {
                    args[0] = HookValue::Int(5);
                    Ok(None)
                },
            )
            .build();
        let reader = Plugin::builder("Reader", "Reader", "tests", "1.0.0")
            .hook(
                "OnAmount",
                HookSignature::of([ParamSpec::int("amount")]),
                |_, args| Ok(Some(args[0].clone())),
            )
            .build();

        manager.add_plugin(writer).unwrap();
        manager.add_plugin(reader).unwrap();

        let mut args = [HookValue::Int(0)];
        assert_eq!(manager.call_hook("OnAmount", &mut args), Some(HookValue::Int(5)));
        assert_eq!(args[0], HookValue::Int(5));
    }

    #[test]
    fn deprecated_hooks_stop_firing_after_expiry() {
        let manager = PluginManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        manager
            .add_plugin(counting_plugin("Legacy", "OnOldThing", counter.clone()))
            .unwrap();

        let expired = Utc::now() - chrono::Duration::days(1);
        let result =
            manager.call_deprecated_hook("OnOldThing", "OnNewThing", expired, &mut []);
        assert_eq!(result, None);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let future = Utc::now() + chrono::Duration::days(30);
        manager.call_deprecated_hook("OnOldThing", "OnNewThing", future, &mut []);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deprecated_warnings_are_rate_limited() {
        let manager = PluginManager::new();
        let t0 = Instant::now();

        assert!(manager.deprecation_warning_due("OnOldThing", t0));
        assert!(!manager.deprecation_warning_due("OnOldThing", t0 + Duration::from_secs(100)));
        assert!(manager.deprecation_warning_due("OnOldThing", t0 + Duration::from_secs(301)));
        // Independent hooks keep independent clocks.
        assert!(manager.deprecation_warning_due("OnOtherThing", t0 + Duration::from_secs(100)));
    }
}
