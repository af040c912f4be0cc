//! The native command table seam.
//!
//! Each host game exposes its built-in command system through the
//! [`NativeCommandTable`] capability trait; the registry installs shims
//! into it and restores originals through it. [`MemoryCommandTable`] is
//! the in-memory implementation used by embedded hosts and tests.

use std::sync::Arc;

use dashmap::DashMap;
use palisade_core::Player;

/// Callback shape shared by native commands and registry shims:
/// an optional calling player (`None` for the server console), the
/// invoked command name, and its arguments.
pub type NativeCallbackFn = dyn Fn(Option<&Arc<dyn Player>>, &str, &[String]) + Send + Sync;

/// One entry in a native command table.
#[derive(Clone)]
pub struct NativeCommand {
    /// Full `parent.name` command name
    pub name: String,
    /// The handler the engine invokes
    pub callback: Arc<NativeCallbackFn>,
}

impl NativeCommand {
    pub fn new(
        name: impl Into<String>,
        callback: impl Fn(Option<&Arc<dyn Player>>, &str, &[String]) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }
}

impl std::fmt::Debug for NativeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCommand").field("name", &self.name).finish()
    }
}

/// Capability trait over a game's built-in command system.
///
/// Implemented once per game adapter; the registry only needs get, set,
/// and remove by full name.
pub trait NativeCommandTable: Send + Sync {
    fn get(&self, full_name: &str) -> Option<NativeCommand>;
    fn set(&self, command: NativeCommand);
    fn remove(&self, full_name: &str) -> Option<NativeCommand>;
}

/// In-memory native command table.
#[derive(Default)]
pub struct MemoryCommandTable {
    commands: DashMap<String, NativeCommand>,
}

impl MemoryCommandTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Invoke a command the way the engine would. Returns whether the
    /// name was known.
    pub fn invoke(&self, full_name: &str, caller: Option<&Arc<dyn Player>>, args: &[String]) -> bool {
        let Some(command) = self.get(full_name) else {
            return false;
        };
        (command.callback)(caller, &command.name, args);
        true
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.commands.contains_key(full_name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl NativeCommandTable for MemoryCommandTable {
    fn get(&self, full_name: &str) -> Option<NativeCommand> {
        self.commands.get(full_name).map(|entry| entry.value().clone())
    }

    fn set(&self, command: NativeCommand) {
        self.commands.insert(command.name.clone(), command);
    }

    fn remove(&self, full_name: &str) -> Option<NativeCommand> {
        self.commands.remove(full_name).map(|(_, command)| command)
    }
}
