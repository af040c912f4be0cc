//! The command registry: registration, override arbitration, and dispatch.
//!
//! One [`CommandLibrary`] serves a host. It owns the chat, console, and
//! covalence command tables, arbitrates take-overs across them and against
//! the game's native command table, and routes chat and console lines to
//! the registered callbacks. Taking over a still-untouched native command
//! snapshots its callback first; when the last plugin registration for that
//! name disappears, the snapshot is put back verbatim. Names owned by core
//! plugins and names on the restricted deny-list can never be taken over.
//!
//! Callback lists are snapshotted out of the tables before they run, so a
//! command handler is free to register or remove commands while it runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use palisade_core::{CommandSettings, HookValue, Player, Plugin};
use tracing::{debug, error, warn};

use crate::error::CommandError;
use crate::native::{NativeCommand, NativeCommandTable};
use crate::parser;

/// Sentinel parent for console commands registered without one.
const DEFAULT_PARENT: &str = "global";

/// Callback shape for chat commands: the calling player, the command name,
/// and its arguments.
pub type ChatCallbackFn = dyn Fn(&Arc<dyn Player>, &str, &[String]) + Send + Sync;

/// Callback shape for console commands. The caller is `None` when the
/// server console itself runs the command.
pub type ConsoleCallbackFn = dyn Fn(Option<&Arc<dyn Player>>, &str, &[String]) + Send + Sync;

#[derive(Clone)]
struct ChatCommand {
    name: String,
    owner: Arc<Plugin>,
    callback: Arc<ChatCallbackFn>,
}

#[derive(Clone)]
struct ConsoleCommand {
    full_name: String,
    /// Ordered registrations; all of them run on dispatch. The first one
    /// is the entry's owner for arbitration purposes.
    callbacks: Vec<(Arc<Plugin>, Arc<ConsoleCallbackFn>)>,
    /// The native callback as it was before any plugin took the name.
    original: Option<NativeCommand>,
}

#[derive(Clone)]
struct CovalenceCommand {
    alias: String,
    full_name: String,
    owner: Arc<Plugin>,
    /// Hook method on the owner that serves the command.
    method: String,
    permissions: Vec<String>,
    original: Option<NativeCommand>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Chat,
    Console,
    Covalence,
}

/// Normalized command name: the trimmed, lowered short form plus the full
/// `parent.name` console form (parent defaults to `global`).
fn normalize(name: &str) -> (String, String) {
    let short = name.trim().to_lowercase();
    let full = if short.contains('.') {
        short.clone()
    } else {
        format!("{DEFAULT_PARENT}.{short}")
    };
    (short, full)
}

/// The command tables and their arbitration logic.
///
/// Chat commands are keyed by their short name, console and covalence
/// commands by the full `parent.name` form. Console and covalence names are
/// also installed into the host's [`NativeCommandTable`] as shims that
/// forward back into the registry, so the engine's own dispatch reaches
/// plugin commands without knowing about them.
pub struct CommandLibrary {
    native: Arc<dyn NativeCommandTable>,
    chat_commands: DashMap<String, ChatCommand>,
    console_commands: DashMap<String, ConsoleCommand>,
    covalence_commands: DashMap<String, CovalenceCommand>,
    chat_prefixes: Vec<String>,
    restricted: Vec<String>,
    permissions_available: AtomicBool,
    observer_key: String,
}

impl CommandLibrary {
    pub fn new(native: Arc<dyn NativeCommandTable>) -> Arc<Self> {
        Self::with_settings(native, &CommandSettings::default())
    }

    pub fn with_settings(
        native: Arc<dyn NativeCommandTable>,
        settings: &CommandSettings,
    ) -> Arc<Self> {
        // Each library instance keys its removal observers uniquely, so
        // two libraries watching one plugin never displace each other.
        static NEXT_LIBRARY_ID: AtomicU64 = AtomicU64::new(0);
        let id = NEXT_LIBRARY_ID.fetch_add(1, Ordering::Relaxed);

        Arc::new(Self {
            native,
            chat_commands: DashMap::new(),
            console_commands: DashMap::new(),
            covalence_commands: DashMap::new(),
            chat_prefixes: settings.chat_prefixes.clone(),
            restricted: settings
                .restricted
                .iter()
                .map(|name| name.trim().to_lowercase())
                .collect(),
            permissions_available: AtomicBool::new(true),
            observer_key: format!("command_library_{id}"),
        })
    }

    /// Whether the permission backend is usable. Covalence commands that
    /// require permissions refuse to run (with a reply to the caller)
    /// while this is false.
    pub fn permissions_available(&self) -> bool {
        self.permissions_available.load(Ordering::SeqCst)
    }

    pub fn set_permissions_available(&self, available: bool) {
        self.permissions_available.store(available, Ordering::SeqCst);
    }

    pub fn has_chat_command(&self, name: &str) -> bool {
        let (short, _) = normalize(name);
        self.chat_commands.contains_key(&short)
    }

    pub fn has_console_command(&self, name: &str) -> bool {
        let (_, full) = normalize(name);
        self.console_commands.contains_key(&full)
    }

    pub fn has_covalence_command(&self, name: &str) -> bool {
        let (_, full) = normalize(name);
        self.covalence_commands.contains_key(&full)
    }

    /// Register a chat command.
    ///
    /// Only one plugin owns a chat command name at a time: a later
    /// registration replaces the earlier one, with a warning when the
    /// owners differ. Chat commands never touch the native table.
    pub fn add_chat_command(
        self: &Arc<Self>,
        name: &str,
        plugin: &Arc<Plugin>,
        callback: impl Fn(&Arc<dyn Player>, &str, &[String]) + Send + Sync + 'static,
    ) -> Result<(), CommandError> {
        let (short, full) = normalize(name);
        if !self.can_override(&short, &full, CommandKind::Chat) {
            return Err(self.reject(plugin, &short));
        }

        self.displace_covalence_for_chat(&full, plugin);

        let replaced = self.chat_commands.insert(
            short.clone(),
            ChatCommand {
                name: short.clone(),
                owner: plugin.clone(),
                callback: Arc::new(callback),
            },
        );
        if let Some(stale) = replaced {
            if !Arc::ptr_eq(&stale.owner, plugin) {
                warn!(
                    "{} has replaced the '{}' chat command previously registered by {}",
                    plugin.name(),
                    short,
                    stale.owner.name()
                );
            }
        }

        self.watch_removal(plugin);
        debug!("📝 Registered chat command '{}' for plugin '{}'", short, plugin.name());
        Ok(())
    }

    /// Register a chat command served by one of the plugin's hook methods.
    ///
    /// The handler is called as `method(player, command, args)` through the
    /// plugin's hook table.
    pub fn add_chat_command_method(
        self: &Arc<Self>,
        name: &str,
        plugin: &Arc<Plugin>,
        method: impl Into<String>,
    ) -> Result<(), CommandError> {
        let owner = plugin.clone();
        let method = method.into();
        self.add_chat_command(name, plugin, move |player, command, args| {
            owner.call_hook(
                &method,
                &mut [
                    HookValue::Player(player.clone()),
                    HookValue::Text(command.to_string()),
                    HookValue::Strings(args.to_vec()),
                ],
            );
        })
    }

    /// Register a console command.
    ///
    /// Console entries keep an ordered callback list; registering an
    /// already-taken name appends to it (warning when the owners differ)
    /// and every callback runs on dispatch. The first registration for a
    /// still-untouched native name snapshots the native callback so the
    /// last removal can restore it.
    pub fn add_console_command(
        self: &Arc<Self>,
        name: &str,
        plugin: &Arc<Plugin>,
        callback: impl Fn(Option<&Arc<dyn Player>>, &str, &[String]) + Send + Sync + 'static,
    ) -> Result<(), CommandError> {
        let (short, full) = normalize(name);
        if !self.can_override(&short, &full, CommandKind::Console) {
            return Err(self.reject(plugin, &full));
        }

        let inherited = self.displace_covalence(&full, plugin);

        use dashmap::mapref::entry::Entry;
        match self.console_commands.entry(full.clone()) {
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if let Some((owner, _)) = entry.callbacks.first() {
                    if !Arc::ptr_eq(owner, plugin) {
                        warn!(
                            "{} has replaced the '{}' console command previously registered by {}",
                            plugin.name(),
                            full,
                            owner.name()
                        );
                    }
                }
                entry.callbacks.push((plugin.clone(), Arc::new(callback)));
                if entry.original.is_none() {
                    entry.original = inherited;
                }
            }
            Entry::Vacant(slot) => {
                let original = inherited.or_else(|| self.native.get(&full));
                slot.insert(ConsoleCommand {
                    full_name: full.clone(),
                    callbacks: vec![(plugin.clone(), Arc::new(callback))],
                    original,
                });
            }
        }
        self.install_console_shim(&full);

        self.watch_removal(plugin);
        debug!("📝 Registered console command '{}' for plugin '{}'", full, plugin.name());
        Ok(())
    }

    /// Register a console command served by one of the plugin's hook
    /// methods, called as `method(caller, command, args)`. The caller slot
    /// is null for the server console.
    pub fn add_console_command_method(
        self: &Arc<Self>,
        name: &str,
        plugin: &Arc<Plugin>,
        method: impl Into<String>,
    ) -> Result<(), CommandError> {
        let owner = plugin.clone();
        let method = method.into();
        self.add_console_command(name, plugin, move |caller, command, args| {
            let player = match caller {
                Some(player) => HookValue::Player(player.clone()),
                None => HookValue::Null,
            };
            owner.call_hook(
                &method,
                &mut [
                    player,
                    HookValue::Text(command.to_string()),
                    HookValue::Strings(args.to_vec()),
                ],
            );
        })
    }

    /// Register a covalence command under one alias.
    ///
    /// Covalence commands answer on both the chat and console surfaces, so
    /// the take-over sweeps all three tables; any native-original snapshot
    /// held by a displaced registration is carried forward. Execution
    /// routes through the owner's hook table as `method(player, command,
    /// args)` after the permission gate.
    pub fn add_covalence_command(
        self: &Arc<Self>,
        alias: &str,
        plugin: &Arc<Plugin>,
        permissions: &[String],
        method: &str,
    ) -> Result<(), CommandError> {
        let (short, full) = normalize(alias);
        if !self.can_override(&short, &full, CommandKind::Covalence) {
            return Err(self.reject(plugin, &short));
        }

        let mut inherited = self.displace_covalence(&full, plugin);
        self.displace_chat(&short, plugin);
        if let Some(original) = self.displace_console(&full, plugin) {
            inherited = inherited.or(Some(original));
        }

        let original = inherited.or_else(|| self.native.get(&full));
        self.covalence_commands.insert(
            full.clone(),
            CovalenceCommand {
                alias: short.clone(),
                full_name: full.clone(),
                owner: plugin.clone(),
                method: method.to_string(),
                permissions: permissions.to_vec(),
                original,
            },
        );
        self.install_covalence_shim(&full);

        self.watch_removal(plugin);
        debug!("📝 Registered command '{}' for plugin '{}'", short, plugin.name());
        Ok(())
    }

    /// Route one chat line. Returns whether a registered command consumed
    /// it.
    ///
    /// Lines that do not start with a configured chat prefix are not
    /// commands. The covalence table is consulted first, then the chat
    /// table.
    pub fn handle_chat_message(&self, player: &Arc<dyn Player>, raw: &str) -> bool {
        let Some(line) = self.strip_chat_prefix(raw) else {
            return false;
        };
        let (Some(command), args) = parser::parse_command(line) else {
            return false;
        };
        let (short, full) = normalize(&command);

        if self.run_covalence_entry(&full, Some(player), &args) {
            return true;
        }
        let Some(entry) = self.chat_commands.get(&short).map(|entry| entry.value().clone())
        else {
            return false;
        };
        entry
            .owner
            .invoke_command(&entry.name, || (entry.callback)(player, &entry.name, &args));
        true
    }

    /// Route one console line: the covalence table first, then the console
    /// table with every callback in order. The caller is `None` for the
    /// server console.
    pub fn handle_console_message(
        &self,
        caller: Option<&Arc<dyn Player>>,
        raw: &str,
    ) -> bool {
        let (Some(command), args) = parser::parse_command(raw) else {
            return false;
        };
        let (_, full) = normalize(&command);

        if self.run_covalence_entry(&full, caller, &args) {
            return true;
        }
        self.run_console_entry(&full, caller, &args)
    }

    /// Chat entry point restricted to the covalence table, for hosts that
    /// route covalence and game commands separately.
    pub(crate) fn handle_covalence_chat(&self, player: &Arc<dyn Player>, raw: &str) -> bool {
        let Some(line) = self.strip_chat_prefix(raw) else {
            return false;
        };
        let (Some(command), args) = parser::parse_command(line) else {
            return false;
        };
        let (_, full) = normalize(&command);
        self.run_covalence_entry(&full, Some(player), &args)
    }

    fn strip_chat_prefix<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let line = raw.trim_start();
        self.chat_prefixes
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix.as_str()))
    }

    /// Whether `plugin` may take over the name. Core-plugin registrations
    /// and deny-listed names are protected; everything else may be
    /// overridden.
    fn can_override(&self, short: &str, full: &str, kind: CommandKind) -> bool {
        if let Some(entry) = self.covalence_commands.get(full) {
            if entry.value().owner.is_core() {
                return false;
            }
        }
        if matches!(kind, CommandKind::Chat | CommandKind::Covalence) {
            if let Some(entry) = self.chat_commands.get(short) {
                if entry.value().owner.is_core() {
                    return false;
                }
            }
        }
        if matches!(kind, CommandKind::Console | CommandKind::Covalence) {
            if let Some(entry) = self.console_commands.get(full) {
                let core_owned = entry
                    .value()
                    .callbacks
                    .first()
                    .is_some_and(|(owner, _)| owner.is_core());
                if core_owned {
                    return false;
                }
            }
        }
        !self.restricted.iter().any(|name| name == short || name == full)
    }

    fn reject(&self, plugin: &Plugin, command: &str) -> CommandError {
        error!(
            "{} can't register command '{}', it already exists and can't be overridden!",
            plugin.name(),
            command
        );
        CommandError::AlreadyExists {
            plugin: plugin.name().to_string(),
            command: command.to_string(),
        }
    }

    /// Remove a stale covalence registration so a console or covalence
    /// take-over can replace it, returning its native-original snapshot so
    /// the new owner carries it forward.
    fn displace_covalence(&self, full: &str, new_owner: &Arc<Plugin>) -> Option<NativeCommand> {
        let (_, stale) = self.covalence_commands.remove(full)?;
        if !Arc::ptr_eq(&stale.owner, new_owner) {
            warn!(
                "{} has replaced the '{}' command previously registered by {}",
                new_owner.name(),
                stale.alias,
                stale.owner.name()
            );
        }
        self.native.remove(full);
        stale.original
    }

    /// Remove a stale covalence registration displaced by a chat command.
    /// Chat commands never occupy the console surface, so the displaced
    /// entry's slot in the native table is restored (or cleared) here
    /// rather than carried forward.
    fn displace_covalence_for_chat(&self, full: &str, new_owner: &Arc<Plugin>) {
        let Some((_, stale)) = self.covalence_commands.remove(full) else {
            return;
        };
        if !Arc::ptr_eq(&stale.owner, new_owner) {
            warn!(
                "{} has replaced the '{}' command previously registered by {}",
                new_owner.name(),
                stale.alias,
                stale.owner.name()
            );
        }
        self.restore_native(full, stale.original);
    }

    fn displace_chat(&self, short: &str, new_owner: &Arc<Plugin>) {
        let Some((_, stale)) = self.chat_commands.remove(short) else {
            return;
        };
        if !Arc::ptr_eq(&stale.owner, new_owner) {
            warn!(
                "{} has replaced the '{}' chat command previously registered by {}",
                new_owner.name(),
                short,
                stale.owner.name()
            );
        }
    }

    fn displace_console(&self, full: &str, new_owner: &Arc<Plugin>) -> Option<NativeCommand> {
        let (_, stale) = self.console_commands.remove(full)?;
        if let Some((owner, _)) = stale.callbacks.first() {
            if !Arc::ptr_eq(owner, new_owner) {
                warn!(
                    "{} has replaced the '{}' console command previously registered by {}",
                    new_owner.name(),
                    full,
                    owner.name()
                );
            }
        }
        self.native.remove(full);
        stale.original
    }

    /// Install the native-table shim that forwards an engine invocation of
    /// `full` back into the console callback list.
    fn install_console_shim(self: &Arc<Self>, full: &str) {
        let library = Arc::downgrade(self);
        let key = full.to_string();
        self.native.set(NativeCommand::new(full, move |caller, _, args| {
            if let Some(library) = library.upgrade() {
                library.run_console_entry(&key, caller, args);
            }
        }));
    }

    fn install_covalence_shim(self: &Arc<Self>, full: &str) {
        let library = Arc::downgrade(self);
        let key = full.to_string();
        self.native.set(NativeCommand::new(full, move |caller, _, args| {
            if let Some(library) = library.upgrade() {
                library.run_covalence_entry(&key, caller, args);
            }
        }));
    }

    /// Run every callback registered for a console entry, in registration
    /// order. Returns whether the entry exists.
    fn run_console_entry(&self, full: &str, caller: Option<&Arc<dyn Player>>, args: &[String]) -> bool {
        let Some(entry) = self.console_commands.get(full).map(|entry| entry.value().clone())
        else {
            return false;
        };
        for (owner, callback) in &entry.callbacks {
            owner.invoke_command(&entry.full_name, || {
                callback(caller, &entry.full_name, args)
            });
        }
        true
    }

    fn run_covalence_entry(&self, full: &str, caller: Option<&Arc<dyn Player>>, args: &[String]) -> bool {
        let Some(entry) = self.covalence_commands.get(full).map(|entry| entry.value().clone())
        else {
            return false;
        };
        self.execute_covalence(&entry, caller, args);
        true
    }

    /// Permission-gate and execute one covalence command. A gate refusal
    /// still counts as the command being consumed; the caller gets a reply
    /// instead of silence. The server console bypasses the gate.
    fn execute_covalence(
        &self,
        entry: &CovalenceCommand,
        caller: Option<&Arc<dyn Player>>,
        args: &[String],
    ) {
        if let Some(player) = caller {
            if !entry.permissions.is_empty() {
                if !self.permissions_available() {
                    player.reply(&format!(
                        "Unable to run the command '{}', the permission system is unavailable",
                        entry.alias
                    ));
                    return;
                }
                for permission in &entry.permissions {
                    if !player.has_permission(permission) {
                        player.reply(&format!(
                            "You don't have permission to use the command '{}'!",
                            entry.alias
                        ));
                        return;
                    }
                }
            }
        }

        let player = match caller {
            Some(player) => HookValue::Player(player.clone()),
            None => HookValue::Null,
        };
        entry.owner.call_hook(
            &entry.method,
            &mut [
                player,
                HookValue::Text(entry.alias.clone()),
                HookValue::Strings(args.to_vec()),
            ],
        );
    }

    /// Watch the plugin's removal so its commands are cleaned up when it
    /// unloads. The keyed observer makes repeat registration idempotent.
    fn watch_removal(self: &Arc<Self>, plugin: &Plugin) {
        let library = Arc::downgrade(self);
        plugin.on_removed(self.observer_key.as_str(), move |plugin| {
            if let Some(library) = library.upgrade() {
                library.remove_plugin_commands(plugin);
            }
        });
    }

    /// Strip every registration owned by `plugin`. Console entries with
    /// callbacks from other plugins stay active; entries that empty out
    /// restore their native original or disappear from the native table.
    fn remove_plugin_commands(&self, plugin: &Plugin) {
        let owned: Vec<String> = self
            .covalence_commands
            .iter()
            .filter(|entry| std::ptr::eq(entry.value().owner.as_ref(), plugin))
            .map(|entry| entry.key().clone())
            .collect();
        for full in owned {
            if let Some((_, entry)) = self.covalence_commands.remove(&full) {
                self.restore_native(&full, entry.original);
            }
        }

        let owned: Vec<String> = self
            .chat_commands
            .iter()
            .filter(|entry| std::ptr::eq(entry.value().owner.as_ref(), plugin))
            .map(|entry| entry.key().clone())
            .collect();
        for short in owned {
            self.chat_commands.remove(&short);
        }

        let mut emptied: Vec<String> = Vec::new();
        for mut entry in self.console_commands.iter_mut() {
            let command = entry.value_mut();
            command
                .callbacks
                .retain(|(owner, _)| !std::ptr::eq(owner.as_ref(), plugin));
            if command.callbacks.is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for full in emptied {
            if let Some((_, entry)) = self.console_commands.remove(&full) {
                self.restore_native(&full, entry.original);
            }
        }

        debug!("🧹 Removed commands registered by plugin '{}'", plugin.name());
    }

    /// Put the native table back the way it was before a name was taken:
    /// restore the snapshotted original, or delete the shim for a name that
    /// was never native.
    fn restore_native(&self, full: &str, original: Option<NativeCommand>) {
        match original {
            Some(original) => self.native.set(original),
            None => {
                self.native.remove(full);
            }
        }
    }
}

impl std::fmt::Debug for CommandLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandLibrary")
            .field("chat_commands", &self.chat_commands.len())
            .field("console_commands", &self.console_commands.len())
            .field("covalence_commands", &self.covalence_commands.len())
            .finish()
    }
}
