//! Game-agnostic command surface over the [`CommandLibrary`].
//!
//! Covalence commands are declared once per plugin (alias list, required
//! permissions, handler method) and answer on both the chat and console
//! surfaces. This module is the registration front door: it fans alias
//! lists out into individual registry entries and picks declared commands
//! up off a plugin when it attaches.

use std::sync::Arc;

use palisade_core::{Player, Plugin};
use tracing::debug;

use crate::error::CommandError;
use crate::registry::CommandLibrary;

/// Registers and routes covalence commands through a shared
/// [`CommandLibrary`].
pub struct CovalenceCommandSystem {
    library: Arc<CommandLibrary>,
}

impl CovalenceCommandSystem {
    pub fn new(library: Arc<CommandLibrary>) -> Arc<Self> {
        Arc::new(Self { library })
    }

    pub fn library(&self) -> &Arc<CommandLibrary> {
        &self.library
    }

    /// Register one covalence command under every alias.
    ///
    /// Aliases register independently; a rejected alias stops the sweep
    /// and surfaces the error, but aliases registered before it stay.
    pub fn register_command(
        &self,
        aliases: &[&str],
        plugin: &Arc<Plugin>,
        permissions: &[&str],
        method: &str,
    ) -> Result<(), CommandError> {
        let permissions: Vec<String> =
            permissions.iter().map(|p| p.to_string()).collect();
        for alias in aliases {
            self.library
                .add_covalence_command(alias, plugin, &permissions, method)?;
        }
        Ok(())
    }

    /// Register every covalence command the plugin declares. Rejected
    /// aliases are logged by the registry and skipped; one bad alias does
    /// not stop the rest of the plugin's commands.
    pub fn attach_plugin(&self, plugin: &Arc<Plugin>) {
        let specs = plugin.covalence_commands();
        if specs.is_empty() {
            return;
        }
        for spec in &specs {
            for alias in &spec.aliases {
                let _ = self.library.add_covalence_command(
                    alias,
                    plugin,
                    &spec.permissions,
                    &spec.method,
                );
            }
        }
        debug!(
            "✅ Attached {} covalence command(s) from plugin '{}'",
            specs.len(),
            plugin.name()
        );
    }

    /// Route one chat line against the covalence table only. Returns
    /// whether a covalence command consumed it.
    pub fn handle_chat_message(&self, player: &Arc<dyn Player>, raw: &str) -> bool {
        self.library.handle_covalence_chat(player, raw)
    }
}

impl std::fmt::Debug for CovalenceCommandSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CovalenceCommandSystem").finish()
    }
}
