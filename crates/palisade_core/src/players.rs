//! Collaborator traits for the host game.
//!
//! The core never implements these. Each game adapter supplies its own
//! player, server, and player-manager wrappers. The core only resolves,
//! replies, and queries through them.

use std::sync::Arc;

/// An identity-bearing player as seen by command dispatch and hooks.
///
/// `id` is the stable per-account identity; the object itself may or may
/// not be backed by a live session, which `is_connected` reports.
pub trait Player: Send + Sync {
    /// Stable unique identity for the player's game account.
    fn id(&self) -> &str;

    /// Current display name.
    fn name(&self) -> &str;

    /// Whether a live session currently backs this player.
    fn is_connected(&self) -> bool;

    /// Whether the player holds the named permission.
    fn has_permission(&self, permission: &str) -> bool;

    /// Send a chat/console message to the player.
    fn message(&self, text: &str);

    /// Reply in the context the player used to reach us. Defaults to
    /// `message`; console-backed callers typically override this.
    fn reply(&self, text: &str) {
        self.message(text);
    }

    /// Run a command as this player.
    fn command(&self, command: &str, args: &[String]);
}

/// The host server as seen by plugins.
pub trait Server: Send + Sync {
    /// Server display name.
    fn name(&self) -> &str;

    /// Broadcast a message to all connected players.
    fn broadcast(&self, message: &str);

    /// Run a command on the server console.
    fn command(&self, command: &str, args: &[String]);

    /// Whether the given account id is banned.
    fn is_banned(&self, player_id: &str) -> bool;

    /// Ban an account id, with a reason shown to the player.
    fn ban(&self, player_id: &str, reason: &str);

    /// Lift a ban on an account id.
    fn unban(&self, player_id: &str);
}

/// Resolves raw game identifiers to [`Player`] objects.
///
/// Command dispatch resolves the caller through this on every invocation;
/// the core keeps no player cache of its own.
pub trait PlayerManager: Send + Sync {
    /// Find a player by exact account id.
    fn find_player_by_id(&self, id: &str) -> Option<Arc<dyn Player>>;

    /// Find a player by id or (partial) name.
    fn find_player(&self, id_or_name: &str) -> Option<Arc<dyn Player>>;

    /// All currently connected players.
    fn connected_players(&self) -> Vec<Arc<dyn Player>>;
}
