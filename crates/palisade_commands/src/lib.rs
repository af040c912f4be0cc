//! # Palisade Commands
//!
//! Command registration and routing for the Palisade modding framework.
//! Plugins claim chat, console, and covalence commands through one
//! registry that arbitrates take-overs and keeps the game's own command
//! table intact underneath.
//!
//! ## Key Features
//!
//! - **Three surfaces, one registry**: chat commands (replace on
//!   conflict), console commands (append on conflict, all callbacks run),
//!   and covalence commands (both surfaces, permission-gated)
//! - **Override arbitration**: core-plugin commands and deny-listed names
//!   can never be taken over; cross-plugin take-overs log who displaced
//!   whom
//! - **Native snapshot and restore**: the first take-over of an engine
//!   command snapshots the original callback, and the last removal puts
//!   it back verbatim, even across take-over chains
//! - **Quote-aware parsing**: command lines split on whitespace with
//!   double-quoted arguments kept whole; parsing never fails
//!
//! ## Architecture
//!
//! - [`CommandLibrary`]: the three tables plus arbitration and dispatch
//! - [`CovalenceCommandSystem`]: registration front door for declared
//!   covalence commands
//! - [`NativeCommandTable`]: capability the host implements over the
//!   engine's own command list
//!
//! ## Example
//!
//! ```rust
//! use palisade_commands::{CommandLibrary, MemoryCommandTable};
//! use palisade_core::Plugin;
//!
//! let library = CommandLibrary::new(MemoryCommandTable::new());
//! let plugin = Plugin::builder("Greeter", "Greeter", "palisade", "1.0.0").build();
//!
//! library.add_chat_command("hello", &plugin, |player, _, _| {
//!     player.reply("Hello!");
//! })?;
//! assert!(library.has_chat_command("hello"));
//! # Ok::<(), palisade_commands::CommandError>(())
//! ```

pub mod covalence;
pub mod error;
pub mod native;
pub mod parser;
pub mod registry;

// Re-exports for convenience
pub use covalence::CovalenceCommandSystem;
pub use error::CommandError;
pub use native::{MemoryCommandTable, NativeCallbackFn, NativeCommand, NativeCommandTable};
pub use parser::parse_command;
pub use registry::{ChatCallbackFn, CommandLibrary, ConsoleCallbackFn};

/// Version of the commands crate, for host/plugin compatibility reporting.
pub const PALISADE_COMMANDS_VERSION: &str = env!("CARGO_PKG_VERSION");
