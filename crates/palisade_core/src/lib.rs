//! # Palisade Core
//!
//! The hook dispatch and plugin lifecycle core of the Palisade modding
//! framework. Game servers embed this crate to let plugins intercept and
//! shape engine behavior without the host ever trusting plugin code.
//!
//! ## Key Features
//!
//! - **Declared hook tables**: plugins bind named hooks to handlers at
//!   construction, so the dispatch path is a plain table walk
//! - **Signature reconciliation**: callers and handlers may disagree on
//!   arity; arguments are truncated or padded from declared defaults, with
//!   by-ref slots copied back
//! - **Conflict-aware broadcast**: every subscriber sees each hook, the
//!   last non-null return wins, and disagreements are reported
//! - **Containment**: handler errors and panics are caught at the call
//!   boundary; one broken plugin never takes the server down
//! - **Timing telemetry**: slow hooks are reported per call and over a
//!   rolling window, with zero cost for nested calls
//!
//! ## Architecture
//!
//! - [`Plugin`]: one loaded script unit with its hook table, config, and
//!   telemetry
//! - [`PluginManager`]: the loaded set, hook subscriptions, and broadcast
//! - [`PluginLoader`] / [`CatalogLoader`]: discovery and lifecycle
//! - [`Context`]: shared services handed to plugins and loaders
//!
//! ## Example
//!
//! ```rust
//! use palisade_core::{bind_hooks, HookValue, Plugin, PluginManager};
//!
//! let manager = PluginManager::new();
//! let plugin = bind_hooks!(
//!     Plugin::builder("Greeter", "Greeter", "palisade", "1.0.0");
//!     "OnPlayerConnected" => |_, _| Ok(Some(HookValue::Text("welcome".to_string()))),
//! )
//! .build();
//! manager.add_plugin(plugin)?;
//!
//! let greeting = manager.call_hook("OnPlayerConnected", &mut []);
//! assert_eq!(greeting, Some(HookValue::Text("welcome".to_string())));
//! # Ok::<(), palisade_core::PluginError>(())
//! ```

pub mod args;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod loader;
pub mod logging;
pub mod manager;
pub mod players;
pub mod plugin;
pub mod table;
pub mod telemetry;

// Re-exports for convenience
pub use args::{HookArgsExt, HookSignature, HookValue, ParamKind, ParamSpec};
pub use config::{
    CommandSettings, DirectorySettings, FrameworkConfig, LoggingSettings, PluginConfig,
};
pub use context::Context;
pub use data::{DataFileSystem, KnownPlayers, PlayerRecord};
pub use error::{ConfigError, DataError, HookError, PluginError};
pub use loader::{CatalogLoader, PluginLoader};
pub use manager::PluginManager;
pub use players::{Player, PlayerManager, Server};
pub use plugin::{CovalenceCommandSpec, Plugin, PluginBuilder};
pub use table::{HookHandlerFn, HookMethod, HookTable};
pub use telemetry::{DispatchStats, HookTelemetry};

/// Version of the core crate, for host/plugin compatibility reporting.
pub const PALISADE_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
