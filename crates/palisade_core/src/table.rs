//! The per-plugin hook table.
//!
//! Every plugin owns one [`HookTable`], built once while the plugin is
//! constructed. It maps hook names to ordered method bindings; binding order
//! is execution order, so shared/base layers that bind first also fire
//! first. After construction the table is read-only, which is what lets
//! handlers re-enter dispatch without any lock juggling.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::args::{HookSignature, HookValue};
use crate::error::HookError;
use crate::plugin::Plugin;

/// The callable bound to a hook name.
///
/// Handlers receive the owning plugin (for nested hook calls, config access,
/// error raising) and the argument slice. `Ok(None)` means the handler has
/// no opinion on the hook's outcome.
pub type HookHandlerFn =
    dyn Fn(&Plugin, &mut [HookValue]) -> Result<Option<HookValue>, HookError> + Send + Sync;

/// One method binding: a declared signature plus the handler itself.
pub struct HookMethod {
    signature: HookSignature,
    handler: Arc<HookHandlerFn>,
}

impl HookMethod {
    pub fn new<F>(signature: HookSignature, handler: F) -> Self
    where
        F: Fn(&Plugin, &mut [HookValue]) -> Result<Option<HookValue>, HookError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            signature,
            handler: Arc::new(handler),
        }
    }

    pub fn signature(&self) -> &HookSignature {
        &self.signature
    }

    /// Invoke the bound method against the caller's argument slice.
    ///
    /// When the supplied arity matches the declared arity the handler runs
    /// directly on the caller's slice, so any mutation it makes is visible
    /// to the caller. Otherwise the arguments are reconciled into a fresh
    /// vector first, and after a successful call only by-ref parameters are
    /// copied back, and only into slots the caller actually supplied.
    pub(crate) fn invoke(
        &self,
        plugin: &Plugin,
        args: &mut [HookValue],
    ) -> Result<Option<HookValue>, HookError> {
        if self.signature.arity() == args.len() {
            return (self.handler)(plugin, args);
        }

        let mut reconciled = self.signature.reconcile(args);
        let result = (self.handler)(plugin, &mut reconciled)?;
        for (index, param) in self.signature.params().iter().enumerate() {
            if param.is_by_ref() && index < args.len() {
                args[index] = reconciled[index].clone();
            }
        }
        Ok(result)
    }
}

impl fmt::Debug for HookMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookMethod")
            .field("arity", &self.signature.arity())
            .finish()
    }
}

/// Hook name → ordered method bindings for one plugin.
#[derive(Debug, Default)]
pub struct HookTable {
    bindings: HashMap<String, SmallVec<[Arc<HookMethod>; 2]>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding for `hook`. Bindings fire in the order they were
    /// added.
    pub fn bind<F>(&mut self, hook: impl Into<String>, signature: HookSignature, handler: F)
    where
        F: Fn(&Plugin, &mut [HookValue]) -> Result<Option<HookValue>, HookError>
            + Send
            + Sync
            + 'static,
    {
        let hook = hook.into();
        debug!("📝 Bound handler for hook '{}'", hook);
        self.bindings
            .entry(hook)
            .or_insert_with(SmallVec::new)
            .push(Arc::new(HookMethod::new(signature, handler)));
    }

    /// The bindings for `hook`, in execution order. Empty when none exist.
    pub fn methods(&self, hook: &str) -> &[Arc<HookMethod>] {
        self.bindings
            .get(hook)
            .map(|methods| methods.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_hook(&self, hook: &str) -> bool {
        self.bindings.contains_key(hook)
    }

    /// All hook names with at least one binding.
    pub fn hook_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Total number of bindings across all hooks.
    pub fn len(&self) -> usize {
        self.bindings.values().map(SmallVec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
