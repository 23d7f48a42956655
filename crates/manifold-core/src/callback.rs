// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot rendezvous between executing plugin code and the awaiting loader.
//!
//! Before a `callback`-registered plugin's scripts run, the loader installs a
//! slot keyed by plugin name with [`EntryCallbacks::expect`]. The executing
//! code delivers its entry module through an [`EntryCallback`] handle, which
//! consumes the slot so it can fire at most once. The slot is removed when the
//! [`PendingEntry`] is dropped, whether or not the load succeeded.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ManifoldError;
use crate::traits::PluginEntryModule;
use crate::types::PluginId;

/// An entry module delivered through the callback, with the identity it was announced under.
pub struct RegisteredEntry {
    pub id: PluginId,
    pub module: Arc<dyn PluginEntryModule>,
}

impl fmt::Debug for RegisteredEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredEntry")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

struct Slot {
    token: u64,
    sender: oneshot::Sender<RegisteredEntry>,
}

type SlotTable = Mutex<HashMap<String, Slot>>;

/// Keyed table of loaders currently waiting for an entry callback.
#[derive(Clone, Default)]
pub struct EntryCallbacks {
    slots: Arc<SlotTable>,
    next_token: Arc<AtomicU64>,
}

impl EntryCallbacks {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a slot for `plugin_name`.
    ///
    /// Fails if another load of the same plugin is already waiting.
    pub fn expect(&self, plugin_name: &str) -> Result<PendingEntry, ManifoldError> {
        let (sender, receiver) = oneshot::channel();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(plugin_name) {
            return Err(ManifoldError::EntryModule {
                plugin: plugin_name.to_string(),
                message: "an entry callback is already pending for this plugin".to_string(),
            });
        }
        slots.insert(plugin_name.to_string(), Slot { token, sender });
        debug!(plugin = plugin_name, "entry callback slot installed");

        Ok(PendingEntry {
            plugin_name: plugin_name.to_string(),
            token,
            receiver,
            slots: Arc::clone(&self.slots),
        })
    }

    /// A handle executors use to deliver entry modules.
    pub fn callback(&self) -> EntryCallback {
        EntryCallback {
            slots: Arc::downgrade(&self.slots),
        }
    }

    /// Number of loads currently waiting for their entry module.
    pub fn pending_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for EntryCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryCallbacks")
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Narrowly scoped handle that delivers an entry module to its waiting loader.
#[derive(Clone)]
pub struct EntryCallback {
    slots: Weak<SlotTable>,
}

impl EntryCallback {
    /// Deliver `module` for `plugin_id` (`name@version` or `name`).
    ///
    /// Returns `false` when no loader is waiting for that plugin, including
    /// when the slot already fired or was torn down.
    pub fn register(&self, plugin_id: &str, module: Arc<dyn PluginEntryModule>) -> bool {
        let id = match plugin_id.parse::<PluginId>() {
            Ok(id) => id,
            Err(never) => match never {},
        };

        let Some(slots) = self.slots.upgrade() else {
            warn!(plugin = %id, "entry callback invoked after the callback table was dropped");
            return false;
        };

        let slot = slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.name);

        match slot {
            Some(slot) => {
                debug!(plugin = %id, "entry module delivered");
                slot.sender.send(RegisteredEntry { id, module }).is_ok()
            }
            None => {
                warn!(plugin = %id, "entry callback invoked but no load is waiting for it");
                false
            }
        }
    }
}

impl fmt::Debug for EntryCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryCallback").finish_non_exhaustive()
    }
}

/// A loader's outstanding expectation of an entry callback.
pub struct PendingEntry {
    plugin_name: String,
    token: u64,
    receiver: oneshot::Receiver<RegisteredEntry>,
    slots: Arc<SlotTable>,
}

impl PendingEntry {
    /// Wait up to `timeout` for the entry module to be delivered.
    pub async fn wait(mut self, timeout: Duration) -> Result<RegisteredEntry, ManifoldError> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(entry)) => Ok(entry),
            Ok(Err(_)) => Err(ManifoldError::EntryModule {
                plugin: self.plugin_name.clone(),
                message: "entry callback slot was torn down before delivery".to_string(),
            }),
            Err(_) => Err(ManifoldError::Timeout { duration: timeout }),
        }
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots
            .get(&self.plugin_name)
            .is_some_and(|slot| slot.token == self.token)
        {
            slots.remove(&self.plugin_name);
            debug!(plugin = %self.plugin_name, "entry callback slot removed");
        }
    }
}

impl fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEntry")
            .field("plugin_name", &self.plugin_name)
            .finish_non_exhaustive()
    }
}
