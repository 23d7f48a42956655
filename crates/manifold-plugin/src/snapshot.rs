// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Immutable extension snapshots and ordered change notification.
//!
//! Delivery is serialized: one caller at a time runs the listeners, and it
//! keeps going until the newest revision has been delivered. A caller that
//! finds a delivery already running returns immediately, so changes made by
//! a listener (or by another thread) are delivered after the current round,
//! never interleaved with it and never out of order.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{error, trace};

use crate::extension::LoadedExtension;

/// The active extensions at one point in time.
#[derive(Clone, PartialEq)]
pub struct ExtensionSnapshot {
    /// Strictly increasing across changes of the same registry.
    pub revision: u64,
    /// Extensions of loaded and enabled plugins, by plugin name then index.
    pub extensions: Arc<[LoadedExtension]>,
}

impl ExtensionSnapshot {
    pub(crate) fn empty() -> Self {
        Self {
            revision: 0,
            extensions: Arc::from(Vec::<LoadedExtension>::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Extensions of one `type`.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a LoadedExtension> + 'a {
        self.extensions.iter().filter(move |e| e.kind == kind)
    }
}

impl fmt::Debug for ExtensionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionSnapshot")
            .field("revision", &self.revision)
            .field(
                "extensions",
                &self.extensions.iter().map(|e| &e.uid).collect::<Vec<_>>(),
            )
            .finish()
    }
}

type Listener = Box<dyn Fn(&ExtensionSnapshot) + Send + Sync>;

struct ListenerSlot {
    id: u64,
    active: AtomicBool,
    callback: Listener,
}

#[derive(Default)]
struct Delivery {
    delivering: bool,
    delivered: u64,
}

/// Listener table plus delivery bookkeeping.
#[derive(Default)]
pub(crate) struct Notifier {
    listeners: Mutex<Vec<Arc<ListenerSlot>>>,
    next_id: AtomicU64,
    delivery: Mutex<Delivery>,
}

impl Notifier {
    pub(crate) fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&ExtensionSnapshot) + Send + Sync + 'static,
    {
        let slot = Arc::new(ListenerSlot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            callback: Box::new(listener),
        });
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&slot));
        trace!(listener = slot.id, "listener subscribed");
        Subscription {
            notifier: Arc::downgrade(self),
            slot,
        }
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver the latest snapshot to every active listener.
    ///
    /// `current` reads the latest snapshot; it is called with the delivery
    /// lock held, so it must not call back into the notifier. Callers must
    /// not hold any lock that `current` takes.
    pub(crate) fn notify(&self, current: impl Fn() -> ExtensionSnapshot) {
        {
            let mut delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
            if delivery.delivering {
                return;
            }
            delivery.delivering = true;
        }

        loop {
            let snapshot = {
                let mut delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
                let snapshot = current();
                if snapshot.revision <= delivery.delivered {
                    delivery.delivering = false;
                    return;
                }
                delivery.delivered = snapshot.revision;
                snapshot
            };

            let listeners: Vec<Arc<ListenerSlot>> = self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();

            for slot in listeners {
                if !slot.active.load(Ordering::Acquire) {
                    continue;
                }
                let outcome = catch_unwind(AssertUnwindSafe(|| (slot.callback)(&snapshot)));
                if outcome.is_err() {
                    error!(
                        listener = slot.id,
                        revision = snapshot.revision,
                        "extension listener panicked"
                    );
                }
            }
        }
    }

    fn remove(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|slot| slot.id != id);
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to stop receiving snapshots.
pub struct Subscription {
    notifier: Weak<Notifier>,
    slot: Arc<ListenerSlot>,
}

impl Subscription {
    /// Stop delivering snapshots to this listener.
    ///
    /// Idempotent, and safe to call from inside a listener: the listener is
    /// not invoked again, including later in the current delivery round.
    pub fn unsubscribe(&self) {
        if !self.slot.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.remove(self.slot.id);
        }
        trace!(listener = self.slot.id, "listener unsubscribed");
    }

    pub fn is_active(&self) -> bool {
        self.slot.active.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.slot.id)
            .field("active", &self.is_active())
            .finish()
    }
}
