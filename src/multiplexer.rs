//! Event multiplexer.
//!
//! Routes every event the connection produces (inbound server events and
//! connection status transitions) to the listeners registered for its
//! [`EventKind`]. One shared connection, many independent consumers.
//!
//! Dispatch takes a snapshot of the listener list and releases the lock before
//! any callback runs, so a listener may call [`EventMultiplexer::on`] or
//! [`EventMultiplexer::off`] from inside its own callback. Each callback runs
//! inside `catch_unwind`: a panicking listener is logged and skipped, its
//! siblings and later dispatches are unaffected.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::StoreLinkError;
use crate::models::{EventKind, LinkEvent};

/// Callback invoked for every event of the kind it was registered under.
pub type ListenerCallback = Arc<dyn Fn(&LinkEvent) + Send + Sync>;

/// Handle identifying one registration, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct ListenerEntry {
    id: ListenerId,
    callback: ListenerCallback,
}

/// Result of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Callbacks that returned normally.
    pub delivered: usize,
    /// Callbacks that panicked.
    pub failed: usize,
}

/// Listener registry keyed by event kind.
///
/// Registration order is preserved per kind. Nothing is ordered across kinds.
pub struct EventMultiplexer {
    listeners: Mutex<HashMap<EventKind, Vec<ListenerEntry>>>,
    next_id: AtomicU64,
}

impl Default for EventMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        let counts: HashMap<&str, usize> =
            listeners.iter().map(|(kind, entries)| (kind.as_str(), entries.len())).collect();
        f.debug_struct("EventMultiplexer").field("listeners", &counts).finish()
    }
}

impl EventMultiplexer {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback` for `kind`. Returns the handle to remove it later.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        self.on_arc(kind, Arc::new(callback))
    }

    fn on_arc(&self, kind: EventKind, callback: ListenerCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("[store-link] Registered {} for '{}'", id, kind);
        self.listeners.lock().entry(kind).or_default().push(ListenerEntry { id, callback });
        id
    }

    /// Remove one registration (`Some(id)`) or every registration (`None`)
    /// for `kind`. Unknown kinds and ids are ignored.
    ///
    /// Returns how many registrations were removed.
    pub fn off(&self, kind: &EventKind, id: Option<ListenerId>) -> usize {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(kind) else {
            return 0;
        };

        let removed = match id {
            Some(id) => {
                let before = entries.len();
                entries.retain(|entry| entry.id != id);
                before - entries.len()
            },
            None => {
                let count = entries.len();
                entries.clear();
                count
            },
        };

        if entries.is_empty() {
            listeners.remove(kind);
        }
        removed
    }

    pub fn listener_count(&self, kind: &EventKind) -> usize {
        self.listeners.lock().get(kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Deliver `event` to the listeners of its kind, in registration order.
    pub fn dispatch(&self, event: &LinkEvent) -> DispatchOutcome {
        let kind = event.kind();
        let snapshot: Vec<(ListenerId, ListenerCallback)> = {
            let listeners = self.listeners.lock();
            match listeners.get(&kind) {
                Some(entries) => {
                    entries.iter().map(|entry| (entry.id, Arc::clone(&entry.callback))).collect()
                },
                None => return DispatchOutcome::default(),
            }
        };

        let mut outcome = DispatchOutcome::default();
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => outcome.delivered += 1,
                Err(panic) => {
                    outcome.failed += 1;
                    let err = StoreLinkError::ListenerError(format!(
                        "{} for '{}' panicked: {}",
                        id,
                        kind,
                        panic_message(panic.as_ref())
                    ));
                    warn!("[store-link] {}", err);
                },
            }
        }
        outcome
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn order_event() -> LinkEvent {
        LinkEvent::Server {
            kind: EventKind::OrderCreated,
            payload: json!({ "orderId": "o-1" }),
        }
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let mux = EventMultiplexer::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            mux.on(EventKind::OrderCreated, move |_| seen.lock().push(tag));
        }

        let outcome = mux.dispatch(&order_event());
        assert_eq!(outcome.delivered, 3);
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dispatch_only_reaches_matching_kind() {
        let mux = EventMultiplexer::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        mux.on(EventKind::TicketUpdated, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(mux.dispatch(&order_event()), DispatchOutcome::default());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let mux = EventMultiplexer::new();
        let hits = Arc::new(AtomicUsize::new(0));

        mux.on(EventKind::OrderCreated, |_| panic!("listener blew up"));
        let h = Arc::clone(&hits);
        mux.on(EventKind::OrderCreated, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = mux.dispatch(&order_event());
        assert_eq!(outcome, DispatchOutcome { delivered: 1, failed: 1 });

        // Still registered and still delivering on the next event.
        let outcome = mux.dispatch(&order_event());
        assert_eq!(outcome.failed, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_off_by_id_and_by_kind() {
        let mux = EventMultiplexer::new();
        let a = mux.on(EventKind::KpiUpdated, |_| {});
        let _b = mux.on(EventKind::KpiUpdated, |_| {});
        assert_eq!(mux.listener_count(&EventKind::KpiUpdated), 2);

        assert_eq!(mux.off(&EventKind::KpiUpdated, Some(a)), 1);
        assert_eq!(mux.off(&EventKind::KpiUpdated, Some(a)), 0);
        assert_eq!(mux.listener_count(&EventKind::KpiUpdated), 1);

        assert_eq!(mux.off(&EventKind::KpiUpdated, None), 1);
        assert!(mux.is_empty());
    }

    #[test]
    fn test_off_unknown_kind_is_noop() {
        let mux = EventMultiplexer::new();
        assert_eq!(mux.off(&EventKind::Custom("nope".into()), None), 0);
        assert_eq!(mux.off(&EventKind::OrderCreated, Some(ListenerId(42))), 0);
    }

    #[test]
    fn test_reentrant_registration_during_dispatch() {
        let mux = Arc::new(EventMultiplexer::new());
        let inner = Arc::clone(&mux);

        mux.on(EventKind::OrderCreated, move |_| {
            inner.on(EventKind::OrderCreated, |_| {});
        });

        // New listener is not part of the running snapshot.
        assert_eq!(mux.dispatch(&order_event()).delivered, 1);
        assert_eq!(mux.listener_count(&EventKind::OrderCreated), 2);
    }

    #[test]
    fn test_listener_can_remove_itself() {
        let mux = Arc::new(EventMultiplexer::new());
        let inner = Arc::clone(&mux);
        let own_id = Arc::new(Mutex::new(None));
        let id_slot = Arc::clone(&own_id);

        let id = mux.on(EventKind::OrderCreated, move |_| {
            if let Some(id) = *id_slot.lock() {
                inner.off(&EventKind::OrderCreated, Some(id));
            }
        });
        *own_id.lock() = Some(id);

        assert_eq!(mux.dispatch(&order_event()).delivered, 1);
        assert_eq!(mux.dispatch(&order_event()).delivered, 0);
    }

    #[test]
    fn test_status_events_use_reserved_kind() {
        let mux = EventMultiplexer::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        mux.on(EventKind::Status, move |event| {
            assert!(event.status().is_some());
            h.fetch_add(1, Ordering::SeqCst);
        });

        mux.dispatch(&LinkEvent::Status(Default::default()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
