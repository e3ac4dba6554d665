//! Event dispatch for inbound Socket.IO events.
//!
//! This module provides the `DispatchTable`, the transport's own map from
//! event name to handler entries. The session driver calls
//! [`DispatchTable::dispatch`] for every inbound event and lifecycle event.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::types::HandlerId;

/// An inbound event as it came off the wire: name plus JSON arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Event name, e.g. `rendez-vous-notification` or `connect`
    pub name: String,
    /// Arguments following the name in the event array
    pub args: Vec<Value>,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// First argument, the payload for every event this channel carries.
    pub fn payload(&self) -> Option<&Value> {
        self.args.first()
    }
}

/// Handler invoked with each matching event.
pub type RawCallback = Arc<dyn Fn(&RawEvent) + Send + Sync>;

/// Routes inbound events to handlers registered by event name.
///
/// Handlers for one name run in registration order. The table is cloneable
/// and all clones share the same entries.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: Arc<RwLock<HashMap<String, Vec<(HandlerId, RawCallback)>>>>,
}

impl DispatchTable {
    /// Create an empty dispatch table.
    ///
    /// # Example
    ///
    /// ```
    /// use socket_transport::dispatch::DispatchTable;
    ///
    /// let table = DispatchTable::new();
    /// assert_eq!(table.handler_count("connect"), 0);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event`.
    ///
    /// Adding the same id twice creates two entries; both are invoked.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use socket_transport::dispatch::{DispatchTable, RawEvent};
    /// use socket_transport::HandlerId;
    ///
    /// let table = DispatchTable::new();
    /// table.add("rendez-vous-update", HandlerId::next(), Arc::new(|event: &RawEvent| {
    ///     println!("update: {:?}", event.payload());
    /// }));
    /// assert_eq!(table.handler_count("rendez-vous-update"), 1);
    /// ```
    pub fn add(&self, event: &str, id: HandlerId, callback: RawCallback) {
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, callback));
    }

    /// Remove the first entry with `id` under `event`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(entries) = handlers.get_mut(event) else {
            return false;
        };
        let removed = match entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        };
        if entries.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Remove every entry under `event`, returning how many were removed.
    pub fn remove_event(&self, event: &str) -> usize {
        self.handlers
            .write()
            .remove(event)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Remove every entry for every event.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Number of entries under `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .read()
            .get(event)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Total number of entries across all events.
    pub fn total_handlers(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Invoke every handler registered for `event.name`.
    ///
    /// The handler list is snapshotted before invocation, so handlers may
    /// add or remove entries without deadlocking. A panicking handler is
    /// logged and does not prevent the remaining handlers from running.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, event: &RawEvent) -> usize {
        let snapshot: Vec<(HandlerId, RawCallback)> = match self.handlers.read().get(&event.name)
        {
            Some(entries) => entries.clone(),
            None => {
                tracing::trace!(event = %event.name, "No handlers registered");
                return 0;
            }
        };

        for (id, callback) in &snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(event)));
            if outcome.is_err() {
                tracing::error!(event = %event.name, handler = %id, "Event handler panicked");
            }
        }

        snapshot.len()
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        let mut map = f.debug_map();
        for (name, entries) in handlers.iter() {
            map.entry(name, &entries.len());
        }
        map.finish()
    }
}
