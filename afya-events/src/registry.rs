//! Listener registration with targeted and bulk removal
//!
//! The [`ListenerRegistry`] keeps its own ordered list of listeners per
//! event name and mirrors every change into the transport session's
//! dispatch table, so the two never disagree about who gets called.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use socket_transport::{HandlerId, RawEvent, TransportSession};

use crate::event::InboundEvent;

/// Callback invoked with each typed event.
pub type EventCallback = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// A registered (or registrable) callback with a stable identity.
///
/// Cloning a `Listener` keeps its identity: registering a clone is the same
/// as registering the original twice, and either can be used to remove it.
#[derive(Clone)]
pub struct Listener {
    id: HandlerId,
    callback: EventCallback,
}

impl Listener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        Self {
            id: HandlerId::next(),
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

/// Ordered event-name to listener bookkeeping, kept in lock-step with a
/// session's dispatch table.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: Mutex<BTreeMap<String, Vec<Listener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event`.
    ///
    /// Requires a session (in any state); without one nothing is recorded
    /// and `false` is returned. Registering the same listener twice adds a
    /// second entry, so it will be invoked twice per event. Use
    /// [`contains`](Self::contains) to avoid that.
    pub fn on(&self, session: Option<&TransportSession>, event: &str, listener: &Listener) -> bool {
        let Some(session) = session else {
            tracing::warn!("Cannot listen for '{}': no transport session", event);
            return false;
        };

        let mut listeners = self.listeners.lock();
        listeners
            .entry(event.to_string())
            .or_default()
            .push(listener.clone());
        wire(session, event, listener);
        tracing::debug!("Listener {} registered for '{}'", listener.id, event);
        true
    }

    /// Remove one registration of `listener` (the first) or, with `None`,
    /// every listener for `event`. Returns how many entries were removed.
    ///
    /// Bookkeeping is updated even without a session.
    pub fn off(
        &self,
        session: Option<&TransportSession>,
        event: &str,
        listener: Option<&Listener>,
    ) -> usize {
        match listener {
            Some(listener) => self.off_by_id(session, event, listener.id),
            None => {
                let mut listeners = self.listeners.lock();
                if let Some(session) = session {
                    session.dispatch().remove_event(event);
                }
                let removed = listeners.remove(event).map(|l| l.len()).unwrap_or(0);
                if removed > 0 {
                    tracing::debug!("Removed {} listener(s) for '{}'", removed, event);
                }
                removed
            }
        }
    }

    /// Remove the first registration with `id` under `event`.
    pub fn off_by_id(&self, session: Option<&TransportSession>, event: &str, id: HandlerId) -> usize {
        let mut listeners = self.listeners.lock();
        if let Some(session) = session {
            session.dispatch().remove(event, id);
        }

        let Some(entries) = listeners.get_mut(event) else {
            return 0;
        };
        let removed = match entries.iter().position(|l| l.id == id) {
            Some(idx) => {
                entries.remove(idx);
                1
            }
            None => 0,
        };
        if entries.is_empty() {
            listeners.remove(event);
        }
        if removed > 0 {
            tracing::debug!("Listener {} removed from '{}'", id, event);
        }
        removed
    }

    /// Remove every listener for every event.
    pub fn remove_all(&self, session: Option<&TransportSession>) {
        let mut listeners = self.listeners.lock();
        if let Some(session) = session {
            for event in listeners.keys() {
                session.dispatch().remove_event(event);
            }
        }
        let total: usize = listeners.values().map(Vec::len).sum();
        listeners.clear();
        if total > 0 {
            tracing::debug!("Removed all {} listener(s)", total);
        }
    }

    /// Wire every recorded listener into a new session's dispatch table,
    /// preserving registration order.
    pub fn attach(&self, session: &TransportSession) {
        let listeners = self.listeners.lock();
        for (event, entries) in listeners.iter() {
            for listener in entries {
                wire(session, event, listener);
            }
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.lock().values().map(Vec::len).sum()
    }

    /// Event names with at least one listener, sorted.
    pub fn event_types(&self) -> Vec<String> {
        self.listeners.lock().keys().cloned().collect()
    }

    pub fn contains(&self, event: &str, listener: &Listener) -> bool {
        self.listeners
            .lock()
            .get(event)
            .map_or(false, |entries| entries.iter().any(|l| l.id == listener.id))
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

fn wire(session: &TransportSession, event: &str, listener: &Listener) {
    let callback = Arc::clone(&listener.callback);
    session.dispatch().add(
        event,
        listener.id,
        Arc::new(move |raw: &RawEvent| {
            let typed = InboundEvent::from_raw(raw);
            callback(&typed);
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names;
    use serde_json::json;
    use socket_transport::mock::{wait_until, MockServer};
    use socket_transport::TransportConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let listener = Listener::new(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    fn session(server: &MockServer) -> TransportSession {
        TransportSession::start(
            TransportConfig::default(),
            Arc::new(server.connector()),
            &tokio::runtime::Handle::current(),
            Vec::new(),
        )
    }

    #[test]
    fn test_on_without_session_is_a_no_op() {
        let registry = ListenerRegistry::new();
        let (_, listener) = counter();

        assert!(!registry.on(None, names::RENDEZ_VOUS_UPDATE, &listener));
        assert!(registry.is_empty());
        assert_eq!(registry.off(None, names::RENDEZ_VOUS_UPDATE, Some(&listener)), 0);
        registry.remove_all(None);
    }

    #[tokio::test]
    async fn test_bookkeeping_mirrors_dispatch_table() {
        let server = MockServer::new();
        let session = session(&server);
        let registry = ListenerRegistry::new();
        let (_, a) = counter();
        let (_, b) = counter();

        registry.on(Some(&session), "x", &a);
        registry.on(Some(&session), "x", &a);
        registry.on(Some(&session), "y", &b);
        assert_eq!(registry.listener_count("x"), 2);
        assert_eq!(session.dispatch().handler_count("x"), 2);
        assert!(registry.contains("x", &a));
        assert!(!registry.contains("x", &b));
        assert_eq!(registry.event_types(), vec!["x", "y"]);

        assert_eq!(registry.off(Some(&session), "x", Some(&a)), 1);
        assert_eq!(registry.listener_count("x"), 1);
        assert_eq!(session.dispatch().handler_count("x"), 1);

        assert_eq!(registry.off(Some(&session), "y", None), 1);
        assert_eq!(session.dispatch().handler_count("y"), 0);

        registry.remove_all(Some(&session));
        assert!(registry.is_empty());
        assert_eq!(session.dispatch().total_handlers(), 0);
        session.disconnect();
    }

    #[tokio::test]
    async fn test_removed_listener_never_fires_again() {
        let server = MockServer::new();
        let session = session(&server);
        let registry = ListenerRegistry::new();
        let (kept_count, kept) = counter();
        let (removed_count, removed) = counter();

        registry.on(Some(&session), names::RENDEZ_VOUS_UPDATE, &kept);
        registry.on(Some(&session), names::RENDEZ_VOUS_UPDATE, &removed);
        assert!(wait_until(WAIT, || session.is_connected()).await);

        registry.off(Some(&session), names::RENDEZ_VOUS_UPDATE, Some(&removed));
        server.push_event(names::RENDEZ_VOUS_UPDATE, vec![json!({})]);

        assert!(wait_until(WAIT, || kept_count.load(Ordering::SeqCst) == 1).await);
        assert_eq!(removed_count.load(Ordering::SeqCst), 0);
        session.disconnect();
    }

    #[tokio::test]
    async fn test_listeners_receive_typed_events() {
        let server = MockServer::new();
        let session = session(&server);
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = Listener::new(move |event| sink.lock().push(event.clone()));

        registry.on(Some(&session), names::RENDEZ_VOUS_NOTIFICATION, &listener);
        assert!(wait_until(WAIT, || session.is_connected()).await);
        server.push_event(
            names::RENDEZ_VOUS_NOTIFICATION,
            vec![json!({ "message": "RDV #9 en attente" })],
        );

        assert!(wait_until(WAIT, || seen.lock().len() == 1).await);
        match &seen.lock()[0] {
            InboundEvent::Notification(n) => assert_eq!(n.message, "RDV #9 en attente"),
            other => panic!("Expected notification, got {:?}", other),
        }
        session.disconnect();
    }

    #[tokio::test]
    async fn test_attach_rewires_into_new_session() {
        let server = MockServer::new();
        let first = session(&server);
        let registry = ListenerRegistry::new();
        let (_, listener) = counter();
        registry.on(Some(&first), "x", &listener);
        registry.on(Some(&first), "x", &listener);
        first.disconnect();

        let second = session(&server);
        registry.attach(&second);
        assert_eq!(second.dispatch().handler_count("x"), 2);
        second.disconnect();
    }
}
