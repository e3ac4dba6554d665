//! Synchronous notification client
//!
//! [`NotificationClient`] is the handle dashboards hold. It owns the
//! transport session (at most one live at a time), the room membership and
//! the listener registry, and hides the async transport behind a background
//! worker thread.

use std::sync::{Arc, Weak};
use std::time::Duration;

use afya_events::{HospitalId, InboundEvent, Listener, ListenerRegistry, Room, RoomMembershipManager};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use socket_transport::{
    ConnectionState, Connector, HandlerId, SessionObserver, TransportConfig, TransportConnector,
    TransportKind, TransportSession,
};

use crate::error::Result;
use crate::iter::EventStream;
use crate::worker::RuntimeWorker;

/// How long dropping the last client waits for sessions to close cleanly.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub(crate) struct ClientInner {
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    session: Mutex<Option<TransportSession>>,
    // Disconnected sessions whose drivers may still be writing their close
    closing: Mutex<Vec<TransportSession>>,
    rooms: Arc<RoomMembershipManager>,
    listeners: ListenerRegistry,
    // Declared last so the session is torn down before the runtime stops
    worker: RuntimeWorker,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let mut closing = std::mem::take(self.closing.get_mut());
        if let Some(session) = self.session.get_mut().take() {
            session.disconnect();
            closing.push(session);
        }
        closing.retain(|session| !session.is_finished());
        if closing.is_empty() {
            return;
        }

        // Stopping the runtime cancels the drivers, so let them send `41`
        // and close their links first
        let drained = self.worker.run_until(
            async move {
                for session in &closing {
                    session.finished().await;
                }
            },
            CLOSE_GRACE,
        );
        if !drained {
            tracing::debug!("Stopping the worker before every session closed");
        }
    }
}

/// Handle to the real-time notification channel.
///
/// Cheap to clone; clones share the same connection, rooms and listeners.
/// All methods are synchronous and return immediately. Connection problems
/// never surface as errors here: they are reported through the `connect_error`
/// and `disconnect` events and through `tracing`.
///
/// Two dashboards mounted on the same client share its membership and
/// listeners, so each one receives events for every room the client joined.
#[derive(Clone)]
pub struct NotificationClient {
    inner: Arc<ClientInner>,
}

impl NotificationClient {
    /// Create a client for the server named by `AFYA_API_URL`.
    pub fn new() -> Result<Self> {
        Self::with_config(TransportConfig::from_env())
    }

    /// Create a client with a custom transport configuration.
    pub fn with_config(config: TransportConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(TransportConnector::new()))
    }

    /// Create a client that opens links through `connector`.
    pub fn with_connector(config: TransportConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let worker = RuntimeWorker::spawn()?;

        tracing::debug!("Notification client created for {}", config.server_url);
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                connector,
                session: Mutex::new(None),
                closing: Mutex::new(Vec::new()),
                rooms: Arc::new(RoomMembershipManager::new()),
                listeners: ListenerRegistry::new(),
                worker,
            }),
        })
    }

    /// Open the connection, or return the existing one.
    ///
    /// A session that is still connecting, connected or reconnecting is
    /// reused. A new one is started only when none exists or the previous
    /// one ended for good. Listeners and rooms recorded on the client carry
    /// over to the new session.
    pub fn connect(&self) -> TransportSession {
        let mut slot = self.inner.session.lock();
        if let Some(session) = slot.as_ref() {
            if !session.is_closed() {
                tracing::debug!("Reusing {} ({})", session.id(), session.state());
                return session.clone();
            }
        }

        let observers: Vec<Arc<dyn SessionObserver>> =
            vec![Arc::clone(&self.inner.rooms) as Arc<dyn SessionObserver>];
        let session = TransportSession::start(
            self.inner.config.clone(),
            Arc::clone(&self.inner.connector),
            self.inner.worker.handle(),
            observers,
        );
        self.inner.listeners.attach(&session);
        tracing::info!("Connecting to {} as {}", self.inner.config.server_url, session.id());

        *slot = Some(session.clone());
        session
    }

    /// Close the connection and forget all listeners and rooms. Idempotent.
    pub fn disconnect(&self) {
        let session = self.inner.session.lock().take();
        self.inner.listeners.remove_all(session.as_ref());
        self.inner.rooms.clear();

        if let Some(session) = session {
            session.disconnect();
            tracing::info!("Disconnected {}", session.id());

            let mut closing = self.inner.closing.lock();
            closing.retain(|s| !s.is_finished());
            closing.push(session);
        }
    }

    pub fn join_hospital_room(&self, id: impl Into<HospitalId>) {
        self.inner.rooms.join_hospital(id, self.session().as_ref());
    }

    pub fn leave_hospital_room(&self, id: impl Into<HospitalId>) {
        self.inner.rooms.leave_hospital(id, self.session().as_ref());
    }

    pub fn join_admin_room(&self) {
        self.inner.rooms.join_admin(self.session().as_ref());
    }

    pub fn leave_admin_room(&self) {
        self.inner.rooms.leave_admin(self.session().as_ref());
    }

    pub(crate) fn join_room(&self, room: Room) {
        self.inner.rooms.join(room, self.session().as_ref());
    }

    pub(crate) fn leave_room(&self, room: &Room) {
        self.inner.rooms.leave(room, self.session().as_ref());
    }

    /// Rooms this client claims, in join order.
    pub fn rooms(&self) -> Vec<Room> {
        self.inner.rooms.rooms()
    }

    /// Register `callback` for `event` and return its [`Listener`] handle.
    ///
    /// Needs a session (call [`connect`](Self::connect) first); without one
    /// the returned listener is not registered. See
    /// [`on_listener`](Self::on_listener) to learn the outcome.
    pub fn on<F>(&self, event: &str, callback: F) -> Listener
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let listener = Listener::new(callback);
        self.on_listener(event, &listener);
        listener
    }

    /// Register an existing listener. Registering it twice delivers each
    /// event to it twice. Returns whether it was registered.
    pub fn on_listener(&self, event: &str, listener: &Listener) -> bool {
        // Holding the slot keeps a concurrent `connect` from attaching the
        // registry to a new session between the lookup and the registration
        let slot = self.inner.session.lock();
        self.inner.listeners.on(slot.as_ref(), event, listener)
    }

    /// Remove the first registration of `listener`, or every listener for
    /// `event` when `None`. Returns how many were removed.
    pub fn off(&self, event: &str, listener: Option<&Listener>) -> usize {
        let slot = self.inner.session.lock();
        self.inner.listeners.off(slot.as_ref(), event, listener)
    }

    pub(crate) fn off_by_id(&self, event: &str, id: HandlerId) -> usize {
        let slot = self.inner.session.lock();
        self.inner.listeners.off_by_id(slot.as_ref(), event, id)
    }

    pub fn remove_all_listeners(&self) {
        let slot = self.inner.session.lock();
        self.inner.listeners.remove_all(slot.as_ref());
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.listener_count(event)
    }

    /// Send `payload` as a single event argument. A payload serializing to
    /// `null` (such as `()`) sends the event with no arguments.
    ///
    /// Sent only while connected; otherwise dropped with a warning. Returns
    /// whether the frame was queued.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> bool {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Dropping '{}': payload does not serialize: {}", event, e);
                return false;
            }
        };
        let args = match value {
            Value::Null => Vec::new(),
            value => vec![value],
        };

        match self.session() {
            Some(session) => session.emit(event, args),
            None => {
                tracing::warn!("Dropping '{}': not connected", event);
                false
            }
        }
    }

    /// Blocking stream of `event`, or `None` without a session.
    ///
    /// The stream buffers up to `event_buffer_size` events; further events
    /// are dropped until it is drained. Dropping the last clone of the
    /// stream removes its listener.
    pub fn events(&self, event: &str) -> Option<EventStream> {
        EventStream::register(self, event, self.inner.config.event_buffer_size)
    }

    /// Whether the connection is up right now (not while reconnecting).
    pub fn is_connected(&self) -> bool {
        self.session().map_or(false, |s| s.is_connected())
    }

    /// Socket id assigned by the server for the current connection.
    pub fn socket_id(&self) -> Option<String> {
        self.session().and_then(|s| s.socket_id())
    }

    pub fn state(&self) -> ConnectionState {
        self.session()
            .map_or(ConnectionState::Disconnected, |s| s.state())
    }

    /// Transport carrying the current connection.
    pub fn transport(&self) -> Option<TransportKind> {
        self.session().and_then(|s| s.transport())
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    fn session(&self) -> Option<TransportSession> {
        self.inner.session.lock().clone()
    }

    pub(crate) fn downgrade(&self) -> Weak<ClientInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<ClientInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }
}

impl std::fmt::Debug for NotificationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationClient")
            .field("server_url", &self.inner.config.server_url)
            .field("state", &self.state())
            .field("rooms", &self.rooms())
            .finish()
    }
}
