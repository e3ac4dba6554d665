//! Sync iterator for consuming events from a NotificationClient
//!
//! Provides a blocking iterator interface over one event name, fed by a
//! listener registered on the client, for callers that prefer pulling
//! events over writing callbacks.

use std::sync::{mpsc, Arc, Mutex, Weak};
use std::time::Duration;

use afya_events::{InboundEvent, Listener};
use socket_transport::HandlerId;

use crate::client::{ClientInner, NotificationClient};

/// De-registers the feeding listener when the last stream clone goes away.
struct Registration {
    client: Weak<ClientInner>,
    event: String,
    listener: HandlerId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(client) = NotificationClient::upgrade(&self.client) {
            client.off_by_id(&self.event, self.listener);
        }
    }
}

/// Blocking iterator over events of one name
///
/// This iterator blocks on `next()` until an event is available or the
/// feeding listener is removed (by `off`, `remove_all_listeners`,
/// `disconnect` or dropping the client). Use `try_recv()` for non-blocking
/// access.
pub struct EventStream {
    rx: Arc<Mutex<mpsc::Receiver<InboundEvent>>>,
    registration: Option<Arc<Registration>>,
}

impl EventStream {
    /// Register a listener for `event` that feeds a new stream.
    ///
    /// Returns `None` if the client has no session to listen on.
    pub(crate) fn register(client: &NotificationClient, event: &str, capacity: usize) -> Option<Self> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let name = event.to_string();

        let listener = Listener::new(move |incoming| match tx.try_send(incoming.clone()) {
            Ok(()) => {}
            Err(mpsc::TrySendError::Full(_)) => {
                tracing::warn!("Event stream for '{}' is full, dropping event", name);
            }
            Err(mpsc::TrySendError::Disconnected(_)) => {}
        });

        if !client.on_listener(event, &listener) {
            return None;
        }

        Some(Self {
            rx: Arc::new(Mutex::new(rx)),
            registration: Some(Arc::new(Registration {
                client: client.downgrade(),
                event: event.to_string(),
                listener: listener.id(),
            })),
        })
    }

    #[cfg(test)]
    fn from_receiver(rx: mpsc::Receiver<InboundEvent>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
            registration: None,
        }
    }

    /// Event name this stream listens to.
    pub fn event(&self) -> Option<&str> {
        self.registration.as_ref().map(|r| r.event.as_str())
    }

    /// Block until an event is available
    ///
    /// Returns `None` once the feeding listener is gone.
    pub fn recv(&self) -> Option<InboundEvent> {
        self.rx.lock().ok()?.recv().ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<InboundEvent> {
        self.rx.lock().ok()?.try_recv().ok()
    }

    /// Block until an event is available or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<InboundEvent> {
        self.rx.lock().ok()?.recv_timeout(timeout).ok()
    }

    /// Get a non-blocking iterator over currently buffered events
    pub fn try_iter(&self) -> TryIterator<'_> {
        TryIterator { inner: self }
    }

    /// Get a blocking iterator that waits up to `timeout` per item
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIterator<'_> {
        TimeoutIterator {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for EventStream {
    type Item = InboundEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Clone for EventStream {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
            registration: self.registration.clone(),
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("event", &self.event())
            .finish()
    }
}

/// Non-blocking iterator over currently buffered events
pub struct TryIterator<'a> {
    inner: &'a EventStream,
}

impl<'a> Iterator for TryIterator<'a> {
    type Item = InboundEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with timeout
pub struct TimeoutIterator<'a> {
    inner: &'a EventStream,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIterator<'a> {
    type Item = InboundEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_recv_empty() {
        let (tx, rx) = mpsc::channel::<InboundEvent>();
        let stream = EventStream::from_receiver(rx);

        assert!(stream.try_recv().is_none());
        assert_eq!(stream.event(), None);
        drop(tx);
    }

    #[test]
    fn test_recv_timeout_empty() {
        let (tx, rx) = mpsc::channel::<InboundEvent>();
        let stream = EventStream::from_receiver(rx);

        let start = std::time::Instant::now();
        assert!(stream.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
        drop(tx);
    }

    #[test]
    fn test_try_iter_drains_buffered_events() {
        let (tx, rx) = mpsc::channel();
        let stream = EventStream::from_receiver(rx);
        tx.send(InboundEvent::Connected).unwrap();
        tx.send(InboundEvent::Disconnected {
            reason: "transport close".to_string(),
        })
        .unwrap();

        let events: Vec<_> = stream.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], InboundEvent::Connected);
        assert!(stream.try_iter().next().is_none());
    }

    #[test]
    fn test_recv_ends_when_sender_is_gone() {
        let (tx, rx) = mpsc::channel::<InboundEvent>();
        let mut stream = EventStream::from_receiver(rx);
        drop(tx);
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_clone_shares_receiver() {
        let (tx, rx) = mpsc::channel();
        let first = EventStream::from_receiver(rx);
        let second = first.clone();

        tx.send(InboundEvent::Connected).unwrap();
        assert_eq!(second.try_recv(), Some(InboundEvent::Connected));
        assert!(first.try_recv().is_none());
    }
}
