//! Dashboard bindings
//!
//! A dashboard mounts onto a [`NotificationClient`]: it connects, joins its
//! room, shows incoming `rendez-vous-notification` messages in a short feed
//! and calls a refresh hook on every `rendez-vous-update`. Dropping the
//! dashboard unmounts it: listeners removed, room left, client disconnected.

use std::collections::VecDeque;
use std::sync::Arc;

use afya_events::{names, HospitalId, InboundEvent, Listener, RendezVousNotification, RendezVousUpdate, Room};
use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::client::NotificationClient;

/// A notification as shown in a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub notification: RendezVousNotification,
    pub received_at: DateTime<Local>,
}

impl FeedEntry {
    pub fn message(&self) -> &str {
        &self.notification.message
    }
}

/// Most recent notifications, newest first, bounded.
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    entries: VecDeque<FeedEntry>,
    capacity: usize,
}

impl NotificationFeed {
    /// Entries kept by a dashboard feed
    pub const DEFAULT_CAPACITY: usize = 5;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Put `notification` at the front, evicting the oldest entry when full.
    pub fn push(&mut self, notification: RendezVousNotification) {
        self.entries.push_front(FeedEntry {
            notification,
            received_at: Local::now(),
        });
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> Vec<FeedEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Messages, newest first.
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.notification.message.clone())
            .collect()
    }

    pub fn latest(&self) -> Option<&FeedEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared mount logic for both dashboards.
struct Mount {
    client: NotificationClient,
    room: Room,
    feed: Arc<Mutex<NotificationFeed>>,
    listeners: Vec<(&'static str, Listener)>,
    mounted: bool,
}

impl Mount {
    fn new<F>(client: &NotificationClient, room: Room, on_refresh: F) -> Self
    where
        F: Fn(&RendezVousUpdate) + Send + Sync + 'static,
    {
        client.connect();
        client.join_room(room.clone());

        let feed = Arc::new(Mutex::new(NotificationFeed::new()));
        let sink = Arc::clone(&feed);
        let label = room.name();
        let notifications = client.on(names::RENDEZ_VOUS_NOTIFICATION, move |event| {
            if let InboundEvent::Notification(notification) = event {
                tracing::info!("[{}] {}", label, notification.message);
                sink.lock().push(notification.clone());
            }
        });
        let updates = client.on(names::RENDEZ_VOUS_UPDATE, move |event| {
            if let InboundEvent::Update(update) = event {
                on_refresh(update);
            }
        });

        tracing::debug!("Dashboard mounted on {}", room);
        Self {
            client: client.clone(),
            room,
            feed,
            listeners: vec![
                (names::RENDEZ_VOUS_NOTIFICATION, notifications),
                (names::RENDEZ_VOUS_UPDATE, updates),
            ],
            mounted: true,
        }
    }

    fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;

        for (event, listener) in self.listeners.drain(..) {
            self.client.off(event, Some(&listener));
        }
        self.client.leave_room(&self.room);
        self.client.disconnect();
        tracing::debug!("Dashboard unmounted from {}", self.room);
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Live view for one hospital's staff.
///
/// Unmounting disconnects the whole client, which also ends any other
/// dashboard mounted on the same client.
pub struct HospitalDashboard {
    hospital: HospitalId,
    mount: Mount,
}

impl HospitalDashboard {
    /// Connect, join `hospital:<id>` and start listening.
    ///
    /// `on_refresh` runs on the client's worker thread for every
    /// `rendez-vous-update`; keep it short.
    pub fn mount<F>(client: &NotificationClient, hospital: impl Into<HospitalId>, on_refresh: F) -> Self
    where
        F: Fn(&RendezVousUpdate) + Send + Sync + 'static,
    {
        let hospital = hospital.into();
        let mount = Mount::new(client, Room::Hospital(hospital.clone()), on_refresh);
        Self { hospital, mount }
    }

    pub fn hospital(&self) -> &HospitalId {
        &self.hospital
    }

    /// Snapshot of the feed, newest first.
    pub fn notifications(&self) -> Vec<FeedEntry> {
        self.mount.feed.lock().entries()
    }

    pub fn feed(&self) -> NotificationFeed {
        self.mount.feed.lock().clone()
    }

    pub fn unmount(mut self) {
        self.mount.unmount();
    }
}

/// Live view for platform administrators, fed by the `admin` room.
pub struct AdminDashboard {
    mount: Mount,
}

impl AdminDashboard {
    pub fn mount<F>(client: &NotificationClient, on_refresh: F) -> Self
    where
        F: Fn(&RendezVousUpdate) + Send + Sync + 'static,
    {
        Self {
            mount: Mount::new(client, Room::Admin, on_refresh),
        }
    }

    pub fn notifications(&self) -> Vec<FeedEntry> {
        self.mount.feed.lock().entries()
    }

    pub fn feed(&self) -> NotificationFeed {
        self.mount.feed.lock().clone()
    }

    pub fn unmount(mut self) {
        self.mount.unmount();
    }
}
