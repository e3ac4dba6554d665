//! # Afya Realtime Notify
//!
//! A synchronous client for the Afya real-time notification channel, used by
//! the hospital and admin dashboards to learn about appointment
//! (rendez-vous) changes as they happen.
//!
//! ## Overview
//!
//! The event server pushes `rendez-vous-notification` and
//! `rendez-vous-update` events to rooms: one room per hospital and one for
//! administrators. [`NotificationClient`] keeps a single reconnecting
//! connection, remembers which rooms it claimed and which listeners are
//! registered, and re-asserts the rooms after every reconnection.
//!
//! ## Key Features
//!
//! - **Sync API**: no async/await required; every call returns immediately
//! - **Idempotent connect**: a live connection is reused, never duplicated
//! - **Queued joins**: rooms joined before the connection is up are joined
//!   as soon as it is, and again after every reconnection
//! - **Typed events**: listeners receive [`InboundEvent`] values
//! - **Iterator access**: [`NotificationClient::events`] for pull-style consumers
//! - **Dashboards**: [`HospitalDashboard`] and [`AdminDashboard`] mount guards
//!
//! ## Usage
//!
//! ```rust,no_run
//! use afya_notify::{names, HospitalDashboard, InboundEvent, NotificationClient};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads AFYA_API_URL, defaults to http://localhost:4000
//!     let client = NotificationClient::new()?;
//!
//!     let dashboard = HospitalDashboard::mount(&client, 7u64, |update| {
//!         println!("refetch appointments ({:?})", update.status);
//!     });
//!
//!     client.on(names::CONNECT_ERROR, |event| {
//!         if let InboundEvent::ConnectError { detail } = event {
//!             eprintln!("connection failed: {}", detail);
//!         }
//!     });
//!
//!     std::thread::sleep(std::time::Duration::from_secs(60));
//!     for entry in dashboard.notifications() {
//!         println!("{} {}", entry.received_at.format("%H:%M"), entry.message());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! 1. **NotificationClient**: sync facade, cheap to clone
//! 2. **Worker thread**: owns a single-threaded tokio runtime; the transport
//!    session and every listener callback run there
//! 3. **RoomMembershipManager / ListenerRegistry** (`afya-realtime-events`):
//!    membership and listener bookkeeping that outlives a single connection
//! 4. **TransportSession** (`afya-socket-transport`): Engine.IO/Socket.IO
//!    connection with websocket-first transport fallback and backoff

pub mod client;
pub mod dashboard;
pub mod error;
pub mod iter;
mod worker;

pub use client::NotificationClient;
pub use dashboard::{AdminDashboard, FeedEntry, HospitalDashboard, NotificationFeed};
pub use error::{NotifyError, Result};
pub use iter::{EventStream, TimeoutIterator, TryIterator};

// Re-export the types callers need alongside the client
pub use afya_events::{
    names, HospitalId, InboundEvent, Listener, RecordId, RendezVousNotification,
    RendezVousUpdate, Room,
};
pub use socket_transport::{ConnectionState, TransportConfig, TransportKind};
