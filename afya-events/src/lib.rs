//! Room membership, typed events and listener registry for the Afya
//! real-time notification channel.
//!
//! This crate sits between the raw transport (`afya-socket-transport`) and
//! the dashboard-facing facade (`afya-realtime-notify`):
//!
//! - [`RoomMembershipManager`]: which rooms (`hospital:<id>`, `admin`) this
//!   client claims; joins issued before the connection is live are flushed
//!   on connect, and every room is re-joined after a reconnection.
//! - [`ListenerRegistry`]: event name to ordered [`Listener`]s, mirrored
//!   into the session's dispatch table.
//! - [`InboundEvent`]: typed view of the events the server pushes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use afya_events::{names, InboundEvent, Listener, ListenerRegistry, RoomMembershipManager};
//! use socket_transport::{SessionObserver, TransportConfig, TransportConnector, TransportSession};
//!
//! #[tokio::main]
//! async fn main() {
//!     let rooms = Arc::new(RoomMembershipManager::new());
//!     let registry = ListenerRegistry::new();
//!
//!     let session = TransportSession::start(
//!         TransportConfig::from_env(),
//!         Arc::new(TransportConnector::new()),
//!         &tokio::runtime::Handle::current(),
//!         vec![rooms.clone() as Arc<dyn SessionObserver>],
//!     );
//!
//!     rooms.join_hospital(7u64, Some(&session));
//!     registry.on(
//!         Some(&session),
//!         names::RENDEZ_VOUS_NOTIFICATION,
//!         &Listener::new(|event| {
//!             if let InboundEvent::Notification(n) = event {
//!                 println!("{}", n.message);
//!             }
//!         }),
//!     );
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     session.disconnect();
//! }
//! ```

pub mod error;
pub mod event;
pub mod names;
pub mod registry;
pub mod rooms;

pub use error::{EventError, Result};
pub use event::{InboundEvent, RecordId, RendezVousNotification, RendezVousUpdate};
pub use registry::{EventCallback, Listener, ListenerRegistry};
pub use rooms::{HospitalId, Room, RoomMembershipManager};
