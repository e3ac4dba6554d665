//! Room membership
//!
//! The server scopes appointment events to rooms: one per hospital and one
//! for administrators. [`RoomMembershipManager`] records which rooms this
//! client claims and makes sure the server hears about them on every
//! connection, including intents issued before the connection was live.

use parking_lot::Mutex;
use socket_transport::{
    DisconnectReason, SessionId, SessionObserver, SocketPacket, TransportSession,
};

use crate::event::RecordId;
use crate::names;

/// Hospital identifier as used in `join-hospital` / `leave-hospital`.
pub type HospitalId = RecordId;

/// A membership scope on the event server.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum Room {
    Hospital(HospitalId),
    Admin,
}

impl Room {
    pub fn hospital(id: impl Into<HospitalId>) -> Self {
        Room::Hospital(id.into())
    }

    /// Server-side room name (`hospital:<id>` or `admin`).
    pub fn name(&self) -> String {
        match self {
            Room::Hospital(id) => format!("hospital:{}", id),
            Room::Admin => "admin".to_string(),
        }
    }

    pub fn join_packet(&self) -> SocketPacket {
        match self {
            Room::Hospital(id) => SocketPacket::event(names::JOIN_HOSPITAL, vec![id.to_value()]),
            Room::Admin => SocketPacket::event(names::JOIN_ADMIN, vec![]),
        }
    }

    pub fn leave_packet(&self) -> SocketPacket {
        match self {
            Room::Hospital(id) => SocketPacket::event(names::LEAVE_HOSPITAL, vec![id.to_value()]),
            Room::Admin => SocketPacket::event(names::LEAVE_ADMIN, vec![]),
        }
    }
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Default)]
struct Membership {
    /// Claimed rooms in join order
    rooms: Vec<Room>,
    /// Session whose connection is currently live, if any
    live: Option<SessionId>,
}

/// Tracks claimed rooms and re-asserts them on every connection.
///
/// Register it as a [`SessionObserver`] on each session it serves. Join and
/// leave frames are written immediately only while that session's
/// connection is live; otherwise the intent is recorded and the join is
/// sent on the next `connect` transition, in join order.
#[derive(Debug, Default)]
pub struct RoomMembershipManager {
    inner: Mutex<Membership>,
}

impl RoomMembershipManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `room`. Returns whether a join frame was sent now.
    ///
    /// Claiming a room twice keeps one entry; the join is re-sent if live.
    pub fn join(&self, room: Room, session: Option<&TransportSession>) -> bool {
        let mut inner = self.inner.lock();
        if !inner.rooms.contains(&room) {
            inner.rooms.push(room.clone());
        }

        match session {
            Some(session) if inner.live == Some(session.id()) => {
                tracing::info!("Joining room {}", room);
                session.send(room.join_packet())
            }
            _ => {
                tracing::debug!("Room {} recorded, join deferred until connected", room);
                false
            }
        }
    }

    /// Drop the claim on `room`. Returns whether a leave frame was sent now.
    ///
    /// While not live this only removes the pending join.
    pub fn leave(&self, room: &Room, session: Option<&TransportSession>) -> bool {
        let mut inner = self.inner.lock();
        let was_member = inner.rooms.contains(room);
        inner.rooms.retain(|r| r != room);

        match session {
            Some(session) if inner.live == Some(session.id()) => {
                tracing::info!("Leaving room {}", room);
                session.send(room.leave_packet())
            }
            _ => {
                if was_member {
                    tracing::debug!("Pending join for room {} withdrawn", room);
                }
                false
            }
        }
    }

    pub fn join_hospital(&self, id: impl Into<HospitalId>, session: Option<&TransportSession>) -> bool {
        self.join(Room::hospital(id), session)
    }

    pub fn leave_hospital(&self, id: impl Into<HospitalId>, session: Option<&TransportSession>) -> bool {
        self.leave(&Room::hospital(id), session)
    }

    pub fn join_admin(&self, session: Option<&TransportSession>) -> bool {
        self.join(Room::Admin, session)
    }

    pub fn leave_admin(&self, session: Option<&TransportSession>) -> bool {
        self.leave(&Room::Admin, session)
    }

    /// Claimed rooms in join order.
    pub fn rooms(&self) -> Vec<Room> {
        self.inner.lock().rooms.clone()
    }

    pub fn is_member(&self, room: &Room) -> bool {
        self.inner.lock().rooms.contains(room)
    }

    /// Whether `session` is the live connection this manager writes to.
    pub fn is_live(&self, session: SessionId) -> bool {
        self.inner.lock().live == Some(session)
    }

    /// Forget every claimed room without sending anything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        if !inner.rooms.is_empty() {
            tracing::debug!("Clearing {} room claims", inner.rooms.len());
        }
        inner.rooms.clear();
    }
}

impl SessionObserver for RoomMembershipManager {
    fn on_connected(&self, session: SessionId, socket_id: &str) -> Vec<SocketPacket> {
        let mut inner = self.inner.lock();
        inner.live = Some(session);
        if !inner.rooms.is_empty() {
            tracing::info!(
                "Joining {} room(s) on {} as {}",
                inner.rooms.len(),
                session,
                socket_id
            );
        }
        inner.rooms.iter().map(Room::join_packet).collect()
    }

    fn on_disconnected(&self, session: SessionId, _reason: DisconnectReason) {
        let mut inner = self.inner.lock();
        if inner.live == Some(session) {
            inner.live = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use socket_transport::mock::{wait_until, MockServer};
    use socket_transport::TransportConfig;
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn start(server: &MockServer, rooms: &Arc<RoomMembershipManager>) -> TransportSession {
        let config = TransportConfig::default()
            .with_reconnection_delay(Duration::from_millis(10), Duration::from_millis(20))
            .with_randomization_factor(0.0);
        TransportSession::start(
            config,
            Arc::new(server.connector()),
            &tokio::runtime::Handle::current(),
            vec![Arc::clone(rooms) as Arc<dyn SessionObserver>],
        )
    }

    #[test]
    fn test_room_names_and_frames() {
        let room = Room::hospital(7u64);
        assert_eq!(room.name(), "hospital:7");
        assert_eq!(Room::Admin.to_string(), "admin");
        assert_eq!(room.join_packet().encode(), r#"2["join-hospital",7]"#);
        assert_eq!(room.leave_packet().encode(), r#"2["leave-hospital",7]"#);
        assert_eq!(Room::Admin.join_packet().encode(), r#"2["join-admin"]"#);
    }

    #[test]
    fn test_membership_without_session() {
        let rooms = RoomMembershipManager::new();
        assert!(!rooms.join_hospital(42u64, None));
        assert!(!rooms.join_hospital(42u64, None));
        assert!(!rooms.join_admin(None));
        assert_eq!(rooms.rooms(), vec![Room::hospital(42u64), Room::Admin]);

        assert!(!rooms.leave_hospital(42u64, None));
        assert_eq!(rooms.rooms(), vec![Room::Admin]);

        rooms.clear();
        assert!(rooms.rooms().is_empty());
    }

    #[test]
    fn test_connect_returns_joins_in_order() {
        let rooms = RoomMembershipManager::new();
        rooms.join_admin(None);
        rooms.join_hospital("h-3", None);

        let session = SessionId::next();
        let packets = rooms.on_connected(session, "sock-1");
        assert_eq!(
            packets,
            vec![
                SocketPacket::event("join-admin", vec![]),
                SocketPacket::event("join-hospital", vec![json!("h-3")]),
            ]
        );
        assert!(rooms.is_live(session));

        rooms.on_disconnected(session, DisconnectReason::TransportClose);
        assert!(!rooms.is_live(session));
    }

    #[tokio::test]
    async fn test_pending_join_is_flushed_on_connect() {
        let server = MockServer::new();
        server.fail_next_connects(1);
        let rooms = Arc::new(RoomMembershipManager::new());
        let session = start(&server, &rooms);

        assert!(!rooms.join_hospital(42u64, Some(&session)));
        assert!(server.sent_events().is_empty());

        assert!(wait_until(WAIT, || server.sent_events().len() == 1).await);
        assert_eq!(
            server.sent_events()[0],
            ("join-hospital".to_string(), vec![json!(42)])
        );
        session.disconnect();
    }

    #[tokio::test]
    async fn test_live_join_and_leave_are_sent_immediately() {
        let server = MockServer::new();
        let rooms = Arc::new(RoomMembershipManager::new());
        let session = start(&server, &rooms);
        assert!(wait_until(WAIT, || rooms.is_live(session.id())).await);

        assert!(rooms.join_admin(Some(&session)));
        assert!(rooms.leave_admin(Some(&session)));
        assert!(wait_until(WAIT, || server.sent_events().len() == 2).await);

        let names: Vec<String> = server.sent_events().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["join-admin", "leave-admin"]);
        assert!(rooms.rooms().is_empty());
        session.disconnect();
    }

    #[tokio::test]
    async fn test_rooms_are_rejoined_after_reconnect() {
        let server = MockServer::new();
        let rooms = Arc::new(RoomMembershipManager::new());
        let session = start(&server, &rooms);
        assert!(wait_until(WAIT, || session.is_connected()).await);

        rooms.join_hospital(7u64, Some(&session));
        assert!(wait_until(WAIT, || server.sent_events().len() == 1).await);

        server.drop_connection();
        assert!(wait_until(WAIT, || server.open_count() == 2 && session.is_connected()).await);
        assert!(wait_until(WAIT, || server.sent_events().len() == 2).await);
        assert_eq!(
            server.sent_events()[1],
            ("join-hospital".to_string(), vec![json!(7)])
        );
        session.disconnect();
    }
}
