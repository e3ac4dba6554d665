//! Dashboards mounted on a client backed by the in-memory event server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use afya_notify::{names, AdminDashboard, ConnectionState, HospitalDashboard, NotificationClient, Room, TransportConfig};
use rstest::rstest;
use serde_json::json;
use socket_transport::mock::{wait_for, MockServer};

const WAIT: Duration = Duration::from_secs(2);

fn client(server: &MockServer) -> NotificationClient {
    NotificationClient::with_connector(TransportConfig::default(), Arc::new(server.connector())).unwrap()
}

fn notify(server: &MockServer, message: &str) {
    assert!(server.push_event(
        names::RENDEZ_VOUS_NOTIFICATION,
        vec![json!({ "message": message })],
    ));
}

#[test]
fn test_hospital_dashboard_shows_latest_notification_first() {
    let server = MockServer::new();
    let client = client(&server);
    let dashboard = HospitalDashboard::mount(&client, 7u64, |_| {});

    assert!(wait_for(WAIT, || server.sent_events().len() == 1));
    assert_eq!(
        server.sent_events()[0],
        ("join-hospital".to_string(), vec![json!(7)])
    );
    assert_eq!(client.rooms(), vec![Room::hospital(7u64)]);

    notify(&server, "RDV #9 en attente");
    assert!(wait_for(WAIT, || dashboard.notifications().len() == 1));
    assert_eq!(dashboard.notifications()[0].message(), "RDV #9 en attente");

    for i in 10..16 {
        notify(&server, &format!("RDV #{} en attente", i));
    }
    assert!(wait_for(WAIT, || {
        dashboard
            .notifications()
            .first()
            .map_or(false, |e| e.message() == "RDV #15 en attente")
    }));
    let messages = dashboard.feed().messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[4], "RDV #11 en attente");
}

#[rstest]
#[case(json!({ "appointmentId": 3, "status": "confirme" }))]
#[case(json!({}))]
fn test_update_triggers_refresh(#[case] payload: serde_json::Value) {
    let server = MockServer::new();
    let client = client(&server);
    let refreshes = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&refreshes);
    let _dashboard = HospitalDashboard::mount(&client, 7u64, move |_| {
        inner.fetch_add(1, Ordering::SeqCst);
    });
    assert!(wait_for(WAIT, || client.is_connected()));

    server.push_event(names::RENDEZ_VOUS_UPDATE, vec![payload]);
    assert!(wait_for(WAIT, || refreshes.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_unmount_leaves_room_and_disconnects() {
    let server = MockServer::new();
    let client = client(&server);
    let dashboard = HospitalDashboard::mount(&client, "h-3", |_| {});
    assert_eq!(dashboard.hospital().to_string(), "h-3");
    assert!(wait_for(WAIT, || server.sent_events().len() == 1));

    dashboard.unmount();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.rooms().is_empty());
    assert_eq!(client.listener_count(names::RENDEZ_VOUS_NOTIFICATION), 0);

    assert!(wait_for(WAIT, || server.sent_events().len() == 2));
    assert_eq!(
        server.sent_events()[1],
        ("leave-hospital".to_string(), vec![json!("h-3")])
    );
}

#[test]
fn test_drop_unmounts() {
    let server = MockServer::new();
    let client = client(&server);
    {
        let _dashboard = AdminDashboard::mount(&client, |_| {});
        assert!(wait_for(WAIT, || server.sent_events().len() == 1));
        assert_eq!(server.sent_events()[0].0, "join-admin");
    }
    assert!(!client.is_connected());
    assert!(wait_for(WAIT, || !server.is_link_open()));
}

#[test]
fn test_dashboards_sharing_a_client_share_everything() {
    let server = MockServer::new();
    let client = client(&server);
    let hospital = HospitalDashboard::mount(&client, 1u64, |_| {});
    let admin = AdminDashboard::mount(&client, |_| {});

    assert!(wait_for(WAIT, || server.sent_events().len() == 2));
    assert_eq!(client.rooms(), vec![Room::hospital(1u64), Room::Admin]);
    assert_eq!(server.open_count(), 1);

    // A notification for either room reaches both feeds
    notify(&server, "RDV #1 en attente");
    assert!(wait_for(WAIT, || hospital.notifications().len() == 1));
    assert!(wait_for(WAIT, || admin.notifications().len() == 1));

    // Unmounting one tears down the shared connection for both
    hospital.unmount();
    assert!(!client.is_connected());
    assert_eq!(client.listener_count(names::RENDEZ_VOUS_NOTIFICATION), 0);
    drop(admin);
}
