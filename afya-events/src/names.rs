//! Event names exchanged with the Afya event server.

/// A new appointment was requested for the hospital (payload: `{ message, ... }`).
pub const RENDEZ_VOUS_NOTIFICATION: &str = "rendez-vous-notification";

/// An appointment changed; dashboards refetch (payload: `{ appointmentId?, status?, ... }`).
pub const RENDEZ_VOUS_UPDATE: &str = "rendez-vous-update";

pub const JOIN_HOSPITAL: &str = "join-hospital";
pub const LEAVE_HOSPITAL: &str = "leave-hospital";
pub const JOIN_ADMIN: &str = "join-admin";
pub const LEAVE_ADMIN: &str = "leave-admin";

pub use socket_transport::{
    CONNECT_ERROR_EVENT as CONNECT_ERROR, CONNECT_EVENT as CONNECT,
    DISCONNECT_EVENT as DISCONNECT,
};
