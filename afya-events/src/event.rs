//! Typed inbound events
//!
//! Raw Socket.IO events arrive as a name plus JSON arguments. This module
//! maps the names the dashboards care about onto typed payloads and keeps
//! everything else available as [`InboundEvent::Other`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use socket_transport::RawEvent;

use crate::error::{EventError, Result};
use crate::names;

/// Identifier of a hospital or appointment record.
///
/// The API hands out numeric ids, but string ids are accepted and passed
/// through unchanged.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Numeric(u64),
    Text(String),
}

impl RecordId {
    /// JSON form sent on the wire (number or string, never quoted numbers).
    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Numeric(id) => Value::from(*id),
            RecordId::Text(id) => Value::from(id.clone()),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Numeric(id) => write!(f, "{}", id),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        RecordId::Numeric(id)
    }
}

impl From<u32> for RecordId {
    fn from(id: u32) -> Self {
        RecordId::Numeric(u64::from(id))
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Text(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Text(id)
    }
}

/// Payload of `rendez-vous-notification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendezVousNotification {
    /// Human readable text shown in the dashboard feed
    pub message: String,
    /// Any other fields the server includes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RendezVousNotification {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extra: Map::new(),
        }
    }
}

/// Payload of `rendez-vous-update`. Every field is optional; the event is
/// primarily a signal to refetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RendezVousUpdate {
    #[serde(rename = "appointmentId", default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An event delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Connection (re-)established
    Connected,
    /// Connection lost or closed, with the Socket.IO reason string
    Disconnected { reason: String },
    /// A connection attempt failed
    ConnectError { detail: String },
    Notification(RendezVousNotification),
    Update(RendezVousUpdate),
    /// Any event without a typed mapping, or whose payload did not parse
    Other { name: String, args: Vec<Value> },
}

impl InboundEvent {
    /// Map a raw event, falling back to `Other` when the payload is malformed.
    pub fn from_raw(raw: &RawEvent) -> Self {
        match Self::try_from_raw(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Delivering '{}' untyped: {}", raw.name, e);
                InboundEvent::Other {
                    name: raw.name.clone(),
                    args: raw.args.clone(),
                }
            }
        }
    }

    /// Map a raw event, reporting malformed payloads.
    pub fn try_from_raw(raw: &RawEvent) -> Result<Self> {
        let event = match raw.name.as_str() {
            names::CONNECT => InboundEvent::Connected,
            names::DISCONNECT => InboundEvent::Disconnected {
                reason: raw
                    .payload()
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            },
            names::CONNECT_ERROR => InboundEvent::ConnectError {
                detail: match raw.payload() {
                    Some(Value::Object(map)) => map
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
                    Some(Value::String(detail)) => detail.clone(),
                    Some(other) => other.to_string(),
                    None => "unknown error".to_string(),
                },
            },
            names::RENDEZ_VOUS_NOTIFICATION => {
                let payload = raw.payload().ok_or_else(|| EventError::MissingPayload {
                    event: raw.name.clone(),
                })?;
                InboundEvent::Notification(parse(&raw.name, payload)?)
            }
            names::RENDEZ_VOUS_UPDATE => match raw.payload() {
                None | Some(Value::Null) => InboundEvent::Update(RendezVousUpdate::default()),
                Some(payload) => InboundEvent::Update(parse(&raw.name, payload)?),
            },
            _ => InboundEvent::Other {
                name: raw.name.clone(),
                args: raw.args.clone(),
            },
        };
        Ok(event)
    }

    /// Event name this value was decoded from.
    pub fn name(&self) -> &str {
        match self {
            InboundEvent::Connected => names::CONNECT,
            InboundEvent::Disconnected { .. } => names::DISCONNECT,
            InboundEvent::ConnectError { .. } => names::CONNECT_ERROR,
            InboundEvent::Notification(_) => names::RENDEZ_VOUS_NOTIFICATION,
            InboundEvent::Update(_) => names::RENDEZ_VOUS_UPDATE,
            InboundEvent::Other { name, .. } => name,
        }
    }

    /// Whether this is one of the connection lifecycle events.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            InboundEvent::Connected
                | InboundEvent::Disconnected { .. }
                | InboundEvent::ConnectError { .. }
        )
    }
}

fn parse<T: serde::de::DeserializeOwned>(event: &str, payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone()).map_err(|source| EventError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_payload() {
        let raw = RawEvent::new(
            names::RENDEZ_VOUS_NOTIFICATION,
            vec![json!({ "message": "RDV #9 en attente", "rendezVousId": 9 })],
        );

        match InboundEvent::from_raw(&raw) {
            InboundEvent::Notification(notification) => {
                assert_eq!(notification.message, "RDV #9 en attente");
                assert_eq!(notification.extra.get("rendezVousId"), Some(&json!(9)));
            }
            other => panic!("Expected notification, got {:?}", other),
        }
    }

    #[test]
    fn test_update_payload_fields_are_optional() {
        let raw = RawEvent::new(
            names::RENDEZ_VOUS_UPDATE,
            vec![json!({ "appointmentId": 12, "status": "confirme" })],
        );
        let InboundEvent::Update(update) = InboundEvent::from_raw(&raw) else {
            panic!("Expected update");
        };
        assert_eq!(update.appointment_id, Some(RecordId::Numeric(12)));
        assert_eq!(update.status.as_deref(), Some("confirme"));

        let bare = RawEvent::new(names::RENDEZ_VOUS_UPDATE, vec![]);
        assert_eq!(
            InboundEvent::from_raw(&bare),
            InboundEvent::Update(RendezVousUpdate::default())
        );
    }

    #[test]
    fn test_malformed_payload_falls_back_to_other() {
        let raw = RawEvent::new(names::RENDEZ_VOUS_NOTIFICATION, vec![json!(42)]);
        assert!(InboundEvent::try_from_raw(&raw).is_err());
        assert_eq!(
            InboundEvent::from_raw(&raw),
            InboundEvent::Other {
                name: names::RENDEZ_VOUS_NOTIFICATION.to_string(),
                args: vec![json!(42)],
            }
        );

        let missing = RawEvent::new(names::RENDEZ_VOUS_NOTIFICATION, vec![]);
        assert!(matches!(
            InboundEvent::try_from_raw(&missing),
            Err(EventError::MissingPayload { .. })
        ));
    }

    #[test]
    fn test_lifecycle_events() {
        let connect = InboundEvent::from_raw(&RawEvent::new(names::CONNECT, vec![]));
        assert_eq!(connect, InboundEvent::Connected);
        assert!(connect.is_lifecycle());

        let disconnect =
            InboundEvent::from_raw(&RawEvent::new(names::DISCONNECT, vec![json!("ping timeout")]));
        assert_eq!(
            disconnect,
            InboundEvent::Disconnected {
                reason: "ping timeout".to_string()
            }
        );

        let error = InboundEvent::from_raw(&RawEvent::new(
            names::CONNECT_ERROR,
            vec![json!({ "message": "Timed out: transport handshake" })],
        ));
        assert_eq!(error.name(), "connect_error");
        assert_eq!(
            error,
            InboundEvent::ConnectError {
                detail: "Timed out: transport handshake".to_string()
            }
        );
    }

    #[test]
    fn test_record_id_wire_form() {
        assert_eq!(RecordId::from(7u64).to_value(), json!(7));
        assert_eq!(RecordId::from("h-7").to_value(), json!("h-7"));
        assert_eq!(RecordId::from(7u64).to_string(), "7");
        let parsed: RecordId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(parsed, RecordId::Text("abc".to_string()));
    }
}
