//! Engine.IO v4 and Socket.IO v4 packet codec
//!
//! Two layers are encoded here. Engine.IO packets are what travels on a
//! transport (one per websocket text frame, or several per polling body
//! separated by `\x1e`). A Socket.IO packet is carried as the data of an
//! Engine.IO `message` packet.
//!
//! Only the default namespace and text packets are supported; acks and
//! binary attachments are rejected with `PacketError::Unsupported`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PacketError;

/// Record separator between packets in a polling payload.
pub const PAYLOAD_SEPARATOR: char = '\x1e';

/// Probe string exchanged during a websocket upgrade.
pub const PROBE: &str = "probe";

fn default_max_payload() -> u64 {
    1_000_000
}

/// Data carried by the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id (distinct from the Socket.IO socket id)
    pub sid: String,
    /// Transports the server allows upgrading to
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
    /// Largest payload the server accepts, in bytes
    #[serde(default = "default_max_payload")]
    pub max_payload: u64,
}

impl Handshake {
    /// How long the client waits for a ping before declaring the transport lost.
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }

    /// Whether the server offers an upgrade to websocket.
    pub fn offers_websocket(&self) -> bool {
        self.upgrades.iter().any(|u| u == "websocket")
    }
}

/// An Engine.IO packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Encode as the text form used on both transports.
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                // Serializing a struct of strings and integers cannot fail
                let json = serde_json::to_string(handshake).unwrap_or_default();
                format!("0{}", json)
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }

    /// Decode a single packet.
    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let data = chars.as_str();

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(data)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(data.to_string())),
            '3' => Ok(EnginePacket::Pong(data.to_string())),
            '4' => Ok(EnginePacket::Message(data.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            'b' => Err(PacketError::Unsupported("binary payload".to_string())),
            other => Err(PacketError::UnknownType(other)),
        }
    }

    /// Decode a polling response body into its packets.
    pub fn decode_payload(body: &str) -> Result<Vec<Self>, PacketError> {
        body.split(PAYLOAD_SEPARATOR)
            .filter(|part| !part.is_empty())
            .map(EnginePacket::decode)
            .collect()
    }

    /// Encode several packets into one polling request body.
    pub fn encode_payload(packets: &[EnginePacket]) -> String {
        let mut body = String::new();
        for (i, packet) in packets.iter().enumerate() {
            if i > 0 {
                body.push(PAYLOAD_SEPARATOR);
            }
            body.push_str(&packet.encode());
        }
        body
    }
}

/// A Socket.IO packet on the default namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace handshake; the server reply carries the socket id
    Connect { sid: Option<String> },
    /// Namespace teardown, from either side
    Disconnect,
    /// Named event with JSON arguments
    Event {
        name: String,
        args: Vec<Value>,
        ack_id: Option<u64>,
    },
    /// Namespace handshake refused by the server
    ConnectError(Value),
}

impl SocketPacket {
    /// Event packet without an ack id.
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        SocketPacket::Event {
            name: name.into(),
            args,
            ack_id: None,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect { sid: None } => "0".to_string(),
            SocketPacket::Connect { sid: Some(sid) } => {
                format!("0{}", serde_json::json!({ "sid": sid }))
            }
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { name, args, ack_id } => {
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                let ack = ack_id.map(|id| id.to_string()).unwrap_or_default();
                format!("2{}{}", ack, Value::Array(array))
            }
            SocketPacket::ConnectError(detail) => format!("4{}", detail),
        }
    }

    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let rest = strip_namespace(chars.as_str())?;

        match kind {
            '0' => {
                if rest.is_empty() {
                    return Ok(SocketPacket::Connect { sid: None });
                }
                let value: Value = serde_json::from_str(rest)?;
                let sid = value
                    .get("sid")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(SocketPacket::Connect { sid })
            }
            '1' => Ok(SocketPacket::Disconnect),
            '2' => decode_event(rest),
            '3' => Err(PacketError::Unsupported("ack".to_string())),
            '4' => {
                let detail = if rest.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(rest)?
                };
                Ok(SocketPacket::ConnectError(detail))
            }
            '5' | '6' => Err(PacketError::Unsupported("binary attachment".to_string())),
            other => Err(PacketError::UnknownType(other)),
        }
    }

    /// Wrap into the Engine.IO `message` packet that carries it.
    pub fn into_engine(self) -> EnginePacket {
        EnginePacket::Message(self.encode())
    }

    /// Human readable detail from a CONNECT_ERROR payload.
    pub fn error_message(detail: &Value) -> String {
        match detail {
            Value::String(message) => message.clone(),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| detail.to_string()),
            Value::Null => "connection refused".to_string(),
            other => other.to_string(),
        }
    }
}

fn strip_namespace(rest: &str) -> Result<&str, PacketError> {
    if !rest.starts_with('/') {
        return Ok(rest);
    }
    let (namespace, remainder) = match rest.find(',') {
        Some(idx) => (&rest[..idx], &rest[idx + 1..]),
        None => (rest, ""),
    };
    if namespace == "/" {
        Ok(remainder)
    } else {
        Err(PacketError::UnsupportedNamespace(namespace.to_string()))
    }
}

fn decode_event(rest: &str) -> Result<SocketPacket, PacketError> {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        Some(
            rest[..digits]
                .parse::<u64>()
                .map_err(|e| PacketError::InvalidJson(e.to_string()))?,
        )
    } else {
        None
    };

    let value: Value = serde_json::from_str(&rest[digits..])?;
    let mut items = match value {
        Value::Array(items) => items,
        _ => return Err(PacketError::MissingEventName),
    };
    if items.is_empty() {
        return Err(PacketError::MissingEventName);
    }
    let name = match items.remove(0) {
        Value::String(name) => name,
        _ => return Err(PacketError::MissingEventName),
    };

    Ok(SocketPacket::Event {
        name,
        args: items,
        ack_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open_packet() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();

        match packet {
            EnginePacket::Open(handshake) => {
                assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
                assert!(handshake.offers_websocket());
                assert_eq!(handshake.heartbeat_deadline(), Duration::from_millis(45_000));
            }
            other => panic!("Expected open packet, got {:?}", other),
        }
    }

    #[test]
    fn test_open_packet_defaults() {
        let packet =
            EnginePacket::decode(r#"0{"sid":"abc","pingInterval":100,"pingTimeout":50}"#).unwrap();
        let EnginePacket::Open(handshake) = packet else {
            panic!("Expected open packet");
        };
        assert!(handshake.upgrades.is_empty());
        assert!(!handshake.offers_websocket());
        assert_eq!(handshake.max_payload, 1_000_000);
    }

    #[test]
    fn test_polling_payload_split() {
        let body = "2\x1e42[\"rendez-vous-update\",{}]\x1e6";
        let packets = EnginePacket::decode_payload(body).unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], EnginePacket::Ping(String::new()));
        assert_eq!(
            packets[1],
            EnginePacket::Message("2[\"rendez-vous-update\",{}]".to_string())
        );
        assert_eq!(packets[2], EnginePacket::Noop);
    }

    #[test]
    fn test_socket_connect_reply() {
        let packet = SocketPacket::decode(r#"0{"sid":"oSO0OpakmsTM8gCSAAAB"}"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Connect {
                sid: Some("oSO0OpakmsTM8gCSAAAB".to_string())
            }
        );
    }

    #[test]
    fn test_event_with_ack_id() {
        let packet = SocketPacket::decode(r#"2["join-hospital",7]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "join-hospital".to_string(),
                args: vec![json!(7)],
                ack_id: None,
            }
        );

        let packet = SocketPacket::decode(r#"213["ping",{"a":1}]"#).unwrap();
        match packet {
            SocketPacket::Event { name, ack_id, .. } => {
                assert_eq!(name, "ping");
                assert_eq!(ack_id, Some(13));
            }
            other => panic!("Expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_default_namespace_prefix_is_accepted() {
        let packet = SocketPacket::decode(r#"2/,["join-admin"]"#).unwrap();
        assert_eq!(packet, SocketPacket::event("join-admin", vec![]));

        let err = SocketPacket::decode(r#"2/admin,["x"]"#).unwrap_err();
        assert_eq!(err, PacketError::UnsupportedNamespace("/admin".to_string()));
    }

    #[test]
    fn test_connect_error_message() {
        let packet = SocketPacket::decode(r#"4{"message":"Not authorized"}"#).unwrap();
        let SocketPacket::ConnectError(detail) = packet else {
            panic!("Expected connect error");
        };
        assert_eq!(SocketPacket::error_message(&detail), "Not authorized");
        assert_eq!(
            SocketPacket::error_message(&json!("plain")),
            "plain".to_string()
        );
    }

    #[test]
    fn test_encode_outbound_frames() {
        assert_eq!(SocketPacket::Connect { sid: None }.into_engine().encode(), "40");
        assert_eq!(SocketPacket::Disconnect.into_engine().encode(), "41");
        assert_eq!(
            SocketPacket::event("join-hospital", vec![json!(42)])
                .into_engine()
                .encode(),
            r#"42["join-hospital",42]"#
        );
        assert_eq!(
            SocketPacket::event("leave-admin", vec![]).into_engine().encode(),
            r#"42["leave-admin"]"#
        );
    }
}
