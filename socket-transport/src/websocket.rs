//! WebSocket transport.
//!
//! Each Engine.IO packet travels as one text frame. The same task loop
//! (`run_websocket`) also serves connections that started on polling and
//! were upgraded.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::link::{Connector, Link, LinkIo};
use crate::packet::{EnginePacket, PROBE};
use crate::types::TransportKind;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens connections over the websocket transport.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, config: &TransportConfig) -> Result<Link> {
        let url = config.endpoint(TransportKind::WebSocket, None)?;
        tracing::debug!(url = %url, "Opening websocket transport");

        let mut ws = dial(&url).await?;
        let handshake = match read_text(&mut ws).await? {
            EnginePacket::Open(handshake) => handshake,
            other => {
                return Err(TransportError::Handshake(format!(
                    "expected open packet, got {:?}",
                    other
                )))
            }
        };

        tracing::debug!(sid = %handshake.sid, "Websocket transport open");
        let (mut link, io) = Link::channel(handshake, TransportKind::WebSocket);
        link.attach(tokio::spawn(run_websocket(ws, io)));
        Ok(link)
    }
}

pub(crate) async fn dial(url: &Url) -> Result<WsStream> {
    let (ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;
    Ok(ws)
}

pub(crate) async fn send_packet(ws: &mut WsStream, packet: &EnginePacket) -> Result<()> {
    ws.send(Message::Text(packet.encode().into()))
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))
}

/// Read frames until the next Engine.IO text packet.
async fn read_text(ws: &mut WsStream) -> Result<EnginePacket> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(text.as_str())?),
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
        }
    }
}

/// Open a websocket bound to an existing Engine.IO session and run the
/// `2probe`/`3probe` exchange. The returned stream is ready for the `5`
/// upgrade packet.
pub(crate) async fn probe(url: Url, limit: Duration) -> Result<WsStream> {
    let attempt = async {
        let mut ws = dial(&url).await?;
        send_packet(&mut ws, &EnginePacket::Ping(PROBE.to_string())).await?;
        match read_text(&mut ws).await? {
            EnginePacket::Pong(data) if data == PROBE => Ok(ws),
            other => Err(TransportError::Handshake(format!(
                "unexpected upgrade probe reply {:?}",
                other
            ))),
        }
    };

    tokio::time::timeout(limit, attempt)
        .await
        .map_err(|_| TransportError::Timeout("websocket upgrade probe".to_string()))?
}

/// Drive a websocket until either side closes it.
pub(crate) async fn run_websocket(ws: WsStream, mut io: LinkIo) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            outgoing = io.outbound.recv() => {
                match outgoing {
                    Some(packet) => {
                        let closing = packet == EnginePacket::Close;
                        tracing::trace!(frame = %packet.encode(), "ws >>");
                        if let Err(e) = sink.send(Message::Text(packet.encode().into())).await {
                            let _ = io.inbound.send(Err(TransportError::WebSocket(e.to_string())));
                            break;
                        }
                        if closing {
                            let _ = sink.close().await;
                            break;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        tracing::trace!(frame = %text.as_str(), "ws <<");
                        let decoded = EnginePacket::decode(text.as_str()).map_err(TransportError::from);
                        if io.inbound.send(decoded).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!("Ignoring binary websocket frame");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = io.inbound.send(Err(TransportError::WebSocket(e.to_string())));
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("Websocket transport finished");
}
