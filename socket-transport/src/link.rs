//! A running transport connection and the trait that opens one.
//!
//! A [`Link`] is the session driver's view of an open Engine.IO connection:
//! a pair of channels to a background task that owns the socket or the
//! polling loop. Transports create the pair with [`Link::channel`], keep the
//! [`LinkIo`] half inside their task and hand the `Link` back to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::packet::{EnginePacket, Handshake};
use crate::types::TransportKind;

/// How long `shutdown` waits for the transport task to flush its close.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Opens Engine.IO connections.
///
/// Implementations return once the Engine.IO `open` packet has been
/// received; the Socket.IO namespace handshake is left to the session.
/// The session puts no deadline on `open`: implementations bound each
/// transport attempt by `connect_timeout` themselves.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, config: &TransportConfig) -> Result<Link>;
}

/// Session-side handle of an open connection.
pub struct Link {
    handshake: Handshake,
    kind: Arc<RwLock<TransportKind>>,
    outbound: mpsc::UnboundedSender<EnginePacket>,
    inbound: mpsc::UnboundedReceiver<Result<EnginePacket>>,
    task: Option<JoinHandle<()>>,
}

/// Transport-side half of a link, owned by the task that drives the socket.
pub struct LinkIo {
    /// Packets the session wants written
    pub outbound: mpsc::UnboundedReceiver<EnginePacket>,
    /// Packets (or failures) read from the connection
    pub inbound: mpsc::UnboundedSender<Result<EnginePacket>>,
    /// Current transport, updated after a successful upgrade
    pub kind: Arc<RwLock<TransportKind>>,
}

impl Link {
    /// Create a link and the matching transport-side half.
    pub fn channel(handshake: Handshake, kind: TransportKind) -> (Link, LinkIo) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let kind = Arc::new(RwLock::new(kind));

        let link = Link {
            handshake,
            kind: Arc::clone(&kind),
            outbound: out_tx,
            inbound: in_rx,
            task: None,
        };
        let io = LinkIo {
            outbound: out_rx,
            inbound: in_tx,
            kind,
        };
        (link, io)
    }

    /// Tie the transport task's lifetime to this link.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Transport currently carrying the link.
    pub fn kind(&self) -> TransportKind {
        *self.kind.read()
    }

    pub(crate) fn kind_handle(&self) -> Arc<RwLock<TransportKind>> {
        Arc::clone(&self.kind)
    }

    /// Queue a packet for the transport task.
    pub fn send(&self, packet: EnginePacket) -> Result<()> {
        self.outbound
            .send(packet)
            .map_err(|_| TransportError::Closed)
    }

    /// Next packet from the connection; `None` once the transport has ended.
    pub async fn recv(&mut self) -> Option<Result<EnginePacket>> {
        self.inbound.recv().await
    }

    /// Send an Engine.IO close and wait briefly for the task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.outbound.send(EnginePacket::Close);
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                tracing::debug!("Transport task did not finish in time, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("sid", &self.handshake.sid)
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake() -> Handshake {
        Handshake {
            sid: "engine-test".to_string(),
            upgrades: vec![],
            ping_interval: 25_000,
            ping_timeout: 20_000,
            max_payload: 1_000_000,
        }
    }

    #[tokio::test]
    async fn test_link_channel_round_trip() {
        let (mut link, mut io) = Link::channel(handshake(), TransportKind::Polling);

        link.send(EnginePacket::Message("2[\"x\"]".to_string())).unwrap();
        assert_eq!(
            io.outbound.recv().await,
            Some(EnginePacket::Message("2[\"x\"]".to_string()))
        );

        io.inbound.send(Ok(EnginePacket::Ping(String::new()))).unwrap();
        assert!(matches!(link.recv().await, Some(Ok(EnginePacket::Ping(_)))));

        *io.kind.write() = TransportKind::WebSocket;
        assert_eq!(link.kind(), TransportKind::WebSocket);

        drop(io);
        assert!(link.recv().await.is_none());
        assert!(link.send(EnginePacket::Noop).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_sends_close() {
        let (mut link, mut io) = Link::channel(handshake(), TransportKind::WebSocket);
        let task = tokio::spawn(async move {
            while let Some(packet) = io.outbound.recv().await {
                if packet == EnginePacket::Close {
                    break;
                }
            }
        });
        link.attach(task);

        tokio::time::timeout(Duration::from_secs(2), link.shutdown())
            .await
            .expect("shutdown should complete");
    }
}
