//! HTTP long-polling transport.
//!
//! A GET request is kept outstanding to receive packets; outbound packets
//! are batched into POST requests. When the server offers `websocket` in its
//! upgrade list and the config allows it, a probe runs in the background and
//! a successful probe moves the connection onto the websocket.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::oneshot;
use url::Url;

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::link::{Connector, Link, LinkIo};
use crate::packet::EnginePacket;
use crate::types::TransportKind;
use crate::websocket::{self, WsStream};

/// Opens connections over the polling transport.
#[derive(Debug, Clone, Default)]
pub struct PollingConnector {
    client: Client,
}

impl PollingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, timeouts).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for PollingConnector {
    async fn open(&self, config: &TransportConfig) -> Result<Link> {
        let url = config.endpoint(TransportKind::Polling, None)?;
        tracing::debug!(url = %url, "Opening polling transport");

        let body = fetch(self.client.clone(), url).await?;
        let handshake = match EnginePacket::decode_payload(&body)?.into_iter().next() {
            Some(EnginePacket::Open(handshake)) => handshake,
            other => {
                return Err(TransportError::Handshake(format!(
                    "expected open packet, got {:?}",
                    other
                )))
            }
        };

        let session_url = config.endpoint(TransportKind::Polling, Some(&handshake.sid))?;
        let upgrade = if config.upgrade && handshake.offers_websocket() {
            Some(Upgrade {
                url: config.endpoint(TransportKind::WebSocket, Some(&handshake.sid))?,
                timeout: config.upgrade_timeout,
            })
        } else {
            None
        };

        tracing::debug!(sid = %handshake.sid, upgrade = upgrade.is_some(), "Polling transport open");
        let (mut link, io) = Link::channel(handshake, TransportKind::Polling);
        link.attach(tokio::spawn(run_polling(
            self.client.clone(),
            session_url,
            upgrade,
            io,
        )));
        Ok(link)
    }
}

struct Upgrade {
    url: Url,
    timeout: Duration,
}

async fn fetch(client: Client, url: Url) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;

    if !response.status().is_success() {
        return Err(TransportError::Http(format!(
            "poll failed with status {}",
            response.status()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| TransportError::Http(e.to_string()))
}

async fn push(client: &Client, url: &Url, body: String) -> Result<()> {
    let response = client
        .post(url.clone())
        .header("Content-Type", "text/plain;charset=UTF-8")
        .body(body)
        .send()
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;

    if !response.status().is_success() {
        return Err(TransportError::Http(format!(
            "post failed with status {}",
            response.status()
        )));
    }
    Ok(())
}

/// Forward a polled body to the session. Returns `false` when the link is over.
fn deliver(io: &LinkIo, body: Result<String>) -> bool {
    let packets = match body.and_then(|b| EnginePacket::decode_payload(&b).map_err(Into::into)) {
        Ok(packets) => packets,
        Err(e) => {
            let _ = io.inbound.send(Err(e));
            return false;
        }
    };

    for packet in packets {
        let closing = packet == EnginePacket::Close;
        if io.inbound.send(Ok(packet)).is_err() || closing {
            return false;
        }
    }
    true
}

async fn run_polling(client: Client, url: Url, upgrade: Option<Upgrade>, mut io: LinkIo) {
    let mut probe: Option<oneshot::Receiver<Result<WsStream>>> = None;
    let mut upgrade_timeout = Duration::ZERO;
    if let Some(upgrade) = upgrade {
        let (tx, rx) = oneshot::channel();
        upgrade_timeout = upgrade.timeout;
        tokio::spawn(async move {
            let _ = tx.send(websocket::probe(upgrade.url, upgrade.timeout).await);
        });
        probe = Some(rx);
    }

    let mut poll = Box::pin(fetch(client.clone(), url.clone()));

    loop {
        tokio::select! {
            body = &mut poll => {
                if !deliver(&io, body) {
                    break;
                }
                poll = Box::pin(fetch(client.clone(), url.clone()));
            }
            outgoing = io.outbound.recv() => {
                let Some(first) = outgoing else {
                    let _ = push(&client, &url, EnginePacket::Close.encode()).await;
                    break;
                };
                let mut batch = vec![first];
                while let Ok(more) = io.outbound.try_recv() {
                    batch.push(more);
                }
                let closing = batch.contains(&EnginePacket::Close);
                if let Err(e) = push(&client, &url, EnginePacket::encode_payload(&batch)).await {
                    let _ = io.inbound.send(Err(e));
                    break;
                }
                if closing {
                    break;
                }
            }
            probed = async {
                match probe.as_mut() {
                    Some(rx) => rx.await,
                    None => std::future::pending().await,
                }
            }, if probe.is_some() => {
                probe = None;
                match probed {
                    Ok(Ok(mut ws)) => {
                        if let Err(e) = websocket::send_packet(&mut ws, &EnginePacket::Upgrade).await {
                            tracing::warn!(error = %e, "Upgrade failed, staying on polling");
                            continue;
                        }
                        // The server answers the outstanding poll once the upgrade lands
                        if let Ok(body) = tokio::time::timeout(upgrade_timeout, &mut poll).await {
                            if !deliver(&io, body) {
                                break;
                            }
                        }
                        *io.kind.write() = TransportKind::WebSocket;
                        tracing::info!("Transport upgraded to websocket");
                        websocket::run_websocket(ws, io).await;
                        return;
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "Websocket probe failed, staying on polling");
                    }
                    Err(_) => {
                        tracing::debug!("Websocket probe task ended without a result");
                    }
                }
            }
        }
    }

    tracing::debug!("Polling transport finished");
}
