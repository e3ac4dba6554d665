//! Transport selection.

use async_trait::async_trait;

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::link::{Connector, Link};
use crate::polling::PollingConnector;
use crate::types::TransportKind;
use crate::websocket::WebSocketConnector;

/// Tries each configured transport in order and keeps the first that opens.
///
/// With the default `[WebSocket, Polling]` order a blocked websocket falls
/// back to long-polling, which may later upgrade back to websocket.
#[derive(Debug, Clone, Default)]
pub struct TransportConnector {
    websocket: WebSocketConnector,
    polling: PollingConnector,
}

impl TransportConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_polling(polling: PollingConnector) -> Self {
        Self {
            websocket: WebSocketConnector::new(),
            polling,
        }
    }

    fn connector_for(&self, kind: TransportKind) -> &dyn Connector {
        match kind {
            TransportKind::WebSocket => &self.websocket,
            TransportKind::Polling => &self.polling,
        }
    }
}

#[async_trait]
impl Connector for TransportConnector {
    async fn open(&self, config: &TransportConfig) -> Result<Link> {
        let mut last_error = None;

        for kind in &config.transports {
            let attempt =
                tokio::time::timeout(config.connect_timeout, self.connector_for(*kind).open(config))
                    .await
                    .unwrap_or_else(|_| Err(TransportError::Timeout(format!("{} handshake", kind))));

            match attempt {
                Ok(link) => {
                    tracing::debug!(transport = %kind, "Transport opened");
                    return Ok(link);
                }
                Err(e) => {
                    tracing::warn!(transport = %kind, error = %e, "Transport failed to open");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::Configuration("No transports configured".to_string())
        }))
    }
}
