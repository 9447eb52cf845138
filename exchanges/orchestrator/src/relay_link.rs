use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use peerdropx_common::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::TransferError;

/// An open connection to the signaling relay.
///
/// Frames queued on `outbound` are written in order. `inbound` yields the
/// relay's frames and ends when the connection drops. Dropping the link
/// closes the connection.
#[derive(Debug)]
pub struct RelayLink {
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    pub inbound: mpsc::UnboundedReceiver<ServerMessage>,
}

impl RelayLink {
    /// Queues a frame. Returns `false` once the connection is gone.
    pub fn send(&self, message: ClientMessage) -> bool {
        self.outbound.send(message).is_ok()
    }
}

#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self) -> Result<RelayLink, TransferError>;
}

/// Connects to a relay's `/ws` endpoint.
#[derive(Clone, Debug)]
pub struct WebSocketRelayConnector {
    url: String,
}

impl WebSocketRelayConnector {
    /// `url` is the full socket address, e.g. `ws://localhost:8787/ws`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RelayConnector for WebSocketRelayConnector {
    async fn connect(&self) -> Result<RelayLink, TransferError> {
        info!("Connecting to relay: {}", self.url);
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransferError::Relay(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerMessage>();

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let text = match message.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode relay frame: {}", e);
                        continue;
                    }
                };
                if write.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        tokio::spawn(async move {
            while let Some(incoming) = read.next().await {
                match incoming {
                    Ok(Message::Text(text)) => {
                        match ServerMessage::decode(&text) {
                            Ok(message) => {
                                if in_tx.send(message).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Unreadable relay frame: {}", e),
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Relay socket error: {}", e);
                        break;
                    }
                }
            }
            debug!("Relay socket closed");
        });

        Ok(RelayLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
