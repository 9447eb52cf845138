use async_trait::async_trait;
use thiserror::Error;

use crate::ControlMessage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Negotiation failed: {0}")]
    Negotiation(String),
    #[error("Timeout")]
    Timeout,
    #[error("Channel closed")]
    Closed,
}

/// An open, ordered, reliable channel between the two peers.
///
/// Inbound frames are not read from the channel itself; they arrive on the
/// owning peer connection's event stream.
#[async_trait]
pub trait DataChannel: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    async fn send_binary(&self, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Bytes queued locally and not yet handed to the network.
    fn buffered_amount(&self) -> u64;

    /// Resolves once the buffered amount has fallen to the channel's
    /// low-water mark. Resolves immediately when already below it.
    async fn drained(&self);

    fn is_open(&self) -> bool;

    async fn close(&self);

    async fn send_control(
        &self,
        message: &ControlMessage,
    ) -> Result<(), TransportError> {
        let text = message
            .encode()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.send_text(text).await
    }
}
