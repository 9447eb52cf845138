use std::{fmt, sync::Arc};

use async_trait::async_trait;
use peerdrop_entities::Role;
use peerdropx_common::{
    DataChannel, IceCandidate, SessionDescription, TransportError,
};
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteDescription {
    Offer(SessionDescription),
    Answer(SessionDescription),
}

/// Everything a peer connection reports, in the order it happened.
pub enum PeerEvent {
    /// A local candidate to hand to the other side.
    LocalCandidate(IceCandidate),
    ChannelOpen(Arc<dyn DataChannel>),
    ChannelClosed,
    Text(String),
    Binary(Vec<u8>),
    Failed(TransportError),
}

impl fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEvent::LocalCandidate(c) => {
                f.debug_tuple("LocalCandidate").field(c).finish()
            }
            PeerEvent::ChannelOpen(_) => f.write_str("ChannelOpen"),
            PeerEvent::ChannelClosed => f.write_str("ChannelClosed"),
            PeerEvent::Text(t) => f.debug_tuple("Text").field(t).finish(),
            PeerEvent::Binary(b) => {
                write!(f, "Binary({} bytes)", b.len())
            }
            PeerEvent::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// One direct connection attempt between the two peers.
///
/// The offering side opens the data channel; both sides learn about it
/// through [`PeerEvent::ChannelOpen`].
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    /// Must follow a remote offer.
    async fn create_answer(&self)
    -> Result<SessionDescription, TransportError>;

    async fn set_remote_description(
        &self,
        description: RemoteDescription,
    ) -> Result<(), TransportError>;

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), TransportError>;

    async fn close(&self);
}

pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        role: Role,
    ) -> Result<(Arc<dyn PeerConnection>, PeerEvents), TransportError>;
}
