//! Client side of a PeerDrop transfer.
//!
//! An [`Orchestrator`] takes one side of a transfer from session creation
//! (or join) to a final [`TransferOutcome`]:
//! 1. Ask the session service for a code and token ([`SessionApi`]).
//! 2. Join the transfer's room on the signaling relay ([`RelayConnector`]).
//! 3. Once both peers are present, negotiate a direct connection over the
//!    relay ([`PeerConnectionFactory`]), buffering early candidates.
//! 4. Stream the file over the data channel, or reassemble it on the
//!    receiving side.
//! 5. On a connect timeout or a broken channel, the sender hands the file
//!    to a [`FallbackUploader`](peerdropx_sender::FallbackUploader) once.
//!
//! Each transfer runs on its own task. The returned [`TransferBubble`]
//! exposes the code, the live [`OrchestratorState`], progress callbacks
//! through [`TransferSubscriber`], cancellation and the final outcome.
//!
//! Example:
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use peerdrop_entities::MemoryData;
//! use peerdropx_orchestrator::{
//!     HttpSessionApi, Orchestrator, OrchestratorConfig, PeerConnectionFactory,
//!     SendRequest, WebSocketRelayConnector,
//! };
//! use peerdropx_sender::OutgoingFile;
//!
//! async fn share(factory: Arc<dyn PeerConnectionFactory>) {
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(HttpSessionApi::new("http://localhost:8787")),
//!         Arc::new(WebSocketRelayConnector::new("ws://localhost:8787/ws")),
//!         factory,
//!     );
//!     let file = OutgoingFile::new(
//!         "notes.txt",
//!         "text/plain",
//!         Arc::new(MemoryData::new(b"hello".to_vec())),
//!     );
//!     let bubble = orchestrator
//!         .send(SendRequest {
//!             file,
//!             config: OrchestratorConfig::default(),
//!         })
//!         .await
//!         .unwrap();
//!     println!("Code: {}", bubble.get_code());
//!     println!("{:?}", bubble.wait().await);
//! }
//! ```

mod bubble;
mod candidates;
mod config;
mod driver;
mod error;
mod peer;
mod relay_link;
mod session_api;
mod state;

use std::sync::Arc;

use peerdropx_sender::{FallbackUploader, OutgoingFile};
use tracing::{debug, info};

pub use bubble::{StateChangedEvent, TransferBubble, TransferSubscriber};
pub use candidates::CandidateBuffer;
pub use config::OrchestratorConfig;
pub use error::{TransferError, TransferOutcome};
pub use peer::{
    PeerConnection, PeerConnectionFactory, PeerEvent, PeerEvents,
    RemoteDescription,
};
pub use relay_link::{RelayConnector, RelayLink, WebSocketRelayConnector};
pub use session_api::{HttpSessionApi, SessionApi, SessionGrant};
pub use state::OrchestratorState;

use bubble::Shared;
use driver::{Driver, Payload, Services};

pub struct SendRequest {
    pub file: OutgoingFile,
    pub config: OrchestratorConfig,
}

pub struct ReceiveRequest {
    /// The code as the user typed it; case and the dash are forgiven.
    pub transfer_code: String,
    pub config: OrchestratorConfig,
}

/// Starts transfers against one set of collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    services: Services,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<dyn SessionApi>,
        connector: Arc<dyn RelayConnector>,
        factory: Arc<dyn PeerConnectionFactory>,
    ) -> Self {
        Self {
            services: Services {
                sessions,
                connector,
                factory,
                uploader: None,
            },
        }
    }

    /// Enables the store-and-forward path for senders.
    pub fn with_fallback(mut self, uploader: Arc<dyn FallbackUploader>) -> Self {
        self.services.uploader = Some(uploader);
        self
    }

    /// Creates a session and offers `request.file` on it.
    pub async fn send(
        &self,
        request: SendRequest,
    ) -> Result<TransferBubble, TransferError> {
        info!(
            "Starting transfer of {} ({} bytes)",
            request.file.name,
            request.file.size()
        );
        let shared = Shared::new();
        shared.transition(OrchestratorState::CreatingSession)?;
        let grant = self
            .services
            .sessions
            .create(request.config.ttl_minutes)
            .await;
        self.start(grant, request.config, Payload::Send(request.file), shared)
            .await
    }

    /// Joins the session behind `request.transfer_code` and receives its
    /// file.
    pub async fn receive(
        &self,
        request: ReceiveRequest,
    ) -> Result<TransferBubble, TransferError> {
        info!("Joining transfer {}", request.transfer_code.trim());
        let shared = Shared::new();
        shared.transition(OrchestratorState::JoiningSession)?;
        let grant = self
            .services
            .sessions
            .join(&request.transfer_code)
            .await;
        self.start(grant, request.config, Payload::Receive, shared)
            .await
    }

    async fn start(
        &self,
        grant: Result<SessionGrant, TransferError>,
        config: OrchestratorConfig,
        payload: Payload,
        shared: Arc<Shared>,
    ) -> Result<TransferBubble, TransferError> {
        let grant = match grant {
            Ok(grant) => grant,
            Err(e) => {
                debug!("Transfer could not start: {}", e);
                let _ = shared.transition(OrchestratorState::Failed);
                return Err(e);
            }
        };
        // A refused first connection is retried by the driver.
        let connected = self.services.connector.connect().await;

        debug!(
            "Session {} ready as {}, joining relay room",
            grant.transfer_id, grant.role
        );
        let driver = Driver::new(
            grant.clone(),
            config,
            payload,
            self.services.clone(),
            shared.clone(),
        );
        tokio::spawn(driver.run(connected));
        Ok(TransferBubble::new(grant, shared))
    }
}
