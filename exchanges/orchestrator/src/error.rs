use std::time::Duration;

use peerdrop_session::SessionError;
use peerdropx_common::{ErrorCode, TransportError};
use peerdropx_receiver::{ReassemblyError, ReceivedFile};
use peerdropx_sender::FallbackReceipt;
use thiserror::Error;

use crate::OrchestratorState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Session service unreachable: {0}")]
    SessionService(String),
    #[error("Relay unavailable: {0}")]
    Relay(String),
    #[error("Relay refused the connection: {code}: {message}")]
    Rejected { code: ErrorCode, message: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Peer did not connect within {0:?}")]
    ConnectTimeout(Duration),
    #[error("Data channel closed before the transfer finished")]
    ChannelClosed,
    #[error("Received file is invalid: {0}")]
    Reassembly(#[from] ReassemblyError),
    #[error("Transfer cancelled by {}", canceller(.by_peer))]
    Cancelled {
        by_peer: bool,
        reason: Option<String>,
    },
    #[error("Illegal state change {from} -> {to}")]
    IllegalTransition {
        from: OrchestratorState,
        to: OrchestratorState,
    },
    #[error("Fallback upload failed: {0}")]
    Fallback(String),
    #[error("Transfer task ended without a result")]
    Interrupted,
}

impl TransferError {
    /// Failures the user asked for; these never trigger the fallback.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransferError::Cancelled { .. })
    }
}

fn canceller(by_peer: &bool) -> &'static str {
    if *by_peer { "the peer" } else { "this side" }
}

/// How a transfer ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Sent { bytes: u64 },
    Received(ReceivedFile),
    FellBack(FallbackReceipt),
    Failed(TransferError),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TransferOutcome::Failed(_))
    }
}
