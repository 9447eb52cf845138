use std::fmt;

/// Lifecycle of one side of a transfer.
///
/// ```text
/// idle -> creating-session | joining-session -> waiting-peer
///      -> connecting -> connected -> transferring -> completed
/// ```
/// Any non-terminal state may move to `failed`. `connecting` falls back to
/// `waiting-peer` when the peer leaves before the channel opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrchestratorState {
    Idle,
    CreatingSession,
    JoiningSession,
    WaitingPeer,
    Connecting,
    Connected,
    Transferring,
    Completed,
    Failed,
}

impl OrchestratorState {
    pub fn as_str(self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::CreatingSession => "creating-session",
            OrchestratorState::JoiningSession => "joining-session",
            OrchestratorState::WaitingPeer => "waiting-peer",
            OrchestratorState::Connecting => "connecting",
            OrchestratorState::Connected => "connected",
            OrchestratorState::Transferring => "transferring",
            OrchestratorState::Completed => "completed",
            OrchestratorState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrchestratorState::Completed | OrchestratorState::Failed
        )
    }

    /// States reachable from `self` in one step.
    pub fn successors(self) -> &'static [OrchestratorState] {
        use OrchestratorState::*;
        match self {
            Idle => &[CreatingSession, JoiningSession, Failed],
            CreatingSession | JoiningSession => &[WaitingPeer, Failed],
            WaitingPeer => &[Connecting, Failed],
            Connecting => &[Connected, WaitingPeer, Failed],
            Connected => &[Transferring, Failed],
            Transferring => &[Completed, Failed],
            Completed | Failed => &[],
        }
    }

    pub fn can_transition_to(self, next: OrchestratorState) -> bool {
        self.successors().contains(&next)
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
