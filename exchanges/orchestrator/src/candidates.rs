use peerdropx_common::IceCandidate;

/// Holds remote candidates until the remote description is applied.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: Vec<IceCandidate>,
    ready: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the candidate back when it can be applied right away.
    pub fn push(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.ready {
            Some(candidate)
        } else {
            self.pending.push(candidate);
            None
        }
    }

    /// Marks the remote description applied and hands back the held
    /// candidates in arrival order.
    pub fn release(&mut self) -> Vec<IceCandidate> {
        self.ready = true;
        std::mem::take(&mut self.pending)
    }

    /// Forgets everything for a new connection attempt.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.ready = false;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
