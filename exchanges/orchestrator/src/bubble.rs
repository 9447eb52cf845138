use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use peerdrop_entities::Role;
use peerdropx_receiver::ReceivingEvent;
use peerdropx_sender::SendingEvent;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{OrchestratorState, SessionGrant, TransferError, TransferOutcome};

pub trait TransferSubscriber: Send + Sync {
    fn get_id(&self) -> String;
    fn notify_state(&self, event: StateChangedEvent);
    fn notify_sending(&self, event: SendingEvent);
    fn notify_receiving(&self, event: ReceivingEvent);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateChangedEvent {
    pub from: OrchestratorState,
    pub to: OrchestratorState,
}

type Subscribers = RwLock<HashMap<String, Arc<dyn TransferSubscriber>>>;

/// State shared between a bubble and its driver task.
pub(crate) struct Shared {
    state: watch::Sender<OrchestratorState>,
    outcome: watch::Sender<Option<TransferOutcome>>,
    cancel: watch::Sender<bool>,
    subscribers: Subscribers,
}

impl Shared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: watch::Sender::new(OrchestratorState::Idle),
            outcome: watch::Sender::new(None),
            cancel: watch::Sender::new(false),
            subscribers: RwLock::new(HashMap::new()),
        })
    }

    pub(crate) fn state(&self) -> OrchestratorState {
        *self.state.borrow()
    }

    /// Moves to `next` if the transition table allows it.
    pub(crate) fn transition(
        &self,
        next: OrchestratorState,
    ) -> Result<(), TransferError> {
        let mut from = next;
        let moved = self.state.send_if_modified(|current| {
            from = *current;
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if !moved {
            return Err(TransferError::IllegalTransition { from, to: next });
        }
        debug!("Transfer state {} -> {}", from, next);
        let event = StateChangedEvent { from, to: next };
        for subscriber in self.snapshot() {
            subscriber.notify_state(event);
        }
        Ok(())
    }

    pub(crate) fn notify_sending(&self, event: SendingEvent) {
        for subscriber in self.snapshot() {
            subscriber.notify_sending(event.clone());
        }
    }

    pub(crate) fn notify_receiving(&self, event: ReceivingEvent) {
        for subscriber in self.snapshot() {
            subscriber.notify_receiving(event.clone());
        }
    }

    /// Records the outcome. Only the first call has an effect.
    pub(crate) fn finish(&self, outcome: TransferOutcome) {
        self.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
    }

    pub(crate) fn cancel_requests(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    fn snapshot(&self) -> Vec<Arc<dyn TransferSubscriber>> {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

/// Handle on a running transfer.
pub struct TransferBubble {
    grant: SessionGrant,
    shared: Arc<Shared>,
    created_at: DateTime<Utc>,
}

impl TransferBubble {
    pub(crate) fn new(grant: SessionGrant, shared: Arc<Shared>) -> Self {
        Self {
            grant,
            shared,
            created_at: Utc::now(),
        }
    }

    /// The code the receiver types in, e.g. `AB12-CD34`.
    pub fn get_code(&self) -> String {
        self.grant.transfer_code.to_string()
    }

    pub fn get_transfer_id(&self) -> String {
        self.grant.transfer_id.clone()
    }

    pub fn role(&self) -> Role {
        self.grant.role
    }

    pub fn get_expires_at(&self) -> String {
        self.grant.expires_at.to_rfc3339()
    }

    pub fn get_created_at(&self) -> String {
        self.created_at.to_rfc3339()
    }

    pub fn state(&self) -> OrchestratorState {
        self.shared.state()
    }

    /// Receiver of every state change, starting with the current state.
    pub fn watch_state(&self) -> watch::Receiver<OrchestratorState> {
        self.shared.state.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.outcome.borrow().is_some()
    }

    /// Stops the transfer. Calling it again, or after the transfer ended,
    /// does nothing.
    pub fn cancel(&self) {
        let first = self.shared.cancel.send_if_modified(|requested| {
            let first = !*requested;
            *requested = true;
            first
        });
        if first && !self.is_finished() {
            info!("Cancelling transfer {}", self.grant.transfer_id);
        }
    }

    /// Waits for the transfer to end.
    pub async fn wait(&self) -> TransferOutcome {
        let mut outcome = self.shared.outcome.subscribe();
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(done) => (*done).clone(),
            Err(_) => None,
        };
        result.unwrap_or(TransferOutcome::Failed(TransferError::Interrupted))
    }

    pub fn subscribe(&self, subscriber: Arc<dyn TransferSubscriber>) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(subscriber.get_id(), subscriber);
    }

    pub fn unsubscribe(&self, subscriber: Arc<dyn TransferSubscriber>) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&subscriber.get_id());
    }
}
