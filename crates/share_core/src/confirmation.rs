//! Confirm/cancel gate for share removals.
//!
//! A coordinator holds at most one pending removal. Opening a proposal subscribes
//! to `confirmRemoval` and `cancelRemoval` on the proposal's scope; whichever
//! arrives first resolves it, runs exactly one of the two callbacks, and drops
//! both subscriptions. A newer proposal replaces an unresolved one and its
//! callbacks are discarded without running.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{CaseId, EntityId, OwnerId, Scope},
    protocol::{BusEvent, EventName, RemovalTarget},
};
use tracing::{debug, info, warn};

use crate::event_bus::{EventBus, ListenerCallback, ListenerHandle};

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRemoval {
    pub case_id: CaseId,
    pub entity_id: EntityId,
    pub created_at: DateTime<Utc>,
}

impl PendingRemoval {
    pub fn target(&self) -> RemovalTarget {
        RemovalTarget {
            case_id: self.case_id.clone(),
            entity_id: self.entity_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    AwaitingConfirmation,
}

pub type ConfirmCallback = Box<dyn FnOnce(PendingRemoval) + Send>;
pub type CancelCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Confirm,
    Cancel,
}

struct ActiveProposal {
    generation: u64,
    removal: PendingRemoval,
    opened_at: Instant,
    on_confirm: ConfirmCallback,
    on_cancel: CancelCallback,
    listeners: [ListenerHandle; 2],
}

#[derive(Default)]
struct Slot {
    generation: u64,
    active: Option<ActiveProposal>,
}

struct CoordinatorInner {
    bus: Arc<EventBus>,
    owner: OwnerId,
    timeout: Option<Duration>,
    slot: Mutex<Slot>,
}

impl CoordinatorInner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, proposal: &ActiveProposal) -> bool {
        self.timeout
            .is_some_and(|timeout| proposal.opened_at.elapsed() >= timeout)
    }

    fn release(&self, proposal: &ActiveProposal) {
        for handle in proposal.listeners {
            self.bus.unregister(handle);
        }
    }

    /// Resolves the proposal of `generation` if it is still the active one.
    fn resolve(&self, generation: u64, decision: Decision) -> bool {
        let proposal = {
            let mut slot = self.slot();
            let current = slot
                .active
                .as_ref()
                .is_some_and(|active| active.generation == generation);
            if current {
                slot.active.take()
            } else {
                None
            }
        };
        let Some(proposal) = proposal else {
            debug!(generation, "confirm: stale signal ignored");
            return false;
        };
        self.release(&proposal);

        let decision = if decision == Decision::Confirm && self.is_expired(&proposal) {
            warn!(
                case_id = %proposal.removal.case_id,
                entity_id = %proposal.removal.entity_id,
                "confirm: confirmation arrived after timeout, treating as cancel"
            );
            Decision::Cancel
        } else {
            decision
        };

        match decision {
            Decision::Confirm => {
                info!(
                    case_id = %proposal.removal.case_id,
                    entity_id = %proposal.removal.entity_id,
                    "confirm: removal confirmed"
                );
                (proposal.on_confirm)(proposal.removal);
            }
            Decision::Cancel => {
                info!(
                    case_id = %proposal.removal.case_id,
                    entity_id = %proposal.removal.entity_id,
                    "confirm: removal cancelled"
                );
                (proposal.on_cancel)();
            }
        }
        true
    }
}

fn decision_listener(
    inner: Weak<CoordinatorInner>,
    generation: u64,
    decision: Decision,
) -> ListenerCallback {
    Arc::new(move |_: &BusEvent| -> anyhow::Result<()> {
        if let Some(inner) = inner.upgrade() {
            inner.resolve(generation, decision);
        }
        Ok(())
    })
}

/// Owns the single pending-removal slot for one page.
pub struct ConfirmationCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl ConfirmationCoordinator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_timeout(bus, Some(DEFAULT_CONFIRMATION_TIMEOUT))
    }

    /// `None` disables the idle timeout.
    pub fn with_timeout(bus: Arc<EventBus>, timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                bus,
                owner: OwnerId::new("confirmationCoordinator"),
                timeout,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        if self.inner.slot().active.is_some() {
            CoordinatorState::AwaitingConfirmation
        } else {
            CoordinatorState::Idle
        }
    }

    pub fn pending(&self) -> Option<PendingRemoval> {
        self.inner
            .slot()
            .active
            .as_ref()
            .map(|active| active.removal.clone())
    }

    /// Opens a proposal for removing `entity_id` from `case_id` and announces it
    /// with a `proposeRemoval` event on `scope`.
    pub fn propose_removal(
        &self,
        scope: &Scope,
        case_id: CaseId,
        entity_id: EntityId,
        on_confirm: impl FnOnce(PendingRemoval) + Send + 'static,
        on_cancel: impl FnOnce() + Send + 'static,
    ) -> PendingRemoval {
        let removal = PendingRemoval {
            case_id,
            entity_id,
            created_at: Utc::now(),
        };

        let mut slot = self.inner.slot();
        slot.generation += 1;
        let generation = slot.generation;
        let inner = Arc::downgrade(&self.inner);
        let listeners = [
            self.inner.bus.register(
                EventName::ConfirmRemoval,
                scope.clone(),
                self.inner.owner.clone(),
                decision_listener(inner.clone(), generation, Decision::Confirm),
            ),
            self.inner.bus.register(
                EventName::CancelRemoval,
                scope.clone(),
                self.inner.owner.clone(),
                decision_listener(inner, generation, Decision::Cancel),
            ),
        ];
        let replaced = slot.active.replace(ActiveProposal {
            generation,
            removal: removal.clone(),
            opened_at: Instant::now(),
            on_confirm: Box::new(on_confirm),
            on_cancel: Box::new(on_cancel),
            listeners,
        });
        drop(slot);

        if let Some(previous) = replaced {
            self.inner.release(&previous);
            debug!(
                case_id = %previous.removal.case_id,
                entity_id = %previous.removal.entity_id,
                "confirm: unresolved proposal abandoned"
            );
        }
        info!(
            %scope,
            case_id = %removal.case_id,
            entity_id = %removal.entity_id,
            "confirm: removal proposed"
        );
        self.inner
            .bus
            .emit(scope, BusEvent::ProposeRemoval(removal.target()));
        removal
    }

    /// Resolves an expired proposal as a cancel. Returns true if one was expired.
    pub fn expire_stale(&self) -> bool {
        let generation = {
            let slot = self.inner.slot();
            match &slot.active {
                Some(active) if self.inner.is_expired(active) => active.generation,
                _ => return false,
            }
        };
        self.inner.resolve(generation, Decision::Cancel)
    }
}

impl Drop for ConfirmationCoordinator {
    fn drop(&mut self) {
        if let Some(active) = self.inner.slot().active.take() {
            self.inner.release(&active);
        }
    }
}

/// The confirm/cancel prompt shown while a removal is pending.
pub struct ConfirmationModal {
    pub header_text: String,
    pub body_text: String,
    pub confirmation_text: String,
    pub cancel_text: String,
    bus: Arc<EventBus>,
    scope: Scope,
    owner: OwnerId,
    shown_for: Arc<Mutex<Option<RemovalTarget>>>,
    on_propose: ListenerCallback,
    subscription: Mutex<Option<ListenerHandle>>,
}

impl ConfirmationModal {
    pub fn new(bus: Arc<EventBus>, scope: Scope) -> Self {
        let shown_for = Arc::new(Mutex::new(None));
        let on_propose: ListenerCallback = {
            let shown_for = Arc::clone(&shown_for);
            Arc::new(move |event: &BusEvent| -> anyhow::Result<()> {
                if let BusEvent::ProposeRemoval(target) = event {
                    *shown_for.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(target.clone());
                }
                Ok(())
            })
        };
        Self {
            header_text: "Remove access".to_string(),
            body_text: "Are you sure you want to remove access to this case?".to_string(),
            confirmation_text: "Remove".to_string(),
            cancel_text: "Cancel".to_string(),
            bus,
            scope,
            owner: OwnerId::new("confirmationModal"),
            shown_for,
            on_propose,
            subscription: Mutex::new(None),
        }
    }

    /// Starts showing itself whenever a removal is proposed on its scope.
    /// Attaching twice keeps a single subscription.
    pub fn attach(&self) -> ListenerHandle {
        let handle = self.bus.register(
            EventName::ProposeRemoval,
            self.scope.clone(),
            self.owner.clone(),
            Arc::clone(&self.on_propose),
        );
        *self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        handle
    }

    /// Drops this modal's subscription; other modals on the bus keep theirs.
    pub fn detach(&self) {
        let handle = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            self.bus.unregister(handle);
        }
        self.hide();
    }

    pub fn shown_for(&self) -> Option<RemovalTarget> {
        self.shown_for
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_visible(&self) -> bool {
        self.shown_for().is_some()
    }

    pub fn confirm(&self) -> usize {
        self.hide();
        self.bus.emit(&self.scope, BusEvent::ConfirmRemoval)
    }

    pub fn cancel(&self) -> usize {
        self.hide();
        self.bus.emit(&self.scope, BusEvent::CancelRemoval)
    }

    fn hide(&self) {
        *self.shown_for.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
#[path = "tests/confirmation_tests.rs"]
mod tests;
