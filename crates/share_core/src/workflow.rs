//! Add/remove operations for case share records.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use shared::{
    domain::{entity_ref_equals, CaseId, CaseSummary, EntityId, EntityRef, Scope, ShareEntitySet},
    error::ShareError,
    protocol::{BusEvent, RemovalTarget, ShareDropFailed},
};
use storage::ShareRecordStore;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    confirmation::{ConfirmationCoordinator, PendingRemoval},
    event_bus::EventBus,
};

const ADD_SHARE_OPERATION: &str = "share this case";
const REMOVE_SHARE_OPERATION: &str = "remove access";

/// Work queued for the store once a decision has been made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareCommand {
    DeleteShare(PendingRemoval),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionOutcome {
    pub entity_id: EntityId,
    pub message: String,
    /// The caller's entity list is out of date and should be reloaded.
    pub refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub target: RemovalTarget,
    pub result: Result<(), ShareError>,
}

impl RemovalOutcome {
    pub fn message(&self) -> String {
        match &self.result {
            Ok(()) => format!("Removed access for {}", self.target.entity_id),
            Err(err) => err.user_message(),
        }
    }
}

type InFlight = Arc<StdMutex<Vec<RemovalTarget>>>;

fn lock_in_flight(in_flight: &InFlight) -> MutexGuard<'_, Vec<RemovalTarget>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ShareWorkflow {
    bus: Arc<EventBus>,
    store: Arc<dyn ShareRecordStore>,
    coordinator: ConfirmationCoordinator,
    scope: Scope,
    commands: mpsc::UnboundedSender<ShareCommand>,
    queue: Mutex<mpsc::UnboundedReceiver<ShareCommand>>,
    /// Confirmed removals that are queued or waiting on the store.
    in_flight: InFlight,
}

impl ShareWorkflow {
    pub fn new(
        bus: Arc<EventBus>,
        store: Arc<dyn ShareRecordStore>,
        coordinator: ConfirmationCoordinator,
        scope: Scope,
    ) -> Arc<Self> {
        let (commands, queue) = mpsc::unbounded_channel();
        Arc::new(Self {
            bus,
            store,
            coordinator,
            scope,
            commands,
            queue: Mutex::new(queue),
            in_flight: Arc::new(StdMutex::new(Vec::new())),
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn coordinator(&self) -> &ConfirmationCoordinator {
        &self.coordinator
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Asks for confirmation before removing `entity_id` from `case_id`.
    ///
    /// The case owner can never be removed. On confirmation the removal is queued
    /// for [`ShareWorkflow::process_confirmed`] or the removal worker. A confirmation
    /// for a case/entity pair that is already queued or in flight is dropped.
    pub fn request_removal(
        &self,
        case_id: &CaseId,
        entity_id: &EntityId,
        current_owner: &EntityRef,
    ) -> Result<PendingRemoval, ShareError> {
        if entity_ref_equals(current_owner.id.as_str(), entity_id.as_str()) {
            warn!(%case_id, %entity_id, "share: refusing to remove case owner");
            return Err(ShareError::OwnerProtected {
                entity_id: entity_id.to_string(),
            });
        }

        let commands = self.commands.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let pending = self.coordinator.propose_removal(
            &self.scope,
            case_id.clone(),
            entity_id.clone(),
            move |removal| {
                let target = removal.target();
                {
                    let mut queued = lock_in_flight(&in_flight);
                    if queued.contains(&target) {
                        warn!(
                            case_id = %target.case_id,
                            entity_id = %target.entity_id,
                            "share: removal already in progress, confirmation dropped"
                        );
                        return;
                    }
                    queued.push(target.clone());
                }
                if commands.send(ShareCommand::DeleteShare(removal)).is_err() {
                    warn!("share: removal queue closed, confirmed removal dropped");
                    lock_in_flight(&in_flight).retain(|queued| queued != &target);
                }
            },
            || debug!("share: removal aborted"),
        );
        Ok(pending)
    }

    /// Applies every confirmed removal queued so far, in confirmation order.
    ///
    /// Returns nothing while the removal worker or another caller owns the queue;
    /// those removals are applied there.
    pub async fn process_confirmed(&self) -> Vec<RemovalOutcome> {
        let Ok(mut queue) = self.queue.try_lock() else {
            debug!("share: removal queue drained elsewhere");
            return Vec::new();
        };
        let mut outcomes = Vec::new();
        while let Ok(command) = queue.try_recv() {
            outcomes.push(self.execute(command).await);
        }
        outcomes
    }

    /// Applies confirmed removals as they arrive until the returned task is aborted.
    pub fn spawn_removal_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let workflow = Arc::clone(self);
        tokio::spawn(async move {
            let mut queue = workflow.queue.lock().await;
            while let Some(command) = queue.recv().await {
                workflow.execute(command).await;
            }
        })
    }

    async fn execute(&self, command: ShareCommand) -> RemovalOutcome {
        match command {
            ShareCommand::DeleteShare(removal) => {
                let outcome = self.apply_removal(removal.target()).await;
                lock_in_flight(&self.in_flight).retain(|queued| queued != &outcome.target);
                outcome
            }
        }
    }

    /// Deletes the share record and reports the result on the bus exactly once.
    async fn apply_removal(&self, target: RemovalTarget) -> RemovalOutcome {
        let result = match self
            .store
            .delete_share(&target.case_id, &target.entity_id)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(ShareError::store_failure(
                REMOVE_SHARE_OPERATION,
                "store declined the removal",
            )),
            Err(err) => {
                error!(
                    case_id = %target.case_id,
                    entity_id = %target.entity_id,
                    error = %err,
                    "share: delete share failed"
                );
                Err(ShareError::store_failure(
                    REMOVE_SHARE_OPERATION,
                    err.to_string(),
                ))
            }
        };

        match &result {
            Ok(()) => {
                info!(
                    case_id = %target.case_id,
                    entity_id = %target.entity_id,
                    "share: access removed"
                );
                self.bus
                    .emit(&self.scope, BusEvent::ShareDropSuccess(target.clone()));
            }
            Err(err) => {
                warn!(
                    case_id = %target.case_id,
                    entity_id = %target.entity_id,
                    error = %err,
                    "share: removal failed"
                );
                self.bus.emit(
                    &self.scope,
                    BusEvent::ShareDropFailure(ShareDropFailed {
                        case_id: target.case_id.clone(),
                        entity_id: target.entity_id.clone(),
                        message: err.user_message(),
                    }),
                );
            }
        }

        RemovalOutcome { target, result }
    }

    /// Grants `entity_input` access to `case_id`.
    ///
    /// The input must be a 15 or 18 character id not already present in
    /// `current_entities`; both checks happen before the store is called.
    pub async fn request_addition(
        &self,
        case_id: &CaseId,
        entity_input: &str,
        current_entities: &[EntityRef],
    ) -> Result<AdditionOutcome, ShareError> {
        let entity_id = EntityId::parse(entity_input).inspect_err(|err| {
            warn!(%case_id, error = %err, "share: rejected malformed id");
        })?;

        if current_entities.iter().any(|entity| entity.id == entity_id) {
            warn!(%case_id, %entity_id, "share: entity already shared");
            return Err(ShareError::DuplicateEntity {
                entity_id: entity_id.to_string(),
            });
        }

        match self.store.create_share(case_id, &entity_id).await {
            Ok(true) => {
                info!(%case_id, %entity_id, "share: access granted");
                Ok(AdditionOutcome {
                    message: format!("Shared case with {entity_id}"),
                    entity_id,
                    refresh: true,
                })
            }
            Ok(false) => {
                warn!(%case_id, %entity_id, "share: store declined share");
                Err(ShareError::store_failure(
                    ADD_SHARE_OPERATION,
                    "store declined the share",
                ))
            }
            Err(err) => {
                error!(%case_id, %entity_id, error = %err, "share: create share failed");
                Err(ShareError::store_failure(
                    ADD_SHARE_OPERATION,
                    err.to_string(),
                ))
            }
        }
    }

    pub async fn list_cases(&self) -> Result<Vec<CaseSummary>, ShareError> {
        self.store.list_cases().await.map_err(|err| {
            error!(error = %err, "share: list cases failed");
            ShareError::store_failure("load cases", err.to_string())
        })
    }

    pub async fn load_entities(&self, case_id: &CaseId) -> Result<ShareEntitySet, ShareError> {
        let entities = self.store.list_entities(case_id).await.map_err(|err| {
            error!(%case_id, error = %err, "share: list entities failed");
            ShareError::store_failure("load shared users and groups", err.to_string())
        })?;
        Ok(ShareEntitySet::new(case_id.clone(), entities))
    }

    pub async fn load_owner(&self, case_id: &CaseId) -> Result<EntityRef, ShareError> {
        self.store.get_owner(case_id).await.map_err(|err| {
            error!(%case_id, error = %err, "share: get owner failed");
            ShareError::store_failure("load case owner", err.to_string())
        })
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
