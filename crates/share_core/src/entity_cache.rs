//! Per-case entity lists kept in step with share changes on the page.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::{CaseId, OwnerId, Scope, ShareEntitySet},
    error::ShareError,
    protocol::{BusEvent, EventName},
};
use storage::ShareRecordStore;
use tracing::{debug, info, warn};

use crate::event_bus::{EventBus, ListenerCallback, ListenerHandle};

#[derive(Default)]
struct CacheState {
    sets: HashMap<CaseId, ShareEntitySet>,
    stale: HashSet<CaseId>,
}

pub struct ShareEntityCache {
    bus: Arc<EventBus>,
    scope: Scope,
    owner: OwnerId,
    state: Arc<Mutex<CacheState>>,
    on_drop_success: ListenerCallback,
    subscription: Mutex<Option<ListenerHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ShareEntityCache {
    pub fn new(bus: Arc<EventBus>, scope: Scope) -> Self {
        let state = Arc::new(Mutex::new(CacheState::default()));
        let on_drop_success: ListenerCallback = {
            let state = Arc::clone(&state);
            Arc::new(move |event: &BusEvent| -> anyhow::Result<()> {
                if let BusEvent::ShareDropSuccess(target) = event {
                    debug!(case_id = %target.case_id, "cache: marked stale after removal");
                    lock(&state).stale.insert(target.case_id.clone());
                }
                Ok(())
            })
        };
        Self {
            bus,
            scope,
            owner: OwnerId::new("shareEntityCache"),
            state,
            on_drop_success,
            subscription: Mutex::new(None),
        }
    }

    /// Subscribes to successful removals on the cache's scope.
    pub fn attach(&self) {
        let handle = self.bus.register(
            EventName::ShareDropSuccess,
            self.scope.clone(),
            self.owner.clone(),
            Arc::clone(&self.on_drop_success),
        );
        *lock(&self.subscription) = Some(handle);
    }

    pub fn detach(&self) {
        if let Some(handle) = lock(&self.subscription).take() {
            self.bus.unregister(handle);
        }
    }

    pub fn get(&self, case_id: &CaseId) -> Option<ShareEntitySet> {
        lock(&self.state).sets.get(case_id).cloned()
    }

    pub fn is_stale(&self, case_id: &CaseId) -> bool {
        lock(&self.state).stale.contains(case_id)
    }

    /// Marks a case for reload, e.g. after a share was added.
    pub fn invalidate(&self, case_id: &CaseId) {
        lock(&self.state).stale.insert(case_id.clone());
    }

    /// Loads a case's entities and replaces whatever was cached for it.
    pub async fn load(
        &self,
        store: &dyn ShareRecordStore,
        case_id: &CaseId,
    ) -> Result<ShareEntitySet, ShareError> {
        let entities = store.list_entities(case_id).await.map_err(|err| {
            warn!(%case_id, error = %err, "cache: reload failed");
            ShareError::store_failure("load shared users and groups", err.to_string())
        })?;

        let mut state = lock(&self.state);
        state.stale.remove(case_id);
        let set = state
            .sets
            .entry(case_id.clone())
            .or_insert_with(|| ShareEntitySet::new(case_id.clone(), Vec::new()));
        set.replace(entities);
        Ok(set.clone())
    }

    /// Reloads every stale case. Cases whose reload fails stay stale.
    pub async fn refresh_stale(&self, store: &dyn ShareRecordStore) -> Vec<CaseId> {
        let stale: Vec<CaseId> = lock(&self.state).stale.iter().cloned().collect();
        let mut refreshed = Vec::new();
        for case_id in stale {
            if self.load(store, &case_id).await.is_ok() {
                refreshed.push(case_id);
            }
        }
        if !refreshed.is_empty() {
            info!(cases = refreshed.len(), "cache: refreshed stale cases");
        }
        refreshed
    }
}

impl Drop for ShareEntityCache {
    fn drop(&mut self) {
        self.detach();
    }
}
