use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use shared::domain::{CaseId, CaseSummary, EntityId, EntityKind, EntityRef};

/// Backing store for cases and their share records.
///
/// Every call may fail with a transport error. `create_share`/`delete_share`
/// return `Ok(false)` when the store declines the change.
#[async_trait]
pub trait ShareRecordStore: Send + Sync {
    async fn list_cases(&self) -> Result<Vec<CaseSummary>>;
    async fn list_entities(&self, case_id: &CaseId) -> Result<Vec<EntityRef>>;
    async fn get_owner(&self, case_id: &CaseId) -> Result<EntityRef>;
    async fn create_share(&self, case_id: &CaseId, entity_id: &EntityId) -> Result<bool>;
    async fn delete_share(&self, case_id: &CaseId, entity_id: &EntityId) -> Result<bool>;
}

pub struct MissingShareRecordStore;

#[async_trait]
impl ShareRecordStore for MissingShareRecordStore {
    async fn list_cases(&self) -> Result<Vec<CaseSummary>> {
        Err(anyhow!("share record store unavailable"))
    }

    async fn list_entities(&self, case_id: &CaseId) -> Result<Vec<EntityRef>> {
        Err(anyhow!("share record store unavailable for case {case_id}"))
    }

    async fn get_owner(&self, case_id: &CaseId) -> Result<EntityRef> {
        Err(anyhow!("share record store unavailable for case {case_id}"))
    }

    async fn create_share(&self, case_id: &CaseId, _entity_id: &EntityId) -> Result<bool> {
        Err(anyhow!("share record store unavailable for case {case_id}"))
    }

    async fn delete_share(&self, case_id: &CaseId, _entity_id: &EntityId) -> Result<bool> {
        Err(anyhow!("share record store unavailable for case {case_id}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub cases: Vec<SeedCase>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner: SeedEntity,
    #[serde(default)]
    pub entities: Vec<SeedEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: EntityKind,
}

impl SeedEntity {
    fn into_entity_ref(self, is_owner: bool) -> EntityRef {
        EntityRef {
            id: EntityId::new(self.id),
            is_owner,
            name: self.name,
            kind: self.kind,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredCase {
    summary: CaseSummary,
    owner: EntityRef,
    shares: Vec<EntityRef>,
}

impl StoredCase {
    fn entities(&self) -> Vec<EntityRef> {
        std::iter::once(self.owner.clone())
            .chain(self.shares.iter().cloned())
            .collect()
    }
}

/// In-memory share store. Cases keep their seed order; shares keep insertion order.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    cases: Arc<RwLock<BTreeMap<usize, StoredCase>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedFile) -> Self {
        let cases = seed
            .cases
            .into_iter()
            .enumerate()
            .map(|(position, case)| {
                let owner = case.owner.into_entity_ref(true);
                let shares = case
                    .entities
                    .into_iter()
                    .map(|entity| entity.into_entity_ref(false))
                    .filter(|entity| entity.id != owner.id)
                    .collect();
                let stored = StoredCase {
                    summary: CaseSummary {
                        id: CaseId::new(case.id),
                        name: case.name,
                        description: case.description,
                    },
                    owner,
                    shares,
                };
                (position, stored)
            })
            .collect();
        Self {
            cases: Arc::new(RwLock::new(cases)),
        }
    }

    pub async fn load_seed(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read seed file '{}'", path.display()))?;
        let seed: SeedFile = toml::from_str(&raw)
            .with_context(|| format!("failed to parse seed file '{}'", path.display()))?;
        info!(
            path = %path.display(),
            cases = seed.cases.len(),
            "storage: seed loaded"
        );
        Ok(Self::from_seed(seed))
    }

    pub async fn insert_case(&self, summary: CaseSummary, owner: EntityRef) {
        let mut guard = self.cases.write().await;
        let position = guard.keys().next_back().map_or(0, |last| last + 1);
        guard.insert(
            position,
            StoredCase {
                summary,
                owner: EntityRef {
                    is_owner: true,
                    ..owner
                },
                shares: Vec::new(),
            },
        );
    }

    async fn with_case<T>(
        &self,
        case_id: &CaseId,
        f: impl FnOnce(&StoredCase) -> T,
    ) -> Result<T> {
        let guard = self.cases.read().await;
        guard
            .values()
            .find(|case| &case.summary.id == case_id)
            .map(f)
            .ok_or_else(|| anyhow!("case {case_id} not found"))
    }
}

#[async_trait]
impl ShareRecordStore for MemoryStorage {
    async fn list_cases(&self) -> Result<Vec<CaseSummary>> {
        let guard = self.cases.read().await;
        Ok(guard.values().map(|case| case.summary.clone()).collect())
    }

    async fn list_entities(&self, case_id: &CaseId) -> Result<Vec<EntityRef>> {
        self.with_case(case_id, StoredCase::entities).await
    }

    async fn get_owner(&self, case_id: &CaseId) -> Result<EntityRef> {
        self.with_case(case_id, |case| case.owner.clone()).await
    }

    async fn create_share(&self, case_id: &CaseId, entity_id: &EntityId) -> Result<bool> {
        let mut guard = self.cases.write().await;
        let Some(case) = guard.values_mut().find(|case| &case.summary.id == case_id) else {
            return Ok(false);
        };
        if case.owner.id == *entity_id || case.shares.iter().any(|e| e.id == *entity_id) {
            debug!(%case_id, %entity_id, "storage: share already present");
            return Ok(false);
        }
        case.shares.push(EntityRef::new(entity_id.as_str()));
        Ok(true)
    }

    async fn delete_share(&self, case_id: &CaseId, entity_id: &EntityId) -> Result<bool> {
        let mut guard = self.cases.write().await;
        let Some(case) = guard.values_mut().find(|case| &case.summary.id == case_id) else {
            return Ok(false);
        };
        let before = case.shares.len();
        case.shares.retain(|entity| entity.id != *entity_id);
        Ok(case.shares.len() < before)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
