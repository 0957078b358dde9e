//! In-memory reference store.
//!
//! Map-backed implementations of the repository traits, guarded by
//! `tokio::sync::RwLock`. Each repository is its own handle so callers wire
//! them independently; the compare-and-swap operations hold the write lock
//! across the read-check-write, so they are atomic with respect to each
//! other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use fetcharr_core::error::StoreError;
use fetcharr_core::models::{
    DispatchTask, MediaIds, MediaItem, MediaKind, MediaStatus, MediaTier, OverrideRule,
    RequestRecord, ServiceLinkage, TaskStatus,
};

use crate::traits::{MediaRepository, RequestRepository, RuleRepository, TaskStore};

/// All four in-memory repositories, wired together. Handles are cheap to
/// clone and share their maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub media: MemoryMediaRepository,
    pub requests: MemoryRequestRepository,
    pub rules: MemoryRuleRepository,
    pub tasks: MemoryTaskStore,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone, Default)]
pub struct MemoryMediaRepository {
    items: Arc<RwLock<HashMap<Uuid, MediaItem>>>,
}

#[async_trait]
impl MediaRepository for MemoryMediaRepository {
    async fn get(&self, id: Uuid) -> Result<Option<MediaItem>, StoreError> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn find_by_ids(
        &self,
        kind: MediaKind,
        ids: &MediaIds,
    ) -> Result<Option<MediaItem>, StoreError> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .find(|m| m.kind == kind && m.ids.same_title(ids))
            .cloned())
    }

    async fn save(&self, item: &MediaItem) -> Result<(), StoreError> {
        let mut updated = item.clone();
        updated.updated_at = Utc::now();
        self.items.write().await.insert(updated.id, updated);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.items.write().await.remove(&id);
        Ok(())
    }

    async fn scan_available(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MediaItem>, StoreError> {
        let items = self.items.read().await;
        let mut matching: Vec<&MediaItem> = items
            .values()
            .filter(|m| {
                m.tier(MediaTier::Standard).status.is_available()
                    || m.tier(MediaTier::FourK).status.is_available()
            })
            .collect();
        // Stable ordering so the offset cursor does not skip rows mid-run.
        matching.sort_by_key(|m| (m.created_at, m.id));
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn link_tier(
        &self,
        id: Uuid,
        tier: MediaTier,
        linkage: ServiceLinkage,
        status: MediaStatus,
    ) -> Result<bool, StoreError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| StoreError::Internal(format!("media {} not found", id)))?;
        let state = item.tier_mut(tier);
        let same_job = state.linkage.service_id == linkage.service_id
            && state.linkage.external_service_id == linkage.external_service_id;
        if state.linkage.is_linked() && !same_job {
            return Ok(false);
        }
        state.linkage = linkage;
        state.status = status;
        item.updated_at = Utc::now();
        Ok(true)
    }

    async fn demote_tier(
        &self,
        id: Uuid,
        tier: MediaTier,
        expected: MediaStatus,
        new_status: MediaStatus,
        clear_linkage: bool,
        clear_seasons: &[i32],
    ) -> Result<bool, StoreError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| StoreError::Internal(format!("media {} not found", id)))?;
        if item.tier(tier).status != expected {
            return Ok(false);
        }
        let state = item.tier_mut(tier);
        state.status = new_status;
        if clear_linkage {
            state.linkage.clear();
        }
        for season_number in clear_seasons {
            if let Some(season) = item.season_mut(*season_number) {
                season.set_status(tier, MediaStatus::Unknown);
            }
        }
        item.updated_at = Utc::now();
        Ok(true)
    }
}

#[derive(Clone, Default)]
pub struct MemoryRequestRepository {
    records: Arc<RwLock<HashMap<Uuid, RequestRecord>>>,
}

#[async_trait]
impl RequestRepository for MemoryRequestRepository {
    async fn get(&self, id: Uuid) -> Result<Option<RequestRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn save(&self, request: &RequestRecord) -> Result<(), StoreError> {
        let mut updated = request.clone();
        updated.updated_at = Utc::now();
        self.records.write().await.insert(updated.id, updated);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.records.write().await.remove(&id);
        Ok(())
    }

    async fn find_by_media(&self, media_id: Uuid) -> Result<Vec<RequestRecord>, StoreError> {
        let mut matching: Vec<RequestRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.media_id == media_id)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }

    async fn find_by_user_since(
        &self,
        user_id: Uuid,
        kind: MediaKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<RequestRecord>, StoreError> {
        let mut matching: Vec<RequestRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.requested_by == user_id && r.kind == kind && r.created_at >= since)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }
}

#[derive(Clone, Default)]
pub struct MemoryRuleRepository {
    rules: Arc<RwLock<Vec<OverrideRule>>>,
}

impl MemoryRuleRepository {
    /// Seed the rule table (rules are configuration, not user data).
    pub async fn set_rules(&self, rules: Vec<OverrideRule>) {
        *self.rules.write().await = rules;
    }
}

#[async_trait]
impl RuleRepository for MemoryRuleRepository {
    async fn list(&self) -> Result<Vec<OverrideRule>, StoreError> {
        Ok(self.rules.read().await.clone())
    }
}

#[derive(Clone, Default)]
pub struct MemoryTaskStore {
    tasks: Arc<RwLock<HashMap<Uuid, DispatchTask>>>,
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, task: DispatchTask) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DispatchTask>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn claim_next(&self) -> Result<Option<DispatchTask>, StoreError> {
        let mut tasks = self.tasks.write().await;
        let next_id = tasks
            .values()
            .filter(|t| t.is_ready_to_run())
            .min_by_key(|t| (t.scheduled_at, t.id))
            .map(|t| t.id);
        let Some(id) = next_id else {
            return Ok(None);
        };
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::Internal(format!("task {} vanished mid-claim", id)))?;
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        task.updated_at = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn mark_completed(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&id) {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(Utc::now());
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: String) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&id) {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            task.last_error = Some(error);
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        next_run: DateTime<Utc>,
        error: String,
    ) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&id) {
            task.status = TaskStatus::Scheduled;
            task.scheduled_at = next_run;
            task.retry_count += 1;
            task.started_at = None;
            task.last_error = Some(error);
            task.updated_at = Utc::now();
        }
        Ok(())
    }
}
