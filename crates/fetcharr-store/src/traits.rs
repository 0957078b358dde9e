use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use fetcharr_core::error::StoreError;
use fetcharr_core::models::{
    DispatchTask, MediaIds, MediaItem, MediaKind, MediaStatus, MediaTier, OverrideRule,
    RequestRecord, ServiceLinkage,
};

/// Media item persistence.
///
/// The two compare-and-swap operations exist because a dispatch and a sweep
/// may touch the same tier concurrently: writers key their update on the
/// tier's current state and back off when it changed underneath them.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<MediaItem>, StoreError>;

    async fn find_by_ids(
        &self,
        kind: MediaKind,
        ids: &MediaIds,
    ) -> Result<Option<MediaItem>, StoreError>;

    async fn save(&self, item: &MediaItem) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Page through items whose standard or 4K status is available or
    /// partially available. Ordering is stable across a run; a page shorter
    /// than `limit` (or empty) ends the scan.
    async fn scan_available(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MediaItem>, StoreError>;

    /// Write backend linkage and status onto a tier only if the tier is
    /// currently unlinked or already linked to the same backend item.
    /// Returns `false` when a concurrent writer got there first.
    async fn link_tier(
        &self,
        id: Uuid,
        tier: MediaTier,
        linkage: ServiceLinkage,
        status: MediaStatus,
    ) -> Result<bool, StoreError>;

    /// Demote a tier, keyed on its current status. Optionally clears the
    /// tier's linkage and resets the listed seasons to `Unknown` for that
    /// tier. Returns `false` when the tier's status no longer matches
    /// `expected` (concurrent mutation; the caller skips the write).
    async fn demote_tier(
        &self,
        id: Uuid,
        tier: MediaTier,
        expected: MediaStatus,
        new_status: MediaStatus,
        clear_linkage: bool,
        clear_seasons: &[i32],
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<RequestRecord>, StoreError>;

    async fn save(&self, request: &RequestRecord) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    async fn find_by_media(&self, media_id: Uuid) -> Result<Vec<RequestRecord>, StoreError>;

    /// All requests by this user for this kind created at or after `since`.
    /// The quota gate filters declined/auto records itself.
    async fn find_by_user_since(
        &self,
        user_id: Uuid,
        kind: MediaKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<RequestRecord>, StoreError>;
}

/// Override rules are immutable configuration, evaluated per request.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<OverrideRule>, StoreError>;
}

/// Outbox for the worker queue.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: DispatchTask) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<DispatchTask>, StoreError>;

    /// Claim the next ready task (marks it running). Returns `None` when
    /// nothing is due.
    async fn claim_next(&self) -> Result<Option<DispatchTask>, StoreError>;

    async fn mark_completed(&self, id: Uuid) -> Result<(), StoreError>;

    async fn mark_failed(&self, id: Uuid, error: String) -> Result<(), StoreError>;

    /// Bump the retry counter and reschedule the task for `next_run`.
    async fn schedule_retry(
        &self,
        id: Uuid,
        next_run: DateTime<Utc>,
        error: String,
    ) -> Result<(), StoreError>;
}
