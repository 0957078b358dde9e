//! Permission and quota gate.
//!
//! Every submission passes through [`RequestGate::evaluate`] before a record
//! is written: permission bits for the kind/tier, blacklist and duplicate
//! checks, season narrowing for TV, and the rolling quota window. The gate
//! also decides whether the request may skip review.

use std::sync::Arc;

use chrono::{Duration, Utc};

use fetcharr_core::config::QuotaDefaults;
use fetcharr_core::models::{
    MediaItem, MediaKind, MediaStatus, MediaTier, Quota, QuotaStatus, RequestPayload,
    RequestRecord, User,
};
use fetcharr_core::permissions::{
    self, Permissions, AUTO_APPROVE, AUTO_APPROVE_4K, AUTO_APPROVE_4K_MOVIE, AUTO_APPROVE_4K_TV,
    AUTO_APPROVE_MOVIE, AUTO_APPROVE_MUSIC, AUTO_APPROVE_TV, AUTO_REQUEST, MANAGE_REQUESTS,
    REQUEST, REQUEST_4K, REQUEST_4K_MOVIE, REQUEST_4K_TV, REQUEST_MOVIE, REQUEST_MUSIC,
    REQUEST_TV,
};
use fetcharr_core::RequestError;
use fetcharr_store::RequestRepository;

/// What the gate decided about an admissible submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub auto_approve: bool,
    /// Effective season set for TV requests; empty for movies and music.
    pub seasons: Vec<i32>,
}

pub struct RequestGate {
    requests: Arc<dyn RequestRepository>,
    quotas: QuotaDefaults,
}

impl RequestGate {
    pub fn new(requests: Arc<dyn RequestRepository>, quotas: QuotaDefaults) -> Self {
        Self { requests, quotas }
    }

    /// Whether this permission mask may submit a request for the kind/tier.
    pub fn can_submit(perms: Permissions, kind: MediaKind, tier: MediaTier) -> bool {
        match (kind, tier) {
            (MediaKind::Movie, MediaTier::Standard) => {
                perms.has_any(&[REQUEST, REQUEST_MOVIE])
            }
            (MediaKind::Tv, MediaTier::Standard) => perms.has_any(&[REQUEST, REQUEST_TV]),
            (MediaKind::Music, MediaTier::Standard) => {
                perms.has_any(&[REQUEST, REQUEST_MUSIC])
            }
            (MediaKind::Movie, MediaTier::FourK) => {
                perms.has_any(&[REQUEST_4K, REQUEST_4K_MOVIE])
            }
            (MediaKind::Tv, MediaTier::FourK) => perms.has_any(&[REQUEST_4K, REQUEST_4K_TV]),
            // There is no 4K music track.
            (MediaKind::Music, MediaTier::FourK) => perms.is_admin(),
        }
    }

    /// Whether this permission mask skips review for the kind/tier.
    pub fn can_auto_approve(perms: Permissions, kind: MediaKind, tier: MediaTier) -> bool {
        if perms.has(MANAGE_REQUESTS) {
            return true;
        }
        match (kind, tier) {
            (MediaKind::Movie, MediaTier::Standard) => {
                perms.has_any(&[AUTO_APPROVE, AUTO_APPROVE_MOVIE])
            }
            (MediaKind::Tv, MediaTier::Standard) => {
                perms.has_any(&[AUTO_APPROVE, AUTO_APPROVE_TV])
            }
            (MediaKind::Music, MediaTier::Standard) => {
                perms.has_any(&[AUTO_APPROVE, AUTO_APPROVE_MUSIC])
            }
            (MediaKind::Movie, MediaTier::FourK) => {
                perms.has_any(&[AUTO_APPROVE_4K, AUTO_APPROVE_4K_MOVIE])
            }
            (MediaKind::Tv, MediaTier::FourK) => {
                perms.has_any(&[AUTO_APPROVE_4K, AUTO_APPROVE_4K_TV])
            }
            (MediaKind::Music, MediaTier::FourK) => false,
        }
    }

    /// The quota that applies to this user for this kind: per-user override
    /// when set, global default otherwise.
    pub fn effective_quota(&self, user: &User, kind: MediaKind) -> Quota {
        let default = self.quotas.for_kind(kind);
        let (limit, days) = match kind {
            MediaKind::Movie => (user.quotas.movie_limit, user.quotas.movie_days),
            MediaKind::Tv => (user.quotas.tv_limit, user.quotas.tv_days),
            MediaKind::Music => (user.quotas.music_limit, user.quotas.music_days),
        };
        Quota {
            limit: limit.unwrap_or(default.limit),
            days: days.unwrap_or(default.days),
        }
    }

    /// Recompute the rolling usage window. TV usage counts seasons, not
    /// request records; auto-generated requests do not consume quota.
    pub async fn quota_status(
        &self,
        user: &User,
        kind: MediaKind,
    ) -> Result<QuotaStatus, RequestError> {
        let quota = self.effective_quota(user, kind);
        if quota.is_unlimited() {
            return Ok(QuotaStatus {
                limit: quota.limit,
                days: quota.days,
                used: 0,
            });
        }

        let since = Utc::now() - Duration::days(quota.days as i64);
        let recent = self
            .requests
            .find_by_user_since(user.id, kind, since)
            .await?;
        let used = recent
            .iter()
            .filter(|r| r.is_active() && !r.is_auto_request)
            .map(|r| match kind {
                MediaKind::Tv => r.seasons.len().max(1) as i32,
                _ => 1,
            })
            .sum();

        Ok(QuotaStatus {
            limit: quota.limit,
            days: quota.days,
            used,
        })
    }

    /// Full gate: permission, blacklist, duplicate, season narrowing, quota.
    pub async fn evaluate(
        &self,
        user: &User,
        payload: &RequestPayload,
        media: Option<&MediaItem>,
        existing_requests: &[RequestRecord],
        known_seasons: &[i32],
    ) -> Result<GateOutcome, RequestError> {
        let kind = payload.target.kind();
        let tier = MediaTier::from_is4k(payload.is4k);
        let perms = user.permissions;

        if !Self::can_submit(perms, kind, tier) {
            return Err(RequestError::Authorization);
        }
        if payload.is_auto_request && !perms.has(AUTO_REQUEST) {
            return Err(RequestError::Authorization);
        }

        if let Some(item) = media {
            // The blacklist is per-title, not per-tier.
            if item.standard.status == MediaStatus::Blacklisted
                || item.four_k.status == MediaStatus::Blacklisted
            {
                return Err(RequestError::BlacklistedMedia);
            }
        }

        let active_same_tier: Vec<&RequestRecord> = existing_requests
            .iter()
            .filter(|r| r.is_active() && r.tier() == tier)
            .collect();

        // An active auto-generated request by this user blocks any further
        // submission for the title/tier, TV included.
        if active_same_tier
            .iter()
            .any(|r| r.is_auto_request && r.requested_by == user.id)
        {
            return Err(RequestError::DuplicateRequest);
        }

        let seasons = match kind {
            MediaKind::Tv => {
                self.requestable_seasons(payload, media, &active_same_tier, known_seasons, tier)?
            }
            _ => {
                let already_tracked = media
                    .map(|item| item.tier(tier).status != MediaStatus::Unknown)
                    .unwrap_or(false);
                if already_tracked || !active_same_tier.is_empty() {
                    return Err(RequestError::DuplicateRequest);
                }
                Vec::new()
            }
        };

        if !payload.is_auto_request {
            let status = self.quota_status(user, kind).await?;
            let units = match kind {
                MediaKind::Tv => seasons.len() as i32,
                _ => 1,
            };
            if status.limit > 0 && status.used + units > status.limit {
                return Err(RequestError::QuotaExceeded {
                    kind,
                    limit: status.limit,
                    days: status.days,
                    used: status.used,
                });
            }
        }

        Ok(GateOutcome {
            auto_approve: Self::can_auto_approve(perms, kind, tier),
            seasons,
        })
    }

    /// Narrow a TV request to the seasons that can still be requested:
    /// seasons the title actually has, not already tracked on this tier, and
    /// not covered by an active request.
    fn requestable_seasons(
        &self,
        payload: &RequestPayload,
        media: Option<&MediaItem>,
        active_same_tier: &[&RequestRecord],
        known_seasons: &[i32],
        tier: MediaTier,
    ) -> Result<Vec<i32>, RequestError> {
        let requested = payload.target.requested_seasons();
        let mut candidates: Vec<i32> = if requested.is_empty() {
            known_seasons.to_vec()
        } else {
            requested
                .iter()
                .copied()
                .filter(|s| known_seasons.contains(s))
                .collect()
        };
        candidates.retain(|s| *s > 0);
        candidates.sort_unstable();
        candidates.dedup();

        if let Some(item) = media {
            candidates.retain(|number| {
                item.season(*number)
                    .map(|season| season.status(tier) == MediaStatus::Unknown)
                    .unwrap_or(true)
            });
        }
        let covered: Vec<i32> = active_same_tier
            .iter()
            .flat_map(|r| r.season_numbers())
            .collect();
        candidates.retain(|s| !covered.contains(s));

        if candidates.is_empty() {
            return Err(RequestError::NoSeasonsAvailable);
        }
        Ok(candidates)
    }
}

/// Whether `actor` may act on requests submitted by others.
pub fn can_manage_requests(perms: Permissions) -> bool {
    perms.has(permissions::MANAGE_REQUESTS)
}
