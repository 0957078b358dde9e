//! Request lifecycle service.
//!
//! Owns the request state machine: submission through the gate, approval,
//! decline, and manual retry of failed requests. Fulfillment itself happens
//! in the dispatcher; state transitions here only enqueue outbox tasks.

use std::sync::Arc;

use uuid::Uuid;

use fetcharr_core::models::{
    DispatchPayload, MediaItem, MediaKind, MediaStatus, MediaTier, RequestPayload, RequestRecord,
    RequestStatus, User,
};
use fetcharr_core::{RequestError, Settings, StoreError};
use fetcharr_store::{MediaRepository, RequestRepository};
use fetcharr_worker::TaskQueue;

use crate::gate::{can_manage_requests, RequestGate};
use crate::notify::{Notification, NotificationEvent, Notifier};
use crate::rules::{RuleResolver, TargetMetadata};

pub struct RequestService {
    media: Arc<dyn MediaRepository>,
    requests: Arc<dyn RequestRepository>,
    gate: RequestGate,
    resolver: RuleResolver,
    notifier: Arc<dyn Notifier>,
    queue: TaskQueue,
    settings: Arc<Settings>,
}

impl RequestService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        media: Arc<dyn MediaRepository>,
        requests: Arc<dyn RequestRepository>,
        gate: RequestGate,
        resolver: RuleResolver,
        notifier: Arc<dyn Notifier>,
        queue: TaskQueue,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            media,
            requests,
            gate,
            resolver,
            notifier,
            queue,
            settings,
        }
    }

    /// Submit a request. When `payload.on_behalf_of` is set, `subject` must
    /// be that user and the acting user needs manage-requests rights.
    #[tracing::instrument(skip(self, acting, subject, payload), fields(user_id = %acting.id))]
    pub async fn submit(
        &self,
        acting: &User,
        subject: Option<&User>,
        mut payload: RequestPayload,
    ) -> Result<RequestRecord, RequestError> {
        let subject = match payload.on_behalf_of {
            Some(target_id) => {
                if !can_manage_requests(acting.permissions) {
                    return Err(RequestError::Authorization);
                }
                match subject {
                    Some(user) if user.id == target_id => user,
                    _ => return Err(RequestError::NotFound("target user".into())),
                }
            }
            None => acting,
        };

        // Routing overrides on the payload are a reviewer feature.
        if !can_manage_requests(acting.permissions) {
            if payload.server_id.is_some()
                || payload.profile_id.is_some()
                || payload.root_folder.is_some()
                || payload.tags.is_some()
            {
                tracing::debug!(user_id = %acting.id, "Dropping routing overrides from unprivileged submission");
            }
            payload.server_id = None;
            payload.profile_id = None;
            payload.root_folder = None;
            payload.tags = None;
        }

        let kind = payload.target.kind();
        let tier = MediaTier::from_is4k(payload.is4k);

        let metadata = self
            .resolver
            .fetch_metadata(&payload.target)
            .await
            .map_err(|e| RequestError::Upstream(e.to_string()))?;

        let ids = payload.target.media_ids();
        let existing_media = self.media.find_by_ids(kind, &ids).await?;
        let existing_requests = match &existing_media {
            Some(item) => self.requests.find_by_media(item.id).await?,
            None => Vec::new(),
        };

        let outcome = self
            .gate
            .evaluate(
                subject,
                &payload,
                existing_media.as_ref(),
                &existing_requests,
                &metadata.known_seasons(),
            )
            .await?;

        let mut item = existing_media.unwrap_or_else(|| MediaItem::new(kind, ids));
        if item.ids.tvdb_id.is_none() {
            item.ids.tvdb_id = metadata.tvdb_id();
        }

        let mut record = RequestRecord::new(item.id, kind, subject.id, payload.is4k);
        record.is_auto_request = payload.is_auto_request;
        record.server_id = payload.server_id;
        if outcome.auto_approve {
            record.status = RequestStatus::Approved;
            record.modified_by = Some(subject.id);
        }
        if kind == MediaKind::Tv {
            record.set_seasons(outcome.seasons.clone());
        }

        self.stamp_overrides(&mut record, &payload, &metadata, tier)
            .await?;

        let media_status = if outcome.auto_approve && self.backend_configured(&record) {
            MediaStatus::Processing
        } else {
            MediaStatus::Pending
        };
        if !item.tier(tier).status.is_available() {
            item.tier_mut(tier).status = media_status;
        }
        for season_number in &outcome.seasons {
            let season = item.ensure_season(*season_number);
            if season.status(tier) == MediaStatus::Unknown {
                season.set_status(tier, media_status);
            }
        }
        self.media.save(&item).await?;
        self.requests.save(&record).await?;

        let event = if payload.is_auto_request {
            NotificationEvent::RequestAutoSubmitted
        } else if outcome.auto_approve {
            NotificationEvent::RequestAutoApproved
        } else {
            NotificationEvent::RequestPending
        };
        self.notify(&record, event).await;

        if record.status == RequestStatus::Approved {
            self.enqueue_dispatch(record.id).await?;
        }

        Ok(record)
    }

    /// Approve a pending request.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn approve(
        &self,
        actor: &User,
        request_id: Uuid,
    ) -> Result<RequestRecord, RequestError> {
        if !can_manage_requests(actor.permissions) {
            return Err(RequestError::Authorization);
        }
        let mut record = self.get_request(request_id).await?;
        if record.status != RequestStatus::Pending {
            return Err(RequestError::InvalidState(format!(
                "cannot approve a {} request",
                record.status
            )));
        }

        record.status = RequestStatus::Approved;
        record.modified_by = Some(actor.id);
        for season in &mut record.seasons {
            season.status = RequestStatus::Approved;
        }

        self.advance_media_to_processing(&record).await?;
        self.requests.save(&record).await?;
        self.notify(&record, NotificationEvent::RequestApproved).await;
        self.enqueue_dispatch(record.id).await?;
        Ok(record)
    }

    /// Decline a pending request. Media state pinned to `Pending` only by
    /// this request falls back to `Unknown`.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn decline(
        &self,
        actor: &User,
        request_id: Uuid,
    ) -> Result<RequestRecord, RequestError> {
        if !can_manage_requests(actor.permissions) {
            return Err(RequestError::Authorization);
        }
        let mut record = self.get_request(request_id).await?;
        if record.status != RequestStatus::Pending {
            return Err(RequestError::InvalidState(format!(
                "cannot decline a {} request",
                record.status
            )));
        }

        record.status = RequestStatus::Declined;
        record.modified_by = Some(actor.id);
        for season in &mut record.seasons {
            season.status = RequestStatus::Declined;
        }
        self.requests.save(&record).await?;

        self.reset_pending_media(&record).await?;
        self.notify(&record, NotificationEvent::RequestDeclined).await;
        Ok(record)
    }

    /// Re-approve a failed request and dispatch it again.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn retry(
        &self,
        actor: &User,
        request_id: Uuid,
    ) -> Result<RequestRecord, RequestError> {
        if !can_manage_requests(actor.permissions) {
            return Err(RequestError::Authorization);
        }
        let mut record = self.get_request(request_id).await?;
        if record.status != RequestStatus::Failed {
            return Err(RequestError::InvalidState(format!(
                "cannot retry a {} request",
                record.status
            )));
        }

        record.status = RequestStatus::Approved;
        record.modified_by = Some(actor.id);
        self.advance_media_to_processing(&record).await?;
        self.requests.save(&record).await?;
        self.notify(&record, NotificationEvent::RequestApproved).await;
        self.enqueue_dispatch(record.id).await?;
        Ok(record)
    }

    async fn get_request(&self, request_id: Uuid) -> Result<RequestRecord, RequestError> {
        self.requests
            .get(request_id)
            .await?
            .ok_or_else(|| RequestError::NotFound("request".into()))
    }

    /// Merge override-rule values under any reviewer-provided payload values
    /// and store the result on the record.
    async fn stamp_overrides(
        &self,
        record: &mut RequestRecord,
        payload: &RequestPayload,
        metadata: &TargetMetadata,
        tier: MediaTier,
    ) -> Result<(), RequestError> {
        let service_id = payload.server_id.or_else(|| {
            let four_k = tier.is4k();
            match record.kind {
                MediaKind::Movie => self
                    .settings
                    .default_radarr(four_k)
                    .map(|s| s.common.id),
                MediaKind::Tv => self.settings.default_sonarr(four_k).map(|s| s.common.id),
                MediaKind::Music => self.settings.default_lidarr(four_k).map(|s| s.common.id),
            }
        });

        let overrides = match service_id {
            Some(service_id) => {
                self.resolver
                    .resolve(service_id, record.requested_by, metadata)
                    .await?
            }
            None => Default::default(),
        };
        record.profile_id = payload.profile_id.or(overrides.profile_id);
        record.root_folder = payload.root_folder.clone().or(overrides.root_folder);
        record.tags = payload.tags.clone().or(overrides.tags);
        Ok(())
    }

    /// True when an acquisition backend instance exists for the request's
    /// kind and tier. Without one the media record is not advanced to
    /// `Processing`; the dispatcher will log and no-op.
    fn backend_configured(&self, record: &RequestRecord) -> bool {
        let four_k = record.tier().is4k();
        let configured = match (record.kind, record.server_id) {
            (MediaKind::Movie, Some(id)) => self.settings.radarr_by_id(id).is_some(),
            (MediaKind::Movie, None) => self.settings.default_radarr(four_k).is_some(),
            (MediaKind::Tv, Some(id)) => self.settings.sonarr_by_id(id).is_some(),
            (MediaKind::Tv, None) => self.settings.default_sonarr(four_k).is_some(),
            (MediaKind::Music, Some(id)) => self.settings.lidarr_by_id(id).is_some(),
            (MediaKind::Music, None) => self.settings.default_lidarr(four_k).is_some(),
        };
        if !configured {
            tracing::warn!(
                request_id = %record.id,
                kind = %record.kind,
                tier = %record.tier(),
                "No acquisition backend configured, media stays pending"
            );
        }
        configured
    }

    async fn advance_media_to_processing(
        &self,
        record: &RequestRecord,
    ) -> Result<(), RequestError> {
        if !self.backend_configured(record) {
            return Ok(());
        }
        let mut item = self
            .media
            .get(record.media_id)
            .await?
            .ok_or_else(|| RequestError::NotFound("media".into()))?;
        let tier = record.tier();
        if !item.tier(tier).status.is_available() {
            item.tier_mut(tier).status = MediaStatus::Processing;
        }
        for season_number in record.season_numbers() {
            let season = item.ensure_season(season_number);
            if !season.status(tier).is_available() {
                season.set_status(tier, MediaStatus::Processing);
            }
        }
        self.media.save(&item).await?;
        Ok(())
    }

    /// After a decline, release tier/season state that only this request was
    /// holding at `Pending`.
    async fn reset_pending_media(&self, record: &RequestRecord) -> Result<(), RequestError> {
        let Some(mut item) = self.media.get(record.media_id).await? else {
            return Ok(());
        };
        let tier = record.tier();
        let others = self.requests.find_by_media(item.id).await?;
        let covered: Vec<i32> = others
            .iter()
            .filter(|r| r.id != record.id && r.is_active() && r.tier() == tier)
            .flat_map(|r| r.season_numbers())
            .collect();
        let tier_still_requested = others
            .iter()
            .any(|r| r.id != record.id && r.is_active() && r.tier() == tier);

        for season_number in record.season_numbers() {
            if covered.contains(&season_number) {
                continue;
            }
            if let Some(season) = item.season_mut(season_number) {
                if season.status(tier) == MediaStatus::Pending {
                    season.set_status(tier, MediaStatus::Unknown);
                }
            }
        }
        if !tier_still_requested && item.tier(tier).status == MediaStatus::Pending {
            item.tier_mut(tier).status = MediaStatus::Unknown;
        }
        self.media.save(&item).await?;
        Ok(())
    }

    async fn enqueue_dispatch(&self, request_id: Uuid) -> Result<(), RequestError> {
        self.queue
            .submit(&DispatchPayload { request_id })
            .await
            .map_err(|e| RequestError::Store(StoreError::Internal(e.to_string())))?;
        Ok(())
    }

    async fn notify(&self, record: &RequestRecord, event: NotificationEvent) {
        self.notifier
            .notify(Notification {
                event,
                request_id: record.id,
                user_id: record.requested_by,
                kind: record.kind,
                tier: record.tier(),
            })
            .await;
    }
}
