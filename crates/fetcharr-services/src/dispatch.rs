//! Fulfillment dispatch.
//!
//! Consumes the outbox written by the request service and drives the
//! acquisition backends: add-or-adopt the title, flip monitoring, trigger a
//! search, and link the backend job onto the media tier. Transient backend
//! failures ride the queue's retry; once retries are exhausted (or the task
//! is hopeless) the request is marked failed and the requester notified.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use fetcharr_backends::metadata::MetadataProvider;
use fetcharr_backends::movie::{AddMovieParams, MovieBackend};
use fetcharr_backends::music::{EnsureArtistParams, MusicBackend};
use fetcharr_backends::series::{AddSeriesParams, SeriesBackend, SeriesType};
use fetcharr_core::config::{LidarrSettings, RadarrSettings, SonarrSettings};
use fetcharr_core::models::{
    DispatchPayload, DispatchTask, MediaItem, MediaKind, MediaStatus, MediaTier,
    MusicAddAlbumPayload, MusicMonitorCheckPayload, RequestRecord, RequestStatus, ServiceLinkage,
    TaskKind,
};
use fetcharr_core::{Settings, TaskError};
use fetcharr_store::{MediaRepository, RequestRepository};
use fetcharr_worker::{TaskHandler, TaskQueue};

use crate::notify::{Notification, NotificationEvent, Notifier};

/// Backend clients keyed by instance id from settings.
#[derive(Default, Clone)]
pub struct BackendSet {
    pub movie: HashMap<i32, Arc<dyn MovieBackend>>,
    pub series: HashMap<i32, Arc<dyn SeriesBackend>>,
    pub music: HashMap<i32, Arc<dyn MusicBackend>>,
}

#[derive(Clone)]
pub struct DispatchConfig {
    /// Delay between adding an artist and monitoring its album; the backend
    /// needs time to pull the artist's album list.
    pub artist_settle_seconds: i64,
    /// Delay between monitor re-checks.
    pub monitor_check_interval_seconds: i64,
    /// Give up confirming album monitoring after this many checks.
    pub monitor_check_max_attempts: u32,
    /// Default metadata profile for newly added artists.
    pub metadata_profile_id: i32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            artist_settle_seconds: 30,
            monitor_check_interval_seconds: 30,
            monitor_check_max_attempts: 5,
            metadata_profile_id: 1,
        }
    }
}

pub struct FulfillmentDispatcher {
    media: Arc<dyn MediaRepository>,
    requests: Arc<dyn RequestRepository>,
    backends: BackendSet,
    metadata: Arc<dyn MetadataProvider>,
    notifier: Arc<dyn Notifier>,
    queue: TaskQueue,
    settings: Arc<Settings>,
    config: DispatchConfig,
    /// (media, tier) pairs currently being dispatched by this process.
    inflight: Mutex<HashSet<(Uuid, MediaTier)>>,
}

/// Removes the (media, tier) marker when dispatch finishes, on every path.
struct InflightGuard<'a> {
    set: &'a Mutex<HashSet<(Uuid, MediaTier)>>,
    key: (Uuid, MediaTier),
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

impl FulfillmentDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        media: Arc<dyn MediaRepository>,
        requests: Arc<dyn RequestRepository>,
        backends: BackendSet,
        metadata: Arc<dyn MetadataProvider>,
        notifier: Arc<dyn Notifier>,
        queue: TaskQueue,
        settings: Arc<Settings>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            media,
            requests,
            backends,
            metadata,
            notifier,
            queue,
            settings,
            config,
            inflight: Mutex::new(HashSet::new()),
        }
    }

    fn try_claim(&self, key: (Uuid, MediaTier)) -> Option<InflightGuard<'_>> {
        let mut set = self.inflight.lock().ok()?;
        if !set.insert(key) {
            return None;
        }
        Some(InflightGuard {
            set: &self.inflight,
            key,
        })
    }

    /// Load the request a task refers to, skipping tasks whose request was
    /// declined, deleted, or already failed since enqueueing.
    async fn approved_request(&self, request_id: Uuid) -> Result<Option<RequestRecord>> {
        let Some(request) = self.requests.get(request_id).await? else {
            tracing::debug!(%request_id, "Request vanished before dispatch, skipping");
            return Ok(None);
        };
        if request.status != RequestStatus::Approved {
            tracing::debug!(%request_id, status = %request.status, "Request no longer approved, skipping dispatch");
            return Ok(None);
        }
        Ok(Some(request))
    }

    async fn media_for(&self, request: &RequestRecord) -> Result<MediaItem> {
        self.media
            .get(request.media_id)
            .await?
            .ok_or_else(|| anyhow::Error::from(TaskError::unrecoverable(anyhow!("media record missing"))))
    }

    async fn fail_request(&self, request_id: Uuid, reason: &str) {
        let record = match self.requests.get(request_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(%request_id, error = %e, "Failed to load request for failure marking");
                return;
            }
        };
        let mut record = record;
        record.status = RequestStatus::Failed;
        for season in &mut record.seasons {
            season.status = RequestStatus::Failed;
        }
        if let Err(e) = self.requests.save(&record).await {
            tracing::error!(%request_id, error = %e, "Failed to persist failed request");
            return;
        }
        self.notifier
            .notify(Notification {
                event: NotificationEvent::RequestFailed {
                    reason: reason.to_string(),
                },
                request_id: record.id,
                user_id: record.requested_by,
                kind: record.kind,
                tier: record.tier(),
            })
            .await;
    }

    // -- movies --------------------------------------------------------

    #[tracing::instrument(skip(self, request, media), fields(request_id = %request.id))]
    async fn dispatch_movie(&self, request: &RequestRecord, media: &MediaItem) -> Result<()> {
        let tier = request.tier();
        let Some(instance) = self.radarr_instance(request, tier) else {
            tracing::warn!(request_id = %request.id, "No movie backend configured for this tier, leaving request as is");
            return Ok(());
        };
        let client = self
            .backends
            .movie
            .get(&instance.common.id)
            .ok_or_else(|| {
                TaskError::unrecoverable(anyhow!(
                    "no client wired for movie backend instance {}",
                    instance.common.id
                ))
            })?
            .clone();
        let tmdb_id = media
            .ids
            .tmdb_id
            .ok_or_else(|| TaskError::unrecoverable(anyhow!("movie record has no tmdb id")))?;

        let mut tags = request
            .tags
            .clone()
            .unwrap_or_else(|| instance.common.tags.clone());
        if instance.common.tag_requests {
            let tag = client
                .ensure_tag(&requester_tag_label(request.requested_by))
                .await?;
            tags.push(tag.id);
        }

        let movie = match client.find_by_tmdb(tmdb_id).await? {
            Some(existing) => {
                tracing::info!(request_id = %request.id, movie_id = existing.id, "Movie already present on backend, adopting");
                existing
            }
            None => {
                client
                    .add_movie(AddMovieParams {
                        tmdb_id,
                        quality_profile_id: request
                            .profile_id
                            .unwrap_or(instance.common.active_profile_id),
                        root_folder_path: request
                            .root_folder
                            .clone()
                            .unwrap_or_else(|| instance.common.active_directory.clone()),
                        minimum_availability: instance.minimum_availability.clone(),
                        tags,
                        search_now: true,
                    })
                    .await?
            }
        };

        let status = if movie.has_file {
            MediaStatus::Available
        } else {
            MediaStatus::Processing
        };
        let linkage = ServiceLinkage {
            service_id: Some(instance.common.id),
            external_service_id: Some(movie.id),
            external_service_slug: movie.title_slug.clone(),
            media_server_item_id: media.tier(tier).linkage.media_server_item_id.clone(),
        };
        if !self.media.link_tier(media.id, tier, linkage, status).await? {
            tracing::debug!(request_id = %request.id, "Tier already linked to another job, leaving it alone");
        }
        Ok(())
    }

    fn radarr_instance(&self, request: &RequestRecord, tier: MediaTier) -> Option<&RadarrSettings> {
        match request.server_id {
            Some(id) => self.settings.radarr_by_id(id),
            None => self.settings.default_radarr(tier.is4k()),
        }
    }

    // -- series --------------------------------------------------------

    #[tracing::instrument(skip(self, request, media), fields(request_id = %request.id))]
    async fn dispatch_series(&self, request: &RequestRecord, media: &MediaItem) -> Result<()> {
        let tier = request.tier();
        let Some(instance) = self.sonarr_instance(request, tier) else {
            tracing::warn!(request_id = %request.id, "No series backend configured for this tier, leaving request as is");
            return Ok(());
        };
        let client = self
            .backends
            .series
            .get(&instance.common.id)
            .ok_or_else(|| {
                TaskError::unrecoverable(anyhow!(
                    "no client wired for series backend instance {}",
                    instance.common.id
                ))
            })?
            .clone();
        let tvdb_id = media
            .ids
            .tvdb_id
            .ok_or_else(|| TaskError::unrecoverable(anyhow!("series record has no tvdb id")))?;
        let tmdb_id = media
            .ids
            .tmdb_id
            .ok_or_else(|| TaskError::unrecoverable(anyhow!("series record has no tmdb id")))?;
        let seasons = request.season_numbers();

        // Anime routing needs the title's keywords.
        let attrs = self.metadata.tv_details(tmdb_id).await?.attributes;
        let anime = attrs.is_anime && instance.active_anime_profile_id.is_some();
        let (default_profile, default_root) = if anime {
            (
                instance
                    .active_anime_profile_id
                    .unwrap_or(instance.common.active_profile_id),
                instance
                    .active_anime_directory
                    .clone()
                    .unwrap_or_else(|| instance.common.active_directory.clone()),
            )
        } else {
            (
                instance.common.active_profile_id,
                instance.common.active_directory.clone(),
            )
        };
        let mut tags = request.tags.clone().unwrap_or_else(|| {
            if anime {
                instance.anime_tags.clone()
            } else {
                instance.common.tags.clone()
            }
        });
        if instance.common.tag_requests {
            let tag = client
                .ensure_tag(&requester_tag_label(request.requested_by))
                .await?;
            tags.push(tag.id);
        }

        let series = match client.find_by_tvdb(tvdb_id).await? {
            Some(mut existing) => {
                for season in &mut existing.seasons {
                    if seasons.contains(&season.season_number) {
                        season.monitored = true;
                    }
                }
                existing.monitored = true;
                let updated = client.update_series(&existing).await?;
                client.search_seasons(updated.id, &seasons).await?;
                updated
            }
            None => {
                client
                    .add_series(AddSeriesParams {
                        tvdb_id,
                        quality_profile_id: request.profile_id.unwrap_or(default_profile),
                        root_folder_path: request
                            .root_folder
                            .clone()
                            .unwrap_or(default_root),
                        season_folder: instance.enable_season_folders,
                        series_type: if anime {
                            SeriesType::Anime
                        } else {
                            SeriesType::Standard
                        },
                        tags,
                        monitored_seasons: seasons.clone(),
                        search_now: true,
                    })
                    .await?
            }
        };

        let linkage = ServiceLinkage {
            service_id: Some(instance.common.id),
            external_service_id: Some(series.id),
            external_service_slug: series.title_slug.clone(),
            media_server_item_id: media.tier(tier).linkage.media_server_item_id.clone(),
        };
        if !self
            .media
            .link_tier(media.id, tier, linkage, MediaStatus::Processing)
            .await?
        {
            tracing::debug!(request_id = %request.id, "Tier already linked to another job, leaving it alone");
        }
        Ok(())
    }

    fn sonarr_instance(&self, request: &RequestRecord, tier: MediaTier) -> Option<&SonarrSettings> {
        match request.server_id {
            Some(id) => self.settings.sonarr_by_id(id),
            None => self.settings.default_sonarr(tier.is4k()),
        }
    }

    // -- music ---------------------------------------------------------

    #[tracing::instrument(skip(self, request, media), fields(request_id = %request.id))]
    async fn dispatch_album(&self, request: &RequestRecord, media: &MediaItem) -> Result<()> {
        let tier = request.tier();
        let Some(instance) = self.lidarr_instance(request, tier) else {
            tracing::warn!(request_id = %request.id, "No music backend configured, leaving request as is");
            return Ok(());
        };
        let client = self
            .backends
            .music
            .get(&instance.common.id)
            .ok_or_else(|| {
                TaskError::unrecoverable(anyhow!(
                    "no client wired for music backend instance {}",
                    instance.common.id
                ))
            })?
            .clone();
        let mb_id = media
            .ids
            .mb_id
            .clone()
            .ok_or_else(|| TaskError::unrecoverable(anyhow!("album record has no mb id")))?;

        if let Some(album) = client.find_album_by_mbid(&mb_id).await? {
            if !album.monitored {
                client.set_album_monitored(album.id, true).await?;
            }
            client.search_album(album.id).await?;
            self.link_album(media, tier, instance.common.id, album.id, album.has_files())
                .await?;
            return Ok(());
        }

        let lookup = client.lookup_album(&mb_id).await?.ok_or_else(|| {
            TaskError::unrecoverable(anyhow!("album {} not found in metadata mirror", mb_id))
        })?;

        let mut tags = request
            .tags
            .clone()
            .unwrap_or_else(|| instance.common.tags.clone());
        if instance.common.tag_requests {
            let tag = client
                .ensure_tag(&requester_tag_label(request.requested_by))
                .await?;
            tags.push(tag.id);
        }

        let artist = client
            .ensure_artist(EnsureArtistParams {
                artist: lookup.artist.clone(),
                quality_profile_id: request
                    .profile_id
                    .unwrap_or(instance.common.active_profile_id),
                metadata_profile_id: self.config.metadata_profile_id,
                root_folder_path: request
                    .root_folder
                    .clone()
                    .unwrap_or_else(|| instance.common.active_directory.clone()),
                tags,
            })
            .await?;

        // The album becomes monitorable only after the backend refreshes the
        // artist, so the second step runs as its own delayed task.
        self.queue
            .submit_at(
                &MusicAddAlbumPayload {
                    request_id: request.id,
                    service_id: instance.common.id,
                    artist_id: artist.id,
                },
                Utc::now() + Duration::seconds(self.config.artist_settle_seconds),
            )
            .await?;
        tracing::info!(request_id = %request.id, artist_id = artist.id, "Artist added, album monitoring scheduled");
        Ok(())
    }

    fn lidarr_instance(&self, request: &RequestRecord, tier: MediaTier) -> Option<&LidarrSettings> {
        match request.server_id {
            Some(id) => self.settings.lidarr_by_id(id),
            None => self.settings.default_lidarr(tier.is4k()),
        }
    }

    async fn link_album(
        &self,
        media: &MediaItem,
        tier: MediaTier,
        service_id: i32,
        album_id: i64,
        has_files: bool,
    ) -> Result<()> {
        let status = if has_files {
            MediaStatus::Available
        } else {
            MediaStatus::Processing
        };
        let linkage = ServiceLinkage {
            service_id: Some(service_id),
            external_service_id: Some(album_id),
            external_service_slug: None,
            media_server_item_id: media.tier(tier).linkage.media_server_item_id.clone(),
        };
        if !self.media.link_tier(media.id, tier, linkage, status).await? {
            tracing::debug!(media_id = %media.id, "Album tier already linked, leaving it alone");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    async fn handle_music_add_album(&self, task: &DispatchTask) -> Result<()> {
        let payload: MusicAddAlbumPayload = task.try_payload_as()?;
        let Some(request) = self.approved_request(payload.request_id).await? else {
            return Ok(());
        };
        let media = self.media_for(&request).await?;
        let client = self
            .backends
            .music
            .get(&payload.service_id)
            .ok_or_else(|| {
                TaskError::unrecoverable(anyhow!(
                    "no client wired for music backend instance {}",
                    payload.service_id
                ))
            })?
            .clone();
        let mb_id = media
            .ids
            .mb_id
            .clone()
            .ok_or_else(|| TaskError::unrecoverable(anyhow!("album record has no mb id")))?;

        // Recoverable: the artist refresh may still be running.
        let album = client
            .find_album_by_mbid(&mb_id)
            .await?
            .ok_or_else(|| anyhow!("album {} not visible on backend yet", mb_id))?;

        client.set_album_monitored(album.id, true).await?;
        client.search_album(album.id).await?;
        self.link_album(
            &media,
            request.tier(),
            payload.service_id,
            album.id,
            album.has_files(),
        )
        .await?;

        self.queue
            .submit_at(
                &MusicMonitorCheckPayload {
                    request_id: request.id,
                    service_id: payload.service_id,
                    album_id: album.id,
                    attempt: 1,
                },
                Utc::now() + Duration::seconds(self.config.monitor_check_interval_seconds),
            )
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    async fn handle_music_monitor_check(&self, task: &DispatchTask) -> Result<()> {
        let payload: MusicMonitorCheckPayload = task.try_payload_as()?;
        let client = self
            .backends
            .music
            .get(&payload.service_id)
            .ok_or_else(|| {
                TaskError::unrecoverable(anyhow!(
                    "no client wired for music backend instance {}",
                    payload.service_id
                ))
            })?
            .clone();

        let Some(album) = client.get_album(payload.album_id).await? else {
            tracing::warn!(album_id = payload.album_id, "Album disappeared from backend, dropping monitor check");
            return Ok(());
        };
        if album.monitored {
            return Ok(());
        }

        tracing::info!(
            album_id = payload.album_id,
            attempt = payload.attempt,
            "Album still unmonitored, re-applying"
        );
        client.set_album_monitored(album.id, true).await?;

        if payload.attempt >= self.config.monitor_check_max_attempts {
            tracing::warn!(
                album_id = payload.album_id,
                attempts = payload.attempt,
                "Giving up confirming album monitoring"
            );
            return Ok(());
        }
        let delay = self.config.monitor_check_interval_seconds
            * i64::from(2u32.pow(payload.attempt.saturating_sub(1)));
        self.queue
            .submit_at(
                &MusicMonitorCheckPayload {
                    attempt: payload.attempt + 1,
                    ..payload
                },
                Utc::now() + Duration::seconds(delay),
            )
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    async fn handle_dispatch(&self, task: &DispatchTask) -> Result<()> {
        let payload: DispatchPayload = task.try_payload_as()?;
        let Some(request) = self.approved_request(payload.request_id).await? else {
            return Ok(());
        };
        let media = self.media_for(&request).await?;
        let tier = request.tier();

        // Availability short-circuit: nothing to dispatch when the tier (or
        // every requested season) is already here.
        let already_available = match request.kind {
            MediaKind::Tv => {
                let seasons = request.season_numbers();
                !seasons.is_empty()
                    && seasons.iter().all(|n| {
                        media
                            .season(*n)
                            .map(|s| s.status(tier) == MediaStatus::Available)
                            .unwrap_or(false)
                    })
            }
            _ => media.tier(tier).status == MediaStatus::Available,
        };
        if already_available {
            tracing::debug!(request_id = %request.id, "Requested media already available, skipping dispatch");
            return Ok(());
        }

        let Some(_guard) = self.try_claim((media.id, tier)) else {
            tracing::debug!(request_id = %request.id, "Dispatch already in flight for this tier, skipping");
            return Ok(());
        };

        match request.kind {
            MediaKind::Movie => {
                self.dispatch_movie(&request, &media).await
            }
            MediaKind::Tv => self.dispatch_series(&request, &media).await,
            MediaKind::Music => {
                self.dispatch_album(&request, &media).await
            }
        }
    }
}

#[async_trait]
impl TaskHandler for FulfillmentDispatcher {
    async fn handle_task(self: Arc<Self>, task: &DispatchTask) -> Result<()> {
        let result = match task.kind {
            TaskKind::Dispatch => self.handle_dispatch(task).await,
            TaskKind::MusicAddAlbum => self.handle_music_add_album(task).await,
            TaskKind::MusicMonitorCheck => self.handle_music_monitor_check(task).await,
        };

        let Err(e) = result else {
            return Ok(());
        };

        let unrecoverable = e
            .downcast_ref::<TaskError>()
            .map(|te| !te.is_recoverable())
            .unwrap_or(false);
        if !unrecoverable && task.can_retry() {
            // Transient failure with retries remaining: hand it back to the
            // queue without touching the request.
            return Err(e);
        }

        if let Ok(request_id) = task
            .try_payload_as::<DispatchPayload>()
            .map(|p| p.request_id)
            .or_else(|_| {
                task.try_payload_as::<MusicAddAlbumPayload>()
                    .map(|p| p.request_id)
            })
            .or_else(|_| {
                task.try_payload_as::<MusicMonitorCheckPayload>()
                    .map(|p| p.request_id)
            })
        {
            self.fail_request(request_id, &e.to_string()).await;
        }

        if unrecoverable {
            Err(e)
        } else {
            Err(TaskError::unrecoverable(e).into())
        }
    }
}

/// Backend tag label identifying the requester. Short uuid prefix keeps the
/// label readable in the backend UI while staying unique enough per user.
fn requester_tag_label(user_id: Uuid) -> String {
    let id = user_id.simple().to_string();
    format!("fetcharr-{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requester_tag_label_is_stable_and_short() {
        let user_id = Uuid::nil();
        assert_eq!(requester_tag_label(user_id), "fetcharr-00000000");
        assert_eq!(
            requester_tag_label(user_id),
            requester_tag_label(user_id)
        );
    }
}
