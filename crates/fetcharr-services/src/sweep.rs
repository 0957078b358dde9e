//! Availability reconciliation sweep.
//!
//! Pages through media marked available and verifies each tier against the
//! media server and the acquisition backend. A title seen by neither is
//! demoted; series lose individual seasons before the tier itself. Transport
//! failures never demote: an unreachable upstream means the item is assumed
//! to still exist and the run just counts the error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fetcharr_backends::media_server::{MediaServer, ServerSeason};
use fetcharr_backends::series::RemoteSeries;
use fetcharr_core::models::{MediaItem, MediaKind, MediaStatus, MediaTier};
use fetcharr_core::StoreError;
use fetcharr_store::{MediaRepository, RequestRepository};

use crate::dispatch::BackendSet;

#[derive(Clone)]
pub struct SweepConfig {
    pub page_size: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { page_size: 50 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("a sweep is already running")]
    AlreadyRunning,

    #[error("no media server is configured")]
    NotConfigured,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// Media items inspected.
    pub scanned: usize,
    /// Tier demotions written (a series losing seasons counts once).
    pub demoted: usize,
    /// Orphaned media records deleted.
    pub removed: usize,
    /// Upstream or per-item failures skipped over.
    pub errors: usize,
}

/// Run-scoped lookup cache. Media-server answers are stable within one run,
/// so each item id is asked about at most once.
#[derive(Default)]
struct SweepCache {
    items: HashMap<String, bool>,
    seasons: HashMap<String, SeasonsProbe>,
}

#[derive(Clone)]
enum SeasonsProbe {
    Known(Vec<ServerSeason>),
    Unreachable,
}

/// What the series backend said about a linked show. `Absent` means the
/// backend answered and does not hold it; `Unreachable` means the answer is
/// inconclusive and no season may be demoted on its account.
enum BackendSeriesProbe {
    Known(RemoteSeries),
    Absent,
    Unreachable,
}

/// What a presence probe concluded about one tier of one item.
enum Presence {
    Present,
    Missing,
}

pub struct AvailabilityReconciler {
    media: Arc<dyn MediaRepository>,
    requests: Arc<dyn RequestRepository>,
    backends: BackendSet,
    media_server: Option<Arc<dyn MediaServer>>,
    config: SweepConfig,
    running: AtomicBool,
    cancelled: AtomicBool,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AvailabilityReconciler {
    pub fn new(
        media: Arc<dyn MediaRepository>,
        requests: Arc<dyn RequestRepository>,
        backends: BackendSet,
        media_server: Option<Arc<dyn MediaServer>>,
        config: SweepConfig,
    ) -> Self {
        Self {
            media,
            requests,
            backends,
            media_server,
            config,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Ask the current (or next) run to stop after the current item. The
    /// flag is consumed by the run that observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one full sweep. At most one runs at a time per reconciler.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<SweepSummary, SweepError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SweepError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        let server = self
            .media_server
            .as_ref()
            .ok_or(SweepError::NotConfigured)?
            .clone();

        let mut summary = SweepSummary::default();
        let mut cache = SweepCache::default();
        let mut offset = 0;
        'pages: loop {
            let page = self
                .media
                .scan_available(offset, self.config.page_size)
                .await?;
            let page_len = page.len();
            for item in page {
                if self.cancelled.swap(false, Ordering::SeqCst) {
                    tracing::info!("Sweep cancelled");
                    break 'pages;
                }
                summary.scanned += 1;
                if let Err(e) = self
                    .reconcile_item(&server, &mut cache, &item, &mut summary)
                    .await
                {
                    tracing::warn!(media_id = %item.id, error = %e, "Skipping media item after reconcile failure");
                    summary.errors += 1;
                }
            }
            if page_len < self.config.page_size {
                break;
            }
            offset += self.config.page_size;
        }

        tracing::info!(
            scanned = summary.scanned,
            demoted = summary.demoted,
            removed = summary.removed,
            errors = summary.errors,
            "Availability sweep finished"
        );
        Ok(summary)
    }

    async fn reconcile_item(
        &self,
        server: &Arc<dyn MediaServer>,
        cache: &mut SweepCache,
        item: &MediaItem,
        summary: &mut SweepSummary,
    ) -> Result<(), StoreError> {
        let mut changed = false;
        for tier in [MediaTier::Standard, MediaTier::FourK] {
            if !item.tier(tier).status.is_available() {
                continue;
            }
            let demoted = match item.kind {
                MediaKind::Tv => {
                    self.reconcile_series_tier(server, cache, item, tier, summary)
                        .await?
                }
                _ => {
                    self.reconcile_whole_tier(server, cache, item, tier, summary)
                        .await?
                }
            };
            if demoted {
                summary.demoted += 1;
                changed = true;
            }
        }
        if changed {
            self.remove_if_orphaned(item.id, summary).await?;
        }
        Ok(())
    }

    /// Movies and albums: the tier is either wholly present or gone.
    async fn reconcile_whole_tier(
        &self,
        server: &Arc<dyn MediaServer>,
        cache: &mut SweepCache,
        item: &MediaItem,
        tier: MediaTier,
        summary: &mut SweepSummary,
    ) -> Result<bool, StoreError> {
        let presence = self
            .probe_whole_tier(server, cache, item, tier, summary)
            .await;
        if matches!(presence, Presence::Present) {
            return Ok(false);
        }

        let expected = item.tier(tier).status;
        let swapped = self
            .media
            .demote_tier(item.id, tier, expected, MediaStatus::Unknown, true, &[])
            .await?;
        if !swapped {
            tracing::debug!(media_id = %item.id, %tier, "Tier changed mid-sweep, skipping demotion");
            return Ok(false);
        }
        tracing::info!(media_id = %item.id, %tier, "Media no longer present anywhere, tier reset");
        self.delete_tier_requests(item, tier, &[]).await?;
        Ok(true)
    }

    async fn probe_whole_tier(
        &self,
        server: &Arc<dyn MediaServer>,
        cache: &mut SweepCache,
        item: &MediaItem,
        tier: MediaTier,
        summary: &mut SweepSummary,
    ) -> Presence {
        let linkage = &item.tier(tier).linkage;
        if let Some(item_id) = &linkage.media_server_item_id {
            if self.server_has_item(server, cache, item_id, summary).await {
                return Presence::Present;
            }
        }
        let (Some(service_id), Some(external_id)) = (linkage.service_id, linkage.external_service_id)
        else {
            return Presence::Missing;
        };
        match item.kind {
            MediaKind::Movie => match self.backends.movie.get(&service_id) {
                Some(client) => match client.get_movie(external_id).await {
                    Ok(Some(movie)) if movie.has_file => Presence::Present,
                    Ok(_) => Presence::Missing,
                    Err(e) => {
                        tracing::warn!(media_id = %item.id, error = %e, "Movie backend unreachable, assuming still present");
                        summary.errors += 1;
                        Presence::Present
                    }
                },
                None => Presence::Missing,
            },
            MediaKind::Music => match self.backends.music.get(&service_id) {
                Some(client) => match client.get_album(external_id).await {
                    Ok(Some(album)) if album.has_files() => Presence::Present,
                    Ok(_) => Presence::Missing,
                    Err(e) => {
                        tracing::warn!(media_id = %item.id, error = %e, "Music backend unreachable, assuming still present");
                        summary.errors += 1;
                        Presence::Present
                    }
                },
                None => Presence::Missing,
            },
            MediaKind::Tv => Presence::Missing,
        }
    }

    /// Series: seasons are verified individually and the tier follows.
    async fn reconcile_series_tier(
        &self,
        server: &Arc<dyn MediaServer>,
        cache: &mut SweepCache,
        item: &MediaItem,
        tier: MediaTier,
        summary: &mut SweepSummary,
    ) -> Result<bool, StoreError> {
        let linkage = &item.tier(tier).linkage;
        let server_seasons = match &linkage.media_server_item_id {
            Some(item_id) => self.server_seasons(server, cache, item_id, summary).await,
            None => SeasonsProbe::Known(Vec::new()),
        };
        let backend_series = self.backend_series(item, tier, summary).await;

        let available: Vec<i32> = item
            .seasons
            .iter()
            .filter(|s| s.status(tier).is_available())
            .map(|s| s.season_number)
            .collect();
        if available.is_empty() {
            return Ok(false);
        }

        let gone: Vec<i32> = available
            .iter()
            .copied()
            .filter(|n| !season_present(*n, &server_seasons, &backend_series))
            .collect();
        if gone.is_empty() {
            return Ok(false);
        }

        let all_gone = gone.len() == available.len();
        let new_status = if all_gone {
            MediaStatus::Unknown
        } else {
            MediaStatus::PartiallyAvailable
        };
        let expected = item.tier(tier).status;
        let swapped = self
            .media
            .demote_tier(item.id, tier, expected, new_status, all_gone, &gone)
            .await?;
        if !swapped {
            tracing::debug!(media_id = %item.id, %tier, "Tier changed mid-sweep, skipping season demotion");
            return Ok(false);
        }
        tracing::info!(media_id = %item.id, %tier, seasons = ?gone, "Seasons no longer present, demoted");
        self.delete_tier_requests(item, tier, &gone).await?;
        Ok(true)
    }

    async fn server_has_item(
        &self,
        server: &Arc<dyn MediaServer>,
        cache: &mut SweepCache,
        item_id: &str,
        summary: &mut SweepSummary,
    ) -> bool {
        if let Some(present) = cache.items.get(item_id) {
            return *present;
        }
        let present = match server.get_item(item_id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::warn!(item_id, error = %e, "Media server unreachable, assuming item still present");
                summary.errors += 1;
                true
            }
        };
        cache.items.insert(item_id.to_string(), present);
        present
    }

    async fn server_seasons(
        &self,
        server: &Arc<dyn MediaServer>,
        cache: &mut SweepCache,
        item_id: &str,
        summary: &mut SweepSummary,
    ) -> SeasonsProbe {
        if let Some(probe) = cache.seasons.get(item_id) {
            return probe.clone();
        }
        let probe = match server.list_seasons(item_id).await {
            Ok(seasons) => SeasonsProbe::Known(seasons),
            Err(e) => {
                tracing::warn!(item_id, error = %e, "Media server unreachable, season check skipped");
                summary.errors += 1;
                SeasonsProbe::Unreachable
            }
        };
        cache.seasons.insert(item_id.to_string(), probe.clone());
        probe
    }

    async fn backend_series(
        &self,
        item: &MediaItem,
        tier: MediaTier,
        summary: &mut SweepSummary,
    ) -> BackendSeriesProbe {
        let linkage = &item.tier(tier).linkage;
        let (Some(service_id), Some(external_id)) =
            (linkage.service_id, linkage.external_service_id)
        else {
            return BackendSeriesProbe::Absent;
        };
        let Some(client) = self.backends.series.get(&service_id) else {
            return BackendSeriesProbe::Absent;
        };
        match client.get_series(external_id).await {
            Ok(Some(series)) => BackendSeriesProbe::Known(series),
            Ok(None) => BackendSeriesProbe::Absent,
            Err(e) => {
                tracing::warn!(media_id = %item.id, error = %e, "Series backend unreachable, assuming seasons still present");
                summary.errors += 1;
                BackendSeriesProbe::Unreachable
            }
        }
    }

    /// Drop request records whose subject is gone. Declined records stay as
    /// history. For series the request is shrunk to the surviving seasons
    /// rather than deleted.
    async fn delete_tier_requests(
        &self,
        item: &MediaItem,
        tier: MediaTier,
        gone_seasons: &[i32],
    ) -> Result<(), StoreError> {
        let requests = self.requests.find_by_media(item.id).await?;
        for mut request in requests {
            if request.tier() != tier || !request.is_active() {
                continue;
            }
            if item.kind != MediaKind::Tv {
                self.requests.delete(request.id).await?;
                continue;
            }
            request
                .seasons
                .retain(|s| !gone_seasons.contains(&s.season_number));
            self.requests.save(&request).await?;
        }
        Ok(())
    }

    /// Delete the media record once nothing references it: both tiers back at
    /// `Unknown` and no requests left.
    async fn remove_if_orphaned(
        &self,
        media_id: uuid::Uuid,
        summary: &mut SweepSummary,
    ) -> Result<(), StoreError> {
        let Some(item) = self.media.get(media_id).await? else {
            return Ok(());
        };
        if item.standard.status != MediaStatus::Unknown
            || item.four_k.status != MediaStatus::Unknown
        {
            return Ok(());
        }
        if !self.requests.find_by_media(media_id).await?.is_empty() {
            return Ok(());
        }
        self.media.delete(media_id).await?;
        summary.removed += 1;
        tracing::info!(%media_id, "Removed orphaned media record");
        Ok(())
    }
}

fn season_present(
    season_number: i32,
    server_seasons: &SeasonsProbe,
    backend_series: &BackendSeriesProbe,
) -> bool {
    match server_seasons {
        // Can't tell; keep the season.
        SeasonsProbe::Unreachable => return true,
        SeasonsProbe::Known(seasons) => {
            if seasons
                .iter()
                .any(|s| s.season_number == season_number && s.episode_count > 0)
            {
                return true;
            }
        }
    }
    match backend_series {
        // Inconclusive answers never demote.
        BackendSeriesProbe::Unreachable => true,
        BackendSeriesProbe::Absent => false,
        BackendSeriesProbe::Known(series) => series
            .season(season_number)
            .and_then(|season| season.statistics)
            .map(|stats| stats.episode_file_count > 0)
            .unwrap_or(false),
    }
}
