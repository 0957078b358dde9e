//! Availability sweep: demotion of vanished media, season-level demotion for
//! series, fail-safe behavior on unreachable upstreams.

mod common;

use std::sync::Arc;

use common::{Harness, RADARR_ID, SONARR_ID};

use fetcharr_backends::movie::RemoteMovie;
use fetcharr_backends::series::{RemoteSeason, RemoteSeries, SeasonStatistics, SeriesType};
use fetcharr_core::models::{
    MediaIds, MediaItem, MediaKind, MediaStatus, MediaTier, RequestRecord, RequestStatus,
    ServiceLinkage,
};
use fetcharr_services::test_support::MockMediaServer;
use fetcharr_services::{AvailabilityReconciler, SweepConfig, SweepError, SweepSummary};
use fetcharr_store::{MediaRepository, RequestRepository};
use uuid::Uuid;

fn reconciler(h: &Harness, server: Option<MockMediaServer>) -> AvailabilityReconciler {
    AvailabilityReconciler::new(
        Arc::new(h.store.media.clone()),
        Arc::new(h.store.requests.clone()),
        h.backend_set(),
        server.map(|s| Arc::new(s) as Arc<dyn fetcharr_backends::MediaServer>),
        SweepConfig::default(),
    )
}

fn linked(service_id: i32, external_id: i64, server_item: &str) -> ServiceLinkage {
    ServiceLinkage {
        service_id: Some(service_id),
        external_service_id: Some(external_id),
        external_service_slug: None,
        media_server_item_id: Some(server_item.to_string()),
    }
}

async fn seed_available_movie(h: &Harness) -> (MediaItem, RequestRecord) {
    let mut item = MediaItem::new(MediaKind::Movie, MediaIds::movie(550));
    item.standard.status = MediaStatus::Available;
    item.standard.linkage = linked(RADARR_ID, 5, "m1");
    h.store.media.save(&item).await.unwrap();

    let mut request = RequestRecord::new(item.id, MediaKind::Movie, Uuid::new_v4(), false);
    request.status = RequestStatus::Approved;
    h.store.requests.save(&request).await.unwrap();
    (item, request)
}

#[tokio::test]
async fn sweep_without_media_server_is_refused() {
    let h = Harness::new();
    let sweeper = reconciler(&h, None);
    assert!(matches!(
        sweeper.run().await,
        Err(SweepError::NotConfigured)
    ));
}

#[tokio::test]
async fn missing_movie_is_demoted_and_orphan_removed() {
    let h = Harness::new();
    let (item, request) = seed_available_movie(&h).await;
    // Neither the media server nor the backend knows the movie anymore.
    let server = MockMediaServer::default();

    let summary = reconciler(&h, Some(server)).run().await.unwrap();
    assert_eq!(
        summary,
        SweepSummary {
            scanned: 1,
            demoted: 1,
            removed: 1,
            errors: 0
        }
    );
    assert!(h.store.media.get(item.id).await.unwrap().is_none());
    assert!(h.store.requests.get(request.id).await.unwrap().is_none());
}

#[tokio::test]
async fn movie_still_on_the_server_is_left_alone() {
    let h = Harness::new();
    let (item, request) = seed_available_movie(&h).await;
    let server = MockMediaServer::default();
    server.insert_item("m1", "Fight Club");

    let summary = reconciler(&h, Some(server)).run().await.unwrap();
    assert_eq!(summary.demoted, 0);
    assert_eq!(summary.removed, 0);
    let media = h.store.media.get(item.id).await.unwrap().unwrap();
    assert_eq!(media.standard.status, MediaStatus::Available);
    assert!(h.store.requests.get(request.id).await.unwrap().is_some());
}

#[tokio::test]
async fn movie_missing_from_server_but_on_disk_at_the_backend_is_kept() {
    let h = Harness::new();
    let (item, _) = seed_available_movie(&h).await;
    // Server dropped the item, but Radarr still has the file. Either
    // upstream knowing the title is enough to keep it.
    let server = MockMediaServer::default();
    h.movie.insert(RemoteMovie {
        id: 5,
        title: "Fight Club".into(),
        tmdb_id: 550,
        title_slug: None,
        has_file: true,
        monitored: true,
        tags: Vec::new(),
    });

    let summary = reconciler(&h, Some(server)).run().await.unwrap();
    assert_eq!(summary.demoted, 0);
    assert_eq!(summary.removed, 0);
    let media = h.store.media.get(item.id).await.unwrap().unwrap();
    assert_eq!(media.standard.status, MediaStatus::Available);
    assert!(media.standard.linkage.is_linked());
}

#[tokio::test]
async fn declined_request_survives_the_sweep_as_history() {
    let h = Harness::new();
    let (item, approved) = seed_available_movie(&h).await;
    let mut declined = RequestRecord::new(item.id, MediaKind::Movie, Uuid::new_v4(), false);
    declined.status = RequestStatus::Declined;
    h.store.requests.save(&declined).await.unwrap();
    // Gone everywhere, so the tier is demoted and active requests dropped.
    let server = MockMediaServer::default();

    let summary = reconciler(&h, Some(server)).run().await.unwrap();
    assert_eq!(summary.demoted, 1);
    assert_eq!(summary.removed, 0);
    assert!(h.store.requests.get(approved.id).await.unwrap().is_none());
    assert!(h.store.requests.get(declined.id).await.unwrap().is_some());
    // The declined record still references the media, so it is not orphaned.
    assert!(h.store.media.get(item.id).await.unwrap().is_some());
}

#[tokio::test]
async fn unreachable_upstreams_never_demote() {
    let h = Harness::new();
    let (item, _) = seed_available_movie(&h).await;
    let server = MockMediaServer::default();
    server.set_unreachable(true);
    h.movie.set_unreachable(true);

    let summary = reconciler(&h, Some(server)).run().await.unwrap();
    assert_eq!(summary.demoted, 0);
    assert!(summary.errors > 0);
    let media = h.store.media.get(item.id).await.unwrap().unwrap();
    assert_eq!(media.standard.status, MediaStatus::Available);
    assert!(media.standard.linkage.is_linked());
}

async fn seed_available_series(h: &Harness) -> (MediaItem, RequestRecord) {
    let mut item = MediaItem::new(MediaKind::Tv, MediaIds::tv(1399));
    item.ids.tvdb_id = Some(121361);
    item.standard.status = MediaStatus::Available;
    item.standard.linkage = linked(SONARR_ID, 8, "t1");
    item.ensure_season(1).status = MediaStatus::Available;
    item.ensure_season(2).status = MediaStatus::Available;
    h.store.media.save(&item).await.unwrap();

    let mut request = RequestRecord::new(item.id, MediaKind::Tv, Uuid::new_v4(), false);
    request.status = RequestStatus::Approved;
    request.set_seasons(vec![1, 2]);
    h.store.requests.save(&request).await.unwrap();
    (item, request)
}

#[tokio::test]
async fn series_loses_only_the_vanished_seasons() {
    let h = Harness::new();
    let (item, request) = seed_available_series(&h).await;

    // Season 1 survives on the server, season 2 is gone everywhere.
    let server = MockMediaServer::default();
    server.insert_item("t1", "Game of Thrones");
    server.set_seasons(
        "t1",
        vec![fetcharr_backends::media_server::ServerSeason {
            season_number: 1,
            episode_count: 10,
        }],
    );
    h.series.insert(RemoteSeries {
        id: 8,
        title: "Game of Thrones".into(),
        tvdb_id: 121361,
        title_slug: None,
        monitored: true,
        series_type: SeriesType::Standard,
        seasons: vec![RemoteSeason {
            season_number: 1,
            monitored: true,
            statistics: Some(SeasonStatistics {
                episode_file_count: 10,
                episode_count: 10,
            }),
        }],
        tags: Vec::new(),
    });

    let summary = reconciler(&h, Some(server)).run().await.unwrap();
    assert_eq!(summary.demoted, 1);
    assert_eq!(summary.removed, 0);

    let media = h.store.media.get(item.id).await.unwrap().unwrap();
    assert_eq!(media.standard.status, MediaStatus::PartiallyAvailable);
    assert_eq!(
        media.season(1).unwrap().status(MediaTier::Standard),
        MediaStatus::Available
    );
    assert_eq!(
        media.season(2).unwrap().status(MediaTier::Standard),
        MediaStatus::Unknown
    );
    // The request shrinks to the seasons that still exist.
    let request = h.store.requests.get(request.id).await.unwrap().unwrap();
    assert_eq!(request.season_numbers(), vec![1]);
}

#[tokio::test]
async fn series_gone_everywhere_is_reset_but_its_request_is_kept() {
    let h = Harness::new();
    let (item, request) = seed_available_series(&h).await;
    // Server no longer lists the show at all; the backend never knew it.
    let server = MockMediaServer::default();

    let summary = reconciler(&h, Some(server)).run().await.unwrap();
    assert_eq!(summary.demoted, 1);
    assert_eq!(summary.removed, 0);

    // The tier resets fully, but the series request shrinks instead of
    // disappearing and keeps the media record referenced.
    let media = h.store.media.get(item.id).await.unwrap().unwrap();
    assert_eq!(media.standard.status, MediaStatus::Unknown);
    assert!(!media.standard.linkage.is_linked());
    assert_eq!(
        media.season(1).unwrap().status(MediaTier::Standard),
        MediaStatus::Unknown
    );
    assert_eq!(
        media.season(2).unwrap().status(MediaTier::Standard),
        MediaStatus::Unknown
    );
    let request = h.store.requests.get(request.id).await.unwrap().unwrap();
    assert!(request.season_numbers().is_empty());
}

#[tokio::test]
async fn series_backend_outage_keeps_unconfirmed_seasons() {
    let h = Harness::new();
    let (item, request) = seed_available_series(&h).await;
    // The server only lists season 1 and Sonarr is down, so season 2 cannot
    // be confirmed gone by anyone.
    let server = MockMediaServer::default();
    server.insert_item("t1", "Game of Thrones");
    server.set_seasons(
        "t1",
        vec![fetcharr_backends::media_server::ServerSeason {
            season_number: 1,
            episode_count: 10,
        }],
    );
    h.series.set_unreachable(true);

    let summary = reconciler(&h, Some(server)).run().await.unwrap();
    assert_eq!(summary.demoted, 0);
    assert!(summary.errors > 0);

    let media = h.store.media.get(item.id).await.unwrap().unwrap();
    assert_eq!(media.standard.status, MediaStatus::Available);
    assert_eq!(
        media.season(2).unwrap().status(MediaTier::Standard),
        MediaStatus::Available
    );
    let request = h.store.requests.get(request.id).await.unwrap().unwrap();
    assert_eq!(request.season_numbers(), vec![1, 2]);
}

#[tokio::test]
async fn cancellation_stops_the_run_before_any_demotion() {
    let h = Harness::new();
    let (item, _) = seed_available_movie(&h).await;
    // Missing everywhere, so an uncancelled run would demote it.
    let server = MockMediaServer::default();
    let sweeper = reconciler(&h, Some(server));

    sweeper.cancel();
    let summary = sweeper.run().await.unwrap();
    assert_eq!(summary.demoted, 0);
    let media = h.store.media.get(item.id).await.unwrap().unwrap();
    assert_eq!(media.standard.status, MediaStatus::Available);

    // The flag was consumed; the next run proceeds normally.
    let summary = sweeper.run().await.unwrap();
    assert_eq!(summary.demoted, 1);
}

#[tokio::test]
async fn run_flag_is_released_after_completion() {
    let h = Harness::new();
    let server = MockMediaServer::default();
    let sweeper = reconciler(&h, Some(server));
    let summary = sweeper.run().await.unwrap();
    assert_eq!(summary.scanned, 0);
    assert!(!sweeper.is_running());
    // A fresh run is accepted once the first one finished.
    assert!(sweeper.run().await.is_ok());
}
