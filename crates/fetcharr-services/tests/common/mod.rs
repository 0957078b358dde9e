#![allow(dead_code)]

use std::sync::Arc;

use fetcharr_core::config::{
    LidarrSettings, QuotaDefaults, RadarrSettings, ServiceCommon, Settings, SonarrSettings,
};
use fetcharr_core::models::User;
use fetcharr_core::permissions::Permissions;
use fetcharr_services::test_support::{
    MockMetadataProvider, MockMovieBackend, MockMusicBackend, MockSeriesBackend, RecordingNotifier,
};
use fetcharr_services::{
    BackendSet, DispatchConfig, FulfillmentDispatcher, RequestGate, RequestService, RuleResolver,
};
use fetcharr_store::{MemoryStore, TaskStore};
use fetcharr_worker::{TaskHandler, TaskQueue, TaskQueueConfig};

pub const RADARR_ID: i32 = 1;
pub const RADARR_4K_ID: i32 = 2;
pub const SONARR_ID: i32 = 3;
pub const LIDARR_ID: i32 = 4;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn user(bits: u64) -> User {
    User::new("tester", Permissions::new(bits))
}

fn service_common(id: i32, is_four_k: bool) -> ServiceCommon {
    ServiceCommon {
        id,
        name: format!("instance-{}", id),
        base_url: "http://localhost".into(),
        api_key: "key".into(),
        is_default: true,
        is_four_k,
        active_profile_id: 6,
        active_directory: "/media".into(),
        tags: Vec::new(),
        tag_requests: false,
    }
}

fn make_settings(quotas: QuotaDefaults) -> Settings {
    Settings {
        radarr: vec![
            RadarrSettings {
                common: service_common(RADARR_ID, false),
                minimum_availability: "released".into(),
            },
            RadarrSettings {
                common: service_common(RADARR_4K_ID, true),
                minimum_availability: "released".into(),
            },
        ],
        sonarr: vec![SonarrSettings {
            common: service_common(SONARR_ID, false),
            active_anime_profile_id: None,
            active_anime_directory: None,
            anime_tags: Vec::new(),
            enable_season_folders: true,
        }],
        lidarr: vec![LidarrSettings {
            common: service_common(LIDARR_ID, false),
        }],
        media_server: None,
        quotas,
        override_rules: Vec::new(),
    }
}

/// Fully wired request pipeline over in-memory stores and mock backends. The
/// queue runs without a worker pool; tests step tasks by hand.
pub struct Harness {
    pub store: MemoryStore,
    pub movie: MockMovieBackend,
    pub movie_4k: MockMovieBackend,
    pub series: MockSeriesBackend,
    pub music: MockMusicBackend,
    pub metadata: MockMetadataProvider,
    pub notifier: RecordingNotifier,
    pub service: RequestService,
    pub dispatcher: Arc<FulfillmentDispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_quotas(QuotaDefaults::default())
    }

    pub fn with_quotas(quotas: QuotaDefaults) -> Self {
        init_tracing();
        let store = MemoryStore::new();
        let settings = Arc::new(make_settings(quotas.clone()));
        let queue = TaskQueue::new_no_worker(
            Arc::new(store.tasks.clone()),
            TaskQueueConfig::default(),
        );

        let movie = MockMovieBackend::default();
        let movie_4k = MockMovieBackend::default();
        let series = MockSeriesBackend::default();
        let music = MockMusicBackend::default();
        let metadata = MockMetadataProvider::default();
        let notifier = RecordingNotifier::default();

        let gate = RequestGate::new(Arc::new(store.requests.clone()), quotas);
        let resolver = RuleResolver::new(
            Arc::new(store.rules.clone()),
            Arc::new(metadata.clone()),
        );
        let service = RequestService::new(
            Arc::new(store.media.clone()),
            Arc::new(store.requests.clone()),
            gate,
            resolver,
            Arc::new(notifier.clone()),
            queue.clone(),
            settings.clone(),
        );

        let mut backends = BackendSet::default();
        backends.movie.insert(RADARR_ID, Arc::new(movie.clone()));
        backends.movie.insert(RADARR_4K_ID, Arc::new(movie_4k.clone()));
        backends.series.insert(SONARR_ID, Arc::new(series.clone()));
        backends.music.insert(LIDARR_ID, Arc::new(music.clone()));

        let dispatcher = Arc::new(FulfillmentDispatcher::new(
            Arc::new(store.media.clone()),
            Arc::new(store.requests.clone()),
            backends,
            Arc::new(metadata.clone()),
            Arc::new(notifier.clone()),
            queue,
            settings,
            DispatchConfig {
                // Fire follow-up tasks immediately so tests can step them.
                artist_settle_seconds: 0,
                monitor_check_interval_seconds: 0,
                ..Default::default()
            },
        ));

        Self {
            store,
            movie,
            movie_4k,
            series,
            music,
            metadata,
            notifier,
            service,
            dispatcher,
        }
    }

    pub fn backend_set(&self) -> BackendSet {
        let mut backends = BackendSet::default();
        backends.movie.insert(RADARR_ID, Arc::new(self.movie.clone()));
        backends
            .movie
            .insert(RADARR_4K_ID, Arc::new(self.movie_4k.clone()));
        backends.series.insert(SONARR_ID, Arc::new(self.series.clone()));
        backends.music.insert(LIDARR_ID, Arc::new(self.music.clone()));
        backends
    }

    /// One worker iteration: claim the next due task and run the dispatcher
    /// on it, applying the same retry bookkeeping the queue would.
    pub async fn run_one_task(&self) -> bool {
        let Some(task) = self.store.tasks.claim_next().await.unwrap() else {
            return false;
        };
        match self.dispatcher.clone().handle_task(&task).await {
            Ok(()) => self.store.tasks.mark_completed(task.id).await.unwrap(),
            Err(e) => {
                let unrecoverable = e
                    .downcast_ref::<fetcharr_core::TaskError>()
                    .map(|te| !te.is_recoverable())
                    .unwrap_or(false);
                if !unrecoverable && task.can_retry() {
                    self.store
                        .tasks
                        .schedule_retry(task.id, chrono::Utc::now(), e.to_string())
                        .await
                        .unwrap();
                } else {
                    self.store
                        .tasks
                        .mark_failed(task.id, e.to_string())
                        .await
                        .unwrap();
                }
            }
        }
        true
    }

    pub async fn drain_tasks(&self) {
        for _ in 0..32 {
            if !self.run_one_task().await {
                return;
            }
        }
        panic!("task queue never drained");
    }
}
