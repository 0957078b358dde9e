//! In-memory fakes for the backend seams.
//!
//! Each mock mirrors one client trait with a plain `Mutex`-guarded state you
//! can preload and inspect, plus an `unreachable` switch to simulate a dead
//! upstream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use fetcharr_backends::media_server::{MediaServer, ServerItem, ServerSeason};
use fetcharr_backends::metadata::{MetadataProvider, TvDetails};
use fetcharr_backends::movie::{AddMovieParams, MovieBackend, RemoteMovie};
use fetcharr_backends::music::{
    AlbumLookup, EnsureArtistParams, MusicBackend, RemoteAlbum, RemoteArtist,
};
use fetcharr_backends::series::{AddSeriesParams, RemoteSeason, RemoteSeries, SeriesBackend};
use fetcharr_backends::{BackendError, Tag};
use fetcharr_core::models::MediaAttributes;

use crate::notify::{Notification, Notifier};

fn unreachable_error(service: &str) -> BackendError {
    BackendError::UnexpectedResponse {
        service: service.to_string(),
        detail: "connection refused".to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("mock state poisoned")
}

fn ensure_tag_in(tags: &mut Vec<Tag>, label: &str) -> Tag {
    if let Some(tag) = tags.iter().find(|t| t.label.eq_ignore_ascii_case(label)) {
        return tag.clone();
    }
    let tag = Tag {
        id: tags.len() as i32 + 1,
        label: label.to_string(),
    };
    tags.push(tag.clone());
    tag
}

// ---------------------------------------------------------------------------
// Movies

#[derive(Default)]
struct MovieState {
    movies: Vec<RemoteMovie>,
    added: Vec<AddMovieParams>,
    tags: Vec<Tag>,
    next_id: i64,
    unreachable: bool,
}

#[derive(Default, Clone)]
pub struct MockMovieBackend {
    inner: Arc<Mutex<MovieState>>,
}

impl MockMovieBackend {
    pub fn insert(&self, movie: RemoteMovie) {
        lock(&self.inner).movies.push(movie);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.inner).unreachable = unreachable;
    }

    /// Parameters of every `add_movie` call, in order.
    pub fn added(&self) -> Vec<AddMovieParams> {
        lock(&self.inner).added.clone()
    }

    pub fn movies(&self) -> Vec<RemoteMovie> {
        lock(&self.inner).movies.clone()
    }
}

#[async_trait]
impl MovieBackend for MockMovieBackend {
    async fn get_movie(&self, id: i64) -> Result<Option<RemoteMovie>, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-radarr"));
        }
        Ok(state.movies.iter().find(|m| m.id == id).cloned())
    }

    async fn find_by_tmdb(&self, tmdb_id: i32) -> Result<Option<RemoteMovie>, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-radarr"));
        }
        Ok(state.movies.iter().find(|m| m.tmdb_id == tmdb_id).cloned())
    }

    async fn add_movie(&self, params: AddMovieParams) -> Result<RemoteMovie, BackendError> {
        let mut state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-radarr"));
        }
        state.next_id += 1;
        let movie = RemoteMovie {
            id: state.next_id,
            title: format!("movie-{}", params.tmdb_id),
            tmdb_id: params.tmdb_id,
            title_slug: Some(format!("movie-{}", params.tmdb_id)),
            has_file: false,
            monitored: true,
            tags: params.tags.clone(),
        };
        state.movies.push(movie.clone());
        state.added.push(params);
        Ok(movie)
    }

    async fn ensure_tag(&self, label: &str) -> Result<Tag, BackendError> {
        let mut state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-radarr"));
        }
        Ok(ensure_tag_in(&mut state.tags, label))
    }
}

// ---------------------------------------------------------------------------
// Series

#[derive(Default)]
struct SeriesState {
    series: Vec<RemoteSeries>,
    added: Vec<AddSeriesParams>,
    updated: Vec<RemoteSeries>,
    searched: Vec<(i64, Vec<i32>)>,
    tags: Vec<Tag>,
    next_id: i64,
    unreachable: bool,
}

#[derive(Default, Clone)]
pub struct MockSeriesBackend {
    inner: Arc<Mutex<SeriesState>>,
}

impl MockSeriesBackend {
    pub fn insert(&self, series: RemoteSeries) {
        lock(&self.inner).series.push(series);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.inner).unreachable = unreachable;
    }

    pub fn added(&self) -> Vec<AddSeriesParams> {
        lock(&self.inner).added.clone()
    }

    pub fn updated(&self) -> Vec<RemoteSeries> {
        lock(&self.inner).updated.clone()
    }

    /// `(series_id, seasons)` of every season-search call.
    pub fn searched(&self) -> Vec<(i64, Vec<i32>)> {
        lock(&self.inner).searched.clone()
    }
}

#[async_trait]
impl SeriesBackend for MockSeriesBackend {
    async fn get_series(&self, id: i64) -> Result<Option<RemoteSeries>, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-sonarr"));
        }
        Ok(state.series.iter().find(|s| s.id == id).cloned())
    }

    async fn find_by_tvdb(&self, tvdb_id: i32) -> Result<Option<RemoteSeries>, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-sonarr"));
        }
        Ok(state.series.iter().find(|s| s.tvdb_id == tvdb_id).cloned())
    }

    async fn add_series(&self, params: AddSeriesParams) -> Result<RemoteSeries, BackendError> {
        let mut state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-sonarr"));
        }
        state.next_id += 1;
        let series = RemoteSeries {
            id: state.next_id,
            title: format!("series-{}", params.tvdb_id),
            tvdb_id: params.tvdb_id,
            title_slug: Some(format!("series-{}", params.tvdb_id)),
            monitored: true,
            series_type: params.series_type,
            seasons: params
                .monitored_seasons
                .iter()
                .map(|n| RemoteSeason {
                    season_number: *n,
                    monitored: true,
                    statistics: None,
                })
                .collect(),
            tags: params.tags.clone(),
        };
        state.series.push(series.clone());
        state.added.push(params);
        Ok(series)
    }

    async fn update_series(&self, series: &RemoteSeries) -> Result<RemoteSeries, BackendError> {
        let mut state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-sonarr"));
        }
        if let Some(stored) = state.series.iter_mut().find(|s| s.id == series.id) {
            *stored = series.clone();
        }
        state.updated.push(series.clone());
        Ok(series.clone())
    }

    async fn search_seasons(&self, series_id: i64, seasons: &[i32]) -> Result<(), BackendError> {
        let mut state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-sonarr"));
        }
        state.searched.push((series_id, seasons.to_vec()));
        Ok(())
    }

    async fn ensure_tag(&self, label: &str) -> Result<Tag, BackendError> {
        let mut state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-sonarr"));
        }
        Ok(ensure_tag_in(&mut state.tags, label))
    }
}

// ---------------------------------------------------------------------------
// Music

#[derive(Default)]
struct MusicState {
    albums: Vec<RemoteAlbum>,
    lookups: Vec<AlbumLookup>,
    artists: Vec<RemoteArtist>,
    ensured: Vec<EnsureArtistParams>,
    monitor_calls: Vec<(i64, bool)>,
    searched: Vec<i64>,
    tags: Vec<Tag>,
    next_artist_id: i64,
    unreachable: bool,
}

#[derive(Default, Clone)]
pub struct MockMusicBackend {
    inner: Arc<Mutex<MusicState>>,
}

impl MockMusicBackend {
    pub fn insert_album(&self, album: RemoteAlbum) {
        lock(&self.inner).albums.push(album);
    }

    /// Make an album discoverable through the lookup endpoint only.
    pub fn insert_lookup(&self, lookup: AlbumLookup) {
        lock(&self.inner).lookups.push(lookup);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.inner).unreachable = unreachable;
    }

    pub fn ensured_artists(&self) -> Vec<EnsureArtistParams> {
        lock(&self.inner).ensured.clone()
    }

    pub fn monitor_calls(&self) -> Vec<(i64, bool)> {
        lock(&self.inner).monitor_calls.clone()
    }

    pub fn searched(&self) -> Vec<i64> {
        lock(&self.inner).searched.clone()
    }

    pub fn albums(&self) -> Vec<RemoteAlbum> {
        lock(&self.inner).albums.clone()
    }
}

#[async_trait]
impl MusicBackend for MockMusicBackend {
    async fn get_album(&self, id: i64) -> Result<Option<RemoteAlbum>, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-lidarr"));
        }
        Ok(state.albums.iter().find(|a| a.id == id).cloned())
    }

    async fn find_album_by_mbid(&self, mb_id: &str) -> Result<Option<RemoteAlbum>, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-lidarr"));
        }
        Ok(state
            .albums
            .iter()
            .find(|a| a.foreign_album_id == mb_id)
            .cloned())
    }

    async fn lookup_album(&self, mb_id: &str) -> Result<Option<AlbumLookup>, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-lidarr"));
        }
        Ok(state
            .lookups
            .iter()
            .find(|l| l.foreign_album_id == mb_id)
            .cloned())
    }

    async fn ensure_artist(
        &self,
        params: EnsureArtistParams,
    ) -> Result<RemoteArtist, BackendError> {
        let mut state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-lidarr"));
        }
        if let Some(existing) = state
            .artists
            .iter()
            .find(|a| a.foreign_artist_id == params.artist.foreign_artist_id)
        {
            let existing = existing.clone();
            state.ensured.push(params);
            return Ok(existing);
        }
        state.next_artist_id += 1;
        let artist = RemoteArtist {
            id: state.next_artist_id,
            artist_name: params.artist.artist_name.clone(),
            foreign_artist_id: params.artist.foreign_artist_id.clone(),
            monitored: false,
        };
        state.artists.push(artist.clone());
        state.ensured.push(params);
        Ok(artist)
    }

    async fn set_album_monitored(
        &self,
        album_id: i64,
        monitored: bool,
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-lidarr"));
        }
        if let Some(album) = state.albums.iter_mut().find(|a| a.id == album_id) {
            album.monitored = monitored;
        }
        state.monitor_calls.push((album_id, monitored));
        Ok(())
    }

    async fn search_album(&self, album_id: i64) -> Result<(), BackendError> {
        let mut state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-lidarr"));
        }
        state.searched.push(album_id);
        Ok(())
    }

    async fn ensure_tag(&self, label: &str) -> Result<Tag, BackendError> {
        let mut state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-lidarr"));
        }
        Ok(ensure_tag_in(&mut state.tags, label))
    }
}

// ---------------------------------------------------------------------------
// Media server

#[derive(Default)]
struct ServerState {
    items: HashMap<String, ServerItem>,
    seasons: HashMap<String, Vec<ServerSeason>>,
    unreachable: bool,
}

#[derive(Default, Clone)]
pub struct MockMediaServer {
    inner: Arc<Mutex<ServerState>>,
}

impl MockMediaServer {
    pub fn insert_item(&self, id: impl Into<String>, title: impl Into<String>) {
        let id = id.into();
        lock(&self.inner).items.insert(
            id.clone(),
            ServerItem {
                id,
                title: title.into(),
            },
        );
    }

    pub fn remove_item(&self, id: &str) {
        let mut state = lock(&self.inner);
        state.items.remove(id);
        state.seasons.remove(id);
    }

    pub fn set_seasons(&self, id: impl Into<String>, seasons: Vec<ServerSeason>) {
        lock(&self.inner).seasons.insert(id.into(), seasons);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.inner).unreachable = unreachable;
    }
}

#[async_trait]
impl MediaServer for MockMediaServer {
    async fn get_item(&self, item_id: &str) -> Result<Option<ServerItem>, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-media-server"));
        }
        Ok(state.items.get(item_id).cloned())
    }

    async fn list_seasons(&self, item_id: &str) -> Result<Vec<ServerSeason>, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-media-server"));
        }
        Ok(state.seasons.get(item_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Metadata

#[derive(Default)]
struct MetadataState {
    movies: HashMap<i32, MediaAttributes>,
    tv: HashMap<i32, TvDetails>,
    unreachable: bool,
}

#[derive(Default, Clone)]
pub struct MockMetadataProvider {
    inner: Arc<Mutex<MetadataState>>,
}

impl MockMetadataProvider {
    pub fn set_movie(&self, tmdb_id: i32, attributes: MediaAttributes) {
        lock(&self.inner).movies.insert(tmdb_id, attributes);
    }

    pub fn set_tv(&self, tmdb_id: i32, details: TvDetails) {
        lock(&self.inner).tv.insert(tmdb_id, details);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.inner).unreachable = unreachable;
    }
}

#[async_trait]
impl MetadataProvider for MockMetadataProvider {
    async fn movie_attributes(&self, tmdb_id: i32) -> Result<MediaAttributes, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-tmdb"));
        }
        Ok(state.movies.get(&tmdb_id).cloned().unwrap_or_default())
    }

    async fn tv_details(&self, tmdb_id: i32) -> Result<TvDetails, BackendError> {
        let state = lock(&self.inner);
        if state.unreachable {
            return Err(unreachable_error("mock-tmdb"));
        }
        Ok(state.tv.get(&tmdb_id).cloned().unwrap_or_else(|| TvDetails {
            attributes: MediaAttributes::default(),
            tvdb_id: None,
            seasons: Vec::new(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Notifications

#[derive(Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        lock(&self.sent).push(notification);
    }
}
