//! Lidarr-compatible music backend.
//!
//! Album fulfillment is a two-step dance on this API: the artist has to be
//! added first and given time to settle before the album can be monitored,
//! so the client surface exposes each step separately and the dispatcher
//! sequences them through the task queue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::arr::ArrHttp;
use crate::error::BackendError;
use crate::types::Tag;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlbumStatistics {
    #[serde(default)]
    pub track_file_count: i32,
    #[serde(default)]
    pub track_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAlbum {
    pub id: i64,
    pub title: String,
    pub foreign_album_id: String,
    #[serde(default)]
    pub monitored: bool,
    #[serde(default)]
    pub artist_id: i64,
    #[serde(default)]
    pub statistics: Option<AlbumStatistics>,
}

impl RemoteAlbum {
    pub fn has_files(&self) -> bool {
        self.statistics
            .map(|s| s.track_file_count > 0)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArtist {
    pub id: i64,
    pub artist_name: String,
    pub foreign_artist_id: String,
    #[serde(default)]
    pub monitored: bool,
}

/// Album as returned by the search endpoint, before it exists locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlbumLookup {
    pub title: String,
    pub foreign_album_id: String,
    pub artist: ArtistLookup,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtistLookup {
    pub artist_name: String,
    pub foreign_artist_id: String,
}

#[derive(Debug, Clone)]
pub struct EnsureArtistParams {
    pub artist: ArtistLookup,
    pub quality_profile_id: i32,
    pub metadata_profile_id: i32,
    pub root_folder_path: String,
    pub tags: Vec<i32>,
}

#[async_trait]
pub trait MusicBackend: Send + Sync {
    async fn get_album(&self, id: i64) -> Result<Option<RemoteAlbum>, BackendError>;

    /// Album already known to the backend, looked up by MusicBrainz
    /// release-group id.
    async fn find_album_by_mbid(&self, mb_id: &str) -> Result<Option<RemoteAlbum>, BackendError>;

    /// Search the metadata mirror for an album the backend does not hold yet.
    async fn lookup_album(&self, mb_id: &str) -> Result<Option<AlbumLookup>, BackendError>;

    /// Add the artist if absent; returns the artist either way. Newly added
    /// artists are unmonitored, album refresh runs in the background.
    async fn ensure_artist(&self, params: EnsureArtistParams)
        -> Result<RemoteArtist, BackendError>;

    async fn set_album_monitored(&self, album_id: i64, monitored: bool)
        -> Result<(), BackendError>;

    async fn search_album(&self, album_id: i64) -> Result<(), BackendError>;

    async fn ensure_tag(&self, label: &str) -> Result<Tag, BackendError>;
}

#[derive(Clone)]
pub struct LidarrClient {
    http: ArrHttp,
}

impl LidarrClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            http: ArrHttp::new(name, base_url, "/api/v1", api_key)?,
        })
    }
}

#[async_trait]
impl MusicBackend for LidarrClient {
    #[tracing::instrument(skip(self), fields(service = %self.http.service()))]
    async fn get_album(&self, id: i64) -> Result<Option<RemoteAlbum>, BackendError> {
        self.http.get_optional(&format!("/album/{}", id)).await
    }

    #[tracing::instrument(skip(self), fields(service = %self.http.service()))]
    async fn find_album_by_mbid(
        &self,
        mb_id: &str,
    ) -> Result<Option<RemoteAlbum>, BackendError> {
        let albums: Vec<RemoteAlbum> = self
            .http
            .get(&format!("/album?foreignAlbumId={}", mb_id))
            .await?;
        Ok(albums.into_iter().next())
    }

    #[tracing::instrument(skip(self), fields(service = %self.http.service()))]
    async fn lookup_album(&self, mb_id: &str) -> Result<Option<AlbumLookup>, BackendError> {
        let results: Vec<AlbumLookup> = self
            .http
            .get(&format!("/album/lookup?term=lidarr:{}", mb_id))
            .await?;
        Ok(results.into_iter().find(|a| a.foreign_album_id == mb_id))
    }

    #[tracing::instrument(skip(self, params), fields(service = %self.http.service(), artist = %params.artist.artist_name))]
    async fn ensure_artist(
        &self,
        params: EnsureArtistParams,
    ) -> Result<RemoteArtist, BackendError> {
        let existing: Vec<RemoteArtist> = self
            .http
            .get(&format!(
                "/artist?mbId={}",
                params.artist.foreign_artist_id
            ))
            .await?;
        if let Some(artist) = existing
            .into_iter()
            .find(|a| a.foreign_artist_id == params.artist.foreign_artist_id)
        {
            return Ok(artist);
        }

        self.http
            .post(
                "/artist",
                &json!({
                    "artistName": params.artist.artist_name,
                    "foreignArtistId": params.artist.foreign_artist_id,
                    "qualityProfileId": params.quality_profile_id,
                    "metadataProfileId": params.metadata_profile_id,
                    "rootFolderPath": params.root_folder_path,
                    "monitored": false,
                    "tags": params.tags,
                    "addOptions": {
                        "monitor": "none",
                        "searchForMissingAlbums": false,
                    },
                }),
            )
            .await
    }

    #[tracing::instrument(skip(self), fields(service = %self.http.service()))]
    async fn set_album_monitored(
        &self,
        album_id: i64,
        monitored: bool,
    ) -> Result<(), BackendError> {
        self.http
            .put_no_content(
                "/album/monitor",
                &json!({ "albumIds": [album_id], "monitored": monitored }),
            )
            .await
    }

    #[tracing::instrument(skip(self), fields(service = %self.http.service()))]
    async fn search_album(&self, album_id: i64) -> Result<(), BackendError> {
        self.http
            .command(&json!({ "name": "AlbumSearch", "albumIds": [album_id] }))
            .await
    }

    async fn ensure_tag(&self, label: &str) -> Result<Tag, BackendError> {
        self.http.ensure_tag(label).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_album_deserializes_with_statistics() {
        let raw = r#"{
            "id": 12,
            "title": "OK Computer",
            "foreignAlbumId": "b1392450-e666-3926-a536-22c65f834433",
            "monitored": true,
            "artistId": 3,
            "statistics": {"trackFileCount": 12, "trackCount": 12}
        }"#;
        let album: RemoteAlbum = serde_json::from_str(raw).unwrap();
        assert!(album.has_files());
        assert_eq!(album.artist_id, 3);
    }

    #[test]
    fn album_without_statistics_has_no_files() {
        let raw = r#"{"id": 1, "title": "In Rainbows", "foreignAlbumId": "abc"}"#;
        let album: RemoteAlbum = serde_json::from_str(raw).unwrap();
        assert!(!album.has_files());
        assert!(!album.monitored);
    }

    #[test]
    fn album_lookup_carries_the_artist() {
        let raw = r#"[{
            "title": "Kid A",
            "foreignAlbumId": "xyz",
            "artist": {"artistName": "Radiohead", "foreignArtistId": "rh-1"}
        }]"#;
        let results: Vec<AlbumLookup> = serde_json::from_str(raw).unwrap();
        assert_eq!(results[0].artist.artist_name, "Radiohead");
    }
}
