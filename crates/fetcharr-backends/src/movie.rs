//! Radarr-compatible movie backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::arr::ArrHttp;
use crate::error::BackendError;
use crate::types::Tag;

/// Movie record as the backend reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMovie {
    pub id: i64,
    pub title: String,
    pub tmdb_id: i32,
    #[serde(default)]
    pub title_slug: Option<String>,
    #[serde(default)]
    pub has_file: bool,
    #[serde(default)]
    pub monitored: bool,
    #[serde(default)]
    pub tags: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct AddMovieParams {
    pub tmdb_id: i32,
    pub quality_profile_id: i32,
    pub root_folder_path: String,
    pub minimum_availability: String,
    pub tags: Vec<i32>,
    pub search_now: bool,
}

#[async_trait]
pub trait MovieBackend: Send + Sync {
    async fn get_movie(&self, id: i64) -> Result<Option<RemoteMovie>, BackendError>;

    async fn find_by_tmdb(&self, tmdb_id: i32) -> Result<Option<RemoteMovie>, BackendError>;

    async fn add_movie(&self, params: AddMovieParams) -> Result<RemoteMovie, BackendError>;

    async fn ensure_tag(&self, label: &str) -> Result<Tag, BackendError>;
}

#[derive(Clone)]
pub struct RadarrClient {
    http: ArrHttp,
}

impl RadarrClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            http: ArrHttp::new(name, base_url, "/api/v3", api_key)?,
        })
    }
}

#[async_trait]
impl MovieBackend for RadarrClient {
    #[tracing::instrument(skip(self), fields(service = %self.http.service()))]
    async fn get_movie(&self, id: i64) -> Result<Option<RemoteMovie>, BackendError> {
        self.http.get_optional(&format!("/movie/{}", id)).await
    }

    #[tracing::instrument(skip(self), fields(service = %self.http.service()))]
    async fn find_by_tmdb(&self, tmdb_id: i32) -> Result<Option<RemoteMovie>, BackendError> {
        let movies: Vec<RemoteMovie> = self
            .http
            .get(&format!("/movie?tmdbId={}", tmdb_id))
            .await?;
        Ok(movies.into_iter().next())
    }

    #[tracing::instrument(skip(self, params), fields(service = %self.http.service(), tmdb_id = params.tmdb_id))]
    async fn add_movie(&self, params: AddMovieParams) -> Result<RemoteMovie, BackendError> {
        // The add endpoint wants the full lookup document with the local
        // fields filled in, so fetch it and overlay.
        let mut lookup: serde_json::Value = self
            .http
            .get(&format!("/movie/lookup/tmdb?tmdbId={}", params.tmdb_id))
            .await?;
        let doc = lookup.as_object_mut().ok_or_else(|| {
            BackendError::UnexpectedResponse {
                service: self.http.service().to_string(),
                detail: "movie lookup did not return an object".to_string(),
            }
        })?;
        doc.insert(
            "qualityProfileId".into(),
            json!(params.quality_profile_id),
        );
        doc.insert("rootFolderPath".into(), json!(params.root_folder_path));
        doc.insert(
            "minimumAvailability".into(),
            json!(params.minimum_availability),
        );
        doc.insert("monitored".into(), json!(true));
        doc.insert("tags".into(), json!(params.tags));
        doc.insert(
            "addOptions".into(),
            json!({ "searchForMovie": params.search_now }),
        );

        self.http.post("/movie", &lookup).await
    }

    async fn ensure_tag(&self, label: &str) -> Result<Tag, BackendError> {
        self.http.ensure_tag(label).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_movie_deserializes_backend_payload() {
        let raw = r#"{
            "id": 42,
            "title": "The Matrix",
            "tmdbId": 603,
            "titleSlug": "the-matrix-603",
            "hasFile": true,
            "monitored": true,
            "tags": [3, 7],
            "qualityProfileId": 6,
            "extraFieldWeIgnore": {"nested": true}
        }"#;
        let movie: RemoteMovie = serde_json::from_str(raw).unwrap();
        assert_eq!(movie.id, 42);
        assert_eq!(movie.tmdb_id, 603);
        assert!(movie.has_file);
        assert_eq!(movie.tags, vec![3, 7]);
    }

    #[test]
    fn remote_movie_defaults_optional_fields() {
        let raw = r#"{"id": 1, "title": "Alien", "tmdbId": 348}"#;
        let movie: RemoteMovie = serde_json::from_str(raw).unwrap();
        assert!(!movie.has_file);
        assert!(!movie.monitored);
        assert!(movie.tags.is_empty());
        assert!(movie.title_slug.is_none());
    }
}
