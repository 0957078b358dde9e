//! TMDB metadata provider.
//!
//! Rule matching and series-type selection need a small slice of what TMDB
//! knows about a title: original language, genre ids, keyword ids and (for
//! TV) the season list plus the TVDB id.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use fetcharr_core::models::MediaAttributes;

use crate::error::BackendError;

const API_BASE: &str = "https://api.themoviedb.org/3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// TMDB keyword attached to anime titles.
const ANIME_KEYWORD_ID: i32 = 210024;

#[derive(Debug, Clone, PartialEq)]
pub struct TvSeasonSummary {
    pub season_number: i32,
    pub episode_count: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TvDetails {
    pub attributes: MediaAttributes,
    pub tvdb_id: Option<i32>,
    /// Seasons TMDB knows about, specials included.
    pub seasons: Vec<TvSeasonSummary>,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn movie_attributes(&self, tmdb_id: i32) -> Result<MediaAttributes, BackendError>;

    async fn tv_details(&self, tmdb_id: i32) -> Result<TvDetails, BackendError>;
}

#[derive(Clone)]
pub struct TmdbClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    id: i32,
}

#[derive(Debug, Deserialize)]
struct TmdbKeyword {
    id: i32,
}

#[derive(Debug, Default, Deserialize)]
struct TmdbKeywords {
    /// Movie payloads use `keywords`, TV payloads `results`.
    #[serde(default)]
    keywords: Vec<TmdbKeyword>,
    #[serde(default)]
    results: Vec<TmdbKeyword>,
}

impl TmdbKeywords {
    fn ids(&self) -> Vec<i32> {
        self.keywords
            .iter()
            .chain(self.results.iter())
            .map(|k| k.id)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    #[serde(default)]
    original_language: String,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    #[serde(default)]
    keywords: TmdbKeywords,
}

#[derive(Debug, Default, Deserialize)]
struct TmdbExternalIds {
    tvdb_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeason {
    season_number: i32,
    #[serde(default)]
    episode_count: i32,
}

#[derive(Debug, Deserialize)]
struct TmdbTv {
    #[serde(default)]
    original_language: String,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    #[serde(default)]
    keywords: TmdbKeywords,
    #[serde(default)]
    external_ids: TmdbExternalIds,
    #[serde(default)]
    seasons: Vec<TmdbSeason>,
}

fn attributes(original_language: String, genres: &[TmdbGenre], keywords: &TmdbKeywords) -> MediaAttributes {
    let keyword_ids = keywords.ids();
    let is_anime = keyword_ids.contains(&ANIME_KEYWORD_ID);
    MediaAttributes {
        original_language,
        genre_ids: genres.iter().map(|g| g.id).collect(),
        keyword_ids,
        is_anime,
    }
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_base_url(API_BASE, api_key)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        append: &str,
    ) -> Result<T, BackendError> {
        let response = self
            .http
            .get(format!(
                "{}{}?api_key={}&append_to_response={}",
                self.base_url, path, self.api_key, append
            ))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::from_response("tmdb", response).await);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    #[tracing::instrument(skip(self))]
    async fn movie_attributes(&self, tmdb_id: i32) -> Result<MediaAttributes, BackendError> {
        let movie: TmdbMovie = self
            .fetch(&format!("/movie/{}", tmdb_id), "keywords")
            .await?;
        Ok(attributes(
            movie.original_language,
            &movie.genres,
            &movie.keywords,
        ))
    }

    #[tracing::instrument(skip(self))]
    async fn tv_details(&self, tmdb_id: i32) -> Result<TvDetails, BackendError> {
        let tv: TmdbTv = self
            .fetch(&format!("/tv/{}", tmdb_id), "keywords,external_ids")
            .await?;
        Ok(TvDetails {
            attributes: attributes(tv.original_language, &tv.genres, &tv.keywords),
            tvdb_id: tv.external_ids.tvdb_id,
            seasons: tv
                .seasons
                .into_iter()
                .map(|s| TvSeasonSummary {
                    season_number: s.season_number,
                    episode_count: s.episode_count,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_payload_maps_to_attributes() {
        let raw = r#"{
            "original_language": "ja",
            "genres": [{"id": 16, "name": "Animation"}, {"id": 878, "name": "Science Fiction"}],
            "keywords": {"keywords": [{"id": 210024, "name": "anime"}, {"id": 310, "name": "cyberpunk"}]}
        }"#;
        let movie: TmdbMovie = serde_json::from_str(raw).unwrap();
        let attrs = attributes(movie.original_language, &movie.genres, &movie.keywords);
        assert_eq!(attrs.original_language, "ja");
        assert_eq!(attrs.genre_ids, vec![16, 878]);
        assert!(attrs.is_anime);
    }

    #[test]
    fn tv_payload_carries_external_ids_and_seasons() {
        let raw = r#"{
            "original_language": "en",
            "genres": [{"id": 18}],
            "keywords": {"results": [{"id": 6091}]},
            "external_ids": {"tvdb_id": 121361, "imdb_id": "tt0944947"},
            "seasons": [
                {"season_number": 0, "episode_count": 14},
                {"season_number": 1, "episode_count": 10}
            ]
        }"#;
        let tv: TmdbTv = serde_json::from_str(raw).unwrap();
        assert_eq!(tv.external_ids.tvdb_id, Some(121361));
        assert_eq!(tv.seasons.len(), 2);
        let attrs = attributes(tv.original_language, &tv.genres, &tv.keywords);
        assert!(!attrs.is_anime);
        assert_eq!(attrs.keyword_ids, vec![6091]);
    }
}
