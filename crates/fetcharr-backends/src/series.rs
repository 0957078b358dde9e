//! Sonarr-compatible series backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::arr::ArrHttp;
use crate::error::BackendError;
use crate::types::Tag;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeriesType {
    Standard,
    Anime,
    Daily,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeasonStatistics {
    #[serde(default)]
    pub episode_file_count: i32,
    #[serde(default)]
    pub episode_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSeason {
    pub season_number: i32,
    pub monitored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<SeasonStatistics>,
}

impl RemoteSeason {
    /// True when the backend holds at least one file for this season.
    pub fn has_files(&self) -> bool {
        self.statistics
            .map(|s| s.episode_file_count > 0)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSeries {
    pub id: i64,
    pub title: String,
    pub tvdb_id: i32,
    #[serde(default)]
    pub title_slug: Option<String>,
    #[serde(default)]
    pub monitored: bool,
    #[serde(default = "default_series_type")]
    pub series_type: SeriesType,
    #[serde(default)]
    pub seasons: Vec<RemoteSeason>,
    #[serde(default)]
    pub tags: Vec<i32>,
}

fn default_series_type() -> SeriesType {
    SeriesType::Standard
}

impl RemoteSeries {
    pub fn season(&self, season_number: i32) -> Option<&RemoteSeason> {
        self.seasons.iter().find(|s| s.season_number == season_number)
    }
}

#[derive(Debug, Clone)]
pub struct AddSeriesParams {
    pub tvdb_id: i32,
    pub quality_profile_id: i32,
    pub root_folder_path: String,
    pub season_folder: bool,
    pub series_type: SeriesType,
    pub tags: Vec<i32>,
    /// Seasons to monitor; everything else is added unmonitored.
    pub monitored_seasons: Vec<i32>,
    pub search_now: bool,
}

#[async_trait]
pub trait SeriesBackend: Send + Sync {
    async fn get_series(&self, id: i64) -> Result<Option<RemoteSeries>, BackendError>;

    async fn find_by_tvdb(&self, tvdb_id: i32) -> Result<Option<RemoteSeries>, BackendError>;

    async fn add_series(&self, params: AddSeriesParams) -> Result<RemoteSeries, BackendError>;

    /// Push the series document back, typically after flipping season
    /// monitoring flags.
    async fn update_series(&self, series: &RemoteSeries) -> Result<RemoteSeries, BackendError>;

    async fn search_seasons(&self, series_id: i64, seasons: &[i32]) -> Result<(), BackendError>;

    async fn ensure_tag(&self, label: &str) -> Result<Tag, BackendError>;
}

#[derive(Clone)]
pub struct SonarrClient {
    http: ArrHttp,
}

impl SonarrClient {
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
impl SeriesBackend for SonarrClient {
    #[tracing::instrument(skip(self), fields(service = %self.http.service()))]
    async fn get_series(&self, id: i64) -> Result<Option<RemoteSeries>, BackendError> {
        self.http.get_optional(&format!("/series/{}", id)).await
    }

    #[tracing::instrument(skip(self), fields(service = %self.http.service()))]
    async fn find_by_tvdb(&self, tvdb_id: i32) -> Result<Option<RemoteSeries>, BackendError> {
        let series: Vec<RemoteSeries> = self
            .http
            .get(&format!("/series?tvdbId={}", tvdb_id))
            .await?;
        Ok(series.into_iter().next())
    }

    #[tracing::instrument(skip(self, params), fields(service = %self.http.service(), tvdb_id = params.tvdb_id))]
    async fn add_series(&self, params: AddSeriesParams) -> Result<RemoteSeries, BackendError> {
        let lookups: Vec<serde_json::Value> = self
            .http
            .get(&format!("/series/lookup?term=tvdb:{}", params.tvdb_id))
            .await?;
        let mut lookup = lookups
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::UnexpectedResponse {
                service: self.http.service().to_string(),
                detail: format!("series lookup for tvdb:{} came back empty", params.tvdb_id),
            })?;
        let doc = lookup
            .as_object_mut()
            .ok_or_else(|| BackendError::UnexpectedResponse {
                service: self.http.service().to_string(),
                detail: "series lookup did not return an object".to_string(),
            })?;

        // Monitor only the requested seasons; specials stay off.
        if let Some(seasons) = doc.get_mut("seasons").and_then(|s| s.as_array_mut()) {
            for season in seasons {
                let number = season
                    .get("seasonNumber")
                    .and_then(|n| n.as_i64())
                    .unwrap_or(-1) as i32;
                let monitored = number > 0 && params.monitored_seasons.contains(&number);
                if let Some(obj) = season.as_object_mut() {
                    obj.insert("monitored".into(), json!(monitored));
                }
            }
        }
        doc.insert(
            "qualityProfileId".into(),
            json!(params.quality_profile_id),
        );
        doc.insert("rootFolderPath".into(), json!(params.root_folder_path));
        doc.insert("seasonFolder".into(), json!(params.season_folder));
        doc.insert("seriesType".into(), json!(params.series_type));
        doc.insert("monitored".into(), json!(true));
        doc.insert("tags".into(), json!(params.tags));
        doc.insert(
            "addOptions".into(),
            json!({
                "ignoreEpisodesWithFiles": true,
                "searchForMissingEpisodes": params.search_now,
            }),
        );

        self.http.post("/series", &lookup).await
    }

    #[tracing::instrument(skip(self, series), fields(service = %self.http.service(), series_id = series.id))]
    async fn update_series(&self, series: &RemoteSeries) -> Result<RemoteSeries, BackendError> {
        self.http
            .put(&format!("/series/{}", series.id), series)
            .await
    }

    #[tracing::instrument(skip(self), fields(service = %self.http.service()))]
    async fn search_seasons(&self, series_id: i64, seasons: &[i32]) -> Result<(), BackendError> {
        for season_number in seasons {
            self.http
                .command(&json!({
                    "name": "SeasonSearch",
                    "seriesId": series_id,
                    "seasonNumber": season_number,
                }))
                .await?;
        }
        Ok(())
    }

    async fn ensure_tag(&self, label: &str) -> Result<Tag, BackendError> {
        self.http.ensure_tag(label).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_series_deserializes_seasons_and_statistics() {
        let raw = r#"{
            "id": 7,
            "title": "Game of Thrones",
            "tvdbId": 121361,
            "titleSlug": "game-of-thrones",
            "monitored": true,
            "seriesType": "standard",
            "seasons": [
                {"seasonNumber": 0, "monitored": false},
                {"seasonNumber": 1, "monitored": true,
                 "statistics": {"episodeFileCount": 10, "episodeCount": 10}},
                {"seasonNumber": 2, "monitored": true,
                 "statistics": {"episodeFileCount": 0, "episodeCount": 10}}
            ]
        }"#;
        let series: RemoteSeries = serde_json::from_str(raw).unwrap();
        assert_eq!(series.seasons.len(), 3);
        assert!(series.season(1).unwrap().has_files());
        assert!(!series.season(2).unwrap().has_files());
        assert!(!series.season(0).unwrap().has_files());
        assert_eq!(series.series_type, SeriesType::Standard);
    }

    #[test]
    fn series_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&SeriesType::Anime).unwrap(), "\"anime\"");
        let parsed: SeriesType = serde_json::from_str("\"daily\"").unwrap();
        assert_eq!(parsed, SeriesType::Daily);
    }
}
