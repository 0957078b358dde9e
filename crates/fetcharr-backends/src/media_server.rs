//! Media server clients (Plex, Jellyfin).
//!
//! The availability sweep only needs two questions answered: does this item
//! still exist, and which seasons does the server list for it. Both clients
//! answer 404 with `Ok(None)` / empty so callers can tell a removed item
//! apart from an unreachable server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::BackendError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Library item as the media server knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerItem {
    pub id: String,
    pub title: String,
}

/// One season of a show, as listed by the media server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSeason {
    pub season_number: i32,
    pub episode_count: i32,
}

#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Fetch an item by its server-native id. `Ok(None)` when the server no
    /// longer knows the id.
    async fn get_item(&self, item_id: &str) -> Result<Option<ServerItem>, BackendError>;

    /// Seasons the server lists under a show. Empty when the show is gone.
    async fn list_seasons(&self, item_id: &str) -> Result<Vec<ServerSeason>, BackendError>;
}

// ---------------------------------------------------------------------------
// Plex

#[derive(Clone)]
pub struct PlexClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct PlexResponse {
    #[serde(rename = "MediaContainer")]
    media_container: PlexContainer,
}

#[derive(Debug, Deserialize)]
struct PlexContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexMetadata>,
}

#[derive(Debug, Deserialize)]
struct PlexMetadata {
    #[serde(rename = "ratingKey")]
    rating_key: String,
    #[serde(default)]
    title: String,
    /// Season number for season children.
    #[serde(default)]
    index: Option<i32>,
    /// Episode count for season children.
    #[serde(rename = "leafCount", default)]
    leaf_count: Option<i32>,
}

impl PlexClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn fetch(&self, path: &str) -> Result<Option<PlexContainer>, BackendError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("X-Plex-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BackendError::from_response("plex", response).await);
        }
        let body: PlexResponse = response.json().await?;
        Ok(Some(body.media_container))
    }
}

#[async_trait]
impl MediaServer for PlexClient {
    #[tracing::instrument(skip(self))]
    async fn get_item(&self, item_id: &str) -> Result<Option<ServerItem>, BackendError> {
        let container = match self.fetch(&format!("/library/metadata/{}", item_id)).await? {
            Some(container) => container,
            None => return Ok(None),
        };
        Ok(container.metadata.into_iter().next().map(|m| ServerItem {
            id: m.rating_key,
            title: m.title,
        }))
    }

    #[tracing::instrument(skip(self))]
    async fn list_seasons(&self, item_id: &str) -> Result<Vec<ServerSeason>, BackendError> {
        let container = match self
            .fetch(&format!("/library/metadata/{}/children", item_id))
            .await?
        {
            Some(container) => container,
            None => return Ok(Vec::new()),
        };
        Ok(container
            .metadata
            .into_iter()
            .filter_map(|m| {
                m.index.map(|season_number| ServerSeason {
                    season_number,
                    episode_count: m.leaf_count.unwrap_or(0),
                })
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Jellyfin

#[derive(Clone)]
pub struct JellyfinClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JellyfinItemsPage {
    #[serde(default)]
    items: Vec<JellyfinItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JellyfinItem {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    index_number: Option<i32>,
    #[serde(default)]
    child_count: Option<i32>,
}

impl JellyfinClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn fetch_items(&self, path: &str) -> Result<Option<JellyfinItemsPage>, BackendError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("X-Emby-Token", &self.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BackendError::from_response("jellyfin", response).await);
        }
        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl MediaServer for JellyfinClient {
    #[tracing::instrument(skip(self))]
    async fn get_item(&self, item_id: &str) -> Result<Option<ServerItem>, BackendError> {
        let page = match self.fetch_items(&format!("/Items?ids={}", item_id)).await? {
            Some(page) => page,
            None => return Ok(None),
        };
        Ok(page.items.into_iter().next().map(|i| ServerItem {
            id: i.id,
            title: i.name,
        }))
    }

    #[tracing::instrument(skip(self))]
    async fn list_seasons(&self, item_id: &str) -> Result<Vec<ServerSeason>, BackendError> {
        let page = match self
            .fetch_items(&format!("/Shows/{}/Seasons?fields=ChildCount", item_id))
            .await?
        {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };
        Ok(page
            .items
            .into_iter()
            .filter_map(|i| {
                i.index_number.map(|season_number| ServerSeason {
                    season_number,
                    episode_count: i.child_count.unwrap_or(0),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plex_children_payload_parses_into_seasons() {
        let raw = r#"{
            "MediaContainer": {
                "Metadata": [
                    {"ratingKey": "101", "title": "Season 1", "index": 1, "leafCount": 10},
                    {"ratingKey": "102", "title": "Season 2", "index": 2, "leafCount": 0}
                ]
            }
        }"#;
        let parsed: PlexResponse = serde_json::from_str(raw).unwrap();
        let seasons: Vec<_> = parsed
            .media_container
            .metadata
            .iter()
            .filter_map(|m| m.index)
            .collect();
        assert_eq!(seasons, vec![1, 2]);
        assert_eq!(parsed.media_container.metadata[0].leaf_count, Some(10));
    }

    #[test]
    fn plex_empty_container_parses() {
        let raw = r#"{"MediaContainer": {}}"#;
        let parsed: PlexResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.media_container.metadata.is_empty());
    }

    #[test]
    fn jellyfin_seasons_payload_parses() {
        let raw = r#"{
            "Items": [
                {"Id": "a1", "Name": "Season 1", "IndexNumber": 1, "ChildCount": 8},
                {"Id": "a2", "Name": "Specials", "IndexNumber": 0, "ChildCount": 3}
            ],
            "TotalRecordCount": 2
        }"#;
        let parsed: JellyfinItemsPage = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[0].index_number, Some(1));
        assert_eq!(parsed.items[0].child_count, Some(8));
    }
}
