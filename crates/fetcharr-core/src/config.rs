//! Configuration module
//!
//! The settings document describes acquisition backend instances, the media
//! server, global quota defaults, and override rules. It is loaded from a
//! JSON file named by `FETCHARR_SETTINGS` (dotenv-aware), mirroring how the
//! rest of the stack treats settings as immutable configuration.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::{MediaKind, OverrideRule, Quota};

const SETTINGS_PATH_VAR: &str = "FETCHARR_SETTINGS";
const DEFAULT_SETTINGS_PATH: &str = "settings.json";

/// Fields every acquisition backend instance carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceCommon {
    pub id: i32,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    /// Default instance for its tier.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_four_k: bool,
    pub active_profile_id: i32,
    pub active_directory: String,
    #[serde(default)]
    pub tags: Vec<i32>,
    /// Tag dispatched items with a per-requester tag.
    #[serde(default)]
    pub tag_requests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RadarrSettings {
    #[serde(flatten)]
    pub common: ServiceCommon,
    /// Minimum availability to request from Radarr ("announced", "released").
    #[serde(default = "default_minimum_availability")]
    pub minimum_availability: String,
}

fn default_minimum_availability() -> String {
    "released".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SonarrSettings {
    #[serde(flatten)]
    pub common: ServiceCommon,
    pub active_anime_profile_id: Option<i32>,
    pub active_anime_directory: Option<String>,
    #[serde(default)]
    pub anime_tags: Vec<i32>,
    #[serde(default = "default_true")]
    pub enable_season_folders: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LidarrSettings {
    #[serde(flatten)]
    pub common: ServiceCommon,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaServerKind {
    Plex,
    Jellyfin,
}

impl Display for MediaServerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaServerKind::Plex => write!(f, "plex"),
            MediaServerKind::Jellyfin => write!(f, "jellyfin"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaServerSettings {
    pub kind: MediaServerKind,
    pub base_url: String,
    /// Admin-scoped credential. The availability sweep refuses to run
    /// without one.
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuotaDefaults {
    #[serde(default)]
    pub movie: Quota,
    #[serde(default)]
    pub tv: Quota,
    #[serde(default)]
    pub music: Quota,
}

impl QuotaDefaults {
    pub fn for_kind(&self, kind: MediaKind) -> Quota {
        match kind {
            MediaKind::Movie => self.movie,
            MediaKind::Tv => self.tv,
            MediaKind::Music => self.music,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub radarr: Vec<RadarrSettings>,
    #[serde(default)]
    pub sonarr: Vec<SonarrSettings>,
    #[serde(default)]
    pub lidarr: Vec<LidarrSettings>,
    pub media_server: Option<MediaServerSettings>,
    #[serde(default)]
    pub quotas: QuotaDefaults,
    #[serde(default)]
    pub override_rules: Vec<OverrideRule>,
}

impl Settings {
    /// Load the settings document from the path named by `FETCHARR_SETTINGS`.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let path =
            env::var(SETTINGS_PATH_VAR).unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {}", path))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path))?;
        settings.warn_on_gaps();
        Ok(settings)
    }

    /// Log configuration gaps the dispatcher will later no-op on.
    pub fn warn_on_gaps(&self) {
        if !self.radarr.is_empty() && self.default_radarr(false).is_none() {
            tracing::warn!("No default movie backend for the standard tier");
        }
        if !self.sonarr.is_empty() && self.default_sonarr(false).is_none() {
            tracing::warn!("No default series backend for the standard tier");
        }
        if !self.lidarr.is_empty() && self.default_lidarr(false).is_none() {
            tracing::warn!("No default music backend for the standard tier");
        }
        if let Some(server) = &self.media_server {
            if server.admin_token.is_none() {
                tracing::warn!(kind = %server.kind, "Media server has no admin token; the availability sweep will not run");
            }
        }
    }

    pub fn default_radarr(&self, four_k: bool) -> Option<&RadarrSettings> {
        self.radarr
            .iter()
            .find(|s| s.common.is_default && s.common.is_four_k == four_k)
    }

    pub fn default_sonarr(&self, four_k: bool) -> Option<&SonarrSettings> {
        self.sonarr
            .iter()
            .find(|s| s.common.is_default && s.common.is_four_k == four_k)
    }

    pub fn default_lidarr(&self, four_k: bool) -> Option<&LidarrSettings> {
        self.lidarr
            .iter()
            .find(|s| s.common.is_default && s.common.is_four_k == four_k)
    }

    pub fn radarr_by_id(&self, id: i32) -> Option<&RadarrSettings> {
        self.radarr.iter().find(|s| s.common.id == id)
    }

    pub fn sonarr_by_id(&self, id: i32) -> Option<&SonarrSettings> {
        self.sonarr.iter().find(|s| s.common.id == id)
    }

    pub fn lidarr_by_id(&self, id: i32) -> Option<&LidarrSettings> {
        self.lidarr.iter().find(|s| s.common.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common(id: i32, is_default: bool, is_four_k: bool) -> ServiceCommon {
        ServiceCommon {
            id,
            name: format!("instance-{}", id),
            base_url: "http://localhost:7878".into(),
            api_key: "key".into(),
            is_default,
            is_four_k,
            active_profile_id: 1,
            active_directory: "/media".into(),
            tags: Vec::new(),
            tag_requests: false,
        }
    }

    #[test]
    fn default_instance_lookup_respects_tier() {
        let settings = Settings {
            radarr: vec![
                RadarrSettings {
                    common: common(1, true, false),
                    minimum_availability: "released".into(),
                },
                RadarrSettings {
                    common: common(2, true, true),
                    minimum_availability: "released".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(settings.default_radarr(false).unwrap().common.id, 1);
        assert_eq!(settings.default_radarr(true).unwrap().common.id, 2);
        assert!(settings.default_sonarr(false).is_none());
    }

    #[test]
    fn settings_parse_minimal_document() {
        let raw = r#"{
            "sonarr": [{
                "id": 1,
                "name": "main",
                "base_url": "http://sonarr:8989",
                "api_key": "abc",
                "is_default": true,
                "active_profile_id": 6,
                "active_directory": "/tv",
                "active_anime_profile_id": 7,
                "active_anime_directory": "/anime"
            }],
            "quotas": { "movie": { "limit": 5, "days": 7 } }
        }"#;
        let settings: Settings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.sonarr.len(), 1);
        assert!(settings.sonarr[0].enable_season_folders);
        assert_eq!(settings.quotas.movie.limit, 5);
        assert!(settings.quotas.tv.is_unlimited());
        assert!(settings.media_server.is_none());
    }
}
