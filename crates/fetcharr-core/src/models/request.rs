use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::media::{MediaIds, MediaKind, MediaTier};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Declined,
    Failed,
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Approved => write!(f, "approved"),
            RequestStatus::Declined => write!(f, "declined"),
            RequestStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "declined" => Ok(RequestStatus::Declined),
            "failed" => Ok(RequestStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid request status: {}", s)),
        }
    }
}

/// Per-season child record of a TV request, pinned to one season number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeasonRequest {
    pub season_number: i32,
    pub status: RequestStatus,
}

/// One record per user submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestRecord {
    pub id: Uuid,
    pub media_id: Uuid,
    pub kind: MediaKind,
    pub requested_by: Uuid,
    /// Set only when a privileged actor or auto-approval changes status.
    pub modified_by: Option<Uuid>,
    pub status: RequestStatus,
    is4k: bool,
    pub is_auto_request: bool,
    /// Target backend-instance override.
    pub server_id: Option<i32>,
    pub profile_id: Option<i32>,
    pub root_folder: Option<String>,
    pub tags: Option<Vec<i32>>,
    pub seasons: Vec<SeasonRequest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequestRecord {
    pub fn new(media_id: Uuid, kind: MediaKind, requested_by: Uuid, is4k: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            media_id,
            kind,
            requested_by,
            modified_by: None,
            status: RequestStatus::Pending,
            is4k,
            is_auto_request: false,
            server_id: None,
            profile_id: None,
            root_folder: None,
            tags: None,
            seasons: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The 4K flag is immutable after creation.
    pub fn is4k(&self) -> bool {
        self.is4k
    }

    pub fn tier(&self) -> MediaTier {
        MediaTier::from_is4k(self.is4k)
    }

    /// Non-declined requests still count toward duplicates and quota.
    pub fn is_active(&self) -> bool {
        self.status != RequestStatus::Declined
    }

    /// Replaces the season set, deduplicated and sorted.
    pub fn set_seasons(&mut self, mut season_numbers: Vec<i32>) {
        season_numbers.sort_unstable();
        season_numbers.dedup();
        self.seasons = season_numbers
            .into_iter()
            .map(|season_number| SeasonRequest {
                season_number,
                status: self.status,
            })
            .collect();
    }

    pub fn season_numbers(&self) -> Vec<i32> {
        self.seasons.iter().map(|s| s.season_number).collect()
    }
}

/// Typed target of a submission. Carries exactly the identifiers each media
/// kind is keyed by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestTarget {
    Movie { tmdb_id: i32 },
    Tv { tmdb_id: i32, seasons: Vec<i32> },
    Album { mb_id: String },
}

impl RequestTarget {
    pub fn kind(&self) -> MediaKind {
        match self {
            RequestTarget::Movie { .. } => MediaKind::Movie,
            RequestTarget::Tv { .. } => MediaKind::Tv,
            RequestTarget::Album { .. } => MediaKind::Music,
        }
    }

    pub fn media_ids(&self) -> MediaIds {
        match self {
            RequestTarget::Movie { tmdb_id } => MediaIds::movie(*tmdb_id),
            RequestTarget::Tv { tmdb_id, .. } => MediaIds::tv(*tmdb_id),
            RequestTarget::Album { mb_id } => MediaIds::album(mb_id.clone()),
        }
    }

    pub fn requested_seasons(&self) -> &[i32] {
        match self {
            RequestTarget::Tv { seasons, .. } => seasons,
            _ => &[],
        }
    }
}

/// Input to `submit_request`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestPayload {
    pub target: RequestTarget,
    pub is4k: bool,
    pub server_id: Option<i32>,
    pub profile_id: Option<i32>,
    pub root_folder: Option<String>,
    pub tags: Option<Vec<i32>>,
    /// Submit on behalf of another user; requires manage-requests rights.
    pub on_behalf_of: Option<Uuid>,
    /// Auto-generated requests (watchlist import) are exempt from quota but
    /// deduplicated per user.
    pub is_auto_request: bool,
}

impl RequestPayload {
    pub fn new(target: RequestTarget) -> Self {
        Self {
            target,
            is4k: false,
            server_id: None,
            profile_id: None,
            root_folder: None,
            tags: None,
            on_behalf_of: None,
            is_auto_request: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_status_round_trip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Declined,
            RequestStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<RequestStatus>().unwrap(), status);
        }
    }

    #[test]
    fn set_seasons_dedups_and_sorts() {
        let mut request =
            RequestRecord::new(Uuid::new_v4(), MediaKind::Tv, Uuid::new_v4(), false);
        request.set_seasons(vec![3, 1, 3, 2]);
        assert_eq!(request.season_numbers(), vec![1, 2, 3]);
        assert!(request
            .seasons
            .iter()
            .all(|s| s.status == RequestStatus::Pending));
    }

    #[test]
    fn target_kind_and_ids() {
        let target = RequestTarget::Tv {
            tmdb_id: 1399,
            seasons: vec![1, 2],
        };
        assert_eq!(target.kind(), MediaKind::Tv);
        assert_eq!(target.media_ids().tmdb_id, Some(1399));
        assert_eq!(target.requested_seasons(), &[1, 2]);

        let album = RequestTarget::Album {
            mb_id: "f5093c06".into(),
        };
        assert_eq!(album.kind(), MediaKind::Music);
        assert_eq!(album.media_ids().mb_id.as_deref(), Some("f5093c06"));
    }

    #[test]
    fn declined_requests_are_inactive() {
        let mut request =
            RequestRecord::new(Uuid::new_v4(), MediaKind::Movie, Uuid::new_v4(), true);
        assert!(request.is_active());
        assert!(request.is4k());
        assert_eq!(request.tier(), MediaTier::FourK);
        request.status = RequestStatus::Declined;
        assert!(!request.is_active());
    }
}
