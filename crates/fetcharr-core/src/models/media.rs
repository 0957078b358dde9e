use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Availability status of one tier of a media item (or of a single season).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    #[default]
    Unknown,
    Pending,
    Processing,
    PartiallyAvailable,
    Available,
    Blacklisted,
}

impl MediaStatus {
    /// True for the settled states the availability sweep cares about.
    pub fn is_available(&self) -> bool {
        matches!(self, MediaStatus::Available | MediaStatus::PartiallyAvailable)
    }
}

impl Display for MediaStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaStatus::Unknown => write!(f, "unknown"),
            MediaStatus::Pending => write!(f, "pending"),
            MediaStatus::Processing => write!(f, "processing"),
            MediaStatus::PartiallyAvailable => write!(f, "partially_available"),
            MediaStatus::Available => write!(f, "available"),
            MediaStatus::Blacklisted => write!(f, "blacklisted"),
        }
    }
}

impl FromStr for MediaStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(MediaStatus::Unknown),
            "pending" => Ok(MediaStatus::Pending),
            "processing" => Ok(MediaStatus::Processing),
            "partially_available" => Ok(MediaStatus::PartiallyAvailable),
            "available" => Ok(MediaStatus::Available),
            "blacklisted" => Ok(MediaStatus::Blacklisted),
            _ => Err(anyhow::anyhow!("Invalid media status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Tv,
    Music,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Tv => write!(f, "tv"),
            MediaKind::Music => write!(f, "music"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaKind::Movie),
            "tv" => Ok(MediaKind::Tv),
            "music" => Ok(MediaKind::Music),
            _ => Err(anyhow::anyhow!("Invalid media kind: {}", s)),
        }
    }
}

/// One of the two parallel availability tracks a media item maintains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaTier {
    Standard,
    FourK,
}

impl MediaTier {
    pub fn from_is4k(is4k: bool) -> Self {
        if is4k {
            MediaTier::FourK
        } else {
            MediaTier::Standard
        }
    }

    pub fn is4k(&self) -> bool {
        matches!(self, MediaTier::FourK)
    }
}

impl Display for MediaTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaTier::Standard => write!(f, "standard"),
            MediaTier::FourK => write!(f, "4k"),
        }
    }
}

/// Backend-linkage fields of one tier.
///
/// Invariant: these are populated only while the tier is `Processing` or a
/// settled available state that still references an active backend job, and
/// cleared whenever the tier regresses to `Unknown`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceLinkage {
    /// Id of the acquisition backend instance in settings.
    pub service_id: Option<i32>,
    /// The backend's own id for this item.
    pub external_service_id: Option<i64>,
    /// The backend's slug for this item, when the backend exposes one.
    pub external_service_slug: Option<String>,
    /// Media-server-native identifier, when the server knows this item.
    pub media_server_item_id: Option<String>,
}

impl ServiceLinkage {
    pub fn clear(&mut self) {
        *self = ServiceLinkage::default();
    }

    pub fn is_linked(&self) -> bool {
        self.service_id.is_some() && self.external_service_id.is_some()
    }
}

/// Status plus linkage for one tier of a media item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierState {
    pub status: MediaStatus,
    pub linkage: ServiceLinkage,
}

/// External metadata identifiers. Movies and TV are keyed by TMDB id (TV may
/// additionally carry a TVDB id); music albums by a MusicBrainz id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaIds {
    pub tmdb_id: Option<i32>,
    pub tvdb_id: Option<i32>,
    pub mb_id: Option<String>,
}

impl MediaIds {
    pub fn movie(tmdb_id: i32) -> Self {
        Self {
            tmdb_id: Some(tmdb_id),
            ..Default::default()
        }
    }

    pub fn tv(tmdb_id: i32) -> Self {
        Self {
            tmdb_id: Some(tmdb_id),
            ..Default::default()
        }
    }

    pub fn album(mb_id: impl Into<String>) -> Self {
        Self {
            mb_id: Some(mb_id.into()),
            ..Default::default()
        }
    }

    /// True when `other` identifies the same title.
    pub fn same_title(&self, other: &MediaIds) -> bool {
        match (self.tmdb_id, other.tmdb_id) {
            (Some(a), Some(b)) => a == b,
            _ => match (&self.mb_id, &other.mb_id) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Per-season availability record (TV only). Season numbers are unique within
/// the parent media item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeasonRecord {
    pub season_number: i32,
    pub status: MediaStatus,
    pub status4k: MediaStatus,
}

impl SeasonRecord {
    pub fn new(season_number: i32) -> Self {
        Self {
            season_number,
            status: MediaStatus::Unknown,
            status4k: MediaStatus::Unknown,
        }
    }

    pub fn status(&self, tier: MediaTier) -> MediaStatus {
        match tier {
            MediaTier::Standard => self.status,
            MediaTier::FourK => self.status4k,
        }
    }

    pub fn set_status(&mut self, tier: MediaTier, status: MediaStatus) {
        match tier {
            MediaTier::Standard => self.status = status,
            MediaTier::FourK => self.status4k = status,
        }
    }
}

/// One record per distinct title, carrying the two parallel tier tracks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    pub id: Uuid,
    pub kind: MediaKind,
    pub ids: MediaIds,
    pub standard: TierState,
    pub four_k: TierState,
    pub seasons: Vec<SeasonRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaItem {
    pub fn new(kind: MediaKind, ids: MediaIds) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            ids,
            standard: TierState::default(),
            four_k: TierState::default(),
            seasons: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tier(&self, tier: MediaTier) -> &TierState {
        match tier {
            MediaTier::Standard => &self.standard,
            MediaTier::FourK => &self.four_k,
        }
    }

    pub fn tier_mut(&mut self, tier: MediaTier) -> &mut TierState {
        match tier {
            MediaTier::Standard => &mut self.standard,
            MediaTier::FourK => &mut self.four_k,
        }
    }

    pub fn season(&self, season_number: i32) -> Option<&SeasonRecord> {
        self.seasons
            .iter()
            .find(|s| s.season_number == season_number)
    }

    pub fn season_mut(&mut self, season_number: i32) -> Option<&mut SeasonRecord> {
        self.seasons
            .iter_mut()
            .find(|s| s.season_number == season_number)
    }

    /// Returns the season record, creating it at `Unknown` if absent.
    pub fn ensure_season(&mut self, season_number: i32) -> &mut SeasonRecord {
        if self.season(season_number).is_none() {
            self.seasons.push(SeasonRecord::new(season_number));
            self.seasons.sort_by_key(|s| s.season_number);
        }
        self.season_mut(season_number).expect("season just inserted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_status_display_round_trip() {
        for status in [
            MediaStatus::Unknown,
            MediaStatus::Pending,
            MediaStatus::Processing,
            MediaStatus::PartiallyAvailable,
            MediaStatus::Available,
            MediaStatus::Blacklisted,
        ] {
            assert_eq!(status.to_string().parse::<MediaStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<MediaStatus>().is_err());
    }

    #[test]
    fn tier_selector_is_symmetric() {
        let mut item = MediaItem::new(MediaKind::Movie, MediaIds::movie(603));
        item.tier_mut(MediaTier::FourK).status = MediaStatus::Processing;
        assert_eq!(item.tier(MediaTier::Standard).status, MediaStatus::Unknown);
        assert_eq!(item.tier(MediaTier::FourK).status, MediaStatus::Processing);
    }

    #[test]
    fn linkage_clear_resets_all_fields() {
        let mut linkage = ServiceLinkage {
            service_id: Some(1),
            external_service_id: Some(42),
            external_service_slug: Some("the-matrix".into()),
            media_server_item_id: Some("1234".into()),
        };
        assert!(linkage.is_linked());
        linkage.clear();
        assert_eq!(linkage, ServiceLinkage::default());
        assert!(!linkage.is_linked());
    }

    #[test]
    fn ensure_season_keeps_numbers_unique_and_sorted() {
        let mut item = MediaItem::new(MediaKind::Tv, MediaIds::tv(1399));
        item.ensure_season(3);
        item.ensure_season(1);
        item.ensure_season(3);
        let numbers: Vec<i32> = item.seasons.iter().map(|s| s.season_number).collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    #[test]
    fn season_status_tier_accessor() {
        let mut season = SeasonRecord::new(2);
        season.set_status(MediaTier::FourK, MediaStatus::Available);
        assert_eq!(season.status(MediaTier::Standard), MediaStatus::Unknown);
        assert_eq!(season.status(MediaTier::FourK), MediaStatus::Available);
    }

    #[test]
    fn same_title_compares_the_right_key() {
        assert!(MediaIds::movie(550).same_title(&MediaIds::movie(550)));
        assert!(!MediaIds::movie(550).same_title(&MediaIds::movie(551)));
        assert!(MediaIds::album("abc").same_title(&MediaIds::album("abc")));
        assert!(!MediaIds::album("abc").same_title(&MediaIds::movie(550)));
    }
}
