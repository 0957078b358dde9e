//! Override-rule resolution.
//!
//! Metadata is fetched once per submission; the winning rule's replacement
//! values are stamped onto the request record at submit time so dispatch
//! never needs the metadata provider for routing.

use std::sync::Arc;

use uuid::Uuid;

use fetcharr_backends::metadata::{MetadataProvider, TvDetails};
use fetcharr_backends::BackendError;
use fetcharr_core::models::{resolve_rule, MediaAttributes, RequestTarget};
use fetcharr_store::RuleRepository;

/// Metadata gathered for a submission. Music targets have no rule metadata;
/// the backends key albums by MusicBrainz id directly.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetMetadata {
    Movie(MediaAttributes),
    Tv(TvDetails),
    None,
}

impl TargetMetadata {
    pub fn attributes(&self) -> Option<&MediaAttributes> {
        match self {
            TargetMetadata::Movie(attrs) => Some(attrs),
            TargetMetadata::Tv(details) => Some(&details.attributes),
            TargetMetadata::None => None,
        }
    }

    /// Season numbers the title actually has, specials excluded.
    pub fn known_seasons(&self) -> Vec<i32> {
        match self {
            TargetMetadata::Tv(details) => details
                .seasons
                .iter()
                .filter(|s| s.season_number > 0 && s.episode_count > 0)
                .map(|s| s.season_number)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn tvdb_id(&self) -> Option<i32> {
        match self {
            TargetMetadata::Tv(details) => details.tvdb_id,
            _ => None,
        }
    }
}

/// Replacement values the winning rule contributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOverrides {
    pub profile_id: Option<i32>,
    pub root_folder: Option<String>,
    pub tags: Option<Vec<i32>>,
}

pub struct RuleResolver {
    rules: Arc<dyn RuleRepository>,
    metadata: Arc<dyn MetadataProvider>,
}

impl RuleResolver {
    pub fn new(rules: Arc<dyn RuleRepository>, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self { rules, metadata }
    }

    /// The single metadata fetch for a submission.
    pub async fn fetch_metadata(
        &self,
        target: &RequestTarget,
    ) -> Result<TargetMetadata, BackendError> {
        match target {
            RequestTarget::Movie { tmdb_id } => Ok(TargetMetadata::Movie(
                self.metadata.movie_attributes(*tmdb_id).await?,
            )),
            RequestTarget::Tv { tmdb_id, .. } => {
                Ok(TargetMetadata::Tv(self.metadata.tv_details(*tmdb_id).await?))
            }
            RequestTarget::Album { .. } => Ok(TargetMetadata::None),
        }
    }

    /// Resolve the highest-priority matching rule for this backend-instance
    /// slot and return its replacement values.
    #[tracing::instrument(skip(self, metadata))]
    pub async fn resolve(
        &self,
        service_id: i32,
        user_id: Uuid,
        metadata: &TargetMetadata,
    ) -> Result<ResolvedOverrides, fetcharr_core::StoreError> {
        let attrs = match metadata.attributes() {
            Some(attrs) => attrs.clone(),
            None => return Ok(ResolvedOverrides::default()),
        };
        let rules = self.rules.list().await?;
        let resolved = match resolve_rule(&rules, service_id, user_id, &attrs) {
            Some(rule) => {
                tracing::debug!(rule_id = rule.id, service_id, "Override rule matched");
                ResolvedOverrides {
                    profile_id: rule.profile_id,
                    root_folder: rule.root_folder.clone(),
                    tags: rule.tags.clone(),
                }
            }
            None => ResolvedOverrides::default(),
        };
        Ok(resolved)
    }
}
