pub mod media;
pub mod request;
pub mod rule;
pub mod task;
pub mod user;

pub use media::{
    MediaIds, MediaItem, MediaKind, MediaStatus, MediaTier, SeasonRecord, ServiceLinkage,
    TierState,
};
pub use request::{
    RequestPayload, RequestRecord, RequestStatus, RequestTarget, SeasonRequest,
};
pub use rule::{resolve_rule, MediaAttributes, OverrideRule};
pub use task::{
    DispatchPayload, DispatchTask, MusicAddAlbumPayload, MusicMonitorCheckPayload, TaskKind,
    TaskPayload, TaskStatus,
};
pub use user::{Quota, QuotaStatus, User, UserQuotas};
