//! Fetcharr Core Library
//!
//! This crate provides the domain models, permission bitmask, error taxonomy,
//! and settings document shared across all Fetcharr components.

pub mod config;
pub mod error;
pub mod models;
pub mod permissions;

// Re-export commonly used types
pub use config::{
    LidarrSettings, MediaServerKind, MediaServerSettings, QuotaDefaults, RadarrSettings,
    ServiceCommon, Settings, SonarrSettings,
};
pub use error::{LogLevel, RequestError, StoreError, TaskError};
pub use permissions::Permissions;
