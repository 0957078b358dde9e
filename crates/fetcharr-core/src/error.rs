//! Error types module
//!
//! Typed errors surfaced synchronously to submitting callers live in
//! [`RequestError`]. Background work (dispatch, availability sweep) degrades
//! to logging plus a terminal state flag instead of propagating these.

use crate::models::MediaKind;

/// Log level an error should be reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected rejections such as quota or permission failures.
    Debug,
    /// Recoverable or configuration-related issues.
    Warn,
    /// Unexpected failures.
    Error,
}

/// Persistence-layer error. The store is an abstract collaborator; concrete
/// implementations map their failures into these variants.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Internal(String),
}

/// Errors surfaced to the caller of `submit_request` and the other
/// user-initiated operations. Never retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("user is not permitted to make this request")]
    Authorization,

    #[error("{kind} request quota exceeded: {used}/{limit} in the last {days} days")]
    QuotaExceeded {
        kind: MediaKind,
        limit: i32,
        days: i32,
        used: i32,
    },

    #[error("a request for this media already exists")]
    DuplicateRequest,

    #[error("no requestable seasons remain for this series")]
    NoSeasonsAvailable,

    #[error("media is blacklisted")]
    BlacklistedMedia,

    #[error("{0} not found")]
    NotFound(String),

    #[error("request is not in a state that allows this: {0}")]
    InvalidState(String),

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RequestError {
    /// Machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::Authorization => "AUTHORIZATION_ERROR",
            RequestError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            RequestError::DuplicateRequest => "DUPLICATE_REQUEST",
            RequestError::NoSeasonsAvailable => "NO_SEASONS_AVAILABLE",
            RequestError::BlacklistedMedia => "BLACKLISTED_MEDIA",
            RequestError::NotFound(_) => "NOT_FOUND",
            RequestError::InvalidState(_) => "INVALID_STATE",
            RequestError::Upstream(_) => "UPSTREAM_ERROR",
            RequestError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn log_level(&self) -> LogLevel {
        match self {
            RequestError::Authorization
            | RequestError::DuplicateRequest
            | RequestError::NoSeasonsAvailable
            | RequestError::BlacklistedMedia
            | RequestError::NotFound(_)
            | RequestError::InvalidState(_) => LogLevel::Debug,
            RequestError::QuotaExceeded { .. } | RequestError::Upstream(_) => LogLevel::Warn,
            RequestError::Store(_) => LogLevel::Error,
        }
    }
}

/// Error wrapper for background task handlers. The worker retries recoverable
/// failures with backoff and fails unrecoverable ones immediately.
#[derive(Debug)]
pub struct TaskError {
    recoverable: bool,
    source: anyhow::Error,
}

impl TaskError {
    pub fn recoverable(source: anyhow::Error) -> Self {
        Self {
            recoverable: true,
            source,
        }
    }

    pub fn unrecoverable(source: anyhow::Error) -> Self {
        Self {
            recoverable: false,
            source,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for TaskError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_error_message_includes_counts() {
        let err = RequestError::QuotaExceeded {
            kind: MediaKind::Movie,
            limit: 1,
            days: 7,
            used: 1,
        };
        let message = err.to_string();
        assert!(message.contains("movie"));
        assert!(message.contains("1/1"));
        assert_eq!(err.error_code(), "QUOTA_EXCEEDED");
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn store_errors_log_at_error_level() {
        let err = RequestError::from(StoreError::Internal("lost".into()));
        assert_eq!(err.error_code(), "STORE_ERROR");
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn rejections_log_at_debug_level() {
        assert_eq!(RequestError::Authorization.log_level(), LogLevel::Debug);
        assert_eq!(RequestError::DuplicateRequest.log_level(), LogLevel::Debug);
    }

    #[test]
    fn task_error_survives_anyhow_round_trip() {
        let err: anyhow::Error = TaskError::unrecoverable(anyhow::anyhow!("bad config")).into();
        let unrecoverable = err
            .downcast_ref::<TaskError>()
            .map(|te| !te.is_recoverable())
            .unwrap_or(false);
        assert!(unrecoverable);
        assert_eq!(err.to_string(), "bad config");
    }
}
