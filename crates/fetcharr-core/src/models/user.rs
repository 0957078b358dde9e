use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permissions::Permissions;

/// A request quota: at most `limit` requests within a rolling `days` window.
/// A `limit` of 0 means unlimited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quota {
    pub limit: i32,
    pub days: i32,
}

impl Quota {
    pub fn unlimited() -> Self {
        Self { limit: 0, days: 7 }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit <= 0
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Per-user quota overrides. `None` falls through to the global default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserQuotas {
    pub movie_limit: Option<i32>,
    pub movie_days: Option<i32>,
    pub tv_limit: Option<i32>,
    pub tv_days: Option<i32>,
    pub music_limit: Option<i32>,
    pub music_days: Option<i32>,
}

/// Rolling usage snapshot, recomputed on every check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaStatus {
    pub limit: i32,
    pub days: i32,
    pub used: i32,
}

impl QuotaStatus {
    pub fn remaining(&self) -> i32 {
        if self.limit <= 0 {
            i32::MAX
        } else {
            (self.limit - self.used).max(0)
        }
    }

    /// True when no further requests fit in the window.
    pub fn restricted(&self) -> bool {
        self.limit > 0 && self.used >= self.limit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub permissions: Permissions,
    pub quotas: UserQuotas,
}

impl User {
    pub fn new(display_name: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            permissions,
            quotas: UserQuotas::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_is_unlimited() {
        let status = QuotaStatus {
            limit: 0,
            days: 7,
            used: 500,
        };
        assert!(!status.restricted());
        assert_eq!(status.remaining(), i32::MAX);
    }

    #[test]
    fn restricted_at_limit() {
        let status = QuotaStatus {
            limit: 2,
            days: 7,
            used: 2,
        };
        assert!(status.restricted());
        assert_eq!(status.remaining(), 0);
    }

    #[test]
    fn remaining_never_negative() {
        let status = QuotaStatus {
            limit: 2,
            days: 7,
            used: 5,
        };
        assert_eq!(status.remaining(), 0);
    }
}
