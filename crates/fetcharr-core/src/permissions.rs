//! Permission bitmask
//!
//! Users carry a single `u64` bitmask. Checks are either "any of" or "all of"
//! a small permission set; the admin bit satisfies every check.

use serde::{Deserialize, Serialize};

pub const ADMIN: u64 = 1 << 1;
pub const MANAGE_REQUESTS: u64 = 1 << 4;
pub const REQUEST: u64 = 1 << 5;
pub const AUTO_APPROVE: u64 = 1 << 7;
pub const AUTO_APPROVE_MOVIE: u64 = 1 << 8;
pub const AUTO_APPROVE_TV: u64 = 1 << 9;
pub const REQUEST_4K: u64 = 1 << 10;
pub const REQUEST_4K_MOVIE: u64 = 1 << 11;
pub const REQUEST_4K_TV: u64 = 1 << 12;
pub const AUTO_APPROVE_4K: u64 = 1 << 15;
pub const AUTO_APPROVE_4K_MOVIE: u64 = 1 << 16;
pub const AUTO_APPROVE_4K_TV: u64 = 1 << 17;
pub const REQUEST_MOVIE: u64 = 1 << 18;
pub const REQUEST_TV: u64 = 1 << 19;
pub const AUTO_REQUEST: u64 = 1 << 20;
pub const REQUEST_MUSIC: u64 = 1 << 21;
pub const AUTO_APPROVE_MUSIC: u64 = 1 << 22;

/// A user's permission bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(pub u64);

impl Permissions {
    pub fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub fn is_admin(&self) -> bool {
        self.0 & ADMIN == ADMIN
    }

    /// True when the user holds `perm` (or the admin bit).
    pub fn has(&self, perm: u64) -> bool {
        self.is_admin() || self.0 & perm == perm
    }

    /// True when the user holds at least one of `perms` (or the admin bit).
    pub fn has_any(&self, perms: &[u64]) -> bool {
        self.is_admin() || perms.iter().any(|p| self.0 & p == *p)
    }

    /// True when the user holds every one of `perms` (or the admin bit).
    pub fn has_all(&self, perms: &[u64]) -> bool {
        self.is_admin() || perms.iter().all(|p| self.0 & p == *p)
    }
}

impl From<u64> for Permissions {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_satisfies_any_check() {
        let perms = Permissions::new(ADMIN);
        assert!(perms.has(REQUEST_4K_MOVIE));
        assert!(perms.has_any(&[REQUEST, REQUEST_MOVIE]));
        assert!(perms.has_all(&[MANAGE_REQUESTS, AUTO_APPROVE]));
    }

    #[test]
    fn has_any_matches_single_bit() {
        let perms = Permissions::new(REQUEST_MOVIE);
        assert!(perms.has_any(&[REQUEST, REQUEST_MOVIE]));
        assert!(!perms.has_any(&[REQUEST, REQUEST_TV]));
    }

    #[test]
    fn has_all_requires_every_bit() {
        let perms = Permissions::new(REQUEST | REQUEST_4K);
        assert!(perms.has_all(&[REQUEST, REQUEST_4K]));
        assert!(!perms.has_all(&[REQUEST, REQUEST_4K, MANAGE_REQUESTS]));
    }

    #[test]
    fn empty_mask_has_nothing() {
        let perms = Permissions::default();
        assert!(!perms.has(REQUEST));
        assert!(!perms.is_admin());
    }
}
