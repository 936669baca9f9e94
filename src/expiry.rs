//! TTL resolution shared by every backend.
//!
//! A store carries an optional default TTL; each `set` call may carry its own.
//! [`ExpiryPolicy`] turns the pair into an effective TTL and an absolute
//! expiry deadline, identically for every adapter:
//!
//! - a positive requested TTL overrides the default;
//! - no TTL (or a zero TTL) falls back to the store default;
//! - no default means the entry never expires.

use crate::error::{Error, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time as Unix epoch milliseconds.
///
/// Deadlines are kept at millisecond precision so sub-second TTLs survive
/// the round-trip through a stored timestamp.
pub(crate) fn now_epoch_millis() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| Error::Clock)?
        .as_millis() as u64)
}

/// The outcome of resolving a requested TTL against the store default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedExpiry {
    /// Effective TTL. `None` means the entry never expires. Backends with
    /// engine-enforced expiry hand this to the engine as the per-entry
    /// expiry directive.
    pub ttl: Option<Duration>,
    /// Absolute expiry instant in Unix epoch milliseconds, derived from the
    /// same TTL. Stored alongside the value by backends without native
    /// reaping.
    pub deadline: Option<u64>,
}

/// Per-store TTL resolution policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryPolicy {
    default_ttl: Option<Duration>,
}

impl ExpiryPolicy {
    /// Creates a policy with an optional store-wide default TTL.
    ///
    /// `None` means indefinite storage unless a `set` call supplies its own
    /// TTL. A zero default is normalized to `None`.
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            default_ttl: default_ttl.filter(|d| !d.is_zero()),
        }
    }

    /// Resolves the effective TTL for one `set` call without touching the
    /// clock. A zero requested TTL counts as "no explicit TTL" and falls
    /// back to the default.
    pub fn effective_ttl(&self, requested: Option<Duration>) -> Option<Duration> {
        requested.filter(|d| !d.is_zero()).or(self.default_ttl)
    }

    /// Resolves the effective TTL and its absolute deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Clock`] if the system clock is before the Unix epoch.
    pub fn resolve(&self, requested: Option<Duration>) -> Result<ResolvedExpiry> {
        let ttl = self.effective_ttl(requested);
        let deadline = match ttl {
            Some(ttl) => Some(now_epoch_millis()? + ttl.as_millis() as u64),
            None => None,
        };
        Ok(ResolvedExpiry { ttl, deadline })
    }
}

/// Whether a stored deadline (Unix epoch milliseconds) has passed.
pub(crate) fn deadline_passed(deadline: Option<u64>) -> Result<bool> {
    match deadline {
        None => Ok(false),
        Some(deadline) => Ok(now_epoch_millis()? >= deadline),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn no_ttl_no_default_never_expires() {
        let policy = ExpiryPolicy::new(None);
        let resolved = policy.resolve(None).unwrap();
        assert_eq!(resolved.ttl, None);
        assert_eq!(resolved.deadline, None);
    }

    #[test]
    fn requested_ttl_sets_deadline() {
        let policy = ExpiryPolicy::new(None);
        let before = now_epoch_millis().unwrap();
        let resolved = policy.resolve(Some(Duration::from_secs(60))).unwrap();
        assert_eq!(resolved.ttl, Some(Duration::from_secs(60)));
        let deadline = resolved.deadline.unwrap();
        assert!(deadline >= before + 60_000);
        assert!(deadline <= before + 61_000);
    }

    #[test]
    fn subsecond_ttl_keeps_a_future_deadline() {
        let policy = ExpiryPolicy::new(None);
        let before = now_epoch_millis().unwrap();
        let resolved = policy.resolve(Some(Duration::from_millis(500))).unwrap();
        let deadline = resolved.deadline.unwrap();
        assert!(deadline >= before + 500);
        assert!(!deadline_passed(Some(deadline)).unwrap());
    }

    #[test]
    fn zero_ttl_falls_back_to_default() {
        let policy = ExpiryPolicy::new(Some(Duration::from_secs(30)));
        assert_eq!(
            policy.effective_ttl(Some(Duration::ZERO)),
            Some(Duration::from_secs(30))
        );
        assert_eq!(policy.effective_ttl(None), Some(Duration::from_secs(30)));
    }

    #[test]
    fn requested_ttl_overrides_default() {
        let policy = ExpiryPolicy::new(Some(Duration::from_secs(30)));
        assert_eq!(
            policy.effective_ttl(Some(Duration::from_secs(5))),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn zero_default_means_indefinite() {
        let policy = ExpiryPolicy::new(Some(Duration::ZERO));
        assert_eq!(policy.effective_ttl(None), None);
    }

    #[test]
    fn past_deadline_is_expired() {
        assert!(deadline_passed(Some(0)).unwrap());
        assert!(!deadline_passed(None).unwrap());
        let future = now_epoch_millis().unwrap() + 3_600_000;
        assert!(!deadline_passed(Some(future)).unwrap());
    }

    proptest! {
        #[test]
        fn positive_request_always_wins(req in 1u64..100_000, default in proptest::option::of(0u64..100_000)) {
            let policy = ExpiryPolicy::new(default.map(Duration::from_secs));
            let effective = policy.effective_ttl(Some(Duration::from_secs(req)));
            prop_assert_eq!(effective, Some(Duration::from_secs(req)));
        }

        #[test]
        fn absent_request_yields_default(default in proptest::option::of(1u64..100_000)) {
            let policy = ExpiryPolicy::new(default.map(Duration::from_secs));
            let effective = policy.effective_ttl(None);
            prop_assert_eq!(effective, default.map(Duration::from_secs));
        }

        #[test]
        fn deadline_tracks_effective_ttl(req_ms in 1u64..100_000_000) {
            let policy = ExpiryPolicy::new(None);
            let before = now_epoch_millis().unwrap();
            let resolved = policy.resolve(Some(Duration::from_millis(req_ms))).unwrap();
            let deadline = resolved.deadline.unwrap();
            prop_assert!(deadline >= before + req_ms);
            prop_assert!(deadline <= before + req_ms + 1_000);
        }
    }
}
