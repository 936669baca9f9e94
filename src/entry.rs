//! Persisted entry envelope.
//!
//! Backends without engine-enforced expiry store the value together with its
//! absolute expiry deadline and check the deadline defensively on every read.
//! The envelope is JSON-serialized for compatibility with debugging tools and
//! future schema evolution.

use crate::error::Result;
use crate::expiry::deadline_passed;
use serde::{Deserialize, Serialize};

/// Value plus optional expiration, as persisted by envelope backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    /// The actual value bytes (any binary data).
    pub value: Vec<u8>,
    /// Optional expiration timestamp (Unix epoch milliseconds). None = never expires.
    pub expires_at: Option<u64>,
}

impl StoredEntry {
    pub const fn new(value: Vec<u8>, expires_at: Option<u64>) -> Self {
        Self { value, expires_at }
    }

    /// Checks if this entry has expired.
    pub fn is_expired(&self) -> Result<bool> {
        deadline_passed(self.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiry::now_epoch_millis;

    #[test]
    fn entry_without_deadline_never_expires() {
        let entry = StoredEntry::new(b"v".to_vec(), None);
        assert!(!entry.is_expired().unwrap());
    }

    #[test]
    fn entry_with_past_deadline_is_expired() {
        let entry = StoredEntry::new(b"v".to_vec(), Some(1));
        assert!(entry.is_expired().unwrap());
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let deadline = now_epoch_millis().unwrap() + 60_000;
        let entry = StoredEntry::new(vec![0, 159, 146, 150], Some(deadline));
        let json = serde_json::to_vec(&entry).unwrap();
        let back: StoredEntry = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.value, entry.value);
        assert_eq!(back.expires_at, Some(deadline));
    }
}
