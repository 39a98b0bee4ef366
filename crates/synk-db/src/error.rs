//! Error types for the storage layer.
//!
//! All storage failures are propagated via [`StoreError`]. Lookups of
//! absent keys always surface as [`StoreError::NotFound`]; there is no
//! default-value fallback anywhere in this crate.

use std::path::PathBuf;

/// Errors that can occur in a backing store, the tiered store or the journal.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A key was not found.
    #[error("Key not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// A fan-out write reached some tiers but not all of them.
    ///
    /// Tiers listed in `succeeded` already hold the new value; tiers after
    /// `failed_tier` were never attempted. Nothing is rolled back.
    #[error("Partial write of {key}: tier {failed_tier} failed after {succeeded:?} succeeded: {source}")]
    PartialWrite {
        /// Key being written.
        key: String,
        /// Tier whose write failed.
        failed_tier: String,
        /// Tiers written before the failure, in priority order.
        succeeded: Vec<String>,
        /// The failing tier's error.
        source: Box<StoreError>,
    },

    /// A backend rejected the operation.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Reading or writing a file-backed store failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a [`StoreError::NotFound`] for `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Returns true if this is a missing-key error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_write_names_tiers() {
        let err = StoreError::PartialWrite {
            key: "x".to_owned(),
            failed_tier: "local".to_owned(),
            succeeded: vec!["cache".to_owned()],
            source: Box::new(StoreError::Backend("disk full".to_owned())),
        };
        let msg = err.to_string();
        assert!(msg.contains("local"));
        assert!(msg.contains("cache"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn not_found_helper() {
        let err = StoreError::not_found("episode");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Key not found: episode");
    }
}
