//! Error types for pool store operations.
//!
//! Backends map their internal errors into these variants so allocators can
//! tell a lost race (retry) from everything else (give up) without knowing the
//! concrete backend.

use std::time::Duration;

use ipam_core::{PoolKey, ResourceVersion};

/// Error type for all pool store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The pool does not exist.
    #[error("pool not found: {key}")]
    NotFound {
        /// Key that was looked up.
        key: PoolKey,
    },

    /// Optimistic concurrency conflict: the pool changed since it was read.
    #[error("pool {key}: version {expected} is stale{}", current_suffix(.current.as_ref()))]
    Conflict {
        /// Pool that was written.
        key: PoolKey,
        /// Version the writer read.
        expected: String,
        /// Version currently stored, when the backend reports it.
        current: Option<ResourceVersion>,
    },

    /// Backend connection failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Stored data could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend call exceeded its timeout.
    #[error("timeout: {operation} after {duration:?}")]
    Timeout {
        /// Name of the operation that timed out.
        operation: String,
        /// How long was waited before giving up.
        duration: Duration,
    },

    /// Catch-all backend error.
    #[error("internal error: {0}")]
    Internal(String),
}

fn current_suffix(current: Option<&ResourceVersion>) -> String {
    current.map_or_else(String::new, |v| format!(" (current {v})"))
}

impl StoreError {
    /// Convenience constructor for [`StoreError::NotFound`].
    pub fn not_found(key: &PoolKey) -> Self {
        Self::NotFound { key: key.clone() }
    }

    /// Convenience constructor for [`StoreError::Conflict`].
    pub fn conflict(
        key: &PoolKey,
        expected: Option<&ResourceVersion>,
        current: Option<ResourceVersion>,
    ) -> Self {
        Self::Conflict {
            key: key.clone(),
            expected: expected.map_or_else(|| "<none>".to_owned(), ToString::to_string),
            current,
        }
    }

    /// Convenience constructor for [`StoreError::Timeout`].
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether this is a lost optimistic-concurrency race.
    ///
    /// Only conflicts are worth re-reading and retrying; every other error is
    /// surfaced to the caller as-is.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether this error means the pool does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
