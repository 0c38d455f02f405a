//! Filter store boundary.
//!
//! A store holds exactly one filter (one logical key): its metadata record
//! and its bit array. Positions are computed by the caller, so every store
//! agrees on hashing. Each call carries the layout the caller initialized
//! with; a store whose stored layout differs, or whose metadata is gone,
//! rejects the call instead of answering from the wrong bits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::params::FilterParams;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Provisioning record, written once when the filter is reserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterMetadata {
    pub capacity: u64,
    pub error_rate: f64,
    pub params: FilterParams,
    pub created_at: DateTime<Utc>,
}

/// Probe result: metadata plus the approximate number of inserted items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterInfo {
    pub metadata: FilterMetadata,
    pub items: u64,
}

impl FilterInfo {
    /// True once more items were inserted than the filter was sized for.
    pub fn is_saturated(&self) -> bool {
        self.items > self.metadata.capacity
    }

    pub fn estimated_error_rate(&self) -> f64 {
        self.metadata.params.estimated_error_rate(self.items)
    }
}

/// Filter store failures.
#[derive(Debug, Error)]
pub enum FilterStoreError {
    #[error("filter store error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The filter key has no metadata (never reserved, or removed).
    #[error("filter is not provisioned")]
    NotProvisioned,

    /// The stored layout differs from the caller's (re-provisioned elsewhere).
    #[error("filter layout changed: expected {expected:?}, store has {found:?}")]
    LayoutMismatch {
        expected: FilterParams,
        found: FilterParams,
    },

    /// The store did not answer within the configured bound.
    #[error("filter store did not answer within {0:?}")]
    Timeout(Duration),

    /// Stored data exists but cannot be read as a filter.
    #[error("filter data is corrupt: {0}")]
    Corrupt(String),
}

impl FilterStoreError {
    /// Failures worth retrying: connection loss, I/O, timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            FilterStoreError::Timeout(_) => true,
            FilterStoreError::Redis(e) => {
                e.is_io_error() || e.is_connection_refusal() || e.is_timeout() || e.is_connection_dropped()
            }
            _ => false,
        }
    }
}

/// Durable, concurrency-safe storage for one filter.
///
/// Implementations must make a completed `set_bits` visible to every
/// `test_bits` that starts after it.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait FilterStore: Send + Sync {
    /// `Ok(None)` means the filter does not exist yet. Any other problem,
    /// including data of the wrong shape under the key, is an error.
    async fn probe(&self) -> Result<Option<FilterInfo>, FilterStoreError>;

    /// Allocate the filter. Returns `false` without touching anything if it
    /// already exists.
    async fn reserve(&self, metadata: &FilterMetadata) -> Result<bool, FilterStoreError>;

    /// Set bits at `positions`. Returns `true` if at least one bit flipped.
    async fn set_bits(
        &self,
        params: FilterParams,
        positions: &[u64],
    ) -> Result<bool, FilterStoreError>;

    /// True if every bit at `positions` is set.
    async fn test_bits(
        &self,
        params: FilterParams,
        positions: &[u64],
    ) -> Result<bool, FilterStoreError>;

    /// Remove the filter and its metadata.
    async fn clear(&self) -> Result<(), FilterStoreError>;
}
