//! In-process filter store.
//!
//! Backed by an [`AtomicBitSet`]; the lock only guards provisioning and
//! clearing, bit updates run concurrently under the read guard.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::bitset::AtomicBitSet;
use super::params::FilterParams;
use super::store::{FilterInfo, FilterMetadata, FilterStore, FilterStoreError};

struct LocalFilter {
    metadata: FilterMetadata,
    bits: AtomicBitSet,
    items: AtomicU64,
}

impl LocalFilter {
    fn check_access(&self, params: FilterParams, positions: &[u64]) -> Result<(), FilterStoreError> {
        if self.metadata.params != params {
            return Err(FilterStoreError::LayoutMismatch {
                expected: params,
                found: self.metadata.params,
            });
        }
        if let Some(pos) = positions.iter().find(|&&pos| pos >= self.bits.len()) {
            return Err(FilterStoreError::Corrupt(format!(
                "bit position {} outside filter of {} bits",
                pos,
                self.bits.len()
            )));
        }
        Ok(())
    }
}

/// Non-durable filter store for tests and single-process development.
#[derive(Default)]
pub struct LocalFilterStore {
    filter: RwLock<Option<LocalFilter>>,
}

impl LocalFilterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FilterStore for LocalFilterStore {
    async fn probe(&self) -> Result<Option<FilterInfo>, FilterStoreError> {
        let guard = self.filter.read().await;
        Ok(guard.as_ref().map(|f| FilterInfo {
            metadata: f.metadata.clone(),
            items: f.items.load(Ordering::Relaxed),
        }))
    }

    async fn reserve(&self, metadata: &FilterMetadata) -> Result<bool, FilterStoreError> {
        let mut guard = self.filter.write().await;
        if guard.is_some() {
            return Ok(false);
        }

        *guard = Some(LocalFilter {
            metadata: metadata.clone(),
            bits: AtomicBitSet::new(metadata.params.bits),
            items: AtomicU64::new(0),
        });
        Ok(true)
    }

    async fn set_bits(
        &self,
        params: FilterParams,
        positions: &[u64],
    ) -> Result<bool, FilterStoreError> {
        let guard = self.filter.read().await;
        let filter = guard.as_ref().ok_or(FilterStoreError::NotProvisioned)?;
        filter.check_access(params, positions)?;

        let mut flipped = false;
        for &pos in positions {
            flipped |= !filter.bits.set(pos);
        }
        if flipped {
            filter.items.fetch_add(1, Ordering::Relaxed);
        }
        Ok(flipped)
    }

    async fn test_bits(
        &self,
        params: FilterParams,
        positions: &[u64],
    ) -> Result<bool, FilterStoreError> {
        let guard = self.filter.read().await;
        let filter = guard.as_ref().ok_or(FilterStoreError::NotProvisioned)?;
        filter.check_access(params, positions)?;

        Ok(positions.iter().all(|&pos| filter.bits.get(pos)))
    }

    async fn clear(&self) -> Result<(), FilterStoreError> {
        *self.filter.write().await = None;
        Ok(())
    }
}
