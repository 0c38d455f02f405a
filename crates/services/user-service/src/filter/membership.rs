//! Probabilistic membership filter for one identifier kind.
//!
//! Answers "definitely never inserted" or "possibly inserted". An identifier
//! is inserted only after the row holding it is committed, so
//! [`Membership::DefinitelyAbsent`] always means the identifier is free.
//! Any store failure surfaces as [`AppError::FilterUnavailable`] and is never
//! reported as absent.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{AppError, AppResult, FilterConfig};
use domain::{Identifier, IdentifierKind};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::params::FilterParams;
use super::store::{FilterInfo, FilterMetadata, FilterStore, FilterStoreError};

/// Outcome of a membership test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    /// Never inserted. Exact.
    DefinitelyAbsent,
    /// Inserted, or a false positive.
    PossiblyPresent,
}

/// A provisioned filter bound to its store.
pub struct MembershipFilter {
    kind: IdentifierKind,
    store: Arc<dyn FilterStore>,
    metadata: FilterMetadata,
    /// Call timeout and retry policy
    config: FilterConfig,
    /// Item count seen at startup plus insertions made by this process
    items_seen: AtomicU64,
    saturation_reported: AtomicBool,
}

impl MembershipFilter {
    /// Attach to the filter in `store`, provisioning it if it does not exist.
    ///
    /// Safe to call from several instances at once: exactly one reserve
    /// succeeds and everyone else adopts the stored layout. An existing
    /// filter is never reset. Transient store failures are retried with
    /// exponential backoff; anything else fails with
    /// [`AppError::Initialization`].
    pub async fn initialize(
        kind: IdentifierKind,
        store: Arc<dyn FilterStore>,
        config: &FilterConfig,
    ) -> AppResult<Self> {
        let params = FilterParams::optimal(config.capacity, config.error_rate)
            .map_err(|e| AppError::initialization(format!("{} filter: {}", kind, e)))?;
        let timeout = config.timeout();
        let attempts = config.init_attempts.max(1);

        let mut attempt = 0;
        let info = loop {
            attempt += 1;
            match provision(store.as_ref(), config, params, timeout).await {
                Ok(info) => break info,
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = config.backoff(attempt);
                    warn!(
                        filter = %kind,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Filter store unavailable during initialization, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(AppError::initialization(format!(
                        "{} filter after {} attempt(s): {}",
                        kind, attempt, e
                    )));
                }
            }
        };

        if info.metadata.params != params {
            warn!(
                filter = %kind,
                stored_capacity = info.metadata.capacity,
                stored_error_rate = info.metadata.error_rate,
                configured_capacity = config.capacity,
                configured_error_rate = config.error_rate,
                "Existing filter layout differs from configuration; keeping stored layout"
            );
        }

        info!(
            filter = %kind,
            bits = info.metadata.params.bits,
            hashes = info.metadata.params.hashes,
            items = info.items,
            "Membership filter ready"
        );

        Ok(Self::attach(kind, store, info, config))
    }

    /// Drop the stored filter and rebuild it from `identifiers` with the
    /// configured layout.
    ///
    /// Writers must be paused while this runs: an identifier committed
    /// between the clear and its own re-insertion would test as absent.
    pub async fn reprovision<I>(
        kind: IdentifierKind,
        store: Arc<dyn FilterStore>,
        config: &FilterConfig,
        identifiers: I,
    ) -> AppResult<Self>
    where
        I: IntoIterator<Item = Identifier>,
    {
        let params = FilterParams::optimal(config.capacity, config.error_rate)
            .map_err(|e| AppError::validation(format!("{} filter: {}", kind, e)))?;
        let timeout = config.timeout();
        let unavailable = |e: FilterStoreError| AppError::filter_unavailable(format!("{} filter: {}", kind, e));

        bounded(timeout, store.clear()).await.map_err(unavailable)?;

        let metadata = FilterMetadata {
            capacity: config.capacity,
            error_rate: config.error_rate,
            params,
            created_at: Utc::now(),
        };
        if !bounded(timeout, store.reserve(&metadata)).await.map_err(unavailable)? {
            return Err(AppError::filter_unavailable(format!(
                "{} filter was re-created by another process during rebuild",
                kind
            )));
        }

        let filter = Self::attach(kind, store, FilterInfo { metadata, items: 0 }, config);
        let mut count = 0u64;
        for identifier in identifiers {
            filter.insert(&identifier).await?;
            count += 1;
        }

        info!(filter = %kind, items = count, bits = params.bits, hashes = params.hashes, "Membership filter rebuilt");
        Ok(filter)
    }

    fn attach(kind: IdentifierKind, store: Arc<dyn FilterStore>, info: FilterInfo, config: &FilterConfig) -> Self {
        Self {
            kind,
            store,
            items_seen: AtomicU64::new(info.items),
            saturation_reported: AtomicBool::new(false),
            metadata: info.metadata,
            config: config.clone(),
        }
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    pub fn metadata(&self) -> &FilterMetadata {
        &self.metadata
    }

    /// Record an identifier. Idempotent; only call after the owning row is
    /// committed.
    ///
    /// Transient store failures are retried with the provisioning backoff,
    /// since a committed identifier missing from the filter would test as
    /// absent.
    pub async fn insert(&self, identifier: &Identifier) -> AppResult<()> {
        self.check_kind(identifier)?;
        let params = self.metadata.params;
        let positions = params.positions(identifier.as_str());
        let attempts = self.config.init_attempts.max(1);

        let mut attempt = 0;
        let flipped = loop {
            attempt += 1;
            match bounded(self.config.timeout(), self.store.set_bits(params, &positions)).await {
                Ok(flipped) => break flipped,
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        filter = %self.kind,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Membership filter insert failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(self.unavailable("insert", e)),
            }
        };

        if flipped {
            let items = self.items_seen.fetch_add(1, Ordering::Relaxed) + 1;
            if items > self.metadata.capacity && !self.saturation_reported.swap(true, Ordering::Relaxed) {
                warn!(
                    filter = %self.kind,
                    items,
                    capacity = self.metadata.capacity,
                    estimated_error_rate = params.estimated_error_rate(items),
                    "Membership filter is past capacity; false positives will rise until it is rebuilt"
                );
            }
        }

        debug!(filter = %self.kind, new = flipped, "Identifier added to membership filter");
        Ok(())
    }

    /// Test an identifier.
    pub async fn test(&self, identifier: &Identifier) -> AppResult<Membership> {
        self.check_kind(identifier)?;
        let params = self.metadata.params;
        let positions = params.positions(identifier.as_str());

        let all_set = bounded(self.config.timeout(), self.store.test_bits(params, &positions))
            .await
            .map_err(|e| self.unavailable("test", e))?;

        Ok(if all_set {
            Membership::PossiblyPresent
        } else {
            Membership::DefinitelyAbsent
        })
    }

    /// Current metadata and item count as the store reports them.
    pub async fn status(&self) -> AppResult<FilterInfo> {
        bounded(self.config.timeout(), self.store.probe())
            .await
            .map_err(|e| self.unavailable("status", e))?
            .ok_or_else(|| self.unavailable("status", FilterStoreError::NotProvisioned))
    }

    fn check_kind(&self, identifier: &Identifier) -> AppResult<()> {
        if identifier.kind() != self.kind {
            return Err(AppError::internal(format!(
                "{} identifier routed to the {} filter",
                identifier.kind(),
                self.kind
            )));
        }
        Ok(())
    }

    fn unavailable(&self, operation: &str, err: FilterStoreError) -> AppError {
        warn!(filter = %self.kind, operation, error = %err, "Membership filter call failed");
        AppError::filter_unavailable(format!("{} filter {}: {}", self.kind, operation, err))
    }
}

/// Probe, reserve if absent, and re-probe if another instance won the race.
async fn provision(
    store: &dyn FilterStore,
    config: &FilterConfig,
    params: FilterParams,
    timeout: Duration,
) -> Result<FilterInfo, FilterStoreError> {
    if let Some(info) = bounded(timeout, store.probe()).await? {
        return Ok(info);
    }

    let metadata = FilterMetadata {
        capacity: config.capacity,
        error_rate: config.error_rate,
        params,
        created_at: Utc::now(),
    };
    if bounded(timeout, store.reserve(&metadata)).await? {
        info!(capacity = config.capacity, error_rate = config.error_rate, "Provisioned new membership filter");
        return Ok(FilterInfo { metadata, items: 0 });
    }

    bounded(timeout, store.probe())
        .await?
        .ok_or(FilterStoreError::NotProvisioned)
}

async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, FilterStoreError>
where
    F: Future<Output = Result<T, FilterStoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| FilterStoreError::Timeout(limit))?
}
