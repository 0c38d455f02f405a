//! Cached read views and their invalidation rules.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use common::AppResult;

use super::store::CacheStore;

/// A state change that can make cached views stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationEvent {
    UserCreated,
    UserUpdated,
    UserRoleChanged,
    UserDeleted,
}

impl fmt::Display for MutationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationEvent::UserCreated => "user_created",
            MutationEvent::UserUpdated => "user_updated",
            MutationEvent::UserRoleChanged => "user_role_changed",
            MutationEvent::UserDeleted => "user_deleted",
        };
        f.write_str(name)
    }
}

/// Views held in the result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedView {
    /// Every user, as returned by the listing endpoint
    UserListing,
}

impl CachedView {
    pub const ALL: [CachedView; 1] = [CachedView::UserListing];

    pub fn key(&self) -> &'static str {
        match self {
            CachedView::UserListing => "users_list",
        }
    }

    /// Whether `event` makes this view stale.
    pub fn invalidated_by(&self, event: MutationEvent) -> bool {
        match self {
            // The listing shows every field of every user
            CachedView::UserListing => matches!(
                event,
                MutationEvent::UserCreated
                    | MutationEvent::UserUpdated
                    | MutationEvent::UserRoleChanged
                    | MutationEvent::UserDeleted
            ),
        }
    }
}

/// Read-through cache over a [`CacheStore`].
///
/// Cache trouble never fails a request: unreadable or unreachable entries
/// count as misses, and failed writes or invalidations are logged.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Return the cached view, or compute and cache it.
    pub async fn get_or_compute<T, F, Fut>(&self, view: CachedView, compute: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let key = view.key();

        match self.store.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    debug!(key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => warn!(key, error = %e, "Discarding unreadable cache entry"),
            },
            Ok(None) => debug!(key, "Cache miss"),
            Err(e) => warn!(key, error = %e, "Cache read failed, computing view"),
        }

        let value = compute().await?;

        match serde_json::to_string(&value) {
            Ok(json) => {
                if let Err(e) = self.store.set(key, json).await {
                    warn!(key, error = %e, "Failed to cache view");
                }
            }
            Err(e) => warn!(key, error = %e, "Failed to serialize view for caching"),
        }

        Ok(value)
    }

    /// Drop every view that `event` makes stale.
    pub async fn invalidate(&self, event: MutationEvent) {
        for view in CachedView::ALL.iter().filter(|view| view.invalidated_by(event)) {
            match self.store.delete(view.key()).await {
                Ok(()) => debug!(key = view.key(), %event, "Cache invalidated"),
                Err(e) => warn!(key = view.key(), %event, error = %e, "Cache invalidation failed"),
            }
        }
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }
}
