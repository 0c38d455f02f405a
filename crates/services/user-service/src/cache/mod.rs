//! Result cache for expensive read views.
//!
//! Entries have no TTL. Each view declares which mutations make it stale,
//! and the mutation path invalidates it after the write commits.

mod result_cache;
mod store;

pub use result_cache::{CachedView, MutationEvent, ResultCache};
pub use store::{CacheStore, MemoryCacheStore, RedisCacheStore};

#[cfg(any(test, feature = "test-utils"))]
pub use store::MockCacheStore;
