//! Membership filters for unique identifiers.
//!
//! Layers, bottom-up:
//! - [`params`]: sizing and bit positions
//! - [`store`]: the storage boundary, with Redis and in-process implementations
//! - [`membership`]: the filter used by the service layer

mod bitset;
mod local_store;
mod membership;
mod params;
mod redis_store;
mod store;

pub use local_store::LocalFilterStore;
pub use membership::{Membership, MembershipFilter};
pub use params::{FilterParams, ParamsError, MAX_FILTER_BITS};
pub use redis_store::RedisFilterStore;
pub use store::{FilterInfo, FilterMetadata, FilterStore, FilterStoreError};

#[cfg(any(test, feature = "test-utils"))]
pub use store::MockFilterStore;
