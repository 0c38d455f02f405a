//! Redis filter store against a live server.
//!
//! Ignored by default. Run with a server at `REDIS_URL`:
//! `cargo test -p user-service --test redis_filter_store_test -- --ignored`

use chrono::Utc;
use redis::{aio::ConnectionManager, AsyncCommands};
use uuid::Uuid;

use user_service_lib::filter::{FilterMetadata, FilterParams, FilterStore, FilterStoreError, RedisFilterStore};
use user_service_lib::infra::redis::connect;

struct TestFilter {
    store: RedisFilterStore,
    connection: ConnectionManager,
    key: String,
    meta_key: String,
}

impl TestFilter {
    async fn new() -> Self {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let connection = connect(&url).await.unwrap();
        // Already tagged, so the store uses it unchanged
        let key = format!("{{filter-test-{}}}", Uuid::new_v4());
        let meta_key = format!("{}:meta", key);

        Self {
            store: RedisFilterStore::new(connection.clone(), key.clone()),
            connection,
            key,
            meta_key,
        }
    }

    async fn cleanup(mut self) {
        let _: () = self.connection.del(&[&self.key, &self.meta_key]).await.unwrap();
    }
}

fn metadata(capacity: u64) -> FilterMetadata {
    FilterMetadata {
        capacity,
        error_rate: 0.01,
        params: FilterParams::optimal(capacity, 0.01).unwrap(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[ignore]
async fn test_reserve_is_idempotent() {
    let filter = TestFilter::new().await;
    assert!(filter.store.probe().await.unwrap().is_none());

    let first = metadata(1000);
    assert!(filter.store.reserve(&first).await.unwrap());
    assert!(!filter.store.reserve(&metadata(50_000)).await.unwrap());

    let info = filter.store.probe().await.unwrap().unwrap();
    assert_eq!(info.metadata.params, first.params);
    assert_eq!(info.metadata.capacity, 1000);
    assert_eq!(info.items, 0);

    filter.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_set_then_test_bits() {
    let filter = TestFilter::new().await;
    let meta = metadata(1000);
    let params = meta.params;
    filter.store.reserve(&meta).await.unwrap();

    let alice = params.positions("alice");
    assert!(!filter.store.test_bits(params, &alice).await.unwrap());
    assert!(filter.store.set_bits(params, &alice).await.unwrap());
    // Second insert flips nothing and is not counted
    assert!(!filter.store.set_bits(params, &alice).await.unwrap());
    assert!(filter.store.test_bits(params, &alice).await.unwrap());

    assert_eq!(filter.store.probe().await.unwrap().unwrap().items, 1);

    filter.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_cleared_filter_is_not_provisioned() {
    let filter = TestFilter::new().await;
    let meta = metadata(1000);
    let params = meta.params;
    filter.store.reserve(&meta).await.unwrap();
    filter.store.clear().await.unwrap();

    let positions = params.positions("alice");
    assert!(filter.store.probe().await.unwrap().is_none());
    assert!(matches!(
        filter.store.set_bits(params, &positions).await,
        Err(FilterStoreError::NotProvisioned)
    ));
    assert!(matches!(
        filter.store.test_bits(params, &positions).await,
        Err(FilterStoreError::NotProvisioned)
    ));

    filter.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_layout_mismatch_reports_stored_layout() {
    let filter = TestFilter::new().await;
    let stored = metadata(1000);
    filter.store.reserve(&stored).await.unwrap();

    let other = FilterParams::optimal(5000, 0.01).unwrap();
    let result = filter.store.test_bits(other, &other.positions("alice")).await;

    match result {
        Err(FilterStoreError::LayoutMismatch { expected, found }) => {
            assert_eq!(expected, other);
            assert_eq!(found, stored.params);
        }
        unexpected => panic!("expected layout mismatch, got {:?}", unexpected),
    }

    filter.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_wrong_type_under_meta_key_is_an_error() {
    let mut filter = TestFilter::new().await;
    let _: () = filter.connection.set(&filter.meta_key, "not a hash").await.unwrap();

    assert!(filter.store.probe().await.is_err());

    filter.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_bitmap_without_metadata_is_corrupt() {
    let mut filter = TestFilter::new().await;
    let _: () = filter.connection.setbit(&filter.key, 7, true).await.unwrap();

    assert!(matches!(
        filter.store.probe().await,
        Err(FilterStoreError::Corrupt(_))
    ));

    filter.cleanup().await;
}
