//! Redis filter store.
//!
//! Layout per filter key:
//! - `{key}`: bitmap of `m` bits (SETBIT/GETBIT)
//! - `{key}:meta`: hash with capacity, error_rate, bits, hashes, created_at, items
//!
//! Both names share a hash tag so they land in one cluster slot. Reserve,
//! set and test each run as one Lua script, so Redis executes them
//! atomically and a completed insert is visible to every later test.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};

use super::params::FilterParams;
use super::store::{FilterInfo, FilterMetadata, FilterStore, FilterStoreError};

/// Allocates only when neither key exists.
const RESERVE_SCRIPT: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 1 or redis.call("EXISTS", KEYS[2]) == 1 then
        return 0
    end
    redis.call("HSET", KEYS[2],
        "capacity", ARGV[1], "error_rate", ARGV[2], "bits", ARGV[3],
        "hashes", ARGV[4], "created_at", ARGV[5], "items", 0)
    redis.call("SETBIT", KEYS[1], tonumber(ARGV[3]) - 1, 0)
    return 1
"#;

/// Returns -1 when unprovisioned, -2 on layout mismatch, else 1 if any bit flipped.
const SET_SCRIPT: &str = r#"
    local bits = redis.call("HGET", KEYS[2], "bits")
    if not bits then return -1 end
    if bits ~= ARGV[1] or redis.call("HGET", KEYS[2], "hashes") ~= ARGV[2] then return -2 end
    local flipped = 0
    for i = 3, #ARGV do
        if redis.call("SETBIT", KEYS[1], ARGV[i], 1) == 0 then flipped = 1 end
    end
    if flipped == 1 then redis.call("HINCRBY", KEYS[2], "items", 1) end
    return flipped
"#;

/// Returns -1 when unprovisioned, -2 on layout mismatch, else 1 if all bits set.
const TEST_SCRIPT: &str = r#"
    local bits = redis.call("HGET", KEYS[2], "bits")
    if not bits then return -1 end
    if bits ~= ARGV[1] or redis.call("HGET", KEYS[2], "hashes") ~= ARGV[2] then return -2 end
    for i = 3, #ARGV do
        if redis.call("GETBIT", KEYS[1], ARGV[i]) == 0 then return 0 end
    end
    return 1
"#;

/// Filter store addressed by a single Redis key.
#[derive(Clone)]
pub struct RedisFilterStore {
    connection: ConnectionManager,
    key: String,
    meta_key: String,
}

impl RedisFilterStore {
    pub fn new(connection: ConnectionManager, key: impl Into<String>) -> Self {
        let key = hash_tagged(key.into());
        let meta_key = format!("{}:meta", key);
        Self {
            connection,
            key,
            meta_key,
        }
    }

    async fn run_bit_script(
        &self,
        script: &str,
        params: FilterParams,
        positions: &[u64],
    ) -> Result<bool, FilterStoreError> {
        let mut conn = self.connection.clone();
        let result: i64 = redis::cmd("EVAL")
            .arg(script)
            .arg(2)
            .arg(&self.key)
            .arg(&self.meta_key)
            .arg(params.bits)
            .arg(params.hashes)
            .arg(positions)
            .query_async(&mut conn)
            .await?;

        match result {
            -1 => Err(FilterStoreError::NotProvisioned),
            -2 => Err(self.layout_mismatch(params).await),
            flag => Ok(flag == 1),
        }
    }

    async fn layout_mismatch(&self, expected: FilterParams) -> FilterStoreError {
        match self.probe().await {
            Ok(Some(info)) => FilterStoreError::LayoutMismatch {
                expected,
                found: info.metadata.params,
            },
            Ok(None) => FilterStoreError::NotProvisioned,
            Err(e) => e,
        }
    }
}

#[async_trait]
impl FilterStore for RedisFilterStore {
    async fn probe(&self) -> Result<Option<FilterInfo>, FilterStoreError> {
        let mut conn = self.connection.clone();
        let (fields, bitmap_exists): (HashMap<String, String>, bool) = redis::pipe()
            .atomic()
            .hgetall(&self.meta_key)
            .exists(&self.key)
            .query_async(&mut conn)
            .await?;

        match (fields.is_empty(), bitmap_exists) {
            (true, false) => Ok(None),
            (true, true) => Err(FilterStoreError::Corrupt(format!(
                "key '{}' exists without filter metadata",
                self.key
            ))),
            (false, false) => Err(FilterStoreError::Corrupt(format!(
                "metadata '{}' exists without a bit array",
                self.meta_key
            ))),
            (false, true) => parse_info(&fields).map(Some),
        }
    }

    async fn reserve(&self, metadata: &FilterMetadata) -> Result<bool, FilterStoreError> {
        let mut conn = self.connection.clone();
        let created: i64 = redis::cmd("EVAL")
            .arg(RESERVE_SCRIPT)
            .arg(2)
            .arg(&self.key)
            .arg(&self.meta_key)
            .arg(metadata.capacity)
            .arg(metadata.error_rate)
            .arg(metadata.params.bits)
            .arg(metadata.params.hashes)
            .arg(metadata.created_at.to_rfc3339())
            .query_async(&mut conn)
            .await?;

        Ok(created == 1)
    }

    async fn set_bits(
        &self,
        params: FilterParams,
        positions: &[u64],
    ) -> Result<bool, FilterStoreError> {
        self.run_bit_script(SET_SCRIPT, params, positions).await
    }

    async fn test_bits(
        &self,
        params: FilterParams,
        positions: &[u64],
    ) -> Result<bool, FilterStoreError> {
        self.run_bit_script(TEST_SCRIPT, params, positions).await
    }

    async fn clear(&self) -> Result<(), FilterStoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(&[&self.key, &self.meta_key]).await?;
        Ok(())
    }
}

/// Wrap `key` in a hash tag unless it already carries one.
fn hash_tagged(key: String) -> String {
    let tagged = key
        .find('{')
        .and_then(|open| key[open + 1..].find('}'))
        .is_some_and(|len| len > 0);
    if tagged {
        key
    } else {
        format!("{{{}}}", key)
    }
}

/// Decode the metadata hash.
fn parse_info(fields: &HashMap<String, String>) -> Result<FilterInfo, FilterStoreError> {
    fn field<T: std::str::FromStr>(
        fields: &HashMap<String, String>,
        name: &str,
    ) -> Result<T, FilterStoreError> {
        fields
            .get(name)
            .ok_or_else(|| FilterStoreError::Corrupt(format!("missing metadata field '{}'", name)))?
            .parse()
            .map_err(|_| FilterStoreError::Corrupt(format!("unreadable metadata field '{}'", name)))
    }

    let capacity = field(fields, "capacity")?;
    let error_rate = field(fields, "error_rate")?;
    let params = FilterParams {
        bits: field(fields, "bits")?,
        hashes: field(fields, "hashes")?,
    };
    let created_at: String = field(fields, "created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|_| FilterStoreError::Corrupt("unreadable metadata field 'created_at'".to_string()))?
        .with_timezone(&Utc);

    Ok(FilterInfo {
        metadata: FilterMetadata {
            capacity,
            error_rate,
            params,
            created_at,
        },
        items: field(fields, "items")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_info() {
        let info = parse_info(&fields(&[
            ("capacity", "100000"),
            ("error_rate", "0.01"),
            ("bits", "958506"),
            ("hashes", "7"),
            ("created_at", "2024-03-01T12:00:00+00:00"),
            ("items", "42"),
        ]))
        .unwrap();

        assert_eq!(info.metadata.capacity, 100_000);
        assert_eq!(info.metadata.error_rate, 0.01);
        assert_eq!(
            info.metadata.params,
            FilterParams {
                bits: 958_506,
                hashes: 7
            }
        );
        assert_eq!(info.items, 42);
        assert_eq!(info.metadata.created_at.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_parse_info_missing_field() {
        let err = parse_info(&fields(&[("capacity", "100000")])).unwrap_err();
        assert!(matches!(err, FilterStoreError::Corrupt(msg) if msg.contains("error_rate")));
    }

    #[test]
    fn test_parse_info_garbage_value() {
        let err = parse_info(&fields(&[
            ("capacity", "lots"),
            ("error_rate", "0.01"),
            ("bits", "958506"),
            ("hashes", "7"),
            ("created_at", "2024-03-01T12:00:00+00:00"),
            ("items", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, FilterStoreError::Corrupt(msg) if msg.contains("capacity")));
    }

    #[test]
    fn test_parse_info_bad_timestamp() {
        let err = parse_info(&fields(&[
            ("capacity", "100000"),
            ("error_rate", "0.01"),
            ("bits", "958506"),
            ("hashes", "7"),
            ("created_at", "yesterday"),
            ("items", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, FilterStoreError::Corrupt(msg) if msg.contains("created_at")));
    }

    #[test]
    fn test_keys_share_a_hash_tag() {
        assert_eq!(hash_tagged("usernames_bloom_filter".to_string()), "{usernames_bloom_filter}");
        assert_eq!(hash_tagged("app:{users}:names".to_string()), "app:{users}:names");
        assert_eq!(hash_tagged("odd{}key".to_string()), "{odd{}key}");
    }
}
