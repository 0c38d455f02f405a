//! Filter layout: bit-array size, hash count, and bit positions.
//!
//! Formulas for capacity `n` and false-positive rate `p`:
//! - m = -n·ln(p) / (ln 2)²
//! - k = (m / n)·ln 2
//!
//! Positions use double hashing over two seeded MurmurHash3 digests:
//! `pos(i) = h1 + i·h2 mod m`.

use std::f64::consts::LN_2;
use std::io::Cursor;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest bit offset a Redis bitmap can address (512 MiB string).
pub const MAX_FILTER_BITS: u64 = 1 << 32;

/// Hash function count bounds.
const MIN_HASHES: u32 = 1;
const MAX_HASHES: u32 = 32;

/// Rejected provisioning parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamsError {
    #[error("filter capacity must be greater than zero")]
    ZeroCapacity,

    #[error("filter error rate must be in (0, 1), got {0}")]
    ErrorRateOutOfRange(f64),

    #[error("filter needs {0} bits, more than the 2^32 a store can address")]
    TooLarge(u64),
}

/// Fixed layout of a provisioned filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterParams {
    /// Number of bits (m)
    pub bits: u64,
    /// Number of hash functions (k)
    pub hashes: u32,
}

impl FilterParams {
    /// Optimal layout for `capacity` items at `error_rate`.
    pub fn optimal(capacity: u64, error_rate: f64) -> Result<Self, ParamsError> {
        if capacity == 0 {
            return Err(ParamsError::ZeroCapacity);
        }
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(ParamsError::ErrorRateOutOfRange(error_rate));
        }

        let n = capacity as f64;
        let bits = (-n * error_rate.ln() / (LN_2 * LN_2)).ceil() as u64;
        if bits > MAX_FILTER_BITS {
            return Err(ParamsError::TooLarge(bits));
        }

        let hashes = ((bits as f64 / n) * LN_2).round() as u32;

        Ok(Self {
            bits: bits.max(1),
            hashes: hashes.clamp(MIN_HASHES, MAX_HASHES),
        })
    }

    /// The `k` bit offsets for an item. Deterministic for a given layout.
    pub fn positions(&self, item: &str) -> Vec<u64> {
        let h1 = murmur(item.as_bytes(), 0);
        let h2 = murmur(item.as_bytes(), 1);

        (0..u64::from(self.hashes))
            .map(|i| h1.wrapping_add(i.wrapping_mul(h2)) % self.bits)
            .collect()
    }

    /// Expected false-positive rate after `items` insertions:
    /// (1 - e^(-k·n/m))^k
    pub fn estimated_error_rate(&self, items: u64) -> f64 {
        let k = f64::from(self.hashes);
        let exponent = -k * items as f64 / self.bits as f64;
        (1.0 - exponent.exp()).powf(k)
    }
}

/// Lower 64 bits of the 128-bit x64 MurmurHash3 digest.
fn murmur(bytes: &[u8], seed: u32) -> u64 {
    // Reading from an in-memory cursor cannot fail
    murmur3::murmur3_x64_128(&mut Cursor::new(bytes), seed).unwrap_or(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let params = FilterParams::optimal(100_000, 0.01).unwrap();
        assert_eq!(params.bits, 958_506);
        assert_eq!(params.hashes, 7);
    }

    #[test]
    fn test_invalid_parameters() {
        assert_eq!(FilterParams::optimal(0, 0.01), Err(ParamsError::ZeroCapacity));
        assert!(matches!(
            FilterParams::optimal(1000, 0.0),
            Err(ParamsError::ErrorRateOutOfRange(_))
        ));
        assert!(matches!(
            FilterParams::optimal(1000, 1.0),
            Err(ParamsError::ErrorRateOutOfRange(_))
        ));
        assert!(matches!(
            FilterParams::optimal(1000, f64::NAN),
            Err(ParamsError::ErrorRateOutOfRange(_))
        ));
        assert!(matches!(
            FilterParams::optimal(u64::MAX / 2, 0.0001),
            Err(ParamsError::TooLarge(_))
        ));
    }

    #[test]
    fn test_positions_deterministic_and_in_range() {
        let params = FilterParams::optimal(10_000, 0.01).unwrap();
        let a = params.positions("alice");
        let b = params.positions("alice");

        assert_eq!(a, b);
        assert_eq!(a.len(), params.hashes as usize);
        assert!(a.iter().all(|&pos| pos < params.bits));
        assert_ne!(a, params.positions("alicf"));
    }

    #[test]
    fn test_estimated_rate_at_capacity_matches_target() {
        let params = FilterParams::optimal(100_000, 0.01).unwrap();
        let rate = params.estimated_error_rate(100_000);
        assert!(rate < 0.0102, "rate at capacity was {}", rate);
        assert!(params.estimated_error_rate(400_000) > 0.1);
        assert_eq!(params.estimated_error_rate(0), 0.0);
    }
}
