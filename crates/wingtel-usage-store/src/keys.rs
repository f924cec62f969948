//! Key encoding utilities for `RocksDB`.
//!
//! Aggregate keys are laid out so that byte order equals
//! [`AggregateKey`] order:
//!
//! `subscription_id (8 bytes BE) || usage_type tag (1 byte) || day (4 bytes)`
//!
//! The day is days-from-CE as `i32` with the sign bit flipped, so dates sort
//! correctly as unsigned bytes.

use chrono::{Datelike, NaiveDate};
use wingtel_usage_core::{AggregateKey, RecordId, SubscriptionId, UsageType};

use crate::error::{Result, StoreError};

/// Length of an encoded aggregate key.
pub const AGGREGATE_KEY_LEN: usize = 13;

const SIGN_BIT: u32 = 0x8000_0000;

/// Create a record key from a record ID.
#[must_use]
pub fn record_key(id: &RecordId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Create an aggregate key.
#[must_use]
pub fn aggregate_key(key: &AggregateKey) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(AGGREGATE_KEY_LEN);
    bytes.extend_from_slice(&key.subscription_id.to_be_bytes());
    bytes.push(key.usage_type.tag());
    bytes.extend_from_slice(&encode_day(key.usage_date));
    bytes
}

/// Prefix covering every aggregate row of a subscription, optionally
/// narrowed to one usage type.
#[must_use]
pub fn aggregate_prefix(subscription_id: SubscriptionId, usage_type: Option<UsageType>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(9);
    bytes.extend_from_slice(&subscription_id.to_be_bytes());
    if let Some(usage_type) = usage_type {
        bytes.push(usage_type.tag());
    }
    bytes
}

/// Decode an aggregate key.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if the key is malformed.
pub fn decode_aggregate_key(bytes: &[u8]) -> Result<AggregateKey> {
    let malformed = || StoreError::Serialization(format!("malformed aggregate key: {bytes:02x?}"));

    if bytes.len() != AGGREGATE_KEY_LEN {
        return Err(malformed());
    }

    let mut sub = [0u8; 8];
    sub.copy_from_slice(&bytes[..8]);
    let usage_type = UsageType::from_tag(bytes[8]).ok_or_else(malformed)?;
    let mut day = [0u8; 4];
    day.copy_from_slice(&bytes[9..]);

    Ok(AggregateKey {
        subscription_id: SubscriptionId(u64::from_be_bytes(sub)),
        usage_type,
        usage_date: decode_day(day).ok_or_else(malformed)?,
    })
}

#[allow(clippy::cast_sign_loss)]
fn encode_day(day: NaiveDate) -> [u8; 4] {
    ((day.num_days_from_ce() as u32) ^ SIGN_BIT).to_be_bytes()
}

#[allow(clippy::cast_possible_wrap)]
fn decode_day(bytes: [u8; 4]) -> Option<NaiveDate> {
    let days = (u32::from_be_bytes(bytes) ^ SIGN_BIT) as i32;
    NaiveDate::from_num_days_from_ce_opt(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sub: u64, usage_type: UsageType, y: i32, m: u32, d: u32) -> AggregateKey {
        AggregateKey {
            subscription_id: SubscriptionId(sub),
            usage_type,
            usage_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
        }
    }

    #[test]
    fn record_key_length() {
        assert_eq!(record_key(&RecordId::generate()).len(), 16);
    }

    #[test]
    fn aggregate_key_roundtrip() {
        let k = key(7, UsageType::Voice, 2024, 1, 1);
        let encoded = aggregate_key(&k);
        assert_eq!(encoded.len(), AGGREGATE_KEY_LEN);
        assert_eq!(decode_aggregate_key(&encoded).unwrap(), k);
    }

    #[test]
    fn byte_order_matches_key_order() {
        let mut keys = vec![
            key(2, UsageType::Data, 2023, 12, 31),
            key(1, UsageType::Voice, 2020, 1, 1),
            key(1, UsageType::Data, 2024, 2, 29),
            key(1, UsageType::Data, -5, 6, 1),
            key(1, UsageType::Data, 2024, 1, 1),
        ];
        let mut encoded: Vec<_> = keys.iter().map(aggregate_key).collect();
        keys.sort();
        encoded.sort();
        let decoded: Vec<_> = encoded
            .iter()
            .map(|b| decode_aggregate_key(b).unwrap())
            .collect();
        assert_eq!(decoded, keys);
    }

    #[test]
    fn prefix_matches_subscription_rows() {
        let k = key(9, UsageType::Data, 2024, 5, 5);
        let encoded = aggregate_key(&k);
        assert!(encoded.starts_with(&aggregate_prefix(SubscriptionId(9), None)));
        assert!(encoded.starts_with(&aggregate_prefix(SubscriptionId(9), Some(UsageType::Data))));
        assert!(!encoded.starts_with(&aggregate_prefix(SubscriptionId(9), Some(UsageType::Voice))));
    }

    #[test]
    fn rejects_short_keys() {
        assert!(decode_aggregate_key(&[0u8; 5]).is_err());
    }
}
