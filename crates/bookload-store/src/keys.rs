//! Key encoding utilities for `RocksDB`.
//!
//! Identifiers never contain NUL bytes, so `0x00` separates key components and a
//! `component || 0x00` prefix selects exactly one entity.

use bookload_core::{CustomerId, FactKey, RunId};
use chrono::{Datelike, NaiveDate};

use crate::TableName;

const SEPARATOR: u8 = 0;

fn joined(first: &[u8], second: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(first.len() + 1 + second.len());
    key.extend_from_slice(first);
    key.push(SEPARATOR);
    key.extend_from_slice(second);
    key
}

/// Encode a date so that byte order matches date order.
///
/// Format: days from CE as big-endian `i32` with the sign bit flipped.
#[must_use]
pub fn date_bytes(date: NaiveDate) -> [u8; 4] {
    #[allow(clippy::cast_sign_loss)]
    let biased = (date.num_days_from_ce() as u32) ^ 0x8000_0000;
    biased.to_be_bytes()
}

/// Create a fact row key.
#[must_use]
pub fn fact_key(key: &FactKey) -> Vec<u8> {
    joined(key.booking_type.as_ref(), key.customer_id.as_ref())
}

/// Create a dimension version key.
///
/// Format: `customer_id || 0x00 || date_bytes(valid_from)`
#[must_use]
pub fn dimension_key(customer_id: &CustomerId, valid_from: NaiveDate) -> Vec<u8> {
    joined(customer_id.as_ref(), &date_bytes(valid_from))
}

/// Create a prefix for iterating all versions of a customer.
#[must_use]
pub fn customer_prefix(customer_id: &CustomerId) -> Vec<u8> {
    joined(customer_id.as_ref(), &[])
}

/// Create a run-ledger key.
#[must_use]
pub fn applied_run_key(table: TableName, run_id: &RunId) -> Vec<u8> {
    joined(table.as_str().as_bytes(), run_id.as_ref())
}

/// Create a prefix for iterating a table's ledger.
#[must_use]
pub fn applied_runs_prefix(table: TableName) -> Vec<u8> {
    joined(table.as_str().as_bytes(), &[])
}

/// Create a table marker key.
#[must_use]
pub fn table_key(table: TableName) -> Vec<u8> {
    table.as_str().as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookload_core::BookingType;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_bytes_preserve_order() {
        let dates = [
            NaiveDate::MIN,
            date(-1, 12, 31),
            date(1, 1, 1),
            date(2024, 1, 31),
            date(2024, 2, 1),
            NaiveDate::MAX,
        ];
        for pair in dates.windows(2) {
            assert!(date_bytes(pair[0]) < date_bytes(pair[1]), "{pair:?}");
        }
    }

    #[test]
    fn customer_prefix_does_not_match_longer_ids() {
        let c1 = CustomerId::new("C1").unwrap();
        let c10 = CustomerId::new("C10").unwrap();
        let key = dimension_key(&c10, date(2024, 1, 1));
        assert!(!key.starts_with(&customer_prefix(&c1)));
        assert!(key.starts_with(&customer_prefix(&c10)));
    }

    #[test]
    fn fact_key_format() {
        let key = FactKey::new(
            BookingType::new("flight").unwrap(),
            CustomerId::new("C1").unwrap(),
        );
        assert_eq!(fact_key(&key), b"flight\0C1".to_vec());
    }

    #[test]
    fn ledger_keys_scoped_by_table() {
        let run = RunId::new("2024-02-01").unwrap();
        let key = applied_run_key(TableName::FactAggregate, &run);
        assert!(key.starts_with(&applied_runs_prefix(TableName::FactAggregate)));
        assert!(!key.starts_with(&applied_runs_prefix(TableName::CustomerDimension)));
    }
}
