//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Fact aggregate rows, keyed by `booking_type || 0x00 || customer_id`.
    pub const FACT_ROWS: &str = "fact_rows";

    /// Dimension versions, keyed by `customer_id || 0x00 || valid_from`.
    /// Iterating a customer prefix yields its versions in `valid_from` order.
    pub const DIMENSION_ROWS: &str = "dimension_rows";

    /// Run ledger, keyed by `table || 0x00 || run_id`.
    pub const APPLIED_RUNS: &str = "applied_runs";

    /// Table existence markers, keyed by table name.
    pub const TABLE_META: &str = "table_meta";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::FACT_ROWS,
        cf::DIMENSION_ROWS,
        cf::APPLIED_RUNS,
        cf::TABLE_META,
    ]
}
