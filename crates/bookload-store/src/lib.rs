//! Table storage layer for bookload.
//!
//! The engine reads prior table state and writes new state through two traits,
//! [`TableReader`] and [`TableWriter`]. Every write covers exactly one table and is
//! applied atomically together with the run-ledger entry for that table, so a run is
//! either fully applied to a table or not at all.
//!
//! Two backends are provided:
//!
//! - [`MemoryStore`]: state behind `RwLock`s, for tests and embedding.
//! - `RocksStore` (feature `rocksdb-backend`): column families per table, one
//!   `WriteBatch` per table write.
//!
//! # Example
//!
//! ```
//! use bookload_store::{MemoryStore, TableReader};
//!
//! let store = MemoryStore::new();
//! assert!(store.read_fact_table().unwrap().is_none());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use bookload_core::{DimensionVersionRow, FactAggregateRow, RunId, VersionClose};

/// The two derived tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    /// Additive fact aggregate keyed by (booking type, customer).
    FactAggregate,
    /// SCD2 customer dimension.
    CustomerDimension,
}

impl TableName {
    /// Get the table name as a string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FactAggregate => "fact_aggregate",
            Self::CustomerDimension => "customer_dimension",
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The run a write belongs to, and a fingerprint of the input it was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStamp {
    /// The run.
    pub run_id: RunId,

    /// Content fingerprint of the run's input.
    pub fingerprint: String,
}

impl RunStamp {
    /// Create a stamp.
    #[must_use]
    pub fn new(run_id: RunId, fingerprint: impl Into<String>) -> Self {
        Self {
            run_id,
            fingerprint: fingerprint.into(),
        }
    }
}

/// Run-ledger entry: a run that has been applied to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRun {
    /// The run.
    pub run_id: RunId,

    /// Fingerprint of the input the run was computed from.
    pub fingerprint: String,

    /// Rows written or mutated by the run.
    pub rows: usize,

    /// When the write committed.
    pub applied_at: DateTime<Utc>,
}

/// Read access to table state.
pub trait TableReader: Send + Sync {
    /// Read the whole fact table.
    ///
    /// Returns `None` if the table has not been created yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn read_fact_table(&self) -> Result<Option<Vec<FactAggregateRow>>>;

    /// Read the whole dimension table.
    ///
    /// Returns `None` if the table has not been created yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn read_dimension_table(&self) -> Result<Option<Vec<DimensionVersionRow>>>;

    /// Look up the ledger entry for a run on a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn applied_run(&self, table: TableName, run_id: &RunId) -> Result<Option<AppliedRun>>;

    /// Check whether a run has already been applied to a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_applied_run(&self, table: TableName, run_id: &RunId) -> Result<bool> {
        Ok(self.applied_run(table, run_id)?.is_some())
    }

    /// List the runs applied to a table, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn applied_runs(&self, table: TableName) -> Result<Vec<AppliedRun>>;
}

/// Write access to table state. Each method is one atomic write that also records
/// `run` in the table's ledger.
pub trait TableWriter: Send + Sync {
    /// Replace the fact table's row set, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written then.
    fn write_fact_table(&self, run: &RunStamp, rows: &[FactAggregateRow]) -> Result<()>;

    /// Close open versions, then append new versions.
    ///
    /// Closing only sets `valid_to` on the customer's open row.
    ///
    /// # Errors
    ///
    /// - `StoreError::TableNotFound` if the dimension table does not exist.
    /// - `StoreError::CloseTargetMissing` if a customer has no open version.
    /// - `StoreError::DuplicateVersion` if an insert collides with an existing row.
    fn apply_dimension_mutations(
        &self,
        run: &RunStamp,
        closes: &[VersionClose],
        inserts: &[DimensionVersionRow],
    ) -> Result<()>;

    /// Create the dimension table from its first rows.
    ///
    /// # Errors
    ///
    /// - `StoreError::TableAlreadyExists` if the table exists.
    /// - `StoreError::DuplicateVersion` if two rows share a customer and `valid_from`.
    fn create_dimension_table(&self, run: &RunStamp, rows: &[DimensionVersionRow]) -> Result<()>;
}

/// A backend that can both read and write tables.
pub trait TableStore: TableReader + TableWriter {}

impl<T: TableReader + TableWriter> TableStore for T {}
