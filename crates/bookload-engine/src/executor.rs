//! Applies computed mutations to table storage.
//!
//! Each method is one atomic store write covering one table. The executor never
//! retries; a failed write is returned as a [`TableFailure`] naming the run, the
//! table and how many rows the write carried.

use serde::{Serialize, Serializer};

use bookload_core::{DimensionPlan, FactAggregateRow, RunId};
use bookload_store::{RunStamp, StoreError, TableName, TableWriter};

/// A table operation that failed in the store.
#[derive(Debug, Serialize, thiserror::Error)]
#[error("{table} write for run {run_id} failed after attempting {rows_attempted} rows: {error}")]
pub struct TableFailure {
    /// The run.
    pub run_id: RunId,

    /// The table.
    pub table: TableName,

    /// Rows the failed operation carried.
    pub rows_attempted: usize,

    /// The store error, verbatim.
    #[source]
    #[serde(serialize_with = "serialize_display")]
    pub error: StoreError,
}

impl TableFailure {
    /// Wrap a store error raised for `table` during `run_id`.
    #[must_use]
    pub fn new(run_id: &RunId, table: TableName, rows_attempted: usize, error: StoreError) -> Self {
        Self {
            run_id: run_id.clone(),
            table,
            rows_attempted,
            error,
        }
    }
}

fn serialize_display<S: Serializer>(error: &StoreError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// What a dimension write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionWrite {
    /// The table was created from the plan's inserts.
    Created {
        /// Versions inserted.
        inserted: usize,
    },
    /// Closes and inserts were applied to the existing table.
    Mutated {
        /// Versions closed.
        closed: usize,
        /// Versions inserted.
        inserted: usize,
    },
}

/// Applies one run's writes.
pub struct MergeExecutor<'a, S: TableWriter + ?Sized> {
    store: &'a S,
    run: &'a RunStamp,
}

impl<'a, S: TableWriter + ?Sized> MergeExecutor<'a, S> {
    /// Create an executor writing on behalf of `run`.
    #[must_use]
    pub fn new(store: &'a S, run: &'a RunStamp) -> Self {
        Self { store, run }
    }

    /// Replace the fact table with `rows`.
    ///
    /// # Errors
    ///
    /// Returns a `TableFailure` if the store rejects the write.
    pub fn write_facts(&self, rows: &[FactAggregateRow]) -> Result<usize, TableFailure> {
        self.store
            .write_fact_table(self.run, rows)
            .map_err(|e| TableFailure::new(&self.run.run_id, TableName::FactAggregate, rows.len(), e))?;
        Ok(rows.len())
    }

    /// Apply a dimension plan.
    ///
    /// With `table_exists == false` the plan's inserts bootstrap the table; closes
    /// cannot occur then, since there is no prior history to close.
    ///
    /// # Errors
    ///
    /// Returns a `TableFailure` if the store rejects the write.
    pub fn apply_dimension(
        &self,
        plan: &DimensionPlan,
        table_exists: bool,
    ) -> Result<DimensionWrite, TableFailure> {
        let rows = plan.closes.len() + plan.inserts.len();
        let fail = |e| TableFailure::new(&self.run.run_id, TableName::CustomerDimension, rows, e);

        if table_exists {
            self.store
                .apply_dimension_mutations(self.run, &plan.closes, &plan.inserts)
                .map_err(fail)?;
            Ok(DimensionWrite::Mutated {
                closed: plan.closes.len(),
                inserted: plan.inserts.len(),
            })
        } else {
            self.store
                .create_dimension_table(self.run, &plan.inserts)
                .map_err(fail)?;
            Ok(DimensionWrite::Created {
                inserted: plan.inserts.len(),
            })
        }
    }
}
