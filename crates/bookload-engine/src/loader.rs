//! Incremental load orchestration.
//!
//! A run joins the batch, then handles the two tables on independent paths:
//!
//! 1. Fact table: ledger check, read prior rows, aggregate, replace the row set.
//! 2. Dimension table: ledger check, read history, plan SCD2 mutations, apply them.
//!
//! Each path ends in a [`TableOutcome`]. A rejection or store failure on one table is
//! recorded and the other table still runs. Only batch-level input errors (a
//! repeated customer under the `reject` policy) abort the run.
//!
//! The ledger check compares the batch fingerprint with the one recorded for the
//! run: a match is [`TableOutcome::AlreadyApplied`], a mismatch is a rejection.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use bookload_core::{
    aggregate, index_snapshots, join_bookings, CustomerId, CustomerSnapshot, JoinedRecord, LoadError,
    RecordIssue, Result, RunId, VersionViolation, Versioner,
};
use bookload_store::{RunStamp, TableName, TableStore};

use crate::config::LoadConfig;
use crate::executor::{DimensionWrite, MergeExecutor, TableFailure};
use crate::source::Batch;

/// What happened to one table during a run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TableOutcome {
    /// The table did not exist and was created.
    Created {
        /// Rows written.
        rows: usize,
    },

    /// The table was updated.
    Written {
        /// Rows written (facts) or versions closed plus inserted (dimension).
        rows: usize,
    },

    /// The batch changes nothing in this table; no write was issued.
    Unchanged,

    /// The run ledger already lists this run, with the same input, for this table.
    AlreadyApplied,

    /// An invariant check refused the computed state; nothing was written.
    Rejected {
        /// Why the table was rejected.
        reason: String,
        /// Versioning violations, for dimension rejections.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        violations: Vec<VersionViolation>,
    },

    /// The store failed; nothing was written.
    Failed(TableFailure),
}

impl TableOutcome {
    /// Whether the table ended up consistent with the batch.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Rejected { .. } | Self::Failed(_))
    }

    fn rejected(error: LoadError) -> Self {
        let reason = error.to_string();
        let violations = match error {
            LoadError::VersioningRejected { violations } => violations,
            _ => Vec::new(),
        };
        Self::Rejected { reason, violations }
    }
}

/// Summary of one run.
#[derive(Debug, Serialize)]
pub struct RunResult {
    /// The run.
    pub run_id: RunId,

    /// Rows in the fact table after the run, if it was written.
    pub fact_rows_written: usize,

    /// Dimension versions closed.
    pub dimension_versions_closed: usize,

    /// Dimension versions inserted.
    pub dimension_versions_inserted: usize,

    /// Bookings dropped and reported.
    pub per_record_errors: Vec<RecordIssue>,

    /// Bookings dropped for having no positive quantity.
    pub records_filtered: usize,

    /// Fact table outcome.
    pub fact: TableOutcome,

    /// Dimension table outcome.
    pub dimension: TableOutcome,
}

impl RunResult {
    /// Whether both tables succeeded (or had nothing to do).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.fact.is_success() && self.dimension.is_success()
    }
}

/// Runs incremental loads against a table store.
pub struct IncrementalLoader<'a, S: TableStore + ?Sized> {
    store: &'a S,
    config: &'a LoadConfig,
}

impl<'a, S: TableStore + ?Sized> IncrementalLoader<'a, S> {
    /// Create a loader.
    #[must_use]
    pub fn new(store: &'a S, config: &'a LoadConfig) -> Self {
        Self { store, config }
    }

    /// Run one batch.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::DuplicateCustomerInBatch` when a customer repeats under
    /// the `reject` policy, or `LoadError::Source` if the batch cannot be
    /// fingerprinted. Table-level problems are reported in the result instead.
    pub fn run(&self, batch: Batch) -> Result<RunResult> {
        let started = Instant::now();
        let stamp = RunStamp::new(batch.run_id.clone(), batch.fingerprint()?);
        let run_id = batch.run_id;

        tracing::info!(
            run_id = %run_id,
            bookings = batch.bookings.len(),
            customers = batch.customers.len(),
            "Starting incremental load"
        );

        let customers = index_snapshots(batch.customers, self.config.duplicate_customers)?;
        let joined = join_bookings(&batch.bookings, &customers);
        for issue in &joined.issues {
            tracing::warn!(run_id = %run_id, issue = %issue, "Dropped booking");
        }
        tracing::debug!(
            run_id = %run_id,
            records = joined.records.len(),
            issues = joined.issues.len(),
            filtered = joined.filtered,
            "Joined bookings"
        );

        let (fact, fact_rows_written) = self.load_facts(&stamp, &joined.records);
        let (dimension, closed, inserted) = self.load_dimension(&stamp, &customers);

        tracing::info!(
            run_id = %run_id,
            fact_rows = fact_rows_written,
            closed,
            inserted,
            success = fact.is_success() && dimension.is_success(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Incremental load finished"
        );

        Ok(RunResult {
            run_id,
            fact_rows_written,
            dimension_versions_closed: closed,
            dimension_versions_inserted: inserted,
            per_record_errors: joined.issues,
            records_filtered: joined.filtered,
            fact,
            dimension,
        })
    }

    /// `Some` when the ledger settles the table before any work is done.
    fn check_ledger(&self, table: TableName, run: &RunStamp) -> Option<TableOutcome> {
        let run_id = &run.run_id;
        match self.store.applied_run(table, run_id) {
            Ok(None) => None,
            Ok(Some(entry)) if entry.fingerprint == run.fingerprint => {
                tracing::warn!(run_id = %run_id, table = %table, "Run already applied, skipping table");
                Some(TableOutcome::AlreadyApplied)
            }
            Ok(Some(entry)) => {
                let error = LoadError::RunContentMismatch {
                    run_id: run_id.clone(),
                    recorded: entry.fingerprint,
                    batch: run.fingerprint.clone(),
                };
                tracing::error!(run_id = %run_id, table = %table, error = %error, "Run ID reused for different input");
                Some(TableOutcome::rejected(error))
            }
            Err(e) => Some(failed(TableFailure::new(run_id, table, 0, e))),
        }
    }

    fn load_facts(&self, run: &RunStamp, records: &[JoinedRecord]) -> (TableOutcome, usize) {
        let table = TableName::FactAggregate;
        let run_id = &run.run_id;

        if let Some(outcome) = self.check_ledger(table, run) {
            return (outcome, 0);
        }

        let prior = match self.store.read_fact_table() {
            Ok(prior) => prior,
            Err(e) => return (failed(TableFailure::new(run_id, table, 0, e)), 0),
        };

        let result = match aggregate(records, prior.as_deref(), self.config.aggregate_partitions) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(run_id = %run_id, table = %table, error = %e, "Fact aggregate rejected");
                return (TableOutcome::rejected(e), 0);
            }
        };

        if result.is_unchanged() {
            tracing::debug!(run_id = %run_id, table = %table, "No fact changes");
            return (TableOutcome::Unchanged, 0);
        }

        match MergeExecutor::new(self.store, run).write_facts(&result.rows) {
            Ok(rows) => {
                tracing::info!(
                    run_id = %run_id,
                    table = %table,
                    rows,
                    keys_updated = result.keys_updated,
                    keys_inserted = result.keys_inserted,
                    "Fact table written"
                );
                let outcome = if prior.is_some() {
                    TableOutcome::Written { rows }
                } else {
                    TableOutcome::Created { rows }
                };
                (outcome, rows)
            }
            Err(failure) => (failed(failure), 0),
        }
    }

    fn load_dimension(
        &self,
        run: &RunStamp,
        customers: &BTreeMap<CustomerId, CustomerSnapshot>,
    ) -> (TableOutcome, usize, usize) {
        let table = TableName::CustomerDimension;
        let run_id = &run.run_id;

        if let Some(outcome) = self.check_ledger(table, run) {
            return (outcome, 0, 0);
        }

        let current = match self.store.read_dimension_table() {
            Ok(current) => current,
            Err(e) => return (failed(TableFailure::new(run_id, table, 0, e)), 0, 0),
        };

        let versioner = Versioner::new(self.config.end_convention);
        let plan = match versioner.plan(current.as_deref().unwrap_or_default(), customers) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(
                    run_id = %run_id,
                    table = %table,
                    end_convention = versioner.convention().as_str(),
                    error = %e,
                    "Dimension plan rejected"
                );
                return (TableOutcome::rejected(e), 0, 0);
            }
        };

        if plan.is_empty() {
            tracing::debug!(
                run_id = %run_id,
                table = %table,
                unchanged = plan.unchanged,
                "No dimension changes"
            );
            return (TableOutcome::Unchanged, 0, 0);
        }

        match MergeExecutor::new(self.store, run).apply_dimension(&plan, current.is_some()) {
            Ok(DimensionWrite::Created { inserted }) => {
                tracing::info!(run_id = %run_id, table = %table, inserted, "Dimension table created");
                (TableOutcome::Created { rows: inserted }, 0, inserted)
            }
            Ok(DimensionWrite::Mutated { closed, inserted }) => {
                tracing::info!(
                    run_id = %run_id,
                    table = %table,
                    closed,
                    inserted,
                    unchanged = plan.unchanged,
                    "Dimension table updated"
                );
                (TableOutcome::Written { rows: closed + inserted }, closed, inserted)
            }
            Err(failure) => (failed(failure), 0, 0),
        }
    }
}

fn failed(failure: TableFailure) -> TableOutcome {
    tracing::error!(
        run_id = %failure.run_id,
        table = %failure.table,
        rows_attempted = failure.rows_attempted,
        error = %failure.error,
        "Table write failed"
    );
    TableOutcome::Failed(failure)
}

/// Run one batch against `store`.
///
/// # Errors
///
/// See [`IncrementalLoader::run`].
pub fn run_incremental_load<S: TableStore + ?Sized>(
    store: &S,
    config: &LoadConfig,
    batch: Batch,
) -> Result<RunResult> {
    IncrementalLoader::new(store, config).run(batch)
}
