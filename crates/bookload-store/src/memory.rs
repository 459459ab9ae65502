//! In-memory storage implementation.
//!
//! Each table lives behind its own `RwLock`. Writes build the new table state on a
//! copy and swap it in together with the ledger entry, so readers never observe a
//! half-applied run.

use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bookload_core::tables::close_open_version;
use bookload_core::{DimensionVersionRow, FactAggregateRow, RunId, VersionClose};

use crate::error::{Result, StoreError};
use crate::{AppliedRun, RunStamp, TableName, TableReader, TableWriter};

type Ledger = BTreeMap<TableName, Vec<AppliedRun>>;

/// In-memory table store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    facts: RwLock<Option<Vec<FactAggregateRow>>>,
    dimension: RwLock<Option<Vec<DimensionVersionRow>>>,
    ledger: RwLock<Ledger>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
}

fn record_run(ledger: &mut Ledger, table: TableName, run: &RunStamp, rows: usize) {
    ledger.entry(table).or_default().push(AppliedRun {
        run_id: run.run_id.clone(),
        fingerprint: run.fingerprint.clone(),
        rows,
        applied_at: chrono::Utc::now(),
    });
}

fn check_unique_versions<'a>(
    rows: impl IntoIterator<Item = &'a DimensionVersionRow>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for row in rows {
        if !seen.insert((&row.customer_id, row.valid_from)) {
            return Err(StoreError::DuplicateVersion {
                customer_id: row.customer_id.clone(),
                valid_from: row.valid_from,
            });
        }
    }
    Ok(())
}

impl MemoryStore {
    /// Create an empty store with neither table present.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose tables already hold the given rows.
    #[must_use]
    pub fn with_tables(
        facts: Option<Vec<FactAggregateRow>>,
        dimension: Option<Vec<DimensionVersionRow>>,
    ) -> Self {
        Self {
            facts: RwLock::new(facts),
            dimension: RwLock::new(dimension),
            ledger: RwLock::default(),
        }
    }
}

impl TableReader for MemoryStore {
    fn read_fact_table(&self) -> Result<Option<Vec<FactAggregateRow>>> {
        Ok(read(&self.facts)?.clone())
    }

    fn read_dimension_table(&self) -> Result<Option<Vec<DimensionVersionRow>>> {
        Ok(read(&self.dimension)?.clone())
    }

    fn applied_run(&self, table: TableName, run_id: &RunId) -> Result<Option<AppliedRun>> {
        Ok(read(&self.ledger)?
            .get(&table)
            .and_then(|runs| runs.iter().rev().find(|run| run.run_id == *run_id))
            .cloned())
    }

    fn applied_runs(&self, table: TableName) -> Result<Vec<AppliedRun>> {
        Ok(read(&self.ledger)?.get(&table).cloned().unwrap_or_default())
    }
}

impl TableWriter for MemoryStore {
    fn write_fact_table(&self, run: &RunStamp, rows: &[FactAggregateRow]) -> Result<()> {
        let mut facts = write(&self.facts)?;
        let mut ledger = write(&self.ledger)?;

        *facts = Some(rows.to_vec());
        record_run(&mut ledger, TableName::FactAggregate, run, rows.len());
        Ok(())
    }

    fn apply_dimension_mutations(
        &self,
        run: &RunStamp,
        closes: &[VersionClose],
        inserts: &[DimensionVersionRow],
    ) -> Result<()> {
        let mut dimension = write(&self.dimension)?;
        let mut ledger = write(&self.ledger)?;

        let current = dimension.as_ref().ok_or(StoreError::TableNotFound {
            table: TableName::CustomerDimension,
        })?;

        let mut next = current.clone();
        for close in closes {
            if !close_open_version(&mut next, close) {
                return Err(StoreError::CloseTargetMissing {
                    customer_id: close.customer_id.clone(),
                });
            }
        }
        next.extend(inserts.iter().cloned());
        check_unique_versions(&next)?;

        *dimension = Some(next);
        record_run(
            &mut ledger,
            TableName::CustomerDimension,
            run,
            closes.len() + inserts.len(),
        );
        Ok(())
    }

    fn create_dimension_table(&self, run: &RunStamp, rows: &[DimensionVersionRow]) -> Result<()> {
        let mut dimension = write(&self.dimension)?;
        let mut ledger = write(&self.ledger)?;

        if dimension.is_some() {
            return Err(StoreError::TableAlreadyExists {
                table: TableName::CustomerDimension,
            });
        }
        check_unique_versions(rows)?;

        *dimension = Some(rows.to_vec());
        record_run(&mut ledger, TableName::CustomerDimension, run, rows.len());
        Ok(())
    }
}
