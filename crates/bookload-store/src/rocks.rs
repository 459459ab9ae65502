//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the table traits. Every
//! table write, including its ledger entry and existence marker, goes through a
//! single `WriteBatch`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use serde::{Deserialize, Serialize};

use bookload_core::{DimensionVersionRow, FactAggregateRow, RunId, ValidTo, VersionClose};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AppliedRun, RunStamp, TableName, TableReader, TableWriter};

/// Existence marker stored per table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableMarker {
    created_by: RunId,
    created_at: chrono::DateTime<Utc>,
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let path = path.as_ref();
        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Opened RocksDB store");

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// The run that created a table, or `None` if the table does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn created_by(&self, table: TableName) -> Result<Option<(RunId, chrono::DateTime<Utc>)>> {
        let cf = self.cf(cf::TABLE_META)?;
        self.db
            .get_cf(&cf, keys::table_key(table))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize::<TableMarker>(&data))
            .transpose()
            .map(|marker| marker.map(|m| (m.created_by, m.created_at)))
    }

    fn table_exists(&self, table: TableName) -> Result<bool> {
        let cf = self.cf(cf::TABLE_META)?;
        let exists = self
            .db
            .get_cf(&cf, keys::table_key(table))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        Ok(exists)
    }

    /// Collect `(key, value)` pairs of a column family, optionally under a prefix.
    fn scan(&self, name: &str, prefix: Option<&[u8]>) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(name)?;
        let mode = match prefix {
            Some(prefix) => IteratorMode::From(prefix, Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if prefix.is_some_and(|prefix| !key.starts_with(prefix)) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn read_rows<T: serde::de::DeserializeOwned>(&self, table: TableName, name: &str) -> Result<Option<Vec<T>>> {
        if !self.table_exists(table)? {
            return Ok(None);
        }
        self.scan(name, None)?
            .iter()
            .map(|(_, value)| Self::deserialize(value))
            .collect::<Result<Vec<T>>>()
            .map(Some)
    }

    /// Queue the ledger entry, and the table marker if the table is new.
    fn stage_bookkeeping(
        &self,
        batch: &mut WriteBatch,
        table: TableName,
        run: &RunStamp,
        rows: usize,
        create: bool,
    ) -> Result<()> {
        let now = Utc::now();
        if create {
            let cf_meta = self.cf(cf::TABLE_META)?;
            let marker = TableMarker {
                created_by: run.run_id.clone(),
                created_at: now,
            };
            batch.put_cf(&cf_meta, keys::table_key(table), Self::serialize(&marker)?);
        }

        let cf_runs = self.cf(cf::APPLIED_RUNS)?;
        let entry = AppliedRun {
            run_id: run.run_id.clone(),
            fingerprint: run.fingerprint.clone(),
            rows,
            applied_at: now,
        };
        batch.put_cf(
            &cf_runs,
            keys::applied_run_key(table, &run.run_id),
            Self::serialize(&entry)?,
        );
        Ok(())
    }

    fn commit(&self, batch: WriteBatch, table: TableName, run_id: &RunId) -> Result<()> {
        let ops = batch.len();
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::debug!(table = %table, run_id = %run_id, ops, "Committed table write");
        Ok(())
    }

    fn version_exists(&self, row: &DimensionVersionRow) -> Result<bool> {
        let cf = self.cf(cf::DIMENSION_ROWS)?;
        let exists = self
            .db
            .get_cf(&cf, keys::dimension_key(&row.customer_id, row.valid_from))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        Ok(exists)
    }
}

impl TableReader for RocksStore {
    fn read_fact_table(&self) -> Result<Option<Vec<FactAggregateRow>>> {
        self.read_rows(TableName::FactAggregate, cf::FACT_ROWS)
    }

    fn read_dimension_table(&self) -> Result<Option<Vec<DimensionVersionRow>>> {
        self.read_rows(TableName::CustomerDimension, cf::DIMENSION_ROWS)
    }

    fn applied_run(&self, table: TableName, run_id: &RunId) -> Result<Option<AppliedRun>> {
        let cf = self.cf(cf::APPLIED_RUNS)?;
        self.db
            .get_cf(&cf, keys::applied_run_key(table, run_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn applied_runs(&self, table: TableName) -> Result<Vec<AppliedRun>> {
        let prefix = keys::applied_runs_prefix(table);
        let mut runs = self
            .scan(cf::APPLIED_RUNS, Some(&prefix))?
            .iter()
            .map(|(_, value)| Self::deserialize::<AppliedRun>(value))
            .collect::<Result<Vec<_>>>()?;
        // Keys sort by run id; the ledger reads oldest first.
        runs.sort_by_key(|run| run.applied_at);
        Ok(runs)
    }
}

impl TableWriter for RocksStore {
    fn write_fact_table(&self, run: &RunStamp, rows: &[FactAggregateRow]) -> Result<()> {
        let cf_facts = self.cf(cf::FACT_ROWS)?;
        let create = !self.table_exists(TableName::FactAggregate)?;

        let new_keys: HashSet<Vec<u8>> = rows.iter().map(|row| keys::fact_key(&row.key())).collect();

        let mut batch = WriteBatch::default();
        for (key, _) in self.scan(cf::FACT_ROWS, None)? {
            if !new_keys.contains(key.as_ref()) {
                batch.delete_cf(&cf_facts, key);
            }
        }
        for row in rows {
            batch.put_cf(&cf_facts, keys::fact_key(&row.key()), Self::serialize(row)?);
        }
        self.stage_bookkeeping(&mut batch, TableName::FactAggregate, run, rows.len(), create)?;

        self.commit(batch, TableName::FactAggregate, &run.run_id)
    }

    fn apply_dimension_mutations(
        &self,
        run: &RunStamp,
        closes: &[VersionClose],
        inserts: &[DimensionVersionRow],
    ) -> Result<()> {
        if !self.table_exists(TableName::CustomerDimension)? {
            return Err(StoreError::TableNotFound {
                table: TableName::CustomerDimension,
            });
        }
        let cf_dim = self.cf(cf::DIMENSION_ROWS)?;
        let mut batch = WriteBatch::default();

        for close in closes {
            let prefix = keys::customer_prefix(&close.customer_id);
            let mut open = None;
            for (key, value) in self.scan(cf::DIMENSION_ROWS, Some(&prefix))? {
                let row: DimensionVersionRow = Self::deserialize(&value)?;
                if row.is_open() {
                    open = Some((key, row));
                    break;
                }
            }
            let (key, mut row) = open.ok_or_else(|| StoreError::CloseTargetMissing {
                customer_id: close.customer_id.clone(),
            })?;

            row.valid_to = ValidTo::Closed(close.valid_to);
            batch.put_cf(&cf_dim, key, Self::serialize(&row)?);
        }

        let mut staged = HashSet::new();
        for row in inserts {
            let key = keys::dimension_key(&row.customer_id, row.valid_from);
            if !staged.insert(key.clone()) || self.version_exists(row)? {
                return Err(StoreError::DuplicateVersion {
                    customer_id: row.customer_id.clone(),
                    valid_from: row.valid_from,
                });
            }
            batch.put_cf(&cf_dim, key, Self::serialize(row)?);
        }

        self.stage_bookkeeping(
            &mut batch,
            TableName::CustomerDimension,
            run,
            closes.len() + inserts.len(),
            false,
        )?;
        self.commit(batch, TableName::CustomerDimension, &run.run_id)
    }

    fn create_dimension_table(&self, run: &RunStamp, rows: &[DimensionVersionRow]) -> Result<()> {
        if self.table_exists(TableName::CustomerDimension)? {
            return Err(StoreError::TableAlreadyExists {
                table: TableName::CustomerDimension,
            });
        }
        let cf_dim = self.cf(cf::DIMENSION_ROWS)?;
        let mut batch = WriteBatch::default();

        let mut staged = HashSet::new();
        for row in rows {
            let key = keys::dimension_key(&row.customer_id, row.valid_from);
            if !staged.insert(key.clone()) {
                return Err(StoreError::DuplicateVersion {
                    customer_id: row.customer_id.clone(),
                    valid_from: row.valid_from,
                });
            }
            batch.put_cf(&cf_dim, key, Self::serialize(row)?);
        }

        self.stage_bookkeeping(&mut batch, TableName::CustomerDimension, run, rows.len(), true)?;
        self.commit(batch, TableName::CustomerDimension, &run.run_id)
    }
}
