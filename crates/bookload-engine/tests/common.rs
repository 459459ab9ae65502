//! Common test utilities for bookload integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;

use bookload_core::{
    Attributes, BookingId, BookingRecord, BookingType, CustomerId, CustomerSnapshot,
    DimensionVersionRow, FactAggregateRow, RunId, VersionClose,
};
use bookload_engine::Batch;
use bookload_store::{
    AppliedRun, MemoryStore, Result, RunStamp, StoreError, TableName, TableReader, TableWriter,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn customer(id: &str) -> CustomerId {
    CustomerId::new(id).expect("valid customer id")
}

pub fn booking(id: &str, customer_id: &str, booking_type: &str, amount: i64, quantity: i64) -> BookingRecord {
    BookingRecord {
        booking_id: BookingId::new(id).expect("valid booking id"),
        customer_id: customer(customer_id),
        booking_type: BookingType::new(booking_type).expect("valid booking type"),
        amount,
        discount: 0,
        quantity,
        arrival_date: date(2024, 1, 1),
    }
}

/// Builder for one day's batch; run ID and snapshot dates follow the batch date.
pub struct BatchBuilder {
    batch: Batch,
}

impl From<Batch> for BatchBuilder {
    fn from(batch: Batch) -> Self {
        Self { batch }
    }
}

impl BatchBuilder {
    pub fn on(valid_from: NaiveDate) -> Self {
        Self {
            batch: Batch {
                run_id: RunId::new(valid_from.to_string()).expect("valid run id"),
                valid_from,
                bookings: Vec::new(),
                customers: Vec::new(),
            },
        }
    }

    pub fn run_id(mut self, run_id: &str) -> Self {
        self.batch.run_id = RunId::new(run_id).expect("valid run id");
        for snapshot in &mut self.batch.customers {
            snapshot.as_of_batch = self.batch.run_id.clone();
        }
        self
    }

    pub fn customer(self, id: &str, name: &str) -> Self {
        let valid_from = self.batch.valid_from;
        self.customer_from(id, name, valid_from)
    }

    pub fn customer_from(mut self, id: &str, name: &str, valid_from: NaiveDate) -> Self {
        self.batch.customers.push(CustomerSnapshot {
            customer_id: customer(id),
            attributes: Attributes::new().with("name", name),
            valid_from,
            as_of_batch: self.batch.run_id.clone(),
        });
        self
    }

    pub fn booking(mut self, booking: BookingRecord) -> Self {
        self.batch.bookings.push(booking);
        self
    }

    pub fn build(self) -> Batch {
        self.batch
    }
}

/// Sorted by (customer, valid_from) so assertions do not depend on backend order.
pub fn dimension_rows(store: &dyn TableReader) -> Vec<DimensionVersionRow> {
    let mut rows = store
        .read_dimension_table()
        .expect("read dimension")
        .unwrap_or_default();
    rows.sort_by(|a, b| {
        (a.customer_id.as_str(), a.valid_from).cmp(&(b.customer_id.as_str(), b.valid_from))
    });
    rows
}

pub fn fact_rows(store: &dyn TableReader) -> Vec<FactAggregateRow> {
    let mut rows = store.read_fact_table().expect("read facts").unwrap_or_default();
    rows.sort_by_key(FactAggregateRow::key);
    rows
}

/// A `MemoryStore` whose writes can be made to fail per table.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_fact_writes: AtomicBool,
    pub fail_dimension_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_facts(&self, fail: bool) {
        self.fail_fact_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_dimension(&self, fail: bool) {
        self.fail_dimension_writes.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Database("injected write failure".into()))
        } else {
            Ok(())
        }
    }
}

impl TableReader for FlakyStore {
    fn read_fact_table(&self) -> Result<Option<Vec<FactAggregateRow>>> {
        self.inner.read_fact_table()
    }

    fn read_dimension_table(&self) -> Result<Option<Vec<DimensionVersionRow>>> {
        self.inner.read_dimension_table()
    }

    fn applied_run(&self, table: TableName, run_id: &RunId) -> Result<Option<AppliedRun>> {
        self.inner.applied_run(table, run_id)
    }

    fn applied_runs(&self, table: TableName) -> Result<Vec<AppliedRun>> {
        self.inner.applied_runs(table)
    }
}

impl TableWriter for FlakyStore {
    fn write_fact_table(&self, run: &RunStamp, rows: &[FactAggregateRow]) -> Result<()> {
        Self::check(&self.fail_fact_writes)?;
        self.inner.write_fact_table(run, rows)
    }

    fn apply_dimension_mutations(
        &self,
        run: &RunStamp,
        closes: &[VersionClose],
        inserts: &[DimensionVersionRow],
    ) -> Result<()> {
        Self::check(&self.fail_dimension_writes)?;
        self.inner.apply_dimension_mutations(run, closes, inserts)
    }

    fn create_dimension_table(&self, run: &RunStamp, rows: &[DimensionVersionRow]) -> Result<()> {
        Self::check(&self.fail_dimension_writes)?;
        self.inner.create_dimension_table(run, rows)
    }
}
