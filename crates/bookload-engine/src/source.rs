//! Batch sources.
//!
//! A batch is one run's worth of already-parsed input: bookings plus the customer
//! snapshots observed alongside them. [`JsonBatchSource`] reads a batch document of
//! the form
//!
//! ```json
//! {
//!   "run_id": "2024-02-01",
//!   "valid_from": "2024-02-01",
//!   "bookings": [
//!     { "booking_id": "B1", "customer_id": "C1", "booking_type": "flight",
//!       "amount": 100, "discount": 0, "quantity": 2, "arrival_date": "2024-02-01" }
//!   ],
//!   "customers": [
//!     { "customer_id": "C1", "attributes": { "name": "Alicia" } }
//!   ]
//! }
//! ```
//!
//! `run_id` defaults to the batch date, and each customer's `valid_from` defaults to
//! the batch date. The run ledger records [`Batch::fingerprint`] next to the run ID,
//! so a different batch reusing an ID is refused rather than skipped.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use bookload_core::{Attributes, BookingRecord, CustomerId, CustomerSnapshot, LoadError, Result, RunId};

/// One run's input.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Identifies the run in the ledger.
    pub run_id: RunId,

    /// Nominal date of the batch.
    pub valid_from: NaiveDate,

    /// Bookings in arrival order.
    pub bookings: Vec<BookingRecord>,

    /// Customer snapshots in arrival order.
    pub customers: Vec<CustomerSnapshot>,
}

impl Batch {
    /// Parse a batch document.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::Source` if the document is malformed, or
    /// `LoadError::InvalidId` if the defaulted run ID is invalid.
    pub fn from_json(document: &str) -> Result<Self> {
        let document: BatchDocument = serde_json::from_str(document)
            .map_err(|e| LoadError::Source(format!("invalid batch document: {e}")))?;
        document.into_batch()
    }

    /// Hex SHA-256 of the batch date, bookings and customer snapshots, in arrival
    /// order.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::Source` if the batch cannot be serialized.
    pub fn fingerprint(&self) -> Result<String> {
        let content = serde_json::to_vec(&(&self.valid_from, &self.bookings, &self.customers))
            .map_err(|e| LoadError::Source(format!("failed to fingerprint batch: {e}")))?;
        Ok(hex::encode(Sha256::digest(&content)))
    }
}

/// Something that can produce a batch.
pub trait BatchSource {
    /// Load the batch.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::Source` if the batch cannot be read or parsed.
    fn load(&self) -> Result<Batch>;
}

/// Reads a batch from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonBatchSource {
    path: PathBuf,
}

impl JsonBatchSource {
    /// Create a source for the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this source reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BatchSource for JsonBatchSource {
    fn load(&self) -> Result<Batch> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            LoadError::Source(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let batch = Batch::from_json(&contents)?;

        tracing::debug!(
            path = %self.path.display(),
            run_id = %batch.run_id,
            bookings = batch.bookings.len(),
            customers = batch.customers.len(),
            "Loaded batch"
        );
        Ok(batch)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchDocument {
    #[serde(default)]
    run_id: Option<RunId>,
    valid_from: NaiveDate,
    #[serde(default)]
    bookings: Vec<BookingRecord>,
    #[serde(default)]
    customers: Vec<CustomerDocument>,
}

#[derive(Debug, Deserialize)]
struct CustomerDocument {
    customer_id: CustomerId,
    #[serde(default)]
    valid_from: Option<NaiveDate>,
    #[serde(default)]
    attributes: Attributes,
}

impl BatchDocument {
    fn into_batch(self) -> Result<Batch> {
        let run_id = match self.run_id {
            Some(run_id) => run_id,
            None => RunId::new(self.valid_from.to_string())?,
        };

        let customers = self
            .customers
            .into_iter()
            .map(|customer| CustomerSnapshot {
                customer_id: customer.customer_id,
                attributes: customer.attributes,
                valid_from: customer.valid_from.unwrap_or(self.valid_from),
                as_of_batch: run_id.clone(),
            })
            .collect();

        Ok(Batch {
            run_id,
            valid_from: self.valid_from,
            bookings: self.bookings,
            customers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn defaults_run_id_and_snapshot_dates() {
        let batch = Batch::from_json(
            r#"{
                "valid_from": "2024-02-01",
                "bookings": [{
                    "booking_id": "B1", "customer_id": "C1", "booking_type": "flight",
                    "amount": 100, "discount": 0, "quantity": 2, "arrival_date": "2024-02-01"
                }],
                "customers": [
                    { "customer_id": "C1", "attributes": { "name": "Alicia" } },
                    { "customer_id": "C2", "valid_from": "2024-01-15" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(batch.run_id.as_str(), "2024-02-01");
        assert_eq!(batch.bookings.len(), 1);
        assert_eq!(batch.customers[0].valid_from, date(2024, 2, 1));
        assert_eq!(batch.customers[0].as_of_batch, batch.run_id);
        assert_eq!(
            batch.customers[0].attributes.get("name"),
            Some(&serde_json::json!("Alicia"))
        );
        assert_eq!(batch.customers[1].valid_from, date(2024, 1, 15));
        assert!(batch.customers[1].attributes.is_empty());
    }

    #[test]
    fn explicit_run_id_wins() {
        let batch = Batch::from_json(r#"{ "run_id": "replay-7", "valid_from": "2024-02-01" }"#)
            .unwrap();
        assert_eq!(batch.run_id.as_str(), "replay-7");
        assert!(batch.bookings.is_empty());
        assert!(batch.customers.is_empty());
    }

    #[test]
    fn malformed_documents_are_source_errors() {
        for document in [
            "not json",
            r#"{ "bookings": [] }"#,
            r#"{ "valid_from": "2024-02-01", "run_id": "" }"#,
            r#"{ "valid_from": "2024-02-01", "extra": 1 }"#,
        ] {
            let err = Batch::from_json(document).unwrap_err();
            assert!(matches!(err, LoadError::Source(_)), "{document}: {err}");
        }
    }

    #[test]
    fn fingerprint_tracks_content() {
        let document = r#"{
            "valid_from": "2024-01-01",
            "bookings": [{
                "booking_id": "B1", "customer_id": "C1", "booking_type": "flight",
                "amount": 100, "discount": 0, "quantity": 2, "arrival_date": "2024-01-01"
            }]
        }"#;
        let first = Batch::from_json(document).unwrap();
        let again = Batch::from_json(document).unwrap();
        assert_eq!(first.fingerprint().unwrap(), again.fingerprint().unwrap());
        assert_eq!(first.fingerprint().unwrap().len(), 64);

        let other = Batch::from_json(&document.replace("\"B1\"", "\"B2\"")).unwrap();
        assert_eq!(other.run_id, first.run_id);
        assert_ne!(other.fingerprint().unwrap(), first.fingerprint().unwrap());
    }

    #[test]
    fn missing_file_is_source_error() {
        let source = JsonBatchSource::new("/nonexistent/bookload/batch.json");
        assert!(matches!(source.load(), Err(LoadError::Source(_))));
    }
}
