//! Incremental load runner for bookload.
//!
//! Ties the pure stages in `bookload-core` to a `bookload-store` backend:
//!
//! - [`LoadConfig`]: environment-driven configuration
//! - [`BatchSource`]: where a run's input comes from ([`JsonBatchSource`])
//! - [`MergeExecutor`]: one atomic store write per table
//! - [`run_incremental_load`]: one run end to end, reported as a [`RunResult`]
//!
//! # Example
//!
//! ```
//! use bookload_engine::{run_incremental_load, Batch, LoadConfig, TableOutcome};
//! use bookload_store::MemoryStore;
//!
//! let batch = Batch::from_json(r#"{
//!     "valid_from": "2024-01-01",
//!     "bookings": [{
//!         "booking_id": "B1", "customer_id": "C1", "booking_type": "flight",
//!         "amount": 100, "discount": 0, "quantity": 2, "arrival_date": "2024-01-01"
//!     }],
//!     "customers": [{ "customer_id": "C1", "attributes": { "name": "Alice" } }]
//! }"#).unwrap();
//!
//! let store = MemoryStore::new();
//! let result = run_incremental_load(&store, &LoadConfig::default(), batch).unwrap();
//! assert!(matches!(result.fact, TableOutcome::Created { rows: 1 }));
//! assert_eq!(result.dimension_versions_inserted, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod executor;
pub mod loader;
pub mod source;

pub use config::LoadConfig;
pub use executor::{DimensionWrite, MergeExecutor, TableFailure};
pub use loader::{run_incremental_load, IncrementalLoader, RunResult, TableOutcome};
pub use source::{Batch, BatchSource, JsonBatchSource};
