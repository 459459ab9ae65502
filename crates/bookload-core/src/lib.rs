//! Core types and merge logic for bookload.
//!
//! This crate holds everything about an incremental load that does not touch storage:
//!
//! - **Identifiers**: `CustomerId`, `BookingId`, `BookingType`, `RunId`
//! - **Records**: `BookingRecord`, `CustomerSnapshot`, `JoinedRecord`, `Attributes`
//! - **Tables**: `FactAggregateRow`, `DimensionVersionRow`, `ValidTo`
//! - **Stages**: join & transform, fact aggregation, SCD2 versioning
//! - **Policies**: `EndConvention`, `DuplicateCustomerPolicy`
//!
//! Every stage is a pure function from (prior table state, batch) to a result or a
//! mutation plan. Applying plans to storage is the engine crate's job.
//!
//! # Money
//!
//! Amounts are integer minor units (`i64` cents). Sums stay exact, so folding
//! partitions in any order gives the same totals.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregate;
pub mod error;
pub mod history;
pub mod ids;
pub mod policy;
pub mod records;
pub mod tables;
pub mod transform;
pub mod versioner;

pub use aggregate::{aggregate, fold_batch, fold_batch_partitioned, merge_with_prior, FactAggregate, FactSums};
pub use error::{LoadError, Result};
pub use history::{validate_history, version_as_of, VersionViolation};
pub use ids::{BookingId, BookingType, CustomerId, IdError, RunId};
pub use policy::{DuplicateCustomerPolicy, EndConvention};
pub use records::{Attributes, BookingRecord, CustomerSnapshot, JoinedRecord};
pub use tables::{DimensionVersionRow, FactAggregateRow, FactKey, ValidTo, VersionClose, OPEN_SENTINEL};
pub use transform::{index_snapshots, join_bookings, RecordIssue, TransformOutput};
pub use versioner::{DimensionPlan, Versioner};
