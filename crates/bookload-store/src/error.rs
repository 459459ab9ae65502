//! Error types for bookload storage.

use bookload_core::CustomerId;
use chrono::NaiveDate;

use crate::TableName;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend cannot serve requests (e.g. a poisoned lock).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The table was expected to exist.
    #[error("table not found: {table}")]
    TableNotFound {
        /// The missing table.
        table: TableName,
    },

    /// Bootstrap was requested for a table that already exists.
    #[error("table already exists: {table}")]
    TableAlreadyExists {
        /// The existing table.
        table: TableName,
    },

    /// A close targeted a customer without an open version.
    #[error("no open version to close for customer {customer_id}")]
    CloseTargetMissing {
        /// The customer.
        customer_id: CustomerId,
    },

    /// An insert would overwrite an existing version.
    #[error("version already exists: {customer_id} from {valid_from}")]
    DuplicateVersion {
        /// The customer.
        customer_id: CustomerId,
        /// Start date of the colliding version.
        valid_from: NaiveDate,
    },
}
