//! Error types for bookload.

use crate::history::VersionViolation;
use crate::ids::{CustomerId, IdError, RunId};
use crate::tables::FactKey;

/// Result type for bookload operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors that can occur while computing an incremental load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The same customer appeared more than once in one batch.
    #[error("duplicate customer in batch: {customer_id}")]
    DuplicateCustomerInBatch {
        /// The repeated customer ID.
        customer_id: CustomerId,
    },

    /// The dimension plan would corrupt (or sits on top of corrupt) version history.
    #[error("dimension versioning rejected: {} violation(s), first: {}", .violations.len(), first_violation(.violations))]
    VersioningRejected {
        /// Every violation found, in customer order.
        violations: Vec<VersionViolation>,
    },

    /// The prior fact table holds the same key twice.
    #[error("duplicate fact key in prior state: {key}")]
    DuplicateFactKey {
        /// The repeated key.
        key: FactKey,
    },

    /// A running sum left the `i64` range.
    #[error("aggregate overflow for {key}")]
    AmountOverflow {
        /// The key whose sum overflowed.
        key: FactKey,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// The batch source could not produce a batch.
    #[error("batch source error: {0}")]
    Source(String),

    /// The run ledger already holds this run, computed from different input.
    #[error("run {run_id} was already applied from different input (recorded {recorded}, batch {batch})")]
    RunContentMismatch {
        /// The reused run ID.
        run_id: RunId,
        /// Fingerprint stored in the ledger.
        recorded: String,
        /// Fingerprint of the incoming batch.
        batch: String,
    },
}

fn first_violation(violations: &[VersionViolation]) -> String {
    violations
        .first()
        .map_or_else(|| "none".to_string(), ToString::to_string)
}

impl LoadError {
    /// Whether this error came from an invariant check rather than bad input.
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::VersioningRejected { .. } | Self::DuplicateFactKey { .. } | Self::AmountOverflow { .. }
        )
    }
}
