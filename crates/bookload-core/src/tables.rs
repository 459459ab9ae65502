//! Rows of the two derived tables.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ids::{BookingType, CustomerId};
use crate::records::{Attributes, CustomerSnapshot};

/// Key of the fact aggregate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactKey {
    /// Kind of booking.
    pub booking_type: BookingType,
    /// The customer.
    pub customer_id: CustomerId,
}

impl FactKey {
    /// Create a key.
    #[must_use]
    pub fn new(booking_type: BookingType, customer_id: CustomerId) -> Self {
        Self {
            booking_type,
            customer_id,
        }
    }
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.booking_type, self.customer_id)
    }
}

/// One row of the additive fact aggregate.
///
/// The sums cover every valid booking ever processed for the key, across all runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactAggregateRow {
    /// Kind of booking.
    pub booking_type: BookingType,

    /// The customer.
    pub customer_id: CustomerId,

    /// Sum of net cost in cents.
    pub total_amount_sum: i64,

    /// Sum of units booked.
    pub total_quantity_sum: i64,
}

impl FactAggregateRow {
    /// The row's key.
    #[must_use]
    pub fn key(&self) -> FactKey {
        FactKey::new(self.booking_type.clone(), self.customer_id.clone())
    }
}

/// End of a version's validity.
///
/// `Open` orders after every date, so sorting by `valid_to` puts the current version last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidTo {
    /// Closed on the given date.
    Closed(NaiveDate),
    /// Still current.
    Open,
}

/// Marks the currently active version of a customer.
pub const OPEN_SENTINEL: ValidTo = ValidTo::Open;

impl ValidTo {
    /// Whether the version is still current.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// The closing date, if closed.
    #[must_use]
    pub fn closed_on(self) -> Option<NaiveDate> {
        match self {
            Self::Closed(date) => Some(date),
            Self::Open => None,
        }
    }
}

impl fmt::Display for ValidTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(date) => write!(f, "{date}"),
            Self::Open => f.write_str("open"),
        }
    }
}

/// One historical version of a customer's attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionVersionRow {
    /// The customer.
    pub customer_id: CustomerId,

    /// Attribute values for this version. Immutable once the version is closed.
    pub attributes: Attributes,

    /// First day of validity.
    pub valid_from: NaiveDate,

    /// End of validity, or `OPEN_SENTINEL` for the current version.
    pub valid_to: ValidTo,
}

impl DimensionVersionRow {
    /// Open a new current version from a snapshot.
    #[must_use]
    pub fn open_from(snapshot: &CustomerSnapshot) -> Self {
        Self {
            customer_id: snapshot.customer_id.clone(),
            attributes: snapshot.attributes.clone(),
            valid_from: snapshot.valid_from,
            valid_to: OPEN_SENTINEL,
        }
    }

    /// Whether this is the customer's current version.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.valid_to.is_open()
    }
}

/// Close the current version of a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionClose {
    /// Customer whose open version is closed.
    pub customer_id: CustomerId,

    /// The `valid_to` the open version receives.
    pub valid_to: NaiveDate,
}

/// Apply a close to the customer's open version in `rows`.
///
/// Returns `false` if the customer has no open version. Only `valid_to` changes.
pub fn close_open_version(rows: &mut [DimensionVersionRow], close: &VersionClose) -> bool {
    match rows
        .iter_mut()
        .find(|row| row.customer_id == close.customer_id && row.is_open())
    {
        Some(row) => {
            row.valid_to = ValidTo::Closed(close.valid_to);
            true
        }
        None => false,
    }
}
