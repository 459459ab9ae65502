//! Incoming batch records.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ids::{BookingId, BookingType, CustomerId, RunId};

/// A single booking as delivered by the ingestion layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    /// Unique booking ID.
    pub booking_id: BookingId,

    /// The customer who made the booking.
    pub customer_id: CustomerId,

    /// Kind of booking (`flight`, `hotel`, ...).
    pub booking_type: BookingType,

    /// Gross amount in cents.
    pub amount: i64,

    /// Discount in cents.
    pub discount: i64,

    /// Number of units booked.
    pub quantity: i64,

    /// Date the booking arrived upstream.
    pub arrival_date: NaiveDate,
}

impl BookingRecord {
    /// Net cost in cents (`amount - discount`), or `None` on overflow.
    #[must_use]
    pub fn total_cost(&self) -> Option<i64> {
        self.amount.checked_sub(self.discount)
    }

    /// Bookings with no positive quantity are excluded from aggregation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.quantity > 0
    }
}

/// Customer attribute values, ordered by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, serde_json::Value>);

impl Attributes {
    /// Create an empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Look up one attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Iterate attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A customer's attributes as observed in one batch. Not yet historized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    /// The customer.
    pub customer_id: CustomerId,

    /// Attribute values in this batch.
    pub attributes: Attributes,

    /// Date from which these values apply.
    pub valid_from: NaiveDate,

    /// Run that delivered this snapshot.
    pub as_of_batch: RunId,
}

/// A booking joined with its customer, ready for aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedRecord {
    /// The customer.
    pub customer_id: CustomerId,

    /// Kind of booking.
    pub booking_type: BookingType,

    /// Net cost in cents.
    pub total_cost: i64,

    /// Units booked, always positive.
    pub quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn booking(amount: i64, discount: i64, quantity: i64) -> BookingRecord {
        BookingRecord {
            booking_id: BookingId::new("B1").unwrap(),
            customer_id: CustomerId::new("C1").unwrap(),
            booking_type: BookingType::new("flight").unwrap(),
            amount,
            discount,
            quantity,
            arrival_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    #[test]
    fn total_cost_subtracts_discount() {
        assert_eq!(booking(12_000, 2_000, 1).total_cost(), Some(10_000));
        assert_eq!(booking(i64::MIN, 1, 1).total_cost(), None);
    }

    #[test]
    fn non_positive_quantity_is_invalid() {
        assert!(booking(100, 0, 1).is_valid());
        assert!(!booking(100, 0, 0).is_valid());
        assert!(!booking(100, 0, -3).is_valid());
    }

    #[test]
    fn attributes_compare_by_content() {
        let a = Attributes::new().with("name", "Alice").with("tier", 2);
        let b: Attributes = [("tier", json!(2)), ("name", json!("Alice"))]
            .into_iter()
            .collect();
        assert_eq!(a, b);
        assert_ne!(a, Attributes::new().with("name", "Alicia").with("tier", 2));
    }

    #[test]
    fn attributes_serialize_as_plain_object() {
        let attrs = Attributes::new().with("name", "Alice");
        assert_eq!(serde_json::to_value(&attrs).unwrap(), json!({"name": "Alice"}));
    }
}
