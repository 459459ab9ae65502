//! Join & transform stage.
//!
//! Joins each booking with its customer's snapshot, derives `total_cost` and drops
//! bookings that cannot be aggregated. Record-level problems are collected and
//! returned; they never abort the run.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::error::{LoadError, Result};
use crate::ids::{BookingId, CustomerId};
use crate::policy::DuplicateCustomerPolicy;
use crate::records::{BookingRecord, CustomerSnapshot, JoinedRecord};

/// A booking that was dropped and reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RecordIssue {
    /// The booking's customer has no snapshot in this batch.
    #[error("booking {booking_id} references unknown customer {customer_id}")]
    UnmatchedCustomerReference {
        /// The dropped booking.
        booking_id: BookingId,
        /// The customer it referenced.
        customer_id: CustomerId,
    },

    /// The booking ID already appeared earlier in this batch.
    #[error("duplicate booking in batch: {booking_id}")]
    DuplicateBookingInBatch {
        /// The repeated booking.
        booking_id: BookingId,
    },

    /// `amount - discount` does not fit in `i64`.
    #[error("booking {booking_id} cost overflows")]
    CostOverflow {
        /// The dropped booking.
        booking_id: BookingId,
    },
}

/// Result of the join & transform stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    /// Records ready for aggregation, in input order.
    pub records: Vec<JoinedRecord>,

    /// Bookings dropped with an issue.
    pub issues: Vec<RecordIssue>,

    /// Matched bookings dropped because `quantity <= 0`.
    pub filtered: usize,
}

/// Build the customer lookup for one batch.
///
/// # Errors
///
/// Returns `LoadError::DuplicateCustomerInBatch` when a customer repeats and the
/// policy is `Reject`.
pub fn index_snapshots(
    snapshots: Vec<CustomerSnapshot>,
    policy: DuplicateCustomerPolicy,
) -> Result<BTreeMap<CustomerId, CustomerSnapshot>> {
    let mut index = BTreeMap::new();
    for snapshot in snapshots {
        let customer_id = snapshot.customer_id.clone();
        if let Some(previous) = index.insert(customer_id.clone(), snapshot) {
            match policy {
                DuplicateCustomerPolicy::Reject => {
                    return Err(LoadError::DuplicateCustomerInBatch { customer_id });
                }
                DuplicateCustomerPolicy::LastWins => {
                    tracing::debug!(
                        customer_id = %customer_id,
                        dropped_valid_from = %previous.valid_from,
                        "Superseded earlier snapshot in batch"
                    );
                }
            }
        }
    }
    Ok(index)
}

/// Join bookings with customers and derive aggregation inputs.
#[must_use]
pub fn join_bookings(
    bookings: &[BookingRecord],
    customers: &BTreeMap<CustomerId, CustomerSnapshot>,
) -> TransformOutput {
    let mut output = TransformOutput::default();
    let mut seen: HashSet<&BookingId> = HashSet::with_capacity(bookings.len());

    for booking in bookings {
        if !seen.insert(&booking.booking_id) {
            output.issues.push(RecordIssue::DuplicateBookingInBatch {
                booking_id: booking.booking_id.clone(),
            });
            continue;
        }

        if !customers.contains_key(&booking.customer_id) {
            output.issues.push(RecordIssue::UnmatchedCustomerReference {
                booking_id: booking.booking_id.clone(),
                customer_id: booking.customer_id.clone(),
            });
            continue;
        }

        if !booking.is_valid() {
            output.filtered += 1;
            continue;
        }

        let Some(total_cost) = booking.total_cost() else {
            output.issues.push(RecordIssue::CostOverflow {
                booking_id: booking.booking_id.clone(),
            });
            continue;
        };

        output.records.push(JoinedRecord {
            customer_id: booking.customer_id.clone(),
            booking_type: booking.booking_type.clone(),
            total_cost,
            quantity: booking.quantity,
        });
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BookingType, RunId};
    use crate::records::Attributes;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(customer: &str, name: &str, valid_from: NaiveDate) -> CustomerSnapshot {
        CustomerSnapshot {
            customer_id: CustomerId::new(customer).unwrap(),
            attributes: Attributes::new().with("name", name),
            valid_from,
            as_of_batch: RunId::new("run-1").unwrap(),
        }
    }

    fn booking(id: &str, customer: &str, amount: i64, discount: i64, quantity: i64) -> BookingRecord {
        BookingRecord {
            booking_id: BookingId::new(id).unwrap(),
            customer_id: CustomerId::new(customer).unwrap(),
            booking_type: BookingType::new("flight").unwrap(),
            amount,
            discount,
            quantity,
            arrival_date: date(2024, 1, 1),
        }
    }

    #[test]
    fn duplicate_customer_rejected_by_default() {
        let snapshots = vec![
            snapshot("C1", "Alice", date(2024, 1, 1)),
            snapshot("C1", "Alicia", date(2024, 1, 1)),
        ];
        let result = index_snapshots(snapshots, DuplicateCustomerPolicy::default());
        assert!(matches!(
            result,
            Err(LoadError::DuplicateCustomerInBatch { customer_id }) if customer_id.as_str() == "C1"
        ));
    }

    #[test]
    fn duplicate_customer_last_wins() {
        let snapshots = vec![
            snapshot("C1", "Alice", date(2024, 1, 1)),
            snapshot("C2", "Bob", date(2024, 1, 1)),
            snapshot("C1", "Alicia", date(2024, 1, 1)),
        ];
        let index = index_snapshots(snapshots, DuplicateCustomerPolicy::LastWins).unwrap();
        assert_eq!(index.len(), 2);
        let c1 = &index[&CustomerId::new("C1").unwrap()];
        assert_eq!(c1.attributes.get("name").unwrap(), "Alicia");
    }

    #[test]
    fn joins_filters_and_reports() {
        let customers = index_snapshots(
            vec![snapshot("C1", "Alice", date(2024, 1, 1))],
            DuplicateCustomerPolicy::Reject,
        )
        .unwrap();

        let bookings = vec![
            booking("B1", "C1", 12_000, 2_000, 2),
            booking("B2", "C404", 5_000, 0, 1),
            booking("B3", "C1", 5_000, 0, 0),
            booking("B1", "C1", 12_000, 2_000, 2),
        ];

        let output = join_bookings(&bookings, &customers);

        assert_eq!(
            output.records,
            vec![JoinedRecord {
                customer_id: CustomerId::new("C1").unwrap(),
                booking_type: BookingType::new("flight").unwrap(),
                total_cost: 10_000,
                quantity: 2,
            }]
        );
        assert_eq!(output.filtered, 1);
        assert_eq!(
            output.issues,
            vec![
                RecordIssue::UnmatchedCustomerReference {
                    booking_id: BookingId::new("B2").unwrap(),
                    customer_id: CustomerId::new("C404").unwrap(),
                },
                RecordIssue::DuplicateBookingInBatch {
                    booking_id: BookingId::new("B1").unwrap(),
                },
            ]
        );
    }

    #[test]
    fn cost_overflow_is_reported() {
        let customers = index_snapshots(
            vec![snapshot("C1", "Alice", date(2024, 1, 1))],
            DuplicateCustomerPolicy::Reject,
        )
        .unwrap();
        let output = join_bookings(&[booking("B1", "C1", i64::MIN, 1, 1)], &customers);
        assert!(output.records.is_empty());
        assert!(matches!(output.issues[0], RecordIssue::CostOverflow { .. }));
    }

    #[test]
    fn record_issue_serializes_with_kind_tag() {
        let issue = RecordIssue::DuplicateBookingInBatch {
            booking_id: BookingId::new("B1").unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&issue).unwrap(),
            serde_json::json!({"kind": "duplicate_booking_in_batch", "booking_id": "B1"})
        );
    }
}
