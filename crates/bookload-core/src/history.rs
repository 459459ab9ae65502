//! Temporal-partition checks over dimension history.
//!
//! A customer's versions, sorted by `valid_from`, must tile time: each closed
//! version ends exactly where its successor begins (per `EndConvention`), every
//! closed interval covers at least one day, and exactly one version is open.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::ids::CustomerId;
use crate::policy::EndConvention;
use crate::tables::{DimensionVersionRow, ValidTo};

/// A way in which dimension history breaks the temporal partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VersionViolation {
    /// A changed snapshot is dated on or before the current version's start.
    #[error("non-monotonic version date for {customer_id}: snapshot {snapshot_valid_from} <= open version {open_valid_from}")]
    NonMonotonicVersionDate {
        /// The customer.
        customer_id: CustomerId,
        /// Start of the current open version.
        open_valid_from: NaiveDate,
        /// Start date carried by the rejected snapshot.
        snapshot_valid_from: NaiveDate,
    },

    /// Two versions cover the same day.
    #[error("overlapping versions for {customer_id}: version from {valid_from} runs into {next_valid_from}")]
    OverlappingVersionDetected {
        /// The customer.
        customer_id: CustomerId,
        /// Start of the earlier version.
        valid_from: NaiveDate,
        /// Start of the version it overlaps.
        next_valid_from: NaiveDate,
    },

    /// Days between two consecutive versions are covered by neither.
    #[error("gap in versions for {customer_id}: closed {closed_valid_to}, next starts {next_valid_from}")]
    VersionGapDetected {
        /// The customer.
        customer_id: CustomerId,
        /// End of the earlier version.
        closed_valid_to: NaiveDate,
        /// Start of the next version.
        next_valid_from: NaiveDate,
    },

    /// A closed version ends before it starts.
    #[error("empty version interval for {customer_id}: {valid_from} .. {valid_to}")]
    EmptyInterval {
        /// The customer.
        customer_id: CustomerId,
        /// Start of the version.
        valid_from: NaiveDate,
        /// Its closing date.
        valid_to: NaiveDate,
    },

    /// A seen customer must have exactly one open version.
    #[error("customer {customer_id} has {count} open versions")]
    OpenVersionCount {
        /// The customer.
        customer_id: CustomerId,
        /// Number of open versions found.
        count: usize,
    },

    /// The closing boundary for a new version is not representable.
    #[error("closing boundary out of range for {customer_id} at {valid_from}")]
    BoundaryOutOfRange {
        /// The customer.
        customer_id: CustomerId,
        /// Start of the version whose predecessor could not be closed.
        valid_from: NaiveDate,
    },
}

impl VersionViolation {
    /// The customer this violation concerns.
    #[must_use]
    pub fn customer_id(&self) -> &CustomerId {
        match self {
            Self::NonMonotonicVersionDate { customer_id, .. }
            | Self::OverlappingVersionDetected { customer_id, .. }
            | Self::VersionGapDetected { customer_id, .. }
            | Self::EmptyInterval { customer_id, .. }
            | Self::OpenVersionCount { customer_id, .. }
            | Self::BoundaryOutOfRange { customer_id, .. } => customer_id,
        }
    }
}

/// Group rows per customer, each group sorted by `valid_from` then `valid_to`.
#[must_use]
pub fn group_by_customer(
    rows: &[DimensionVersionRow],
) -> BTreeMap<&CustomerId, Vec<&DimensionVersionRow>> {
    let mut groups: BTreeMap<&CustomerId, Vec<&DimensionVersionRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(&row.customer_id).or_default().push(row);
    }
    for versions in groups.values_mut() {
        versions.sort_by(|a, b| {
            a.valid_from
                .cmp(&b.valid_from)
                .then(a.valid_to.cmp(&b.valid_to))
        });
    }
    groups
}

/// Check every customer's history, returning all violations found.
#[must_use]
pub fn validate_history(
    rows: &[DimensionVersionRow],
    convention: EndConvention,
) -> Vec<VersionViolation> {
    let mut violations = Vec::new();
    for (customer_id, versions) in group_by_customer(rows) {
        validate_customer(customer_id, &versions, convention, &mut violations);
    }
    violations
}

fn validate_customer(
    customer_id: &CustomerId,
    versions: &[&DimensionVersionRow],
    convention: EndConvention,
    out: &mut Vec<VersionViolation>,
) {
    let open = versions.iter().filter(|row| row.is_open()).count();
    if open != 1 {
        out.push(VersionViolation::OpenVersionCount {
            customer_id: customer_id.clone(),
            count: open,
        });
    }

    for row in versions {
        if let ValidTo::Closed(valid_to) = row.valid_to {
            if !convention.is_non_empty(row.valid_from, valid_to) {
                out.push(VersionViolation::EmptyInterval {
                    customer_id: customer_id.clone(),
                    valid_from: row.valid_from,
                    valid_to,
                });
            }
        }
    }

    for pair in versions.windows(2) {
        let (current, next) = (pair[0], pair[1]);
        let overlap = VersionViolation::OverlappingVersionDetected {
            customer_id: customer_id.clone(),
            valid_from: current.valid_from,
            next_valid_from: next.valid_from,
        };

        let ValidTo::Closed(valid_to) = current.valid_to else {
            // An open version with a successor covers the successor's days too.
            out.push(overlap);
            continue;
        };
        if current.valid_from == next.valid_from {
            out.push(overlap);
            continue;
        }
        match convention.closing_boundary(next.valid_from) {
            Some(expected) if valid_to > expected => out.push(overlap),
            Some(expected) if valid_to < expected => {
                out.push(VersionViolation::VersionGapDetected {
                    customer_id: customer_id.clone(),
                    closed_valid_to: valid_to,
                    next_valid_from: next.valid_from,
                });
            }
            Some(_) => {}
            None => out.push(VersionViolation::BoundaryOutOfRange {
                customer_id: customer_id.clone(),
                valid_from: next.valid_from,
            }),
        }
    }
}

/// The version of `customer_id` in effect on `date`, if any.
#[must_use]
pub fn version_as_of<'a>(
    rows: &'a [DimensionVersionRow],
    customer_id: &CustomerId,
    date: NaiveDate,
    convention: EndConvention,
) -> Option<&'a DimensionVersionRow> {
    rows.iter().find(|row| {
        row.customer_id == *customer_id
            && row.valid_from <= date
            && match row.valid_to {
                ValidTo::Open => true,
                ValidTo::Closed(valid_to) => convention.ends_after(valid_to, date),
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Attributes;
    use crate::tables::OPEN_SENTINEL;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(name: &str, from: NaiveDate, to: ValidTo) -> DimensionVersionRow {
        DimensionVersionRow {
            customer_id: CustomerId::new("C1").unwrap(),
            attributes: Attributes::new().with("name", name),
            valid_from: from,
            valid_to: to,
        }
    }

    #[test]
    fn well_formed_history_passes() {
        let rows = vec![
            row("Alicia", date(2024, 2, 1), OPEN_SENTINEL),
            row("Alice", date(2024, 1, 1), ValidTo::Closed(date(2024, 2, 1))),
        ];
        assert!(validate_history(&rows, EndConvention::Exclusive).is_empty());

        // Under the inclusive convention the closed version overlaps its successor by a day.
        let violations = validate_history(&rows, EndConvention::Inclusive);
        assert!(matches!(
            violations.as_slice(),
            [VersionViolation::OverlappingVersionDetected { .. }]
        ));
    }

    #[test]
    fn detects_gap() {
        let rows = vec![
            row("Alice", date(2024, 1, 1), ValidTo::Closed(date(2024, 1, 20))),
            row("Alicia", date(2024, 2, 1), OPEN_SENTINEL),
        ];
        let violations = validate_history(&rows, EndConvention::Exclusive);
        assert_eq!(
            violations,
            vec![VersionViolation::VersionGapDetected {
                customer_id: CustomerId::new("C1").unwrap(),
                closed_valid_to: date(2024, 1, 20),
                next_valid_from: date(2024, 2, 1),
            }]
        );
    }

    #[test]
    fn detects_two_open_versions() {
        let rows = vec![
            row("Alice", date(2024, 1, 1), OPEN_SENTINEL),
            row("Alicia", date(2024, 2, 1), OPEN_SENTINEL),
        ];
        let violations = validate_history(&rows, EndConvention::Exclusive);
        assert!(violations.contains(&VersionViolation::OpenVersionCount {
            customer_id: CustomerId::new("C1").unwrap(),
            count: 2,
        }));
        assert!(violations
            .iter()
            .any(|v| matches!(v, VersionViolation::OverlappingVersionDetected { .. })));
    }

    #[test]
    fn detects_missing_open_version_and_empty_interval() {
        let rows = vec![row(
            "Alice",
            date(2024, 1, 1),
            ValidTo::Closed(date(2024, 1, 1)),
        )];
        let violations = validate_history(&rows, EndConvention::Exclusive);
        assert_eq!(violations.len(), 2);
        assert!(violations
            .iter()
            .all(|v| v.customer_id().as_str() == "C1"));
    }

    #[test]
    fn as_of_lookup_respects_convention() {
        let rows = vec![
            row("Alice", date(2024, 1, 1), ValidTo::Closed(date(2024, 2, 1))),
            row("Alicia", date(2024, 2, 1), OPEN_SENTINEL),
        ];
        let customer = CustomerId::new("C1").unwrap();

        let before = version_as_of(&rows, &customer, date(2024, 1, 31), EndConvention::Exclusive);
        assert_eq!(before.unwrap().attributes.get("name").unwrap(), "Alice");

        let boundary = version_as_of(&rows, &customer, date(2024, 2, 1), EndConvention::Exclusive);
        assert_eq!(boundary.unwrap().attributes.get("name").unwrap(), "Alicia");

        assert!(version_as_of(&rows, &customer, date(2023, 12, 31), EndConvention::Exclusive).is_none());
    }
}
