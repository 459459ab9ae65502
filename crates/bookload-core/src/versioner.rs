//! Dimension versioner (SCD2).
//!
//! Per customer the history moves from *unknown* (no rows) to *active* (exactly one
//! open row above zero or more closed rows). For each incoming snapshot:
//!
//! 1. Unknown customer: open a first version at the snapshot's `valid_from`.
//! 2. Identical attributes: no-op, whatever the snapshot date.
//! 3. Changed attributes dated after the open version: close it at the boundary
//!    given by `EndConvention` and open a new version.
//! 4. Changed attributes dated on or before the open version: `NonMonotonicVersionDate`.
//!
//! The versioner never writes. It returns a [`DimensionPlan`] that has already been
//! checked against the temporal partition; any violation rejects the whole plan.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{LoadError, Result};
use crate::history::{validate_history, VersionViolation};
use crate::ids::CustomerId;
use crate::policy::EndConvention;
use crate::records::CustomerSnapshot;
use crate::tables::{close_open_version, DimensionVersionRow, VersionClose};

/// Mutations to apply to the dimension table for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DimensionPlan {
    /// Open versions to close, one per changed customer.
    pub closes: Vec<VersionClose>,

    /// New open versions, for changed and first-seen customers.
    pub inserts: Vec<DimensionVersionRow>,

    /// Snapshots that matched the open version and produced nothing.
    pub unchanged: usize,
}

impl DimensionPlan {
    /// Whether the plan mutates nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty() && self.inserts.is_empty()
    }

    /// Apply the plan to an in-memory copy of the table: closes first, then inserts.
    ///
    /// # Errors
    ///
    /// Returns the customer whose open version could not be found.
    pub fn apply_to(&self, rows: &mut Vec<DimensionVersionRow>) -> std::result::Result<(), CustomerId> {
        for close in &self.closes {
            if !close_open_version(rows, close) {
                return Err(close.customer_id.clone());
            }
        }
        rows.extend(self.inserts.iter().cloned());
        Ok(())
    }
}

/// Computes SCD2 mutation plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct Versioner {
    convention: EndConvention,
}

impl Versioner {
    /// Create a versioner using the given boundary convention.
    #[must_use]
    pub fn new(convention: EndConvention) -> Self {
        Self { convention }
    }

    /// The boundary convention in use.
    #[must_use]
    pub fn convention(&self) -> EndConvention {
        self.convention
    }

    /// Compute the mutations that fold `snapshots` into `current`.
    ///
    /// `snapshots` holds at most one snapshot per customer; see
    /// [`crate::transform::index_snapshots`].
    ///
    /// # Errors
    ///
    /// Returns `LoadError::VersioningRejected` listing every violation when the
    /// existing history is malformed, a snapshot is non-monotonic, or the resulting
    /// history would break the temporal partition.
    pub fn plan(
        &self,
        current: &[DimensionVersionRow],
        snapshots: &BTreeMap<CustomerId, CustomerSnapshot>,
    ) -> Result<DimensionPlan> {
        let existing = validate_history(current, self.convention);
        if !existing.is_empty() {
            return Err(LoadError::VersioningRejected {
                violations: existing,
            });
        }

        let open_versions: BTreeMap<&CustomerId, &DimensionVersionRow> = current
            .iter()
            .filter(|row| row.is_open())
            .map(|row| (&row.customer_id, row))
            .collect();

        let mut plan = DimensionPlan::default();
        let mut violations = Vec::new();

        for (customer_id, snapshot) in snapshots {
            let Some(open) = open_versions.get(customer_id) else {
                plan.inserts.push(DimensionVersionRow::open_from(snapshot));
                continue;
            };

            if open.attributes == snapshot.attributes {
                plan.unchanged += 1;
                continue;
            }

            if snapshot.valid_from <= open.valid_from {
                violations.push(VersionViolation::NonMonotonicVersionDate {
                    customer_id: customer_id.clone(),
                    open_valid_from: open.valid_from,
                    snapshot_valid_from: snapshot.valid_from,
                });
                continue;
            }

            match self.convention.closing_boundary(snapshot.valid_from) {
                Some(valid_to) => {
                    plan.closes.push(VersionClose {
                        customer_id: customer_id.clone(),
                        valid_to,
                    });
                    plan.inserts.push(DimensionVersionRow::open_from(snapshot));
                }
                None => violations.push(VersionViolation::BoundaryOutOfRange {
                    customer_id: customer_id.clone(),
                    valid_from: snapshot.valid_from,
                }),
            }
        }

        if violations.is_empty() {
            violations = self.check_projected(current, &plan);
        }
        if !violations.is_empty() {
            return Err(LoadError::VersioningRejected { violations });
        }

        tracing::debug!(
            closes = plan.closes.len(),
            inserts = plan.inserts.len(),
            unchanged = plan.unchanged,
            "Dimension plan computed"
        );
        Ok(plan)
    }

    /// Apply the plan to the touched customers' history and re-validate it.
    fn check_projected(&self, current: &[DimensionVersionRow], plan: &DimensionPlan) -> Vec<VersionViolation> {
        let touched: BTreeSet<&CustomerId> = plan
            .closes
            .iter()
            .map(|close| &close.customer_id)
            .chain(plan.inserts.iter().map(|row| &row.customer_id))
            .collect();

        let mut projected: Vec<DimensionVersionRow> = current
            .iter()
            .filter(|row| touched.contains(&row.customer_id))
            .cloned()
            .collect();

        if let Err(customer_id) = plan.apply_to(&mut projected) {
            return vec![VersionViolation::OpenVersionCount {
                customer_id,
                count: 0,
            }];
        }
        validate_history(&projected, self.convention)
    }
}
