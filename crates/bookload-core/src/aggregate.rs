//! Fact aggregator.
//!
//! Folds joined records into per-key batch sums, then merges them with the prior
//! aggregate: matching keys are added, new keys are seeded from the batch and
//! prior-only keys are carried forward. The result is the complete replacement row
//! set for the fact table.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::error::{LoadError, Result};
use crate::records::JoinedRecord;
use crate::tables::{FactAggregateRow, FactKey};

/// Running sums for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactSums {
    /// Sum of net cost in cents.
    pub amount: i64,
    /// Sum of units.
    pub quantity: i64,
}

impl FactSums {
    /// Add two sums, or `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        Some(Self {
            amount: self.amount.checked_add(other.amount)?,
            quantity: self.quantity.checked_add(other.quantity)?,
        })
    }
}

/// Outcome of merging a batch into the prior aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactAggregate {
    /// One row per key ever observed, ordered by key.
    pub rows: Vec<FactAggregateRow>,
    /// Prior keys whose sums grew.
    pub keys_updated: usize,
    /// Keys seen for the first time.
    pub keys_inserted: usize,
    /// Prior keys absent from the batch.
    pub keys_carried: usize,
}

impl FactAggregate {
    /// Whether the batch contributed nothing.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.keys_updated == 0 && self.keys_inserted == 0
    }
}

fn add_into(totals: &mut BTreeMap<FactKey, FactSums>, key: FactKey, sums: FactSums) -> Result<()> {
    match totals.get_mut(&key) {
        Some(slot) => {
            *slot = slot
                .checked_add(sums)
                .ok_or_else(|| LoadError::AmountOverflow { key })?;
        }
        None => {
            totals.insert(key, sums);
        }
    }
    Ok(())
}

/// Group records by key, summing cost and quantity.
///
/// # Errors
///
/// Returns `LoadError::AmountOverflow` if a sum leaves the `i64` range.
pub fn fold_batch(records: &[JoinedRecord]) -> Result<BTreeMap<FactKey, FactSums>> {
    let mut totals = BTreeMap::new();
    for record in records {
        let key = FactKey::new(record.booking_type.clone(), record.customer_id.clone());
        add_into(
            &mut totals,
            key,
            FactSums {
                amount: record.total_cost,
                quantity: record.quantity,
            },
        )?;
    }
    Ok(totals)
}

/// Same as [`fold_batch`], folding up to `partitions` slices of the input on the
/// rayon pool.
///
/// The partition count is capped at `rayon::current_num_threads()`. Partial sums
/// are merged by addition, so the result does not depend on the partition count.
///
/// # Errors
///
/// Returns `LoadError::AmountOverflow` if a sum leaves the `i64` range.
pub fn fold_batch_partitioned(
    records: &[JoinedRecord],
    partitions: usize,
) -> Result<BTreeMap<FactKey, FactSums>> {
    let partitions = partitions.min(rayon::current_num_threads());
    if partitions <= 1 || records.len() < 2 {
        return fold_batch(records);
    }

    let chunk_size = records.len().div_ceil(partitions);
    let partials: Vec<BTreeMap<FactKey, FactSums>> = records
        .par_chunks(chunk_size)
        .map(fold_batch)
        .collect::<Result<_>>()?;

    let mut totals = BTreeMap::new();
    for partial in partials {
        for (key, sums) in partial {
            add_into(&mut totals, key, sums)?;
        }
    }
    Ok(totals)
}

/// Merge batch sums into the prior aggregate.
///
/// `prior` is `None` when the fact table does not exist yet.
///
/// # Errors
///
/// - `LoadError::DuplicateFactKey` if the prior state repeats a key.
/// - `LoadError::AmountOverflow` if a sum leaves the `i64` range.
pub fn merge_with_prior(
    prior: Option<&[FactAggregateRow]>,
    batch: BTreeMap<FactKey, FactSums>,
) -> Result<FactAggregate> {
    let mut merged: BTreeMap<FactKey, FactSums> = BTreeMap::new();
    for row in prior.unwrap_or_default() {
        let sums = FactSums {
            amount: row.total_amount_sum,
            quantity: row.total_quantity_sum,
        };
        if merged.insert(row.key(), sums).is_some() {
            return Err(LoadError::DuplicateFactKey { key: row.key() });
        }
    }

    let prior_keys = merged.len();
    let mut keys_updated = 0;
    let mut keys_inserted = 0;
    for (key, sums) in batch {
        if merged.contains_key(&key) {
            keys_updated += 1;
        } else {
            keys_inserted += 1;
        }
        add_into(&mut merged, key, sums)?;
    }

    let rows = merged
        .into_iter()
        .map(|(key, sums)| FactAggregateRow {
            booking_type: key.booking_type,
            customer_id: key.customer_id,
            total_amount_sum: sums.amount,
            total_quantity_sum: sums.quantity,
        })
        .collect();

    Ok(FactAggregate {
        rows,
        keys_updated,
        keys_inserted,
        keys_carried: prior_keys - keys_updated,
    })
}

/// Fold `records` and merge them into `prior`.
///
/// # Errors
///
/// See [`fold_batch_partitioned`] and [`merge_with_prior`].
pub fn aggregate(
    records: &[JoinedRecord],
    prior: Option<&[FactAggregateRow]>,
    partitions: usize,
) -> Result<FactAggregate> {
    let batch = fold_batch_partitioned(records, partitions)?;
    let result = merge_with_prior(prior, batch)?;
    tracing::debug!(
        rows = result.rows.len(),
        keys_updated = result.keys_updated,
        keys_inserted = result.keys_inserted,
        keys_carried = result.keys_carried,
        "Fact aggregate computed"
    );
    Ok(result)
}
