//! Property tests for aggregation and versioning.

use std::collections::BTreeMap;

use bookload_core::{
    aggregate, fold_batch, fold_batch_partitioned, validate_history, Attributes, BookingType,
    CustomerId, CustomerSnapshot, DimensionVersionRow, EndConvention, FactAggregateRow,
    JoinedRecord, RunId, Versioner,
};
use chrono::{Days, NaiveDate};
use proptest::prelude::*;

fn joined(kind: u8, customer: u8, total_cost: i64, quantity: i64) -> JoinedRecord {
    JoinedRecord {
        customer_id: CustomerId::new(format!("C{customer}")).unwrap(),
        booking_type: BookingType::new(["flight", "hotel", "car"][usize::from(kind % 3)]).unwrap(),
        total_cost,
        quantity,
    }
}

fn record_strategy() -> impl Strategy<Value = JoinedRecord> {
    (0u8..3, 0u8..6, -10_000i64..100_000, 1i64..20)
        .prop_map(|(kind, customer, cost, quantity)| joined(kind, customer, cost, quantity))
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

proptest! {
    #[test]
    fn conservation_across_runs(runs in prop::collection::vec(prop::collection::vec(record_strategy(), 0..30), 1..6)) {
        let mut state: Option<Vec<FactAggregateRow>> = None;
        let mut expected: BTreeMap<(String, String), (i64, i64)> = BTreeMap::new();

        for run in &runs {
            for record in run {
                let entry = expected
                    .entry((record.booking_type.to_string(), record.customer_id.to_string()))
                    .or_default();
                entry.0 += record.total_cost;
                entry.1 += record.quantity;
            }
            let result = aggregate(run, state.as_deref(), 3).unwrap();
            state = Some(result.rows);
        }

        let rows = state.unwrap_or_default();
        prop_assert_eq!(rows.len(), expected.len());
        for row in rows {
            let key = (row.booking_type.to_string(), row.customer_id.to_string());
            prop_assert_eq!(expected[&key], (row.total_amount_sum, row.total_quantity_sum));
        }
    }

    #[test]
    fn partition_count_does_not_change_totals(records in prop::collection::vec(record_strategy(), 0..80), partitions in 1usize..9) {
        prop_assert_eq!(fold_batch_partitioned(&records, partitions).unwrap(), fold_batch(&records).unwrap());
    }

    #[test]
    fn aggregation_is_idempotent_against_same_prior(records in prop::collection::vec(record_strategy(), 0..30)) {
        let prior = aggregate(&records, None, 1).unwrap().rows;
        let first = aggregate(&records, Some(&prior), 1).unwrap();
        let second = aggregate(&records, Some(&prior), 2).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn versioning_keeps_temporal_partition(
        runs in prop::collection::vec(prop::collection::vec((0u8..4, 0u8..3), 0..5), 1..10),
        inclusive in any::<bool>(),
    ) {
        let convention = if inclusive { EndConvention::Inclusive } else { EndConvention::Exclusive };
        let versioner = Versioner::new(convention);
        let mut table: Vec<DimensionVersionRow> = Vec::new();

        for (day, run) in runs.iter().enumerate() {
            let valid_from = base_date() + Days::new(day as u64 * 7);
            let run_id = RunId::new(valid_from.to_string()).unwrap();
            let snapshots: BTreeMap<CustomerId, CustomerSnapshot> = run
                .iter()
                .map(|(customer, tier)| {
                    let customer_id = CustomerId::new(format!("C{customer}")).unwrap();
                    let snapshot = CustomerSnapshot {
                        customer_id: customer_id.clone(),
                        attributes: Attributes::new().with("tier", *tier),
                        valid_from,
                        as_of_batch: run_id.clone(),
                    };
                    (customer_id, snapshot)
                })
                .collect();

            let plan = versioner.plan(&table, &snapshots).unwrap();
            let again = versioner.plan(&table, &snapshots).unwrap();
            prop_assert_eq!(&plan, &again);

            plan.apply_to(&mut table).unwrap();
            prop_assert!(validate_history(&table, convention).is_empty());

            // Re-delivering the same run on top of its own result changes nothing.
            prop_assert!(versioner.plan(&table, &snapshots).unwrap().is_empty());
        }
    }
}
