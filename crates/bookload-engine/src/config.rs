//! Load configuration.

use std::time::Duration;

use bookload_core::{DuplicateCustomerPolicy, EndConvention};

/// Configuration for incremental loads, loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// Path to `RocksDB` data directory (default: "/data/bookload").
    pub data_dir: String,

    /// Dimension boundary convention (default: exclusive).
    pub end_convention: EndConvention,

    /// Handling of repeated customers within one batch (default: reject).
    pub duplicate_customers: DuplicateCustomerPolicy,

    /// Number of partitions the fact aggregator folds in parallel (default: 1).
    pub aggregate_partitions: usize,

    /// Caller-side limit for one run, in seconds (default: none).
    pub run_timeout_seconds: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            data_dir: "/data/bookload".into(),
            end_convention: EndConvention::default(),
            duplicate_customers: DuplicateCustomerPolicy::default(),
            aggregate_partitions: 1,
            run_timeout_seconds: None,
        }
    }
}

impl LoadConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to their defaults with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let end_convention = parse_or_default(
            "END_CONVENTION",
            lookup("END_CONVENTION"),
            EndConvention::parse,
            defaults.end_convention,
        );
        let duplicate_customers = parse_or_default(
            "DUPLICATE_CUSTOMERS",
            lookup("DUPLICATE_CUSTOMERS"),
            DuplicateCustomerPolicy::parse,
            defaults.duplicate_customers,
        );
        let aggregate_partitions = parse_or_default(
            "AGGREGATE_PARTITIONS",
            lookup("AGGREGATE_PARTITIONS"),
            |value| value.parse().ok().filter(|&n: &usize| n > 0),
            defaults.aggregate_partitions,
        );
        let run_timeout_seconds = lookup("RUN_TIMEOUT_SECONDS").and_then(|value| {
            let parsed = value.parse().ok().filter(|&secs: &u64| secs > 0);
            if parsed.is_none() {
                tracing::warn!(value = %value, "Ignoring invalid RUN_TIMEOUT_SECONDS");
            }
            parsed
        });

        Self {
            data_dir: lookup("DATA_DIR").unwrap_or(defaults.data_dir),
            end_convention,
            duplicate_customers,
            aggregate_partitions,
            run_timeout_seconds,
        }
    }

    /// The run timeout, if one is configured.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_seconds.map(Duration::from_secs)
    }
}

fn parse_or_default<T: Copy + std::fmt::Debug>(
    name: &str,
    value: Option<String>,
    parse: impl Fn(&str) -> Option<T>,
    default: T,
) -> T {
    let Some(value) = value else {
        return default;
    };
    parse(value.trim()).unwrap_or_else(|| {
        tracing::warn!(variable = name, value = %value, default = ?default, "Invalid value, using default");
        default
    })
}
