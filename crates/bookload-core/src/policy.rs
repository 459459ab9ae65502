//! Load policies that callers choose per deployment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How a closed version's `valid_to` relates to its successor's `valid_from`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndConvention {
    /// `valid_to` is the successor's `valid_from`: the interval is `[valid_from, valid_to)`.
    #[default]
    Exclusive,

    /// `valid_to` is the day before the successor's `valid_from`: `[valid_from, valid_to]`.
    Inclusive,
}

impl EndConvention {
    /// The `valid_to` a version must carry when its successor starts at `next_valid_from`.
    ///
    /// Returns `None` if the boundary falls outside the calendar range.
    #[must_use]
    pub fn closing_boundary(self, next_valid_from: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Exclusive => Some(next_valid_from),
            Self::Inclusive => next_valid_from.pred_opt(),
        }
    }

    /// Whether a closed interval from `valid_from` to `valid_to` covers at least one day.
    #[must_use]
    pub fn is_non_empty(self, valid_from: NaiveDate, valid_to: NaiveDate) -> bool {
        match self {
            Self::Exclusive => valid_to > valid_from,
            Self::Inclusive => valid_to >= valid_from,
        }
    }

    /// Whether `date` falls on or before a closed `valid_to` under this convention.
    #[must_use]
    pub fn ends_after(self, valid_to: NaiveDate, date: NaiveDate) -> bool {
        match self {
            Self::Exclusive => date < valid_to,
            Self::Inclusive => date <= valid_to,
        }
    }

    /// Get the convention name as a string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exclusive => "exclusive",
            Self::Inclusive => "inclusive",
        }
    }

    /// Parse a convention name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exclusive" => Some(Self::Exclusive),
            "inclusive" => Some(Self::Inclusive),
            _ => None,
        }
    }
}

/// What to do when one batch carries several snapshots for the same customer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateCustomerPolicy {
    /// Fail the run with `DuplicateCustomerInBatch`.
    #[default]
    Reject,

    /// Keep the last snapshot in arrival order and drop the earlier ones.
    LastWins,
}

impl DuplicateCustomerPolicy {
    /// Get the policy name as a string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::LastWins => "last_wins",
        }
    }

    /// Parse a policy name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reject" => Some(Self::Reject),
            "last_wins" => Some(Self::LastWins),
            _ => None,
        }
    }
}
