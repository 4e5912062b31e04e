//! Value transforms applied before numeric comparisons.
use chrono::{DateTime, DurationRound, TimeDelta};

use super::{DataType, MatchValue};

/// How datetime values are truncated before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Truncation {
    /// Midnight UTC. Used by equality, so that "same day" matches.
    Day,
    /// Start of the minute. Used by ranges.
    Minute,
}

/// Converts matcher and input values into comparable integers according to the matcher data
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transform {
    data_type: DataType,
    truncation: Truncation,
}

impl Transform {
    pub(crate) fn new(data_type: DataType, truncation: Truncation) -> Transform {
        Transform {
            data_type,
            truncation,
        }
    }

    /// Transform a value received from the server.
    ///
    /// Datetime values arrive as milliseconds since epoch.
    pub(crate) fn server_value(&self, value: i64) -> Option<i64> {
        match self.data_type {
            DataType::Number => Some(value),
            DataType::Datetime => self.truncate(value.div_euclid(1000)),
        }
    }

    /// Transform a value the matcher is evaluated against. Returns `None` if the value cannot be
    /// coerced to an integer.
    ///
    /// Datetime inputs are seconds since epoch.
    pub(crate) fn input(&self, value: &MatchValue) -> Option<i64> {
        let value = value.as_i64()?;
        match self.data_type {
            DataType::Number => Some(value),
            DataType::Datetime => self.truncate(value),
        }
    }

    fn truncate(&self, seconds: i64) -> Option<i64> {
        let unit = match self.truncation {
            Truncation::Day => TimeDelta::days(1),
            Truncation::Minute => TimeDelta::minutes(1),
        };
        let truncated = DateTime::from_timestamp(seconds, 0)?
            .duration_trunc(unit)
            .ok()?;
        Some(truncated.timestamp())
    }
}
