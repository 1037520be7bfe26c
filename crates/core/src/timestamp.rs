//! Precision-carrying timestamp literal
//!
//! A `KgTimestamp` is a UTC instant together with the precision the writer
//! actually knows it at. Precision is coarsening-inclusive: a value known to
//! the month also has a meaningful year.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use kglog_core::{KgTimestamp, TimestampPrecision};
//!
//! let ts = KgTimestamp::new(
//!     Utc.with_ymd_and_hms(1969, 7, 20, 0, 0, 0).unwrap(),
//!     TimestampPrecision::Month,
//! );
//! assert!(ts.is_meaningful(TimestampPrecision::Year));
//! assert!(!ts.is_meaningful(TimestampPrecision::Day));
//! ```

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// How much of a timestamp is meaningful
///
/// Variants are ordered from coarsest to finest. `Unknown` carries no
/// meaningful component at all.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPrecision {
    /// Nothing is known about the instant
    #[default]
    Unknown,
    /// Year only
    Year,
    /// Year and month
    Month,
    /// Calendar day
    Day,
    /// Hour of day
    Hour,
    /// Minute of hour
    Minute,
    /// Whole seconds
    Second,
    /// Full sub-second precision
    Nanosecond,
}

/// UTC instant with an explicit precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KgTimestamp {
    /// The instant
    pub value: DateTime<Utc>,
    /// Finest meaningful component of `value`
    pub precision: TimestampPrecision,
}

impl KgTimestamp {
    /// Create a timestamp at the given precision
    pub fn new(value: DateTime<Utc>, precision: TimestampPrecision) -> Self {
        KgTimestamp { value, precision }
    }

    /// Whether `component` is meaningful at this timestamp's precision
    ///
    /// Asking about `Unknown` is always false.
    pub fn is_meaningful(&self, component: TimestampPrecision) -> bool {
        component != TimestampPrecision::Unknown && self.precision >= component
    }

    /// The instant with every component finer than the precision zeroed.
    ///
    /// Two timestamps that agree on all meaningful components truncate to
    /// the same instant.
    pub fn truncated(&self) -> DateTime<Utc> {
        let v = self.value;
        let (month, day, hour, minute, second, nanos) = match self.precision {
            TimestampPrecision::Unknown => return DateTime::<Utc>::default(),
            TimestampPrecision::Year => (1, 1, 0, 0, 0, 0),
            TimestampPrecision::Month => (v.month(), 1, 0, 0, 0, 0),
            TimestampPrecision::Day => (v.month(), v.day(), 0, 0, 0, 0),
            TimestampPrecision::Hour => (v.month(), v.day(), v.hour(), 0, 0, 0),
            TimestampPrecision::Minute => (v.month(), v.day(), v.hour(), v.minute(), 0, 0),
            TimestampPrecision::Second => {
                (v.month(), v.day(), v.hour(), v.minute(), v.second(), 0)
            }
            TimestampPrecision::Nanosecond => return v,
        };
        Utc.with_ymd_and_hms(v.year(), month, day, hour, minute, second)
            .single()
            .and_then(|dt| dt.with_nanosecond(nanos))
            .unwrap_or(v)
    }
}
