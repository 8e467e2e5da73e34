//! Time units and time values used by benchmark configuration knobs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Unit a time value or a reported score is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 7] = [
        TimeUnit::Nanoseconds,
        TimeUnit::Microseconds,
        TimeUnit::Milliseconds,
        TimeUnit::Seconds,
        TimeUnit::Minutes,
        TimeUnit::Hours,
        TimeUnit::Days,
    ];

    /// Short label used in the benchmark list and in time value text.
    pub fn label(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "hr",
            TimeUnit::Days => "day",
        }
    }

    /// Number of nanoseconds in one unit.
    pub fn nanos(self) -> u64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 3_600 * 1_000_000_000,
            TimeUnit::Days => 86_400 * 1_000_000_000,
        }
    }

    /// Express `duration` as a fractional count of this unit.
    pub fn convert(self, duration: Duration) -> f64 {
        duration.as_nanos() as f64 / self.nanos() as f64
    }

    /// Rust expression naming this unit in generated code.
    pub fn rust_path(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "TimeUnit::Nanoseconds",
            TimeUnit::Microseconds => "TimeUnit::Microseconds",
            TimeUnit::Milliseconds => "TimeUnit::Milliseconds",
            TimeUnit::Seconds => "TimeUnit::Seconds",
            TimeUnit::Minutes => "TimeUnit::Minutes",
            TimeUnit::Hours => "TimeUnit::Hours",
            TimeUnit::Days => "TimeUnit::Days",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        TimeUnit::ALL
            .iter()
            .copied()
            .find(|u| u.label() == s)
            .or_else(|| match s.to_ascii_lowercase().as_str() {
                "nanoseconds" => Some(TimeUnit::Nanoseconds),
                "microseconds" => Some(TimeUnit::Microseconds),
                "milliseconds" => Some(TimeUnit::Milliseconds),
                "seconds" | "sec" => Some(TimeUnit::Seconds),
                "minutes" | "m" => Some(TimeUnit::Minutes),
                "hours" | "h" => Some(TimeUnit::Hours),
                "days" | "d" => Some(TimeUnit::Days),
                _ => None,
            })
            .ok_or_else(|| format!("unknown time unit: {s}"))
    }
}

/// A time amount with its unit, e.g. `10 s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeValue {
    pub time: u64,
    pub unit: TimeUnit,
}

impl TimeValue {
    pub fn new(time: u64, unit: TimeUnit) -> Self {
        Self { time, unit }
    }

    pub fn seconds(time: u64) -> Self {
        Self::new(time, TimeUnit::Seconds)
    }

    pub fn milliseconds(time: u64) -> Self {
        Self::new(time, TimeUnit::Milliseconds)
    }

    pub fn to_duration(self) -> Duration {
        Duration::from_nanos(self.time.saturating_mul(self.unit.nanos()))
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time, self.unit)
    }
}

impl FromStr for TimeValue {
    type Err = String;

    /// Accepts `10 s`, `10s` and `250ms`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("time value without unit: {s}"))?;
        let (digits, unit) = s.split_at(split);
        let time = digits
            .parse::<u64>()
            .map_err(|e| format!("bad time value {s}: {e}"))?;
        Ok(TimeValue::new(time, unit.parse()?))
    }
}
