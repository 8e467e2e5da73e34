//! Timing disciplines a benchmark can be measured under.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Benchmark timing mode.
///
/// `All` is an annotation-level shorthand and never survives group assembly:
/// it expands to the four concrete modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Operations per unit of time.
    Throughput,
    /// Time per operation.
    AverageTime,
    /// Sampled time per operation.
    SampleTime,
    /// Time of a single batch, no warmup catch-up.
    SingleShotTime,
    All,
}

impl Mode {
    pub const CONCRETE: [Mode; 4] = [
        Mode::Throughput,
        Mode::AverageTime,
        Mode::SampleTime,
        Mode::SingleShotTime,
    ];

    pub fn short_label(self) -> &'static str {
        match self {
            Mode::Throughput => "thrpt",
            Mode::AverageTime => "avgt",
            Mode::SampleTime => "sample",
            Mode::SingleShotTime => "ss",
            Mode::All => "all",
        }
    }

    /// Name used as the suffix of generated dispatch methods.
    pub fn long_label(self) -> &'static str {
        match self {
            Mode::Throughput => "Throughput",
            Mode::AverageTime => "AverageTime",
            Mode::SampleTime => "SampleTime",
            Mode::SingleShotTime => "SingleShotTime",
            Mode::All => "All",
        }
    }

    /// Expand `All` into the concrete modes and deduplicate.
    pub fn expand<I: IntoIterator<Item = Mode>>(modes: I) -> BTreeSet<Mode> {
        let mut out = BTreeSet::new();
        for m in modes {
            if m == Mode::All {
                out.extend(Mode::CONCRETE);
            } else {
                out.insert(m);
            }
        }
        out
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_label())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::CONCRETE
            .iter()
            .chain(std::iter::once(&Mode::All))
            .copied()
            .find(|m| m.short_label() == s || m.long_label().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown benchmark mode: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_expand_all_into_concrete_modes() {
        let modes = Mode::expand([Mode::All, Mode::Throughput]);
        assert_eq!(modes.len(), 4);
        assert!(!modes.contains(&Mode::All));
    }

    #[test]
    fn should_parse_short_and_long_labels() {
        assert_eq!("thrpt".parse::<Mode>(), Ok(Mode::Throughput));
        assert_eq!("averagetime".parse::<Mode>(), Ok(Mode::AverageTime));
        assert_eq!("ss".parse::<Mode>(), Ok(Mode::SingleShotTime));
        assert!("fast".parse::<Mode>().is_err());
    }
}
