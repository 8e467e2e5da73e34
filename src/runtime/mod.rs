//! Support types generated harnesses link against.
//!
//! Generated code imports this module wholesale (`use
//! cntryl_microbench::runtime::*;`) and never reaches past it. The launcher
//! that drives harnesses builds an [`InfraControl`] per iteration and a
//! [`ThreadParams`] per worker thread; everything else here is used from
//! inside generated loops.

mod blackhole;
mod control;
mod params;
mod results;
mod spin;

use std::sync::{Mutex, MutexGuard};

pub use blackhole::Blackhole;
pub use control::{Control, InfraControl};
pub use params::{BenchmarkParams, IterationParams, ThreadParams};
pub use results::{
    AverageTimeResult, IterationResult, MeasurementResult, RawResults, ResultRole,
    SampleBuffer, SampleTimeResult, ScalarResult, SingleShotResult, ThroughputResult,
};
pub use spin::{spin_while, SpinGuard, SpinMutex};

pub use crate::time::TimeUnit;

/// Failure of a generated harness while running one iteration.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Another worker failed and flagged the run; shared fixtures are not
    /// handed out anymore.
    #[error("benchmark has failed in another thread")]
    FailureInOtherThread,

    #[error("worker was interrupted")]
    Interrupted,

    #[error("no benchmark method is assigned to subgroup {index}")]
    SubgroupMismatch { index: i32 },

    #[error("no value supplied for @Param \"{name}\"")]
    MissingParam { name: String },

    #[error("cannot set @Param \"{name}\": {reason}")]
    Param { name: String, reason: String },

    #[error("fixture slot lock is poisoned")]
    Poisoned,
}

/// Receiver of `@Param` values. Implemented by fixture types declaring
/// params; `declaring` names the class that declares the field so a type
/// can route values to the right level of its hierarchy.
pub trait ParamTarget {
    fn set_param(&mut self, declaring: &str, name: &str, value: &str) -> Result<(), String>;
}

/// Parse a `@Param` value into a field type.
pub fn parse_param<T>(value: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| format!("cannot convert \"{value}\": {e}"))
}

/// Lock the static slot holding a shared fixture.
pub fn lock_slot<T>(slot: &Mutex<T>) -> Result<MutexGuard<'_, T>, HarnessError> {
    slot.lock().map_err(|_| HarnessError::Poisoned)
}

/// Seed for the sample-time batch selector.
pub fn rnd_seed() -> i32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as i32)
        .unwrap_or(0x2545_F491)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct SizedState {
        size: i32,
    }

    impl ParamTarget for SizedState {
        fn set_param(&mut self, _declaring: &str, name: &str, value: &str) -> Result<(), String> {
            match name {
                "size" => self.size = parse_param(value)?,
                other => return Err(format!("unknown param {other}")),
            }
            Ok(())
        }
    }

    #[test]
    fn should_parse_param_values_into_field_types() {
        let mut s = SizedState::default();
        s.set_param("org.a.S", "size", "42").unwrap();
        assert_eq!(s.size, 42);
        let err = s.set_param("org.a.S", "size", "x").unwrap_err();
        assert!(err.contains("cannot convert \"x\""));
    }

    #[test]
    fn should_report_poisoned_slot() {
        let slot = std::sync::Arc::new(Mutex::new(0));
        let poisoner = std::sync::Arc::clone(&slot);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(matches!(lock_slot(&slot), Err(HarnessError::Poisoned)));
    }
}
