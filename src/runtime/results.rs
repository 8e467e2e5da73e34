//! Iteration results produced by generated harnesses.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::time::TimeUnit;

/// Whether a result is the headline score of a benchmark or an extra one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultRole {
    Primary,
    Secondary,
}

/// Counters a measurement loop fills in.
#[derive(Debug, Clone, Default)]
pub struct RawResults {
    /// Every operation run, warmup and cooldown catch-up included.
    pub all_ops: f64,
    /// Operations run inside the measurement window.
    pub measured_ops: f64,
    /// Time spent in the benchmark call alone, when per-invocation helpers
    /// ran inside the window.
    pub real_time: Duration,
    pub start_time: Option<Instant>,
    pub stop_time: Option<Instant>,
}

impl RawResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measured time: the call-only time when recorded, otherwise the
    /// measurement window.
    pub fn time(&self) -> Duration {
        if !self.real_time.is_zero() {
            return self.real_time;
        }
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputResult {
    pub role: ResultRole,
    pub label: String,
    pub operations: f64,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub unit: TimeUnit,
}

impl ThroughputResult {
    pub fn new(
        role: ResultRole,
        label: impl Into<String>,
        operations: f64,
        duration: Duration,
        unit: TimeUnit,
    ) -> Self {
        Self {
            role,
            label: label.into(),
            operations,
            duration,
            unit,
        }
    }

    /// Operations per `unit`.
    pub fn score(&self) -> f64 {
        let time = self.unit.convert(self.duration);
        if time == 0.0 {
            return 0.0;
        }
        self.operations / time
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageTimeResult {
    pub role: ResultRole,
    pub label: String,
    pub operations: f64,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub unit: TimeUnit,
}

impl AverageTimeResult {
    pub fn new(
        role: ResultRole,
        label: impl Into<String>,
        operations: f64,
        duration: Duration,
        unit: TimeUnit,
    ) -> Self {
        Self {
            role,
            label: label.into(),
            operations,
            duration,
            unit,
        }
    }

    /// `unit`s per operation.
    pub fn score(&self) -> f64 {
        if self.operations == 0.0 {
            return 0.0;
        }
        self.unit.convert(self.duration) / self.operations
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTimeResult {
    pub role: ResultRole,
    pub label: String,
    pub buffer: SampleBuffer,
    pub unit: TimeUnit,
}

impl SampleTimeResult {
    pub fn new(role: ResultRole, label: impl Into<String>, buffer: SampleBuffer, unit: TimeUnit) -> Self {
        Self {
            role,
            label: label.into(),
            buffer,
            unit,
        }
    }

    /// Mean sampled time per operation in `unit`s.
    pub fn score(&self) -> f64 {
        self.buffer.mean() / self.unit.nanos() as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleShotResult {
    pub role: ResultRole,
    pub label: String,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub operations: f64,
    pub unit: TimeUnit,
}

impl SingleShotResult {
    pub fn new(
        role: ResultRole,
        label: impl Into<String>,
        duration: Duration,
        operations: f64,
        unit: TimeUnit,
    ) -> Self {
        Self {
            role,
            label: label.into(),
            duration,
            operations,
            unit,
        }
    }

    pub fn score(&self) -> f64 {
        self.unit.convert(self.duration)
    }
}

/// A plain number, such as an event counter total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarResult {
    pub role: ResultRole,
    pub label: String,
    pub value: f64,
    pub unit: String,
}

impl ScalarResult {
    pub fn new(role: ResultRole, label: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            role,
            label: label.into(),
            value,
            unit: unit.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeasurementResult {
    Throughput(ThroughputResult),
    AverageTime(AverageTimeResult),
    SampleTime(SampleTimeResult),
    SingleShot(SingleShotResult),
    Scalar(ScalarResult),
}

impl MeasurementResult {
    pub fn role(&self) -> ResultRole {
        match self {
            MeasurementResult::Throughput(r) => r.role,
            MeasurementResult::AverageTime(r) => r.role,
            MeasurementResult::SampleTime(r) => r.role,
            MeasurementResult::SingleShot(r) => r.role,
            MeasurementResult::Scalar(r) => r.role,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MeasurementResult::Throughput(r) => &r.label,
            MeasurementResult::AverageTime(r) => &r.label,
            MeasurementResult::SampleTime(r) => &r.label,
            MeasurementResult::SingleShot(r) => &r.label,
            MeasurementResult::Scalar(r) => &r.label,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            MeasurementResult::Throughput(r) => r.score(),
            MeasurementResult::AverageTime(r) => r.score(),
            MeasurementResult::SampleTime(r) => r.score(),
            MeasurementResult::SingleShot(r) => r.score(),
            MeasurementResult::Scalar(r) => r.value,
        }
    }
}

macro_rules! into_measurement {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for MeasurementResult {
                fn from(r: $ty) -> Self {
                    MeasurementResult::$variant(r)
                }
            }
        )*
    };
}

into_measurement! {
    ThroughputResult => Throughput,
    AverageTimeResult => AverageTime,
    SampleTimeResult => SampleTime,
    SingleShotResult => SingleShot,
    ScalarResult => Scalar,
}

/// Everything one worker reports for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    pub all_ops: u64,
    pub measured_ops: u64,
    #[serde(with = "duration_serde")]
    pub real_time: Duration,
    pub results: Vec<MeasurementResult>,
}

impl IterationResult {
    pub fn from_raw(raw: &RawResults) -> Self {
        Self {
            all_ops: raw.all_ops.max(0.0) as u64,
            measured_ops: raw.measured_ops.max(0.0) as u64,
            real_time: raw.real_time,
            results: Vec::new(),
        }
    }

    pub fn add(&mut self, result: impl Into<MeasurementResult>) {
        self.results.push(result.into());
    }

    pub fn primary(&self) -> Option<&MeasurementResult> {
        self.results.iter().find(|r| r.role() == ResultRole::Primary)
    }

    pub fn secondary(&self, label: &str) -> Option<&MeasurementResult> {
        self.results
            .iter()
            .find(|r| r.role() == ResultRole::Secondary && r.label() == label)
    }
}

/// Histogram of sampled per-operation times in nanoseconds.
///
/// Serializes as the list of recorded `(value, count)` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RecordedCounts", try_from = "RecordedCounts")]
pub struct SampleBuffer {
    histogram: Histogram<u64>,
}

/// Three significant digits keep bucket error below 0.1%.
const SIGNIFICANT_DIGITS: u8 = 3;

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            histogram: empty_histogram(),
        }
    }

    pub fn add(&mut self, nanos: u64) {
        self.histogram.saturating_record(nanos);
    }

    /// Halve every recorded count, keeping counts that would drop to zero
    /// so rare values survive.
    pub fn half(&mut self) {
        let mut halved = empty_histogram();
        for v in self.histogram.iter_recorded() {
            let count = v.count_at_value();
            let n = if count / 2 == 0 { count } else { count / 2 };
            // Auto-resizing histograms only refuse counts past u64::MAX.
            let _ = halved.record_n(v.value_iterated_to(), n);
        }
        self.histogram = halved;
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn mean(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.histogram.mean()
    }

    /// Sampled time at `quantile` (0.0..=1.0).
    pub fn value_at_quantile(&self, quantile: f64) -> u64 {
        self.histogram.value_at_quantile(quantile)
    }

    pub fn merge(&mut self, other: &SampleBuffer) {
        // Both sides auto-resize, so addition cannot run out of range.
        let _ = self.histogram.add(&other.histogram);
    }
}

fn empty_histogram() -> Histogram<u64> {
    Histogram::new(SIGNIFICANT_DIGITS).expect("significant digits within 0..=5")
}

#[derive(Serialize, Deserialize)]
struct RecordedCounts(Vec<(u64, u64)>);

impl From<SampleBuffer> for RecordedCounts {
    fn from(buffer: SampleBuffer) -> Self {
        RecordedCounts(
            buffer
                .histogram
                .iter_recorded()
                .map(|v| (v.value_iterated_to(), v.count_at_value()))
                .collect(),
        )
    }
}

impl TryFrom<RecordedCounts> for SampleBuffer {
    type Error = String;

    fn try_from(counts: RecordedCounts) -> Result<Self, Self::Error> {
        let mut buffer = SampleBuffer::new();
        for (value, count) in counts.0 {
            buffer
                .histogram
                .record_n(value, count)
                .map_err(|e| format!("cannot record {count} samples of {value} ns: {e:?}"))?;
        }
        Ok(buffer)
    }
}

pub(super) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_nanos().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u128::deserialize(d)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_score_throughput_per_unit() {
        let r = ThroughputResult::new(
            ResultRole::Primary,
            "measure",
            2_000.0,
            Duration::from_secs(2),
            TimeUnit::Seconds,
        );
        assert_eq!(r.score(), 1_000.0);
    }

    #[test]
    fn should_score_average_time_per_operation() {
        let r = AverageTimeResult::new(
            ResultRole::Primary,
            "measure",
            1_000.0,
            Duration::from_millis(1),
            TimeUnit::Microseconds,
        );
        assert_eq!(r.score(), 1.0);
    }

    #[test]
    fn should_prefer_call_time_when_recorded() {
        let start = Instant::now();
        let mut raw = RawResults::new();
        raw.start_time = Some(start);
        raw.stop_time = Some(start + Duration::from_millis(10));
        assert_eq!(raw.time(), Duration::from_millis(10));
        raw.real_time = Duration::from_millis(3);
        assert_eq!(raw.time(), Duration::from_millis(3));
    }

    #[test]
    fn should_find_primary_and_secondary_results() {
        let mut it = IterationResult::from_raw(&RawResults::new());
        it.add(ThroughputResult::new(
            ResultRole::Primary,
            "g",
            1.0,
            Duration::from_secs(1),
            TimeUnit::Seconds,
        ));
        it.add(ScalarResult::new(ResultRole::Secondary, "hits", 7.0, "#"));
        assert_eq!(it.primary().map(|r| r.label()), Some("g"));
        assert_eq!(it.secondary("hits").map(|r| r.score()), Some(7.0));
        assert!(it.secondary("g").is_none());
    }

    #[test]
    fn should_halve_sample_counts_but_keep_rare_values() {
        let mut b = SampleBuffer::new();
        for _ in 0..8 {
            b.add(100);
        }
        b.add(5_000);
        b.half();
        assert_eq!(b.count(), 5);
        b.half();
        b.half();
        assert_eq!(b.count(), 2);
    }

    #[test]
    fn should_keep_large_samples_within_precision() {
        let mut b = SampleBuffer::new();
        b.add(1_000_000);
        b.add(1_000_001);
        b.add(512);
        assert_eq!(b.count(), 3);
        let top = b.value_at_quantile(1.0);
        assert!(top >= 1_000_001 && top <= 1_001_000, "top = {top}");
        assert_eq!(b.value_at_quantile(0.0), 512);
    }

    #[test]
    fn should_merge_and_serialize_sample_buffers() {
        let mut a = SampleBuffer::new();
        a.add(100);
        a.add(100);
        let mut b = SampleBuffer::new();
        b.add(300);
        a.merge(&b);
        assert_eq!(a.count(), 3);
        assert!((a.mean() - 500.0 / 3.0).abs() < 1.0);

        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "[[100,2],[300,1]]");
        let back: SampleBuffer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn should_serialize_results_with_kind_tag() {
        let r: MeasurementResult =
            ScalarResult::new(ResultRole::Secondary, "hits", 3.0, "#").into();
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"kind\":\"scalar\""));
        let back: MeasurementResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
