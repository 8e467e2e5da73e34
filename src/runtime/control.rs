//! Coordination state shared by every worker of one iteration.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{Blackhole, BenchmarkParams, HarnessError, IterationParams, ParamTarget};

/// Per-iteration control block.
///
/// Workers announce when they reach the warmup and cooldown catch-up loops;
/// the last one to arrive releases everybody. Iteration setup and teardown
/// sit behind full barriers: nobody passes [`InfraControl::pre_setup`] or
/// [`InfraControl::pre_teardown`] before every worker of the iteration got
/// there. The measurement window closes when the launcher calls
/// [`InfraControl::mark_done`].
#[derive(Debug)]
pub struct InfraControl {
    benchmark_params: BenchmarkParams,
    iteration_params: IterationParams,
    threads: usize,
    last_iteration: bool,
    warmup_should_wait: AtomicBool,
    warmdown_should_wait: AtomicBool,
    warmup_visited: AtomicUsize,
    warmdown_visited: AtomicUsize,
    pre_setup_should_wait: AtomicBool,
    pre_teardown_should_wait: AtomicBool,
    pre_setup_visited: AtomicUsize,
    pre_teardown_visited: AtomicUsize,
    done: AtomicBool,
    volatile_spoiler: AtomicBool,
    failing: AtomicBool,
    interrupted: AtomicBool,
}

impl InfraControl {
    pub fn new(benchmark_params: BenchmarkParams, iteration_params: IterationParams) -> Self {
        let threads = usize::try_from(benchmark_params.thread_count()).unwrap_or(1).max(1);
        Self {
            benchmark_params,
            iteration_params,
            threads,
            last_iteration: false,
            warmup_should_wait: AtomicBool::new(true),
            warmdown_should_wait: AtomicBool::new(true),
            warmup_visited: AtomicUsize::new(0),
            warmdown_visited: AtomicUsize::new(0),
            pre_setup_should_wait: AtomicBool::new(true),
            pre_teardown_should_wait: AtomicBool::new(true),
            pre_setup_visited: AtomicUsize::new(0),
            pre_teardown_visited: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            volatile_spoiler: AtomicBool::new(false),
            failing: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Mark this as the final iteration of the trial: harnesses run trial
    /// teardown and release shared fixtures at its end.
    pub fn last_iteration(mut self, last: bool) -> Self {
        self.last_iteration = last;
        self
    }

    pub fn benchmark_params(&self) -> &BenchmarkParams {
        &self.benchmark_params
    }

    pub fn iteration_params(&self) -> &IterationParams {
        &self.iteration_params
    }

    pub fn is_last_iteration(&self) -> bool {
        self.last_iteration
    }

    pub fn blackhole(&self) -> Blackhole {
        Blackhole::new()
    }

    pub fn announce_warmup_ready(&self) {
        self.arrive(&self.warmup_visited, &self.warmup_should_wait);
    }

    pub fn announce_warmdown_ready(&self) {
        self.arrive(&self.warmdown_visited, &self.warmdown_should_wait);
    }

    /// Count one worker in; the last of `threads` clears `should_wait`.
    fn arrive(&self, visited: &AtomicUsize, should_wait: &AtomicBool) {
        if visited.fetch_add(1, Ordering::AcqRel) + 1 >= self.threads {
            should_wait.store(false, Ordering::Release);
        }
    }

    pub fn warmup_should_wait(&self) -> bool {
        self.warmup_should_wait.load(Ordering::Acquire)
    }

    pub fn warmdown_should_wait(&self) -> bool {
        self.warmdown_should_wait.load(Ordering::Acquire)
    }

    /// Spin until every worker reached the warmup catch-up loop.
    pub fn await_warmup_ready(&self) -> Result<(), HarnessError> {
        super::spin_while(&self.warmup_should_wait, self)
    }

    pub fn await_warmdown_ready(&self) -> Result<(), HarnessError> {
        super::spin_while(&self.warmdown_should_wait, self)
    }

    /// Polled by counting loops after every operation.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }

    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    /// Polled by batch loops; set to bail out of a batch early.
    #[inline]
    pub fn volatile_spoiler(&self) -> bool {
        self.volatile_spoiler.load(Ordering::Relaxed)
    }

    pub fn spoil(&self) {
        self.volatile_spoiler.store(true, Ordering::Release);
    }

    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::Acquire)
    }

    pub fn mark_failing(&self) {
        self.failing.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    /// Barrier in front of iteration setup.
    pub fn pre_setup(&self) -> Result<(), HarnessError> {
        self.check_runnable()?;
        self.arrive(&self.pre_setup_visited, &self.pre_setup_should_wait);
        super::spin::await_barrier(&self.pre_setup_should_wait, self)
    }

    /// Barrier in front of iteration teardown, so no worker tears down a
    /// shared fixture a sibling still measures.
    pub fn pre_teardown(&self) -> Result<(), HarnessError> {
        self.check_runnable()?;
        self.arrive(&self.pre_teardown_visited, &self.pre_teardown_should_wait);
        super::spin::await_barrier(&self.pre_teardown_should_wait, self)
    }

    pub(super) fn check_runnable(&self) -> Result<(), HarnessError> {
        if self.is_interrupted() {
            return Err(HarnessError::Interrupted);
        }
        if self.is_failing() {
            return Err(HarnessError::FailureInOtherThread);
        }
        Ok(())
    }

    /// Sample budget for one sample-time iteration.
    pub fn target_samples(&self, samples_per_ms: u32) -> usize {
        let ms = self.iteration_params.time().as_millis().max(1);
        usize::try_from(ms.saturating_mul(u128::from(samples_per_ms))).unwrap_or(usize::MAX)
    }

    /// Hand the bound value of `@Param` `name` to a fixture.
    pub fn inject_param<T: ParamTarget + ?Sized>(
        &self,
        target: &mut T,
        declaring: &str,
        name: &str,
    ) -> Result<(), HarnessError> {
        let value = self
            .benchmark_params
            .param_value(name)
            .ok_or_else(|| HarnessError::MissingParam {
                name: name.to_string(),
            })?;
        target
            .set_param(declaring, name, value)
            .map_err(|reason| HarnessError::Param {
                name: name.to_string(),
                reason,
            })
    }

    /// Measurement duration of the iteration.
    pub fn duration(&self) -> Duration {
        self.iteration_params.time()
    }
}

/// Measurement-window flags a benchmark can take as a fixture to observe
/// when measurement starts and stops.
#[derive(Debug, Default)]
pub struct Control {
    pub start_measurement: AtomicBool,
    pub stop_measurement: AtomicBool,
}

impl Control {
    pub fn is_measuring(&self) -> bool {
        self.start_measurement.load(Ordering::Acquire) && !self.stop_measurement.load(Ordering::Acquire)
    }
}
