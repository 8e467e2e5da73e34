//! Harness-provided fixtures. Generated code hands copies of these to
//! benchmark and helper methods that ask for them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::time::TimeUnit;

/// Resolved configuration of the benchmark being run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkParams {
    benchmark: String,
    threads: i32,
    thread_groups: Vec<i32>,
    ops_per_invocation: i32,
    time_unit: TimeUnit,
    #[serde(default)]
    params: BTreeMap<String, String>,
}

impl BenchmarkParams {
    pub fn new(benchmark: impl Into<String>) -> Self {
        Self {
            benchmark: benchmark.into(),
            threads: 1,
            thread_groups: vec![1],
            ops_per_invocation: 1,
            time_unit: TimeUnit::Seconds,
            params: BTreeMap::new(),
        }
    }

    pub fn threads(mut self, threads: i32) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn thread_groups(mut self, groups: Vec<i32>) -> Self {
        self.thread_groups = groups;
        self
    }

    pub fn ops_per_invocation(mut self, ops: i32) -> Self {
        self.ops_per_invocation = ops.max(1);
        self
    }

    pub fn time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = unit;
        self
    }

    /// Bind one `@Param` value for this run.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn benchmark(&self) -> &str {
        &self.benchmark
    }

    pub fn thread_count(&self) -> i32 {
        self.threads
    }

    pub fn thread_group_sizes(&self) -> &[i32] {
        &self.thread_groups
    }

    pub fn ops_per_invocation_count(&self) -> i32 {
        self.ops_per_invocation
    }

    pub fn unit(&self) -> TimeUnit {
        self.time_unit
    }

    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Settings of the iteration being run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationParams {
    count: i32,
    #[serde(with = "super::results::duration_serde")]
    time: Duration,
    batch_size: i32,
}

impl IterationParams {
    pub fn new(count: i32, time: Duration, batch_size: i32) -> Self {
        Self {
            count,
            time,
            batch_size: batch_size.max(1),
        }
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    pub fn time(&self) -> Duration {
        self.time
    }

    pub fn batch_size(&self) -> i32 {
        self.batch_size
    }
}

/// Position of one worker thread among its siblings.
///
/// Threads are split into synchronization groups of `sum(thread_groups)`
/// threads each; inside a group, consecutive runs of threads form the
/// subgroups that execute one group member each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadParams {
    thread_index: i32,
    thread_count: i32,
    group_index: i32,
    group_count: i32,
    subgroup_index: i32,
    subgroup_count: i32,
    group_thread_index: i32,
    subgroup_thread_index: i32,
}

impl ThreadParams {
    /// Place thread `thread_index` of `thread_count` given the per-member
    /// thread counts of one group.
    pub fn distribute(thread_index: i32, thread_count: i32, thread_groups: &[i32]) -> Self {
        let group_size: i32 = thread_groups.iter().sum::<i32>().max(1);
        let group_index = thread_index / group_size;
        let group_thread_index = thread_index % group_size;

        let mut subgroup_index = 0;
        let mut subgroup_thread_index = group_thread_index;
        for (i, &size) in thread_groups.iter().enumerate() {
            if subgroup_thread_index < size {
                subgroup_index = i as i32;
                break;
            }
            subgroup_thread_index -= size;
        }

        Self {
            thread_index,
            thread_count,
            group_index,
            group_count: (thread_count + group_size - 1) / group_size,
            subgroup_index,
            subgroup_count: thread_groups.len() as i32,
            group_thread_index,
            subgroup_thread_index,
        }
    }

    pub fn thread_index(&self) -> i32 {
        self.thread_index
    }

    pub fn thread_count(&self) -> i32 {
        self.thread_count
    }

    pub fn group_index(&self) -> i32 {
        self.group_index
    }

    pub fn group_count(&self) -> i32 {
        self.group_count
    }

    pub fn subgroup_index(&self) -> i32 {
        self.subgroup_index
    }

    pub fn subgroup_count(&self) -> i32 {
        self.subgroup_count
    }

    pub fn group_thread_index(&self) -> i32 {
        self.group_thread_index
    }

    pub fn subgroup_thread_index(&self) -> i32 {
        self.subgroup_thread_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_distribute_threads_over_subgroups() {
        // two groups of 1 + 3 threads
        let placed: Vec<_> = (0..8)
            .map(|i| ThreadParams::distribute(i, 8, &[1, 3]))
            .map(|p| (p.group_index(), p.subgroup_index(), p.subgroup_thread_index()))
            .collect();
        assert_eq!(
            placed,
            [
                (0, 0, 0),
                (0, 1, 0),
                (0, 1, 1),
                (0, 1, 2),
                (1, 0, 0),
                (1, 1, 0),
                (1, 1, 1),
                (1, 1, 2),
            ]
        );
        assert_eq!(ThreadParams::distribute(5, 8, &[1, 3]).group_count(), 2);
    }

    #[test]
    fn should_clamp_batch_size_and_threads() {
        assert_eq!(IterationParams::new(5, Duration::from_secs(1), 0).batch_size(), 1);
        assert_eq!(BenchmarkParams::new("b").threads(0).thread_count(), 1);
    }

    #[test]
    fn should_look_up_bound_params() {
        let p = BenchmarkParams::new("org.a.B.measure").param("size", "16");
        assert_eq!(p.param_value("size"), Some("16"));
        assert_eq!(p.param_value("other"), None);
    }
}
