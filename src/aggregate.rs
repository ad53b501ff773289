use std::{collections::BTreeMap, fmt::Debug, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::mpsc;

use crate::metric::{Metric, RequestOutcome};

/// The `Aggregate` trait defines how raw [`Metric`] values are collected and
/// combined into an intermediate, mergeable representation.
///
/// Aggregates store compact raw data (sample vectors, counters) and leave the
/// derived statistics — averages, percentiles, rates — to the [`crate::Report`]
/// stage, so different reports can derive what they need without losing
/// information.
///
/// `merge` must be associative and commutative: worker-local aggregates are
/// combined in arbitrary order.
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple metrics into the current instance.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Collector task: drains a channel of metrics into a single aggregate.
///
/// Receiving through a channel is what makes concurrent recording safe — any
/// number of workers hold senders, and every metric is consumed exactly once
/// here. Metrics are drained in batches of up to `batch_size` to keep channel
/// wakeups off the hot path. The final aggregate is returned once every
/// sender has been dropped.
pub async fn aggregator_task<A: Aggregate>(
    mut rx: mpsc::Receiver<A::Metric>,
    batch_size: usize,
) -> A {
    let mut agg = A::new();
    let mut batch = Vec::new();

    loop {
        // Receive the first metric or end the loop if the senders are gone
        match rx.recv().await {
            Some(metric) => batch.push(metric),
            None => break,
        }

        // Opportunistically drain whatever else is already queued
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(metric) => batch.push(metric),
                Err(_) => break,
            }
        }

        agg.aggregate(&batch);
        batch.clear();
    }
    agg
}

/// Per-step raw samples and counters.
#[derive(Serialize, Deserialize, PartialOrd, PartialEq, Debug, Clone, Default)]
pub struct StepStats {
    /// Every recorded latency for this step, in arrival order.
    pub latencies: Vec<Duration>,
    pub total: u64,
    pub failed: u64,
}

impl StepStats {
    pub fn failed_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }

    pub fn sorted_latencies(&self) -> Vec<Duration> {
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        sorted
    }

    /// Nearest-rank percentile over this step's samples.
    pub fn percentile(&self, pct: f64) -> Option<Duration> {
        nearest_rank(&self.sorted_latencies(), pct)
    }

    pub fn avg(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        Some(self.latencies.iter().sum::<Duration>() / self.latencies.len() as u32)
    }
}

/// Pass/fail tally for one named check.
#[derive(Serialize, Deserialize, PartialOrd, PartialEq, Debug, Clone, Default)]
pub struct CheckStats {
    pub passes: u64,
    pub fails: u64,
}

/// The built-in [`Aggregate`] over [`RequestOutcome`]s.
///
/// Keeps raw per-step latency vectors rather than a sketch: percentile
/// queries use the nearest-rank method over the complete sample set, computed
/// only after the run. Recorded samples are never mutated, only appended.
#[derive(Serialize, Deserialize, PartialOrd, PartialEq, Debug, Clone, Default)]
pub struct RunAggregate {
    pub steps: BTreeMap<String, StepStats>,
    pub checks: BTreeMap<String, CheckStats>,
}

impl Aggregate for RunAggregate {
    type Metric = RequestOutcome;

    fn new() -> Self {
        RunAggregate::default()
    }

    fn consume(&mut self, outcome: &RequestOutcome) {
        let step = self.steps.entry(outcome.step.clone()).or_default();
        step.latencies.push(outcome.latency);
        step.total += 1;
        if outcome.is_failure() {
            step.failed += 1;
        }

        for (name, pass) in &outcome.checks {
            let check = self.checks.entry(name.clone()).or_default();
            if *pass {
                check.passes += 1;
            } else {
                check.fails += 1;
            }
        }
    }

    fn merge(&mut self, other: Self) {
        for (name, stats) in other.steps {
            let step = self.steps.entry(name).or_default();
            step.latencies.extend(stats.latencies);
            step.total += stats.total;
            step.failed += stats.failed;
        }
        for (name, stats) in other.checks {
            let check = self.checks.entry(name).or_default();
            check.passes += stats.passes;
            check.fails += stats.fails;
        }
    }
}

impl RunAggregate {
    /// Total requests recorded across all steps.
    pub fn requests(&self) -> u64 {
        self.steps.values().map(|s| s.total).sum()
    }

    /// Failed requests recorded across all steps.
    pub fn failed(&self) -> u64 {
        self.steps.values().map(|s| s.failed).sum()
    }

    pub fn failed_rate(&self) -> f64 {
        let total = self.requests();
        if total == 0 {
            0.0
        } else {
            self.failed() as f64 / total as f64
        }
    }

    /// Every latency sample across all steps, sorted ascending.
    pub fn sorted_latencies(&self) -> Vec<Duration> {
        let mut all: Vec<Duration> = self
            .steps
            .values()
            .flat_map(|s| s.latencies.iter().copied())
            .collect();
        all.sort_unstable();
        all
    }

    /// Nearest-rank percentile over every latency sample of the run.
    pub fn duration_percentile(&self, pct: f64) -> Option<Duration> {
        nearest_rank(&self.sorted_latencies(), pct)
    }

    /// Fraction of all check evaluations that passed.
    pub fn checks_rate(&self) -> Option<f64> {
        let passes: u64 = self.checks.values().map(|c| c.passes).sum();
        let fails: u64 = self.checks.values().map(|c| c.fails).sum();
        if passes + fails == 0 {
            None
        } else {
            Some(passes as f64 / (passes + fails) as f64)
        }
    }
}

/// Nearest-rank percentile: the smallest sample such that at least `pct`
/// percent of the set is at or below it. `sorted` must be ascending.
pub fn nearest_rank(sorted: &[Duration], pct: f64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    Some(sorted[index])
}
