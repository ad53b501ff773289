use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{fmt, fmt::Debug, time::Duration};

use crate::{
    aggregate::{Aggregate, RunAggregate},
    threshold::Verdict,
};

/// A [`Report`] represents the processed form of an [`Aggregate`].
///
/// Reports transform raw aggregated data into meaningful insights — averages,
/// percentiles, rates, totals. They are pure data structures, free of any
/// delivery concern; a [`Reporter`] is what carries them somewhere.
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// Consumes [`Report`]s and sends them somewhere: stdout, a file, a service.
#[async_trait]
pub trait Reporter<A: Aggregate, R: Report<A>> {
    async fn report(&self, report: R) -> Result<(), Box<dyn std::error::Error>>;
}

/// Summary of one step across the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub name: String,
    pub requests: u64,
    pub failed: u64,
    pub failed_rate: f64,
    pub avg: Option<Duration>,
    pub p50: Option<Duration>,
    pub p90: Option<Duration>,
    pub p95: Option<Duration>,
    pub p99: Option<Duration>,
}

/// Pass/fail tally of one named check across the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// The built-in run summary: per-step counts and percentiles, per-check
/// tallies, overall failure rate, and (once attached) the threshold verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub steps: Vec<StepSummary>,
    pub checks: Vec<CheckSummary>,
    pub requests: u64,
    pub failed: u64,
    pub failed_rate: f64,
    pub p95: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

impl From<RunAggregate> for RunReport {
    fn from(aggregate: RunAggregate) -> Self {
        let steps = aggregate
            .steps
            .iter()
            .map(|(name, stats)| StepSummary {
                name: name.clone(),
                requests: stats.total,
                failed: stats.failed,
                failed_rate: stats.failed_rate(),
                avg: stats.avg(),
                p50: stats.percentile(50.0),
                p90: stats.percentile(90.0),
                p95: stats.percentile(95.0),
                p99: stats.percentile(99.0),
            })
            .collect();
        let checks = aggregate
            .checks
            .iter()
            .map(|(name, stats)| CheckSummary {
                name: name.clone(),
                passes: stats.passes,
                fails: stats.fails,
            })
            .collect();
        Self {
            steps,
            checks,
            requests: aggregate.requests(),
            failed: aggregate.failed(),
            failed_rate: aggregate.failed_rate(),
            p95: aggregate.duration_percentile(95.0),
            verdict: None,
        }
    }
}

impl Report<RunAggregate> for RunReport {}

impl RunReport {
    /// Attach the threshold verdict so reporters can print the pass/fail list
    /// alongside the metrics.
    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }
}

fn fmt_latency(latency: Option<Duration>) -> String {
    match latency {
        Some(value) => format!("{value:.2?}"),
        None => "-".to_string(),
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "http_reqs..........: {} total, {} failed ({:.2}%), p(95)={}",
            self.requests,
            self.failed,
            self.failed_rate * 100.0,
            fmt_latency(self.p95),
        )?;
        for step in &self.steps {
            writeln!(
                f,
                "step {:<14}: {} reqs, {} failed, avg={} p(50)={} p(90)={} p(95)={} p(99)={}",
                step.name,
                step.requests,
                step.failed,
                fmt_latency(step.avg),
                fmt_latency(step.p50),
                fmt_latency(step.p90),
                fmt_latency(step.p95),
                fmt_latency(step.p99),
            )?;
        }
        for check in &self.checks {
            writeln!(
                f,
                "check {:<13}: {} passed, {} failed",
                check.name, check.passes, check.fails
            )?;
        }
        if let Some(verdict) = &self.verdict {
            writeln!(f, "thresholds:")?;
            for outcome in &verdict.outcomes {
                let mark = if outcome.passed { "ok" } else { "FAILED" };
                let observed = match outcome.observed {
                    Some(value) => format!(" (observed {value:.2})"),
                    None => " (no data)".to_string(),
                };
                writeln!(f, "  [{mark}] {}{observed}", outcome.threshold)?;
            }
        }
        Ok(())
    }
}

/// Prints the human-readable summary to stdout.
pub struct StdoutReporter;

#[async_trait]
impl Reporter<RunAggregate, RunReport> for StdoutReporter {
    async fn report(&self, report: RunReport) -> Result<(), Box<dyn std::error::Error>> {
        println!("{report}");
        Ok(())
    }
}

/// Prints the summary as a single JSON document to stdout.
pub struct JsonReporter;

#[async_trait]
impl Reporter<RunAggregate, RunReport> for JsonReporter {
    async fn report(&self, report: RunReport) -> Result<(), Box<dyn std::error::Error>> {
        let value = serde_json::to_string_pretty(&report)?;
        println!("{value}");
        Ok(())
    }
}
