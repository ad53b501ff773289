use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{aggregate::RunAggregate, error::ConfigError};

/// Metric families a threshold can target.
const KNOWN_METRICS: &[&str] = &["http_req_duration", "http_req_failed", "http_reqs", "checks"];

/// A pass/fail condition on one aggregated metric.
///
/// Thresholds are parsed from the compact `"p(95)<700"` / `"rate<0.01"`
/// expression form. Durations are compared in milliseconds, rates as
/// fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: String,
    pub stat: Stat,
    pub op: Op,
    pub limit: f64,
}

/// Which summary statistic of the metric the threshold constrains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Stat {
    Percentile(f64),
    Rate,
    Avg,
    Min,
    Max,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    fn holds(self, value: f64, limit: f64) -> bool {
        match self {
            Op::Lt => value < limit,
            Op::Le => value <= limit,
            Op::Gt => value > limit,
            Op::Ge => value >= limit,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
        }
    }
}

impl Threshold {
    /// Parse a threshold from a metric name and a comparison expression,
    /// e.g. `Threshold::parse("http_req_duration", "p(95)<700")`.
    pub fn parse(metric: &str, expr: &str) -> Result<Self, ConfigError> {
        if !KNOWN_METRICS.contains(&metric) {
            return Err(ConfigError::UnknownThresholdMetric(metric.to_owned()));
        }
        let malformed = || ConfigError::MalformedThreshold(format!("{metric}: {expr}"));

        let expr = expr.trim();
        let (lhs, op, rhs) = if let Some(at) = expr.find("<=") {
            (&expr[..at], Op::Le, &expr[at + 2..])
        } else if let Some(at) = expr.find(">=") {
            (&expr[..at], Op::Ge, &expr[at + 2..])
        } else if let Some(at) = expr.find('<') {
            (&expr[..at], Op::Lt, &expr[at + 1..])
        } else if let Some(at) = expr.find('>') {
            (&expr[..at], Op::Gt, &expr[at + 1..])
        } else {
            return Err(malformed());
        };

        let stat = parse_stat(lhs.trim()).ok_or_else(|| malformed())?;
        let limit: f64 = rhs.trim().parse().map_err(|_| malformed())?;

        Ok(Self {
            metric: metric.to_owned(),
            stat,
            op,
            limit,
        })
    }

    /// The statistic this threshold constrains, read from the final
    /// aggregate. `None` means the run produced no data for it.
    pub fn observed(&self, aggregate: &RunAggregate) -> Option<f64> {
        let as_millis = |d: std::time::Duration| d.as_secs_f64() * 1000.0;
        match self.metric.as_str() {
            "http_req_duration" => {
                let sorted = aggregate.sorted_latencies();
                match self.stat {
                    Stat::Percentile(pct) => {
                        crate::aggregate::nearest_rank(&sorted, pct).map(as_millis)
                    }
                    Stat::Avg => {
                        if sorted.is_empty() {
                            None
                        } else {
                            let total: f64 = sorted.iter().copied().map(as_millis).sum();
                            Some(total / sorted.len() as f64)
                        }
                    }
                    Stat::Min => sorted.first().copied().map(as_millis),
                    Stat::Max => sorted.last().copied().map(as_millis),
                    Stat::Count => Some(sorted.len() as f64),
                    Stat::Rate => None,
                }
            }
            "http_req_failed" => match self.stat {
                Stat::Rate => {
                    if aggregate.requests() == 0 {
                        None
                    } else {
                        Some(aggregate.failed_rate())
                    }
                }
                Stat::Count => Some(aggregate.failed() as f64),
                _ => None,
            },
            "http_reqs" => match self.stat {
                Stat::Count => Some(aggregate.requests() as f64),
                _ => None,
            },
            "checks" => match self.stat {
                Stat::Rate => aggregate.checks_rate(),
                _ => None,
            },
            _ => None,
        }
    }
}

fn parse_stat(raw: &str) -> Option<Stat> {
    match raw {
        "rate" => Some(Stat::Rate),
        "avg" => Some(Stat::Avg),
        "min" => Some(Stat::Min),
        "max" => Some(Stat::Max),
        "count" => Some(Stat::Count),
        _ => {
            let pct: f64 = raw.strip_prefix("p(")?.strip_suffix(')')?.parse().ok()?;
            (pct > 0.0 && pct <= 100.0).then_some(Stat::Percentile(pct))
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stat = match self.stat {
            Stat::Percentile(pct) => format!("p({pct})"),
            Stat::Rate => "rate".to_string(),
            Stat::Avg => "avg".to_string(),
            Stat::Min => "min".to_string(),
            Stat::Max => "max".to_string(),
            Stat::Count => "count".to_string(),
        };
        write!(
            f,
            "{}: {stat}{}{}",
            self.metric,
            self.op.symbol(),
            self.limit
        )
    }
}

/// The fate of one threshold after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOutcome {
    pub threshold: Threshold,
    pub passed: bool,
    /// The value the threshold was compared against, when the run had data.
    pub observed: Option<f64>,
}

/// The overall pass/fail result of a run's threshold evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub outcomes: Vec<ThresholdOutcome>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    /// Display names of every violated threshold.
    pub fn violations(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.threshold.to_string())
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() { 0 } else { 1 }
    }
}

/// Compare the final aggregated metrics against every threshold.
///
/// Pure and deterministic: identical aggregates always produce the identical
/// verdict. A threshold whose metric has no recorded data passes — absence of
/// data is not a violation. Call this only after every worker has stopped;
/// partial-run evaluation is meaningless.
pub fn evaluate(aggregate: &RunAggregate, thresholds: &[Threshold]) -> Verdict {
    let outcomes = thresholds
        .iter()
        .map(|threshold| {
            let observed = threshold.observed(aggregate);
            let passed = match observed {
                Some(value) => threshold.op.holds(value, threshold.limit),
                None => true,
            };
            ThresholdOutcome {
                threshold: threshold.clone(),
                passed,
                observed,
            }
        })
        .collect();
    Verdict { outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::metric::RequestOutcome;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn aggregate_with_latencies(latencies_ms: &[u64], failures: u64) -> RunAggregate {
        let mut agg = RunAggregate::new();
        for (i, ms) in latencies_ms.iter().enumerate() {
            let failed = (i as u64) < failures;
            agg.consume(&RequestOutcome {
                step: "probe".into(),
                vu: 1,
                iteration: i as u64,
                status: Some(if failed { 500 } else { 200 }),
                latency: Duration::from_millis(*ms),
                error: None,
                checks: BTreeMap::new(),
            });
        }
        agg
    }

    #[test]
    fn parses_percentile_expression() {
        let threshold = Threshold::parse("http_req_duration", "p(95)<700").unwrap();
        assert_eq!(threshold.stat, Stat::Percentile(95.0));
        assert_eq!(threshold.op, Op::Lt);
        assert_eq!(threshold.limit, 700.0);
    }

    #[test]
    fn parses_rate_and_two_char_ops() {
        let threshold = Threshold::parse("http_req_failed", "rate<=0.01").unwrap();
        assert_eq!(threshold.stat, Stat::Rate);
        assert_eq!(threshold.op, Op::Le);
        assert_eq!(threshold.limit, 0.01);
    }

    #[test]
    fn rejects_unknown_metric_and_garbage() {
        assert!(matches!(
            Threshold::parse("http_req_sparkles", "rate<0.01"),
            Err(crate::error::ConfigError::UnknownThresholdMetric(_))
        ));
        assert!(matches!(
            Threshold::parse("http_req_duration", "p95 under 700"),
            Err(crate::error::ConfigError::MalformedThreshold(_))
        ));
    }

    #[test]
    fn detects_violations() {
        let agg = aggregate_with_latencies(&[100, 200, 300, 400, 900], 0);
        let tight = Threshold::parse("http_req_duration", "p(95)<700").unwrap();
        let loose = Threshold::parse("http_req_duration", "p(95)<1000").unwrap();
        let verdict = evaluate(&agg, &[tight, loose]);
        assert!(!verdict.passed());
        assert_eq!(verdict.violations().len(), 1);
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn failure_rate_threshold() {
        let agg = aggregate_with_latencies(&[10, 10, 10, 10], 1);
        let threshold = Threshold::parse("http_req_failed", "rate<0.01").unwrap();
        let verdict = evaluate(&agg, &[threshold]);
        assert!(!verdict.passed());
        assert_eq!(verdict.outcomes[0].observed, Some(0.25));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let agg = aggregate_with_latencies(&[5, 50, 500], 1);
        let thresholds = vec![
            Threshold::parse("http_req_duration", "p(95)<700").unwrap(),
            Threshold::parse("http_req_failed", "rate<0.01").unwrap(),
            Threshold::parse("http_reqs", "count>=3").unwrap(),
        ];
        let first = evaluate(&agg, &thresholds);
        let second = evaluate(&agg, &thresholds);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_sample_set_passes() {
        let agg = RunAggregate::new();
        let thresholds = vec![
            Threshold::parse("http_req_duration", "p(95)<700").unwrap(),
            Threshold::parse("http_req_failed", "rate<0.01").unwrap(),
        ];
        let verdict = evaluate(&agg, &thresholds);
        assert!(verdict.passed());
    }
}
