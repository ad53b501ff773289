use std::{collections::BTreeMap, fmt::Debug, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A `Metric` represents a single observed measurement produced by the system under test.
///
/// Metrics are the most granular level of performance or behavioral data. They are
/// collected and summarized by an [`crate::Aggregate`], then further analyzed and
/// reported by a [`crate::Report`] and [`crate::Reporter`].
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

/// The record of a single request/response cycle — the built-in [`Metric`] of
/// this engine.
///
/// An outcome belongs to exactly one step of exactly one virtual user's
/// iteration, and is immutable once produced. Transport failures are data
/// here, not faults: `status` is `None`, `error` carries the cause, and every
/// named check is recorded as failed.
#[derive(Serialize, Deserialize, PartialOrd, PartialEq, Debug, Clone)]
pub struct RequestOutcome {
    /// Name of the step that produced this outcome.
    pub step: String,
    /// Virtual user id, starting at 1.
    pub vu: u64,
    /// Iteration number within that virtual user, starting at 0.
    pub iteration: u64,
    /// HTTP status code, absent when the request never got a response.
    pub status: Option<u16>,
    /// Wall-clock time from sending the request to reading the full body.
    pub latency: Duration,
    /// Transport-level failure, if any.
    pub error: Option<String>,
    /// Result of every named check, in name order.
    pub checks: BTreeMap<String, bool>,
}

impl Metric for RequestOutcome {}

impl RequestOutcome {
    /// Whether this request counts as failed: a transport error, a missing
    /// response, or a status of 400 or higher.
    pub fn is_failure(&self) -> bool {
        match (&self.error, self.status) {
            (Some(_), _) => true,
            (None, None) => true,
            (None, Some(status)) => status >= 400,
        }
    }
}
