use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::{error::ConfigError, threshold::Threshold};

/// Run-wide options, passed by value into the scheduler at construction.
///
/// There is no process-wide state: everything a run needs to know travels in
/// this struct. `duration` and `iterations` are mutually exclusive; set
/// exactly one of them.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RunConfig {
    /// Number of concurrent virtual users.
    #[builder(default = 1)]
    pub vus: usize,
    /// Wall-clock limit for the whole run.
    #[builder(default, setter(strip_option))]
    pub duration: Option<Duration>,
    /// Per-virtual-user iteration cap.
    #[builder(default, setter(strip_option))]
    pub iterations: Option<u64>,
    /// Pass/fail conditions evaluated over the final metrics.
    #[builder(default)]
    pub thresholds: Vec<Threshold>,
    /// Per-request timeout applied by the HTTP client.
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,
    /// How long to wait for in-flight work after the stop signal before
    /// aborting stragglers.
    #[builder(default = Duration::from_secs(5))]
    pub grace: Duration,
}

/// When a virtual user stops iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    /// Stop all users once this much wall-clock time has elapsed.
    Duration(Duration),
    /// Stop each user after this many iterations.
    Iterations(u64),
}

impl RunConfig {
    /// Check the config and resolve its stop condition.
    ///
    /// Fails fast, before any scheduling happens, on a conflicting or missing
    /// limit or a zero worker count.
    pub fn validate(&self) -> Result<RunLimit, ConfigError> {
        if self.vus == 0 {
            return Err(ConfigError::NoVirtualUsers);
        }
        match (self.duration, self.iterations) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingLimits),
            (None, None) => Err(ConfigError::MissingLimit),
            (Some(duration), None) => Ok(RunLimit::Duration(duration)),
            (None, Some(iterations)) => Ok(RunLimit::Iterations(iterations)),
        }
    }
}
