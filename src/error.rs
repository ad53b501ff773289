use thiserror::Error;

/// Configuration problems that abort a run before any virtual user is spawned.
///
/// Everything else that goes wrong during a run (request failures, failed
/// checks, threshold violations) is recorded as data and reported at the end;
/// only these errors are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("`duration` and `iterations` are mutually exclusive")]
    ConflictingLimits,
    #[error("one of `duration` or `iterations` must be set")]
    MissingLimit,
    #[error("`vus` must be at least 1")]
    NoVirtualUsers,
    #[error("scenario `{0}` has no steps")]
    EmptyScenario(String),
    #[error("unsupported threshold metric `{0}`")]
    UnknownThresholdMetric(String),
    #[error("malformed threshold expression `{0}`")]
    MalformedThreshold(String),
}

/// Errors an executor can return.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("metrics collector failed: {0}")]
    Collector(#[from] tokio::task::JoinError),
}
