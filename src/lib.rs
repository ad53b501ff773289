//! Volley — a small, composable load-generation core for Rust.
//!
//! Volley takes the practical shape of tools like K6 and Goose and keeps only
//! the engine: a scenario of HTTP steps, a pool of virtual users looping it,
//! streaming outcome aggregation, and threshold-based pass/fail evaluation.
//! There are no dashboards and no DSL — you compose the building blocks in
//! plain Rust.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Scenario`]: the ordered sequence of [`Step`]s one virtual user runs per
//!   iteration — request templates, named [`Check`]s, think-time pauses.
//! - [`Executor`]: responsible for actually running the scenario. Executors
//!   control concurrency and stop conditions. The built-in [`ConstantVus`]
//!   runs a fixed pool of virtual users until a duration or iteration limit.
//! - [`Metric`]: the smallest unit produced by a run. Every request yields one
//!   [`RequestOutcome`] describing a single sample.
//! - [`Aggregate`]: a lightweight collector that folds outcomes into a
//!   compact, mergeable representation ([`RunAggregate`]).
//! - [`Report`]: transforms an aggregate into human- or machine-friendly
//!   output ([`RunReport`]).
//! - [`Reporter`]: consumes reports and sends them somewhere (stdout, file,
//!   database).
//! - [`Threshold`]s: pass/fail conditions evaluated over the final aggregate,
//!   yielding a [`Verdict`] and the process exit status.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use volley::{
//!     Check, ConstantVus, Executor, Method, Predicate, Reporter, RunAggregate, RunConfig,
//!     RunReport, Scenario, StdoutReporter, Step, Threshold, threshold,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scenario = Scenario::builder()
//!         .name("post api")
//!         .steps(vec![
//!             Step::builder()
//!                 .name("create post")
//!                 .method(Method::POST)
//!                 .url("http://localhost:1234/api/post")
//!                 .headers(vec![("content-type".into(), "application/json".into())])
//!                 // {{vu}} and {{iter}} make each payload unique per user and loop
//!                 .body(r#"{"title":"title {{vu}}-{{iter}}"}"#)
//!                 .checks(vec![
//!                     Check::new("status is 201", Predicate::StatusIs(201)),
//!                     Check::new("has id", Predicate::JsonPathExists("data.id".into())),
//!                 ])
//!                 .think_time(Duration::from_secs(1))
//!                 .build(),
//!         ])
//!         .build();
//!
//!     let config = RunConfig::builder()
//!         .vus(10)
//!         .duration(Duration::from_secs(30))
//!         .thresholds(vec![
//!             Threshold::parse("http_req_duration", "p(95)<700")?,
//!             Threshold::parse("http_req_failed", "rate<0.01")?,
//!         ])
//!         .build();
//!     let thresholds = config.thresholds.clone();
//!
//!     let executor = ConstantVus::try_from(config)?;
//!     let aggregate: RunAggregate = executor.exec(&scenario).await?;
//!
//!     let verdict = threshold::evaluate(&aggregate, &thresholds);
//!     let report = RunReport::from(aggregate).with_verdict(verdict.clone());
//!     StdoutReporter.report(report).await?;
//!     std::process::exit(verdict.exit_code());
//! }
//! ```
//!
//! # Where to start
//!
//! - Read the docs for [`Scenario`], [`Executor`], and [`Reporter`].
//! - See `demos/post_api.rs` for a complete runnable scenario.

/// Metric aggregators and the collector task
pub mod aggregate;
/// Named pass/fail predicates over responses
pub mod check;
/// Run-wide options and stop conditions
pub mod config;
/// Fatal configuration errors and the executor error type
pub mod error;
/// Orchestrators that define how things will actually run
pub mod executor;
/// Single metrics
pub mod metric;
/// Reports and Reporters
pub mod report;
/// One request/response cycle
pub mod request;
/// Scenarios, steps and templates — what a single iteration does
pub mod scenario;
/// Pass/fail conditions over the final metrics
pub mod threshold;

pub use aggregate::{Aggregate, RunAggregate};
pub use check::{Check, Predicate};
pub use config::{RunConfig, RunLimit};
pub use error::{ConfigError, Error};
pub use executor::{ConstantVus, Executor};
pub use metric::{Metric, RequestOutcome};
pub use report::{JsonReporter, Report, Reporter, RunReport, StdoutReporter};
pub use reqwest::Method;
pub use scenario::{IterationContext, Scenario, Step, Template};
pub use threshold::{Threshold, Verdict};
