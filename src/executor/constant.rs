//! The `ConstantVus` executor: a fixed pool of virtual users driving the
//! scenario in parallel loops.
//!
//! # High-level flow
//! 1. A shared execution context is created, holding the cancellation signal
//!    and the outcome channel.
//! 2. A collector task is spawned; it drains the outcome channel into the
//!    final aggregate.
//! 3. Exactly `vus` worker tasks are spawned at time zero (no ramp-up). Each
//!    worker repeatedly:
//!    - checks the cancellation signal and its own iteration count,
//!    - runs one full scenario iteration, streaming each step's outcome into
//!      the channel,
//!    - goes again, until a stop condition holds.
//! 4. The run stops when every worker hits its iteration cap, the configured
//!    duration elapses, or an external shutdown signal fires. On the latter
//!    two, workers get a grace period to finish in-flight work; stragglers
//!    are aborted after it.
//! 5. With every worker stopped, the outcome channel closes, the collector
//!    returns the final aggregate, and `exec` hands it back.
//!
//! # Ordering
//! Within one virtual user, steps run strictly in declared order and
//! iteration N+1 never starts before iteration N finished. Between virtual
//! users there is no ordering guarantee at all.
//!
//! # Tuning knobs
//! - `request_timeout`: per-request bound applied at the HTTP client; this is
//!   also what limits in-flight work after cancellation, since requests are
//!   never force-aborted mid-flight.
//! - `grace`: how long draining may take after the stop signal before the
//!   remaining workers are aborted.
use std::{sync::Arc, time::Duration};

use futures::future::{JoinAll, join_all};
use tokio::{
    sync::{mpsc, watch},
    task::{AbortHandle, JoinError, JoinHandle},
};
use typed_builder::TypedBuilder;

use super::Executor;
use crate::{
    aggregate::{Aggregate, aggregator_task},
    config::{RunConfig, RunLimit},
    error::{ConfigError, Error},
    metric::RequestOutcome,
    scenario::Scenario,
};
use internals::*;

/// How many outcomes the collector consumes per channel wakeup.
const OUTCOME_BATCH: usize = 64;

/// Executor that runs a constant number of concurrent virtual users until a
/// duration or per-user iteration cap is reached.
///
/// Construct it directly through the builder, or from a validated
/// [`RunConfig`] via `TryFrom`.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ConstantVus {
    /// Number of concurrent virtual users.
    pub vus: usize,
    /// The stop condition.
    pub limit: RunLimit,
    /// Per-request timeout applied by the HTTP client.
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,
    /// Drain budget between the stop signal and aborting stragglers.
    #[builder(default = Duration::from_secs(5))]
    pub grace: Duration,
    /// Optional external stop signal; send `true` to end the run early.
    #[builder(default, setter(strip_option))]
    pub shutdown: Option<watch::Receiver<bool>>,
}

impl TryFrom<RunConfig> for ConstantVus {
    type Error = ConfigError;

    fn try_from(config: RunConfig) -> Result<Self, ConfigError> {
        let limit = config.validate()?;
        Ok(Self {
            vus: config.vus,
            limit,
            request_timeout: config.request_timeout,
            grace: config.grace,
            shutdown: None,
        })
    }
}

impl<A> Executor<A> for ConstantVus
where
    A: Aggregate<Metric = RequestOutcome> + 'static,
{
    type Error = Error;

    async fn exec(&self, scenario: &Scenario) -> Result<A, Error> {
        if scenario.steps.is_empty() {
            return Err(ConfigError::EmptyScenario(scenario.name.clone()).into());
        }

        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?;

        let (ctx, cancel_tx, outcome_rx) = ExecutionContext::new(self.vus * 16);
        let collector = tokio::spawn(aggregator_task::<A>(outcome_rx, OUTCOME_BATCH));

        tracing::info!(
            scenario = %scenario.name,
            vus = self.vus,
            limit = ?self.limit,
            "spawning virtual users"
        );
        let scenario = Arc::new(scenario.clone());
        let handles = spawn_virtual_users(&ctx, scenario.clone(), client, self.vus, self.limit);
        // Each worker holds its own sender clone; once they all stop, the
        // channel closes and the collector finishes.
        drop(ctx);

        let aborts: Vec<AbortHandle> = handles.iter().map(|h| h.abort_handle()).collect();
        let mut vus_done = join_all(handles);

        let deadline = async {
            match self.limit {
                RunLimit::Duration(duration) => tokio::time::sleep(duration).await,
                RunLimit::Iterations(_) => std::future::pending().await,
            }
        };
        let external = async {
            match self.shutdown.clone() {
                Some(mut stop) => {
                    let _ = stop.wait_for(|stop| *stop).await;
                }
                None => std::future::pending().await,
            }
        };

        let mut finished = None;
        tokio::select! {
            results = &mut vus_done => finished = Some(results),
            _ = deadline => tracing::info!("run duration elapsed, draining virtual users"),
            _ = external => tracing::info!("shutdown signal received, draining virtual users"),
        }
        let results = match finished {
            Some(results) => results,
            None => {
                let _ = cancel_tx.send(true);
                drain(vus_done, &aborts, self.grace).await
            }
        };
        for result in results {
            if let Err(error) = result {
                // One lost worker shouldn't cost us the rest of the data.
                tracing::error!("virtual user task failed: {error}");
            }
        }

        tracing::info!(scenario = %scenario.name, "collecting results");
        let aggregate = collector.await?;
        Ok(aggregate)
    }
}

mod internals {
    use super::*;
    use crate::scenario::IterationContext;

    /// Shared state between the executor and its worker tasks.
    #[derive(Clone)]
    pub struct ExecutionContext {
        /// Flips to `true` exactly once, when the run must stop.
        pub cancel: watch::Receiver<bool>,
        /// Where workers stream every recorded outcome.
        pub outcomes: mpsc::Sender<RequestOutcome>,
    }

    impl ExecutionContext {
        pub fn new(
            buffer: usize,
        ) -> (
            Self,
            watch::Sender<bool>,
            mpsc::Receiver<RequestOutcome>,
        ) {
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let (outcome_tx, outcome_rx) = mpsc::channel(buffer.max(1));
            (
                Self {
                    cancel: cancel_rx,
                    outcomes: outcome_tx,
                },
                cancel_tx,
                outcome_rx,
            )
        }
    }

    /// Spawn one looping task per virtual user. Ids start at 1.
    pub fn spawn_virtual_users(
        ctx: &ExecutionContext,
        scenario: Arc<Scenario>,
        client: reqwest::Client,
        vus: usize,
        limit: RunLimit,
    ) -> Vec<JoinHandle<()>> {
        (1..=vus as u64)
            .map(|vu| {
                let mut ctx = ctx.clone();
                let scenario = scenario.clone();
                let client = client.clone();
                tokio::spawn(async move {
                    tracing::debug!(vu, "virtual user running");
                    let mut iteration: u64 = 0;
                    loop {
                        if *ctx.cancel.borrow() {
                            break;
                        }
                        if let RunLimit::Iterations(cap) = limit {
                            if iteration >= cap {
                                break;
                            }
                        }
                        scenario
                            .run_iteration(
                                &client,
                                IterationContext { vu, iteration },
                                &mut ctx.cancel,
                                &ctx.outcomes,
                            )
                            .await;
                        iteration += 1;
                    }
                    tracing::debug!(vu, iterations = iteration, "virtual user stopped");
                })
            })
            .collect()
    }

    /// Wait for the workers to finish, aborting whatever is still running
    /// once the grace period is spent.
    pub async fn drain(
        mut vus_done: JoinAll<JoinHandle<()>>,
        aborts: &[AbortHandle],
        grace: Duration,
    ) -> Vec<Result<(), JoinError>> {
        match tokio::time::timeout(grace, &mut vus_done).await {
            Ok(results) => results,
            Err(_) => {
                tracing::warn!("grace period elapsed, aborting remaining virtual users");
                for abort in aborts {
                    abort.abort();
                }
                vus_done.await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::RunAggregate;
    use crate::check::{Check, Predicate};
    use crate::scenario::Step;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use reqwest::Method;
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::time::Instant;

    async fn serve_posts_api() -> SocketAddr {
        let app = Router::new().route(
            "/api/post",
            post(|| async { (StatusCode::CREATED, Json(json!({"data": {"id": "1"}}))) })
                .get(|| async { Json(json!({"data": []})) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn two_step_scenario(addr: SocketAddr) -> Scenario {
        Scenario::builder()
            .name("posts")
            .steps(vec![
                Step::builder()
                    .name("create")
                    .method(Method::POST)
                    .url(format!("http://{addr}/api/post"))
                    .checks(vec![Check::new("status is 201", Predicate::StatusIs(201))])
                    .build(),
                Step::builder()
                    .name("list")
                    .url(format!("http://{addr}/api/post"))
                    .checks(vec![Check::new(
                        "data is array",
                        Predicate::JsonPathIsArray("data".into()),
                    )])
                    .build(),
            ])
            .build()
    }

    #[tokio::test]
    async fn records_every_iteration_of_every_virtual_user() {
        let addr = serve_posts_api().await;
        let scenario = two_step_scenario(addr);
        let executor = ConstantVus::builder()
            .vus(4)
            .limit(RunLimit::Iterations(5))
            .build();

        let aggregate: RunAggregate = executor.exec(&scenario).await.unwrap();

        assert_eq!(aggregate.steps["create"].total, 20);
        assert_eq!(aggregate.steps["list"].total, 20);
        assert_eq!(aggregate.requests(), 40);
        assert_eq!(aggregate.failed(), 0);
        assert_eq!(aggregate.checks["status is 201"].passes, 20);
        assert_eq!(aggregate.checks["data is array"].passes, 20);
    }

    #[tokio::test]
    async fn duration_limit_ends_the_run() {
        let addr = serve_posts_api().await;
        let scenario = two_step_scenario(addr);
        let executor = ConstantVus::builder()
            .vus(2)
            .limit(RunLimit::Duration(Duration::from_millis(300)))
            .grace(Duration::from_secs(2))
            .build();

        let started = Instant::now();
        let aggregate: RunAggregate = executor.exec(&scenario).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(aggregate.requests() > 0);
    }

    #[tokio::test]
    async fn shutdown_signal_stops_workers_without_new_iterations() {
        let addr = serve_posts_api().await;
        // One quick step, then a think-time far longer than the test: each
        // virtual user records exactly one outcome before idling.
        let scenario = Scenario::builder()
            .name("sleepy")
            .steps(vec![
                Step::builder()
                    .name("probe")
                    .method(Method::POST)
                    .url(format!("http://{addr}/api/post"))
                    .think_time(Duration::from_secs(60))
                    .build(),
            ])
            .build();

        let (stop_tx, stop_rx) = watch::channel(false);
        let executor = ConstantVus::builder()
            .vus(3)
            .limit(RunLimit::Duration(Duration::from_secs(120)))
            .grace(Duration::from_secs(2))
            .shutdown(stop_rx)
            .build();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = stop_tx.send(true);
        });

        let started = Instant::now();
        let aggregate: RunAggregate = executor.exec(&scenario).await.unwrap();

        // Stopped well within the grace budget, not at the 120s deadline.
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(aggregate.steps["probe"].total, 3);
    }

    #[tokio::test]
    async fn empty_scenario_is_a_config_error() {
        let executor = ConstantVus::builder()
            .vus(1)
            .limit(RunLimit::Iterations(1))
            .build();
        let scenario = Scenario::builder().name("empty").steps(vec![]).build();
        let result: Result<RunAggregate, Error> = executor.exec(&scenario).await;
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::EmptyScenario(_)))
        ));
    }

    #[test]
    fn builds_from_a_validated_config() {
        let config = RunConfig::builder()
            .vus(10)
            .duration(Duration::from_secs(30))
            .build();
        let executor = ConstantVus::try_from(config).unwrap();
        assert_eq!(executor.vus, 10);
        assert_eq!(
            executor.limit,
            RunLimit::Duration(Duration::from_secs(30))
        );

        let conflicting = RunConfig::builder()
            .vus(10)
            .duration(Duration::from_secs(30))
            .iterations(5)
            .build();
        assert!(matches!(
            ConstantVus::try_from(conflicting),
            Err(ConfigError::ConflictingLimits)
        ));
    }
}
