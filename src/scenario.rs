use std::time::Duration;

use reqwest::{Client, Method};
use tokio::sync::{mpsc, watch};
use typed_builder::TypedBuilder;

use crate::{check::Check, metric::RequestOutcome, request};

/// An ordered sequence of steps, run once per virtual-user iteration.
///
/// A `Scenario` is immutable once built and lives for the whole run; the
/// executor owns scheduling, the scenario owns *what* a single iteration does.
/// Steps execute in declared order every iteration regardless of earlier
/// failures — a failed request is recorded and the iteration moves on.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario {
    #[builder(setter(into))]
    pub name: String,
    pub steps: Vec<Step>,
}

/// One request template plus its checks and optional think-time.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Step {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default = Method::GET)]
    pub method: Method,
    #[builder(setter(into))]
    pub url: Template,
    #[builder(default)]
    pub headers: Vec<(String, String)>,
    #[builder(default, setter(strip_option, into))]
    pub body: Option<Template>,
    #[builder(default)]
    pub checks: Vec<Check>,
    /// Pause applied after this step completes, before the next one starts.
    #[builder(default, setter(strip_option))]
    pub think_time: Option<Duration>,
}

/// A string template that may reference the current virtual user and
/// iteration through `{{vu}}` and `{{iter}}` placeholders.
///
/// Rendering takes the iteration context explicitly — there is no ambient
/// state to reach for, which keeps templates deterministic per (vu, iter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template(String);

impl Template {
    pub fn render(&self, ctx: IterationContext) -> String {
        self.0
            .replace("{{vu}}", &ctx.vu.to_string())
            .replace("{{iter}}", &ctx.iteration.to_string())
    }
}

impl From<&str> for Template {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for Template {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Identity of one loop pass: which virtual user, which iteration.
///
/// Virtual user ids start at 1, iterations at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationContext {
    pub vu: u64,
    pub iteration: u64,
}

impl Scenario {
    /// Run every step once, streaming each outcome into `outcomes`.
    ///
    /// Cancellation is observed between steps and during think-time pauses;
    /// an in-flight request is never force-aborted beyond its own timeout.
    /// Returns once all steps ran, the run was cancelled, or the collector
    /// went away.
    pub async fn run_iteration(
        &self,
        client: &Client,
        ctx: IterationContext,
        cancel: &mut watch::Receiver<bool>,
        outcomes: &mpsc::Sender<RequestOutcome>,
    ) {
        for step in &self.steps {
            if *cancel.borrow() {
                return;
            }

            let outcome = request::execute(client, step, ctx).await;
            tracing::trace!(
                step = %step.name,
                vu = ctx.vu,
                iteration = ctx.iteration,
                status = ?outcome.status,
                latency = ?outcome.latency,
                "step finished"
            );
            if outcomes.send(outcome).await.is_err() {
                // Collector is gone, nothing left to record for.
                return;
            }

            if let Some(pause) = step.think_time {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = cancel.wait_for(|stop| *stop) => return,
                }
            }
        }
    }
}
