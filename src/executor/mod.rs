//! Executor — orchestration of runtime execution.
//!
//! The `Executor` trait is the runtime that executes a `Scenario`. Different
//! executors provide different execution strategies: constant worker pools,
//! ramping profiles, distributed execution.
//!
//! The built-in [`ConstantVus`] executor runs a fixed pool of virtual users,
//! each looping the scenario until a duration or iteration limit is reached.
pub mod constant;
pub use constant::ConstantVus;

use std::future::Future;

use crate::{aggregate::Aggregate, metric::RequestOutcome, scenario::Scenario};

/// The runtime hook that executes a [`Scenario`].
///
/// An `Executor` owns the scheduling strategy: how many workers run, when
/// they stop, and how their recorded outcomes are funneled into the final
/// aggregate. It is generic over the aggregate so callers pick the summary
/// representation they want back.
pub trait Executor<A>
where
    Self: Send + Sync + Sized,
    A: Aggregate<Metric = RequestOutcome>,
{
    type Error;

    /// Execute the scenario and return the final aggregate.
    fn exec(&self, scenario: &Scenario) -> impl Future<Output = Result<A, Self::Error>> + Send;
}
