use std::marker::PhantomData;

use typed_builder::TypedBuilder;

use crate::{aggregate::Aggregate, error::Result, executor::Executor};

/// A named load test: the action every iteration runs and the executor
/// deciding how often and how concurrently it runs.
///
/// The action is the script. Heavy objects such as a [`Publisher`](crate::Publisher)
/// must be built before the scenario and cloned into the action.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario<A, E, F, Fut>
where
    A: Aggregate,
    E: Executor<A, F, Fut> + Send + Sync,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    #[builder(setter(into))]
    pub name: String,
    pub action: F,
    pub executor: E,
    #[builder(default, setter(skip))]
    aggregator: PhantomData<A>,
}

impl<A, E, F, Fut> Scenario<A, E, F, Fut>
where
    A: Aggregate,
    E: Executor<A, F, Fut> + Send + Sync,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    pub async fn run(&self) -> Result<A> {
        tracing::info!(scenario = %self.name, "Starting scenario");
        self.executor.exec(self).await
    }
}
