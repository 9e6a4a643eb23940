//! Executors decide how often and how concurrently a scenario action runs.
//!
//! Two strategies ship with the crate:
//!
//! - [`StageExecutor`] drives the action at a target publish rate. A governor
//!   task turns a list of [`Stage`]s into a stream of tokens; each worker
//!   spends one token per action. Rates are interpolated linearly between
//!   stage targets, so `Stage::new(30s, 500.0)` after a 100/s stage ramps from
//!   100/s to 500/s over thirty seconds.
//! - [`ConstantExecutor`] (feature `builtins`) runs a fixed number of virtual
//!   users, each looping the action as fast as acknowledgements come back.
//!
//! Each worker folds its metrics into a private [`Aggregate`]. When the run is
//! over the executor merges them in whatever order the workers finish.
//!
//! Actions should not block. A publish waiting on its acknowledgement is fine;
//! a synchronous sleep stalls the worker and skews the achieved rate.

pub mod stage;
pub use stage::{Stage, StageExecutor};

#[cfg(feature = "builtins")]
pub use builtins::*;

use futures::future::join_all;
use tokio::{
    sync::watch,
    task::{JoinError, JoinHandle},
};

use crate::{
    aggregate::Aggregate,
    error::{Error, Result},
    scenario::Scenario,
};

pub trait Executor<A, F, Fut>
where
    Self: Send + Sync + Sized,
    A: Aggregate,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    /// Execute the scenario and return the final aggregate.
    fn exec(&self, scenario: &Scenario<A, Self, F, Fut>) -> impl Future<Output = Result<A>> + Send;
}

/// Lifecycle shared by an executor and its workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Stopped,
}

/// Wait until the run leaves `Pending`. Returns `false` if it was stopped
/// (or the executor went away) before starting.
pub(crate) async fn wait_for_start(state: &mut watch::Receiver<RunState>) -> bool {
    match state.wait_for(|s| *s != RunState::Pending).await {
        Ok(s) => *s == RunState::Running,
        Err(_) => false,
    }
}

/// Map a failed task join (a panic or cancellation) into an executor error.
pub(crate) fn joined<T>(result: Result<T, JoinError>, task: &str) -> Result<T> {
    result.map_err(|e| Error::Executor(format!("{task} task failed: {e}")))
}

/// Join every worker and merge their aggregates.
pub(crate) async fn collect<A: Aggregate + 'static>(handles: Vec<JoinHandle<A>>) -> Result<A> {
    let mut total = A::new();
    for result in join_all(handles).await {
        total.merge(joined(result, "worker")?);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::PublishAggregate;

    #[tokio::test]
    async fn panicking_worker_fails_the_run() {
        let handles: Vec<JoinHandle<PublishAggregate>> = vec![
            tokio::spawn(async { PublishAggregate::new() }),
            tokio::spawn(async { panic!("action blew up") }),
        ];

        let err = collect(handles).await.unwrap_err();

        assert!(matches!(err, Error::Executor(ref msg) if msg.starts_with("worker task failed")));
    }

    #[tokio::test]
    async fn joined_names_the_task() {
        let result = tokio::spawn(async { panic!("governor blew up") }).await;

        let err = joined::<()>(result, "token governor").unwrap_err();

        assert!(matches!(err, Error::Executor(ref msg) if msg.starts_with("token governor task failed")));
        assert!(joined(Ok::<_, JoinError>(7), "worker").is_ok());
    }
}

#[cfg(feature = "builtins")]
mod builtins {
    use std::time::Duration;

    use super::*;

    /// Keeps `vus` workers looping the action for `duration`.
    pub struct ConstantExecutor {
        duration: Duration,
        vus: usize,
    }

    impl ConstantExecutor {
        pub fn new(duration: Duration, vus: usize) -> Self {
            Self { duration, vus }
        }
    }

    impl<A, F, Fut> Executor<A, F, Fut> for ConstantExecutor
    where
        Self: Send + Sync + Sized,
        A: Aggregate + 'static,
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = A::Metric> + Send,
    {
        async fn exec(&self, scenario: &Scenario<A, Self, F, Fut>) -> Result<A> {
            let (state_tx, state_rx) = watch::channel(RunState::Pending);

            let handles = (0..self.vus)
                .map(|_| {
                    let action = scenario.action.clone();
                    let mut state = state_rx.clone();
                    tokio::spawn(async move {
                        let mut agg = A::new();
                        if !wait_for_start(&mut state).await {
                            return agg;
                        }
                        while *state.borrow() == RunState::Running {
                            agg.consume(&action().await);
                        }
                        agg
                    })
                })
                .collect::<Vec<_>>();

            tracing::info!(vus = self.vus, duration = ?self.duration, "Running constant VUs");
            state_tx.send_replace(RunState::Running);
            tokio::time::sleep(self.duration).await;
            state_tx.send_replace(RunState::Stopped);

            let total = collect(handles).await?;
            tracing::info!(scenario = %scenario.name, "Done running scenario");
            Ok(total)
        }
    }

}
