use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Semaphore, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use typed_builder::TypedBuilder;

use super::{Executor, RunState, collect, joined, wait_for_start};
use crate::{aggregate::Aggregate, error::Result, scenario::Scenario};
use internals::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stage {
    pub duration: Duration,
    /// Publishes per second reached at the end of the stage
    pub target: f64,
}

impl Stage {
    pub fn new(duration: Duration, target: f64) -> Self {
        Self { duration, target }
    }
}

#[derive(TypedBuilder)]
pub struct StageExecutor {
    pub stages: Vec<Stage>,
    /// Governor granularity
    #[builder(default = Duration::from_millis(100))]
    pub tick: Duration,
    /// Unspent tokens kept around to absorb bursts
    #[builder(default = u64::MAX)]
    pub bucket_capacity: u64,
    #[builder(default = num_cpus::get() * 120)]
    pub workers: usize,
}

impl<A, F, Fut> Executor<A, F, Fut> for StageExecutor
where
    Self: Send + Sync + Sized,
    A: Aggregate + 'static,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    async fn exec(&self, scenario: &Scenario<A, Self, F, Fut>) -> Result<A> {
        let (ctx, state_tx) = ExecutionContext::new();

        tracing::debug!(stages = self.stages.len(), "Spawning token governor");
        let governor = tokio::spawn(token_governor_task(
            ctx.clone(),
            self.stages.clone(),
            self.tick,
            self.bucket_capacity,
        ));

        tracing::debug!(workers = self.workers, "Spawning workers");
        let handles = spawn_workers(ctx.clone(), self.workers, scenario.action.clone());

        tracing::info!(scenario = %scenario.name, "Running stages");
        state_tx.send_replace(RunState::Running);

        // The governor running out of stages ends the run
        let governed = governor.await;
        state_tx.send_replace(RunState::Stopped);
        ctx.tokens.close();

        // Workers are still joined so none outlives a failed run
        let total = collect(handles).await;
        joined(governed, "token governor")?;
        let total = total?;
        tracing::info!(scenario = %scenario.name, total = ?total, "Done running scenario");
        Ok(total)
    }
}

#[cfg(feature = "internals")]
pub use internals::*;

mod internals {
    use super::*;

    #[derive(Clone)]
    pub struct ExecutionContext {
        pub state: watch::Receiver<RunState>,
        pub tokens: Arc<Semaphore>,
    }

    impl ExecutionContext {
        pub fn new() -> (Self, watch::Sender<RunState>) {
            let (tx, rx) = watch::channel(RunState::Pending);
            (
                Self {
                    state: rx,
                    tokens: Arc::new(Semaphore::new(0)),
                },
                tx,
            )
        }
    }

    /// Feeds tokens into the shared bucket according to `stages`.
    pub async fn token_governor_task(
        mut ctx: ExecutionContext,
        stages: Vec<Stage>,
        tick: Duration,
        bucket_capacity: u64,
    ) {
        if !wait_for_start(&mut ctx.state).await {
            return;
        }

        // The semaphore panics past MAX_PERMITS
        let capacity = bucket_capacity.min(Semaphore::MAX_PERMITS as u64);
        let mut rate = 0.0;
        let mut fractional = 0.0;
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for stage in stages {
            // Zero length stages jump straight to their target
            if stage.duration.is_zero() {
                rate = stage.target;
                continue;
            }

            let stage_start = Instant::now();
            let start_rate = rate;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = ctx.state.wait_for(|s| *s == RunState::Stopped) => return,
                }
                let elapsed = stage_start.elapsed();
                if elapsed >= stage.duration {
                    break;
                }

                let (add, carry) = tokens_for_tick(
                    elapsed,
                    stage.duration,
                    start_rate,
                    stage.target,
                    fractional,
                    tick,
                );
                fractional = carry;

                let available = ctx.tokens.available_permits() as u64;
                let add = add.min(capacity.saturating_sub(available));
                if add > 0 {
                    ctx.tokens.add_permits(add as usize);
                }
            }
            // Start the next stage from the exact target, not the last interpolated rate
            rate = stage.target;
        }
    }

    /// Number of whole tokens to add this tick, and the fraction carried over.
    ///
    /// ```text
    /// t     = min(elapsed / stage_duration, 1)
    /// rate  = start_rate + (end_rate - start_rate) * t
    /// add   = floor(rate * tick + fractional)
    /// carry = rate * tick + fractional - add
    /// ```
    pub fn tokens_for_tick(
        elapsed: Duration,
        stage_duration: Duration,
        start_rate: f64,
        end_rate: f64,
        fractional: f64,
        tick: Duration,
    ) -> (u64, f64) {
        let t = (elapsed.as_secs_f64() / stage_duration.as_secs_f64()).min(1.0);
        let rate = start_rate + (end_rate - start_rate) * t;
        let owed = rate * tick.as_secs_f64() + fractional;
        let add = owed.floor().max(0.0);
        (add as u64, owed - add)
    }

    /// Spawn `workers` tasks that each spend one token per action run.
    pub fn spawn_workers<A, F, Fut>(
        ctx: ExecutionContext,
        workers: usize,
        action: F,
    ) -> Vec<JoinHandle<A>>
    where
        A: Aggregate + 'static,
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = A::Metric> + Send,
    {
        (0..workers)
            .map(|_| {
                let mut ctx = ctx.clone();
                let action = action.clone();
                tokio::spawn(async move {
                    let mut agg = A::new();
                    if !wait_for_start(&mut ctx.state).await {
                        return agg;
                    }
                    loop {
                        tokio::select! {
                            biased;
                            _ = ctx.state.wait_for(|s| *s == RunState::Stopped) => break,
                            permit = ctx.tokens.acquire() => match permit {
                                Ok(permit) => permit.forget(),
                                // Bucket closed
                                Err(_) => break,
                            },
                        }
                        agg.consume(&action().await);
                    }
                    agg
                })
            })
            .collect()
    }
}
