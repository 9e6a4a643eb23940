use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{fmt::Debug, time::Duration};

use crate::{Aggregate, aggregate::PublishAggregate, error::Result};

/// Final, derived view over an [`Aggregate`].
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// Sends a [`Report`] somewhere.
#[async_trait]
pub trait Reporter<A: Aggregate, R: Report<A>> {
    async fn report(&self, report: R) -> Result<()>;
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct PublishReport {
    pub count: usize,
    pub sent: usize,
    pub failed: usize,
    /// Percentage of acknowledged publishes.
    pub success_ratio: f64,
    pub average_latency: Duration,
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub total_bytes: usize,
}

impl From<PublishAggregate> for PublishReport {
    fn from(value: PublishAggregate) -> Self {
        // An idle run reports zeros rather than NaN
        let (average_latency, success_ratio) = match value.count {
            0 => (Duration::ZERO, 0.0),
            n => (
                value.total_latency.div_f64(n as f64),
                (value.sent as f64 / n as f64) * 100.0,
            ),
        };

        Self {
            count: value.count,
            sent: value.sent,
            failed: value.failed(),
            success_ratio,
            average_latency,
            min_latency: value.min_latency.unwrap_or_default(),
            max_latency: value.max_latency,
            total_bytes: value.total_bytes,
        }
    }
}
impl Report<PublishAggregate> for PublishReport {}

/// Logs the report through `tracing` as a single structured line.
pub struct TracingReporter;

#[async_trait]
impl Reporter<PublishAggregate, PublishReport> for TracingReporter {
    async fn report(&self, report: PublishReport) -> Result<()> {
        tracing::info!(
            count = report.count,
            sent = report.sent,
            failed = report.failed,
            success_ratio = report.success_ratio,
            average_latency = ?report.average_latency,
            max_latency = ?report.max_latency,
            total_bytes = report.total_bytes,
            "Publish report"
        );
        Ok(())
    }
}

#[cfg(feature = "builtins")]
pub use builtins::*;

#[cfg(feature = "builtins")]
mod builtins {
    use super::*;

    pub struct StdoutReporter;

    #[async_trait]
    impl Reporter<PublishAggregate, PublishReport> for StdoutReporter {
        async fn report(&self, report: PublishReport) -> Result<()> {
            println!("{report:#?}");
            Ok(())
        }
    }
}
