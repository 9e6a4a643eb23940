use crate::Metric;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{fmt::Debug, time::Duration};

/// The `Aggregate` trait folds raw [`Metric`] samples into a compact,
/// mergeable representation.
///
/// Aggregates keep counters and totals only. Derived numbers such as averages
/// and ratios belong in a [`Report`](crate::Report), built from the aggregate
/// once the run is over.
///
/// Every executor worker owns its own aggregate and the executor merges them at
/// the end, in no particular order. `merge` must therefore be associative and
/// commutative.
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Fold a batch of metrics into the aggregate.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Running totals over [`PublishMetric`](crate::metric::PublishMetric)s.
///
/// Latency extremes are tracked over every publish, acknowledged or not, so a
/// run of timeouts shows up as a high `max_latency`.
#[derive(Serialize, Deserialize, PartialOrd, PartialEq, Debug, Clone, Default)]
pub struct PublishAggregate {
    pub count: usize,
    pub sent: usize,
    pub total_latency: Duration,
    pub min_latency: Option<Duration>,
    pub max_latency: Duration,
    pub total_bytes: usize,
}

impl PublishAggregate {
    pub fn failed(&self) -> usize {
        self.count - self.sent
    }
}

impl Aggregate for PublishAggregate {
    type Metric = crate::metric::PublishMetric;

    fn new() -> Self {
        Self::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        self.count += 1;
        self.sent += usize::from(metric.success);
        self.total_latency += metric.latency;
        self.min_latency = Some(match self.min_latency {
            Some(min) => min.min(metric.latency),
            None => metric.latency,
        });
        self.max_latency = self.max_latency.max(metric.latency);
        self.total_bytes += metric.bytes;
    }

    fn merge(&mut self, other: Self) {
        self.count += other.count;
        self.sent += other.sent;
        self.total_latency += other.total_latency;
        self.min_latency = match (self.min_latency, other.min_latency) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max_latency = self.max_latency.max(other.max_latency);
        self.total_bytes += other.total_bytes;
    }
}
