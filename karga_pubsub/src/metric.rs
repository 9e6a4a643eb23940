use std::fmt::Debug;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A single sample produced by one run of a scenario action.
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

/// Outcome of one publish call as seen by the script.
///
/// `success` is the equivalent of checking that the publish returned no error.
#[derive(Serialize, Deserialize, PartialOrd, PartialEq, Debug, Clone, Default)]
pub struct PublishMetric {
    pub latency: std::time::Duration,
    pub success: bool,
    /// Payload size, counted whether or not the message was acknowledged.
    pub bytes: usize,
}

impl Metric for PublishMetric {}
