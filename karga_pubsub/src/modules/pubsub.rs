use std::{any::Any, sync::Arc};

use super::Module;
use crate::{
    config::{ConfigMap, PublisherConfig},
    error::{Error, Result},
    publisher::Publisher,
};

/// Import path of the Pub/Sub module.
pub const NAME: &str = "karga/x/pubsub";

/// The Google Cloud Pub/Sub extension as scripts see it.
///
/// See <https://cloud.google.com/pubsub/docs/overview>
#[derive(Debug, Default, Clone, Copy)]
pub struct PubSub;

impl PubSub {
    /// Build a publisher from a script supplied config.
    ///
    /// A config that cannot be decoded or a client that cannot be opened
    /// leaves the load test with nothing to run, so both end the process.
    pub async fn publisher(&self, config: &ConfigMap) -> Publisher {
        match self.try_publisher(config).await {
            Ok(publisher) => publisher,
            Err(err) => abort(err),
        }
    }

    /// Same as [`publisher`](Self::publisher) but hands setup errors back.
    pub async fn try_publisher(&self, config: &ConfigMap) -> Result<Publisher> {
        let config = PublisherConfig::from_map(config)?;
        Publisher::connect(config).await
    }

    /// Publish `message` to `topic`. Errors are returned, never fatal.
    pub async fn publish(&self, client: &Publisher, topic: &str, message: &str) -> Result<String> {
        client.publish(topic, message).await
    }
}

impl Module for PubSub {
    fn exports(&self) -> &'static [&'static str] {
        &["publisher", "publish"]
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn abort(err: Error) -> ! {
    tracing::error!(error = %err, fatal = err.is_fatal(), "karga-pubsub: {err}");
    std::process::exit(1)
}
