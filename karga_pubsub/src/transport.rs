//! The seam between this crate and the wrapped Pub/Sub client.
//!
//! Everything that actually talks to the service lives behind [`Transport`]
//! and [`TopicHandle`]. [`GoogleTransport`] is the real implementation built on
//! `google-cloud-pubsub`; the publisher only ever sees the traits.

use async_trait::async_trait;
use google_cloud_gax::conn::Environment;
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::{
    client::{Client, ClientConfig},
    publisher::Publisher as TopicPublisher,
};
use google_cloud_token::NopeTokenSourceProvider;
use tokio::sync::Mutex;

use crate::{
    config::PublisherConfig,
    error::{Error, Result},
};

/// A connection to the messaging service, able to open topic handles.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a handle for publishing to `topic`.
    async fn open_topic(&self, topic: &str) -> Result<Box<dyn TopicHandle>>;

    /// Drop the underlying connection. Later calls to `open_topic` fail.
    async fn close(&self);
}

/// A publishing handle for a single topic.
#[async_trait]
pub trait TopicHandle: Send {
    /// Submit `payload` and wait for the server-assigned message ID.
    async fn publish(&mut self, payload: Vec<u8>) -> Result<String>;

    /// Flush and stop the handle. Must be safe to call after a failed publish.
    async fn release(&mut self);
}

/// [`Transport`] backed by the `google-cloud-pubsub` client.
pub struct GoogleTransport {
    client: Mutex<Option<Client>>,
}

impl GoogleTransport {
    /// Open a client bound to the configured project.
    ///
    /// With an emulator host (from the config or `PUBSUB_EMULATOR_HOST`) no
    /// credentials are needed; otherwise application-default credentials are
    /// loaded.
    pub async fn connect(config: &PublisherConfig) -> Result<Self> {
        let mut client_config = client_config(config);
        if let Environment::GoogleCloud(_) = client_config.environment {
            client_config = client_config
                .with_auth()
                .await
                .map_err(|e| Error::Auth(e.into()))?;
        }

        let client = Client::new(client_config)
            .await
            .map_err(|e| Error::Client(e.into()))?;

        Ok(Self {
            client: Mutex::new(Some(client)),
        })
    }
}

/// Client settings for `config`.
///
/// The environment is always set here rather than left to
/// `ClientConfig::default()`, which reads `PUBSUB_EMULATOR_HOST` on its own and
/// would take a blank value as an emulator address.
fn client_config(config: &PublisherConfig) -> ClientConfig {
    let environment = match config.emulator_host() {
        Some(host) => {
            tracing::info!(%host, "Using Pub/Sub emulator");
            Environment::Emulator(host)
        }
        // Credentials are swapped in by `with_auth`
        None => Environment::GoogleCloud(Box::new(NopeTokenSourceProvider {})),
    };

    ClientConfig {
        project_id: Some(config.project_id.clone()),
        environment,
        ..Default::default()
    }
}

#[async_trait]
impl Transport for GoogleTransport {
    async fn open_topic(&self, topic: &str) -> Result<Box<dyn TopicHandle>> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(Error::Closed)?;
        let publisher = client.topic(topic).new_publisher(None);
        Ok(Box::new(GoogleTopic {
            topic: topic.to_owned(),
            publisher,
        }))
    }

    async fn close(&self) {
        self.client.lock().await.take();
    }
}

struct GoogleTopic {
    topic: String,
    publisher: TopicPublisher,
}

#[async_trait]
impl TopicHandle for GoogleTopic {
    async fn publish(&mut self, payload: Vec<u8>) -> Result<String> {
        let awaiter = self
            .publisher
            .publish(PubsubMessage {
                data: payload,
                ..Default::default()
            })
            .await;

        awaiter
            .get()
            .await
            .map_err(|status| Error::publish(&self.topic, status))
    }

    async fn release(&mut self) {
        self.publisher.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EMULATOR_ENV_LOCK, set_emulator_env};

    fn uses_emulator(config: &PublisherConfig) -> Option<String> {
        match client_config(config).environment {
            Environment::Emulator(host) => Some(host),
            Environment::GoogleCloud(_) => None,
        }
    }

    #[test]
    fn blank_emulator_env_takes_the_credentials_path() {
        let _lock = EMULATOR_ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut config = PublisherConfig::new("p");

        set_emulator_env(Some(""));
        assert_eq!(uses_emulator(&config), None);

        set_emulator_env(Some("   "));
        assert_eq!(uses_emulator(&config), None);

        set_emulator_env(None);
        assert_eq!(uses_emulator(&config), None);

        config.emulator_host = Some(String::new());
        assert_eq!(uses_emulator(&config), None);
    }

    #[test]
    fn emulator_host_is_passed_to_the_client() {
        let _lock = EMULATOR_ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut config = PublisherConfig::new("p");

        set_emulator_env(Some("localhost:8085"));
        assert_eq!(uses_emulator(&config), Some("localhost:8085".into()));

        config.emulator_host = Some("localhost:9999".into());
        assert_eq!(uses_emulator(&config), Some("localhost:9999".into()));
        assert_eq!(client_config(&config).project_id.as_deref(), Some("p"));

        set_emulator_env(None);
    }
}
