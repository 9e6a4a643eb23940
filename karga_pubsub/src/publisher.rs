use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use crate::{
    config::PublisherConfig,
    error::{Error, Result},
    metric::PublishMetric,
    transport::{GoogleTransport, Transport},
};

/// Client handle scripts publish through.
///
/// Build it once, outside the scenario action, and clone it into the action.
/// Clones share the underlying connection.
#[derive(Clone)]
pub struct Publisher {
    config: Arc<PublisherConfig>,
    transport: Arc<dyn Transport>,
    closed: Arc<AtomicBool>,
}

impl Publisher {
    /// Open a Pub/Sub client for the configured project.
    pub async fn connect(config: PublisherConfig) -> Result<Self> {
        if config.trace {
            tracing::trace!(project = %config.project_id, "Opening Pub/Sub client");
        }
        let transport = GoogleTransport::connect(&config).await?;
        Ok(Self::with_transport(config, transport))
    }

    /// Wrap an already opened transport.
    pub fn with_transport(config: PublisherConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Publish `message` to `topic` and wait for the acknowledgement.
    ///
    /// A topic handle is opened for this call only and released before
    /// returning, whatever the outcome. Returns the server-assigned message ID.
    pub async fn publish(&self, topic: &str, message: impl Into<Vec<u8>>) -> Result<String> {
        let result = self.publish_inner(topic, message.into()).await;
        match &result {
            Ok(id) => tracing::info!(topic, message_id = %id, "Published a message with a message ID: {id}"),
            Err(err) => tracing::error!(topic, error = %err, "Failed to publish"),
        }
        result
    }

    /// Like [`publish`](Self::publish), but returns the outcome as a metric
    /// ready to be consumed by an aggregate.
    pub async fn publish_metric(&self, topic: &str, message: impl Into<Vec<u8>>) -> PublishMetric {
        let payload = message.into();
        let bytes = payload.len();
        let start = Instant::now();
        let success = self.publish(topic, payload).await.is_ok();
        PublishMetric {
            latency: start.elapsed(),
            success,
            bytes,
        }
    }

    /// Shut the client down. Every clone is affected.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.transport.close().await;
        if self.config.trace {
            tracing::trace!(project = %self.config.project_id, "Closed Pub/Sub client");
        }
    }

    async fn publish_inner(&self, topic: &str, payload: Vec<u8>) -> Result<String> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if self.config.debug {
            tracing::debug!(topic, payload = %String::from_utf8_lossy(&payload), "Publishing");
        }

        let mut handle = self.transport.open_topic(topic).await?;
        if self.config.trace {
            tracing::trace!(topic, "Opened topic handle");
        }

        let timeout = self.config.publish_timeout;
        let outcome = tokio::time::timeout(timeout, handle.publish(payload)).await;

        handle.release().await;
        if self.config.trace {
            tracing::trace!(topic, "Released topic handle");
        }

        outcome.unwrap_or_else(|_| {
            Err(Error::Timeout {
                topic: topic.to_owned(),
                timeout,
            })
        })
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Mutex, atomic::Ordering},
        time::Duration,
    };

    use super::*;
    use crate::transport::fake::FakeTransport;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::TRACE)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }
    }

    fn publisher(transport: FakeTransport) -> Publisher {
        Publisher::with_transport(PublisherConfig::new("test-project"), transport)
    }

    #[tokio::test]
    async fn successful_publish_logs_message_id() {
        let logs = LogBuffer::default();
        let _guard = logs.install();
        let transport = FakeTransport::default();

        let id = publisher(transport.clone())
            .publish("test_topic_1", r#"{"StringField":""}"#)
            .await
            .unwrap();

        assert_eq!(id, "msg-0");
        assert!(logs.contents().contains("Published a message with a message ID: msg-0"));
        assert_eq!(transport.published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_publish_returns_error_and_logs() {
        let logs = LogBuffer::default();
        let _guard = logs.install();

        let err = publisher(FakeTransport::rejecting("Topic not found"))
            .publish("missing", "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Publish { ref topic, .. } if topic == "missing"));
        assert!(!err.is_fatal());
        assert!(logs.contents().contains("Failed to publish"));
    }

    #[tokio::test]
    async fn topic_handle_released_on_every_outcome() {
        let ok = FakeTransport::default();
        let bad = FakeTransport::rejecting("boom");

        publisher(ok.clone()).publish("t", "a").await.unwrap();
        publisher(ok.clone()).publish("t", "b").await.unwrap();
        publisher(bad.clone()).publish("t", "c").await.unwrap_err();

        assert_eq!(ok.opened.load(Ordering::SeqCst), 2);
        assert_eq!(ok.released.load(Ordering::SeqCst), 2);
        assert_eq!(bad.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_acknowledgement_times_out() {
        let transport = FakeTransport::slow(Duration::from_secs(60));
        let mut config = PublisherConfig::new("p");
        config.publish_timeout = Duration::from_millis(100);

        let err = Publisher::with_transport(config, transport.clone())
            .publish("t", "late")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { timeout, .. } if timeout == Duration::from_millis(100)));
        assert_eq!(transport.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_publisher_refuses_to_publish() {
        let transport = FakeTransport::default();
        let client = publisher(transport.clone());
        let clone = client.clone();

        client.close().await;
        client.close().await;

        assert!(clone.is_closed());
        assert!(transport.closed.load(Ordering::SeqCst));
        assert!(matches!(clone.publish("t", "x").await, Err(Error::Closed)));
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publish_metric_reflects_outcome() {
        let sent = publisher(FakeTransport::default())
            .publish_metric("t", "12345")
            .await;
        let failed = publisher(FakeTransport::rejecting("nope"))
            .publish_metric("t", "123")
            .await;

        assert!(sent.success);
        assert_eq!(sent.bytes, 5);
        assert!(!failed.success);
        assert_eq!(failed.bytes, 3);
    }

    #[tokio::test]
    async fn flags_gate_detail_logging() {
        let logs = LogBuffer::default();
        let _guard = logs.install();
        let mut config = PublisherConfig::new("p");
        config.debug = true;
        config.trace = true;

        Publisher::with_transport(config, FakeTransport::default())
            .publish("t", "payload-123")
            .await
            .unwrap();

        let out = logs.contents();
        let payload_line = out.lines().find(|l| l.contains("payload-123")).unwrap();
        assert!(payload_line.contains("DEBUG"));
        let released = out.lines().find(|l| l.contains("Released topic handle")).unwrap();
        assert!(released.contains("TRACE"));
        assert!(out.lines().any(|l| l.contains("Opened topic handle") && l.contains("TRACE")));
    }

    #[tokio::test]
    async fn detail_logging_off_by_default() {
        let logs = LogBuffer::default();
        let _guard = logs.install();

        publisher(FakeTransport::default())
            .publish("t", "payload-456")
            .await
            .unwrap();

        let out = logs.contents();
        assert!(!out.contains("payload-456"));
        assert!(!out.contains("topic handle"));
        assert!(out.contains("Published a message"));
    }
}
