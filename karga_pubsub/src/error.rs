use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to read publisher config: {0}")]
    Config(String),

    #[error("unable to load google cloud credentials: {0}")]
    Auth(#[source] BoxError),

    #[error("unable to initialise publisher: {0}")]
    Client(#[source] BoxError),

    #[error("failed to publish to topic {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: BoxError,
    },

    #[error("publish to topic {topic} not acknowledged within {timeout:?}")]
    Timeout { topic: String, timeout: Duration },

    #[error("publisher client is closed")]
    Closed,

    #[error("module {0} is already registered")]
    DuplicateModule(String),

    #[error("executor failed: {0}")]
    Executor(String),
}

impl Error {
    /// Setup errors the calling script cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Auth(_) | Self::Client(_))
    }

    pub(crate) fn publish(topic: &str, source: impl Into<BoxError>) -> Self {
        Self::Publish {
            topic: topic.to_owned(),
            source: source.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_errors_are_fatal() {
        assert!(Error::Config("missing field `projectID`".into()).is_fatal());
        assert!(Error::Client("connection refused".into()).is_fatal());
        assert!(!Error::Closed.is_fatal());
        assert!(!Error::publish("orders", "NotFound").is_fatal());
        assert!(
            !Error::Timeout {
                topic: "orders".into(),
                timeout: Duration::from_secs(5),
            }
            .is_fatal()
        );
    }

    #[test]
    fn publish_error_names_the_topic() {
        let err = Error::publish("orders", "Topic not found");
        assert_eq!(
            err.to_string(),
            "failed to publish to topic orders: Topic not found"
        );
    }
}
