//! Runs against a Pub/Sub emulator, e.g.
//!
//! ```text
//! gcloud beta emulators pubsub start --host-port=localhost:8085
//! PUBSUB_EMULATOR_HOST=localhost:8085 cargo test --test emulator
//! ```
//!
//! Without `PUBSUB_EMULATOR_HOST` every test returns early.

use google_cloud_pubsub::client::{Client, ClientConfig};
use karga_pubsub::{
    Error,
    config::{ConfigMap, EMULATOR_HOST_ENV},
    modules::{self, PubSub},
};
use serde_json::json;

const PROJECT: &str = "karga-pubsub-test";

fn emulator_available() -> bool {
    std::env::var(EMULATOR_HOST_ENV).is_ok_and(|host| !host.is_empty())
}

fn config() -> ConfigMap {
    ConfigMap::from_iter([
        ("projectID".to_owned(), json!(PROJECT)),
        ("publishTimeout".to_owned(), json!("2s")),
        ("trace".to_owned(), json!(true)),
    ])
}

async fn create_topic(name: &str) {
    let client = Client::new(ClientConfig {
        project_id: Some(PROJECT.to_owned()),
        ..Default::default()
    })
    .await
    .unwrap();
    let topic = client.topic(name);
    if !topic.exists(None).await.unwrap() {
        topic.create(None, None).await.unwrap();
    }
}

#[tokio::test]
async fn publish_to_existing_topic_returns_message_id() {
    if !emulator_available() {
        return;
    }
    create_topic("test_topic_1").await;
    let pubsub = modules::import::<PubSub>(modules::pubsub::NAME).unwrap();

    let client = pubsub.try_publisher(&config()).await.unwrap();
    let id = pubsub
        .publish(&client, "test_topic_1", r#"{"StringField":"", "FloatField":0.1}"#)
        .await
        .unwrap();
    client.close().await;

    assert!(!id.is_empty());
}

#[tokio::test]
async fn publish_to_missing_topic_is_an_error_not_an_abort() {
    if !emulator_available() {
        return;
    }
    let pubsub = PubSub;

    let client = pubsub.try_publisher(&config()).await.unwrap();
    let err = pubsub
        .publish(&client, "no_such_topic", "hello")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Publish { .. } | Error::Timeout { .. }));
    assert!(!err.is_fatal());

    // The client is still usable afterwards
    create_topic("test_topic_2").await;
    assert!(pubsub.publish(&client, "test_topic_2", "again").await.is_ok());
}
