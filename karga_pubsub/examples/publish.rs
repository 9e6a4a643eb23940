use std::time::Duration;

use karga_pubsub::{
    PublishAggregate, PublishReport, Reporter, Scenario,
    config::ConfigMap,
    executor::ConstantExecutor,
    modules::{self, PubSub},
    report::StdoutReporter,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

// Point PUBSUB_EMULATOR_HOST at a local emulator (and create `test_topic_1`
// there) to try this without a Google Cloud project.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let pubsub = modules::import::<PubSub>(modules::pubsub::NAME).unwrap();

    // publishTimeout is 5 seconds by default, debug and trace are off
    let mut config = ConfigMap::new();
    config.insert(
        "projectID".into(),
        json!(std::env::var("PUBSUB_PROJECT_ID").unwrap_or_default()),
    );
    let client = pubsub.publisher(&config).await;

    let action = {
        let client = client.clone();
        move || {
            let client = client.clone();
            async move {
                client
                    .publish_metric(
                        "test_topic_1",
                        r#"{"StringField":"", "FloatField":0.1, "BooleanField":false}"#,
                    )
                    .await
            }
        }
    };

    let results = Scenario::<PublishAggregate, _, _, _>::builder()
        .name("Pub/Sub publish")
        .action(action)
        .executor(ConstantExecutor::new(Duration::from_secs(10), 10))
        .build()
        .run()
        .await
        .unwrap();

    client.close().await;

    StdoutReporter.report(PublishReport::from(results)).await.unwrap();
}
