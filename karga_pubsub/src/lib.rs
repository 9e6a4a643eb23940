//! karga-pubsub — Google Cloud Pub/Sub publishing for karga load tests.
//!
//! The extension does very little on its own: it decodes a publisher config
//! handed over by the script, opens a `google-cloud-pubsub` client bound to the
//! project, and publishes one message per call, reporting the message ID or the
//! error. Batching, retries and flow control are the client library's business.
//!
//! Around that sit the pieces of the karga engine a publish load test needs:
//!
//! - [`Scenario`]: ties a name, an action (the "script") and an executor together.
//! - [`Executor`]: runs the action. [`StageExecutor`] follows a publish rate
//!   schedule, `ConstantExecutor` keeps a fixed number of virtual users busy.
//! - [`Metric`] / [`Aggregate`]: one [`PublishMetric`] per action run, folded into
//!   a mergeable [`PublishAggregate`] per worker.
//! - [`Report`] / [`Reporter`]: turn the final aggregate into a [`PublishReport`]
//!   and print or log it.
//!
//! Scripts reach the publisher through the [`PubSub`] module, registered as
//! `karga/x/pubsub`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use karga_pubsub::{
//!     Reporter, Scenario,
//!     aggregate::PublishAggregate,
//!     config::ConfigMap,
//!     executor::{Stage, StageExecutor},
//!     modules::{self, PubSub},
//!     report::{PublishReport, StdoutReporter},
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> karga_pubsub::Result<()> {
//!     let pubsub = modules::import::<PubSub>(modules::pubsub::NAME).unwrap();
//!
//!     let mut config = ConfigMap::new();
//!     config.insert("projectID".into(), json!("load-test"));
//!     // Exits the process if the client cannot be built
//!     let client = pubsub.publisher(&config).await;
//!
//!     let action = {
//!         let client = client.clone();
//!         move || {
//!             let client = client.clone();
//!             async move { client.publish_metric("test_topic_1", r#"{"FloatField":0.1}"#).await }
//!         }
//!     };
//!
//!     let results = Scenario::<PublishAggregate, _, _, _>::builder()
//!         .name("publish")
//!         .action(action)
//!         .executor(
//!             StageExecutor::builder()
//!                 .stages(vec![Stage::new(Duration::from_secs(10), 100.0)])
//!                 .build(),
//!         )
//!         .build()
//!         .run()
//!         .await?;
//!
//!     client.close().await;
//!     StdoutReporter.report(PublishReport::from(results)).await
//! }
//! ```
//!
//! # Feature flags
//!
//! - `builtins`: `ConstantExecutor` and `StdoutReporter`. (Enabled by default)
//! - `internals`: the rate governor's building blocks. Unstable.

/// Metric aggregators
pub mod aggregate;
/// Publisher configuration
pub mod config;
pub mod error;
/// Orchestrators that define how things will actually run
pub mod executor;
/// Single metrics
pub mod metric;
/// Script-facing modules
pub mod modules;
pub mod publisher;
/// Reports and Reporters
pub mod report;
/// Main module of the framework that glues everything together
pub mod scenario;
pub mod transport;

pub use aggregate::{Aggregate, PublishAggregate};
pub use config::PublisherConfig;
pub use error::{Error, Result};
pub use executor::{Executor, Stage, StageExecutor};
pub use metric::{Metric, PublishMetric};
pub use modules::PubSub;
pub use publisher::Publisher;
pub use report::{PublishReport, Report, Reporter};
pub use scenario::Scenario;
