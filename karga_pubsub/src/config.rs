use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Environment variable pointing at a local Pub/Sub emulator.
pub const EMULATOR_HOST_ENV: &str = "PUBSUB_EMULATOR_HOST";

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Untyped configuration as handed over by a script.
pub type ConfigMap = Map<String, Value>;

/// Publisher settings decoded from a script supplied mapping.
///
/// Only `projectID` is required. Keys match case-insensitively (`PROJECTID`,
/// `project_id` and `projectId` all name the project). Unknown keys are
/// ignored so scripts can share one options object between several extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(rename = "projectID")]
    pub project_id: String,

    /// Upper bound on waiting for the server acknowledgement.
    #[serde(
        rename = "publishTimeout",
        default = "default_publish_timeout",
        deserialize_with = "deserialize_timeout",
        serialize_with = "humantime_serde::serialize"
    )]
    pub publish_timeout: Duration,

    /// Log every payload that goes out, at debug level.
    #[serde(default)]
    pub debug: bool,

    /// Log client and topic handle lifecycle, at trace level.
    #[serde(default)]
    pub trace: bool,

    #[serde(
        rename = "emulatorHost",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub emulator_host: Option<String>,
}

const FIELDS: [&str; 5] = ["projectID", "publishTimeout", "debug", "trace", "emulatorHost"];

impl PublisherConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            debug: false,
            trace: false,
            emulator_host: None,
        }
    }

    /// Decode a config from an untyped mapping.
    pub fn from_map(config: &ConfigMap) -> Result<Self> {
        Self::from_value(Value::Object(config.clone()))
    }

    /// Decode a config from anything that serializes to a mapping.
    pub fn decode<T: Serialize + ?Sized>(config: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(config)?)
    }

    fn from_value(value: Value) -> Result<Self> {
        let value = match value {
            Value::Object(map) => Value::Object(fold_keys(map)),
            other => other,
        };
        let config: Self = serde_json::from_value(value)?;
        if config.project_id.trim().is_empty() {
            return Err(Error::Config("`projectID` must not be empty".into()));
        }
        Ok(config)
    }

    /// Emulator endpoint, preferring the config over the environment.
    pub fn emulator_host(&self) -> Option<String> {
        resolve_emulator_host(
            self.emulator_host.as_deref(),
            std::env::var(EMULATOR_HOST_ENV).ok(),
        )
    }
}

/// Blank values count as unset, so a blank config entry still falls back to
/// the environment.
fn resolve_emulator_host(configured: Option<&str>, env: Option<String>) -> Option<String> {
    let set = |host: &str| !host.trim().is_empty();
    configured
        .filter(|host| set(host))
        .map(str::to_owned)
        .or_else(|| env.filter(|host| set(host)))
}

/// Rename keys that match a field case-insensitively (ignoring underscores)
/// to the field's canonical name. An exact spelling wins over a folded one.
fn fold_keys(map: ConfigMap) -> ConfigMap {
    let mut folded = ConfigMap::new();
    for (key, value) in map {
        let normalized = key.replace('_', "").to_ascii_lowercase();
        match FIELDS.iter().find(|f| f.to_ascii_lowercase() == normalized) {
            Some(field) if *field == key => {
                folded.insert(key, value);
            }
            Some(field) => {
                folded.entry(*field).or_insert(value);
            }
            None => {
                folded.insert(key, value);
            }
        }
    }
    folded
}

fn default_publish_timeout() -> Duration {
    DEFAULT_PUBLISH_TIMEOUT
}

/// Accepts `"5s"`-style strings or a plain number of milliseconds.
fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimeout {
        Millis(u64),
        Human(#[serde(with = "humantime_serde")] Duration),
    }

    Ok(match RawTimeout::deserialize(deserializer)? {
        RawTimeout::Millis(ms) => Duration::from_millis(ms),
        RawTimeout::Human(duration) => duration,
    })
}

/// Serializes tests that touch `PUBSUB_EMULATOR_HOST`.
#[cfg(test)]
pub(crate) static EMULATOR_ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Set or clear `PUBSUB_EMULATOR_HOST`. Callers hold [`EMULATOR_ENV_LOCK`].
#[cfg(test)]
pub(crate) fn set_emulator_env(host: Option<&str>) {
    // SAFETY: every test touching this variable holds EMULATOR_ENV_LOCK
    unsafe {
        match host {
            Some(host) => std::env::set_var(EMULATOR_HOST_ENV, host),
            None => std::env::remove_var(EMULATOR_HOST_ENV),
        }
    }
}
