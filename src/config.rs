use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub factory: FactoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Default bound for `wait_for_component`.
    #[serde(default = "default_wait_timeout", with = "duration_ms")]
    pub wait_timeout: Duration,

    /// Default bound for the fetch phase of `load_component`.
    #[serde(default = "default_load_timeout", with = "duration_ms")]
    pub load_timeout: Duration,

    /// How long fetched code gets to call `register` on itself.
    #[serde(default = "default_self_register_timeout", with = "duration_ms")]
    pub self_register_timeout: Duration,

    #[serde(default = "default_health_interval", with = "duration_ms")]
    pub health_interval: Duration,

    #[serde(default = "default_true")]
    pub health_enabled: bool,

    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    #[serde(default = "default_report_log_entries")]
    pub report_log_entries: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            wait_timeout: default_wait_timeout(),
            load_timeout: default_load_timeout(),
            self_register_timeout: default_self_register_timeout(),
            health_interval: default_health_interval(),
            health_enabled: default_true(),
            log_capacity: default_log_capacity(),
            report_log_entries: default_report_log_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    #[serde(default = "default_fallback_manifest_path")]
    pub fallback_manifest_path: String,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            fallback_manifest_path: default_fallback_manifest_path(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            registry: RegistryConfig::default(),
            factory: FactoryConfig::default(),
        }
    }
}

impl SystemConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::Config(format!("Failed to open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    serde_json::from_str(s).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

fn default_event_buffer_size() -> usize {
    1000
}
fn default_wait_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_load_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_self_register_timeout() -> Duration {
    Duration::from_secs(3)
}
fn default_health_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_true() -> bool {
    true
}
fn default_log_capacity() -> usize {
    1000
}
fn default_report_log_entries() -> usize {
    50
}
fn default_manifest_path() -> String {
    "./component-registry.json".to_string()
}
fn default_fallback_manifest_path() -> String {
    "../component-registry.json".to_string()
}

// Durations travel as plain milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
