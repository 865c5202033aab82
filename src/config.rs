//! Configuration types for podcast-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Network transfer behavior (directories, concurrency, resume policy)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Directory finished files are moved into (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Directory for partial files (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum concurrent transfers; excess transfers queue (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_transfers: usize,

    /// Minimum spacing between progress callbacks of one transfer (default: 250 ms)
    #[serde(default = "default_progress_interval", with = "duration_ms_serde")]
    pub progress_interval: Duration,

    /// Bytes a transfer must have written before a cancel keeps resume data (default: 1)
    #[serde(default = "default_min_resumable_bytes")]
    pub min_resumable_bytes: u64,

    /// Connection timeout for each request (default: 30 s)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            max_concurrent_transfers: default_max_concurrent(),
            progress_interval: default_progress_interval(),
            min_resumable_bytes: default_min_resumable_bytes(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./podcast-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Persist byte progress whenever it advanced by at least this fraction
    ///
    /// `None` (the default) persists progress only when a transfer reaches a
    /// terminal state.
    #[serde(default)]
    pub progress_persist_step: Option<f32>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            progress_persist_step: None,
        }
    }
}

/// Coordinator runtime settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Events buffered per subscriber before it starts lagging (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// How long shutdown waits for canceled transfers to report back (default: 10 s)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Main configuration for the download coordinator
///
/// Transfer and coordinator settings are flattened so the serialized form
/// stays a flat object; persistence settings are nested under `persistence`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network transfer settings
    #[serde(flatten)]
    pub transfer: TransferConfig,

    /// Data storage settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Coordinator runtime settings
    #[serde(flatten)]
    pub coordinator: CoordinatorConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.transfer.download_dir
    }

    /// Temporary directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.transfer.temp_dir
    }

    /// Reject settings the coordinator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.transfer.max_concurrent_transfers == 0 {
            return Err(Error::Config {
                message: "max_concurrent_transfers must be at least 1".into(),
                key: Some("max_concurrent_transfers".into()),
            });
        }
        if self.coordinator.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".into(),
                key: Some("event_buffer".into()),
            });
        }
        if let Some(step) = self.persistence.progress_persist_step
            && !(step > 0.0 && step <= 1.0)
        {
            return Err(Error::Config {
                message: format!("progress_persist_step {step} must be in (0, 1]"),
                key: Some("progress_persist_step".into()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_max_concurrent() -> usize {
    5
}

fn default_progress_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_min_resumable_bytes() -> u64 {
    1
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("podcast-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_database_path() -> PathBuf {
    PathBuf::from("podcast-dl.db")
}

fn default_event_buffer() -> usize {
    1000
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

// Duration serialization helpers
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_ms_serde {
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
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
