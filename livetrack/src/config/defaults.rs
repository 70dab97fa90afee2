//! Default values for every configuration key.

use std::path::PathBuf;

use super::settings::*;
use crate::consumer::{DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_TIMEOUT};
use crate::eta::DEFAULT_SPEED_KMPH;
use crate::gate::{DEFAULT_MIN_DISTANCE_M, DEFAULT_MIN_INTERVAL};
use crate::producer::DEFAULT_SIMULATE_TICK;
use crate::transport::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX};

/// Config directory name under the home directory.
pub const CONFIG_DIR_NAME: &str = ".livetrack";

/// Config file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.ini";

pub const DEFAULT_ORIGIN: &str = "http://localhost:8000";

/// Durable-store endpoint, relative to the origin. The tracking API is
/// mounted under `/orders/` on the server.
pub const DEFAULT_PERSIST_PATH: &str = "/orders/apis/driver/location/";

/// History endpoint, relative to the origin. `{id}` is the delivery id.
pub const DEFAULT_HISTORY_PATH: &str = "/orders/apis/delivery/{id}/pings/";

pub const DEFAULT_PRODUCER_STATUS: &str = "in_transit";

pub const DEFAULT_LOG_FILE: &str = "livetrack.log";

/// Default log directory (`~/.livetrack/logs`).
pub fn default_log_dir() -> PathBuf {
    super::file::config_directory().join("logs")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            session: SessionSettings {
                origin: DEFAULT_ORIGIN.to_string(),
                delivery_id: None,
                channel_url: None,
            },
            gate: GateSettings {
                min_interval_secs: DEFAULT_MIN_INTERVAL.as_secs(),
                min_distance_m: DEFAULT_MIN_DISTANCE_M,
            },
            transport: TransportSettings {
                backoff_base_ms: DEFAULT_BACKOFF_BASE.as_millis() as u64,
                backoff_max_ms: DEFAULT_BACKOFF_MAX.as_millis() as u64,
            },
            producer: ProducerSettings {
                persist: false,
                persist_path: DEFAULT_PERSIST_PATH.to_string(),
                status: DEFAULT_PRODUCER_STATUS.to_string(),
                simulate_tick_ms: DEFAULT_SIMULATE_TICK.as_millis() as u64,
            },
            consumer: ConsumerSettings {
                history_path: DEFAULT_HISTORY_PATH.to_string(),
                history_limit: DEFAULT_HISTORY_LIMIT,
                history_timeout_secs: DEFAULT_HISTORY_TIMEOUT.as_secs(),
                speed_kmph: DEFAULT_SPEED_KMPH,
            },
            logging: LoggingSettings {
                directory: default_log_dir(),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
