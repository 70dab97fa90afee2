//! Settings structs, one per `[section]` of the INI file.
//!
//! Each section converts into the runtime config type it feeds.

use std::path::PathBuf;
use std::time::Duration;

use crate::consumer::ConsumerConfig;
use crate::delivery::{DeliveryId, DeliveryStatus};
use crate::gate::GateConfig;
use crate::producer::ProducerConfig;
use crate::session::{SessionContext, SessionError};
use crate::transport::BackoffPolicy;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub session: SessionSettings,
    pub gate: GateSettings,
    pub transport: TransportSettings,
    pub producer: ProducerSettings,
    pub consumer: ConsumerSettings,
    pub logging: LoggingSettings,
}

/// `[session]`
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Page origin the channel and HTTP endpoints hang off.
    pub origin: String,
    pub delivery_id: Option<u64>,
    /// Full channel URL, replacing the one derived from the origin.
    pub channel_url: Option<String>,
}

/// `[gate]`
#[derive(Debug, Clone, PartialEq)]
pub struct GateSettings {
    pub min_interval_secs: u64,
    pub min_distance_m: f64,
}

/// `[transport]`
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSettings {
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

/// `[producer]`
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerSettings {
    /// Also append every admitted position to the durable store.
    pub persist: bool,
    pub persist_path: String,
    pub status: String,
    pub simulate_tick_ms: u64,
}

/// `[consumer]`
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerSettings {
    pub history_path: String,
    pub history_limit: usize,
    pub history_timeout_secs: u64,
    pub speed_kmph: f64,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl SessionSettings {
    /// Session context for `delivery_id`, with the channel override applied.
    pub fn context(&self, delivery_id: DeliveryId) -> Result<SessionContext, SessionError> {
        let context = SessionContext::new(&self.origin, delivery_id)?;
        Ok(match &self.channel_url {
            Some(url) => context.with_channel_url(url.clone()),
            None => context,
        })
    }
}

impl GateSettings {
    pub fn gate_config(&self) -> GateConfig {
        GateConfig::default()
            .with_min_interval(Duration::from_secs(self.min_interval_secs))
            .with_min_distance_m(self.min_distance_m)
    }
}

impl TransportSettings {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }
}

impl ConfigFile {
    /// Producer config from `[gate]` and `[producer]`.
    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig::default()
            .with_gate(self.gate.gate_config())
            .with_status(DeliveryStatus::parse(&self.producer.status))
            .with_simulate_tick(Duration::from_millis(self.producer.simulate_tick_ms))
    }

    /// Consumer config from `[consumer]`.
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig::default()
            .with_history_limit(self.consumer.history_limit)
            .with_history_timeout(Duration::from_secs(self.consumer.history_timeout_secs))
            .with_speed_kmph(self.consumer.speed_kmph)
    }
}
