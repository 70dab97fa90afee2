//! Drive command - courier mode fed from stdin.
//!
//! Each stdin line is a raw position sample (`lat,lng[,accuracy_m]`). Samples
//! pass through the gate; admitted ones are published and, with `--persist`,
//! appended to the durable store.

use std::time::Duration;

use clap::Args;
use console::style;
use livetrack::config::ConfigFile;
use livetrack::delivery::DeliveryStatus;
use livetrack::producer::{HttpDurableStore, Producer, ProducerConfig};
use livetrack::sampler::LineSource;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use super::common::{open_channel, SessionArgs};
use crate::error::CliError;

/// Time allowed for late echoes after input ends.
const SETTLE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Args)]
pub struct DriveArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Also append admitted positions to the durable store
    #[arg(long)]
    pub persist: bool,

    /// Status carried on every update (default from config: in_transit)
    #[arg(long)]
    pub status: Option<String>,

    /// Minimum seconds between sent positions
    #[arg(long)]
    pub min_interval_secs: Option<u64>,

    /// Minimum movement in metres between sent positions
    #[arg(long)]
    pub min_distance_m: Option<f64>,
}

impl DriveArgs {
    fn producer_config(&self, config: &ConfigFile) -> ProducerConfig {
        let mut config = config.clone();
        if let Some(secs) = self.min_interval_secs {
            config.gate.min_interval_secs = secs;
        }
        if let Some(metres) = self.min_distance_m {
            config.gate.min_distance_m = metres;
        }
        let producer = config.producer_config();
        match &self.status {
            Some(status) => producer.with_status(DeliveryStatus::parse(status)),
            None => producer,
        }
    }
}

pub async fn run(args: DriveArgs, config: &ConfigFile, cancel: CancellationToken) -> Result<(), CliError> {
    let session = args.session.resolve(config)?;
    let (handle, mut events) = open_channel(&session, config)?;

    let store = if args.persist || config.producer.persist {
        let url = session.endpoint(&config.producer.persist_path)?;
        println!("Persisting to {}", url);
        Some(HttpDurableStore::new(url).map_err(|e| CliError::Http(e.to_string()))?)
    } else {
        None
    };

    let mut producer = Producer::new(
        session.delivery_id(),
        args.producer_config(config),
        handle,
        store,
    );

    println!(
        "Driving delivery {} - reading \"lat,lng[,accuracy_m]\" lines from stdin",
        style(session.delivery_id()).bold()
    );
    println!("Press Ctrl+C to stop");
    println!();

    let mut source = LineSource::new(BufReader::new(tokio::io::stdin()));
    let mut samples = producer.start_watch(&mut source);
    producer.run(&mut samples, &mut events, &cancel).await;
    if !cancel.is_cancelled() {
        producer.settle(&mut events, SETTLE_GRACE).await;
    }
    producer.shutdown();

    let stats = producer.stats();
    println!();
    println!("Session Summary");
    println!("───────────────");
    println!("  Sent:         {}", stats.sent);
    println!("  Acknowledged: {}", stats.acked);
    println!("  Filtered:     {}", stats.rejected);
    if let Some(error) = producer.last_error() {
        println!("  Last error:   {}", style(error).red());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> DriveArgs {
        DriveArgs {
            session: SessionArgs {
                delivery: Some(1),
                origin: None,
                channel_url: None,
            },
            persist: false,
            status: None,
            min_interval_secs: None,
            min_distance_m: None,
        }
    }

    #[test]
    fn test_flags_override_gate_and_status() {
        let mut args = args();
        args.min_interval_secs = Some(2);
        args.min_distance_m = Some(5.0);
        args.status = Some("en_route".to_string());

        let config = args.producer_config(&ConfigFile::default());
        assert_eq!(config.gate.min_interval, Duration::from_secs(2));
        assert_eq!(config.gate.min_distance_m, 5.0);
        assert_eq!(config.status, DeliveryStatus::Unknown("en_route".to_string()));
    }

    #[test]
    fn test_defaults_come_from_config() {
        let config = args().producer_config(&ConfigFile::default());
        assert_eq!(config.gate.min_interval, Duration::from_secs(8));
        assert_eq!(config.status, DeliveryStatus::InTransit);
    }
}
