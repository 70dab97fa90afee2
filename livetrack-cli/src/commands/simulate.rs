//! Simulate command - a demo courier walking a list of waypoints.
//!
//! With `--loopback` the walk runs against an in-memory relay with a watcher
//! attached, so the whole publish/follow path can be seen without a server.

use std::time::Duration;

use clap::Args;
use console::style;
use livetrack::config::ConfigFile;
use livetrack::consumer::{Consumer, HttpHistory};
use livetrack::delivery::DeliveryId;
use livetrack::geo::LatLng;
use livetrack::producer::{Producer, ProducerConfig};
use livetrack::transport::{ChannelState, MemoryHub, Transport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::common::{open_channel, parse_point, SessionArgs};
use super::watch::render_line;
use crate::error::CliError;

/// Delivery id used by the loopback demo when none is configured.
const LOOPBACK_DELIVERY: DeliveryId = DeliveryId(1);

/// Time allowed for late echoes after the last waypoint.
const SETTLE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Args)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Waypoint as "lat,lng"; repeat in travel order
    #[arg(long = "waypoint", short = 'w', value_parser = parse_point, required = true)]
    pub waypoints: Vec<LatLng>,

    /// Milliseconds between waypoints
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Run against an in-memory relay instead of a server
    #[arg(long)]
    pub loopback: bool,
}

impl SimulateArgs {
    fn producer_config(&self, config: &ConfigFile) -> ProducerConfig {
        let producer = config.producer_config();
        match self.tick_ms {
            Some(ms) => producer.with_simulate_tick(Duration::from_millis(ms.max(1))),
            None => producer,
        }
    }
}

pub async fn run(args: SimulateArgs, config: &ConfigFile, cancel: CancellationToken) -> Result<(), CliError> {
    if args.loopback {
        return run_loopback(args, config, cancel).await;
    }

    let session = args.session.resolve(config)?;
    let (handle, mut events) = open_channel(&session, config)?;
    let mut producer = Producer::without_store(
        session.delivery_id(),
        args.producer_config(config),
        handle,
    );

    println!(
        "Simulating delivery {} over {} waypoints",
        style(session.delivery_id()).bold(),
        args.waypoints.len()
    );
    let sent = producer.simulate(&args.waypoints, &mut events, &cancel).await;
    if !cancel.is_cancelled() {
        producer.settle(&mut events, SETTLE_GRACE).await;
    }
    producer.shutdown();

    println!();
    println!("Sent {} of {} waypoints ({} acknowledged)", sent, args.waypoints.len(), producer.stats().acked);
    Ok(())
}

async fn run_loopback(args: SimulateArgs, config: &ConfigFile, cancel: CancellationToken) -> Result<(), CliError> {
    let delivery = args.session.delivery_id(config).unwrap_or(LOOPBACK_DELIVERY);
    let backoff = config.transport.backoff();
    let hub = MemoryHub::new();

    let (watch_handle, mut watch_events) = Transport::spawn(hub.connector(), backoff);
    watch_handle.connect();
    watch_handle.wait_for(|s| s.state == ChannelState::Open).await;

    let mut consumer = Consumer::new(delivery, config.consumer_config());
    if let Some(last) = args.waypoints.last() {
        consumer = consumer.with_destination(*last);
    }
    let (sink, mut rendered) = mpsc::unbounded_channel();
    let watch_cancel = cancel.child_token();
    let watcher = {
        let watch_cancel = watch_cancel.clone();
        tokio::spawn(async move {
            consumer
                .run::<HttpHistory>(&mut watch_events, None, &sink, &watch_cancel)
                .await;
        })
    };
    let printer = tokio::spawn(async move {
        while let Some(event) = rendered.recv().await {
            println!("{}", render_line(&event));
        }
    });

    let (handle, mut events) = Transport::spawn(hub.connector(), backoff);
    handle.connect();
    let mut producer = Producer::without_store(delivery, args.producer_config(config), handle);

    println!(
        "Loopback demo: delivery {} over {} waypoints",
        style(delivery).bold(),
        args.waypoints.len()
    );
    println!();

    producer.simulate(&args.waypoints, &mut events, &cancel).await;
    producer.settle(&mut events, SETTLE_GRACE).await;
    producer.shutdown();

    watch_cancel.cancel();
    watch_handle.stop();
    let _ = watcher.await;
    let _ = printer.await;

    println!();
    println!(
        "Sent {}, acknowledged {}",
        producer.stats().sent,
        producer.stats().acked
    );
    Ok(())
}
