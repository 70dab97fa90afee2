//! Watch command - observer mode.
//!
//! Follows a delivery: backfills the trail from the history endpoint, then
//! prints one line per render event until Ctrl+C or the delivery finishes.

use clap::Args;
use console::style;
use livetrack::config::ConfigFile;
use livetrack::consumer::{Consumer, HttpHistory, RenderEvent};
use livetrack::geo::LatLng;
use livetrack::transport::ChannelState;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::common::{open_channel, parse_point, SessionArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Destination as "lat,lng", for ETAs before the server sends one
    #[arg(long, value_parser = parse_point)]
    pub destination: Option<LatLng>,

    /// Points requested from the history endpoint (10 - 1000)
    #[arg(long)]
    pub history_limit: Option<usize>,

    /// Skip the history backfill
    #[arg(long)]
    pub no_history: bool,

    /// Assumed average speed for straight-line ETAs
    #[arg(long)]
    pub speed_kmph: Option<f64>,
}

pub async fn run(args: WatchArgs, config: &ConfigFile, cancel: CancellationToken) -> Result<(), CliError> {
    let session = args.session.resolve(config)?;

    let mut consumer_config = config.consumer_config();
    if let Some(limit) = args.history_limit {
        consumer_config = consumer_config.with_history_limit(limit);
    }
    if let Some(speed) = args.speed_kmph {
        consumer_config = consumer_config.with_speed_kmph(speed);
    }

    let history = if args.no_history {
        None
    } else {
        let url = session.endpoint(&config.consumer.history_path)?;
        Some(HttpHistory::new(url).map_err(|e| CliError::Http(e.to_string()))?)
    };

    let mut consumer = Consumer::new(session.delivery_id(), consumer_config);
    if let Some(destination) = args.destination {
        consumer = consumer.with_destination(destination);
    }

    let (handle, mut events) = open_channel(&session, config)?;

    println!(
        "Watching delivery {}",
        style(session.delivery_id()).bold()
    );
    println!("Press Ctrl+C to stop");
    println!();

    let (sink, mut rendered) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rendered.recv().await {
            println!("{}", render_line(&event));
        }
    });

    consumer
        .run(&mut events, history.as_ref(), &sink, &cancel)
        .await;
    drop(sink);
    handle.stop();
    let _ = printer.await;

    let delivery = consumer.delivery();
    println!();
    println!(
        "Delivery {}: {} ({} trail points)",
        delivery.id,
        delivery.status,
        delivery.trail.len()
    );
    Ok(())
}

/// One output line for a render event.
pub fn render_line(event: &RenderEvent) -> String {
    match event {
        RenderEvent::Connection(state) => {
            let label = format!("[{}]", state.label());
            let label = match state {
                ChannelState::Open => style(label).green(),
                ChannelState::Connecting | ChannelState::ClosedWillRetry => style(label).yellow(),
                _ => style(label).red(),
            };
            format!("{} channel", label)
        }
        RenderEvent::Position(point) => format!("{} {}", style("position").cyan(), point),
        RenderEvent::Trail(points) => format!("{} {} points", style("trail").dim(), points.len()),
        RenderEvent::Status(status) => format!("{} {}", style("status").bold(), status),
        RenderEvent::Error(text) => style(text).red().to_string(),
        RenderEvent::Eta(eta) => format!("{} {}", style("eta").magenta(), eta),
        RenderEvent::Route(points) => format!("{} {} points", style("route").blue(), points.len()),
        RenderEvent::Destination(point) => format!("{} {}", style("destination").bold(), point),
    }
}
