//! Common arguments and helpers shared across CLI commands.

use clap::Args;
use livetrack::config::ConfigFile;
use livetrack::delivery::DeliveryId;
use livetrack::geo::LatLng;
use livetrack::sampler::parse_sample_line;
use livetrack::session::SessionContext;
use livetrack::transport::{Transport, TransportEvents, TransportHandle, WebSocketConnector};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Where the delivery lives. Unset flags fall back to the config file.
#[derive(Debug, Clone, Args)]
pub struct SessionArgs {
    /// Delivery to track
    #[arg(long, short)]
    pub delivery: Option<u64>,

    /// Site origin, e.g. https://shop.example.com
    #[arg(long)]
    pub origin: Option<String>,

    /// Channel URL, replacing the one derived from the origin
    #[arg(long)]
    pub channel_url: Option<String>,
}

impl SessionArgs {
    /// Delivery id from the flag, then the config file.
    pub fn delivery_id(&self, config: &ConfigFile) -> Result<DeliveryId, CliError> {
        self.delivery
            .or(config.session.delivery_id)
            .map(DeliveryId)
            .ok_or_else(|| {
                CliError::Config(
                    "No delivery id. Pass --delivery or set delivery_id in [session]".to_string(),
                )
            })
    }

    /// Resolve the session context. CLI takes precedence, then config.
    pub fn resolve(&self, config: &ConfigFile) -> Result<SessionContext, CliError> {
        let mut settings = config.session.clone();
        if let Some(origin) = &self.origin {
            settings.origin = origin.clone();
        }
        if let Some(url) = &self.channel_url {
            settings.channel_url = Some(url.clone());
        }
        Ok(settings.context(self.delivery_id(config)?)?)
    }
}

/// Spawn a websocket transport for `session` and start connecting.
pub fn open_channel(
    session: &SessionContext,
    config: &ConfigFile,
) -> Result<(TransportHandle, TransportEvents), CliError> {
    let connector = WebSocketConnector::new(session.channel_url()?)?;
    tracing::info!(url = connector.url(), "Opening channel");
    let (handle, events) = Transport::spawn(connector, config.transport.backoff());
    handle.connect();
    Ok((handle, events))
}

/// Cancellation token fired by Ctrl+C.
pub fn shutdown_token() -> Result<CancellationToken, CliError> {
    let token = CancellationToken::new();
    let trigger = token.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received shutdown signal, stopping...");
        trigger.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;
    Ok(token)
}

/// Clap value parser for `lat,lng`.
pub fn parse_point(s: &str) -> Result<LatLng, String> {
    parse_sample_line(s)
        .map(|sample| sample.point())
        .map_err(|e| e.to_string())
}
