//! Observer-side session.
//!
//! The consumer turns channel traffic into render-ready events:
//!
//! ```text
//! TransportEvents ──► Consumer ──► StreamReconciler (trail, status, position)
//!                        │    └──► EtaEstimator / route ETA
//! HistorySource ─────────┘ (one-shot backfill, timed, fails soft)
//!                        │
//!                        └──► RenderEvent stream ──► rendering sink
//! ```

mod history;
mod reconciler;

pub use history::{
    clamp_limit, fetch_with_timeout, HistoryError, HistorySource, HttpHistory,
    DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_TIMEOUT, MAX_HISTORY_LIMIT, MIN_HISTORY_LIMIT,
};
pub use reconciler::{PositionOutcome, StreamReconciler};

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::delivery::{DeliveryId, DeliveryStatus, TrackedDelivery};
use crate::eta::{Eta, EtaEstimator, DEFAULT_SPEED_KMPH};
use crate::geo::{haversine_km, LatLng};
use crate::protocol::{Envelope, RouteFrame};
use crate::transport::{ChannelState, TransportEvent, TransportEvents};

/// Consumer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    /// Points requested from the history endpoint (clamped to 10..=1000).
    pub history_limit: usize,
    /// Time allowed for the backfill before proceeding without it.
    pub history_timeout: Duration,
    /// Assumed average speed for straight-line ETAs.
    pub speed_kmph: f64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_timeout: DEFAULT_HISTORY_TIMEOUT,
            speed_kmph: DEFAULT_SPEED_KMPH,
        }
    }
}

impl ConsumerConfig {
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_history_timeout(mut self, timeout: Duration) -> Self {
        self.history_timeout = timeout;
        self
    }

    pub fn with_speed_kmph(mut self, speed: f64) -> Self {
        self.speed_kmph = speed;
        self
    }
}

/// Event for the rendering sink.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// Channel status indicator.
    Connection(ChannelState),
    /// Current marker position.
    Position(LatLng),
    /// Full trail polyline after a change.
    Trail(Vec<LatLng>),
    Status(DeliveryStatus),
    /// Error indicator text, e.g. `"Error: forbidden"`.
    Error(String),
    Eta(Eta),
    /// Server-computed route polyline.
    Route(Vec<LatLng>),
    Destination(LatLng),
}

/// Observer-side tracking session.
pub struct Consumer {
    reconciler: StreamReconciler,
    estimator: EtaEstimator,
    config: ConsumerConfig,
}

impl Consumer {
    pub fn new(id: DeliveryId, config: ConsumerConfig) -> Self {
        Self {
            reconciler: StreamReconciler::new(id),
            estimator: EtaEstimator::new(config.speed_kmph),
            config,
        }
    }

    /// Known destination, for ETAs before the server sends one.
    pub fn with_destination(mut self, destination: LatLng) -> Self {
        self.reconciler.set_destination(destination);
        self
    }

    pub fn delivery(&self) -> &TrackedDelivery {
        self.reconciler.delivery()
    }

    pub fn reconciler(&self) -> &StreamReconciler {
        &self.reconciler
    }

    /// Apply the backfill result. Failures are logged and leave the trail as is.
    pub fn apply_history(&mut self, result: Result<Vec<LatLng>, HistoryError>) -> Vec<RenderEvent> {
        let points = match result {
            Ok(points) => points,
            Err(e) => {
                warn!(error = %e, "History backfill unavailable; continuing with live stream only");
                return Vec::new();
            }
        };

        let before = self.reconciler.trail().to_vec();
        self.reconciler.apply_history(points);
        if self.reconciler.trail() == before.as_slice() {
            return Vec::new();
        }

        let mut out = vec![RenderEvent::Trail(self.reconciler.trail().to_vec())];
        if before.is_empty() {
            if let Some(last) = self.reconciler.trail().last() {
                out.push(RenderEvent::Position(*last));
                out.extend(self.eta_from(*last));
            }
        }
        out
    }

    /// Apply one transport event.
    pub fn handle(&mut self, event: TransportEvent) -> Vec<RenderEvent> {
        match event {
            TransportEvent::Status(state) => vec![RenderEvent::Connection(state)],
            TransportEvent::Message(envelope) => self.handle_message(envelope),
        }
    }

    fn handle_message(&mut self, envelope: Envelope) -> Vec<RenderEvent> {
        let mut out = Vec::new();
        match envelope {
            Envelope::PositionUpdate(update) => {
                self.position(update.point(), update.timestamp(), &mut out);
                self.status(update.status.as_deref(), &mut out);
            }
            Envelope::Tick(tick) => {
                self.position(tick.point(), None, &mut out);
                self.status(tick.status.as_deref(), &mut out);
            }
            Envelope::Status(frame) | Envelope::StatusUpdate(frame) => {
                self.status(Some(&frame.status), &mut out);
            }
            Envelope::Error(frame) => {
                out.push(RenderEvent::Error(format!("Error: {}", frame.describe())));
            }
            Envelope::Route(route) => self.route(route, &mut out),
            Envelope::Init(init) => {
                if let Some(destination) = init.destination {
                    let destination = LatLng::from(destination);
                    self.reconciler.set_destination(destination);
                    out.push(RenderEvent::Destination(destination));
                    if let Some(current) = self.current_point() {
                        out.extend(self.eta_from(current));
                    }
                }
                self.status(init.status.as_deref(), &mut out);
            }
            Envelope::Complete(complete) => {
                if let Some(point) = complete.point() {
                    self.position(point, None, &mut out);
                }
                self.status(complete.status.as_deref(), &mut out);
            }
            Envelope::Hello | Envelope::ProbeAck => {}
            Envelope::Unknown(kind) => debug!(kind = %kind, "Ignoring unrecognized frame"),
        }
        out
    }

    fn position(
        &mut self,
        point: LatLng,
        at: Option<chrono::DateTime<chrono::Utc>>,
        out: &mut Vec<RenderEvent>,
    ) {
        match self.reconciler.apply_position(point, at) {
            PositionOutcome::Invalid => return,
            PositionOutcome::Appended => {
                out.push(RenderEvent::Position(point));
                out.push(RenderEvent::Trail(self.reconciler.trail().to_vec()));
            }
            PositionOutcome::Duplicate => out.push(RenderEvent::Position(point)),
        }
        out.extend(self.eta_from(point));
    }

    fn status(&mut self, status: Option<&str>, out: &mut Vec<RenderEvent>) {
        if let Some(status) = status {
            if self.reconciler.apply_status(status) {
                out.push(RenderEvent::Status(self.reconciler.delivery().status.clone()));
            }
        }
    }

    fn route(&mut self, route: RouteFrame, out: &mut Vec<RenderEvent>) {
        let distance_km = route.distance_km.or_else(|| path_length_km(&route.coords));
        if !route.coords.is_empty() {
            out.push(RenderEvent::Route(route.coords));
        }
        if let Some(distance_km) = distance_km {
            out.push(RenderEvent::Eta(
                self.estimator.from_route(distance_km, route.duration_min),
            ));
        }
    }

    fn current_point(&self) -> Option<LatLng> {
        self.reconciler
            .delivery()
            .current_position
            .map(|sample| sample.point())
    }

    fn eta_from(&self, point: LatLng) -> Option<RenderEvent> {
        let destination = self.reconciler.delivery().destination?;
        Some(RenderEvent::Eta(self.estimator.estimate(point, destination)))
    }

    /// Drive the session until `cancel` fires, the transport exits, the sink
    /// closes, or the delivery reaches a terminal status.
    ///
    /// The backfill is fetched concurrently with the live stream.
    pub async fn run<H: HistorySource>(
        &mut self,
        events: &mut TransportEvents,
        history: Option<&H>,
        sink: &mpsc::UnboundedSender<RenderEvent>,
        cancel: &CancellationToken,
    ) {
        let limit = self.config.history_limit;
        let timeout = self.config.history_timeout;
        let backfill = async move {
            match history {
                Some(source) => Some(fetch_with_timeout(source, limit, timeout).await),
                None => None,
            }
        };
        tokio::pin!(backfill);
        let mut backfill_pending = true;

        info!(delivery_id = %self.delivery().id, "Watching delivery");

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                result = &mut backfill, if backfill_pending => {
                    backfill_pending = false;
                    match result {
                        Some(result) => self.apply_history(result),
                        None => Vec::new(),
                    }
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            };

            for event in batch {
                if sink.send(event).is_err() {
                    debug!("Render sink closed");
                    return;
                }
            }

            if self.delivery().status.is_terminal() {
                info!(delivery_id = %self.delivery().id, status = %self.delivery().status, "Delivery finished");
                break;
            }
        }
    }
}

/// Length of a polyline in kilometres, or `None` for fewer than two points.
fn path_length_km(coords: &[LatLng]) -> Option<f64> {
    if coords.len() < 2 {
        return None;
    }
    Some(coords.windows(2).map(|w| haversine_km(w[0], w[1])).sum())
}
