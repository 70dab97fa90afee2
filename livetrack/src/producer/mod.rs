//! Driver-side session.
//!
//! The producer binds a position source to the channel:
//!
//! ```text
//! PositionSource ──samples──► SampleGate ──admitted──► TransportHandle::send
//!                                              └─────► DurableStore::append (spawned)
//! ```
//!
//! It also consumes the channel's inbound events. The server fans accepted
//! `position_update` frames out to the whole delivery group, the driver
//! included, so an echo of our own last point is recorded as an
//! acknowledgement.

mod store;

pub use store::{DurableStore, HttpDurableStore, NullStore, PersistError, PersistRecord};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::delivery::{DeliveryId, DeliveryStatus, TrackedDelivery};
use crate::gate::{GateConfig, SampleGate};
use crate::geo::{LatLng, PositionSample};
use crate::protocol::Envelope;
use crate::sampler::{PositionSource, WatchHandle};
use crate::transport::{TransportEvent, TransportEvents, TransportHandle};

/// Default interval between simulated waypoint hops.
pub const DEFAULT_SIMULATE_TICK: Duration = Duration::from_millis(900);

/// Status attached to simulated positions.
pub const SIMULATION_STATUS: &str = "demo";

/// Capacity of the sample channel between a position source and the producer.
const SAMPLE_CHANNEL_CAPACITY: usize = 64;

/// Producer configuration.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub gate: GateConfig,
    /// Status carried on every position update.
    pub status: DeliveryStatus,
    pub simulate_tick: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            status: DeliveryStatus::InTransit,
            simulate_tick: DEFAULT_SIMULATE_TICK,
        }
    }
}

impl ProducerConfig {
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_status(mut self, status: DeliveryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_simulate_tick(mut self, tick: Duration) -> Self {
        self.simulate_tick = tick;
        self
    }
}

/// Counters for display.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProducerStats {
    /// Positions handed to the transport.
    pub sent: u64,
    /// Samples the gate turned away.
    pub rejected: u64,
    /// Echoes of our own positions received back.
    pub acked: u64,
    /// Movement between the last two admitted positions, in metres.
    pub last_move_m: Option<f64>,
}

/// Driver-side tracking session.
pub struct Producer<S: DurableStore = NullStore> {
    delivery: TrackedDelivery,
    gate: SampleGate,
    config: ProducerConfig,
    transport: TransportHandle,
    store: Option<Arc<S>>,
    watch: Option<WatchHandle>,
    stats: ProducerStats,
    last_error: Option<String>,
}

impl Producer<NullStore> {
    /// A producer without durable-store persistence.
    pub fn without_store(id: DeliveryId, config: ProducerConfig, transport: TransportHandle) -> Self {
        Self::new(id, config, transport, None)
    }
}

impl<S: DurableStore> Producer<S> {
    pub fn new(
        id: DeliveryId,
        config: ProducerConfig,
        transport: TransportHandle,
        store: Option<S>,
    ) -> Self {
        let delivery = TrackedDelivery::new(id).with_status(config.status.clone());
        Self {
            delivery,
            gate: SampleGate::new(config.gate.clone()),
            config,
            transport,
            store: store.map(Arc::new),
            watch: None,
            stats: ProducerStats::default(),
            last_error: None,
        }
    }

    pub fn delivery(&self) -> &TrackedDelivery {
        &self.delivery
    }

    pub fn stats(&self) -> ProducerStats {
        self.stats
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Last application error reported by the server, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Offer a raw sample; transmit it if the gate admits it.
    pub fn offer(&mut self, sample: PositionSample) -> bool {
        self.offer_at(sample, Instant::now())
    }

    /// [`Producer::offer`] with an explicit clock reading.
    pub fn offer_at(&mut self, sample: PositionSample, now: Instant) -> bool {
        let moved = self.gate.distance_from_last_m(&sample);
        if !self.gate.offer(&sample, now) {
            self.stats.rejected += 1;
            return false;
        }

        self.stats.last_move_m = moved;
        self.delivery.current_position = Some(sample);
        let status = self.config.status.as_str().to_string();
        self.transmit(sample.point(), &status, sample.captured_at, now);
        true
    }

    /// Start watching `source`, replacing any current watch.
    ///
    /// The returned receiver feeds [`Producer::run`].
    pub fn start_watch(&mut self, source: &mut dyn PositionSource) -> mpsc::Receiver<PositionSample> {
        if let Some(previous) = self.watch.take() {
            debug!(delivery_id = %self.delivery.id, "Replacing existing position watch");
            previous.clear();
        }
        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        self.watch = Some(source.watch(tx));
        rx
    }

    pub fn stop_watch(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.clear();
        }
    }

    pub fn has_active_watch(&self) -> bool {
        self.watch.as_ref().is_some_and(WatchHandle::is_active)
    }

    /// Apply one inbound transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Status(state) => {
                info!(delivery_id = %self.delivery.id, state = %state, "Channel state");
            }
            TransportEvent::Message(Envelope::PositionUpdate(update)) => {
                if self.delivery.trail.last() == Some(&update.point()) {
                    self.delivery.last_acked_at = Some(Instant::now());
                    self.stats.acked += 1;
                } else {
                    debug!(point = %update.point(), "Position update from another publisher");
                }
            }
            TransportEvent::Message(Envelope::Error(frame)) => {
                let reason = frame.describe();
                warn!(delivery_id = %self.delivery.id, error = %reason, "Server reported an error");
                self.last_error = Some(reason);
            }
            TransportEvent::Message(Envelope::Status(frame) | Envelope::StatusUpdate(frame)) => {
                self.delivery.status = DeliveryStatus::parse(&frame.status);
            }
            TransportEvent::Message(other) => {
                debug!(kind = other.kind(), "Ignoring frame");
            }
        }
    }

    /// Feed samples through the gate until `samples` ends, the transport
    /// exits, or `cancel` fires.
    pub async fn run(
        &mut self,
        samples: &mut mpsc::Receiver<PositionSample>,
        events: &mut TransportEvents,
        cancel: &CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                sample = samples.recv() => match sample {
                    Some(sample) => {
                        self.offer(sample);
                    }
                    None => {
                        debug!(delivery_id = %self.delivery.id, "Position source ended");
                        break;
                    }
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }
    }

    /// Walk `route` one waypoint per tick with status `demo`, bypassing the
    /// gate. Returns the number of waypoints sent.
    ///
    /// The first waypoint goes out immediately rather than after one tick,
    /// so the watcher sees the start of the walk without a delay.
    pub async fn simulate(
        &mut self,
        route: &[LatLng],
        events: &mut TransportEvents,
        cancel: &CancellationToken,
    ) -> usize {
        let mut interval = tokio::time::interval(self.config.simulate_tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut waypoints = route.iter();
        let mut sent = 0;

        self.delivery.status = DeliveryStatus::Demo;
        info!(delivery_id = %self.delivery.id, waypoints = route.len(), "Simulating route");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => match waypoints.next() {
                    Some(point) => {
                        self.hop(*point);
                        sent += 1;
                    }
                    None => break,
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }
        sent
    }

    /// Process inbound events for up to `grace`, so late acknowledgements are counted.
    pub async fn settle(&mut self, events: &mut TransportEvents, grace: Duration) {
        let deadline = tokio::time::sleep(grace);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }
    }

    /// Stop the position watch and close the channel.
    pub fn shutdown(&mut self) {
        self.stop_watch();
        self.transport.stop();
        info!(
            delivery_id = %self.delivery.id,
            sent = self.stats.sent,
            rejected = self.stats.rejected,
            acked = self.stats.acked,
            "Producer stopped"
        );
    }

    fn hop(&mut self, point: LatLng) {
        let now = Instant::now();
        let moved = self.gate.last_admitted().map(|last| last.point.distance_m(&point));
        self.gate.record(point, now);
        self.stats.last_move_m = moved;
        let captured_at = Utc::now();
        if let Ok(sample) = PositionSample::new(point.lat, point.lng, None, captured_at) {
            self.delivery.current_position = Some(sample);
        }
        self.transmit(point, SIMULATION_STATUS, captured_at, now);
    }

    fn transmit(&mut self, point: LatLng, status: &str, at: DateTime<Utc>, now: Instant) {
        self.transport
            .send(Envelope::position(point, Some(status.to_string()), Some(at)));
        self.delivery.trail.push(point);
        self.delivery.last_sent_at = Some(now);
        self.stats.sent += 1;
        self.persist(point, status);
    }

    fn persist(&self, point: LatLng, status: &str) {
        let Some(store) = &self.store else {
            return;
        };
        let store = Arc::clone(store);
        let record = PersistRecord {
            delivery_id: self.delivery.id.0,
            lat: point.lat,
            lng: point.lng,
            status: status.to_string(),
        };
        tokio::spawn(async move {
            if let Err(e) = store.append(&record).await {
                warn!(delivery_id = record.delivery_id, error = %e, "Durable store append failed");
            }
        });
    }
}

impl<S: DurableStore> Drop for Producer<S> {
    fn drop(&mut self) {
        self.stop_watch();
    }
}
