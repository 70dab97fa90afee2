//! End-to-end tracking flow over an in-memory relay.
//!
//! A producer and a consumer each run their own transport, joined through a
//! [`MemoryHub`] that fans every frame out to all members (the sender
//! included), the way the tracking server's delivery group does.
//!
//! Run with: `cargo test --test tracking_flow`

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use livetrack::consumer::{Consumer, ConsumerConfig, HistoryError, HistorySource, RenderEvent};
use livetrack::delivery::{DeliveryId, DeliveryStatus};
use livetrack::geo::{LatLng, PositionSample};
use livetrack::producer::{Producer, ProducerConfig};
use livetrack::protocol::Envelope;
use livetrack::transport::{
    BackoffPolicy, ChannelState, MemoryHub, Transport, TransportEvents, TransportHandle,
};

// ============================================================================
// Helper Functions
// ============================================================================

const DELIVERY: DeliveryId = DeliveryId(42);

/// Restaurant to customer, a few hundred metres apart.
const PICKUP: LatLng = LatLng::new(-1.2921, 36.8219);
const MIDWAY: LatLng = LatLng::new(-1.2900, 36.8240);
const DROPOFF: LatLng = LatLng::new(-1.2864, 36.8172);

struct FixedHistory(Vec<LatLng>);

impl HistorySource for FixedHistory {
    async fn fetch(&self, _limit: usize) -> Result<Vec<LatLng>, HistoryError> {
        Ok(self.0.clone())
    }
}

async fn join(hub: &MemoryHub) -> (TransportHandle, TransportEvents) {
    let (handle, events) = Transport::spawn(hub.connector(), BackoffPolicy::default());
    handle.connect();
    handle.wait_for(|s| s.state == ChannelState::Open).await;
    (handle, events)
}

fn sample(point: LatLng) -> PositionSample {
    PositionSample::now(point.lat, point.lng, None).unwrap()
}

/// Run a consumer in the background, returning it once `run` ends.
fn spawn_watcher(
    mut consumer: Consumer,
    mut events: TransportEvents,
    history: Option<FixedHistory>,
    cancel: CancellationToken,
) -> (JoinHandle<Consumer>, mpsc::UnboundedReceiver<RenderEvent>) {
    let (sink, rendered) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        consumer
            .run(&mut events, history.as_ref(), &sink, &cancel)
            .await;
        consumer
    });
    (task, rendered)
}

/// Wait for a rendered trail of `len` points.
async fn trail_of_len(rendered: &mut mpsc::UnboundedReceiver<RenderEvent>, len: usize) -> Vec<LatLng> {
    loop {
        match rendered.recv().await {
            Some(RenderEvent::Trail(points)) if points.len() == len => return points,
            Some(_) => continue,
            None => panic!("consumer stopped before trail reached {len} points"),
        }
    }
}

// ============================================================================
// Live Flow
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_courier_positions_reach_watcher_and_are_acknowledged() {
    let hub = MemoryHub::new();
    let (courier, mut courier_events) = join(&hub).await;
    let (_watch, watch_events) = join(&hub).await;

    let cancel = CancellationToken::new();
    let consumer = Consumer::new(DELIVERY, ConsumerConfig::default()).with_destination(DROPOFF);
    let (watcher, mut rendered) = spawn_watcher(consumer, watch_events, None, cancel.clone());

    let mut producer = Producer::without_store(DELIVERY, ProducerConfig::default(), courier);
    let t0 = Instant::now();

    assert!(producer.offer_at(sample(PICKUP), t0));
    producer.settle(&mut courier_events, Duration::from_millis(200)).await;
    assert!(producer.offer_at(sample(MIDWAY), t0 + Duration::from_secs(10)));
    producer.settle(&mut courier_events, Duration::from_millis(200)).await;

    assert_eq!(producer.stats().sent, 2);
    assert_eq!(producer.stats().acked, 2);
    assert!(producer.delivery().last_acked_at.is_some());

    let trail = trail_of_len(&mut rendered, 2).await;
    assert_eq!(trail, vec![PICKUP, MIDWAY]);

    cancel.cancel();
    let consumer = watcher.await.unwrap();
    assert_eq!(consumer.delivery().status, DeliveryStatus::InTransit);
    assert_eq!(
        consumer.delivery().current_position.map(|p| p.point()),
        Some(MIDWAY)
    );
}

#[tokio::test(start_paused = true)]
async fn test_watcher_receives_eta_for_each_move() {
    let hub = MemoryHub::new();
    let (courier, _courier_events) = join(&hub).await;
    let (_watch, watch_events) = join(&hub).await;

    let cancel = CancellationToken::new();
    let consumer = Consumer::new(DELIVERY, ConsumerConfig::default()).with_destination(DROPOFF);
    let (_watcher, mut rendered) = spawn_watcher(consumer, watch_events, None, cancel.clone());

    let mut producer = Producer::without_store(DELIVERY, ProducerConfig::default(), courier);
    producer.offer(sample(PICKUP));

    let eta = loop {
        match rendered.recv().await {
            Some(RenderEvent::Eta(eta)) => break eta,
            Some(_) => continue,
            None => panic!("consumer stopped"),
        }
    };
    let expected = PICKUP.distance_km(&DROPOFF);
    assert!((eta.distance_km - expected).abs() < 1e-9);
    assert!(eta.eta_minutes >= 1);
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_gate_rejects_jitter_before_it_reaches_the_wire() {
    let hub = MemoryHub::new();
    let (courier, mut courier_events) = join(&hub).await;

    let mut producer = Producer::without_store(DELIVERY, ProducerConfig::default(), courier);
    let t0 = Instant::now();

    assert!(producer.offer_at(sample(PICKUP), t0));
    // Far enough, too soon
    assert!(!producer.offer_at(sample(MIDWAY), t0 + Duration::from_secs(3)));
    // Late enough, too close
    assert!(!producer.offer_at(
        sample(LatLng::new(PICKUP.lat + 0.0001, PICKUP.lng)),
        t0 + Duration::from_secs(20)
    ));
    producer.settle(&mut courier_events, Duration::from_millis(200)).await;

    assert_eq!(producer.stats().sent, 1);
    assert_eq!(producer.stats().rejected, 2);
    assert_eq!(producer.stats().acked, 1);
}

// ============================================================================
// History Backfill
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_history_backfill_precedes_live_points() {
    let hub = MemoryHub::new();
    let (courier, _courier_events) = join(&hub).await;
    let (_watch, watch_events) = join(&hub).await;

    let earlier = vec![LatLng::new(-1.2950, 36.8200), PICKUP];
    let cancel = CancellationToken::new();
    let consumer = Consumer::new(DELIVERY, ConsumerConfig::default());
    let (watcher, mut rendered) = spawn_watcher(
        consumer,
        watch_events,
        Some(FixedHistory(earlier.clone())),
        cancel.clone(),
    );

    let mut producer = Producer::without_store(DELIVERY, ProducerConfig::default(), courier);
    // Repeats the last historical point, then moves on
    producer.offer_at(sample(PICKUP), Instant::now());
    producer.offer_at(sample(MIDWAY), Instant::now() + Duration::from_secs(10));

    let trail = trail_of_len(&mut rendered, 3).await;
    assert_eq!(trail, vec![earlier[0], PICKUP, MIDWAY]);

    cancel.cancel();
    let consumer = watcher.await.unwrap();
    assert!(consumer.reconciler().history_applied());
}

// ============================================================================
// Server Frames
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_watcher_stops_on_terminal_status() {
    let hub = MemoryHub::new();
    let (_watch, watch_events) = join(&hub).await;

    let consumer = Consumer::new(DELIVERY, ConsumerConfig::default());
    let (watcher, mut rendered) =
        spawn_watcher(consumer, watch_events, None, CancellationToken::new());

    hub.broadcast(r#"{"type":"complete","lat":-1.2864,"lng":36.8172,"status":"delivered"}"#);

    let consumer = watcher.await.unwrap();
    assert_eq!(consumer.delivery().status, DeliveryStatus::Delivered);
    assert_eq!(consumer.delivery().trail.points(), &[DROPOFF]);

    let mut saw_status = false;
    while let Ok(event) = rendered.try_recv() {
        saw_status |= event == RenderEvent::Status(DeliveryStatus::Delivered);
    }
    assert!(saw_status);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_reaches_both_sides() {
    let hub = MemoryHub::new();
    let (courier, mut courier_events) = join(&hub).await;
    let (_watch, watch_events) = join(&hub).await;

    let cancel = CancellationToken::new();
    let consumer = Consumer::new(DELIVERY, ConsumerConfig::default());
    let (_watcher, mut rendered) = spawn_watcher(consumer, watch_events, None, cancel.clone());

    hub.broadcast(r#"{"type":"error","error":"forbidden"}"#);

    let mut producer = Producer::without_store(DELIVERY, ProducerConfig::default(), courier);
    producer.settle(&mut courier_events, Duration::from_millis(200)).await;
    assert_eq!(producer.last_error(), Some("forbidden"));

    let text = loop {
        match rendered.recv().await {
            Some(RenderEvent::Error(text)) => break text,
            Some(_) => continue,
            None => panic!("consumer stopped"),
        }
    };
    assert_eq!(text, "Error: forbidden");
    cancel.cancel();
}

// ============================================================================
// Reconnect
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_position_sent_during_outage_is_delivered_after_reconnect() {
    let hub = MemoryHub::new();
    let (courier, mut courier_events) = join(&hub).await;
    let probe = courier.clone();
    let mut producer = Producer::without_store(DELIVERY, ProducerConfig::default(), courier);

    hub.disconnect_all();
    probe
        .wait_for(|s| s.state == ChannelState::ClosedWillRetry)
        .await;

    assert!(producer.offer(sample(PICKUP)));
    let snapshot = probe
        .wait_for(|s| s.state == ChannelState::Open && s.outbox_len == 0)
        .await;
    assert_eq!(snapshot.retry_count, 0);

    producer.settle(&mut courier_events, Duration::from_millis(200)).await;
    assert_eq!(producer.stats().acked, 1);
}

#[tokio::test(start_paused = true)]
async fn test_simulated_walk_reaches_watcher_with_demo_status() {
    let hub = MemoryHub::new();
    let (courier, mut courier_events) = join(&hub).await;
    let (_watch, watch_events) = join(&hub).await;

    let cancel = CancellationToken::new();
    let consumer = Consumer::new(DELIVERY, ConsumerConfig::default());
    let (watcher, mut rendered) = spawn_watcher(consumer, watch_events, None, cancel.clone());

    let mut producer = Producer::without_store(DELIVERY, ProducerConfig::default(), courier);
    let route = [PICKUP, MIDWAY, DROPOFF];
    let sent = producer
        .simulate(&route, &mut courier_events, &CancellationToken::new())
        .await;
    assert_eq!(sent, 3);

    let trail = trail_of_len(&mut rendered, 3).await;
    assert_eq!(trail, route.to_vec());

    cancel.cancel();
    let consumer = watcher.await.unwrap();
    assert_eq!(consumer.delivery().status, DeliveryStatus::Demo);
}

#[tokio::test]
async fn test_envelopes_survive_the_relay_unchanged() {
    let hub = MemoryHub::new();
    let (_watch, mut watch_events) = join(&hub).await;

    let frame = Envelope::status_update("in_transit");
    assert_eq!(hub.publish(&frame).unwrap(), 1);

    loop {
        match watch_events.recv().await {
            Some(livetrack::TransportEvent::Message(envelope)) => {
                assert_eq!(envelope, frame);
                break;
            }
            Some(_) => continue,
            None => panic!("transport exited"),
        }
    }
}
