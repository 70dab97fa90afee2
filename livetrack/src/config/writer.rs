//! INI serialization: `ConfigFile` to the commented text written by `config init`.

use super::settings::ConfigFile;

/// Render `config` as commented INI.
pub fn to_config_string(config: &ConfigFile) -> String {
    let delivery_id = config
        .session
        .delivery_id
        .map(|id| id.to_string())
        .unwrap_or_default();
    let channel_url = config.session.channel_url.as_deref().unwrap_or("");

    format!(
        r#"[session]
; Origin of the tracking site. The channel and HTTP endpoints are derived from it:
;   channel: ws(s)://<host>/ws/delivery/track/<id>/
origin = {}
; Delivery to track when none is given on the command line
delivery_id = {}
; Full channel URL, replacing the derived one (ws:// or wss://)
channel_url = {}

[gate]
; A sample is sent only when at least min_interval_secs have passed since the
; last sent sample AND the device moved at least min_distance_m metres
min_interval_secs = {}
min_distance_m = {}

[transport]
; Reconnect delay is min(backoff_max_ms, backoff_base_ms * 2^retry)
backoff_base_ms = {}
backoff_max_ms = {}

[producer]
; Also append every sent position to the durable store (fire-and-forget)
persist = {}
; Durable-store endpoint, relative to origin (tracking API lives under /orders/)
persist_path = {}
; Status carried on every position update
status = {}
; Interval between waypoints in simulate mode
simulate_tick_ms = {}

[consumer]
; History endpoint, relative to origin ({{id}} is replaced by the delivery id)
; Drop the /orders/ prefix if the tracking API is mounted at the root
history_path = {}
; Points requested for the backfill (10 - 1000)
history_limit = {}
history_timeout_secs = {}
; Assumed average speed for straight-line ETAs
speed_kmph = {}

[logging]
directory = {}
file = {}
"#,
        config.session.origin,
        delivery_id,
        channel_url,
        config.gate.min_interval_secs,
        config.gate.min_distance_m,
        config.transport.backoff_base_ms,
        config.transport.backoff_max_ms,
        config.producer.persist,
        config.producer.persist_path,
        config.producer.status,
        config.producer.simulate_tick_ms,
        config.consumer.history_path,
        config.consumer.history_limit,
        config.consumer.history_timeout_secs,
        config.consumer.speed_kmph,
        config.logging.directory.display(),
        config.logging.file,
    )
}
