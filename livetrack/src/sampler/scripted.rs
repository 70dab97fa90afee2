//! Timed list of samples.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use super::{PositionSource, WatchHandle};
use crate::geo::{LatLng, PositionSample};

/// One scripted fix, emitted `after` the previous one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedStep {
    pub after: Duration,
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: Option<f64>,
}

/// Replays a fixed list of fixes. Each watch replays from the start.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    steps: Vec<ScriptedStep>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self { steps }
    }

    /// Points spaced evenly in time, without accuracy.
    pub fn evenly_spaced(points: &[LatLng], every: Duration) -> Self {
        let steps = points
            .iter()
            .map(|p| ScriptedStep {
                after: every,
                lat: p.lat,
                lng: p.lng,
                accuracy_m: None,
            })
            .collect();
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl PositionSource for ScriptedSource {
    fn watch(&mut self, sink: mpsc::Sender<PositionSample>) -> WatchHandle {
        let steps = self.steps.clone();
        WatchHandle::spawn(move |cancel| async move {
            for step in steps {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(step.after) => {}
                }
                let sample = match PositionSample::now(step.lat, step.lng, step.accuracy_m) {
                    Ok(sample) => sample,
                    Err(e) => {
                        debug!(error = %e, "Skipping invalid scripted fix");
                        continue;
                    }
                };
                if sink.send(sample).await.is_err() {
                    return;
                }
            }
        })
    }
}
