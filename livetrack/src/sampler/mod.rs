//! Position sources.
//!
//! A [`PositionSource`] pushes raw [`PositionSample`]s into a channel at
//! whatever cadence its provider has. The returned [`WatchHandle`] owns the
//! watch: clearing or dropping it stops the source.
//!
//! # Example
//!
//! ```ignore
//! let (tx, mut rx) = mpsc::channel(16);
//! let mut source = LineSource::new(BufReader::new(tokio::io::stdin()));
//! let _watch = source.watch(tx);
//!
//! while let Some(sample) = rx.recv().await {
//!     println!("{}", sample.point());
//! }
//! ```

mod line;
mod scripted;

pub use line::{parse_sample_line, LineSource, SampleParseError};
pub use scripted::{ScriptedSource, ScriptedStep};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::geo::PositionSample;

/// A continuous position provider.
pub trait PositionSource: Send {
    /// Start delivering samples to `sink`.
    ///
    /// The watch ends when the handle is cleared or dropped, when `sink` is
    /// closed, or when the source runs out of samples.
    fn watch(&mut self, sink: mpsc::Sender<PositionSample>) -> WatchHandle;
}

/// Ownership of one running watch.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Spawn `run` as the watch task. It should exit once `cancel` fires.
    pub fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(cancel.clone()));
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// A handle with nothing behind it.
    pub fn inert() -> Self {
        Self {
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Stop the watch.
    pub fn clear(&self) {
        self.cancel.cancel();
    }

    /// Whether the watch task is still running.
    pub fn is_active(&self) -> bool {
        match &self.task {
            Some(task) => !task.is_finished() && !self.cancel.is_cancelled(),
            None => false,
        }
    }

    /// Wait for the watch task to finish on its own.
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
