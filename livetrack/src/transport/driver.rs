//! Async driver for the reconnecting channel.
//!
//! One tokio task owns the [`ChannelMachine`] and the live connection. Callers
//! reach it through a cloneable [`TransportHandle`]; decoded frames and state
//! changes come back on [`TransportEvents`]. Because only this task touches
//! the machine, no locking is needed around channel state or the outbox.
//!
//! The task waits in exactly one phase at a time (idle, connecting, open,
//! backing off, final) and always races that phase against the command
//! queue, so `stop` cancels a pending backoff or an in-flight connect.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::connection::{Connection, Connector};
use super::outbox::OutboxEntry;
use super::state::{ChannelMachine, ChannelState};
use crate::protocol::Envelope;

/// Observable channel summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub state: ChannelState,
    pub retry_count: u32,
    pub outbox_len: usize,
}

/// Output of a running transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A decoded inbound frame. Unknown frame types are delivered too.
    Message(Envelope),
    /// The channel changed state.
    Status(ChannelState),
}

#[derive(Debug)]
enum Command {
    Connect,
    Send(Envelope),
    Stop,
}

/// Cloneable handle to a running transport.
///
/// Every method returns immediately. When the last handle is dropped the
/// transport stops as if [`TransportHandle::stop`] had been called.
#[derive(Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ChannelSnapshot>,
}

impl TransportHandle {
    /// Start connecting. Only meaningful while idle.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Write `envelope` now if the channel is open, otherwise buffer it.
    pub fn send(&self, envelope: Envelope) {
        self.command(Command::Send(envelope));
    }

    /// Close the channel for good. Pending backoff and connect attempts are cancelled.
    pub fn stop(&self) {
        self.command(Command::Stop);
    }

    pub fn state(&self) -> ChannelState {
        self.snapshot.borrow().state
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        *self.snapshot.borrow()
    }

    /// Watch channel of snapshots, for callers that want to await changes.
    pub fn subscribe(&self) -> watch::Receiver<ChannelSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the published snapshot satisfies `predicate`.
    pub async fn wait_for(&self, predicate: impl FnMut(&ChannelSnapshot) -> bool) -> ChannelSnapshot {
        let mut rx = self.snapshot.clone();
        let result = rx.wait_for(predicate).await.map(|snapshot| *snapshot);
        // Driver gone: the last published value is final
        result.unwrap_or_else(|_| *rx.borrow())
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Transport task has exited; command dropped");
        }
    }
}

/// Receiving side of a transport's events.
pub struct TransportEvents {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportEvents {
    /// Next event. `None` after the transport task has exited.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }
}

/// Entry point for spawning a reconnecting channel.
pub struct Transport;

impl Transport {
    /// Spawn the driver task on the current runtime. The channel starts idle.
    pub fn spawn<C: Connector>(
        connector: C,
        backoff: BackoffPolicy,
    ) -> (TransportHandle, TransportEvents) {
        Self::spawn_shared(Arc::new(connector), backoff)
    }

    /// Like [`Transport::spawn`] for an already shared connector.
    pub fn spawn_shared(
        connector: Arc<dyn Connector>,
        backoff: BackoffPolicy,
    ) -> (TransportHandle, TransportEvents) {
        let machine = ChannelMachine::new(backoff);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot_of(&machine));

        let driver = Driver {
            endpoint: connector.endpoint(),
            connector,
            machine,
            commands: commands_rx,
            events: events_tx,
            snapshot: snapshot_tx,
        };
        tokio::spawn(driver.run());

        (
            TransportHandle {
                commands: commands_tx,
                snapshot: snapshot_rx,
            },
            TransportEvents { rx: events_rx },
        )
    }
}

fn snapshot_of(machine: &ChannelMachine) -> ChannelSnapshot {
    ChannelSnapshot {
        state: machine.state(),
        retry_count: machine.retry_count(),
        outbox_len: machine.outbox_len(),
    }
}

/// What the open phase ended with.
enum OpenExit {
    Dropped,
    Stopped,
}

struct Driver {
    endpoint: String,
    connector: Arc<dyn Connector>,
    machine: ChannelMachine,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
    snapshot: watch::Sender<ChannelSnapshot>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            match self.machine.state() {
                ChannelState::Idle => self.idle().await,
                ChannelState::Connecting => self.connecting().await,
                ChannelState::ClosedWillRetry => {
                    let delay = self.machine.scheduled_delay().unwrap_or_default();
                    self.backing_off(delay).await;
                }
                ChannelState::Open | ChannelState::Closing => {
                    // `connecting` carries the channel through both before returning
                    warn!(state = %self.machine.state(), "Driver resumed mid-connection; stopping");
                    self.machine.stop();
                    self.machine.closed();
                    self.publish();
                }
                ChannelState::ClosedFinal => {
                    self.finished().await;
                    break;
                }
            }
        }
        debug!(endpoint = %self.endpoint, "Transport task exiting");
    }

    /// Wait for `connect`. Dropping every handle counts as `stop`.
    async fn idle(&mut self) {
        match self.commands.recv().await {
            Some(Command::Connect) => {
                self.machine.connect();
                self.publish();
            }
            Some(Command::Send(envelope)) => {
                self.machine.send(envelope);
                self.publish_snapshot();
            }
            Some(Command::Stop) | None => {
                self.machine.stop();
                self.publish();
            }
        }
    }

    async fn connecting(&mut self) {
        info!(endpoint = %self.endpoint, retry = self.machine.retry_count(), "Connecting");

        let connector = Arc::clone(&self.connector);
        let mut attempt = connector.connect();

        let mut conn = loop {
            tokio::select! {
                result = &mut attempt => match result {
                    Ok(conn) => break conn,
                    Err(e) => {
                        warn!(endpoint = %self.endpoint, error = %e, "Connection attempt failed");
                        self.schedule_retry();
                        return;
                    }
                },
                command = self.commands.recv() => {
                    if self.absorb(command) {
                        debug!("Stop requested while connecting; attempt cancelled");
                        return;
                    }
                }
            }
        };

        let pending = self.machine.opened();
        info!(endpoint = %self.endpoint, flushing = pending.len(), "Channel open");
        self.publish();

        if let Err(unwritten) = flush(conn.as_mut(), pending).await {
            warn!(unwritten = unwritten.len(), "Write failed while flushing outbox");
            self.machine.requeue_front(unwritten);
            self.schedule_retry();
            return;
        }
        self.publish_snapshot();

        match self.open(conn.as_mut()).await {
            OpenExit::Dropped => self.schedule_retry(),
            OpenExit::Stopped => {
                self.machine.stop();
                self.publish();
                if let Err(e) = conn.close().await {
                    debug!(error = %e, "Close frame not delivered");
                }
                self.machine.closed();
                info!(endpoint = %self.endpoint, "Channel closed");
                self.publish();
            }
        }
    }

    async fn open(&mut self, conn: &mut dyn Connection) -> OpenExit {
        loop {
            tokio::select! {
                frame = conn.recv_text() => match frame {
                    Some(Ok(text)) => self.deliver(&text),
                    Some(Err(e)) => {
                        warn!(error = %e, "Channel error");
                        return OpenExit::Dropped;
                    }
                    None => {
                        info!(endpoint = %self.endpoint, "Channel closed by peer");
                        return OpenExit::Dropped;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(envelope)) => {
                        let Some(envelope) = self.machine.send(envelope) else {
                            continue;
                        };
                        let text = match envelope.encode() {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(kind = envelope.kind(), error = %e, "Dropping unencodable frame");
                                continue;
                            }
                        };
                        if let Err(e) = conn.send_text(text).await {
                            warn!(error = %e, "Write failed; frame returned to outbox");
                            self.machine.requeue_front(vec![OutboxEntry::new(envelope)]);
                            return OpenExit::Dropped;
                        }
                    }
                    Some(Command::Connect) => {}
                    Some(Command::Stop) | None => return OpenExit::Stopped,
                },
            }
        }
    }

    async fn backing_off(&mut self, delay: Duration) {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => {
                    self.machine.connect();
                    self.publish();
                    return;
                }
                command = self.commands.recv() => {
                    if self.absorb(command) {
                        debug!("Stop requested during backoff; retry cancelled");
                        return;
                    }
                }
            }
        }
    }

    /// Terminal phase: keep buffering sends until every handle is gone.
    async fn finished(&mut self) {
        while let Some(command) = self.commands.recv().await {
            if let Command::Send(envelope) = command {
                self.machine.send(envelope);
                self.publish_snapshot();
            }
        }
    }

    /// Handle a command outside the open phase. Returns `true` if the channel stopped.
    fn absorb(&mut self, command: Option<Command>) -> bool {
        match command {
            Some(Command::Send(envelope)) => {
                self.machine.send(envelope);
                self.publish_snapshot();
                false
            }
            Some(Command::Connect) => false,
            Some(Command::Stop) | None => {
                self.machine.stop();
                self.publish();
                true
            }
        }
    }

    fn schedule_retry(&mut self) {
        if let Some(delay) = self.machine.closed() {
            info!(
                endpoint = %self.endpoint,
                retry = self.machine.retry_count(),
                delay_ms = delay.as_millis() as u64,
                "Reconnect scheduled"
            );
        }
        self.publish();
    }

    fn deliver(&mut self, text: &str) {
        match Envelope::decode(text) {
            Ok(Envelope::Unknown(kind)) => {
                debug!(kind = %kind, "Unrecognized frame type");
                let _ = self.events.send(TransportEvent::Message(Envelope::Unknown(kind)));
            }
            Ok(envelope) => {
                let _ = self.events.send(TransportEvent::Message(envelope));
            }
            Err(e) => warn!(error = %e, "Discarding malformed frame"),
        }
    }

    /// Publish state change to both the snapshot watch and the event stream.
    fn publish(&mut self) {
        let snapshot = snapshot_of(&self.machine);
        let previous = self.snapshot.send_replace(snapshot);
        if previous.state != snapshot.state {
            debug!(from = %previous.state, to = %snapshot.state, "Channel state change");
            let _ = self.events.send(TransportEvent::Status(snapshot.state));
        }
    }

    fn publish_snapshot(&mut self) {
        self.snapshot.send_replace(snapshot_of(&self.machine));
    }
}

/// Write `pending` in order. On failure returns the entries not yet written.
async fn flush(
    conn: &mut dyn Connection,
    pending: Vec<OutboxEntry>,
) -> Result<(), Vec<OutboxEntry>> {
    let mut remaining = pending.into_iter();
    while let Some(entry) = remaining.next() {
        let text = match entry.message.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = entry.message.kind(), error = %e, "Dropping unencodable frame");
                continue;
            }
        };
        if conn.send_text(text).await.is_err() {
            let mut unwritten = vec![entry];
            unwritten.extend(remaining);
            return Err(unwritten);
        }
    }
    Ok(())
}
