//! Channel lifecycle state machine.
//!
//! [`ChannelMachine`] holds everything the reconnecting channel mutates: the
//! state, the retry counter and the outbox. It performs no I/O, so the
//! reconnect and buffering rules can be exercised without a socket. The async
//! driver feeds it socket events and acts on what it returns.
//!
//! # State Machine
//!
//! ```text
//! Idle            --[connect]-----------------> Connecting
//! Connecting      --[socket opened]-----------> Open             (retry = 0, drain outbox)
//! Connecting      --[connect failed]----------> ClosedWillRetry  (schedule backoff)
//! Open            --[close / error]-----------> ClosedWillRetry  (schedule backoff)
//! ClosedWillRetry --[backoff elapsed]---------> Connecting
//! Open            --[stop]--------------------> Closing
//! Closing         --[close frame written]-----> ClosedFinal
//! any other       --[stop]--------------------> ClosedFinal
//! ```
//!
//! `ClosedFinal` is terminal. Sends in any state other than `Open` are
//! buffered in the outbox, including after the channel is final.

use std::fmt;
use std::time::Duration;

use super::backoff::BackoffPolicy;
use super::outbox::{Outbox, OutboxEntry};
use crate::protocol::Envelope;

/// Lifecycle state of a reconnecting channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closing,
    ClosedWillRetry,
    ClosedFinal,
}

impl ChannelState {
    /// Short label for status indicators.
    pub fn label(&self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "live",
            ChannelState::Closing => "closing",
            ChannelState::ClosedWillRetry => "reconnecting",
            ChannelState::ClosedFinal => "closed",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ChannelState::ClosedFinal)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pure channel state: lifecycle, retry counter and outbox.
#[derive(Debug)]
pub struct ChannelMachine {
    state: ChannelState,
    retry_count: u32,
    scheduled: Option<Duration>,
    outbox: Outbox,
    backoff: BackoffPolicy,
}

impl ChannelMachine {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            state: ChannelState::Idle,
            retry_count: 0,
            scheduled: None,
            outbox: Outbox::new(),
            backoff,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    /// Delay chosen by the last `closed()`, while waiting to reconnect.
    pub fn scheduled_delay(&self) -> Option<Duration> {
        self.scheduled
    }

    /// Begin a connection attempt. Valid from `Idle` and `ClosedWillRetry`.
    pub fn connect(&mut self) -> bool {
        match self.state {
            ChannelState::Idle | ChannelState::ClosedWillRetry => {
                self.state = ChannelState::Connecting;
                self.scheduled = None;
                true
            }
            _ => false,
        }
    }

    /// The socket opened. Resets the retry counter and hands back the
    /// buffered frames, oldest first, for the caller to write.
    pub fn opened(&mut self) -> Vec<OutboxEntry> {
        if self.state != ChannelState::Connecting {
            return Vec::new();
        }
        self.state = ChannelState::Open;
        self.retry_count = 0;
        self.outbox.drain()
    }

    /// The socket closed, errored, or failed to open.
    ///
    /// Returns the delay before the next attempt when a retry is scheduled,
    /// or `None` when the channel is now (or already was) final.
    pub fn closed(&mut self) -> Option<Duration> {
        match self.state {
            ChannelState::Connecting | ChannelState::Open => {
                let delay = self.backoff.delay(self.retry_count);
                self.retry_count = self.retry_count.saturating_add(1);
                self.state = ChannelState::ClosedWillRetry;
                self.scheduled = Some(delay);
                Some(delay)
            }
            ChannelState::Closing => {
                self.state = ChannelState::ClosedFinal;
                None
            }
            _ => None,
        }
    }

    /// Caller-issued stop. Returns the new state.
    pub fn stop(&mut self) -> ChannelState {
        self.state = match self.state {
            ChannelState::Open | ChannelState::Closing => ChannelState::Closing,
            _ => ChannelState::ClosedFinal,
        };
        self.scheduled = None;
        self.state
    }

    /// Offer a frame for sending.
    ///
    /// Returns the frame back when the channel is open and it should be
    /// written now. Otherwise it is appended to the outbox.
    pub fn send(&mut self, message: Envelope) -> Option<Envelope> {
        if self.state == ChannelState::Open {
            return Some(message);
        }
        self.outbox.push(message);
        None
    }

    /// Return unwritten frames to the head of the outbox.
    pub fn requeue_front(&mut self, entries: Vec<OutboxEntry>) {
        self.outbox.requeue_front(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ChannelMachine {
        ChannelMachine::new(BackoffPolicy::default())
    }

    fn status(s: &str) -> Envelope {
        Envelope::status_update(s)
    }

    #[test]
    fn test_starts_idle() {
        let m = machine();
        assert_eq!(m.state(), ChannelState::Idle);
        assert_eq!(m.retry_count(), 0);
        assert_eq!(m.outbox_len(), 0);
    }

    #[test]
    fn test_sends_buffer_until_open_then_drain_in_order() {
        let mut m = machine();
        assert!(m.send(status("a")).is_none());
        assert!(m.connect());
        assert!(m.send(status("b")).is_none());
        assert_eq!(m.outbox_len(), 2);

        let drained: Vec<_> = m.opened().into_iter().map(|e| e.message).collect();
        assert_eq!(drained, vec![status("a"), status("b")]);
        assert_eq!(m.state(), ChannelState::Open);
        assert_eq!(m.send(status("c")), Some(status("c")));
        assert_eq!(m.outbox_len(), 0);
    }

    #[test]
    fn test_failed_attempts_back_off_and_open_resets() {
        let mut m = machine();
        m.connect();
        assert_eq!(m.closed(), Some(Duration::from_millis(1000)));
        assert_eq!(m.state(), ChannelState::ClosedWillRetry);
        assert_eq!(m.scheduled_delay(), Some(Duration::from_millis(1000)));
        m.connect();
        assert_eq!(m.scheduled_delay(), None);
        assert_eq!(m.closed(), Some(Duration::from_millis(2000)));
        m.connect();
        assert_eq!(m.closed(), Some(Duration::from_millis(4000)));
        assert_eq!(m.retry_count(), 3);

        m.connect();
        m.opened();
        assert_eq!(m.retry_count(), 0);
        assert_eq!(m.closed(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_send_does_not_reset_retry_counter() {
        let mut m = machine();
        m.connect();
        m.closed();
        m.send(status("a"));
        assert_eq!(m.retry_count(), 1);
    }

    #[test]
    fn test_stop_while_open_passes_through_closing() {
        let mut m = machine();
        m.connect();
        m.opened();
        assert_eq!(m.stop(), ChannelState::Closing);
        assert_eq!(m.closed(), None);
        assert_eq!(m.state(), ChannelState::ClosedFinal);
    }

    #[test]
    fn test_stop_while_waiting_is_final_and_keeps_outbox() {
        let mut m = machine();
        m.connect();
        m.closed();
        m.send(status("a"));
        m.send(status("b"));
        m.send(status("c"));

        assert_eq!(m.stop(), ChannelState::ClosedFinal);
        assert_eq!(m.scheduled_delay(), None);
        assert!(!m.connect());
        assert_eq!(m.state(), ChannelState::ClosedFinal);
        assert_eq!(m.outbox_len(), 3);
        assert!(m.opened().is_empty());
        assert_eq!(m.outbox_len(), 3);
    }

    #[test]
    fn test_sends_after_final_are_buffered() {
        let mut m = machine();
        m.stop();
        assert!(m.send(status("late")).is_none());
        assert_eq!(m.outbox_len(), 1);
        assert_eq!(m.closed(), None);
    }

    #[test]
    fn test_connect_is_ignored_while_connecting_or_open() {
        let mut m = machine();
        assert!(m.connect());
        assert!(!m.connect());
        m.opened();
        assert!(!m.connect());
        assert_eq!(m.state(), ChannelState::Open);
    }

    #[test]
    fn test_requeue_after_partial_flush() {
        let mut m = machine();
        m.send(status("a"));
        m.send(status("b"));
        m.send(status("c"));
        m.connect();
        let mut pending = m.opened();
        // "a" was written, the rest failed
        let unwritten = pending.split_off(1);
        m.requeue_front(unwritten);
        m.closed();
        m.send(status("d"));

        let order: Vec<_> = m.outbox().iter().map(|e| e.message.clone()).collect();
        assert_eq!(order, vec![status("b"), status("c"), status("d")]);
    }
}
