//! FIFO buffer for frames produced while the channel is not open.
//!
//! Unbounded. A producer that stays offline for a long time grows this
//! without limit; [`Outbox::len`] is exposed so callers can watch for it.

use std::collections::VecDeque;

use tokio::time::Instant;

use crate::protocol::Envelope;

/// A buffered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub message: Envelope,
    pub enqueued_at: Instant,
}

impl OutboxEntry {
    pub fn new(message: Envelope) -> Self {
        Self {
            message,
            enqueued_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    entries: VecDeque<OutboxEntry>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Envelope) {
        self.entries.push_back(OutboxEntry::new(message));
    }

    /// Remove and return every entry in enqueue order.
    pub fn drain(&mut self) -> Vec<OutboxEntry> {
        self.entries.drain(..).collect()
    }

    /// Put entries back at the head, keeping their relative order.
    pub fn requeue_front(&mut self, entries: Vec<OutboxEntry>) {
        for entry in entries.into_iter().rev() {
            self.entries.push_front(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboxEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(s: &str) -> Envelope {
        Envelope::status_update(s)
    }

    #[test]
    fn test_drain_is_fifo() {
        let mut outbox = Outbox::new();
        outbox.push(status("a"));
        outbox.push(status("b"));
        outbox.push(status("c"));

        let kinds: Vec<_> = outbox.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(kinds, vec![status("a"), status("b"), status("c")]);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_requeue_front_preserves_order_ahead_of_newer_entries() {
        let mut outbox = Outbox::new();
        outbox.push(status("a"));
        outbox.push(status("b"));
        let drained = outbox.drain();
        outbox.push(status("c"));

        outbox.requeue_front(drained);
        let order: Vec<_> = outbox.iter().map(|e| e.message.clone()).collect();
        assert_eq!(order, vec![status("a"), status("b"), status("c")]);
    }
}
