use std::collections::BTreeMap;

use comms::Message;

/// Holds deferred requests until the minimum clock of their model reaches the clock they wait on.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    buffer: BTreeMap<u32, Vec<Message>>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defers `msg` until `clock` becomes the minimum clock.
    pub fn push(&mut self, clock: u32, msg: Message) {
        self.buffer.entry(clock).or_default().push(msg);
    }

    /// Takes every message waiting on `clock`, in the order they were pushed.
    pub fn pop(&mut self, clock: u32) -> Vec<Message> {
        self.buffer.remove(&clock).unwrap_or_default()
    }

    /// Returns the amount of messages waiting on `clock`.
    pub fn size(&self, clock: u32) -> usize {
        self.buffer.get(&clock).map_or(0, Vec::len)
    }

    /// Returns the amount of messages waiting on any clock.
    pub fn total(&self) -> usize {
        self.buffer.values().map(Vec::len).sum()
    }

    /// Drops every deferred message.
    ///
    /// # Returns
    /// The amount of messages dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.total();
        self.buffer.clear();
        dropped
    }
}
