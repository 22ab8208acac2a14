use std::sync::mpsc::Sender;

use comms::{Flag, Message, ModelId};
use log::{debug, warn};

use super::{ConsistencyModel, ModelCore, PendingBuffer};
use crate::{error::Result, storage::Store};

/// Stale synchronous parallel: a thread may run at most `staleness` clocks ahead of the slowest one
/// before its requests are deferred.
pub struct Ssp {
    core: ModelCore,
    staleness: u32,
    buffer: PendingBuffer,
}

impl Ssp {
    /// Creates a new `Ssp` model.
    ///
    /// # Arguments
    /// * `model_id` - The table this model serves.
    /// * `store` - The parameters of this shard.
    /// * `replies` - Where replies are sent.
    /// * `staleness` - The maximum gap between a thread's clock and the minimum clock.
    pub fn new(
        model_id: ModelId,
        store: Box<dyn Store>,
        replies: Sender<Message>,
        staleness: u32,
    ) -> Self {
        Self {
            core: ModelCore::new(model_id, store, replies),
            staleness,
            buffer: PendingBuffer::new(),
        }
    }

    pub fn staleness(&self) -> u32 {
        self.staleness
    }

    /// Returns the amount of requests waiting for `clock` to become the minimum clock.
    pub fn pending_size(&self, clock: u32) -> usize {
        self.buffer.size(clock)
    }

    /// Checks whether the sender of `msg` is within the staleness bound, otherwise defers `msg`.
    ///
    /// # Returns
    /// The message back if it must be applied now.
    fn admit_or_defer(&mut self, msg: Message) -> Option<Message> {
        if !self.core.admit(&msg) {
            return None;
        }

        let progress = self.core.sender_progress(&msg);
        let min_clock = self.core.tracker().min_clock();

        if progress.saturating_sub(min_clock) <= self.staleness {
            return Some(msg);
        }

        let clock = progress - self.staleness;
        debug!(sender = msg.sender(), progress = progress, until = clock; "deferring request");
        self.buffer.push(clock, msg);
        None
    }
}

impl ConsistencyModel for Ssp {
    fn clock(&mut self, msg: Message) -> Result<()> {
        if !self.core.admit(&msg) {
            return Ok(());
        }

        let Some(min_clock) = self
            .core
            .tracker_mut()
            .advance_and_get_changed_min_clock(msg.sender())
        else {
            return Ok(());
        };

        for deferred in self.buffer.pop(min_clock) {
            match deferred.flag() {
                Flag::Add => self.add(deferred)?,
                Flag::Get => self.get(deferred)?,
                _ => {}
            }
        }

        Ok(())
    }

    fn add(&mut self, msg: Message) -> Result<()> {
        match self.admit_or_defer(msg) {
            Some(msg) => self.core.apply_add(&msg),
            None => Ok(()),
        }
    }

    fn get(&mut self, msg: Message) -> Result<()> {
        match self.admit_or_defer(msg) {
            Some(msg) => self.core.answer_get(&msg),
            None => Ok(()),
        }
    }

    fn reset_worker(&mut self, msg: Message) -> Result<()> {
        let dropped = self.buffer.clear();
        if dropped > 0 {
            warn!(model_id = self.core.model_id(), dropped = dropped; "reset discards deferred requests");
        }

        self.core.reset(&msg)
    }

    fn core(&self) -> &ModelCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::storage::MapStore;

    fn registered(tids: Vec<u32>, staleness: u32) -> (Ssp, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel();
        let mut ssp = Ssp::new(0, Box::new(MapStore::new()), tx, staleness);

        ssp.reset_worker(Message::reset_worker(99, 0, 0, tids)).unwrap();
        rx.recv().unwrap();
        (ssp, rx)
    }

    #[test]
    fn zero_staleness_applies_only_at_the_minimum() {
        let (mut ssp, rx) = registered(vec![1, 2], 0);

        ssp.add(Message::add(1, 0, 0, vec![1], vec![2.0])).unwrap();
        ssp.clock(Message::clock(1, 0, 0)).unwrap();
        ssp.add(Message::add(1, 0, 0, vec![1], vec![3.0])).unwrap();
        assert_eq!(ssp.pending_size(1), 1);

        ssp.get(Message::get(2, 0, 0, vec![1])).unwrap();
        assert_eq!(rx.try_recv().unwrap().values(), Some([2.0].as_slice()));

        ssp.clock(Message::clock(2, 0, 0)).unwrap();
        assert_eq!(ssp.pending_size(1), 0);

        ssp.get(Message::get(2, 0, 0, vec![1])).unwrap();
        assert_eq!(rx.try_recv().unwrap().values(), Some([5.0].as_slice()));
    }

    #[test]
    fn within_bound_requests_apply_immediately() {
        let (mut ssp, rx) = registered(vec![1, 2], 3);

        for _ in 0..3 {
            ssp.clock(Message::clock(1, 0, 0)).unwrap();
        }
        ssp.add(Message::add(1, 0, 0, vec![8], vec![1.5])).unwrap();
        ssp.get(Message::get(1, 0, 0, vec![8])).unwrap();

        assert_eq!(rx.try_recv().unwrap().values(), Some([1.5].as_slice()));
    }
}
