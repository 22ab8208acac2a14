use std::sync::mpsc::Sender;

use comms::{Message, ModelId};
use log::{debug, warn};

use super::{ConsistencyModel, ModelCore};
use crate::{error::Result, storage::Store};

/// Bulk synchronous parallel: adds only become visible once every registered thread has clocked the round.
pub struct Bsp {
    core: ModelCore,
    add_buffer: Vec<Message>,
    get_buffer: Vec<Message>,
}

impl Bsp {
    /// Creates a new `Bsp` model.
    ///
    /// # Arguments
    /// * `model_id` - The table this model serves.
    /// * `store` - The parameters of this shard.
    /// * `replies` - Where replies are sent.
    pub fn new(model_id: ModelId, store: Box<dyn Store>, replies: Sender<Message>) -> Self {
        Self {
            core: ModelCore::new(model_id, store, replies),
            add_buffer: Vec::new(),
            get_buffer: Vec::new(),
        }
    }

    /// Returns the amount of adds waiting for the barrier.
    pub fn pending_adds(&self) -> usize {
        self.add_buffer.len()
    }

    /// Returns the amount of gets waiting for the barrier.
    pub fn pending_gets(&self) -> usize {
        self.get_buffer.len()
    }

    /// Applies every buffered add and then answers every buffered get, in arrival order.
    fn flush(&mut self) -> Result<()> {
        debug!(
            model_id = self.core.model_id(),
            min_clock = self.core.tracker().min_clock(),
            adds = self.add_buffer.len(),
            gets = self.get_buffer.len();
            "barrier reached, flushing buffers"
        );

        for msg in self.add_buffer.drain(..) {
            self.core.apply_add(&msg)?;
        }

        for msg in self.get_buffer.drain(..) {
            self.core.answer_get(&msg)?;
        }

        Ok(())
    }
}

impl ConsistencyModel for Bsp {
    fn clock(&mut self, msg: Message) -> Result<()> {
        if !self.core.admit(&msg) {
            return Ok(());
        }

        let tracker = self.core.tracker();
        if self.core.sender_progress(&msg) > tracker.min_clock() {
            debug!(sender = msg.sender(), min_clock = tracker.min_clock(); "ignoring clock ahead of the barrier");
            return Ok(());
        }

        if self
            .core
            .tracker_mut()
            .advance_and_get_changed_min_clock(msg.sender())
            .is_some()
        {
            self.flush()?;
        }

        Ok(())
    }

    fn add(&mut self, msg: Message) -> Result<()> {
        if self.core.admit(&msg) {
            self.add_buffer.push(msg);
        }

        Ok(())
    }

    fn get(&mut self, msg: Message) -> Result<()> {
        if !self.core.admit(&msg) {
            return Ok(());
        }

        if self.core.sender_progress(&msg) <= self.core.tracker().min_clock() {
            return self.core.answer_get(&msg);
        }

        self.get_buffer.push(msg);
        Ok(())
    }

    fn reset_worker(&mut self, msg: Message) -> Result<()> {
        let dropped = self.add_buffer.len() + self.get_buffer.len();
        if dropped > 0 {
            warn!(model_id = self.core.model_id(), dropped = dropped; "reset discards deferred requests");
        }

        self.add_buffer.clear();
        self.get_buffer.clear();
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

    fn registered(tids: Vec<u32>) -> (Bsp, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel();
        let mut bsp = Bsp::new(0, Box::new(MapStore::new()), tx);

        bsp.reset_worker(Message::reset_worker(99, 0, 0, tids)).unwrap();
        rx.recv().unwrap();
        (bsp, rx)
    }

    #[test]
    fn adds_are_always_buffered() {
        let (mut bsp, rx) = registered(vec![1, 2]);

        bsp.add(Message::add(1, 0, 0, vec![3], vec![1.0])).unwrap();
        assert_eq!(bsp.pending_adds(), 1);

        bsp.get(Message::get(2, 0, 0, vec![3])).unwrap();
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.values(), Some([0.0].as_slice()));
    }

    #[test]
    fn clock_ahead_of_the_barrier_is_a_no_op() {
        let (mut bsp, _rx) = registered(vec![1, 2]);

        bsp.clock(Message::clock(1, 0, 0)).unwrap();
        bsp.clock(Message::clock(1, 0, 0)).unwrap();
        bsp.clock(Message::clock(1, 0, 0)).unwrap();

        assert_eq!(bsp.progress(1), Some(1));
        assert_eq!(bsp.min_clock(), 0);
    }

    #[test]
    fn reset_drops_deferred_requests() {
        let (mut bsp, rx) = registered(vec![1, 2]);

        bsp.add(Message::add(1, 0, 0, vec![3], vec![1.0])).unwrap();
        bsp.clock(Message::clock(1, 0, 0)).unwrap();
        bsp.get(Message::get(1, 0, 0, vec![3])).unwrap();
        assert_eq!(bsp.pending_gets(), 1);

        bsp.reset_worker(Message::reset_worker(99, 0, 0, vec![1, 2])).unwrap();
        rx.recv().unwrap();

        assert_eq!(bsp.pending_adds(), 0);
        assert_eq!(bsp.pending_gets(), 0);
        assert_eq!(bsp.progress(1), Some(0));
    }
}
