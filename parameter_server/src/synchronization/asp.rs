use std::sync::mpsc::Sender;

use comms::{Message, ModelId};

use super::{ConsistencyModel, ModelCore};
use crate::{error::Result, storage::Store};

/// Asynchronous parallel: every request from a registered thread is applied as soon as it arrives.
pub struct Asp {
    core: ModelCore,
}

impl Asp {
    /// Creates a new `Asp` model.
    ///
    /// # Arguments
    /// * `model_id` - The table this model serves.
    /// * `store` - The parameters of this shard.
    /// * `replies` - Where replies are sent.
    pub fn new(model_id: ModelId, store: Box<dyn Store>, replies: Sender<Message>) -> Self {
        Self {
            core: ModelCore::new(model_id, store, replies),
        }
    }
}

impl ConsistencyModel for Asp {
    fn clock(&mut self, msg: Message) -> Result<()> {
        if self.core.admit(&msg) {
            self.core
                .tracker_mut()
                .advance_and_get_changed_min_clock(msg.sender());
        }

        Ok(())
    }

    fn add(&mut self, msg: Message) -> Result<()> {
        if !self.core.admit(&msg) {
            return Ok(());
        }

        self.core.apply_add(&msg)
    }

    fn get(&mut self, msg: Message) -> Result<()> {
        if !self.core.admit(&msg) {
            return Ok(());
        }

        self.core.answer_get(&msg)
    }

    fn reset_worker(&mut self, msg: Message) -> Result<()> {
        self.core.reset(&msg)
    }

    fn core(&self) -> &ModelCore {
        &self.core
    }
}
