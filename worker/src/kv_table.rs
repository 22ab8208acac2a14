use std::{collections::HashMap, sync::Arc, sync::mpsc::Sender};

use comms::{Key, Message, ModelId, ThreadId, Val};
use log::debug;
use parking_lot::Mutex;

use crate::{
    callback::CallbackRunner,
    error::{ClientErr, Result},
    partition::PartitionManager,
};

/// The handle an application thread uses to read and update one table.
///
/// Requests are split by the table's partition manager and pushed onto the process' outbound queue, replies
/// come back through the shared `CallbackRunner`.
#[derive(Clone)]
pub struct KvClientTable {
    app_thread_id: ThreadId,
    model_id: ModelId,
    outbox: Sender<Message>,
    partitions: Arc<dyn PartitionManager>,
    callbacks: Arc<CallbackRunner>,
}

impl KvClientTable {
    /// Creates a new `KvClientTable`.
    ///
    /// # Arguments
    /// * `app_thread_id` - The thread using this table, replies are addressed to it.
    /// * `model_id` - The table.
    /// * `outbox` - The outbound queue of the process.
    /// * `partitions` - How the table's keys are spread across shards.
    /// * `callbacks` - The reply correlation of the process.
    pub fn new(
        app_thread_id: ThreadId,
        model_id: ModelId,
        outbox: Sender<Message>,
        partitions: Arc<dyn PartitionManager>,
        callbacks: Arc<CallbackRunner>,
    ) -> Self {
        Self {
            app_thread_id,
            model_id,
            outbox,
            partitions,
            callbacks,
        }
    }

    pub fn app_thread_id(&self) -> ThreadId {
        self.app_thread_id
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    /// Sends `vals[i]` as a delta for `keys[i]` to the owning shards, without waiting for them.
    pub fn add(&self, keys: &[Key], vals: &[Val]) -> Result<()> {
        for (server_id, keys, vals) in self.partitions.slice_kvs(keys, vals)? {
            let msg = Message::add(self.app_thread_id, server_id, self.model_id, keys, vals);
            self.send(msg)?;
        }

        Ok(())
    }

    /// Reads `keys` from every owning shard and appends the values to `vals`.
    ///
    /// Blocks until every shard replied. The values come grouped by shard in reply order, so they only
    /// follow the order of `keys` when a single shard owns all of them; see `get_aligned`.
    pub fn get(&self, keys: &[Key], vals: &mut Vec<Val>) -> Result<()> {
        let received = Arc::new(Mutex::new(Vec::with_capacity(keys.len())));

        let sink = received.clone();
        self.request(keys, move |reply| {
            if let Some(values) = reply.values() {
                sink.lock().extend_from_slice(values);
            }
        })?;

        vals.append(&mut received.lock());
        Ok(())
    }

    /// Reads `keys` from every owning shard.
    ///
    /// # Returns
    /// One value per routed key, in the order of `keys`.
    pub fn get_aligned(&self, keys: &[Key]) -> Result<Vec<Val>> {
        let received = Arc::new(Mutex::new(HashMap::with_capacity(keys.len())));

        let sink = received.clone();
        self.request(keys, move |reply| {
            if let (Some(keys), Some(values)) = (reply.keys(), reply.values()) {
                sink.lock().extend(keys.iter().copied().zip(values.iter().copied()));
            }
        })?;

        let received = received.lock();
        Ok(keys.iter().filter_map(|key| received.get(key).copied()).collect())
    }

    /// Tells every shard of the table that this thread finished its current round.
    pub fn clock(&self) -> Result<()> {
        for &server_id in self.partitions.server_ids() {
            self.send(Message::clock(self.app_thread_id, server_id, self.model_id))?;
        }

        Ok(())
    }

    /// Sends a `Get` for `keys` to every owning shard, feeds each reply to `on_reply` and waits for all of
    /// them.
    fn request<F>(&self, keys: &[Key], on_reply: F) -> Result<()>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let sliced = self.partitions.slice_keys(keys)?;

        self.callbacks
            .new_request(self.app_thread_id, self.model_id, sliced.len() as u32)?;
        self.callbacks
            .register_recv_handle(self.app_thread_id, self.model_id, on_reply);
        self.callbacks
            .register_recv_finish_handle(self.app_thread_id, self.model_id, || {});

        debug!(
            app_thread = self.app_thread_id,
            model_id = self.model_id,
            shards = sliced.len();
            "sending get"
        );

        for (server_id, keys) in sliced {
            let msg = Message::get(self.app_thread_id, server_id, self.model_id, keys);
            if let Err(e) = self.send(msg) {
                self.callbacks.cancel_request(self.app_thread_id, self.model_id);
                return Err(e);
            }
        }

        self.callbacks.wait_request(self.app_thread_id, self.model_id);
        Ok(())
    }

    fn send(&self, msg: Message) -> Result<()> {
        self.outbox.send(msg).map_err(|_| ClientErr::Disconnected)
    }
}
