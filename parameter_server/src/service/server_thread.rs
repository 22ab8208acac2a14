use std::{
    collections::{HashMap, hash_map::Entry},
    io,
    sync::mpsc::Receiver,
    thread::{self, JoinHandle},
};

use comms::{Flag, Message, ModelId, ThreadId};
use log::{debug, error, info};

use crate::{
    error::{Result, ServerErr},
    synchronization::{ConsistencyModel, Model},
};

/// Serves one shard: a single dispatch loop over the shard's inbound queue owning every model on it.
pub struct ServerThread {
    id: ThreadId,
    models: HashMap<ModelId, Model>,
    inbox: Receiver<Message>,
}

impl ServerThread {
    /// Creates a new `ServerThread`.
    ///
    /// # Arguments
    /// * `id` - The thread id messages for this shard are addressed to.
    /// * `inbox` - The inbound queue of this shard.
    ///
    /// # Returns
    /// A new `ServerThread` instance with no models.
    pub fn new(id: ThreadId, inbox: Receiver<Message>) -> Self {
        Self {
            id,
            models: HashMap::new(),
            inbox,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Registers `model` under `model_id`.
    ///
    /// # Returns
    /// `false` if a model was already registered under that id, in which case it's kept.
    pub fn register_model(&mut self, model_id: ModelId, model: Model) -> bool {
        match self.models.entry(model_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(model);
                true
            }
        }
    }

    pub fn model(&self, model_id: ModelId) -> Option<&Model> {
        self.models.get(&model_id)
    }

    /// Dispatches messages in arrival order until an `Exit` arrives or every sender is gone.
    ///
    /// # Returns
    /// An error if a message names an unknown model or can't be applied, the loop stops there.
    pub fn run(&mut self) -> Result<()> {
        info!(server_id = self.id, models = self.models.len(); "server thread started");

        while let Ok(msg) = self.inbox.recv() {
            if msg.flag() == Flag::Exit {
                break;
            }

            if let Err(e) = self.dispatch(msg) {
                error!(server_id = self.id; "stopping server thread: {e}");
                return Err(e);
            }
        }

        info!(server_id = self.id; "server thread stopped");
        Ok(())
    }

    /// Moves this server onto its own named thread and runs it there.
    pub fn spawn(mut self) -> io::Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name(format!("server-{}", self.id))
            .spawn(move || self.run())
    }

    fn dispatch(&mut self, msg: Message) -> Result<()> {
        let model_id = msg.model_id();
        let Some(model) = self.models.get_mut(&model_id) else {
            return Err(ServerErr::UnknownModel {
                server: self.id,
                model_id,
            });
        };

        debug!(
            server_id = self.id,
            model_id = model_id,
            sender = msg.sender();
            "dispatching {:?}", msg.flag()
        );

        match msg.flag() {
            Flag::Get => model.get(msg),
            Flag::Add => model.add(msg),
            Flag::Clock => model.clock(msg),
            Flag::ResetWorker => model.reset_worker(msg),
            Flag::Exit => Ok(()),
        }
    }
}
