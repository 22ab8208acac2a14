use std::sync::mpsc::Sender;

use comms::{Flag, Message, ModelId, Payload, ThreadId};
use log::{debug, warn};

use super::{Asp, Bsp, ProgressTracker, Ssp};
use crate::{
    error::{Result, ServerErr},
    storage::Store,
};

/// Decides, request by request, whether a model applies it right away or defers it.
///
/// Every model is driven by exactly one server thread, so implementors take `&mut self` and hold no locks.
pub trait ConsistencyModel {
    /// Moves the sender's clock forward, possibly releasing deferred requests.
    fn clock(&mut self, msg: Message) -> Result<()>;

    /// Applies or defers an `Add` request.
    fn add(&mut self, msg: Message) -> Result<()>;

    /// Answers or defers a `Get` request.
    fn get(&mut self, msg: Message) -> Result<()>;

    /// Registers the worker population carried by `msg` and acknowledges it to the sender.
    fn reset_worker(&mut self, msg: Message) -> Result<()>;

    /// The state every variant shares.
    fn core(&self) -> &ModelCore;

    fn model_id(&self) -> ModelId {
        self.core().model_id()
    }

    /// Returns the clock of `tid`, if it's registered.
    fn progress(&self, tid: ThreadId) -> Option<u32> {
        self.core().tracker.progress(tid)
    }

    fn min_clock(&self) -> u32 {
        self.core().tracker.min_clock()
    }

    /// Returns how many requests from unregistered threads were discarded.
    fn rejected(&self) -> u64 {
        self.core().rejected
    }
}

/// The storage, progress and reply queue of one model on one shard.
pub struct ModelCore {
    model_id: ModelId,
    store: Box<dyn Store>,
    tracker: ProgressTracker,
    replies: Sender<Message>,
    rejected: u64,
}

impl ModelCore {
    /// Creates a new `ModelCore`.
    ///
    /// # Arguments
    /// * `model_id` - The table this model serves.
    /// * `store` - The parameters of this shard.
    /// * `replies` - Where replies to `Get` and `ResetWorker` are sent.
    pub(super) fn new(model_id: ModelId, store: Box<dyn Store>, replies: Sender<Message>) -> Self {
        Self {
            model_id,
            store,
            tracker: ProgressTracker::new(),
            replies,
            rejected: 0,
        }
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub(super) fn tracker_mut(&mut self) -> &mut ProgressTracker {
        &mut self.tracker
    }

    /// Checks that the sender of `msg` takes part in the current round.
    ///
    /// # Returns
    /// `false` if the message must be discarded, in which case it was counted and logged.
    pub(super) fn admit(&mut self, msg: &Message) -> bool {
        if self.tracker.is_registered(msg.sender()) {
            return true;
        }

        self.rejected += 1;
        warn!(
            model_id = self.model_id,
            sender = msg.sender(),
            rejected = self.rejected;
            "discarding a {:?} request from an unregistered thread", msg.flag()
        );

        false
    }

    /// Returns the clock of the sender of `msg`, which must have been admitted.
    pub(super) fn sender_progress(&self, msg: &Message) -> u32 {
        self.tracker.progress(msg.sender()).unwrap_or_default()
    }

    /// Writes the deltas of an `Add` request into the store.
    pub(super) fn apply_add(&mut self, msg: &Message) -> Result<()> {
        let keys = msg.keys().ok_or(missing(Flag::Add, "keys"))?;
        let vals = msg.values().ok_or(missing(Flag::Add, "values"))?;

        self.store.add(keys, vals)?;
        debug!(model_id = self.model_id, sender = msg.sender(), keys = keys.len(); "applied add");
        Ok(())
    }

    /// Reads the keys of a `Get` request and replies with their values.
    pub(super) fn answer_get(&self, msg: &Message) -> Result<()> {
        let keys = msg.keys().ok_or(missing(Flag::Get, "keys"))?;
        let vals = self.store.get(keys)?;

        debug!(model_id = self.model_id, sender = msg.sender(), keys = keys.len(); "answered get");
        self.send(msg.reply(vec![Payload::Keys(keys.to_vec()), Payload::Values(vals)]));
        Ok(())
    }

    /// Re-initializes the tracker with the thread ids of a `ResetWorker` request and acknowledges it.
    pub(super) fn reset(&mut self, msg: &Message) -> Result<()> {
        let tids = msg.tids().ok_or(missing(Flag::ResetWorker, "thread ids"))?;

        self.tracker.init(tids);
        debug!(model_id = self.model_id, threads = tids.len(); "registered worker threads");
        self.send(msg.reply(Vec::new()));
        Ok(())
    }

    fn send(&self, msg: Message) {
        let receiver = msg.receiver();

        if self.replies.send(msg).is_err() {
            warn!(model_id = self.model_id, receiver = receiver; "reply queue is closed, dropping reply");
        }
    }
}

fn missing(flag: Flag, what: &'static str) -> ServerErr {
    ServerErr::MissingPayload { flag, what }
}

/// Expands `$body` once per variant with `$model` bound to the inner consistency model.
macro_rules! dispatch {
    ($self:expr, $model:ident => $body:expr) => {
        match $self {
            Model::Asp($model) => $body,
            Model::Bsp($model) => $body,
            Model::Ssp($model) => $body,
        }
    };
}

/// The closed set of consistency models a table can use.
pub enum Model {
    Asp(Asp),
    Bsp(Bsp),
    Ssp(Ssp),
}

impl Model {
    /// Returns the name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Model::Asp(_) => "asp",
            Model::Bsp(_) => "bsp",
            Model::Ssp(_) => "ssp",
        }
    }
}

impl ConsistencyModel for Model {
    fn clock(&mut self, msg: Message) -> Result<()> {
        dispatch!(self, model => model.clock(msg))
    }

    fn add(&mut self, msg: Message) -> Result<()> {
        dispatch!(self, model => model.add(msg))
    }

    fn get(&mut self, msg: Message) -> Result<()> {
        dispatch!(self, model => model.get(msg))
    }

    fn reset_worker(&mut self, msg: Message) -> Result<()> {
        dispatch!(self, model => model.reset_worker(msg))
    }

    fn core(&self) -> &ModelCore {
        dispatch!(self, model => model.core())
    }
}

impl From<Asp> for Model {
    fn from(value: Asp) -> Self {
        Self::Asp(value)
    }
}

impl From<Bsp> for Model {
    fn from(value: Bsp) -> Self {
        Self::Bsp(value)
    }
}

impl From<Ssp> for Model {
    fn from(value: Ssp) -> Self {
        Self::Ssp(value)
    }
}
