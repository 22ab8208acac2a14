use std::{
    io,
    sync::{Arc, mpsc::Receiver},
    thread::{self, JoinHandle},
};

use comms::{Flag, Message, ThreadId};
use log::{info, warn};

use crate::callback::CallbackRunner;

/// Drains the replies addressed to the threads of this process and hands them to the `CallbackRunner`.
pub struct HelperThread {
    id: ThreadId,
    inbox: Receiver<Message>,
    callbacks: Arc<CallbackRunner>,
}

impl HelperThread {
    /// Creates a new `HelperThread`.
    ///
    /// # Arguments
    /// * `id` - The thread id of the helper.
    /// * `inbox` - Where the replies for this process arrive.
    /// * `callbacks` - The reply correlation of the process.
    pub fn new(id: ThreadId, inbox: Receiver<Message>, callbacks: Arc<CallbackRunner>) -> Self {
        Self {
            id,
            inbox,
            callbacks,
        }
    }

    /// Forwards `Get` and `ResetWorker` replies until an `Exit` arrives or every sender is gone.
    pub fn run(&self) {
        info!(helper_id = self.id; "helper thread started");

        while let Ok(msg) = self.inbox.recv() {
            match msg.flag() {
                Flag::Exit => break,
                Flag::Get | Flag::ResetWorker => self.forward(&msg),
                flag => {
                    warn!(helper_id = self.id, sender = msg.sender(); "ignoring a {flag:?} message")
                }
            }
        }

        info!(helper_id = self.id; "helper thread stopped");
    }

    /// Moves this helper onto its own named thread and runs it there.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("helper-{}", self.id))
            .spawn(move || self.run())
    }

    fn forward(&self, msg: &Message) {
        if let Err(e) = self
            .callbacks
            .add_response(msg.receiver(), msg.model_id(), msg)
        {
            warn!(helper_id = self.id, sender = msg.sender(); "discarding reply: {e}");
        }
    }
}
