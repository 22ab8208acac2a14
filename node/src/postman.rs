use std::{
    collections::HashMap,
    io,
    sync::{
        Arc,
        mpsc::{Receiver, Sender},
    },
    thread::{self, JoinHandle},
};

use comms::{Flag, Message, ThreadId};
use log::{info, warn};
use parking_lot::RwLock;

/// The inbound queues of the threads of this process, keyed by thread id.
///
/// Several thread ids may share a queue, every worker thread id maps to the helper's.
#[derive(Clone, Default)]
pub struct Mailboxes {
    inner: Arc<RwLock<HashMap<ThreadId, Sender<Message>>>>,
}

impl Mailboxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes every message for `tid` to `tx`.
    ///
    /// # Returns
    /// `false` if `tid` already had a queue, which is replaced.
    pub fn register(&self, tid: ThreadId, tx: Sender<Message>) -> bool {
        self.inner.write().insert(tid, tx).is_none()
    }

    /// Stops routing messages to `tid`.
    pub fn deregister(&self, tid: ThreadId) -> bool {
        self.inner.write().remove(&tid).is_some()
    }

    pub fn contains(&self, tid: ThreadId) -> bool {
        self.inner.read().contains_key(&tid)
    }

    /// Pushes `msg` onto the queue of its receiver.
    ///
    /// # Returns
    /// The message back if its receiver has no queue or the queue is closed.
    pub fn deliver(&self, msg: Message) -> Result<(), Message> {
        let mailboxes = self.inner.read();

        match mailboxes.get(&msg.receiver()) {
            Some(tx) => tx.send(msg).map_err(|e| e.0),
            None => Err(msg),
        }
    }
}

/// Moves messages from the process' outbound queue to the inbound queue of their receiver.
///
/// Messages leave in the order they were queued, so the order between any sender and receiver pair is kept.
pub struct Postman {
    id: ThreadId,
    outbox: Receiver<Message>,
    mailboxes: Mailboxes,
}

impl Postman {
    /// Creates a new `Postman`.
    ///
    /// # Arguments
    /// * `id` - The thread id of the postman, an `Exit` addressed to it stops the loop.
    /// * `outbox` - The outbound queue of the process.
    /// * `mailboxes` - Where messages are delivered.
    pub fn new(id: ThreadId, outbox: Receiver<Message>, mailboxes: Mailboxes) -> Self {
        Self {
            id,
            outbox,
            mailboxes,
        }
    }

    /// Delivers messages until its own `Exit` arrives or every sender is gone.
    ///
    /// # Returns
    /// The amount of messages delivered.
    pub fn run(&self) -> u64 {
        info!(postman_id = self.id; "postman started");
        let mut delivered = 0;

        while let Ok(msg) = self.outbox.recv() {
            if msg.flag() == Flag::Exit && msg.receiver() == self.id {
                break;
            }

            match self.mailboxes.deliver(msg) {
                Ok(()) => delivered += 1,
                Err(msg) => warn!(
                    postman_id = self.id,
                    sender = msg.sender(),
                    receiver = msg.receiver();
                    "dropping a {:?} message for an unreachable thread", msg.flag()
                ),
            }
        }

        info!(postman_id = self.id, delivered = delivered; "postman stopped");
        delivered
    }

    /// Moves this postman onto its own named thread and runs it there.
    pub fn spawn(self) -> io::Result<JoinHandle<u64>> {
        thread::Builder::new()
            .name(format!("postman-{}", self.id))
            .spawn(move || self.run())
    }
}
