use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Barrier, mpsc::Sender},
};

use comms::{Message, ModelId, ThreadId, specs::worker::WorkerAlloc};
use worker::{CallbackRunner, KvClientTable, PartitionManager};

use crate::error::{EngineErr, Result};

/// The body every worker thread of a task runs.
pub type Lambda = Arc<dyn Fn(&Info) -> Result<()> + Send + Sync>;

/// A training task: which workers to start where, which tables they use and what they run.
#[derive(Clone)]
pub struct MlTask {
    worker_alloc: Vec<WorkerAlloc>,
    tables: Vec<ModelId>,
    lambda: Lambda,
}

impl MlTask {
    /// Creates a new `MlTask` with no workers and no tables.
    ///
    /// # Arguments
    /// * `lambda` - What each worker thread runs.
    pub fn new<F>(lambda: F) -> Self
    where
        F: Fn(&Info) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            worker_alloc: Vec::new(),
            tables: Vec::new(),
            lambda: Arc::new(lambda),
        }
    }

    pub fn with_worker_alloc(mut self, worker_alloc: Vec<WorkerAlloc>) -> Self {
        self.worker_alloc = worker_alloc;
        self
    }

    pub fn with_tables(mut self, tables: Vec<ModelId>) -> Self {
        self.tables = tables;
        self
    }

    pub fn worker_alloc(&self) -> &[WorkerAlloc] {
        &self.worker_alloc
    }

    pub fn tables(&self) -> &[ModelId] {
        &self.tables
    }

    pub(crate) fn lambda(&self) -> Lambda {
        self.lambda.clone()
    }
}

/// What a worker thread knows about itself, and its way into the task's tables.
pub struct Info {
    pub thread_id: ThreadId,
    pub worker_id: u32,
    pub node_id: u32,
    /// The amount of workers of the whole task.
    pub num_workers: usize,
    pub(crate) tables: Arc<HashMap<ModelId, Arc<dyn PartitionManager>>>,
    pub(crate) outbox: Sender<Message>,
    pub(crate) callbacks: Arc<CallbackRunner>,
    pub(crate) barrier: Arc<Barrier>,
}

impl Info {
    /// Opens a handle to one of the task's tables for this thread.
    ///
    /// # Returns
    /// `UnknownTable` if the task didn't list `model_id`.
    pub fn table(&self, model_id: ModelId) -> Result<KvClientTable> {
        let partitions = self
            .tables
            .get(&model_id)
            .ok_or(EngineErr::UnknownTable(model_id))?;

        Ok(KvClientTable::new(
            self.thread_id,
            model_id,
            self.outbox.clone(),
            partitions.clone(),
            self.callbacks.clone(),
        ))
    }

    /// Blocks until every worker thread of this task on this node reached the barrier.
    pub fn barrier(&self) {
        self.barrier.wait();
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thread {} worker {}/{} on node {}",
            self.thread_id, self.worker_id, self.num_workers, self.node_id
        )
    }
}
