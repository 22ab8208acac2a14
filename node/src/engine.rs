use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Barrier,
        mpsc::{self, Sender},
    },
    thread::{self, JoinHandle},
};

use comms::{
    Message, ModelId, ThreadId,
    specs::table::{PartitionSpec, TableSpec},
};
use log::{error, info, warn};
use parameter_server::{ModelBuilder, ServerThread};
use worker::{
    CallbackRunner, ClientErr, HashPartitionManager, HelperThread, PartitionManager,
    RangePartitionManager,
};

use crate::{
    config::EngineConfig,
    error::{EngineErr, Result},
    id_mapper::IdMapper,
    postman::{Mailboxes, Postman},
    task::{Info, MlTask},
    worker_spec::WorkerSpec,
};

/// The lifecycle of an `Engine`, it only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Tables can be created, no thread runs yet.
    Init,
    /// Every thread runs, tasks can be run.
    Running,
    /// Every thread was stopped.
    Stopped,
}

/// The threads started by `Engine::start`.
#[derive(Default)]
struct Handles {
    postman: Option<JoinHandle<u64>>,
    helper: Option<JoinHandle<()>>,
    servers: Vec<(ThreadId, JoinHandle<parameter_server::Result<()>>)>,
}

/// Drives one node: owns its server threads, its helper and postman threads and the tables of the cluster.
pub struct Engine {
    config: EngineConfig,
    phase: Phase,
    id_mapper: IdMapper,
    mailboxes: Mailboxes,
    outbox: Sender<Message>,
    helper_tx: Sender<Message>,
    callbacks: Arc<CallbackRunner>,
    tables: BTreeMap<ModelId, Arc<dyn PartitionManager>>,
    postman: Option<Postman>,
    helper: Option<HelperThread>,
    servers: Vec<ServerThread>,
    handles: Handles,
}

impl Engine {
    /// Creates a new `Engine` in the `Init` phase.
    ///
    /// # Arguments
    /// * `config` - This node and its cluster.
    ///
    /// # Returns
    /// A new engine or an error if the config is inconsistent.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let node = config.node;
        if !config.nodes.contains(&node) {
            return Err(EngineErr::UnknownNode(node));
        }

        // Threads of other nodes have no mailbox here, requests to them would never be answered.
        if config.nodes.iter().any(|&other| other != node) {
            return Err(EngineErr::Config(format!(
                "node {node} can only run alone, got the cluster {:?}",
                config.nodes
            )));
        }

        let id_mapper = IdMapper::new(&config.nodes, config.server_threads_per_node)?;

        let mailboxes = Mailboxes::new();
        let (outbox, outbox_rx) = mpsc::channel();

        let servers = id_mapper
            .server_threads_for(node)?
            .iter()
            .map(|&server_id| {
                let (tx, rx) = mpsc::channel();
                mailboxes.register(server_id, tx);
                ServerThread::new(server_id, rx)
            })
            .collect();

        let callbacks = Arc::new(CallbackRunner::new());
        let (helper_tx, helper_rx) = mpsc::channel();
        let helper_id = id_mapper.helper_thread_for(node)?;
        mailboxes.register(helper_id, helper_tx.clone());
        mailboxes.register(id_mapper.driver_thread_for(node)?, helper_tx.clone());
        let helper = HelperThread::new(helper_id, helper_rx, callbacks.clone());

        let postman_id = id_mapper.postman_thread_for(node)?;
        let postman = Postman::new(postman_id, outbox_rx, mailboxes.clone());

        Ok(Self {
            config,
            phase: Phase::Init,
            id_mapper,
            mailboxes,
            outbox,
            helper_tx,
            callbacks,
            tables: BTreeMap::new(),
            postman: Some(postman),
            helper: Some(helper),
            servers,
            handles: Handles::default(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn id_mapper(&self) -> &IdMapper {
        &self.id_mapper
    }

    /// Returns the ids of every created table.
    pub fn tables(&self) -> impl Iterator<Item = ModelId> + '_ {
        self.tables.keys().copied()
    }

    /// Creates a table on every local shard.
    ///
    /// # Arguments
    /// * `spec` - How the table is kept consistent, stored and partitioned.
    ///
    /// # Returns
    /// The id of the new table, or an error if the engine was already started or the spec can't be
    /// realized.
    pub fn create_table(&mut self, spec: TableSpec) -> Result<ModelId> {
        self.expect_phase(Phase::Init)?;

        let model_id = self.tables.len() as ModelId;
        let invalid = |reason: String| EngineErr::InvalidTable { model_id, reason };

        let server_ids = self.id_mapper.all_server_threads();
        let partitions: Arc<dyn PartitionManager> = match spec.partition {
            PartitionSpec::Range {
                key_space,
                unrouted,
            } => Arc::new(
                RangePartitionManager::even(&server_ids, key_space, unrouted)
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            PartitionSpec::Hash { virtual_nodes } => Arc::new(
                HashPartitionManager::new(&server_ids, virtual_nodes)
                    .map_err(|e| invalid(e.to_string()))?,
            ),
        };

        let builder = ModelBuilder::new(self.outbox.clone());
        let models = self
            .servers
            .iter()
            .map(|server| builder.build(model_id, &spec, partitions.range_of(server.id())))
            .collect::<parameter_server::Result<Vec<_>>>()
            .map_err(|e| invalid(e.to_string()))?;

        for (server, model) in self.servers.iter_mut().zip(models) {
            server.register_model(model_id, model);
        }

        self.tables.insert(model_id, partitions);
        info!(model_id = model_id, shards = server_ids.len(); "created table");
        Ok(model_id)
    }

    /// Starts the postman, helper and server threads of this node.
    ///
    /// If a thread can't be spawned, the ones already running are stopped and the engine ends up `Stopped`.
    pub fn start(&mut self) -> Result<()> {
        self.expect_phase(Phase::Init)?;

        if let Err(e) = self.spawn_threads() {
            return Err(self.abort_start(e));
        }

        self.phase = Phase::Running;
        info!(node_id = self.config.node, tables = self.tables.len(); "engine started");
        Ok(())
    }

    /// Runs `task` to completion.
    ///
    /// Allocates a thread for every local worker, registers the task's worker threads on every table,
    /// runs the task's lambda on each and waits for all of them.
    ///
    /// # Returns
    /// The first error a worker returned, or `ThreadPanicked` if one panicked.
    pub fn run(&mut self, task: &MlTask) -> Result<()> {
        self.expect_phase(Phase::Running)?;

        if let Some(&model_id) = task.tables().iter().find(|id| !self.tables.contains_key(*id)) {
            return Err(EngineErr::UnknownTable(model_id));
        }

        for alloc in task.worker_alloc() {
            self.id_mapper.server_threads_for(alloc.node_id)?;
        }

        let mut spec = WorkerSpec::new(task.worker_alloc());
        let result = self.run_workers(task, &mut spec);
        self.release_workers(&spec);
        result
    }

    /// Registers `tids` as the worker population of `model_id` on every shard and waits for all of them to
    /// acknowledge it.
    pub fn init_table(&self, model_id: ModelId, tids: &[ThreadId]) -> Result<()> {
        self.expect_phase(Phase::Running)?;

        if !self.tables.contains_key(&model_id) {
            return Err(EngineErr::UnknownTable(model_id));
        }

        let driver = self.id_mapper.driver_thread_for(self.config.node)?;
        let server_ids = self.id_mapper.all_server_threads();

        self.callbacks
            .new_request(driver, model_id, server_ids.len() as u32)
            .map_err(ClientErr::from)?;

        for server_id in server_ids {
            let msg = Message::reset_worker(driver, server_id, model_id, tids.to_vec());
            self.outbox.send(msg).map_err(|_| ClientErr::Disconnected)?;
        }

        self.callbacks.wait_request(driver, model_id);
        info!(model_id = model_id, threads = tids.len(); "table initialized");
        Ok(())
    }

    /// Stops every thread of this node, calling it again does nothing.
    ///
    /// # Returns
    /// The first error a server thread stopped with.
    pub fn stop(&mut self) -> Result<()> {
        match self.phase {
            Phase::Stopped => return Ok(()),
            Phase::Init => {
                self.phase = Phase::Stopped;
                return Ok(());
            }
            Phase::Running => self.phase = Phase::Stopped,
        }

        let result = self.shutdown();
        info!(node_id = self.config.node; "engine stopped");
        result
    }

    fn expect_phase(&self, expected: Phase) -> Result<()> {
        if self.phase != expected {
            return Err(EngineErr::InvalidPhase {
                expected,
                actual: self.phase,
            });
        }

        Ok(())
    }

    /// Spawns the postman first, so the helper and servers can be told to exit through it.
    fn spawn_threads(&mut self) -> Result<()> {
        if let Some(postman) = self.postman.take() {
            self.handles.postman = Some(postman.spawn()?);
        }

        if let Some(helper) = self.helper.take() {
            self.handles.helper = Some(helper.spawn()?);
        }

        for server in self.servers.drain(..) {
            let server_id = server.id();
            self.handles.servers.push((server_id, server.spawn()?));
        }

        Ok(())
    }

    /// Stops whatever `spawn_threads` got to start and leaves the engine `Stopped`.
    fn abort_start(&mut self, cause: EngineErr) -> EngineErr {
        error!(node_id = self.config.node; "failed to start the engine: {cause}");
        self.phase = Phase::Stopped;

        if let Err(e) = self.shutdown() {
            error!(node_id = self.config.node; "engine stopped with an error: {e}");
        }

        cause
    }

    /// Tells every running thread to exit and joins it.
    ///
    /// # Returns
    /// The first error a server thread stopped with.
    fn shutdown(&mut self) -> Result<()> {
        let node = self.config.node;
        let mut exits: Vec<ThreadId> = self.handles.servers.iter().map(|(id, _)| *id).collect();
        if self.handles.helper.is_some() {
            exits.push(self.id_mapper.helper_thread_for(node)?);
        }
        if self.handles.postman.is_some() {
            exits.push(self.id_mapper.postman_thread_for(node)?);
        }

        for tid in exits {
            if self.outbox.send(Message::exit(tid)).is_err() {
                warn!(thread_id = tid; "outbound queue closed before stopping thread");
            }
        }

        let mut result = Ok(());
        for (server_id, handle) in self.handles.servers.drain(..) {
            let joined = match handle.join() {
                Ok(res) => res.map_err(EngineErr::from),
                Err(_) => Err(EngineErr::ThreadPanicked(format!("server-{server_id}"))),
            };

            if let Err(e) = joined {
                error!(server_id = server_id; "server thread failed: {e}");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        if let Some(handle) = self.handles.helper.take() {
            if handle.join().is_err() && result.is_ok() {
                result = Err(EngineErr::ThreadPanicked("helper".into()));
            }
        }

        if let Some(handle) = self.handles.postman.take() {
            if handle.join().is_err() && result.is_ok() {
                result = Err(EngineErr::ThreadPanicked("postman".into()));
            }
        }

        result
    }

    fn run_workers(&mut self, task: &MlTask, spec: &mut WorkerSpec) -> Result<()> {
        let node = self.config.node;

        let workers = spec.local_workers(node).to_vec();
        for worker_id in workers {
            let tid = self.id_mapper.allocate_worker_thread(node)?;
            spec.bind(worker_id, tid);
            self.mailboxes.register(tid, self.helper_tx.clone());
        }

        let tids = spec.all_thread_ids();
        for &model_id in task.tables() {
            self.init_table(model_id, &tids)?;
        }

        let threads = spec.local_threads(node);
        if threads.is_empty() {
            return Ok(());
        }

        let tables: HashMap<_, _> = task
            .tables()
            .iter()
            .filter_map(|id| self.tables.get(id).map(|pm| (*id, pm.clone())))
            .collect();
        let tables = Arc::new(tables);
        let barrier = Arc::new(Barrier::new(threads.len()));

        info!(node_id = node, workers = threads.len(); "running task");

        thread::scope(|s| -> Result<()> {
            let mut handles = Vec::with_capacity(threads.len());

            for &thread_id in threads {
                let info = Info {
                    thread_id,
                    worker_id: spec.worker_for_thread(thread_id).unwrap_or_default(),
                    node_id: node,
                    num_workers: spec.num_workers(),
                    tables: tables.clone(),
                    outbox: self.outbox.clone(),
                    callbacks: self.callbacks.clone(),
                    barrier: barrier.clone(),
                };
                let lambda = task.lambda();

                let handle = thread::Builder::new()
                    .name(format!("worker-{thread_id}"))
                    .spawn_scoped(s, move || lambda(&info))?;
                handles.push((thread_id, handle));
            }

            let mut result = Ok(());
            for (thread_id, handle) in handles {
                let joined = match handle.join() {
                    Ok(res) => res,
                    Err(_) => Err(EngineErr::ThreadPanicked(format!("worker-{thread_id}"))),
                };

                if let Err(e) = joined {
                    error!(thread_id = thread_id; "worker thread failed: {e}");
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }

            result
        })
    }

    fn release_workers(&mut self, spec: &WorkerSpec) {
        let node = self.config.node;

        for &tid in spec.local_threads(node) {
            self.id_mapper.deallocate_worker_thread(node, tid);
            self.mailboxes.deregister(tid);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("engine stopped with an error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn failed_start_stops_the_threads_already_running() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();

        // Only the postman and the helper made it before the failure.
        let postman = engine.postman.take().unwrap();
        engine.handles.postman = Some(postman.spawn().unwrap());
        let helper = engine.helper.take().unwrap();
        engine.handles.helper = Some(helper.spawn().unwrap());

        let cause = EngineErr::Io(io::Error::other("no more threads"));
        let err = engine.abort_start(cause);

        assert!(matches!(err, EngineErr::Io(_)));
        assert_eq!(engine.phase(), Phase::Stopped);
        assert!(engine.handles.postman.is_none());
        assert!(engine.handles.helper.is_none());

        let task = MlTask::new(|_| Ok(()));
        assert!(matches!(
            engine.run(&task),
            Err(EngineErr::InvalidPhase {
                actual: Phase::Stopped,
                ..
            })
        ));
        assert!(engine.stop().is_ok());
    }
}
