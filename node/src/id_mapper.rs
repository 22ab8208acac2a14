use std::collections::{BTreeMap, BTreeSet};

use comms::ThreadId;

use crate::error::{EngineErr, Result};

/// Every node owns the thread ids `[node_id * MAX_THREADS_PER_NODE, (node_id + 1) * MAX_THREADS_PER_NODE)`.
pub const MAX_THREADS_PER_NODE: u32 = 1000;
/// Offsets below this one are server threads.
pub const HELPER_OFFSET: u32 = 50;
pub const DRIVER_OFFSET: u32 = 51;
pub const POSTMAN_OFFSET: u32 = 52;
/// Offsets from here on are worker threads.
pub const WORKER_OFFSET: u32 = 100;

/// Lays out the thread ids of every node of the cluster.
///
/// Server, helper, driver and postman ids are fixed per node, worker ids are handed out and taken back as
/// tasks come and go.
#[derive(Debug)]
pub struct IdMapper {
    servers: BTreeMap<u32, Vec<ThreadId>>,
    workers: BTreeMap<u32, BTreeSet<ThreadId>>,
}

impl IdMapper {
    /// Creates a new `IdMapper`.
    ///
    /// # Arguments
    /// * `nodes` - The ids of every node of the cluster.
    /// * `server_threads_per_node` - How many shards each node runs, in `[1, HELPER_OFFSET)`.
    ///
    /// # Returns
    /// A new `IdMapper` or a `Config` error if the amount of server threads doesn't fit the layout.
    pub fn new(nodes: &[u32], server_threads_per_node: u32) -> Result<Self> {
        if !(1..HELPER_OFFSET).contains(&server_threads_per_node) {
            return Err(EngineErr::Config(format!(
                "server threads per node must be in [1, {HELPER_OFFSET}), got {server_threads_per_node}"
            )));
        }

        if let Some(&node_id) = nodes
            .iter()
            .find(|&&node_id| node_id >= u32::MAX / MAX_THREADS_PER_NODE)
        {
            return Err(EngineErr::Config(format!("node id {node_id} is too large")));
        }

        let servers = nodes
            .iter()
            .map(|&node_id| {
                let base = node_id * MAX_THREADS_PER_NODE;
                let tids: Vec<ThreadId> = (base..base + server_threads_per_node).collect();
                (node_id, tids)
            })
            .collect();

        let workers = nodes.iter().map(|&node_id| (node_id, BTreeSet::new())).collect();

        Ok(Self { servers, workers })
    }

    /// Returns the node owning `tid`.
    pub fn node_for_thread(tid: ThreadId) -> u32 {
        tid / MAX_THREADS_PER_NODE
    }

    pub fn nodes(&self) -> impl Iterator<Item = u32> + '_ {
        self.servers.keys().copied()
    }

    pub fn server_threads_for(&self, node_id: u32) -> Result<&[ThreadId]> {
        self.servers
            .get(&node_id)
            .map(Vec::as_slice)
            .ok_or(EngineErr::UnknownNode(node_id))
    }

    /// Returns the server threads of every node, in ascending order.
    pub fn all_server_threads(&self) -> Vec<ThreadId> {
        self.servers.values().flatten().copied().collect()
    }

    pub fn helper_thread_for(&self, node_id: u32) -> Result<ThreadId> {
        self.fixed_thread(node_id, HELPER_OFFSET)
    }

    pub fn driver_thread_for(&self, node_id: u32) -> Result<ThreadId> {
        self.fixed_thread(node_id, DRIVER_OFFSET)
    }

    pub fn postman_thread_for(&self, node_id: u32) -> Result<ThreadId> {
        self.fixed_thread(node_id, POSTMAN_OFFSET)
    }

    /// Hands out the lowest free worker thread id of `node_id`.
    pub fn allocate_worker_thread(&mut self, node_id: u32) -> Result<ThreadId> {
        let taken = self
            .workers
            .get_mut(&node_id)
            .ok_or(EngineErr::UnknownNode(node_id))?;

        let base = node_id * MAX_THREADS_PER_NODE;
        let tid = (base + WORKER_OFFSET..base + MAX_THREADS_PER_NODE)
            .find(|tid| !taken.contains(tid))
            .ok_or(EngineErr::OutOfThreadIds { node_id })?;

        taken.insert(tid);
        Ok(tid)
    }

    /// Gives `tid` back to `node_id`.
    ///
    /// # Returns
    /// `false` if `tid` wasn't allocated there.
    pub fn deallocate_worker_thread(&mut self, node_id: u32, tid: ThreadId) -> bool {
        self.workers
            .get_mut(&node_id)
            .is_some_and(|taken| taken.remove(&tid))
    }

    /// Returns the allocated worker threads of `node_id`, in ascending order.
    pub fn worker_threads_for(&self, node_id: u32) -> Vec<ThreadId> {
        self.workers
            .get(&node_id)
            .map(|taken| taken.iter().copied().collect())
            .unwrap_or_default()
    }

    fn fixed_thread(&self, node_id: u32, offset: u32) -> Result<ThreadId> {
        if !self.servers.contains_key(&node_id) {
            return Err(EngineErr::UnknownNode(node_id));
        }

        Ok(node_id * MAX_THREADS_PER_NODE + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_threads_follow_the_layout() {
        let mapper = IdMapper::new(&[0, 2], 3).unwrap();

        assert_eq!(mapper.server_threads_for(2).unwrap(), &[2000, 2001, 2002]);
        assert_eq!(mapper.all_server_threads(), vec![0, 1, 2, 2000, 2001, 2002]);
        assert_eq!(mapper.helper_thread_for(0).unwrap(), 50);
        assert_eq!(mapper.driver_thread_for(2).unwrap(), 2051);
        assert_eq!(mapper.postman_thread_for(2).unwrap(), 2052);
        assert_eq!(IdMapper::node_for_thread(2101), 2);
        assert!(matches!(
            mapper.helper_thread_for(1),
            Err(EngineErr::UnknownNode(1))
        ));
    }

    #[test]
    fn worker_ids_are_reused_after_deallocation() {
        let mut mapper = IdMapper::new(&[1], 1).unwrap();

        assert_eq!(mapper.allocate_worker_thread(1).unwrap(), 1100);
        assert_eq!(mapper.allocate_worker_thread(1).unwrap(), 1101);
        assert_eq!(mapper.allocate_worker_thread(1).unwrap(), 1102);

        assert!(mapper.deallocate_worker_thread(1, 1101));
        assert!(!mapper.deallocate_worker_thread(1, 1101));
        assert_eq!(mapper.worker_threads_for(1), vec![1100, 1102]);

        assert_eq!(mapper.allocate_worker_thread(1).unwrap(), 1101);
    }

    #[test]
    fn worker_ids_run_out() {
        let mut mapper = IdMapper::new(&[0], 1).unwrap();

        for _ in WORKER_OFFSET..MAX_THREADS_PER_NODE {
            mapper.allocate_worker_thread(0).unwrap();
        }

        assert!(matches!(
            mapper.allocate_worker_thread(0),
            Err(EngineErr::OutOfThreadIds { node_id: 0 })
        ));
    }

    #[test]
    fn server_thread_count_must_fit_the_layout() {
        assert!(IdMapper::new(&[0], 0).is_err());
        assert!(IdMapper::new(&[0], HELPER_OFFSET).is_err());
        assert!(IdMapper::new(&[0], HELPER_OFFSET - 1).is_ok());
    }
}
