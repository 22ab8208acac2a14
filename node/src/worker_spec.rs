use std::collections::{BTreeMap, HashMap};

use comms::{ThreadId, specs::worker::WorkerAlloc};

/// Assigns cluster wide worker ids to a task's worker allocation and tracks which thread runs each worker.
#[derive(Debug, Default)]
pub struct WorkerSpec {
    worker_to_node: Vec<u32>,
    node_to_workers: BTreeMap<u32, Vec<u32>>,
    node_to_threads: BTreeMap<u32, Vec<ThreadId>>,
    worker_to_thread: HashMap<u32, ThreadId>,
    thread_to_worker: HashMap<ThreadId, u32>,
}

impl WorkerSpec {
    /// Creates a new `WorkerSpec`, worker ids are consecutive following the order of `allocs`.
    pub fn new(allocs: &[WorkerAlloc]) -> Self {
        let mut spec = Self::default();

        for alloc in allocs {
            for _ in 0..alloc.workers {
                let worker_id = spec.worker_to_node.len() as u32;
                spec.worker_to_node.push(alloc.node_id);
                spec.node_to_workers
                    .entry(alloc.node_id)
                    .or_default()
                    .push(worker_id);
            }
        }

        spec
    }

    pub fn num_workers(&self) -> usize {
        self.worker_to_node.len()
    }

    /// Returns the nodes running at least one worker.
    pub fn nodes(&self) -> impl Iterator<Item = u32> + '_ {
        self.node_to_workers.keys().copied()
    }

    pub fn node_for_worker(&self, worker_id: u32) -> Option<u32> {
        self.worker_to_node.get(worker_id as usize).copied()
    }

    pub fn has_local_workers(&self, node_id: u32) -> bool {
        self.node_to_workers
            .get(&node_id)
            .is_some_and(|workers| !workers.is_empty())
    }

    pub fn local_workers(&self, node_id: u32) -> &[u32] {
        self.node_to_workers
            .get(&node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the threads bound to the workers of `node_id`, in binding order.
    pub fn local_threads(&self, node_id: u32) -> &[ThreadId] {
        self.node_to_threads
            .get(&node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Records that `thread_id` runs `worker_id`.
    ///
    /// # Returns
    /// `false` if `worker_id` isn't part of this spec.
    pub fn bind(&mut self, worker_id: u32, thread_id: ThreadId) -> bool {
        let Some(node_id) = self.node_for_worker(worker_id) else {
            return false;
        };

        self.worker_to_thread.insert(worker_id, thread_id);
        self.thread_to_worker.insert(thread_id, worker_id);
        self.node_to_threads.entry(node_id).or_default().push(thread_id);
        true
    }

    pub fn thread_for_worker(&self, worker_id: u32) -> Option<ThreadId> {
        self.worker_to_thread.get(&worker_id).copied()
    }

    pub fn worker_for_thread(&self, thread_id: ThreadId) -> Option<u32> {
        self.thread_to_worker.get(&thread_id).copied()
    }

    /// Returns every bound thread, in ascending order.
    pub fn all_thread_ids(&self) -> Vec<ThreadId> {
        let mut tids: Vec<_> = self.thread_to_worker.keys().copied().collect();
        tids.sort_unstable();
        tids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(node_id: u32, workers: usize) -> WorkerAlloc {
        WorkerAlloc { node_id, workers }
    }

    #[test]
    fn worker_ids_follow_the_allocation_order() {
        let spec = WorkerSpec::new(&[alloc(1, 2), alloc(0, 3)]);

        assert_eq!(spec.num_workers(), 5);
        assert_eq!(spec.local_workers(1), &[0, 1]);
        assert_eq!(spec.local_workers(0), &[2, 3, 4]);
        assert_eq!(spec.node_for_worker(3), Some(0));
        assert!(spec.has_local_workers(0));
        assert!(!spec.has_local_workers(7));
        assert!(spec.local_workers(7).is_empty());
    }

    #[test]
    fn empty_allocations_have_no_local_workers() {
        let spec = WorkerSpec::new(&[alloc(0, 0)]);
        assert!(!spec.has_local_workers(0));
        assert_eq!(spec.num_workers(), 0);
    }

    #[test]
    fn binding_maps_both_ways() {
        let mut spec = WorkerSpec::new(&[alloc(0, 2)]);

        assert!(spec.bind(1, 101));
        assert!(spec.bind(0, 100));
        assert!(!spec.bind(5, 105));

        assert_eq!(spec.thread_for_worker(1), Some(101));
        assert_eq!(spec.worker_for_thread(100), Some(0));
        assert_eq!(spec.local_threads(0), &[101, 100]);
        assert_eq!(spec.all_thread_ids(), vec![100, 101]);
    }
}
