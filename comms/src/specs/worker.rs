use serde::{Deserialize, Serialize};

/// How many worker threads a task wants on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAlloc {
    pub node_id: u32,
    pub workers: usize,
}
