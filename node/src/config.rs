use std::{fs, path::Path};

use comms::specs::{
    table::{ConsistencySpec, PartitionSpec, StorageSpec, TableSpec, UnroutedPolicy},
    worker::WorkerAlloc,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where this process sits in the cluster and how many shards each node serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub node: u32,
    pub nodes: Vec<u32>,
    pub server_threads_per_node: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node: 0,
            nodes: vec![0],
            server_threads_per_node: 2,
        }
    }
}

/// The configuration of the demo application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub table: TableSpec,
    pub workers: Vec<WorkerAlloc>,
    pub iterations: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            table: TableSpec {
                consistency: ConsistencySpec::Ssp { staleness: 1 },
                storage: StorageSpec::Map,
                partition: PartitionSpec::Range {
                    key_space: 16,
                    unrouted: UnroutedPolicy::Reject,
                },
            },
            workers: vec![WorkerAlloc {
                node_id: 0,
                workers: 3,
            }],
            iterations: 10,
        }
    }
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON config file, missing fields take their default.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
