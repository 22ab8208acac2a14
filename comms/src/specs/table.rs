use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::Key;

/// The specification of a table's consistency model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencySpec {
    Asp,
    Bsp,
    Ssp { staleness: u32 },
}

/// The specification of the per shard storage of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageSpec {
    Map,
    Dense,
}

/// What the range partitioning does with a key outside of every range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnroutedPolicy {
    #[default]
    Reject,
    Drop,
}

/// The specification of how a table's keys are spread across the server threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionSpec {
    Range {
        key_space: Key,
        #[serde(default)]
        unrouted: UnroutedPolicy,
    },
    Hash {
        virtual_nodes: NonZeroUsize,
    },
}

/// The specification of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub consistency: ConsistencySpec,
    pub storage: StorageSpec,
    pub partition: PartitionSpec,
}
