use std::ops::Range;

use comms::{Key, ThreadId, specs::table::UnroutedPolicy};
use log::warn;

use super::PartitionManager;
use crate::error::PartitionErr;

/// Assigns contiguous, half open key ranges to shards.
#[derive(Debug, Clone)]
pub struct RangePartitionManager {
    ranges: Vec<(ThreadId, Range<Key>)>,
    server_ids: Vec<ThreadId>,
    unrouted: UnroutedPolicy,
}

impl RangePartitionManager {
    /// Creates a new `RangePartitionManager`.
    ///
    /// # Arguments
    /// * `ranges` - The keys of every shard, checked in this order, the first match wins.
    /// * `unrouted` - What to do with keys outside of every range.
    ///
    /// # Returns
    /// A new `RangePartitionManager` instance or `NoShards` if `ranges` is empty.
    pub fn new(
        ranges: Vec<(ThreadId, Range<Key>)>,
        unrouted: UnroutedPolicy,
    ) -> Result<Self, PartitionErr> {
        if ranges.is_empty() {
            return Err(PartitionErr::NoShards);
        }

        let mut server_ids: Vec<_> = ranges.iter().map(|(server_id, _)| *server_id).collect();
        server_ids.sort_unstable();
        server_ids.dedup();

        Ok(Self {
            ranges,
            server_ids,
            unrouted,
        })
    }

    /// Splits `[0, key_space)` into one contiguous range per server, as even as possible.
    ///
    /// # Arguments
    /// * `server_ids` - The shards, in the order their ranges follow each other.
    /// * `key_space` - The amount of keys of the table.
    /// * `unrouted` - What to do with keys outside of `[0, key_space)`.
    pub fn even(
        server_ids: &[ThreadId],
        key_space: Key,
        unrouted: UnroutedPolicy,
    ) -> Result<Self, PartitionErr> {
        let n = server_ids.len() as u128;
        let bound = |i: u128| (key_space as u128 * i / n.max(1)) as Key;

        let ranges = server_ids
            .iter()
            .zip(0..)
            .map(|(&server_id, i)| (server_id, bound(i)..bound(i + 1)))
            .collect();

        Self::new(ranges, unrouted)
    }

    pub fn ranges(&self) -> &[(ThreadId, Range<Key>)] {
        &self.ranges
    }
}

impl PartitionManager for RangePartitionManager {
    fn server_ids(&self) -> &[ThreadId] {
        &self.server_ids
    }

    fn route(&self, key: Key) -> Result<Option<ThreadId>, PartitionErr> {
        let owner = self
            .ranges
            .iter()
            .find(|(_, range)| range.contains(&key))
            .map(|(server_id, _)| *server_id);

        match (owner, self.unrouted) {
            (Some(server_id), _) => Ok(Some(server_id)),
            (None, UnroutedPolicy::Reject) => Err(PartitionErr::UnroutedKey(key)),
            (None, UnroutedPolicy::Drop) => {
                warn!(key = key; "dropping a key outside of every range");
                Ok(None)
            }
        }
    }

    fn range_of(&self, server_id: ThreadId) -> Option<Range<Key>> {
        self.ranges
            .iter()
            .find(|(id, _)| *id == server_id)
            .map(|(_, range)| range.clone())
    }
}
