mod hash;
mod murmur;
mod range;

use std::{collections::BTreeMap, ops::Range};

use comms::{Key, ThreadId, Val};

pub use hash::{DEFAULT_VIRTUAL_NODES, HashPartitionManager};
pub use murmur::murmur3_x86_32;
pub use range::RangePartitionManager;

use crate::error::PartitionErr;

/// The keys of one shard, as produced by `PartitionManager::slice_keys`.
pub type KeySlice = (ThreadId, Vec<Key>);
/// The keys and values of one shard, as produced by `PartitionManager::slice_kvs`.
pub type KvSlice = (ThreadId, Vec<Key>, Vec<Val>);

/// Routes every key of a table to the server thread owning it.
///
/// Implementors are immutable once built, so a single instance is shared by every worker thread.
pub trait PartitionManager: Send + Sync {
    /// Returns the server threads holding a partition of the table, in ascending order.
    fn server_ids(&self) -> &[ThreadId];

    /// Returns the shard owning `key`.
    ///
    /// # Returns
    /// `Ok(None)` if the key must be silently skipped, or an error if it can't be routed.
    fn route(&self, key: Key) -> Result<Option<ThreadId>, PartitionErr>;

    /// Returns the contiguous keys owned by `server_id`, for partitions that have one.
    fn range_of(&self, _server_id: ThreadId) -> Option<Range<Key>> {
        None
    }

    /// Splits `keys` by owning shard.
    ///
    /// # Arguments
    /// * `keys` - The keys of a request.
    ///
    /// # Returns
    /// One entry per shard owning at least one key, sorted by shard id. Every routed key lands in exactly
    /// one entry and keeps its relative order.
    fn slice_keys(&self, keys: &[Key]) -> Result<Vec<KeySlice>, PartitionErr> {
        let mut sliced: BTreeMap<ThreadId, Vec<Key>> = BTreeMap::new();

        for &key in keys {
            if let Some(server_id) = self.route(key)? {
                sliced.entry(server_id).or_default().push(key);
            }
        }

        Ok(sliced.into_iter().collect())
    }

    /// Splits `keys` and their values by owning shard.
    ///
    /// # Arguments
    /// * `keys` - The keys of a request.
    /// * `vals` - One value per key.
    ///
    /// # Returns
    /// One entry per shard owning at least one key, sorted by shard id, or an error if the lists differ
    /// in length.
    fn slice_kvs(&self, keys: &[Key], vals: &[Val]) -> Result<Vec<KvSlice>, PartitionErr> {
        if keys.len() != vals.len() {
            return Err(PartitionErr::SizeMismatch {
                keys: keys.len(),
                vals: vals.len(),
            });
        }

        let mut sliced: BTreeMap<ThreadId, (Vec<Key>, Vec<Val>)> = BTreeMap::new();

        for (&key, &val) in keys.iter().zip(vals) {
            if let Some(server_id) = self.route(key)? {
                let (ks, vs) = sliced.entry(server_id).or_default();
                ks.push(key);
                vs.push(val);
            }
        }

        Ok(sliced
            .into_iter()
            .map(|(server_id, (ks, vs))| (server_id, ks, vs))
            .collect())
    }
}
