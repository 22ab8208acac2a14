use std::{collections::BTreeMap, num::NonZeroUsize};

use comms::{Key, ThreadId};

use super::{PartitionManager, murmur3_x86_32};
use crate::error::PartitionErr;

const SEED: u32 = 7;

/// The amount of points every shard gets on the ring unless told otherwise.
pub const DEFAULT_VIRTUAL_NODES: usize = 100;

/// Consistent hashing: every shard owns several points of a 32 bit ring and a key belongs to the first
/// point at or after its own hash, wrapping around to the smallest point.
#[derive(Debug, Clone)]
pub struct HashPartitionManager {
    ring: BTreeMap<u32, ThreadId>,
    server_ids: Vec<ThreadId>,
}

impl HashPartitionManager {
    /// Creates a new `HashPartitionManager`.
    ///
    /// # Arguments
    /// * `server_ids` - The shards to place on the ring.
    /// * `virtual_nodes` - The amount of points per shard.
    ///
    /// # Returns
    /// A new `HashPartitionManager` instance or `NoShards` if `server_ids` is empty.
    pub fn new(server_ids: &[ThreadId], virtual_nodes: NonZeroUsize) -> Result<Self, PartitionErr> {
        if server_ids.is_empty() {
            return Err(PartitionErr::NoShards);
        }

        let mut ring = BTreeMap::new();
        for &server_id in server_ids {
            for vnode in 0..virtual_nodes.get() {
                let point = format!("shard-{server_id}#vnode-{vnode}");
                ring.insert(murmur3_x86_32(point.as_bytes(), SEED), server_id);
            }
        }

        let mut server_ids = server_ids.to_vec();
        server_ids.sort_unstable();
        server_ids.dedup();

        Ok(Self { ring, server_ids })
    }

    /// Returns the amount of distinct points on the ring.
    pub fn points(&self) -> usize {
        self.ring.len()
    }

    fn hash_key(key: Key) -> u32 {
        murmur3_x86_32(key.to_string().as_bytes(), SEED)
    }
}

impl PartitionManager for HashPartitionManager {
    fn server_ids(&self) -> &[ThreadId] {
        &self.server_ids
    }

    fn route(&self, key: Key) -> Result<Option<ThreadId>, PartitionErr> {
        let hash = Self::hash_key(key);

        let owner = self
            .ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, &server_id)| server_id);

        owner.map(Some).ok_or(PartitionErr::NoShards)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn ring(server_ids: &[ThreadId]) -> HashPartitionManager {
        let vnodes = NonZeroUsize::new(DEFAULT_VIRTUAL_NODES).unwrap();
        HashPartitionManager::new(server_ids, vnodes).unwrap()
    }

    #[test]
    fn key_goes_to_the_successor_point() {
        let pm = ring(&[0, 1, 2]);

        for key in [2, 9, 10_000] {
            let hash = HashPartitionManager::hash_key(key);
            let expected = match pm.ring.range(hash..).next() {
                Some((_, &server_id)) => server_id,
                None => *pm.ring.values().next().unwrap(),
            };
            assert_eq!(pm.route(key), Ok(Some(expected)));
        }
    }

    #[test]
    fn hash_past_the_last_point_wraps_around() {
        let pm = ring(&[4, 8]);
        let (&last, _) = pm.ring.iter().next_back().unwrap();
        let (_, &first_owner) = pm.ring.iter().next().unwrap();

        let key = (0..)
            .find(|&key| HashPartitionManager::hash_key(key) > last)
            .unwrap();
        assert_eq!(pm.route(key), Ok(Some(first_owner)));
    }

    #[test]
    fn every_shard_gets_keys() {
        let pm = ring(&[0, 1, 2]);
        let keys: Vec<Key> = (0..3000).collect();

        let sliced = pm.slice_keys(&keys).unwrap();
        assert_eq!(sliced.len(), 3);

        let counts: HashMap<_, _> = sliced.iter().map(|(id, ks)| (*id, ks.len())).collect();
        for count in counts.values() {
            assert!(*count > 300, "unbalanced ring: {counts:?}");
        }
    }

    #[test]
    fn ring_holds_every_virtual_node() {
        let pm = ring(&[0, 1]);
        assert!(pm.points() > 190);
        assert_eq!(pm.server_ids(), &[0, 1]);
    }

    #[test]
    fn no_shards_is_an_error() {
        let vnodes = NonZeroUsize::new(1).unwrap();
        assert_eq!(
            HashPartitionManager::new(&[], vnodes).unwrap_err(),
            PartitionErr::NoShards
        );
    }
}
