use comms::{Key, Val};

use super::Result;

/// The parameters of one table on one shard.
///
/// A store is exclusively owned by the consistency model of its table, which in turn only runs inside
/// of its server thread's dispatch loop, so implementors need no interior locking.
pub trait Store: Send {
    /// Adds `vals[i]` onto the parameter behind `keys[i]`.
    ///
    /// # Arguments
    /// * `keys` - The keys to update.
    /// * `vals` - The deltas, one per key.
    ///
    /// # Returns
    /// An error if the lists differ in length or a key can't be held by this store, in which case
    /// nothing was applied.
    fn add(&mut self, keys: &[Key], vals: &[Val]) -> Result<()>;

    /// Reads the current value of every key, in the same order.
    ///
    /// # Arguments
    /// * `keys` - The keys to read.
    ///
    /// # Returns
    /// One value per key or an error if a key can't be held by this store.
    fn get(&self, keys: &[Key]) -> Result<Vec<Val>>;

    /// Returns the amount of parameters currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Checks that an add carries one value per key.
pub(super) fn check_sizes(keys: &[Key], vals: &[Val]) -> Result<()> {
    if keys.len() != vals.len() {
        return Err(super::StorageErr::SizeMismatch {
            keys: keys.len(),
            vals: vals.len(),
        });
    }

    Ok(())
}
