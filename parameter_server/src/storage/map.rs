use std::collections::HashMap;

use comms::{Key, Val};

use super::{Result, Store, store::check_sizes};

/// A sparse store, parameters that were never written read as `0`.
#[derive(Debug, Default)]
pub struct MapStore {
    params: HashMap<Key, Val>,
}

impl MapStore {
    /// Creates a new empty `MapStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MapStore {
    fn add(&mut self, keys: &[Key], vals: &[Val]) -> Result<()> {
        check_sizes(keys, vals)?;

        for (&key, &val) in keys.iter().zip(vals) {
            *self.params.entry(key).or_insert(0.) += val;
        }

        Ok(())
    }

    fn get(&self, keys: &[Key]) -> Result<Vec<Val>> {
        let vals = keys
            .iter()
            .map(|key| self.params.get(key).copied().unwrap_or(0.))
            .collect();

        Ok(vals)
    }

    fn len(&self) -> usize {
        self.params.len()
    }
}
