use std::ops::Range;

use comms::{Key, Val};

use super::{Result, StorageErr, Store, store::check_sizes};

/// A contiguous store holding every key of a range, meant for range partitioned tables.
#[derive(Debug)]
pub struct DenseStore {
    range: Range<Key>,
    params: Box<[Val]>,
}

impl DenseStore {
    /// Creates a new `DenseStore`.
    ///
    /// # Arguments
    /// * `range` - The keys this store holds, every parameter starts at `0`.
    ///
    /// # Returns
    /// A new `DenseStore` or `Capacity` if the range is too large to allocate.
    pub fn new(range: Range<Key>) -> Result<Self> {
        let len = range.end.saturating_sub(range.start);
        let too_large = || StorageErr::Capacity { len };

        let n = usize::try_from(len).map_err(|_| too_large())?;
        let mut params = Vec::new();
        params.try_reserve_exact(n).map_err(|_| too_large())?;
        params.resize(n, 0.);

        Ok(Self {
            range,
            params: params.into_boxed_slice(),
        })
    }

    /// Maps `key` to its position in the inner buffer.
    fn index(&self, key: Key) -> Result<usize> {
        if !self.range.contains(&key) {
            return Err(StorageErr::KeyOutOfRange {
                key,
                range: self.range.clone(),
            });
        }

        Ok((key - self.range.start) as usize)
    }
}

impl Store for DenseStore {
    fn add(&mut self, keys: &[Key], vals: &[Val]) -> Result<()> {
        check_sizes(keys, vals)?;

        let idxs = keys
            .iter()
            .map(|&key| self.index(key))
            .collect::<Result<Vec<_>>>()?;

        for (idx, val) in idxs.into_iter().zip(vals) {
            self.params[idx] += val;
        }

        Ok(())
    }

    fn get(&self, keys: &[Key]) -> Result<Vec<Val>> {
        keys.iter()
            .map(|&key| self.index(key).map(|idx| self.params[idx]))
            .collect()
    }

    fn len(&self) -> usize {
        self.params.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_the_whole_range() {
        let store = DenseStore::new(10..20).unwrap();
        assert_eq!(store.len(), 10);
        assert_eq!(store.get(&[10, 19]).unwrap(), vec![0., 0.]);
    }

    #[test]
    fn adds_accumulate_within_range() {
        let mut store = DenseStore::new(10..20).unwrap();

        store.add(&[10, 15], &[1.0, 2.0]).unwrap();
        store.add(&[15], &[3.0]).unwrap();

        assert_eq!(store.get(&[15, 10, 11]).unwrap(), vec![5.0, 1.0, 0.0]);
    }

    #[test]
    fn out_of_range_add_applies_nothing() {
        let mut store = DenseStore::new(10..20).unwrap();

        let err = store.add(&[12, 20], &[1.0, 1.0]).unwrap_err();
        assert_eq!(
            err,
            StorageErr::KeyOutOfRange {
                key: 20,
                range: 10..20
            }
        );
        assert_eq!(store.get(&[12]).unwrap(), vec![0.]);
    }

    #[test]
    fn unallocatable_range_is_an_error() {
        let err = DenseStore::new(0..Key::MAX).unwrap_err();
        assert_eq!(err, StorageErr::Capacity { len: Key::MAX });
    }

    #[test]
    fn out_of_range_get_fails() {
        let store = DenseStore::new(0..4).unwrap();
        assert!(store.get(&[3, 4]).is_err());
    }
}
