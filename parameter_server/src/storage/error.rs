use std::{
    error::Error,
    fmt::{self, Display},
    ops::Range,
};

use comms::Key;

/// The specific result type for the storage module.
pub type Result<T> = std::result::Result<T, StorageErr>;

/// Error returned by a `Store` whenever a request can't be applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageErr {
    /// The key and value lists of an add differ in length.
    SizeMismatch { keys: usize, vals: usize },
    /// A dense store was asked for a key outside of the range it holds.
    KeyOutOfRange { key: Key, range: Range<Key> },
    /// A dense store can't allocate one parameter per key of its range.
    Capacity { len: u64 },
}

impl Display for StorageErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageErr::SizeMismatch { keys, vals } => {
                write!(f, "store error: got {keys} keys but {vals} values")
            }
            StorageErr::KeyOutOfRange { key, range } => {
                write!(f, "store error: key {key} is outside of {range:?}")
            }
            StorageErr::Capacity { len } => {
                write!(f, "store error: can't allocate {len} dense parameters")
            }
        }
    }
}

impl Error for StorageErr {}
