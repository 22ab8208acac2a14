mod dense;
mod error;
mod map;
mod store;

pub use dense::DenseStore;
pub use error::{Result, StorageErr};
pub use map::MapStore;
pub use store::Store;
