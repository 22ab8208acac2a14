//! Client side of the parameter server: key partitioning, reply correlation and the per table handle
//! application threads train through.

pub mod callback;
mod error;
pub mod helper;
pub mod kv_table;
pub mod partition;

pub use callback::CallbackRunner;
pub use error::{CallbackErr, ClientErr, PartitionErr, Result};
pub use helper::HelperThread;
pub use kv_table::KvClientTable;
pub use partition::{HashPartitionManager, PartitionManager, RangePartitionManager};
