//! Server side of the parameter server: per shard storage, consistency models and the dispatch loop.

mod error;
pub mod service;
pub mod storage;
pub mod synchronization;

pub use error::{Result, ServerErr};
pub use service::{ModelBuilder, ServerThread};
