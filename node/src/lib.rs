//! Runs a parameter server node: the thread id layout, the in process postman and the engine that starts
//! shards and worker threads and runs training tasks on them.

pub mod config;
pub mod engine;
mod error;
pub mod id_mapper;
pub mod postman;
pub mod task;
pub mod worker_spec;

pub use config::{AppConfig, EngineConfig};
pub use engine::{Engine, Phase};
pub use error::{EngineErr, Result};
pub use id_mapper::IdMapper;
pub use task::{Info, MlTask};
pub use worker_spec::WorkerSpec;
