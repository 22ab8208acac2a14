use std::{error::Error, fmt, io};

use comms::ModelId;
use parameter_server::ServerErr;
use worker::ClientErr;

use crate::engine::Phase;

/// The node's result type.
pub type Result<T> = std::result::Result<T, EngineErr>;

/// Failures of the engine driving a node.
#[derive(Debug)]
pub enum EngineErr {
    /// An operation was called in the wrong lifecycle phase.
    InvalidPhase { expected: Phase, actual: Phase },
    /// A table spec can't be realized on this cluster.
    InvalidTable { model_id: ModelId, reason: String },
    /// A task or worker asked for a table that doesn't exist or isn't part of the task.
    UnknownTable(ModelId),
    /// A node id that isn't part of the cluster.
    UnknownNode(u32),
    /// Every worker thread id of a node is taken.
    OutOfThreadIds { node_id: u32 },
    /// A thread of the engine panicked.
    ThreadPanicked(String),
    Server(ServerErr),
    Client(ClientErr),
    /// The configuration is malformed or inconsistent.
    Config(String),
    Io(io::Error),
}

impl fmt::Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPhase { expected, actual } => {
                write!(f, "engine must be {expected:?} but is {actual:?}")
            }
            Self::InvalidTable { model_id, reason } => {
                write!(f, "invalid table {model_id}: {reason}")
            }
            Self::UnknownTable(model_id) => write!(f, "unknown table {model_id}"),
            Self::UnknownNode(node_id) => write!(f, "node {node_id} is not part of the cluster"),
            Self::OutOfThreadIds { node_id } => {
                write!(f, "node {node_id} has no worker thread ids left")
            }
            Self::ThreadPanicked(name) => write!(f, "thread {name} panicked"),
            Self::Server(e) => write!(f, "server error: {e}"),
            Self::Client(e) => write!(f, "client error: {e}"),
            Self::Config(msg) => write!(f, "invalid config: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for EngineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Server(e) => Some(e),
            Self::Client(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ServerErr> for EngineErr {
    fn from(value: ServerErr) -> Self {
        Self::Server(value)
    }
}

impl From<ClientErr> for EngineErr {
    fn from(value: ClientErr) -> Self {
        Self::Client(value)
    }
}

impl From<serde_json::Error> for EngineErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<EngineErr> for io::Error {
    fn from(value: EngineErr) -> Self {
        match value {
            EngineErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
