use std::{error::Error, fmt};

use comms::{Flag, ModelId, ThreadId};

use crate::storage::StorageErr;

/// The parameter server's result type.
pub type Result<T> = std::result::Result<T, ServerErr>;

/// Failures that stop a server thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerErr {
    /// A message named a model that was never registered on this server.
    UnknownModel { server: ThreadId, model_id: ModelId },
    /// A message lacks the payload its flag requires.
    MissingPayload { flag: Flag, what: &'static str },
    /// The store refused the request.
    Storage(StorageErr),
    /// A table spec can't be turned into a model.
    InvalidSpec(String),
}

impl fmt::Display for ServerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerErr::UnknownModel { server, model_id } => {
                write!(f, "server {server} has no model with id {model_id}")
            }
            ServerErr::MissingPayload { flag, what } => {
                write!(f, "a {flag:?} message arrived without {what}")
            }
            ServerErr::Storage(e) => write!(f, "storage error: {e}"),
            ServerErr::InvalidSpec(text) => write!(f, "invalid table spec: {text}"),
        }
    }
}

impl Error for ServerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServerErr::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageErr> for ServerErr {
    fn from(value: StorageErr) -> Self {
        Self::Storage(value)
    }
}
