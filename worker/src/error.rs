use std::{error::Error, fmt};

use comms::{Key, ModelId, ThreadId};

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, ClientErr>;

/// Failures while splitting a request across shards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionErr {
    /// A key falls outside of every configured range.
    UnroutedKey(Key),
    /// The key and value lists of an add differ in length.
    SizeMismatch { keys: usize, vals: usize },
    /// A partition manager was configured without shards.
    NoShards,
}

impl fmt::Display for PartitionErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionErr::UnroutedKey(key) => write!(f, "key {key} is not owned by any shard"),
            PartitionErr::SizeMismatch { keys, vals } => {
                write!(f, "got {keys} keys but {vals} values")
            }
            PartitionErr::NoShards => write!(f, "a partition needs at least one shard"),
        }
    }
}

impl Error for PartitionErr {}

/// Misuse of the request correlation of a `CallbackRunner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackErr {
    /// A new request was issued while the previous one is still waiting for replies.
    RequestInFlight { app_thread: ThreadId, model_id: ModelId },
    /// A reply arrived for a pair that never issued a request.
    NoRequest { app_thread: ThreadId, model_id: ModelId },
    /// A reply arrived after every expected reply of the request.
    TooManyResponses { app_thread: ThreadId, model_id: ModelId },
}

impl fmt::Display for CallbackErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackErr::RequestInFlight {
                app_thread,
                model_id,
            } => write!(
                f,
                "thread {app_thread} already has a request in flight on model {model_id}"
            ),
            CallbackErr::NoRequest {
                app_thread,
                model_id,
            } => write!(
                f,
                "reply for thread {app_thread} on model {model_id} without a request"
            ),
            CallbackErr::TooManyResponses {
                app_thread,
                model_id,
            } => write!(
                f,
                "unexpected extra reply for thread {app_thread} on model {model_id}"
            ),
        }
    }
}

impl Error for CallbackErr {}

/// Failures of a `KvClientTable` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientErr {
    Partition(PartitionErr),
    Callback(CallbackErr),
    /// The outbound queue has no receiver anymore.
    Disconnected,
}

impl fmt::Display for ClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientErr::Partition(e) => write!(f, "partition error: {e}"),
            ClientErr::Callback(e) => write!(f, "callback error: {e}"),
            ClientErr::Disconnected => write!(f, "the outbound queue is closed"),
        }
    }
}

impl Error for ClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientErr::Partition(e) => Some(e),
            ClientErr::Callback(e) => Some(e),
            ClientErr::Disconnected => None,
        }
    }
}

impl From<PartitionErr> for ClientErr {
    fn from(value: PartitionErr) -> Self {
        Self::Partition(value)
    }
}

impl From<CallbackErr> for ClientErr {
    fn from(value: CallbackErr) -> Self {
        Self::Callback(value)
    }
}
