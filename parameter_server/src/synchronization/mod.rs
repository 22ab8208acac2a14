mod asp;
mod bsp;
mod model;
mod pending;
mod progress;
mod ssp;

pub use asp::Asp;
pub use bsp::Bsp;
pub use model::{ConsistencyModel, Model, ModelCore};
pub use pending::PendingBuffer;
pub use progress::ProgressTracker;
pub use ssp::Ssp;
