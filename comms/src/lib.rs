//! The messages exchanged between worker and server threads, their binary encoding and a framed async
//! channel to move them across any byte stream.

mod deserialize;
pub mod msg;
mod receiver;
mod sender;
mod serialize;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use deserialize::Deserialize;
pub use msg::{Flag, Key, Message, Meta, ModelId, Payload, ThreadId, Val};
pub use receiver::OnoReceiver;
pub use sender::OnoSender;
pub use serialize::Serialize;

/// Every frame is prefixed with its body length as a big endian `FrameLen`.
type FrameLen = u64;
const FRAME_HEADER_SIZE: usize = size_of::<FrameLen>();

/// The largest frame body a receiver accepts unless told otherwise, 256 MiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 << 20;

/// Splits a byte stream into the two ends of a message channel.
///
/// # Arguments
/// * `rx` - Where frames are read from.
/// * `tx` - Where frames are written to.
///
/// # Returns
/// The receiving end, accepting frames up to `DEFAULT_MAX_FRAME_LEN`, and the sending end.
pub fn channel<R, W>(rx: R, tx: W) -> (OnoReceiver<R>, OnoSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (
        OnoReceiver::new(rx, DEFAULT_MAX_FRAME_LEN),
        OnoSender::new(tx),
    )
}
