use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Deserialize, FRAME_HEADER_SIZE, FrameLen};

/// Reads length prefixed frames from a byte stream.
pub struct OnoReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> OnoReceiver<R> {
    pub(super) fn new(rx: R, max_frame_len: usize) -> Self {
        Self {
            rx,
            buf: Vec::new(),
            max_frame_len,
        }
    }

    /// Replaces the largest frame body this receiver accepts.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Waits for the next frame and decodes it from the receiver's own buffer.
    ///
    /// # Returns
    /// The decoded value, or an `io::Error` if the stream failed or the frame is malformed or too large.
    pub async fn recv<'a, T: Deserialize<'a>>(&'a mut self) -> io::Result<T> {
        let Self {
            rx,
            buf,
            max_frame_len,
        } = self;

        read_frame(rx, buf, *max_frame_len).await?;
        T::deserialize(buf)
    }

    /// Waits for the next frame and decodes it from `buf`.
    ///
    /// # Arguments
    /// * `buf` - Where the frame is read into, the returned value may borrow from it.
    ///
    /// # Returns
    /// The decoded value, or an `io::Error` if the stream failed or the frame is malformed or too large.
    pub async fn recv_into<'buf, T>(&mut self, buf: &'buf mut Vec<u8>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
    {
        read_frame(&mut self.rx, buf, self.max_frame_len).await?;
        T::deserialize(buf)
    }
}

async fn read_frame<R>(rx: &mut R, buf: &mut Vec<u8>, max_frame_len: usize) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0; FRAME_HEADER_SIZE];
    rx.read_exact(&mut header).await?;

    let len = FrameLen::from_be_bytes(header);
    let len = usize::try_from(len)
        .ok()
        .filter(|&len| len <= max_frame_len)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds the limit of {max_frame_len}"),
            )
        })?;

    buf.clear();
    buf.resize(len, 0);
    rx.read_exact(buf).await?;
    Ok(())
}
