use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{FRAME_HEADER_SIZE, FrameLen, Serialize};

/// Writes length prefixed frames onto a byte stream.
pub struct OnoSender<W: AsyncWrite + Unpin> {
    tx: W,
    header: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            header: Vec::new(),
        }
    }

    /// Writes `msg` as a single frame and flushes the stream.
    ///
    /// # Arguments
    /// * `msg` - What to send.
    ///
    /// # Returns
    /// An `io::Error` if the stream failed.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        self.write_frame(msg).await?;
        self.tx.flush().await
    }

    /// Writes every message of `msgs` as its own frame and flushes the stream once at the end.
    ///
    /// # Arguments
    /// * `msgs` - What to send, in order.
    ///
    /// # Returns
    /// The amount of frames written, or an `io::Error` if the stream failed.
    pub async fn send_all<'a, T, I>(&mut self, msgs: I) -> io::Result<usize>
    where
        T: Serialize<'a> + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut written = 0;
        for msg in msgs {
            self.write_frame(msg).await?;
            written += 1;
        }

        self.tx.flush().await?;
        Ok(written)
    }

    /// Consumes the sender and returns the underlying stream.
    pub fn into_inner(self) -> W {
        self.tx
    }

    async fn write_frame<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self { tx, header } = self;

        header.clear();
        header.resize(FRAME_HEADER_SIZE, 0);

        // The serializer fills the head after the length prefix and may hand back a tail to write as is.
        let tail = msg.serialize(header);
        let body_len = header.len() - FRAME_HEADER_SIZE + tail.map_or(0, <[u8]>::len);
        header[..FRAME_HEADER_SIZE].copy_from_slice(&(body_len as FrameLen).to_be_bytes());

        tx.write_all(header).await?;
        if let Some(tail) = tail {
            tx.write_all(tail).await?;
        }

        Ok(())
    }
}
