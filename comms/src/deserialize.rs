use std::io;

/// Types that can be read back from the wire.
pub trait Deserialize<'a>: Sized {
    /// Deserializes an instance from `buf`.
    ///
    /// # Arguments
    /// * `buf` - The full frame of bytes, without the length prefix.
    ///
    /// # Returns
    /// The decoded value or an `io::Error` of kind `InvalidData`.
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}
