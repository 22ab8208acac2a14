/// Types that can be written onto the wire.
pub trait Serialize<'a> {
    /// Serializes `self` into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The buffer to write the leading bytes into.
    ///
    /// # Returns
    /// An optional trailing slice that should be written right after `buf` without copying it.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
