use std::io;

use bytemuck::AnyBitPattern;

use crate::{Deserialize, Serialize};

/// Identifies one scalar parameter.
pub type Key = u64;
/// The numeric type of every parameter.
pub type Val = f32;
/// Identifies a thread anywhere in the cluster, see the node's id mapper.
pub type ThreadId = u32;
/// Identifies a table (model) on every shard.
pub type ModelId = u32;

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();
const META_SIZE: usize = 4 * HEADER_SIZE;
const COUNT_SIZE: usize = size_of::<u64>();

const KEYS_KIND: Header = 0;
const VALUES_KIND: Header = 1;
const TIDS_KIND: Header = 2;

/// What a `Message` asks its receiver to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Get,
    Add,
    Clock,
    ResetWorker,
    Exit,
}

impl Flag {
    fn to_header(self) -> Header {
        match self {
            Flag::Get => 0,
            Flag::Add => 1,
            Flag::Clock => 2,
            Flag::ResetWorker => 3,
            Flag::Exit => 4,
        }
    }

    fn from_header(header: Header) -> io::Result<Self> {
        let flag = match header {
            0 => Flag::Get,
            1 => Flag::Add,
            2 => Flag::Clock,
            3 => Flag::ResetWorker,
            4 => Flag::Exit,
            other => return Message::invalid_data(format!("received an invalid flag {other}")),
        };

        Ok(flag)
    }
}

/// The routing header of a `Message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub sender: ThreadId,
    pub receiver: ThreadId,
    pub model_id: ModelId,
    pub flag: Flag,
}

/// A typed array carried by a `Message`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Keys(Vec<Key>),
    Values(Vec<Val>),
    Tids(Vec<ThreadId>),
}

impl Payload {
    fn kind(&self) -> Header {
        match self {
            Payload::Keys(_) => KEYS_KIND,
            Payload::Values(_) => VALUES_KIND,
            Payload::Tids(_) => TIDS_KIND,
        }
    }

    fn len(&self) -> usize {
        match self {
            Payload::Keys(keys) => keys.len(),
            Payload::Values(vals) => vals.len(),
            Payload::Tids(tids) => tids.len(),
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Keys(keys) => bytemuck::cast_slice(keys.as_slice()),
            Payload::Values(vals) => bytemuck::cast_slice(vals.as_slice()),
            Payload::Tids(tids) => bytemuck::cast_slice(tids.as_slice()),
        }
    }
}

/// The only unit of communication between threads and nodes.
///
/// A message can't be changed once built, every consumer gets its own owned copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    meta: Meta,
    data: Vec<Payload>,
}

impl Message {
    /// Creates a new `Message`.
    ///
    /// # Arguments
    /// * `meta` - The routing header.
    /// * `data` - The typed arrays to carry.
    pub fn new(meta: Meta, data: Vec<Payload>) -> Self {
        Self { meta, data }
    }

    /// Creates a `Get` request for `keys`.
    pub fn get(sender: ThreadId, receiver: ThreadId, model_id: ModelId, keys: Vec<Key>) -> Self {
        let meta = Meta {
            sender,
            receiver,
            model_id,
            flag: Flag::Get,
        };

        Self::new(meta, vec![Payload::Keys(keys)])
    }

    /// Creates an `Add` request, `vals[i]` is the delta for `keys[i]`.
    pub fn add(
        sender: ThreadId,
        receiver: ThreadId,
        model_id: ModelId,
        keys: Vec<Key>,
        vals: Vec<Val>,
    ) -> Self {
        let meta = Meta {
            sender,
            receiver,
            model_id,
            flag: Flag::Add,
        };

        Self::new(meta, vec![Payload::Keys(keys), Payload::Values(vals)])
    }

    /// Creates a `Clock` notification.
    pub fn clock(sender: ThreadId, receiver: ThreadId, model_id: ModelId) -> Self {
        let meta = Meta {
            sender,
            receiver,
            model_id,
            flag: Flag::Clock,
        };

        Self::new(meta, Vec::new())
    }

    /// Creates a `ResetWorker` request registering `tids` as the worker population of the model.
    pub fn reset_worker(
        sender: ThreadId,
        receiver: ThreadId,
        model_id: ModelId,
        tids: Vec<ThreadId>,
    ) -> Self {
        let meta = Meta {
            sender,
            receiver,
            model_id,
            flag: Flag::ResetWorker,
        };

        Self::new(meta, vec![Payload::Tids(tids)])
    }

    /// Creates an `Exit` message that stops the thread owning `receiver`.
    pub fn exit(receiver: ThreadId) -> Self {
        let meta = Meta {
            sender: receiver,
            receiver,
            model_id: 0,
            flag: Flag::Exit,
        };

        Self::new(meta, Vec::new())
    }

    /// Creates a reply to this message, addressed back to its sender.
    ///
    /// # Arguments
    /// * `data` - The typed arrays of the reply.
    ///
    /// # Returns
    /// A message with the same flag and model, and sender and receiver swapped.
    pub fn reply(&self, data: Vec<Payload>) -> Self {
        let meta = Meta {
            sender: self.meta.receiver,
            receiver: self.meta.sender,
            ..self.meta
        };

        Self::new(meta, data)
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn flag(&self) -> Flag {
        self.meta.flag
    }

    pub fn sender(&self) -> ThreadId {
        self.meta.sender
    }

    pub fn receiver(&self) -> ThreadId {
        self.meta.receiver
    }

    pub fn model_id(&self) -> ModelId {
        self.meta.model_id
    }

    pub fn data(&self) -> &[Payload] {
        &self.data
    }

    /// Returns the first key list of the payload, if any.
    pub fn keys(&self) -> Option<&[Key]> {
        self.data.iter().find_map(|payload| match payload {
            Payload::Keys(keys) => Some(keys.as_slice()),
            _ => None,
        })
    }

    /// Returns the first value list of the payload, if any.
    pub fn values(&self) -> Option<&[Val]> {
        self.data.iter().find_map(|payload| match payload {
            Payload::Values(vals) => Some(vals.as_slice()),
            _ => None,
        })
    }

    /// Returns the first thread id list of the payload, if any.
    pub fn tids(&self) -> Option<&[ThreadId]> {
        self.data.iter().find_map(|payload| match payload {
            Payload::Tids(tids) => Some(tids.as_slice()),
            _ => None,
        })
    }

    fn invalid_data<T>(text: String) -> io::Result<T> {
        Err(io::Error::new(io::ErrorKind::InvalidData, text))
    }

    fn buf_is_too_small<T>(size: usize, needed: usize) -> io::Result<T> {
        Self::invalid_data(format!(
            "the given buffer is too small {size}, must at least be {needed} bytes"
        ))
    }
}

/// Reads a header sized big endian integer at `buf[at..]`.
fn read_header(buf: &[u8], at: usize) -> io::Result<Header> {
    match buf.get(at..at + HEADER_SIZE).and_then(|b| b.try_into().ok()) {
        Some(bytes) => Ok(Header::from_be_bytes(bytes)),
        None => Message::buf_is_too_small(buf.len(), at + HEADER_SIZE),
    }
}

fn read_count(buf: &[u8], at: usize) -> io::Result<usize> {
    match buf.get(at..at + COUNT_SIZE).and_then(|b| b.try_into().ok()) {
        Some(bytes) => Ok(u64::from_be_bytes(bytes) as usize),
        None => Message::buf_is_too_small(buf.len(), at + COUNT_SIZE),
    }
}

/// Copies `count` items of `T` out of `buf[*at..]` and moves `at` past them, the bytes don't need
/// to be aligned.
fn read_array<T: AnyBitPattern>(buf: &[u8], at: &mut usize, count: usize) -> io::Result<Vec<T>> {
    let Some(end) = count
        .checked_mul(size_of::<T>())
        .and_then(|size| size.checked_add(*at))
    else {
        return Message::invalid_data(format!("payload count {count} is out of bounds"));
    };

    let Some(bytes) = buf.get(*at..end) else {
        return Message::buf_is_too_small(buf.len(), end);
    };

    *at = end;
    Ok(bytes
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

impl<'a> Serialize<'a> for Message {
    /// Layout: `sender | receiver | model_id | flag | npayloads` as big endian `u32`s, then for every
    /// payload `kind: u32 | count: u64 | items` with the items in native byte order.
    ///
    /// The items of the last payload are handed back to be written without copying.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        let Meta {
            sender,
            receiver,
            model_id,
            flag,
        } = self.meta;

        buf.extend_from_slice(&sender.to_be_bytes());
        buf.extend_from_slice(&receiver.to_be_bytes());
        buf.extend_from_slice(&model_id.to_be_bytes());
        buf.extend_from_slice(&flag.to_header().to_be_bytes());
        buf.extend_from_slice(&(self.data.len() as Header).to_be_bytes());

        let (last, rest) = self.data.split_last()?;

        for payload in rest {
            buf.extend_from_slice(&payload.kind().to_be_bytes());
            buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
            buf.extend_from_slice(payload.as_bytes());
        }

        buf.extend_from_slice(&last.kind().to_be_bytes());
        buf.extend_from_slice(&(last.len() as u64).to_be_bytes());
        Some(last.as_bytes())
    }
}

impl<'a> Deserialize<'a> for Message {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        let sender = read_header(buf, 0)?;
        let receiver = read_header(buf, HEADER_SIZE)?;
        let model_id = read_header(buf, 2 * HEADER_SIZE)?;
        let flag = Flag::from_header(read_header(buf, 3 * HEADER_SIZE)?)?;
        let npayloads = read_header(buf, META_SIZE)? as usize;

        let mut at = META_SIZE + HEADER_SIZE;
        let mut data = Vec::new();

        for _ in 0..npayloads {
            let kind = read_header(buf, at)?;
            let count = read_count(buf, at + HEADER_SIZE)?;
            at += HEADER_SIZE + COUNT_SIZE;

            let payload = match kind {
                KEYS_KIND => Payload::Keys(read_array(buf, &mut at, count)?),
                VALUES_KIND => Payload::Values(read_array(buf, &mut at, count)?),
                TIDS_KIND => Payload::Tids(read_array(buf, &mut at, count)?),
                other => {
                    return Self::invalid_data(format!("received an invalid payload kind {other}"));
                }
            };

            data.push(payload);
        }

        if at != buf.len() {
            let trailing = buf.len() - at;
            return Self::invalid_data(format!("found {trailing} trailing bytes after the payload"));
        }

        let meta = Meta {
            sender,
            receiver,
            model_id,
            flag,
        };

        Ok(Self::new(meta, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(msg: &Message) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(tail) = msg.serialize(&mut buf) {
            buf.extend_from_slice(tail);
        }
        buf
    }

    #[test]
    fn reply_swaps_sender_and_receiver() {
        let msg = Message::get(100, 3, 7, vec![1, 2]);
        let reply = msg.reply(vec![Payload::Keys(vec![1, 2]), Payload::Values(vec![0.5, 1.5])]);

        assert_eq!(reply.sender(), 3);
        assert_eq!(reply.receiver(), 100);
        assert_eq!(reply.model_id(), 7);
        assert_eq!(reply.flag(), Flag::Get);
        assert_eq!(reply.values(), Some([0.5, 1.5].as_slice()));
    }

    #[test]
    fn accessors_find_typed_arrays() {
        let msg = Message::add(1, 2, 0, vec![4, 5], vec![1.0, 2.0]);
        assert_eq!(msg.keys(), Some([4, 5].as_slice()));
        assert_eq!(msg.values(), Some([1.0, 2.0].as_slice()));
        assert_eq!(msg.tids(), None);

        let msg = Message::clock(1, 2, 0);
        assert!(msg.data().is_empty());
        assert_eq!(msg.keys(), None);
    }

    #[test]
    fn add_survives_the_wire() {
        let msg = Message::add(101, 2, 9, vec![1, u64::MAX, 42], vec![0.25, -3.0, 7.5]);
        let decoded = Message::deserialize(&encode(&msg)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn empty_payload_survives_the_wire() {
        let msg = Message::exit(52);
        let decoded = Message::deserialize(&encode(&msg)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let msg = Message::reset_worker(51, 0, 1, vec![100, 101, 102]);
        let buf = encode(&msg);

        let err = Message::deserialize(&buf[..buf.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn invalid_flag_is_rejected() {
        let mut buf = encode(&Message::clock(1, 2, 3));
        buf[3 * HEADER_SIZE..META_SIZE].copy_from_slice(&99u32.to_be_bytes());

        let err = Message::deserialize(&buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
