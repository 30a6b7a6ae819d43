//! Chunk headers (spec.md §4.1).
//!
//! Mirrors `fmspy.rtmp.header.RTMPHeader`: a header can be read in one of
//! four wire forms (12/8/4/1 bytes) and may come back with trailing fields
//! unset, to be filled in from the last full header seen on the same
//! channel.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Raised while reading a header when the buffer doesn't yet hold enough
/// bytes for the form the first byte commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedBytes(pub usize);

/// A chunk header, possibly partially filled (see `fill`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkHeader {
    /// Chunk stream id ("object id" in fmspy), 0-63.
    pub channel: u8,
    pub timestamp: Option<u32>,
    pub length: Option<u32>,
    pub message_type: Option<u8>,
    pub stream_id: Option<u32>,
}

impl ChunkHeader {
    pub fn full(channel: u8, timestamp: u32, length: u32, message_type: u8, stream_id: u32) -> Self {
        ChunkHeader {
            channel,
            timestamp: Some(timestamp),
            length: Some(length),
            message_type: Some(message_type),
            stream_id: Some(stream_id),
        }
    }

    /// Fill unset trailing fields from `other` (the last header seen on
    /// this channel). Fields are inherited strictly right to left:
    /// `stream_id`, then (only if that was itself missing) `message_type`,
    /// then `length`, then `timestamp`. Panics if any field remains unset
    /// afterward — same assertions fmspy's `fill()` makes.
    pub fn fill(&mut self, other: &ChunkHeader) {
        if self.stream_id.is_none() {
            self.stream_id = other.stream_id;

            if self.message_type.is_none() {
                self.message_type = other.message_type;

                if self.length.is_none() {
                    self.length = other.length;

                    if self.timestamp.is_none() {
                        self.timestamp = other.timestamp;
                    }
                }
            }
        }

        assert!(self.stream_id.is_some());
        assert!(self.message_type.is_some());
        assert!(self.length.is_some());
        assert!(self.timestamp.is_some());
    }

    /// How many of the header's fields differ from `other` — determines
    /// which wire form `write` must use (0 => 1 byte, 1 => 4, 2 => 8, 3 => 12).
    pub fn diff(&self, other: &ChunkHeader) -> u8 {
        if self == other {
            return 0;
        }

        assert_eq!(self.channel, other.channel);

        if self.stream_id == other.stream_id {
            if self.message_type == other.message_type && self.length == other.length {
                return 1;
            }
            return 2;
        }

        3
    }

    /// Parse a header from `buf`, consuming only the bytes the form needs.
    /// Returns `Err(NeedBytes(n))` if fewer than `n` more bytes are needed
    /// before this call could succeed.
    pub fn read(buf: &[u8]) -> Result<(ChunkHeader, usize), NeedBytes> {
        if buf.is_empty() {
            return Err(NeedBytes(1));
        }

        let first = buf[0];
        let size = match (first & 0xc0) >> 6 {
            0 => 12,
            1 => 8,
            2 => 4,
            _ => 1,
        };

        if buf.len() < size {
            return Err(NeedBytes(size - buf.len()));
        }

        let channel = first & 0x3f;
        let mut cursor = Cursor::new(&buf[1..size]);

        let mut header = ChunkHeader {
            channel,
            timestamp: None,
            length: None,
            message_type: None,
            stream_id: None,
        };

        if size != 1 {
            header.timestamp = Some(cursor.read_u24::<BigEndian>().expect("size checked above"));
        }

        if size >= 8 {
            header.length = Some(cursor.read_u24::<BigEndian>().expect("size checked above"));
            header.message_type = Some(cursor.read_u8().expect("size checked above"));
        }

        if size == 12 {
            header.stream_id = Some(cursor.read_u32::<LittleEndian>().expect("size checked above"));
        }

        Ok((header, size))
    }

    /// Encode this header, compressing it against `previous` (the last
    /// header sent on this channel) when possible. Pass `None` to force the
    /// full 12-byte form.
    pub fn write(&self, previous: Option<&ChunkHeader>) -> Vec<u8> {
        let diff = match previous {
            None => 3,
            Some(p) => self.diff(p),
        };

        let first = (self.channel & 0x3f) | ((diff ^ 3) << 6);

        if diff == 0 {
            return vec![first];
        }

        let mut out = Vec::with_capacity(12);
        out.write_u8(first).unwrap();
        out.write_u24::<BigEndian>(self.timestamp.expect("fill() guarantees this")).unwrap();

        if diff > 1 {
            out.write_u24::<BigEndian>(self.length.expect("fill() guarantees this")).unwrap();
            out.write_u8(self.message_type.expect("fill() guarantees this")).unwrap();

            if diff > 2 {
                out.write_u32::<LittleEndian>(self.stream_id.expect("fill() guarantees this")).unwrap();
            }
        }

        out
    }
}
