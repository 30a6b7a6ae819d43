//! RTMP packet bodies (spec.md §4.3) and the `Status` objects attached to
//! Invoke replies (spec.md §4.6).
//!
//! Mirrors `fmspy.rtmp.packets` and `fmspy.rtmp.status`: a header plus a
//! type-specific body. `packetFactory`'s dispatch becomes `Packet::decode`.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::amf::{self, Amf0Value};
use crate::error::ProtocolDecodeError;
use crate::rtmp::constants;
use crate::rtmp::header::ChunkHeader;

/// A decoded RTMP message, tagged by its `message_type` byte.
#[derive(Debug, Clone)]
pub enum Packet {
    /// RPC call or reply (`INVOKE`, `NOTIFY`/`FLEX_MESSAGE` share the shape
    /// but the server only originates and answers `INVOKE`).
    Invoke(Invoke),
    Ping(Ping),
    BytesRead(BytesRead),
    /// Anything this server doesn't interpret (audio/video/shared object
    /// chunks) — kept verbatim so it round-trips if ever relayed.
    RawData { header: ChunkHeader, data: Vec<u8> },
}

impl Packet {
    pub fn header(&self) -> &ChunkHeader {
        match self {
            Packet::Invoke(p) => &p.header,
            Packet::Ping(p) => &p.header,
            Packet::BytesRead(p) => &p.header,
            Packet::RawData { header, .. } => header,
        }
    }

    /// Decode a packet body now that its header and full-length data are
    /// assembled. Equivalent to `fmspy.rtmp.packets.packetFactory`.
    pub fn decode(header: ChunkHeader, data: Vec<u8>) -> Result<Packet, ProtocolDecodeError> {
        match header.message_type {
            Some(constants::INVOKE) => Ok(Packet::Invoke(Invoke::decode(header, &data)?)),
            Some(constants::BYTES_READ) => Ok(Packet::BytesRead(BytesRead::decode(header, &data)?)),
            Some(constants::PING) => Ok(Packet::Ping(Ping::decode(header, &data)?)),
            _ => Ok(Packet::RawData { header, data }),
        }
    }

    /// Encode the body and stamp the accurate length into the header,
    /// returning both (the header is then handed to the assembler, which
    /// may further compress it against the last one sent on this channel).
    pub fn encode(&self) -> (ChunkHeader, Vec<u8>) {
        match self {
            Packet::Invoke(p) => p.encode(),
            Packet::Ping(p) => p.encode(),
            Packet::BytesRead(p) => p.encode(),
            Packet::RawData { header, data } => {
                let mut header = *header;
                header.length = Some(data.len() as u32);
                (header, data.clone())
            }
        }
    }
}

/// RPC call or reply. `id` is a float on the wire (AMF0 Number) to match
/// what peers send; this server always hands out whole numbers starting
/// at 2.0 (spec.md §4.6 — id 1.0 is reserved for `connect`).
#[derive(Debug, Clone, PartialEq)]
pub struct Invoke {
    pub header: ChunkHeader,
    pub name: String,
    pub id: f64,
    pub argv: Vec<Amf0Value>,
}

impl Invoke {
    pub fn new(channel: u8, name: impl Into<String>, id: f64, argv: Vec<Amf0Value>) -> Self {
        Invoke {
            header: ChunkHeader {
                channel,
                timestamp: Some(0),
                length: Some(0),
                message_type: Some(constants::INVOKE),
                stream_id: Some(0),
            },
            name: name.into(),
            id,
            argv,
        }
    }

    fn decode(header: ChunkHeader, data: &[u8]) -> Result<Invoke, ProtocolDecodeError> {
        let values = amf::read_all(data).map_err(|e| ProtocolDecodeError::Amf(e.to_string()))?;
        let mut iter = values.into_iter();
        let name = match iter.next() {
            Some(Amf0Value::String(s)) => s,
            _ => return Err(ProtocolDecodeError::Amf("Invoke missing procedure name".to_string())),
        };
        let id = match iter.next() {
            Some(Amf0Value::Number(n)) => n,
            _ => return Err(ProtocolDecodeError::Amf("Invoke missing request id".to_string())),
        };
        let argv: Vec<Amf0Value> = iter.collect();
        Ok(Invoke { header, name, id, argv })
    }

    fn encode(&self) -> (ChunkHeader, Vec<u8>) {
        let mut values = vec![Amf0Value::String(self.name.clone()), Amf0Value::Number(self.id)];
        values.extend(self.argv.iter().cloned());
        let data = amf::write_all(&values);
        let mut header = self.header;
        header.length = Some(data.len() as u32);
        (header, data)
    }
}

/// Acknowledges how many bytes the sender has received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytesRead {
    pub header: ChunkHeader,
    pub bytes: u32,
}

impl BytesRead {
    pub fn new(channel: u8, bytes: u32) -> Self {
        BytesRead {
            header: ChunkHeader {
                channel,
                timestamp: Some(0),
                length: Some(4),
                message_type: Some(constants::BYTES_READ),
                stream_id: Some(0),
            },
            bytes,
        }
    }

    fn decode(header: ChunkHeader, data: &[u8]) -> Result<BytesRead, ProtocolDecodeError> {
        let mut cursor = Cursor::new(data);
        let bytes = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| ProtocolDecodeError::ShortPing(data.len()))?;
        Ok(BytesRead { header, bytes })
    }

    fn encode(&self) -> (ChunkHeader, Vec<u8>) {
        let mut out = Vec::with_capacity(4);
        out.write_u32::<BigEndian>(self.bytes).unwrap();
        let mut header = self.header;
        header.length = Some(out.len() as u32);
        (header, out)
    }
}

/// Stream control / keep-alive message. `data` holds 1-3 32-bit words; which
/// ones are meaningful depends on `event` (spec.md §4.4/4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub header: ChunkHeader,
    pub event: u16,
    pub data: Vec<u32>,
}

impl Ping {
    pub fn new(channel: u8, event: u16, data: Vec<u32>) -> Self {
        Ping {
            header: ChunkHeader {
                channel,
                timestamp: Some(0),
                length: Some(0),
                message_type: Some(constants::PING),
                stream_id: Some(0),
            },
            event,
            data,
        }
    }

    fn decode(header: ChunkHeader, data: &[u8]) -> Result<Ping, ProtocolDecodeError> {
        if data.len() < 6 {
            return Err(ProtocolDecodeError::ShortPing(data.len()));
        }
        let mut cursor = Cursor::new(data);
        let event = cursor.read_u16::<BigEndian>().unwrap();
        let mut words = vec![cursor.read_u32::<BigEndian>().unwrap()];
        if cursor.get_ref().len() as u64 - cursor.position() >= 4 {
            words.push(cursor.read_u32::<BigEndian>().unwrap());
            if cursor.get_ref().len() as u64 - cursor.position() >= 4 {
                words.push(cursor.read_u32::<BigEndian>().unwrap());
            }
        }
        Ok(Ping { header, event, data: words })
    }

    fn encode(&self) -> (ChunkHeader, Vec<u8>) {
        let mut out = Vec::with_capacity(2 + 4 * self.data.len());
        out.write_u16::<BigEndian>(self.event).unwrap();
        for word in &self.data {
            out.write_u32::<BigEndian>(*word).unwrap();
        }
        let mut header = self.header;
        header.length = Some(out.len() as u32);
        (header, out)
    }
}

/// NetConnection/NetStream status payload attached to `onStatus`/`_result`
/// Invokes. Mirrors `fmspy.rtmp.status.Status`, whose `**kwargs` becomes
/// `extra` here (SPEC_FULL.md supplement).
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub level: String,
    pub code: String,
    pub description: String,
    pub extra: Vec<(String, Amf0Value)>,
}

impl Status {
    pub fn new(level: impl Into<String>, code: impl Into<String>, description: impl Into<String>) -> Self {
        Status {
            level: level.into(),
            code: code.into(),
            description: description.into(),
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Amf0Value) -> Self {
        self.extra.push((key.into(), value));
        self
    }

    /// Build a status describing an error with an explicit code, the way
    /// `Status.from_failure` builds one from a caught exception. The
    /// `e.code`-or-default choice of which code to pass lives in
    /// `Status::from_handler_error` (`rtmp/invoke.rs`), the only caller.
    pub(crate) fn from_error(code: impl Into<String>, err: &dyn std::fmt::Display) -> Self {
        Status::new("error", code, err.to_string())
    }

    pub fn to_amf(&self) -> Amf0Value {
        amf::status_object(&self.level, &self.code, &self.description, &self.extra)
    }

    /// Parse a status back out of an AMF object, the reverse of `to_amf`.
    /// Used on `_error` replies (spec.md §4.6: "reject it with a Status
    /// constructed from `argv[1]`").
    pub fn from_amf(value: &Amf0Value) -> Status {
        let entries = match value {
            Amf0Value::Object { entries, .. } => entries.as_slice(),
            _ => &[],
        };

        let field = |key: &str| entries.iter().find(|p| p.key == key).and_then(|p| p.value.try_as_str()).map(str::to_string);

        let extra = entries
            .iter()
            .filter(|p| !matches!(p.key.as_str(), "level" | "code" | "description"))
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect();

        Status {
            level: field("level").unwrap_or_else(|| "error".to_string()),
            code: field("code").unwrap_or_else(|| constants::status_code::NET_CONNECTION_ERROR.to_string()),
            description: field("description").unwrap_or_default(),
            extra,
        }
    }
}
