//! Chunking and dechunking (spec.md §4.2).
//!
//! Mirrors `fmspy.rtmp.assembly`: `Disassembler` turns a byte stream back
//! into whole packets, `Assembler` slices outgoing packets into chunks no
//! larger than the negotiated chunk size.

use std::collections::HashMap;

use crate::error::ProtocolDecodeError;
use crate::rtmp::header::ChunkHeader;
use crate::rtmp::packet::Packet;

/// Reassembles chunked RTMP data received from a peer into whole packets.
///
/// Chunk size may change mid-stream (a `CHUNK_SIZE` control packet); callers
/// must call `set_chunk_size` as soon as they observe one, the same warning
/// `fmspy.rtmp.assembly.RTMPDisassembler.disassemble_packets` carries: if the
/// size changes while chunks from an in-flight packet are still pending on
/// another channel, those chunks were sliced under the old size and decoding
/// them under the new one would be wrong.
pub struct Disassembler {
    chunk_size: u32,
    buffer: Vec<u8>,
    last_headers: HashMap<u8, ChunkHeader>,
    pool: HashMap<u8, Vec<u8>>,
}

impl Disassembler {
    pub fn new(chunk_size: u32) -> Self {
        Disassembler {
            chunk_size,
            buffer: Vec::new(),
            last_headers: HashMap::new(),
            pool: HashMap::new(),
        }
    }

    pub fn set_chunk_size(&mut self, chunk_size: u32) {
        self.chunk_size = chunk_size;
    }

    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Try to decode one packet from whatever's buffered. Returns `Ok(None)`
    /// if there isn't enough data yet for the next packet to complete —
    /// bytes already consumed toward in-flight chunks on other channels stay
    /// in `pool` for the next call.
    pub fn try_next(&mut self) -> Result<Option<Packet>, ProtocolDecodeError> {
        loop {
            if self.buffer.is_empty() {
                return Ok(None);
            }

            let (mut header, header_len) = match ChunkHeader::read(&self.buffer) {
                Ok(ok) => ok,
                Err(_) => return Ok(None),
            };

            match self.last_headers.get(&header.channel).copied() {
                Some(prior) => header.fill(&prior),
                None if header.stream_id.is_some()
                    && header.message_type.is_some()
                    && header.length.is_some()
                    && header.timestamp.is_some() => {}
                None => {
                    return Err(ProtocolDecodeError::MissingPriorHeader { channel: header.channel });
                }
            }

            let existing_len = self.pool.get(&header.channel).map(|v| v.len()).unwrap_or(0);
            let length = header.length.expect("fill() guarantees this") as usize;
            let this_chunk = std::cmp::min(length - existing_len, self.chunk_size as usize);

            if self.buffer.len() < header_len + this_chunk {
                return Ok(None);
            }

            let chunk = self.buffer[header_len..header_len + this_chunk].to_vec();
            self.buffer.drain(0..header_len + this_chunk);

            let entry = self.pool.entry(header.channel).or_insert_with(Vec::new);
            entry.extend_from_slice(&chunk);
            self.last_headers.insert(header.channel, header);

            if entry.len() < length {
                continue;
            }

            let data = self.pool.remove(&header.channel).unwrap();
            return Packet::decode(header, data).map(Some);
        }
    }

    /// Drain every packet decodable from what's buffered right now. See the
    /// chunk-size-change warning on the type itself before using this for
    /// anything but tests or a stream with a constant chunk size.
    pub fn drain(&mut self) -> Result<Vec<Packet>, ProtocolDecodeError> {
        let mut packets = Vec::new();
        while let Some(packet) = self.try_next()? {
            packets.push(packet);
        }
        Ok(packets)
    }
}

/// Slices outgoing packets into chunks, compressing headers against the
/// last one sent on each channel.
pub struct Assembler {
    chunk_size: u32,
    last_headers: HashMap<u8, ChunkHeader>,
}

impl Assembler {
    pub fn new(chunk_size: u32) -> Self {
        Assembler {
            chunk_size,
            last_headers: HashMap::new(),
        }
    }

    /// Encode `packet` into wire bytes ready to write to the socket.
    pub fn push_packet(&mut self, packet: &Packet) -> Vec<u8> {
        let (header, data) = packet.encode();
        let previous = self.last_headers.get(&header.channel).copied();

        let mut out = header.write(previous.as_ref());

        let length = header.length.expect("encode() fills this") as usize;
        let first_chunk = std::cmp::min(self.chunk_size as usize, length);
        out.extend_from_slice(&data[..first_chunk]);

        let mut pos = first_chunk;
        while pos < length {
            out.extend_from_slice(&header.write(Some(&header)));
            let end = std::cmp::min(pos + self.chunk_size as usize, data.len());
            out.extend_from_slice(&data[pos..end]);
            pos += self.chunk_size as usize;
        }

        self.last_headers.insert(header.channel, header);
        out
    }
}
