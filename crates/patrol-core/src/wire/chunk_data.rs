//! `ChunkData` binary records (§4.3) and the length-prefixed stream that
//! carries them.
//!
//! `ChunkData` is wire-compatible with a minimal protobuf message (three
//! scalar fields on tags 1-3, a length-delimited bytes field on tag 4, and a
//! packed repeated varint field on tag 5), but rather than pull in a full
//! protobuf runtime for a schema this small and fixed, the codec below is a
//! hand-rolled tag/wire-type scanner that skips anything it doesn't
//! recognize.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::WireError;

const WIRE_VARINT: u64 = 0;
const WIRE_64BIT: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_32BIT: u64 = 5;

const FIELD_CHUNK_NUMBER: u64 = 1;
const FIELD_CHUNK_TYPE: u64 = 2;
const FIELD_PREFIX_TYPE: u64 = 3;
const FIELD_HASHES: u64 = 4;
const FIELD_ADD_NUMBERS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    Add,
    Sub,
}

impl Default for ChunkType {
    fn default() -> Self {
        ChunkType::Add
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixType {
    Prefix4B,
    Full32B,
}

impl Default for PrefixType {
    fn default() -> Self {
        PrefixType::Prefix4B
    }
}

impl PrefixType {
    pub fn byte_len(self) -> usize {
        match self {
            PrefixType::Prefix4B => 4,
            PrefixType::Full32B => 32,
        }
    }
}

/// One decoded chunk record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkData {
    pub chunk_number: i32,
    pub chunk_type: ChunkType,
    pub prefix_type: PrefixType,
    /// Concatenated prefixes, each `prefix_type.byte_len()` bytes.
    pub hashes: Vec<u8>,
    /// Only meaningful (and required to align with `hashes`) for `Sub`.
    pub add_numbers: Vec<i32>,
}

impl ChunkData {
    /// Number of prefixes carried, derived from `hashes`.
    pub fn prefix_count(&self) -> usize {
        let size = self.prefix_type.byte_len();
        if size == 0 {
            0
        } else {
            self.hashes.len() / size
        }
    }

    pub fn validate(&self) -> Result<(), WireError> {
        let size = self.prefix_type.byte_len();
        if size == 0 || self.hashes.len() % size != 0 {
            return Err(WireError::HashesNotAligned {
                hashes_len: self.hashes.len(),
                prefix_size: size,
            });
        }
        if self.chunk_type == ChunkType::Sub && self.add_numbers.len() != self.prefix_count() {
            return Err(WireError::AddNumberMismatch {
                prefixes: self.prefix_count(),
                add_numbers: self.add_numbers.len(),
            });
        }
        Ok(())
    }

    /// Each prefix as its own owned slice, in order.
    pub fn prefixes(&self) -> impl Iterator<Item = &[u8]> {
        self.hashes.chunks(self.prefix_type.byte_len())
    }
}

fn read_varint(buf: &mut &[u8]) -> Result<u64, WireError> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        if buf.is_empty() {
            return Err(WireError::Truncated { expected: 1, found: 0 });
        }
        let byte = buf[0];
        *buf = &buf[1..];
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(WireError::Truncated { expected: 1, found: 0 });
        }
    }
}

fn read_tag(buf: &mut &[u8]) -> Result<Option<(u64, u64)>, WireError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let tag = read_varint(buf)?;
    Ok(Some((tag >> 3, tag & 0x7)))
}

fn take(buf: &mut &[u8], n: usize) -> Result<Vec<u8>, WireError> {
    if buf.len() < n {
        return Err(WireError::Truncated {
            expected: n,
            found: buf.len(),
        });
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head.to_vec())
}

fn skip_field(buf: &mut &[u8], wire_type: u64) -> Result<(), WireError> {
    match wire_type {
        WIRE_VARINT => {
            read_varint(buf)?;
        }
        WIRE_64BIT => {
            take(buf, 8)?;
        }
        WIRE_LEN => {
            let len = read_varint(buf)? as usize;
            take(buf, len)?;
        }
        WIRE_32BIT => {
            take(buf, 4)?;
        }
        other => return Err(WireError::BadWireType(other as u8)),
    }
    Ok(())
}

/// Decode one `ChunkData` message from `buf`, which must contain exactly one
/// record (no trailing bytes).
pub fn decode_chunk_data(mut buf: &[u8]) -> Result<ChunkData, WireError> {
    let mut chunk_number: i32 = 0;
    let mut chunk_type = ChunkType::Add;
    let mut prefix_type = PrefixType::Prefix4B;
    let mut hashes = Vec::new();
    let mut add_numbers = Vec::new();

    while let Some((field, wire_type)) = read_tag(&mut buf)? {
        match field {
            FIELD_CHUNK_NUMBER if wire_type == WIRE_VARINT => {
                chunk_number = read_varint(&mut buf)? as i32;
            }
            FIELD_CHUNK_TYPE if wire_type == WIRE_VARINT => {
                chunk_type = match read_varint(&mut buf)? {
                    0 => ChunkType::Add,
                    1 => ChunkType::Sub,
                    other => return Err(WireError::UnknownChunkType(other as i32)),
                };
            }
            FIELD_PREFIX_TYPE if wire_type == WIRE_VARINT => {
                prefix_type = match read_varint(&mut buf)? {
                    0 => PrefixType::Prefix4B,
                    1 => PrefixType::Full32B,
                    other => return Err(WireError::UnknownPrefixType(other as i32)),
                };
            }
            FIELD_HASHES if wire_type == WIRE_LEN => {
                let len = read_varint(&mut buf)? as usize;
                hashes = take(&mut buf, len)?;
            }
            FIELD_ADD_NUMBERS if wire_type == WIRE_LEN => {
                // Packed repeated varint: length-delimited payload of
                // back-to-back varints.
                let len = read_varint(&mut buf)? as usize;
                let mut body = take(&mut buf, len)?;
                let mut slice: &[u8] = &body;
                while !slice.is_empty() {
                    add_numbers.push(read_varint(&mut slice)? as i32);
                }
                body.clear();
            }
            FIELD_ADD_NUMBERS if wire_type == WIRE_VARINT => {
                // Unpacked encoding is also valid protobuf; accept a single
                // varint per tag occurrence.
                add_numbers.push(read_varint(&mut buf)? as i32);
            }
            _ => skip_field(&mut buf, wire_type)?,
        }
    }

    let chunk = ChunkData {
        chunk_number,
        chunk_type,
        prefix_type,
        hashes,
        add_numbers,
    };
    chunk.validate()?;
    Ok(chunk)
}

/// Encode a `ChunkData` record (used by tests and by any future sender; the
/// client itself only ever decodes records sent by the service).
pub fn encode_chunk_data(chunk: &ChunkData) -> Vec<u8> {
    let mut out = BytesMut::new();

    write_tag(&mut out, FIELD_CHUNK_NUMBER, WIRE_VARINT);
    write_varint(&mut out, chunk.chunk_number as u64);

    write_tag(&mut out, FIELD_CHUNK_TYPE, WIRE_VARINT);
    write_varint(&mut out, matches!(chunk.chunk_type, ChunkType::Sub) as u64);

    write_tag(&mut out, FIELD_PREFIX_TYPE, WIRE_VARINT);
    write_varint(&mut out, matches!(chunk.prefix_type, PrefixType::Full32B) as u64);

    write_tag(&mut out, FIELD_HASHES, WIRE_LEN);
    write_varint(&mut out, chunk.hashes.len() as u64);
    out.put_slice(&chunk.hashes);

    if !chunk.add_numbers.is_empty() {
        let mut packed = BytesMut::new();
        for &n in &chunk.add_numbers {
            write_varint(&mut packed, n as u64);
        }
        write_tag(&mut out, FIELD_ADD_NUMBERS, WIRE_LEN);
        write_varint(&mut out, packed.len() as u64);
        out.put_slice(&packed);
    }

    out.to_vec()
}

fn write_tag(out: &mut BytesMut, field: u64, wire_type: u64) {
    write_varint(out, (field << 3) | wire_type);
}

fn write_varint(out: &mut BytesMut, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.put_u8(byte);
            break;
        } else {
            out.put_u8(byte | 0x80);
        }
    }
}

/// Decode a stream of `u32_be length || ChunkData(length)` records.
pub fn decode_chunk_stream(mut body: &[u8]) -> Result<Vec<ChunkData>, WireError> {
    let mut out = Vec::new();
    while !body.is_empty() {
        if body.len() < 4 {
            return Err(WireError::Truncated {
                expected: 4,
                found: body.len(),
            });
        }
        let len = body.get_u32() as usize;
        if body.len() < len {
            return Err(WireError::Truncated {
                expected: len,
                found: body.len(),
            });
        }
        let (record, rest) = body.split_at(len);
        out.push(decode_chunk_data(record)?);
        body = rest;
    }
    Ok(out)
}

/// Encode a sequence of chunk records as the length-prefixed stream format.
pub fn encode_chunk_stream(chunks: &[ChunkData]) -> Vec<u8> {
    let mut out = BytesMut::new();
    for chunk in chunks {
        let encoded = encode_chunk_data(chunk);
        out.put_u32(encoded.len() as u32);
        out.put_slice(&encoded);
    }
    out.to_vec()
}
