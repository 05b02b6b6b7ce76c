// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Fossil Record Codec
//!
//! Self-delimited binary records used by the pending journal.
//!
//! # Frame Format
//! ```text
//! [len: u32 LE][crc64: u64 LE][payload: len bytes]
//! ```
//! The payload is the bincode (standard config) encoding of
//! `{ data: [u8; 32], meta: Vec<u8> }`.
//!
//! # Guarantees
//! - Zero bytes at a record boundary is a clean end of stream (`Ok(None)`).
//! - Any shorter read inside a frame is `CodecError::Truncated`, so recovery
//!   can refuse a torn tail instead of silently dropping it.

use crate::error::{CodecError, Result};
use crate::types::{Digest, Fossil, DIGEST_LEN};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};

/// Frame header size: length + checksum.
pub const FRAME_HEADER_LEN: usize = 4 + 8;

/// Upper bound on a single payload. Larger lengths are treated as corruption.
pub const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

#[derive(Serialize, Deserialize)]
struct FossilRecord {
    data: [u8; DIGEST_LEN],
    meta: Vec<u8>,
}

fn checksum(payload: &[u8]) -> u64 {
    let mut digest = crc64fast::Digest::new();
    digest.write(payload);
    digest.sum64()
}

/// Encode one fossil as a complete frame.
pub fn encode_fossil(fossil: &Fossil) -> Result<Vec<u8>> {
    let record = FossilRecord {
        data: fossil.data.0,
        meta: fossil.meta.clone(),
    };
    let payload = bincode::serde::encode_to_vec(&record, bincode::config::standard())
        .map_err(|e| CodecError::Malformed(e.to_string()))?;

    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    if len > MAX_RECORD_LEN {
        return Err(CodecError::RecordTooLarge(len));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.write_u32::<LittleEndian>(len)?;
    frame.write_u64::<LittleEndian>(checksum(&payload))?;
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Append one encoded fossil to `writer`. Returns the number of bytes written.
pub fn write_fossil<W: Write>(writer: &mut W, fossil: &Fossil) -> Result<usize> {
    let frame = encode_fossil(fossil)?;
    writer.write_all(&frame)?;
    Ok(frame.len())
}

/// Streaming decoder over a concatenation of frames.
pub struct FossilDecoder<R: Read> {
    reader: R,
    offset: u64,
}

impl<R: Read> FossilDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Fill `buf` as far as the stream allows, returning the count read.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    /// Decode the next fossil. `Ok(None)` on clean end of stream.
    pub fn next_fossil(&mut self) -> Result<Option<Fossil>> {
        let start = self.offset;

        let mut header = [0u8; FRAME_HEADER_LEN];
        match self.read_full(&mut header)? {
            0 => return Ok(None),
            n if n < FRAME_HEADER_LEN => return Err(CodecError::Truncated { offset: start }),
            _ => {}
        }

        let mut cursor = &header[..];
        let len = cursor.read_u32::<LittleEndian>()?;
        let expected = cursor.read_u64::<LittleEndian>()?;

        if len > MAX_RECORD_LEN {
            return Err(CodecError::RecordTooLarge(len));
        }

        let mut payload = vec![0u8; len as usize];
        if self.read_full(&mut payload)? < payload.len() {
            return Err(CodecError::Truncated { offset: start });
        }

        let found = checksum(&payload);
        if found != expected {
            return Err(CodecError::ChecksumMismatch { expected, found });
        }

        let (record, consumed): (FossilRecord, usize) =
            bincode::serde::decode_from_slice(&payload, bincode::config::standard())
                .map_err(|e| CodecError::Malformed(e.to_string()))?;
        if consumed != payload.len() {
            return Err(CodecError::Malformed(format!(
                "{} trailing bytes in record at offset {}",
                payload.len() - consumed,
                start
            )));
        }

        self.offset += (FRAME_HEADER_LEN + payload.len()) as u64;

        Ok(Some(Fossil {
            data: Digest(record.data),
            meta: record.meta,
        }))
    }

}

impl<R: Read> Iterator for FossilDecoder<R> {
    type Item = Result<Fossil>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_fossil().transpose()
    }
}

/// Decode a whole in-memory stream.
pub fn decode_all(bytes: &[u8]) -> Result<Vec<Fossil>> {
    FossilDecoder::new(bytes).collect()
}
