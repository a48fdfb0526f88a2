//! Commit record encoding and decoding
//!
//! ## Frame Format
//!
//! ```text
//! [length: u32][type: u8][payload: bytes][crc32: u32]
//! ```
//!
//! - **length**: size of type + payload + crc (NOT including length itself), little-endian
//! - **type**: record type tag (1 = Commit)
//! - **payload**: MessagePack-encoded `CommitRecord`
//! - **crc32**: CRC32 over \[type\]\[payload\], little-endian

use crate::record::CommitRecord;
use crc32fast::Hasher;
use thiserror::Error;

/// Record type tag for a committed transaction
pub const TYPE_COMMIT: u8 = 1;

/// Bytes taken by the length prefix
const LENGTH_BYTES: usize = 4;

/// Smallest legal frame body: type(1) + crc(4)
const MIN_BODY: usize = 5;

/// Decode failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer ends before the frame does (torn write at the log tail)
    #[error("offset {offset}: incomplete record, have {have} bytes, need {needed}")]
    Incomplete {
        /// File offset of the frame
        offset: u64,
        /// Bytes available
        have: usize,
        /// Bytes the frame declares
        needed: usize,
    },

    /// Frame is complete but its contents are invalid
    #[error("offset {offset}: {message}")]
    Corrupt {
        /// File offset of the frame
        offset: u64,
        /// What was wrong
        message: String,
    },
}

/// Encode a commit record into one frame
///
/// # Errors
///
/// Returns a message if MessagePack encoding fails.
pub fn encode_record(record: &CommitRecord) -> Result<Vec<u8>, String> {
    let payload = rmp_serde::to_vec_named(record).map_err(|e| e.to_string())?;

    let body_len = 1 + payload.len() + 4;
    let mut buf = Vec::with_capacity(LENGTH_BYTES + body_len);
    buf.extend_from_slice(&(body_len as u32).to_le_bytes());
    buf.push(TYPE_COMMIT);
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&checksum(TYPE_COMMIT, &payload).to_le_bytes());
    Ok(buf)
}

/// Decode one frame from the start of `buf`
///
/// Returns the record and the number of bytes consumed. `offset` is the
/// file position of `buf[0]`, used only for error reporting.
pub fn decode_record(buf: &[u8], offset: u64) -> Result<(CommitRecord, usize), DecodeError> {
    if buf.len() < LENGTH_BYTES {
        return Err(DecodeError::Incomplete {
            offset,
            have: buf.len(),
            needed: LENGTH_BYTES,
        });
    }
    let mut len_bytes = [0u8; LENGTH_BYTES];
    len_bytes.copy_from_slice(&buf[..LENGTH_BYTES]);
    let body_len = u32::from_le_bytes(len_bytes) as usize;

    if body_len < MIN_BODY {
        return Err(DecodeError::Corrupt {
            offset,
            message: format!("invalid record length {} (minimum {})", body_len, MIN_BODY),
        });
    }

    let frame_len = LENGTH_BYTES + body_len;
    if buf.len() < frame_len {
        return Err(DecodeError::Incomplete {
            offset,
            have: buf.len(),
            needed: frame_len,
        });
    }

    let body = &buf[LENGTH_BYTES..frame_len];
    let type_tag = body[0];
    let payload = &body[1..body_len - 4];
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&body[body_len - 4..]);
    let expected = u32::from_le_bytes(crc_bytes);

    let actual = checksum(type_tag, payload);
    if actual != expected {
        return Err(DecodeError::Corrupt {
            offset,
            message: format!("CRC mismatch: expected {:08x}, got {:08x}", expected, actual),
        });
    }

    if type_tag != TYPE_COMMIT {
        return Err(DecodeError::Corrupt {
            offset,
            message: format!("unknown record type {}", type_tag),
        });
    }

    let record: CommitRecord = rmp_serde::from_slice(payload).map_err(|e| DecodeError::Corrupt {
        offset,
        message: format!("undecodable commit record: {}", e),
    })?;

    Ok((record, frame_len))
}

fn checksum(type_tag: u8, payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[type_tag]);
    hasher.update(payload);
    hasher.finalize()
}
