//! Record framing.
//!
//! ```text
//! +--------+-----------+-------------+-----------------+
//! | magic  | len (LE)  | checksum BE | payload         |
//! | 4 bytes| 4 bytes   | 4 bytes     | len bytes       |
//! +--------+-----------+-------------+-----------------+
//! ```

use crate::error::{StorageError, StorageResult};
use sha2::{Digest, Sha256};

/// Magic bytes opening every record frame.
pub const RECORD_MAGIC: [u8; 4] = *b"DSJ1";

/// Size of the frame header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Largest payload a single frame may carry.
const MAX_PAYLOAD: usize = u32::MAX as usize;

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Frames a payload as a journal record.
///
/// # Errors
///
/// Returns [`StorageError::RecordTooLarge`] if the payload length does not
/// fit the 32-bit length field.
pub fn encode_record(payload: &[u8]) -> StorageResult<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(StorageError::RecordTooLarge { len: payload.len() });
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&RECORD_MAGIC);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&checksum(payload));
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decodes consecutive frames from `bytes`.
///
/// Returns the intact payloads and the length of the valid prefix. Decoding
/// stops at the first frame that is incomplete, lacks the magic marker or
/// fails its checksum; everything after that point is considered torn.
pub fn decode_records(bytes: &[u8]) -> (Vec<Vec<u8>>, usize) {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while bytes.len() - offset >= HEADER_SIZE {
        let header = &bytes[offset..offset + HEADER_SIZE];
        if header[0..4] != RECORD_MAGIC {
            break;
        }

        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let start = offset + HEADER_SIZE;
        let Some(end) = start.checked_add(len) else {
            break;
        };
        if end > bytes.len() {
            break;
        }

        let payload = &bytes[start..end];
        if header[8..12] != checksum(payload) {
            break;
        }

        records.push(payload.to_vec());
        offset = end;
    }

    (records, offset)
}
