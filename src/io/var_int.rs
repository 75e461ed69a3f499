//! Variable-length integer encoding
//!
//! This module provides variable-length integer encoding using the LEB128
//! (Little Endian Base 128) format. The encoding is space-efficient for small
//! integers while still supporting the full range of 64-bit values; the
//! archive codec uses it for boundary deltas.

use crate::error::{Result, RowzipError};

/// Utility struct for variable-length integer encoding/decoding
pub struct VarInt;

impl VarInt {
    /// Maximum number of bytes needed to encode a u64 as a varint
    pub const MAX_ENCODED_LEN: usize = 10;

    /// Append a u64 value as a variable-length integer to a byte buffer,
    /// returning the number of bytes written
    pub fn write_to_vec(buffer: &mut Vec<u8>, mut value: u64) -> usize {
        let mut bytes_written = 0;

        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;

            if value != 0 {
                byte |= 0x80; // Set continuation bit
            }

            buffer.push(byte);
            bytes_written += 1;

            if value == 0 {
                break;
            }
        }

        bytes_written
    }

    /// Decode a variable-length integer from the front of a byte slice
    ///
    /// Returns the decoded value and the number of bytes consumed.
    pub fn read_from_slice(bytes: &[u8]) -> Result<(u64, usize)> {
        let mut result = 0u64;
        let mut shift = 0u32;

        for (i, &byte) in bytes.iter().take(Self::MAX_ENCODED_LEN).enumerate() {
            if shift >= 64 {
                return Err(RowzipError::invalid_format("varint too long"));
            }

            result |= ((byte & 0x7F) as u64) << shift;

            if (byte & 0x80) == 0 {
                return Ok((result, i + 1));
            }

            shift += 7;
        }

        if bytes.len() < Self::MAX_ENCODED_LEN {
            Err(RowzipError::invalid_format("truncated varint"))
        } else {
            Err(RowzipError::invalid_format("varint too long"))
        }
    }
}
