//! Container framing for the serialized archive
//!
//! Wire format (version 2), little-endian throughout:
//!
//! ```text
//! magic[4] = "OPAR"
//! version  = u16
//! stageCnt = u16
//! repeat stageCnt times:
//!   nameLen  = u8
//!   paramLen = u16
//!   dataLen  = u32
//!   name     = nameLen bytes
//!   params   = paramLen bytes
//!   payload  = dataLen bytes
//! ```
//!
//! Required stage names: `compressed_data`, `string_boundaries`,
//! `dictionary`, `token_boundaries`. Unknown stages are skipped via the
//! dataLen framing.

use std::io::{Read, Write};

use crate::error::{Result, RowzipError};
use crate::io::CountingReader;

pub(crate) const ARCHIVE_MAGIC: [u8; 4] = *b"OPAR";
pub(crate) const ARCHIVE_VERSION: u16 = 2;

pub(crate) const STAGE_COMPRESSED_DATA: &[u8] = b"compressed_data";
pub(crate) const STAGE_STRING_BOUNDARIES: &[u8] = b"string_boundaries";
pub(crate) const STAGE_DICTIONARY: &[u8] = b"dictionary";
pub(crate) const STAGE_TOKEN_BOUNDARIES: &[u8] = b"token_boundaries";

/// Raw 16-bit (2-byte) token ids
pub(crate) const PARAM_WIDTH16: u8 = 2;
/// flate(raw 16-bit payload)
pub(crate) const PARAM_WIDTH16_FLATE: u8 = 3;
/// Byte codebook + escape stream over 16-bit token ids
pub(crate) const PARAM_WIDTH16_CODEBOOK: u8 = 4;
/// flate(codebook stream for 16-bit token ids)
pub(crate) const PARAM_WIDTH16_CODEBOOK_FLATE: u8 = 5;
/// Raw packed 12-bit token ids
pub(crate) const PARAM_WIDTH12: u8 = 12;
/// flate(raw 12-bit payload)
pub(crate) const PARAM_WIDTH12_FLATE: u8 = 13;
/// Byte codebook + escape stream over 12-bit token ids
pub(crate) const PARAM_WIDTH12_CODEBOOK: u8 = 14;
/// flate(codebook stream for 12-bit token ids)
pub(crate) const PARAM_WIDTH12_CODEBOOK_FLATE: u8 = 15;

pub(crate) const PARAM_STRING_BOUNDARIES_DELTA: u8 = 1;
/// Raw u32 boundaries
pub(crate) const PARAM_TOKEN_BOUNDARIES_RAW: u8 = 4;
/// First boundary + varint deltas
pub(crate) const PARAM_TOKEN_BOUNDARIES_DELTA: u8 = 5;

pub(crate) const MAX_ARCHIVE_STAGES: u16 = 64;
pub(crate) const MAX_STAGE_PAYLOAD_BYTES: usize = 1 << 30;
pub(crate) const MAX_COMPRESSED_TOKENS: usize = MAX_STAGE_PAYLOAD_BYTES / 2;
pub(crate) const MAX_STRING_BOUNDARY_COUNT: usize = MAX_STAGE_PAYLOAD_BYTES / 8;
pub(crate) const MAX_TOKEN_BOUNDARY_COUNT: usize = MAX_STAGE_PAYLOAD_BYTES / 4;
pub(crate) const MAX_STRING_BOUNDARY_VALUE: u64 = MAX_COMPRESSED_TOKENS as u64;

pub(crate) const CODEBOOK_ESCAPE: u8 = 0xFF;
pub(crate) const CODEBOOK_MAX_ENTRIES: usize = CODEBOOK_ESCAPE as usize;

/// Parsed fixed-size portion of a stage header plus the stage name
#[derive(Debug)]
pub(crate) struct StageHeader {
    pub(crate) name: Vec<u8>,
    pub(crate) param_len: u16,
    pub(crate) data_len: u32,
}

/// Map a stage name to its slot in the required-stage bitmap
pub(crate) fn required_stage_slot(name: &[u8]) -> Option<usize> {
    match name {
        STAGE_COMPRESSED_DATA => Some(0),
        STAGE_STRING_BOUNDARIES => Some(1),
        STAGE_DICTIONARY => Some(2),
        STAGE_TOKEN_BOUNDARIES => Some(3),
        _ => None,
    }
}

/// Stage names in the order encoders emit them; also the bitmap slot order
pub(crate) const REQUIRED_STAGE_NAMES: [&[u8]; 4] = [
    STAGE_COMPRESSED_DATA,
    STAGE_STRING_BOUNDARIES,
    STAGE_DICTIONARY,
    STAGE_TOKEN_BOUNDARIES,
];

/// Write one framed stage, returning the number of bytes written
pub(crate) fn write_stage<W: Write>(
    writer: &mut W,
    name: &[u8],
    params: &[u8],
    payload: &[u8],
) -> Result<u64> {
    if name.is_empty() || name.len() > u8::MAX as usize {
        return Err(RowzipError::invalid_format(format!(
            "invalid stage name length: {}",
            name.len()
        )));
    }
    if params.len() > u16::MAX as usize {
        return Err(RowzipError::limit_exceeded(format!(
            "stage params too large for {:?}: {}",
            String::from_utf8_lossy(name),
            params.len()
        )));
    }
    if payload.len() > MAX_STAGE_PAYLOAD_BYTES {
        return Err(RowzipError::limit_exceeded(format!(
            "stage payload too large for {:?}: {}",
            String::from_utf8_lossy(name),
            payload.len()
        )));
    }

    writer.write_all(&[name.len() as u8])?;
    writer.write_all(&(params.len() as u16).to_le_bytes())?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(name)?;
    writer.write_all(params)?;
    writer.write_all(payload)?;

    Ok(7 + name.len() as u64 + params.len() as u64 + payload.len() as u64)
}

/// Read one stage header (fixed fields plus name)
pub(crate) fn read_stage_header<R: Read>(reader: &mut CountingReader<R>) -> Result<StageHeader> {
    let name_len = reader.read_u8()?;
    if name_len == 0 {
        return Err(RowzipError::invalid_format("stage name length must be > 0"));
    }

    let param_len = reader.read_u16()?;
    let data_len = reader.read_u32()?;
    if data_len as usize > MAX_STAGE_PAYLOAD_BYTES {
        return Err(RowzipError::limit_exceeded(format!(
            "stage payload too large: {}",
            data_len
        )));
    }

    let mut name = vec![0u8; name_len as usize];
    reader.read_exact(&mut name)?;

    Ok(StageHeader {
        name,
        param_len,
        data_len,
    })
}
