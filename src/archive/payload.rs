//! Stage payload encoders and decoders
//!
//! The compressed_data and token_boundaries stages each have several
//! candidate encodings; encoders generate every feasible candidate and keep
//! the smallest, with earlier candidates winning ties. Decoders reject
//! payloads that are truncated, oversized, carry trailing bytes, or violate
//! the bit-width and monotonicity rules.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::archive::wire::{
    CODEBOOK_ESCAPE, CODEBOOK_MAX_ENTRIES, MAX_COMPRESSED_TOKENS, MAX_STAGE_PAYLOAD_BYTES,
    MAX_STRING_BOUNDARY_COUNT, MAX_STRING_BOUNDARY_VALUE, MAX_TOKEN_BOUNDARY_COUNT, PARAM_WIDTH12,
    PARAM_WIDTH12_CODEBOOK, PARAM_WIDTH12_CODEBOOK_FLATE, PARAM_WIDTH12_FLATE, PARAM_WIDTH16,
    PARAM_WIDTH16_CODEBOOK, PARAM_WIDTH16_CODEBOOK_FLATE, PARAM_WIDTH16_FLATE,
    PARAM_STRING_BOUNDARIES_DELTA, PARAM_TOKEN_BOUNDARIES_DELTA, PARAM_TOKEN_BOUNDARIES_RAW,
};
use crate::config::{MAX_TOKEN_ID_12BIT, TOKEN_BIT_WIDTH_12, TOKEN_BIT_WIDTH_16};
use crate::error::{Result, RowzipError};
use crate::io::{SliceReader, VarInt};

/// Packed byte length of `token_count` 12-bit ids
pub(crate) fn packed12_byte_size(token_count: usize) -> usize {
    (token_count * TOKEN_BIT_WIDTH_12 as usize + 7) / 8
}

// ---------------------------------------------------------------------------
// compressed_data stage
// ---------------------------------------------------------------------------

/// Encode the compressed_data stage, returning the payload and its param byte
///
/// Candidates are generated in fixed order (raw, flate, codebook,
/// codebook+flate) and the smallest payload wins; the earlier candidate wins
/// ties. The codebook variants are skipped when infeasible.
pub(crate) fn encode_compressed_data(
    compressed: &[u16],
    bit_width: u8,
) -> Result<(Vec<u8>, u8)> {
    if compressed.len() > MAX_COMPRESSED_TOKENS {
        return Err(RowzipError::limit_exceeded(format!(
            "compressed token count too large: {}",
            compressed.len()
        )));
    }

    let (raw_payload, raw_param, flate_param, codebook_param, codebook_flate_param) =
        match bit_width {
            TOKEN_BIT_WIDTH_12 => (
                encode_packed12(compressed)?,
                PARAM_WIDTH12,
                PARAM_WIDTH12_FLATE,
                PARAM_WIDTH12_CODEBOOK,
                PARAM_WIDTH12_CODEBOOK_FLATE,
            ),
            TOKEN_BIT_WIDTH_16 => (
                encode_raw16(compressed),
                PARAM_WIDTH16,
                PARAM_WIDTH16_FLATE,
                PARAM_WIDTH16_CODEBOOK,
                PARAM_WIDTH16_CODEBOOK_FLATE,
            ),
            other => {
                return Err(RowzipError::corrupted(format!(
                    "unsupported token bit width: {}",
                    other
                )))
            }
        };

    let mut candidates: Vec<(Vec<u8>, u8)> = Vec::with_capacity(4);
    let flate_payload = flate_compress(&raw_payload)?;
    candidates.push((flate_payload, flate_param));

    if let Ok(codebook_payload) = encode_codebook(compressed, bit_width) {
        let flate_codebook = flate_compress(&codebook_payload)?;
        candidates.push((codebook_payload, codebook_param));
        candidates.push((flate_codebook, codebook_flate_param));
    }

    let mut best = (raw_payload, raw_param);
    for candidate in candidates {
        if candidate.0.len() < best.0.len() {
            best = candidate;
        }
    }
    Ok(best)
}

/// Decode the compressed_data stage, returning the token ids and bit width
pub(crate) fn decode_compressed_data(params: &[u8], payload: &[u8]) -> Result<(Vec<u16>, u8)> {
    if params.len() != 1 {
        return Err(RowzipError::invalid_format(format!(
            "invalid compressed_data params: {:?}",
            params
        )));
    }

    match params[0] {
        PARAM_WIDTH16 => Ok((decode_raw16(payload)?, TOKEN_BIT_WIDTH_16)),
        PARAM_WIDTH12 => Ok((decode_packed12(payload)?, TOKEN_BIT_WIDTH_12)),
        PARAM_WIDTH16_FLATE => {
            let raw = flate_decompress(payload)?;
            Ok((decode_raw16(&raw)?, TOKEN_BIT_WIDTH_16))
        }
        PARAM_WIDTH12_FLATE => {
            let raw = flate_decompress(payload)?;
            Ok((decode_packed12(&raw)?, TOKEN_BIT_WIDTH_12))
        }
        PARAM_WIDTH16_CODEBOOK => Ok((
            decode_codebook(payload, TOKEN_BIT_WIDTH_16)?,
            TOKEN_BIT_WIDTH_16,
        )),
        PARAM_WIDTH16_CODEBOOK_FLATE => {
            let raw = flate_decompress(payload)?;
            Ok((decode_codebook(&raw, TOKEN_BIT_WIDTH_16)?, TOKEN_BIT_WIDTH_16))
        }
        PARAM_WIDTH12_CODEBOOK => Ok((
            decode_codebook(payload, TOKEN_BIT_WIDTH_12)?,
            TOKEN_BIT_WIDTH_12,
        )),
        PARAM_WIDTH12_CODEBOOK_FLATE => {
            let raw = flate_decompress(payload)?;
            Ok((decode_codebook(&raw, TOKEN_BIT_WIDTH_12)?, TOKEN_BIT_WIDTH_12))
        }
        _ => Err(RowzipError::invalid_format(format!(
            "invalid compressed_data params: {:?}",
            params
        ))),
    }
}

fn encode_raw16(compressed: &[u16]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + compressed.len() * 2);
    payload.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    for &token_id in compressed {
        payload.extend_from_slice(&token_id.to_le_bytes());
    }
    payload
}

fn decode_raw16(payload: &[u8]) -> Result<Vec<u16>> {
    let mut reader = SliceReader::new(payload);
    let compressed_len = reader.read_u32()? as usize;
    if compressed_len > MAX_COMPRESSED_TOKENS {
        return Err(RowzipError::limit_exceeded(format!(
            "compressed token count too large: {}",
            compressed_len
        )));
    }
    if reader.remaining() != compressed_len * 2 {
        return Err(RowzipError::invalid_format(format!(
            "compressed_data length mismatch: payload={} expected={}",
            reader.remaining(),
            compressed_len * 2
        )));
    }

    let bytes = reader.read_bytes(compressed_len * 2)?;
    let compressed = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(compressed)
}

fn encode_packed12(compressed: &[u16]) -> Result<Vec<u8>> {
    for (i, &token_id) in compressed.iter().enumerate() {
        if token_id > MAX_TOKEN_ID_12BIT {
            return Err(RowzipError::corrupted(format!(
                "compressed token out of 12-bit range at index {}: {}",
                i, token_id
            )));
        }
    }

    let packed_len = packed12_byte_size(compressed.len());
    let mut payload = Vec::with_capacity(4 + packed_len);
    payload.extend_from_slice(&(compressed.len() as u32).to_le_bytes());

    let mut bit_buf = 0u32;
    let mut bits_in_buf = 0u32;
    for &token_id in compressed {
        bit_buf |= (token_id as u32) << bits_in_buf;
        bits_in_buf += TOKEN_BIT_WIDTH_12 as u32;
        while bits_in_buf >= 8 {
            payload.push(bit_buf as u8);
            bit_buf >>= 8;
            bits_in_buf -= 8;
        }
    }
    if bits_in_buf > 0 {
        payload.push(bit_buf as u8);
    }

    debug_assert_eq!(payload.len(), 4 + packed_len);
    Ok(payload)
}

fn decode_packed12(payload: &[u8]) -> Result<Vec<u16>> {
    let mut reader = SliceReader::new(payload);
    let compressed_len = reader.read_u32()? as usize;
    if compressed_len > MAX_COMPRESSED_TOKENS {
        return Err(RowzipError::limit_exceeded(format!(
            "compressed token count too large: {}",
            compressed_len
        )));
    }

    let expected = packed12_byte_size(compressed_len);
    if reader.remaining() != expected {
        return Err(RowzipError::invalid_format(format!(
            "compressed_data length mismatch: payload={} expected={}",
            reader.remaining(),
            expected
        )));
    }
    let packed = reader.read_bytes(expected)?;

    let mut compressed = Vec::with_capacity(compressed_len);
    let mut in_idx = 0;
    let mut bit_buf = 0u32;
    let mut bits_in_buf = 0u32;
    for i in 0..compressed_len {
        while bits_in_buf < TOKEN_BIT_WIDTH_12 as u32 {
            if in_idx >= packed.len() {
                return Err(RowzipError::invalid_format(format!(
                    "compressed_data 12-bit payload underrun at token {}",
                    i
                )));
            }
            bit_buf |= (packed[in_idx] as u32) << bits_in_buf;
            in_idx += 1;
            bits_in_buf += 8;
        }
        compressed.push((bit_buf & MAX_TOKEN_ID_12BIT as u32) as u16);
        bit_buf >>= TOKEN_BIT_WIDTH_12;
        bits_in_buf -= TOKEN_BIT_WIDTH_12 as u32;
    }
    if in_idx != packed.len() {
        return Err(RowzipError::invalid_format(format!(
            "compressed_data 12-bit payload overrun: used {} bytes, have {}",
            in_idx,
            packed.len()
        )));
    }
    if bit_buf != 0 {
        return Err(RowzipError::invalid_format(
            "compressed_data 12-bit payload has non-zero padding",
        ));
    }
    Ok(compressed)
}

fn encode_codebook(compressed: &[u16], bit_width: u8) -> Result<Vec<u8>> {
    if compressed.len() > MAX_COMPRESSED_TOKENS {
        return Err(RowzipError::limit_exceeded(format!(
            "compressed token count too large: {}",
            compressed.len()
        )));
    }

    let mut max_token_id = 0u16;
    for (i, &token_id) in compressed.iter().enumerate() {
        if bit_width == TOKEN_BIT_WIDTH_12 && token_id > MAX_TOKEN_ID_12BIT {
            return Err(RowzipError::corrupted(format!(
                "compressed token out of 12-bit range at index {}: {}",
                i, token_id
            )));
        }
        max_token_id = max_token_id.max(token_id);
    }

    let mut counts = vec![0u32; max_token_id as usize + 1];
    for &token_id in compressed {
        counts[token_id as usize] += 1;
    }

    let mut frequencies: Vec<(u16, u32)> = counts
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(token_id, &count)| (token_id as u16, count))
        .collect();
    // Descending frequency, ties broken by ascending token id.
    frequencies.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let codebook_len = frequencies.len().min(CODEBOOK_MAX_ENTRIES);

    let mut code_by_token = vec![CODEBOOK_ESCAPE; counts.len()];
    for (code, &(token_id, _)) in frequencies[..codebook_len].iter().enumerate() {
        code_by_token[token_id as usize] = code as u8;
    }

    let mut payload_len = 4u64 + 2 + codebook_len as u64 * 2;
    for &token_id in compressed {
        if code_by_token[token_id as usize] == CODEBOOK_ESCAPE {
            payload_len += 3;
        } else {
            payload_len += 1;
        }
    }
    if payload_len > MAX_STAGE_PAYLOAD_BYTES as u64 {
        return Err(RowzipError::limit_exceeded(format!(
            "compressed_data codebook payload too large: {}",
            payload_len
        )));
    }

    let mut payload = Vec::with_capacity(payload_len as usize);
    payload.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    payload.extend_from_slice(&(codebook_len as u16).to_le_bytes());
    for &(token_id, _) in &frequencies[..codebook_len] {
        payload.extend_from_slice(&token_id.to_le_bytes());
    }

    for &token_id in compressed {
        let code = code_by_token[token_id as usize];
        if code != CODEBOOK_ESCAPE {
            payload.push(code);
        } else {
            payload.push(CODEBOOK_ESCAPE);
            payload.extend_from_slice(&token_id.to_le_bytes());
        }
    }

    if payload.len() as u64 != payload_len {
        return Err(RowzipError::invalid_format(format!(
            "compressed_data codebook payload mismatch: wrote {} bytes, expected {}",
            payload.len(),
            payload_len
        )));
    }
    Ok(payload)
}

fn decode_codebook(payload: &[u8], bit_width: u8) -> Result<Vec<u16>> {
    if payload.len() < 6 {
        return Err(RowzipError::invalid_format(format!(
            "compressed_data codebook payload too short: {}",
            payload.len()
        )));
    }

    let mut reader = SliceReader::new(payload);
    let compressed_len = reader.read_u32()? as usize;
    if compressed_len > MAX_COMPRESSED_TOKENS {
        return Err(RowzipError::limit_exceeded(format!(
            "compressed token count too large: {}",
            compressed_len
        )));
    }

    let codebook_len = reader.read_u16()? as usize;
    if codebook_len > CODEBOOK_MAX_ENTRIES {
        return Err(RowzipError::invalid_format(format!(
            "compressed_data codebook length too large: {}",
            codebook_len
        )));
    }
    if reader.remaining() < codebook_len * 2 {
        return Err(RowzipError::invalid_format(format!(
            "compressed_data codebook payload too short for dictionary: {}",
            payload.len()
        )));
    }

    let mut codebook = Vec::with_capacity(codebook_len);
    for code in 0..codebook_len {
        let token_id = reader.read_u16()?;
        if bit_width == TOKEN_BIT_WIDTH_12 && token_id > MAX_TOKEN_ID_12BIT {
            return Err(RowzipError::invalid_format(format!(
                "compressed_data codebook token out of 12-bit range at code {}: {}",
                code, token_id
            )));
        }
        codebook.push(token_id);
    }

    let stream = reader.read_bytes(reader.remaining())?;
    let mut compressed = Vec::with_capacity(compressed_len);
    let mut in_idx = 0;
    for i in 0..compressed_len {
        if in_idx >= stream.len() {
            return Err(RowzipError::invalid_format(format!(
                "compressed_data codebook payload underrun at token {}",
                i
            )));
        }

        let code = stream[in_idx];
        in_idx += 1;
        if code != CODEBOOK_ESCAPE {
            let code_idx = code as usize;
            if code_idx >= codebook.len() {
                return Err(RowzipError::invalid_format(format!(
                    "compressed_data codebook index out of range at token {}: {}",
                    i, code_idx
                )));
            }
            compressed.push(codebook[code_idx]);
            continue;
        }

        if in_idx + 2 > stream.len() {
            return Err(RowzipError::invalid_format(format!(
                "compressed_data codebook escape underrun at token {}",
                i
            )));
        }
        let token_id = u16::from_le_bytes([stream[in_idx], stream[in_idx + 1]]);
        in_idx += 2;
        if bit_width == TOKEN_BIT_WIDTH_12 && token_id > MAX_TOKEN_ID_12BIT {
            return Err(RowzipError::invalid_format(format!(
                "compressed_data codebook escape token out of 12-bit range at token {}: {}",
                i, token_id
            )));
        }
        compressed.push(token_id);
    }

    if in_idx != stream.len() {
        return Err(RowzipError::invalid_format(format!(
            "compressed_data codebook trailing bytes: {}",
            stream.len() - in_idx
        )));
    }
    Ok(compressed)
}

// ---------------------------------------------------------------------------
// flate helpers
// ---------------------------------------------------------------------------

/// Raw-deflate (RFC 1951, no container) at maximum compression
pub(crate) fn flate_compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

/// Inflate a raw-deflate payload, capping the inflated size
pub(crate) fn flate_decompress(payload: &[u8]) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    let mut decoder = DeflateDecoder::new(payload).take(MAX_STAGE_PAYLOAD_BYTES as u64 + 1);
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| RowzipError::invalid_format(format!("flate payload: {}", e)))?;
    if raw.len() > MAX_STAGE_PAYLOAD_BYTES {
        return Err(RowzipError::limit_exceeded(
            "flate payload expands beyond limit",
        ));
    }
    Ok(raw)
}

// ---------------------------------------------------------------------------
// string_boundaries stage
// ---------------------------------------------------------------------------

pub(crate) fn encode_string_boundaries(boundaries: &[u32]) -> Result<Vec<u8>> {
    if boundaries.len() > MAX_STRING_BOUNDARY_COUNT {
        return Err(RowzipError::limit_exceeded(format!(
            "string boundary count too large: {}",
            boundaries.len()
        )));
    }

    let mut payload = Vec::with_capacity(12 + boundaries.len() * 2);
    payload.extend_from_slice(&(boundaries.len() as u32).to_le_bytes());
    if boundaries.is_empty() {
        return Ok(payload);
    }

    if boundaries[0] as u64 > MAX_STRING_BOUNDARY_VALUE {
        return Err(RowzipError::limit_exceeded(format!(
            "first string boundary exceeds max supported value: {}",
            boundaries[0]
        )));
    }
    payload.extend_from_slice(&(boundaries[0] as u64).to_le_bytes());

    let mut delta_buf = Vec::with_capacity(boundaries.len() * 2);
    for i in 1..boundaries.len() {
        if boundaries[i] < boundaries[i - 1] {
            return Err(RowzipError::corrupted(format!(
                "string boundaries not monotonic at index {}",
                i
            )));
        }
        VarInt::write_to_vec(&mut delta_buf, (boundaries[i] - boundaries[i - 1]) as u64);
    }

    payload.extend_from_slice(&(delta_buf.len() as u32).to_le_bytes());
    payload.extend_from_slice(&delta_buf);
    Ok(payload)
}

pub(crate) fn decode_string_boundaries(params: &[u8], payload: &[u8]) -> Result<Vec<u32>> {
    if params.len() != 1 || params[0] != PARAM_STRING_BOUNDARIES_DELTA {
        return Err(RowzipError::invalid_format(format!(
            "invalid string_boundaries params: {:?}",
            params
        )));
    }

    let mut reader = SliceReader::new(payload);
    let boundaries_len = reader.read_u32()? as usize;
    if boundaries_len > MAX_STRING_BOUNDARY_COUNT {
        return Err(RowzipError::limit_exceeded(format!(
            "string boundary count too large: {}",
            boundaries_len
        )));
    }

    if boundaries_len == 0 {
        if !reader.is_empty() {
            return Err(RowzipError::invalid_format(format!(
                "string_boundaries trailing bytes: {}",
                reader.remaining()
            )));
        }
        return Ok(Vec::new());
    }
    if reader.remaining() < 12 {
        return Err(RowzipError::invalid_format(
            "string_boundaries missing first boundary or delta length",
        ));
    }

    let first = reader.read_u64()?;
    if first > MAX_STRING_BOUNDARY_VALUE {
        return Err(RowzipError::limit_exceeded(format!(
            "first string boundary exceeds max supported value: {}",
            first
        )));
    }

    let delta_buf_len = reader.read_u32()? as usize;
    if delta_buf_len > reader.remaining() {
        return Err(RowzipError::invalid_format(format!(
            "delta buffer length {} exceeds remaining payload {}",
            delta_buf_len,
            reader.remaining()
        )));
    }
    if boundaries_len - 1 > delta_buf_len {
        return Err(RowzipError::invalid_format(format!(
            "delta buffer too short for {} boundaries: {}",
            boundaries_len, delta_buf_len
        )));
    }

    let delta_buf = reader.read_bytes(delta_buf_len)?;
    if !reader.is_empty() {
        return Err(RowzipError::invalid_format(format!(
            "string_boundaries trailing bytes: {}",
            reader.remaining()
        )));
    }

    let mut boundaries = Vec::with_capacity(boundaries_len);
    boundaries.push(first as u32);
    let mut offset = 0;
    let mut current = first;
    for i in 1..boundaries_len {
        let (delta, consumed) = VarInt::read_from_slice(&delta_buf[offset..]).map_err(|_| {
            RowzipError::invalid_format(format!("failed to decode boundary delta at index {}", i))
        })?;
        offset += consumed;
        if delta > MAX_STRING_BOUNDARY_VALUE - current {
            return Err(RowzipError::limit_exceeded(format!(
                "boundary delta exceeds max supported value at index {}",
                i
            )));
        }
        current += delta;
        boundaries.push(current as u32);
    }
    if offset != delta_buf.len() {
        return Err(RowzipError::invalid_format(format!(
            "unused bytes in boundary delta buffer: {}",
            delta_buf.len() - offset
        )));
    }

    Ok(boundaries)
}

// ---------------------------------------------------------------------------
// dictionary stage
// ---------------------------------------------------------------------------

pub(crate) fn encode_dictionary(dictionary: &[u8]) -> Result<Vec<u8>> {
    if dictionary.len() > MAX_STAGE_PAYLOAD_BYTES {
        return Err(RowzipError::limit_exceeded(format!(
            "dictionary too large: {}",
            dictionary.len()
        )));
    }

    let mut payload = Vec::with_capacity(4 + dictionary.len());
    payload.extend_from_slice(&(dictionary.len() as u32).to_le_bytes());
    payload.extend_from_slice(dictionary);
    Ok(payload)
}

pub(crate) fn decode_dictionary(params: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    if !params.is_empty() {
        return Err(RowzipError::invalid_format(format!(
            "invalid dictionary params: {:?}",
            params
        )));
    }

    let mut reader = SliceReader::new(payload);
    let dict_len = reader.read_u32()? as usize;
    if dict_len > MAX_STAGE_PAYLOAD_BYTES {
        return Err(RowzipError::limit_exceeded(format!(
            "dictionary length too large: {}",
            dict_len
        )));
    }
    if reader.remaining() != dict_len {
        return Err(RowzipError::invalid_format(format!(
            "dictionary length mismatch: payload={} expected={}",
            reader.remaining(),
            dict_len
        )));
    }

    let dictionary = reader.read_bytes(dict_len)?.to_vec();
    Ok(dictionary)
}

// ---------------------------------------------------------------------------
// token_boundaries stage
// ---------------------------------------------------------------------------

/// Encode the token_boundaries stage, returning the payload and param byte
///
/// Both the raw fixed-width and delta encodings are computed; the smaller
/// wins and raw wins ties.
pub(crate) fn encode_token_boundaries(boundaries: &[u32]) -> Result<(Vec<u8>, u8)> {
    if boundaries.len() > MAX_TOKEN_BOUNDARY_COUNT {
        return Err(RowzipError::limit_exceeded(format!(
            "token boundary count too large: {}",
            boundaries.len()
        )));
    }

    let raw_payload = encode_token_boundaries_raw(boundaries);
    let delta_payload = encode_token_boundaries_delta(boundaries)?;
    if delta_payload.len() < raw_payload.len() {
        Ok((delta_payload, PARAM_TOKEN_BOUNDARIES_DELTA))
    } else {
        Ok((raw_payload, PARAM_TOKEN_BOUNDARIES_RAW))
    }
}

fn encode_token_boundaries_raw(boundaries: &[u32]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + boundaries.len() * 4);
    payload.extend_from_slice(&(boundaries.len() as u32).to_le_bytes());
    for &boundary in boundaries {
        payload.extend_from_slice(&boundary.to_le_bytes());
    }
    payload
}

fn encode_token_boundaries_delta(boundaries: &[u32]) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(8 + boundaries.len() * 2);
    payload.extend_from_slice(&(boundaries.len() as u32).to_le_bytes());
    if boundaries.is_empty() {
        return Ok(payload);
    }
    payload.extend_from_slice(&boundaries[0].to_le_bytes());

    let mut delta_buf = Vec::with_capacity(boundaries.len() * 2);
    for i in 1..boundaries.len() {
        if boundaries[i] < boundaries[i - 1] {
            return Err(RowzipError::corrupted(format!(
                "token boundaries not monotonic at index {}",
                i
            )));
        }
        VarInt::write_to_vec(&mut delta_buf, (boundaries[i] - boundaries[i - 1]) as u64);
    }

    payload.extend_from_slice(&(delta_buf.len() as u32).to_le_bytes());
    payload.extend_from_slice(&delta_buf);
    Ok(payload)
}

pub(crate) fn decode_token_boundaries(params: &[u8], payload: &[u8]) -> Result<Vec<u32>> {
    if params.len() != 1 {
        return Err(RowzipError::invalid_format(format!(
            "invalid token_boundaries params: {:?}",
            params
        )));
    }

    match params[0] {
        PARAM_TOKEN_BOUNDARIES_RAW => decode_token_boundaries_raw(payload),
        PARAM_TOKEN_BOUNDARIES_DELTA => decode_token_boundaries_delta(payload),
        _ => Err(RowzipError::invalid_format(format!(
            "invalid token_boundaries params: {:?}",
            params
        ))),
    }
}

fn decode_token_boundaries_raw(payload: &[u8]) -> Result<Vec<u32>> {
    let mut reader = SliceReader::new(payload);
    let boundaries_len = reader.read_u32()? as usize;
    if boundaries_len > MAX_TOKEN_BOUNDARY_COUNT {
        return Err(RowzipError::limit_exceeded(format!(
            "token boundary count too large: {}",
            boundaries_len
        )));
    }
    if reader.remaining() != boundaries_len * 4 {
        return Err(RowzipError::invalid_format(format!(
            "token_boundaries length mismatch: payload={} expected={}",
            reader.remaining(),
            boundaries_len * 4
        )));
    }

    let bytes = reader.read_bytes(boundaries_len * 4)?;
    let boundaries = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(boundaries)
}

fn decode_token_boundaries_delta(payload: &[u8]) -> Result<Vec<u32>> {
    let mut reader = SliceReader::new(payload);
    let boundaries_len = reader.read_u32()? as usize;
    if boundaries_len > MAX_TOKEN_BOUNDARY_COUNT {
        return Err(RowzipError::limit_exceeded(format!(
            "token boundary count too large: {}",
            boundaries_len
        )));
    }
    if boundaries_len == 0 {
        if !reader.is_empty() {
            return Err(RowzipError::invalid_format(format!(
                "token_boundaries trailing bytes: {}",
                reader.remaining()
            )));
        }
        return Ok(Vec::new());
    }
    if reader.remaining() < 8 {
        return Err(RowzipError::invalid_format(
            "token_boundaries missing first boundary or delta length",
        ));
    }

    let first = reader.read_u32()?;
    let delta_buf_len = reader.read_u32()? as usize;
    if delta_buf_len > reader.remaining() {
        return Err(RowzipError::invalid_format(format!(
            "delta buffer length {} exceeds remaining payload {}",
            delta_buf_len,
            reader.remaining()
        )));
    }
    if boundaries_len - 1 > delta_buf_len {
        return Err(RowzipError::invalid_format(format!(
            "delta buffer too short for {} boundaries: {}",
            boundaries_len, delta_buf_len
        )));
    }

    let delta_buf = reader.read_bytes(delta_buf_len)?;
    if !reader.is_empty() {
        return Err(RowzipError::invalid_format(format!(
            "token_boundaries trailing bytes: {}",
            reader.remaining()
        )));
    }

    let mut boundaries = Vec::with_capacity(boundaries_len);
    boundaries.push(first);
    let mut offset = 0;
    for i in 1..boundaries_len {
        let (delta, consumed) = VarInt::read_from_slice(&delta_buf[offset..]).map_err(|_| {
            RowzipError::invalid_format(format!("invalid token boundary delta at index {}", i))
        })?;
        offset += consumed;
        let next = boundaries[i - 1] as u64 + delta;
        if next > u32::MAX as u64 {
            return Err(RowzipError::invalid_format(format!(
                "token boundary overflow at index {}",
                i
            )));
        }
        boundaries.push(next as u32);
    }
    if offset != delta_buf.len() {
        return Err(RowzipError::invalid_format(format!(
            "token_boundaries delta trailing bytes: {}",
            delta_buf.len() - offset
        )));
    }
    Ok(boundaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw16_round_trip() {
        let tokens = vec![0u16, 1, 255, 256, 65535];
        let payload = encode_raw16(&tokens);
        assert_eq!(payload.len(), 4 + tokens.len() * 2);
        assert_eq!(decode_raw16(&payload).unwrap(), tokens);
    }

    #[test]
    fn test_raw16_rejects_length_mismatch() {
        let tokens = vec![1u16, 2, 3];
        let mut payload = encode_raw16(&tokens);
        payload.push(0);
        assert!(decode_raw16(&payload).is_err());
        payload.truncate(payload.len() - 2);
        assert!(decode_raw16(&payload).is_err());
    }

    #[test]
    fn test_packed12_size_law() {
        for n in 0..50usize {
            let tokens: Vec<u16> = (0..n as u16).collect();
            let payload = encode_packed12(&tokens).unwrap();
            assert_eq!(payload.len(), 4 + (n * 12 + 7) / 8);
            assert_eq!(decode_packed12(&payload).unwrap(), tokens);
        }
    }

    #[test]
    fn test_packed12_rejects_out_of_range() {
        let err = encode_packed12(&[4096]).unwrap_err();
        assert_eq!(err.category(), "corrupted");
        assert!(encode_packed12(&[4095]).is_ok());
    }

    #[test]
    fn test_packed12_rejects_nonzero_padding() {
        let tokens = vec![4095u16];
        let mut payload = encode_packed12(&tokens).unwrap();
        // One 12-bit value packs into two bytes with four padding bits.
        let last = payload.len() - 1;
        payload[last] |= 0xF0;
        let err = decode_packed12(&payload).unwrap_err();
        assert!(format!("{}", err).contains("padding"));
    }

    #[test]
    fn test_codebook_round_trip_and_escape() {
        // 300 distinct ids exceed the 255-entry codebook, forcing escapes.
        let mut tokens = Vec::new();
        for id in 0..300u16 {
            for _ in 0..(300 - id) {
                tokens.push(id);
            }
        }
        let payload = encode_codebook(&tokens, TOKEN_BIT_WIDTH_16).unwrap();
        let codebook_len = u16::from_le_bytes([payload[4], payload[5]]) as usize;
        assert_eq!(codebook_len, CODEBOOK_MAX_ENTRIES);
        assert_eq!(decode_codebook(&payload, TOKEN_BIT_WIDTH_16).unwrap(), tokens);
    }

    #[test]
    fn test_codebook_orders_by_frequency_then_id() {
        // id 7 occurs three times, ids 3 and 5 twice; ties order by id.
        let tokens = vec![7u16, 3, 5, 7, 3, 5, 7];
        let payload = encode_codebook(&tokens, TOKEN_BIT_WIDTH_16).unwrap();
        let codebook_len = u16::from_le_bytes([payload[4], payload[5]]) as usize;
        assert_eq!(codebook_len, 3);
        let first = u16::from_le_bytes([payload[6], payload[7]]);
        let second = u16::from_le_bytes([payload[8], payload[9]]);
        let third = u16::from_le_bytes([payload[10], payload[11]]);
        assert_eq!((first, second, third), (7, 3, 5));
    }

    #[test]
    fn test_codebook_rejects_corruption() {
        let tokens = vec![1u16, 2, 3, 1, 2, 1];
        let payload = encode_codebook(&tokens, TOKEN_BIT_WIDTH_16).unwrap();

        let mut trailing = payload.clone();
        trailing.push(0);
        assert!(decode_codebook(&trailing, TOKEN_BIT_WIDTH_16).is_err());

        let mut truncated = payload.clone();
        truncated.pop();
        assert!(decode_codebook(&truncated, TOKEN_BIT_WIDTH_16).is_err());

        // An escape byte at the very end underruns its two literal bytes.
        let mut escape_underrun = payload.clone();
        let last = escape_underrun.len() - 1;
        escape_underrun[last] = CODEBOOK_ESCAPE;
        assert!(decode_codebook(&escape_underrun, TOKEN_BIT_WIDTH_16).is_err());
    }

    #[test]
    fn test_codebook_12_bit_range_validation() {
        let err = encode_codebook(&[5000], TOKEN_BIT_WIDTH_12).unwrap_err();
        assert_eq!(err.category(), "corrupted");

        // A 16-bit codebook payload with a large id must not decode as 12-bit.
        let tokens = vec![5000u16, 5000, 5000];
        let payload = encode_codebook(&tokens, TOKEN_BIT_WIDTH_16).unwrap();
        assert!(decode_codebook(&payload, TOKEN_BIT_WIDTH_12).is_err());
    }

    #[test]
    fn test_flate_round_trip() {
        let raw: Vec<u8> = b"abcabcabcabc".iter().copied().cycle().take(4096).collect();
        let compressed = flate_compress(&raw).unwrap();
        assert!(compressed.len() < raw.len());
        assert_eq!(flate_decompress(&compressed).unwrap(), raw);
    }

    #[test]
    fn test_flate_rejects_garbage() {
        assert!(flate_decompress(&[0xDE, 0xAD, 0xBE, 0xEF]).is_err());
    }

    #[test]
    fn test_compressed_data_candidate_selection() {
        // Highly repetitive stream: flate beats raw by a wide margin.
        let tokens = vec![300u16; 10_000];
        let (payload, param) = encode_compressed_data(&tokens, TOKEN_BIT_WIDTH_16).unwrap();
        assert!(param == PARAM_WIDTH16_FLATE || param == PARAM_WIDTH16_CODEBOOK_FLATE);
        assert!(payload.len() < 4 + tokens.len() * 2);

        let (decoded, width) = decode_compressed_data(&[param], &payload).unwrap();
        assert_eq!(decoded, tokens);
        assert_eq!(width, TOKEN_BIT_WIDTH_16);
    }

    #[test]
    fn test_compressed_data_raw_wins_small_inputs() {
        // Tiny incompressible-ish input: raw candidate wins on size (ties
        // resolve to raw because it is listed first).
        let tokens = vec![9u16];
        let (payload, param) = encode_compressed_data(&tokens, TOKEN_BIT_WIDTH_16).unwrap();
        assert_eq!(param, PARAM_WIDTH16);
        assert_eq!(payload, encode_raw16(&tokens));
    }

    #[test]
    fn test_compressed_data_12_bit_variants() {
        let tokens: Vec<u16> = (0..5000).map(|i| (i % 4096) as u16).collect();
        let (payload, param) = encode_compressed_data(&tokens, TOKEN_BIT_WIDTH_12).unwrap();
        let (decoded, width) = decode_compressed_data(&[param], &payload).unwrap();
        assert_eq!(decoded, tokens);
        assert_eq!(width, TOKEN_BIT_WIDTH_12);
    }

    #[test]
    fn test_compressed_data_rejects_unknown_param() {
        let payload = encode_raw16(&[1, 2, 3]);
        assert!(decode_compressed_data(&[99], &payload).is_err());
        assert!(decode_compressed_data(&[], &payload).is_err());
        assert!(decode_compressed_data(&[2, 2], &payload).is_err());
    }

    #[test]
    fn test_string_boundaries_round_trip() {
        let boundaries = vec![0u32, 0, 3, 3, 10, 10];
        let payload = encode_string_boundaries(&boundaries).unwrap();
        let decoded = decode_string_boundaries(&[PARAM_STRING_BOUNDARIES_DELTA], &payload).unwrap();
        assert_eq!(decoded, boundaries);
    }

    #[test]
    fn test_string_boundaries_reject_non_monotonic() {
        let err = encode_string_boundaries(&[0, 5, 3]).unwrap_err();
        assert_eq!(err.category(), "corrupted");
    }

    #[test]
    fn test_string_boundaries_reject_trailing_bytes() {
        let mut payload = encode_string_boundaries(&[0, 1, 2]).unwrap();
        payload.push(0);
        assert!(decode_string_boundaries(&[PARAM_STRING_BOUNDARIES_DELTA], &payload).is_err());
    }

    #[test]
    fn test_string_boundaries_reject_bad_params() {
        let payload = encode_string_boundaries(&[0, 1]).unwrap();
        assert!(decode_string_boundaries(&[9], &payload).is_err());
        assert!(decode_string_boundaries(&[], &payload).is_err());
    }

    #[test]
    fn test_dictionary_round_trip() {
        let dict = b"hello world dictionary".to_vec();
        let payload = encode_dictionary(&dict).unwrap();
        assert_eq!(decode_dictionary(&[], &payload).unwrap(), dict);

        assert!(decode_dictionary(&[1], &payload).is_err());
        let mut trailing = payload.clone();
        trailing.push(0);
        assert!(decode_dictionary(&[], &trailing).is_err());
    }

    #[test]
    fn test_token_boundaries_picks_smaller_encoding() {
        // Small deltas compress well: delta must win.
        let boundaries: Vec<u32> = (0..1000u32).collect();
        let (payload, param) = encode_token_boundaries(&boundaries).unwrap();
        assert_eq!(param, PARAM_TOKEN_BOUNDARIES_DELTA);
        assert!(payload.len() < 4 + boundaries.len() * 4);
        assert_eq!(
            decode_token_boundaries(&[param], &payload).unwrap(),
            boundaries
        );

        // Huge deltas make the varint form larger: raw must win.
        let boundaries: Vec<u32> = (0..100u32).map(|i| i * 40_000_000).collect();
        let (payload, param) = encode_token_boundaries(&boundaries).unwrap();
        assert_eq!(param, PARAM_TOKEN_BOUNDARIES_RAW);
        assert_eq!(
            decode_token_boundaries(&[param], &payload).unwrap(),
            boundaries
        );
    }

    #[test]
    fn test_token_boundaries_delta_overflow() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&2u32.to_le_bytes());
        payload.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut delta_buf = Vec::new();
        VarInt::write_to_vec(&mut delta_buf, 1);
        payload.extend_from_slice(&(delta_buf.len() as u32).to_le_bytes());
        payload.extend_from_slice(&delta_buf);

        let err = decode_token_boundaries(&[PARAM_TOKEN_BOUNDARIES_DELTA], &payload).unwrap_err();
        assert!(format!("{}", err).contains("overflow"));
    }
}
