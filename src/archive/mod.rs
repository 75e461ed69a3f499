//! Random-access archive container
//!
//! An [`Archive`] owns the compressed token stream, per-row boundaries, the
//! token dictionary and its boundaries. Any row can be decoded independently
//! by walking its token id range and concatenating the dictionary payloads.
//!
//! Archives are logically immutable after construction. The read operations
//! take `&self`, keep no internal scratch state, and may run concurrently
//! from multiple threads as long as each caller supplies its own output
//! buffer.
//!
//! Serialization uses a staged container with multiple candidate payload
//! encodings per stage; decoding validates structure before the archive
//! becomes visible to the caller.

mod payload;
mod wire;

use std::io::{Read, Write};

use crate::config::{MAX_TOKEN_ID_12BIT, TOKEN_BIT_WIDTH_12, TOKEN_BIT_WIDTH_16};
use crate::error::{Result, RowzipError};
use crate::io::CountingReader;

pub(crate) use payload::packed12_byte_size;

/// Compressed row collection with random access decoding
///
/// The four arrays are deliberately public: tooling and tests inspect and
/// transform them directly. [`Archive::validate`] checks the invariants that
/// tie them together, and runs automatically around serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    /// Sequence of token ids for all rows
    pub compressed_data: Vec<u16>,
    /// End position of each row in `compressed_data`, preceded by 0
    pub string_boundaries: Vec<u32>,
    /// Raw token payload bytes
    pub dictionary: Vec<u8>,
    /// End position of each token in `dictionary`, preceded by 0
    pub token_boundaries: Vec<u32>,
    /// Encoded token bit width (0 is treated as 16)
    token_bit_width: u8,
}

impl Archive {
    pub(crate) fn from_parts(
        compressed_data: Vec<u16>,
        string_boundaries: Vec<u32>,
        dictionary: Vec<u8>,
        token_boundaries: Vec<u32>,
        token_bit_width: u8,
    ) -> Self {
        Self {
            compressed_data,
            string_boundaries,
            dictionary,
            token_boundaries,
            token_bit_width,
        }
    }

    /// The effective encoded token bit width (12 or 16)
    pub fn token_bit_width(&self) -> u8 {
        match self.token_bit_width {
            TOKEN_BIT_WIDTH_12 => TOKEN_BIT_WIDTH_12,
            _ => TOKEN_BIT_WIDTH_16,
        }
    }

    /// Number of rows encoded in this archive
    pub fn rows(&self) -> usize {
        self.string_boundaries.len().saturating_sub(1)
    }

    fn row_token_range(&self, index: usize) -> Result<(usize, usize)> {
        let rows = self.rows();
        if index >= rows {
            return Err(RowzipError::out_of_bounds(index, rows));
        }
        let start = self.string_boundaries[index] as usize;
        let end = self.string_boundaries[index + 1] as usize;
        if end < start || end > self.compressed_data.len() {
            return Err(RowzipError::corrupted(format!(
                "string boundaries for row {}",
                index
            )));
        }
        Ok((start, end))
    }

    fn token_payload(&self, token_pos: usize, token_id: u16) -> Result<&[u8]> {
        let idx = token_id as usize;
        if idx + 1 >= self.token_boundaries.len() {
            return Err(RowzipError::corrupted(format!(
                "invalid token id at token {}: {}",
                token_pos, token_id
            )));
        }
        let start = self.token_boundaries[idx] as usize;
        let end = self.token_boundaries[idx + 1] as usize;
        if end > self.dictionary.len() || start > end {
            return Err(RowzipError::corrupted(format!(
                "corrupted token boundaries at token {} for id {}",
                token_pos, token_id
            )));
        }
        Ok(&self.dictionary[start..end])
    }

    /// Decoded length in bytes of one row
    pub fn decoded_len(&self, index: usize) -> Result<usize> {
        let (start, end) = self.row_token_range(index)?;
        let mut total = 0;
        for (pos, &token_id) in self.compressed_data[start..end].iter().enumerate() {
            total += self.token_payload(start + pos, token_id)?.len();
        }
        Ok(total)
    }

    /// Append the decoded bytes of row `index` to `dst`
    pub fn append_row(&self, dst: &mut Vec<u8>, index: usize) -> Result<()> {
        let (start, end) = self.row_token_range(index)?;
        for (pos, &token_id) in self.compressed_data[start..end].iter().enumerate() {
            let bytes = self.token_payload(start + pos, token_id)?;
            dst.extend_from_slice(bytes);
        }
        Ok(())
    }

    /// Append the concatenation of all decoded rows to `dst`
    pub fn append_all(&self, dst: &mut Vec<u8>) -> Result<()> {
        for (pos, &token_id) in self.compressed_data.iter().enumerate() {
            let bytes = self.token_payload(pos, token_id)?;
            dst.extend_from_slice(bytes);
        }
        Ok(())
    }

    /// Decode row `index` into `buffer`, returning the bytes written
    ///
    /// Fails with [`RowzipError::ShortBuffer`] when `buffer` cannot hold the
    /// full row.
    pub fn decompress_string(&self, index: usize, buffer: &mut [u8]) -> Result<usize> {
        let (start, end) = self.row_token_range(index)?;
        let mut offset = 0;
        for (pos, &token_id) in self.compressed_data[start..end].iter().enumerate() {
            let bytes = self.token_payload(start + pos, token_id)?;
            if offset + bytes.len() > buffer.len() {
                return Err(RowzipError::short_buffer(offset + bytes.len(), buffer.len()));
            }
            buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
            offset += bytes.len();
        }
        Ok(offset)
    }

    /// Decode all rows into `buffer`, returning the bytes written
    pub fn decompress_all_checked(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut offset = 0;
        for (pos, &token_id) in self.compressed_data.iter().enumerate() {
            let bytes = self.token_payload(pos, token_id)?;
            if offset + bytes.len() > buffer.len() {
                return Err(RowzipError::short_buffer(offset + bytes.len(), buffer.len()));
            }
            buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
            offset += bytes.len();
        }
        Ok(offset)
    }

    /// In-memory footprint in bytes
    ///
    /// Counts two bytes per compressed token at 16-bit width and the packed
    /// byte count at 12-bit width, plus the dictionary and its boundaries.
    pub fn space_used(&self) -> usize {
        let compressed_bytes = if self.token_bit_width() == TOKEN_BIT_WIDTH_12 {
            packed12_byte_size(self.compressed_data.len())
        } else {
            self.compressed_data.len() * 2
        };

        compressed_bytes + self.dictionary.len() + self.token_boundaries.len() * 4
    }

    /// Validate the structural invariants tying the four arrays together
    pub fn validate(&self) -> Result<()> {
        if self.token_bit_width != 0
            && self.token_bit_width != TOKEN_BIT_WIDTH_12
            && self.token_bit_width != TOKEN_BIT_WIDTH_16
        {
            return Err(RowzipError::corrupted(format!(
                "invalid token bit width: {}",
                self.token_bit_width
            )));
        }

        if self.string_boundaries.is_empty() {
            return Err(RowzipError::corrupted(
                "string boundaries must contain at least one entry",
            ));
        }
        if self.string_boundaries[0] != 0 {
            return Err(RowzipError::corrupted(format!(
                "first string boundary must be 0: {}",
                self.string_boundaries[0]
            )));
        }
        for i in 1..self.string_boundaries.len() {
            if self.string_boundaries[i] < self.string_boundaries[i - 1] {
                return Err(RowzipError::corrupted(format!(
                    "string boundaries not monotonic at index {}",
                    i
                )));
            }
        }
        let last = *self.string_boundaries.last().unwrap_or(&0);
        if last as usize > self.compressed_data.len() {
            return Err(RowzipError::corrupted(format!(
                "string boundary {} out of range for {} tokens",
                last,
                self.compressed_data.len()
            )));
        }

        if self.token_boundaries.is_empty() {
            return Err(RowzipError::corrupted(
                "token boundaries must contain at least one entry",
            ));
        }
        if self.token_boundaries[0] != 0 {
            return Err(RowzipError::corrupted(format!(
                "first token boundary must be 0: {}",
                self.token_boundaries[0]
            )));
        }
        for i in 1..self.token_boundaries.len() {
            if self.token_boundaries[i] < self.token_boundaries[i - 1] {
                return Err(RowzipError::corrupted(format!(
                    "token boundaries not monotonic at index {}",
                    i
                )));
            }
        }
        let last = *self.token_boundaries.last().unwrap_or(&0);
        if last as usize > self.dictionary.len() {
            return Err(RowzipError::corrupted(format!(
                "token boundary {} out of range for dictionary size {}",
                last,
                self.dictionary.len()
            )));
        }

        if self.token_bit_width() == TOKEN_BIT_WIDTH_12 {
            for (i, &token_id) in self.compressed_data.iter().enumerate() {
                if token_id > MAX_TOKEN_ID_12BIT {
                    return Err(RowzipError::corrupted(format!(
                        "compressed token out of 12-bit range at index {}: {}",
                        i, token_id
                    )));
                }
            }
        }
        for (i, &token_id) in self.compressed_data.iter().enumerate() {
            if token_id as usize + 1 >= self.token_boundaries.len() {
                return Err(RowzipError::corrupted(format!(
                    "compressed token out of range at index {}: {}",
                    i, token_id
                )));
            }
        }
        Ok(())
    }

    /// Serialize the archive, returning the number of bytes written
    ///
    /// The archive is validated before any byte is emitted. Stages are
    /// written in fixed order: compressed_data, string_boundaries,
    /// dictionary, token_boundaries.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        self.validate()
            .map_err(|e| with_context(e, "invalid archive"))?;

        let (compressed_payload, compressed_param) =
            payload::encode_compressed_data(&self.compressed_data, self.token_bit_width())?;
        let string_boundaries_payload =
            payload::encode_string_boundaries(&self.string_boundaries)?;
        let dictionary_payload = payload::encode_dictionary(&self.dictionary)?;
        let (token_boundaries_payload, token_boundaries_param) =
            payload::encode_token_boundaries(&self.token_boundaries)?;

        let compressed_params = [compressed_param];
        let string_params = [wire::PARAM_STRING_BOUNDARIES_DELTA];
        let token_params = [token_boundaries_param];
        let stages: [(&[u8], &[u8], &[u8]); 4] = [
            (
                wire::STAGE_COMPRESSED_DATA,
                &compressed_params,
                &compressed_payload,
            ),
            (
                wire::STAGE_STRING_BOUNDARIES,
                &string_params,
                &string_boundaries_payload,
            ),
            (wire::STAGE_DICTIONARY, &[], &dictionary_payload),
            (
                wire::STAGE_TOKEN_BOUNDARIES,
                &token_params,
                &token_boundaries_payload,
            ),
        ];

        let mut total = 0u64;
        writer.write_all(&wire::ARCHIVE_MAGIC)?;
        total += wire::ARCHIVE_MAGIC.len() as u64;
        writer.write_all(&wire::ARCHIVE_VERSION.to_le_bytes())?;
        total += 2;
        writer.write_all(&(stages.len() as u16).to_le_bytes())?;
        total += 2;

        for (name, params, stage_payload) in stages {
            total += wire::write_stage(writer, name, params, stage_payload)?;
        }

        log::debug!(
            "serialized archive: {} rows, {} tokens, {} bytes (compressed_data param {})",
            self.rows(),
            self.compressed_data.len(),
            total,
            compressed_param
        );
        Ok(total)
    }

    /// Deserialize an archive, returning the number of bytes consumed
    ///
    /// Stages may arrive in any order; unknown stages are skipped. On any
    /// failure `self` is left untouched and the error names the stage index
    /// and byte offset where decoding stopped.
    pub fn read_from<R: Read>(&mut self, reader: R) -> Result<u64> {
        let mut reader = CountingReader::new(reader);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| with_context(e, "read archive magic at offset 0"))?;
        if magic != wire::ARCHIVE_MAGIC {
            return Err(RowzipError::invalid_format(format!(
                "invalid archive magic at offset 0: {:?}",
                String::from_utf8_lossy(&magic)
            )));
        }

        let version_offset = reader.offset();
        let version = reader
            .read_u16()
            .map_err(|e| with_context(e, format!("read archive version at offset {}", version_offset)))?;
        if version != wire::ARCHIVE_VERSION {
            return Err(RowzipError::invalid_format(format!(
                "unsupported archive version at offset {}: {}",
                version_offset, version
            )));
        }

        let stage_count_offset = reader.offset();
        let stage_count = reader
            .read_u16()
            .map_err(|e| with_context(e, format!("read stage count at offset {}", stage_count_offset)))?;
        if stage_count == 0 || stage_count > wire::MAX_ARCHIVE_STAGES {
            return Err(RowzipError::invalid_format(format!(
                "invalid stage count at offset {}: {}",
                stage_count_offset, stage_count
            )));
        }

        let mut decoded = DecodedStages::default();
        let mut seen = [false; wire::REQUIRED_STAGE_NAMES.len()];
        let mut params_scratch: Vec<u8> = Vec::new();
        let mut payload_scratch: Vec<u8> = Vec::new();

        for stage_index in 0..stage_count as usize {
            let header_offset = reader.offset();
            let header = wire::read_stage_header(&mut reader).map_err(|e| {
                with_context(
                    e,
                    format!(
                        "read stage header at offset {} (stage index {})",
                        header_offset, stage_index
                    ),
                )
            })?;
            let stage_name = String::from_utf8_lossy(&header.name).into_owned();

            let params_len = header.param_len as usize;
            if params_scratch.len() < params_len {
                params_scratch.resize(params_len, 0);
            }
            let params_offset = reader.offset();
            reader
                .read_exact(&mut params_scratch[..params_len])
                .map_err(|e| {
                    with_context(
                        e,
                        format!(
                            "read stage {:?} params at offset {} (stage index {})",
                            stage_name, params_offset, stage_index
                        ),
                    )
                })?;

            let Some(slot) = wire::required_stage_slot(&header.name) else {
                let skip_offset = reader.offset();
                reader.skip(header.data_len as u64).map_err(|e| {
                    with_context(
                        e,
                        format!(
                            "skip unknown stage {:?} at offset {} (stage index {})",
                            stage_name, skip_offset, stage_index
                        ),
                    )
                })?;
                continue;
            };
            if seen[slot] {
                return Err(RowzipError::invalid_format(format!(
                    "duplicate stage {:?} at stage index {}",
                    stage_name, stage_index
                )));
            }

            let payload_len = header.data_len as usize;
            if payload_scratch.len() < payload_len {
                payload_scratch.resize(payload_len, 0);
            }
            let payload_offset = reader.offset();
            reader
                .read_exact(&mut payload_scratch[..payload_len])
                .map_err(|e| {
                    with_context(
                        e,
                        format!(
                            "read stage {:?} payload at offset {} (stage index {})",
                            stage_name, payload_offset, stage_index
                        ),
                    )
                })?;

            let params = &params_scratch[..params_len];
            let stage_payload = &payload_scratch[..payload_len];
            decoded
                .apply(slot, params, stage_payload)
                .map_err(|e| {
                    with_context(
                        e,
                        format!(
                            "decode stage {:?} at offset {} (stage index {})",
                            stage_name, payload_offset, stage_index
                        ),
                    )
                })?;
            seen[slot] = true;
        }

        for (slot, name) in wire::REQUIRED_STAGE_NAMES.iter().enumerate() {
            if !seen[slot] {
                return Err(RowzipError::invalid_format(format!(
                    "missing required stage {:?}",
                    String::from_utf8_lossy(name)
                )));
            }
        }

        let archive = decoded.into_archive();
        archive
            .validate()
            .map_err(|e| with_context(e, "invalid archive structure"))?;

        *self = archive;
        Ok(reader.offset())
    }
}

/// Stage results collected during a read, applied to the target archive only
/// after every stage decoded and validated
#[derive(Default)]
struct DecodedStages {
    compressed_data: Vec<u16>,
    token_bit_width: u8,
    string_boundaries: Vec<u32>,
    dictionary: Vec<u8>,
    token_boundaries: Vec<u32>,
}

impl DecodedStages {
    fn apply(&mut self, slot: usize, params: &[u8], stage_payload: &[u8]) -> Result<()> {
        match slot {
            0 => {
                let (compressed, width) =
                    payload::decode_compressed_data(params, stage_payload)?;
                self.compressed_data = compressed;
                self.token_bit_width = width;
            }
            1 => {
                self.string_boundaries =
                    payload::decode_string_boundaries(params, stage_payload)?;
            }
            2 => {
                self.dictionary = payload::decode_dictionary(params, stage_payload)?;
            }
            _ => {
                self.token_boundaries =
                    payload::decode_token_boundaries(params, stage_payload)?;
            }
        }
        Ok(())
    }

    fn into_archive(self) -> Archive {
        Archive {
            compressed_data: self.compressed_data,
            string_boundaries: self.string_boundaries,
            dictionary: self.dictionary,
            token_boundaries: self.token_boundaries,
            token_bit_width: if self.token_bit_width == 0 {
                TOKEN_BIT_WIDTH_16
            } else {
                self.token_bit_width
            },
        }
    }
}

/// Prefix an error's message with decode context, preserving its kind
fn with_context<S: Into<String>>(err: RowzipError, context: S) -> RowzipError {
    let context = context.into();
    match err {
        RowzipError::Format { message } => {
            RowzipError::invalid_format(format!("{}: {}", context, message))
        }
        RowzipError::Limit { message } => {
            RowzipError::limit_exceeded(format!("{}: {}", context, message))
        }
        RowzipError::Corrupted { message } => {
            RowzipError::corrupted(format!("{}: {}", context, message))
        }
        RowzipError::Io(e) => RowzipError::invalid_format(format!("{}: {}", context, e)),
        other => other,
    }
}
