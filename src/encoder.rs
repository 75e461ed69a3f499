//! Encoding entry points
//!
//! [`Encoder`] trains a dictionary over the input rows and compresses them
//! in one call. [`Model`] separates the two phases: train once over a
//! representative corpus, then encode any number of row sets against the
//! same dictionary.

use crate::archive::Archive;
use crate::config::EncoderConfig;
use crate::error::{Result, RowzipError};
use crate::parser;
use crate::trainer::{self, TrainedDictionary};

/// Flatten rows into a contiguous byte buffer plus end positions
///
/// `end_positions[0]` is 0 and `end_positions[i + 1]` is the end offset of
/// row `i`, so row `i` occupies `data[end_positions[i]..end_positions[i+1]]`.
pub fn flatten_rows<S: AsRef<[u8]>>(rows: &[S]) -> (Vec<u8>, Vec<usize>) {
    let total_len = rows.iter().map(|row| row.as_ref().len()).sum();

    let mut data = Vec::with_capacity(total_len);
    let mut end_positions = Vec::with_capacity(rows.len() + 1);
    end_positions.push(0);

    for row in rows {
        data.extend_from_slice(row.as_ref());
        end_positions.push(data.len());
    }

    (data, end_positions)
}

/// One-shot encoder: trains a dictionary and compresses in a single call
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    config: EncoderConfig,
}

impl Encoder {
    /// Create an encoder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encoder with the given configuration
    pub fn with_config(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Compress a collection of rows into an archive
    pub fn encode<S: AsRef<[u8]>>(&self, rows: &[S]) -> Result<Archive> {
        let (data, end_positions) = flatten_rows(rows);

        let trained = trainer::train(&self.config, &data, &end_positions);
        let (compressed_data, string_boundaries) =
            parser::compress(&data, &end_positions, &trained.matcher);

        log::debug!(
            "encoded {} rows ({} bytes) into {} tokens, dictionary {} bytes",
            rows.len(),
            data.len(),
            compressed_data.len(),
            trained.dictionary.len()
        );
        Ok(Archive::from_parts(
            compressed_data,
            string_boundaries,
            trained.dictionary,
            trained.token_boundaries,
            self.config.resolved_bit_width(),
        ))
    }
}

/// Reusable trained dictionary
///
/// A model is trained once over sample rows; every subsequent
/// [`Model::encode`] call parses against the same dictionary and clones it
/// into the produced archive.
#[derive(Default)]
pub struct Model {
    config: EncoderConfig,
    trained: Option<TrainedDictionary>,
}

impl Model {
    /// Create an untrained model with the given configuration
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            trained: None,
        }
    }

    /// Train a model from sample rows in one step
    pub fn train_from<S: AsRef<[u8]>>(rows: &[S], config: EncoderConfig) -> Result<Self> {
        let mut model = Self::new(config);
        model.train(rows)?;
        Ok(model)
    }

    /// Build the dictionary and matcher for subsequent encode calls
    pub fn train<S: AsRef<[u8]>>(&mut self, rows: &[S]) -> Result<()> {
        let (data, end_positions) = flatten_rows(rows);
        self.trained = Some(trainer::train(&self.config, &data, &end_positions));
        Ok(())
    }

    /// Whether the model is ready for encoding
    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// Compress rows using the previously trained dictionary
    pub fn encode<S: AsRef<[u8]>>(&self, rows: &[S]) -> Result<Archive> {
        let trained = self.trained.as_ref().ok_or(RowzipError::UntrainedModel)?;
        let (data, end_positions) = flatten_rows(rows);
        let (compressed_data, string_boundaries) =
            parser::compress(&data, &end_positions, &trained.matcher);

        Ok(Archive::from_parts(
            compressed_data,
            string_boundaries,
            trained.dictionary.clone(),
            trained.token_boundaries.clone(),
            self.config.resolved_bit_width(),
        ))
    }
}
