//! Encoder configuration
//!
//! [`EncoderConfig`] collects the knobs for dictionary training and archive
//! encoding. All fields have zero-value defaults that resolve to the
//! documented behavior at train time; the `with_*` builders mirror the
//! field set.

/// Number of single-byte identity tokens (ids 0-255)
pub const SINGLE_BYTE_TOKENS: usize = 256;

/// Maximum token id (u16 max)
pub const MAX_TOKEN_ID: u16 = 65535;

/// Maximum token id representable in 12 bits
pub const MAX_TOKEN_ID_12BIT: u16 = 4095;

/// Archive token bit width for packed 12-bit streams
pub const TOKEN_BIT_WIDTH_12: u8 = 12;

/// Archive token bit width for raw 16-bit streams
pub const TOKEN_BIT_WIDTH_16: u8 = 16;

/// Default maximum sampled training bytes (1 MiB)
const DEFAULT_TRAINING_SAMPLE_BYTES: usize = 1024 * 1024;

/// Default cluster cap for template-stratified sampling
const DEFAULT_STRATIFIED_MAX_CLUSTERS: usize = 2048;

/// Configuration for training and encoding
#[derive(Debug, Clone, Default)]
pub struct EncoderConfig {
    /// Minimum pair frequency to merge tokens (0 = dynamic)
    pub threshold: u16,
    /// Maximum token id (0 = default; clamped to [255, 65535])
    pub max_token_id: u16,
    /// Maximum token length in bytes (0 = unlimited)
    pub max_token_len: usize,
    /// Encoded token bit width for archives (0 = default 16; 12 or 16)
    pub token_bit_width: u8,
    /// Maximum sampled training bytes (0 = default 1 MiB)
    pub training_sample_bytes: usize,
    /// Enable template-based stratified sampling for training
    pub stratified_sampling: bool,
    /// Maximum number of template clusters for stratified sampling (0 = default)
    pub stratified_max_clusters: usize,
}

impl EncoderConfig {
    /// Create a configuration with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fixed threshold for merging tokens
    pub fn with_threshold(mut self, threshold: u16) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set an explicit token id limit
    ///
    /// Valid range is [255, 65535]; values outside the range are clamped at
    /// train time.
    pub fn with_max_token_id(mut self, max_id: u16) -> Self {
        self.max_token_id = max_id;
        self
    }

    /// Set a maximum length for tokens
    ///
    /// A value of 16 additionally switches the matcher into its capped
    /// packed-compare mode.
    pub fn with_max_token_len(mut self, len: usize) -> Self {
        self.max_token_len = len;
        self
    }

    /// Set the encoded token bit width used for archive storage
    ///
    /// Supported values are 12 and 16; any other value falls back to 16.
    pub fn with_token_bit_width(mut self, bits: u8) -> Self {
        self.token_bit_width = bits;
        self
    }

    /// Set the maximum number of sampled bytes used to train the dictionary
    ///
    /// Zero falls back to the 1 MiB default.
    pub fn with_training_sample_bytes(mut self, bytes: usize) -> Self {
        self.training_sample_bytes = bytes;
        self
    }

    /// Enable template-based stratified sampling for training
    ///
    /// `max_clusters == 0` uses the default cluster cap.
    pub fn with_stratified_sampling(mut self, max_clusters: usize) -> Self {
        self.stratified_sampling = true;
        self.stratified_max_clusters = max_clusters;
        self
    }

    /// Resolve the effective token bit width
    pub fn resolved_bit_width(&self) -> u8 {
        match self.token_bit_width {
            TOKEN_BIT_WIDTH_12 => TOKEN_BIT_WIDTH_12,
            _ => TOKEN_BIT_WIDTH_16,
        }
    }

    /// Resolve the inclusive token id limit
    ///
    /// Clamps the configured maximum to [255, 65535] and applies the 12-bit
    /// cap when the archive stores packed 12-bit ids.
    pub fn token_limit(&self) -> u16 {
        let mut limit = MAX_TOKEN_ID;
        if self.max_token_id != 0 {
            limit = self
                .max_token_id
                .clamp(SINGLE_BYTE_TOKENS as u16 - 1, MAX_TOKEN_ID);
        }

        if self.resolved_bit_width() == TOKEN_BIT_WIDTH_12 && limit > MAX_TOKEN_ID_12BIT {
            limit = MAX_TOKEN_ID_12BIT;
        }
        limit
    }

    /// Resolve the training sample byte budget
    pub fn resolved_sample_bytes(&self) -> usize {
        if self.training_sample_bytes > 0 {
            self.training_sample_bytes
        } else {
            DEFAULT_TRAINING_SAMPLE_BYTES
        }
    }

    /// Resolve the stratified sampling cluster cap
    pub fn resolved_max_clusters(&self) -> usize {
        if self.stratified_max_clusters > 0 {
            self.stratified_max_clusters
        } else {
            DEFAULT_STRATIFIED_MAX_CLUSTERS
        }
    }

    /// Resolve the merge threshold for a given sampled byte count
    ///
    /// A configured threshold wins; otherwise the threshold scales with the
    /// sample size as `max(2, log2(sample MiB))`, which is 2 for any sample
    /// below 2 MiB.
    pub fn resolved_threshold(&self, sample_bytes: usize) -> u16 {
        if self.threshold != 0 {
            return self.threshold;
        }
        let sample_mib = sample_bytes as f64 / DEFAULT_TRAINING_SAMPLE_BYTES as f64;
        sample_mib.log2().max(2.0) as u16
    }
}
