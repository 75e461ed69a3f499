//! # Rowzip: Byte-Pair Dictionary Compression for Short Strings
//!
//! This crate compresses ordered collections of short byte strings (log
//! lines, identifiers, structured rows) into a random-access archive built
//! around a learned byte-pair dictionary. Any single row can be recovered
//! without touching the rest of the archive, and the serialized form is
//! bit-exact with multiple payload encodings chosen by size.
//!
//! ## Key Features
//!
//! - **Longest-prefix matcher**: Hybrid short/long pattern lookup with
//!   packed 64-bit comparisons on the hot path
//! - **Online dictionary training**: Byte-pair merging over a deterministic
//!   sample of the input, with optional template-stratified sampling
//! - **Random-access archives**: Per-row decoding, length queries, and
//!   whole-archive extraction without decompressing neighbors
//! - **Size-aware serialization**: Raw, deflate, and byte-codebook payload
//!   candidates per stage; the smallest encoding wins
//! - **Reusable models**: Train once, encode many row sets against the same
//!   dictionary
//!
//! ## Quick Start
//!
//! ```rust
//! use rowzip::{Archive, Encoder, EncoderConfig, Model};
//!
//! // One-shot encoding
//! let rows = ["GET /api/v1/users", "GET /api/v1/items", "GET /api/v1/users"];
//! let archive = Encoder::new().encode(&rows).unwrap();
//! assert_eq!(archive.rows(), 3);
//!
//! let mut row = Vec::new();
//! archive.append_row(&mut row, 2).unwrap();
//! assert_eq!(row, b"GET /api/v1/users");
//!
//! // Serialize and restore
//! let mut bytes = Vec::new();
//! archive.write_to(&mut bytes).unwrap();
//! let mut restored = Archive::default();
//! restored.read_from(bytes.as_slice()).unwrap();
//! assert_eq!(restored.rows(), 3);
//!
//! // Train once, encode many
//! let model = Model::train_from(&rows, EncoderConfig::new()).unwrap();
//! let archive = model.encode(&["GET /api/v1/users"]).unwrap();
//! assert_eq!(archive.decoded_len(0).unwrap(), 17);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod archive;
pub mod config;
pub mod encoder;
pub mod error;
pub mod io;
pub mod matcher;

mod parser;
mod sampling;
mod trainer;

// Re-export core types
pub use archive::Archive;
pub use config::EncoderConfig;
pub use encoder::{flatten_rows, Encoder, Model};
pub use error::{Result, RowzipError};
pub use matcher::PrefixMatcher;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
