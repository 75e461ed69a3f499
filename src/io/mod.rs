//! Small serialization utilities
//!
//! This module provides the low-level reading and varint primitives used by
//! the archive codec: LEB128 variable-length integers, positioned
//! little-endian reads over payload slices, and byte-counting wrappers for
//! stream reads.

mod reader;
mod var_int;

pub use reader::{CountingReader, SliceReader};
pub use var_int::VarInt;
