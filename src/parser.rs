//! Per-row greedy tokenization
//!
//! Each row is tokenized independently against the trained matcher. Because
//! the 256 identity tokens always match, the walk makes progress on every
//! byte and the emitted token payloads concatenate back to the exact row.

use crate::matcher::PrefixMatcher;

/// Tokenize all rows, returning the token stream and per-row boundaries
///
/// `string_boundaries` has one entry per row plus the leading zero; row `i`
/// owns tokens `string_boundaries[i]..string_boundaries[i + 1]`.
pub(crate) fn compress(
    data: &[u8],
    end_positions: &[usize],
    matcher: &PrefixMatcher,
) -> (Vec<u16>, Vec<u32>) {
    let mut compressed_data = Vec::with_capacity(data.len() / 2);
    let mut string_boundaries = Vec::with_capacity(end_positions.len());
    string_boundaries.push(0u32);

    for window in end_positions.windows(2) {
        let (start, end) = (window[0], window[1]);

        let mut pos = start;
        while pos < end {
            let Some((token_id, len)) = matcher.find(&data[pos..end]) else {
                break;
            };
            compressed_data.push(token_id);
            pos += len;
        }
        string_boundaries.push(compressed_data.len() as u32);
    }

    (compressed_data, string_boundaries)
}
