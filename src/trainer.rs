//! Dictionary training
//!
//! Training walks a sampled subset of the input rows and counts adjacent
//! token pairs as seen by the current matcher. When a pair's count reaches
//! the merge threshold, the concatenated bytes become a new token and the
//! matcher immediately starts matching it, so later occurrences of the same
//! text tokenize through the merged form. Merging is therefore online: the
//! dictionary grows while the sample is still being scanned.

use ahash::AHashMap;

use crate::config::{EncoderConfig, SINGLE_BYTE_TOKENS};
use crate::matcher::PrefixMatcher;
use crate::sampling::{sample_by_bytes, shuffled_row_indices, stratified_sample_indices};

/// A trained dictionary: the matcher primed over the token set plus the
/// serialized token payloads and their boundaries.
pub(crate) struct TrainedDictionary {
    pub(crate) matcher: PrefixMatcher,
    pub(crate) dictionary: Vec<u8>,
    pub(crate) token_boundaries: Vec<u32>,
}

/// Train a dictionary over the flattened rows
pub(crate) fn train(
    config: &EncoderConfig,
    data: &[u8],
    end_positions: &[usize],
) -> TrainedDictionary {
    let mut token_boundaries = Vec::with_capacity(SINGLE_BYTE_TOKENS + 4096);
    token_boundaries.push(0u32);
    let mut dictionary = Vec::with_capacity(SINGLE_BYTE_TOKENS + 64 * 1024);

    let mut matcher = PrefixMatcher::new(config.max_token_len);

    // Identity tokens store their byte in the dictionary, so decode reads
    // every id the same way.
    for i in 0..SINGLE_BYTE_TOKENS {
        let token = [i as u8];
        matcher.insert(&token, i as u16);
        dictionary.push(i as u8);
        token_boundaries.push(dictionary.len() as u32);
    }

    let num_rows = end_positions.len().saturating_sub(1);
    if num_rows == 0 {
        return TrainedDictionary {
            matcher,
            dictionary,
            token_boundaries,
        };
    }

    let shuffled = shuffled_row_indices(num_rows);

    let sample_limit = config.resolved_sample_bytes();
    let stratified_storage: Vec<usize>;
    let (sample_indices, sample_bytes): (&[usize], usize) = if data.len() > sample_limit {
        if config.stratified_sampling {
            let (indices, bytes) = stratified_sample_indices(
                data,
                end_positions,
                &shuffled,
                sample_limit,
                config.resolved_max_clusters(),
            );
            stratified_storage = indices;
            (&stratified_storage, bytes)
        } else {
            sample_by_bytes(&shuffled, end_positions, sample_limit)
        }
    } else {
        (shuffled.as_slice(), data.len())
    };

    let threshold = config.resolved_threshold(sample_bytes);
    let limit = config.token_limit();
    log::debug!(
        "training over {} sampled rows ({} bytes), threshold {}, id limit {}",
        sample_indices.len(),
        sample_bytes,
        threshold,
        limit
    );

    build_tokens(
        config,
        data,
        end_positions,
        sample_indices,
        &mut matcher,
        &mut dictionary,
        &mut token_boundaries,
        threshold,
        limit,
    );

    TrainedDictionary {
        matcher,
        dictionary,
        token_boundaries,
    }
}

/// Discover merged tokens over the sampled rows
///
/// Pairs are keyed `prev << 16 | curr`; a pair reaching `threshold`
/// occurrences merges into a new token unless that would exceed the id
/// limit or the configured token length.
#[allow(clippy::too_many_arguments)]
fn build_tokens(
    config: &EncoderConfig,
    data: &[u8],
    end_positions: &[usize],
    sample_indices: &[usize],
    matcher: &mut PrefixMatcher,
    dictionary: &mut Vec<u8>,
    token_boundaries: &mut Vec<u32>,
    threshold: u16,
    limit: u16,
) {
    let mut next_id = SINGLE_BYTE_TOKENS as u16;
    let mut frequency: AHashMap<u32, u16> = AHashMap::with_capacity(4096);
    let max_token_len = config.max_token_len;

    for &row in sample_indices {
        let end = end_positions[row + 1];
        let mut pos = end_positions[row];
        if pos >= end {
            continue;
        }

        let Some((first_id, first_len)) = matcher.find(&data[pos..end]) else {
            continue;
        };
        let mut prev_id = first_id;
        let mut prev_len = first_len;
        pos += first_len;

        while pos < end {
            let Some((curr_id, curr_len)) = matcher.find(&data[pos..end]) else {
                break;
            };

            if max_token_len > 0 && prev_len + curr_len > max_token_len {
                prev_id = curr_id;
                prev_len = curr_len;
                pos += curr_len;
                continue;
            }

            let pair = (prev_id as u32) << 16 | curr_id as u32;
            let count = frequency.entry(pair).or_insert(0);
            *count = count.saturating_add(1);

            if *count >= threshold {
                if next_id > limit {
                    return;
                }
                let merged = &data[pos - prev_len..pos + curr_len];
                if !matcher.insert(merged, next_id) {
                    // Long bucket full: drop the count and keep scanning
                    // without a merge.
                    frequency.remove(&pair);
                    prev_id = curr_id;
                    prev_len = curr_len;
                    pos += curr_len;
                    continue;
                }
                dictionary.extend_from_slice(merged);
                token_boundaries.push(dictionary.len() as u32);

                frequency.remove(&pair);
                prev_id = next_id;
                prev_len = merged.len();
                pos += curr_len;

                if next_id == limit {
                    return;
                }
                next_id += 1;
            } else {
                prev_id = curr_id;
                prev_len = curr_len;
                pos += curr_len;
            }
        }
    }
}
