//! Training sample selection
//!
//! Training never needs the whole corpus: rows are visited in a fixed
//! pseudo-random order and a prefix of that order is selected until the
//! byte budget is met. The optional stratified selector groups rows by a
//! normalized template key first, so rare row shapes keep representation
//! in the sample even when one shape dominates the corpus.

use std::cmp::Ordering;

use ahash::AHashMap;

const LCG_MULTIPLIER: u64 = 6364136223846793005;
const LCG_INCREMENT: u64 = 1442695040888963407;
const SHUFFLE_SEED: u64 = 42;

/// Maximum number of whitespace-separated fields contributing to a template key
const TEMPLATE_KEY_FIELDS: usize = 12;

/// Bucket absorbing rows once the cluster cap is reached
const TEMPLATE_OVERFLOW_KEY: &[u8] = b"__template_other__";

/// Longest literal field fragment kept in a template key
const TEMPLATE_FIELD_LIMIT: usize = 32;

/// Deterministic linear congruential generator used for the training shuffle
pub(crate) struct Lcg64 {
    state: u64,
}

impl Lcg64 {
    pub(crate) fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub(crate) fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.state
    }
}

/// Produce the fixed pseudo-random visit order for `count` rows
pub(crate) fn shuffled_row_indices(count: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..count).collect();
    let mut rng = Lcg64::new(SHUFFLE_SEED);
    for i in (1..count).rev() {
        let j = (rng.next() % (i as u64 + 1)) as usize;
        indices.swap(i, j);
    }
    indices
}

/// Select the shortest prefix of the shuffled order whose rows accumulate to
/// at least `byte_limit` bytes
///
/// Returns the selected prefix and its byte sum. The full order is returned
/// when the budget is never reached.
pub(crate) fn sample_by_bytes<'a>(
    shuffled: &'a [usize],
    end_positions: &[usize],
    byte_limit: usize,
) -> (&'a [usize], usize) {
    if byte_limit == 0 || shuffled.is_empty() {
        return (shuffled, 0);
    }

    let mut sample_bytes = 0;
    for (i, &idx) in shuffled.iter().enumerate() {
        sample_bytes += end_positions[idx + 1] - end_positions[idx];
        if sample_bytes >= byte_limit {
            return (&shuffled[..i + 1], sample_bytes);
        }
    }
    (shuffled, sample_bytes)
}

/// Select sample rows cluster-by-cluster so every template shape present in
/// the pool keeps a share of the byte budget
///
/// Rows are grouped by template key (cap `max_clusters`, overflow collapses
/// into one bucket). Each cluster receives a row quota proportional to its
/// share of the pool via the largest-remainder method; emission walks the
/// quotas and then tops up round-robin until the byte budget is met.
pub(crate) fn stratified_sample_indices(
    data: &[u8],
    end_positions: &[usize],
    shuffled: &[usize],
    byte_limit: usize,
    max_clusters: usize,
) -> (Vec<usize>, usize) {
    if byte_limit == 0 || shuffled.is_empty() {
        return (shuffled.to_vec(), 0);
    }

    let mut groups: AHashMap<Vec<u8>, Vec<usize>> = AHashMap::with_capacity(256);
    let mut order: Vec<Vec<u8>> = Vec::with_capacity(256);
    let mut total_pool_bytes = 0usize;

    for &idx in shuffled {
        let start = end_positions[idx];
        let end = end_positions[idx + 1];
        total_pool_bytes += end - start;
        let mut key = template_key(&data[start..end], TEMPLATE_KEY_FIELDS);

        if !groups.contains_key(&key) && max_clusters > 0 && groups.len() >= max_clusters {
            key = TEMPLATE_OVERFLOW_KEY.to_vec();
        }
        match groups.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut entry) => entry.get_mut().push(idx),
            std::collections::hash_map::Entry::Vacant(entry) => {
                order.push(entry.key().clone());
                entry.insert(vec![idx]);
            }
        }
    }

    if order.is_empty() {
        let (prefix, bytes) = sample_by_bytes(shuffled, end_positions, byte_limit);
        return (prefix.to_vec(), bytes);
    }

    let total_rows = shuffled.len();
    let avg_len = total_pool_bytes as f64 / total_rows as f64;
    let target_rows = ((byte_limit as f64 / avg_len) as usize).clamp(1, total_rows);

    struct ClusterQuota {
        key: Vec<u8>,
        quota: usize,
        remainder: f64,
    }
    let mut quotas: Vec<ClusterQuota> = order
        .into_iter()
        .map(|key| {
            let count = groups.get(&key).map_or(0, Vec::len);
            let exact = count as f64 * target_rows as f64 / total_rows as f64;
            let quota = exact as usize;
            ClusterQuota {
                key,
                quota,
                remainder: exact - quota as f64,
            }
        })
        .collect();

    let allocated: usize = quotas.iter().map(|q| q.quota).sum();
    if allocated < target_rows {
        quotas.sort_by(|a, b| {
            b.remainder
                .partial_cmp(&a.remainder)
                .unwrap_or(Ordering::Equal)
        });
        let mut remaining = target_rows - allocated;
        let mut i = 0;
        while remaining > 0 {
            let idx = i % quotas.len();
            quotas[idx].quota += 1;
            remaining -= 1;
            i += 1;
        }
    }

    let mut positions = vec![0usize; quotas.len()];
    let mut sample = Vec::with_capacity(target_rows);
    let mut sample_bytes = 0usize;

    for (qi, quota) in quotas.iter().enumerate() {
        let Some(group) = groups.get(&quota.key) else {
            continue;
        };
        let take = quota.quota.min(group.len());
        if take == 0 {
            continue;
        }
        for &idx in &group[..take] {
            sample.push(idx);
            sample_bytes += end_positions[idx + 1] - end_positions[idx];
        }
        positions[qi] = take;
        if sample_bytes >= byte_limit {
            return (sample, sample_bytes);
        }
    }

    // Top up round-robin when row-length variance leaves budget unspent.
    while sample_bytes < byte_limit {
        let mut progressed = false;
        for (qi, quota) in quotas.iter().enumerate() {
            let Some(group) = groups.get(&quota.key) else {
                continue;
            };
            let pos = positions[qi];
            if pos >= group.len() {
                continue;
            }

            let idx = group[pos];
            positions[qi] = pos + 1;
            sample.push(idx);
            sample_bytes += end_positions[idx + 1] - end_positions[idx];
            progressed = true;

            if sample_bytes >= byte_limit {
                break;
            }
        }
        if !progressed {
            break;
        }
    }

    if sample.is_empty() {
        let (prefix, bytes) = sample_by_bytes(shuffled, end_positions, byte_limit);
        return (prefix.to_vec(), bytes);
    }
    (sample, sample_bytes)
}

/// Build the template key for one row from its first fields
pub(crate) fn template_key(line: &[u8], max_fields: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(line.len().min(128));
    let mut fields = line
        .split(u8::is_ascii_whitespace)
        .filter(|field| !field.is_empty());

    let mut emitted = 0;
    while emitted < max_fields {
        let Some(field) = fields.next() else {
            break;
        };
        if emitted > 0 {
            key.push(b' ');
        }
        append_normalized_field(&mut key, field);
        emitted += 1;
    }
    key
}

fn append_normalized_field(dst: &mut Vec<u8>, field: &[u8]) {
    let trimmed = trim_field_punct(field);
    if trimmed.is_empty() {
        dst.extend_from_slice(b"<*>");
        return;
    }
    if let Some(eq) = trimmed.iter().position(|&b| b == b'=') {
        if eq > 0 && eq < trimmed.len() - 1 {
            for &b in &trimmed[..=eq] {
                dst.push(b.to_ascii_lowercase());
            }
            append_normalized_value(dst, &trimmed[eq + 1..]);
            return;
        }
    }
    append_normalized_value(dst, trimmed);
}

fn append_normalized_value(dst: &mut Vec<u8>, value: &[u8]) {
    if value.is_empty() {
        dst.extend_from_slice(b"<*>");
    } else if looks_ipv4(value) {
        dst.extend_from_slice(b"<IP>");
    } else if looks_uuid(value) {
        dst.extend_from_slice(b"<UUID>");
    } else if looks_hex(value) {
        dst.extend_from_slice(b"<HEX>");
    } else if looks_number_like(value) {
        dst.extend_from_slice(b"<NUM>");
    } else {
        for &b in &value[..value.len().min(TEMPLATE_FIELD_LIMIT)] {
            dst.push(b.to_ascii_lowercase());
        }
    }
}

fn trim_field_punct(field: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = field.len();
    while start < end && is_trim_punct(field[start]) {
        start += 1;
    }
    while end > start && is_trim_punct(field[end - 1]) {
        end -= 1;
    }
    &field[start..end]
}

fn is_trim_punct(b: u8) -> bool {
    matches!(
        b,
        b'[' | b']' | b'(' | b')' | b'{' | b'}' | b'<' | b'>' | b',' | b';' | b':' | b'\'' | b'"'
    )
}

fn looks_number_like(value: &[u8]) -> bool {
    let mut digits = 0;
    for &b in value {
        if b.is_ascii_digit() {
            digits += 1;
            continue;
        }
        match b {
            b'.' | b',' | b'-' | b'_' | b':' | b'/' | b'+' => continue,
            _ => return false,
        }
    }
    digits > 0 && digits * 2 >= value.len()
}

fn looks_hex(value: &[u8]) -> bool {
    if value.len() < 8 {
        return false;
    }
    let mut hex_count = 0;
    for &b in value {
        if b.is_ascii_hexdigit() {
            hex_count += 1;
            continue;
        }
        if b != b'-' {
            return false;
        }
    }
    hex_count >= 8
}

fn looks_uuid(value: &[u8]) -> bool {
    if value.len() != 36 {
        return false;
    }
    for (i, &b) in value.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}

fn looks_ipv4(value: &[u8]) -> bool {
    let mut parts = 0;
    let mut part_value = 0u32;
    let mut digits = 0;
    for (i, &b) in value.iter().enumerate() {
        if b.is_ascii_digit() {
            part_value = part_value * 10 + (b - b'0') as u32;
            digits += 1;
            if part_value > 255 {
                return false;
            }
            continue;
        }

        if b != b'.' {
            return false;
        }
        if digits == 0 {
            return false;
        }
        parts += 1;
        if parts > 3 {
            return false;
        }
        part_value = 0;
        digits = 0;

        if i == value.len() - 1 {
            return false;
        }
    }
    parts == 3 && digits > 0
}
