//! End-to-end round-trip tests for encoding and decoding
//!
//! Every row set must survive encode + per-row decode byte-exactly, at both
//! token bit widths, under every configuration knob.

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use rowzip::{Encoder, EncoderConfig, Model, RowzipError};

// =============================================================================
// HELPERS
// =============================================================================

fn assert_round_trip<S: AsRef<[u8]>>(rows: &[S], config: EncoderConfig) {
    let archive = Encoder::with_config(config).encode(rows).unwrap();
    assert_eq!(archive.rows(), rows.len());
    archive.validate().unwrap();

    let mut expected_all = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let row = row.as_ref();
        expected_all.extend_from_slice(row);

        assert_eq!(archive.decoded_len(i).unwrap(), row.len());

        let mut dst = Vec::new();
        archive.append_row(&mut dst, i).unwrap();
        assert_eq!(dst, row, "row {} mismatch", i);

        let mut buf = vec![0u8; row.len()];
        let written = archive.decompress_string(i, &mut buf).unwrap();
        assert_eq!(written, row.len());
        assert_eq!(&buf[..written], row);
    }

    let mut all = Vec::new();
    archive.append_all(&mut all).unwrap();
    assert_eq!(all, expected_all);

    let mut buf = vec![0u8; expected_all.len()];
    let written = archive.decompress_all_checked(&mut buf).unwrap();
    assert_eq!(written, expected_all.len());
    assert_eq!(&buf[..written], &expected_all[..]);
}

fn capped_config() -> EncoderConfig {
    EncoderConfig::new().with_max_token_len(16)
}

// =============================================================================
// BASIC COMPRESSION
// =============================================================================

#[test]
fn test_basic_compression() {
    let rows = [
        "hello world",
        "hello there",
        "hello world again",
        "goodbye world",
    ];
    assert_round_trip(&rows, EncoderConfig::new());
    assert_round_trip(&rows, capped_config());
}

#[test]
fn test_repeated_patterns() {
    let rows: Vec<String> = (0..200)
        .map(|i| format!("2025-09-12T12:00:{:02}Z INFO request handled", i % 60))
        .collect();
    assert_round_trip(&rows, EncoderConfig::new());
    assert_round_trip(&rows, capped_config());
}

#[test]
fn test_empty_strings() {
    let rows = ["", "test", "", "data"];
    assert_round_trip(&rows, EncoderConfig::new());
    assert_round_trip(&rows, capped_config());

    let all_empty = ["", "", ""];
    assert_round_trip(&all_empty, EncoderConfig::new());
}

#[test]
fn test_single_byte_strings() {
    let rows: Vec<String> = (0u8..=255).map(|b| (b as char).to_string()).collect();
    let byte_rows: Vec<Vec<u8>> = (0u8..=255).map(|b| vec![b]).collect();
    assert_round_trip(&rows, EncoderConfig::new());
    assert_round_trip(&byte_rows, EncoderConfig::new());
}

#[test]
fn test_unicode_strings() {
    let rows = ["hello世界", "你好world", "🚀rocket", "hello世界"];
    assert_round_trip(&rows, EncoderConfig::new());
    assert_round_trip(&rows, capped_config());
}

#[test]
fn test_special_characters() {
    let rows = [
        "tab\there",
        "newline\nhere",
        "null\0byte",
        "high\u{0080}\u{00FF}bytes",
        "quote\"and'quote",
    ];
    assert_round_trip(&rows, EncoderConfig::new());
}

#[test]
fn test_long_strings() {
    let rows: Vec<String> = (0..8)
        .map(|i| format!("prefix-{}-{}", i, "abcdefghijklmnop".repeat(200)))
        .collect();
    assert_round_trip(&rows, EncoderConfig::new());
    assert_round_trip(&rows, capped_config());
}

#[test]
fn test_large_dataset() {
    let rows: Vec<String> = (0..10_000)
        .map(|i| format!("user_{:06} logged in from 10.0.{}.{}", i, i % 256, (i / 7) % 256))
        .collect();
    assert_round_trip(&rows, EncoderConfig::new());
    assert_round_trip(&rows, capped_config());
}

#[test]
fn test_binary_rows() {
    let rows: Vec<Vec<u8>> = (0..64)
        .map(|i| (0..((i * 7) % 40)).map(|j| ((i * 31 + j * 17) % 256) as u8).collect())
        .collect();
    assert_round_trip(&rows, EncoderConfig::new());
    assert_round_trip(&rows, capped_config());
}

// =============================================================================
// CONFIGURATION KNOBS
// =============================================================================

#[test]
fn test_max_token_id_limits_dictionary() {
    let rows: Vec<String> = (0..2000).map(|i| format!("session-{:05}-token", i)).collect();

    let archive = Encoder::with_config(EncoderConfig::new().with_max_token_id(300))
        .encode(&rows)
        .unwrap();
    assert!(archive.token_boundaries.len() <= 302);
    assert_round_trip(&rows, EncoderConfig::new().with_max_token_id(300));

    // A limit at or below 255 disables merging entirely.
    let archive = Encoder::with_config(EncoderConfig::new().with_max_token_id(200))
        .encode(&rows)
        .unwrap();
    assert_eq!(archive.token_boundaries.len(), 257);
}

#[test]
fn test_max_token_len_bounds_tokens() {
    let rows: Vec<String> = (0..500).map(|_| "abcdefghij".repeat(8)).collect();
    let archive = Encoder::with_config(EncoderConfig::new().with_max_token_len(6))
        .encode(&rows)
        .unwrap();

    for id in 256..archive.token_boundaries.len() - 1 {
        let len = archive.token_boundaries[id + 1] - archive.token_boundaries[id];
        assert!(len <= 6, "token {} has length {}", id, len);
    }
    assert_round_trip(&rows, EncoderConfig::new().with_max_token_len(6));
}

#[test]
fn test_12_bit_width_caps_token_ids() {
    let rows: Vec<String> = (0..20_000).map(|i| format!("evt:{:08x}", i * 2654435761u64 as usize)).collect();
    let archive = Encoder::with_config(EncoderConfig::new().with_token_bit_width(12))
        .encode(&rows)
        .unwrap();

    assert_eq!(archive.token_bit_width(), 12);
    for &id in &archive.compressed_data {
        assert!(id <= 4095);
    }
    assert_round_trip(&rows, EncoderConfig::new().with_token_bit_width(12));
}

#[test]
fn test_explicit_threshold_and_sample_bytes() {
    let rows: Vec<String> = (0..4000).map(|i| format!("queue item {:04}", i)).collect();
    let config = EncoderConfig::new()
        .with_threshold(8)
        .with_training_sample_bytes(16 * 1024);
    assert_round_trip(&rows, config);
}

#[test]
fn test_stratified_sampling_round_trip() {
    let mut rows = Vec::new();
    for i in 0..6000 {
        if i % 3 == 0 {
            rows.push(format!("INFO service=api status=200 dur={}", i % 97));
        } else if i % 3 == 1 {
            rows.push(format!("WARN service=db slow_query id={:08x}", i * 31));
        } else {
            rows.push(format!("ERROR service=web code=500 trace={}", i));
        }
    }
    let config = EncoderConfig::new()
        .with_training_sample_bytes(8 * 1024)
        .with_stratified_sampling(64);
    assert_round_trip(&rows, config);
}

// =============================================================================
// DETERMINISM
// =============================================================================

#[test]
fn test_encoding_is_deterministic() {
    let rows: Vec<String> = (0..3000)
        .map(|i| format!("host-{} proc {} exited", i % 40, i))
        .collect();
    let a = Encoder::new().encode(&rows).unwrap();
    let b = Encoder::new().encode(&rows).unwrap();
    assert_eq!(a, b);

    let config = EncoderConfig::new().with_token_bit_width(12);
    let a = Encoder::with_config(config.clone()).encode(&rows).unwrap();
    let b = Encoder::with_config(config).encode(&rows).unwrap();
    assert_eq!(a, b);
}

// =============================================================================
// MODELS
// =============================================================================

#[test]
fn test_model_untrained_error() {
    let model = Model::new(EncoderConfig::new());
    assert!(!model.is_trained());
    let err = model.encode(&["row"]).unwrap_err();
    assert!(matches!(err, RowzipError::UntrainedModel));
}

#[test]
fn test_model_reuse_across_row_sets() {
    let training: Vec<String> = (0..2000).map(|i| format!("GET /api/v1/users/{}", i)).collect();
    let model = Model::train_from(&training, EncoderConfig::new()).unwrap();

    for chunk in training.chunks(500) {
        let archive = model.encode(chunk).unwrap();
        assert_eq!(archive.rows(), chunk.len());
        for (i, row) in chunk.iter().enumerate() {
            let mut dst = Vec::new();
            archive.append_row(&mut dst, i).unwrap();
            assert_eq!(dst, row.as_bytes());
        }
    }

    // Rows never seen during training still round-trip.
    let unseen = ["POST /api/v2/sessions", "DELETE /api/v1/users/999999"];
    let archive = model.encode(&unseen).unwrap();
    for (i, row) in unseen.iter().enumerate() {
        let mut dst = Vec::new();
        archive.append_row(&mut dst, i).unwrap();
        assert_eq!(dst, row.as_bytes());
    }
}

// =============================================================================
// ERROR CONTRACTS
// =============================================================================

#[test]
fn test_short_buffer_contract() {
    let rows = ["abcdef", "x", "longer row content here"];
    let archive = Encoder::new().encode(&rows).unwrap();

    for (i, row) in rows.iter().enumerate() {
        if row.is_empty() {
            continue;
        }
        let mut buf = vec![0u8; row.len() - 1];
        let err = archive.decompress_string(i, &mut buf).unwrap_err();
        assert!(
            matches!(err, RowzipError::ShortBuffer { .. }),
            "row {} expected short buffer, got {:?}",
            i,
            err
        );
    }

    let total: usize = rows.iter().map(|r| r.len()).sum();
    let mut buf = vec![0u8; total - 1];
    let err = archive.decompress_all_checked(&mut buf).unwrap_err();
    assert!(matches!(err, RowzipError::ShortBuffer { .. }));
}

#[test]
fn test_row_index_out_of_bounds() {
    let archive = Encoder::new().encode(&["a", "b"]).unwrap();
    assert!(matches!(
        archive.decoded_len(2),
        Err(RowzipError::OutOfBounds { index: 2, size: 2 })
    ));
    let mut dst = Vec::new();
    assert!(archive.append_row(&mut dst, 99).is_err());
    let mut buf = [0u8; 8];
    assert!(archive.decompress_string(5, &mut buf).is_err());
}

// =============================================================================
// CONCURRENT READS
// =============================================================================

#[test]
fn test_concurrent_decompression() {
    let rows: Vec<String> = (0..2000).map(|i| format!("shared row payload {:06}", i)).collect();
    let archive = Arc::new(Encoder::new().encode(&rows).unwrap());

    let mut handles = Vec::new();
    for t in 0..8 {
        let archive = Arc::clone(&archive);
        let rows = rows.clone();
        handles.push(thread::spawn(move || {
            for i in (t..rows.len()).step_by(8) {
                let mut buf = vec![0u8; rows[i].len()];
                let written = archive.decompress_string(i, &mut buf).unwrap();
                assert_eq!(&buf[..written], rows[i].as_bytes());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

// =============================================================================
// SPEC SCENARIOS
// =============================================================================

#[test]
fn test_scenario_tiny_alphabet() {
    let rows = ["a", "b", "c", "a", "b", "a"];
    let archive = Encoder::new().encode(&rows).unwrap();

    assert!(archive.space_used() > 0);
    assert_round_trip(&rows, EncoderConfig::new());

    let mut all = Vec::new();
    archive.append_all(&mut all).unwrap();
    assert_eq!(all, b"abcaba");
}

#[test]
fn test_scenario_repeated_user_rows_compress() {
    let rows: Vec<&str> = std::iter::repeat("user_000001").take(10_000).collect();
    let archive = Encoder::new().encode(&rows).unwrap();

    assert!(archive.space_used() < 10_000 * 11, "space {}", archive.space_used());
    for i in [0, 1, 5000, 9999] {
        let mut dst = Vec::new();
        archive.append_row(&mut dst, i).unwrap();
        assert_eq!(dst, b"user_000001");
    }
}

#[test]
fn test_scenario_empty_and_nonempty_rows() {
    let rows = ["", "test", "", "data"];
    let archive = Encoder::new().encode(&rows).unwrap();

    assert_eq!(archive.rows(), 4);
    let mut buf = [0u8; 16];
    assert_eq!(archive.decompress_string(0, &mut buf).unwrap(), 0);
    assert_eq!(archive.decompress_string(2, &mut buf).unwrap(), 0);
    assert_eq!(archive.decompress_string(1, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"test");

    let mut all = Vec::new();
    archive.append_all(&mut all).unwrap();
    assert_eq!(all, b"testdata");
}

// =============================================================================
// PROPERTY-BASED TESTS
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_arbitrary_rows_round_trip(
        rows in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..40)
    ) {
        let archive = Encoder::new().encode(&rows).unwrap();
        prop_assert_eq!(archive.rows(), rows.len());
        for (i, row) in rows.iter().enumerate() {
            let mut dst = Vec::new();
            archive.append_row(&mut dst, i).unwrap();
            prop_assert_eq!(&dst, row);
        }
    }

    #[test]
    fn prop_arbitrary_rows_round_trip_12_bit(
        rows in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..48), 0..24)
    ) {
        let config = EncoderConfig::new().with_token_bit_width(12);
        let archive = Encoder::with_config(config).encode(&rows).unwrap();
        for (i, row) in rows.iter().enumerate() {
            let mut dst = Vec::new();
            archive.append_row(&mut dst, i).unwrap();
            prop_assert_eq!(&dst, row);
        }
    }

    #[test]
    fn prop_decoded_len_matches_rows(
        rows in prop::collection::vec(".{0,40}", 0..24)
    ) {
        let archive = Encoder::new().encode(&rows).unwrap();
        for (i, row) in rows.iter().enumerate() {
            prop_assert_eq!(archive.decoded_len(i).unwrap(), row.len());
        }
    }
}
