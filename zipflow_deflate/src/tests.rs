use std::io::Read;

use super::*;

fn patterned_data(len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    for i in 0..len {
        data.push(((i as u32 * 31 + 7) % 251) as u8);
    }
    data
}

fn mixed_data(bytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes);
    let mut state: u32 = 0x1234_5678;
    while out.len() < bytes {
        let zone = (out.len() / 4096) % 3;
        match zone {
            0 => out.extend_from_slice(b"zipflow-fixed-deflate-"),
            1 => out.extend_from_slice(b"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
            _ => {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                out.push((state >> 24) as u8);
            }
        }
    }
    out.truncate(bytes);
    out
}

fn compress_with(encoder: &mut Deflater, chunks: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    encoder
        .begin_stream(&mut out)
        .expect("begin_stream should succeed");
    for chunk in chunks {
        encoder.write(chunk, &mut out).expect("write should succeed");
    }
    encoder
        .finish_stream(&mut out)
        .expect("finish_stream should succeed");
    assert_eq!(encoder.compressed_bytes(), out.len() as u64);
    out
}

fn compress(chunks: &[&[u8]]) -> Vec<u8> {
    compress_with(&mut Deflater::new(), chunks)
}

fn inflate(data: &[u8]) -> Vec<u8> {
    let mut restored = Vec::new();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut restored)
        .expect("stream should be decodable");
    restored
}

#[test]
fn empty_stream_is_the_two_byte_block() {
    let out = compress(&[]);
    assert_eq!(out, [0x03, 0x00]);
    assert!(inflate(&out).is_empty());
}

#[test]
fn single_literal_matches_known_bitstream() {
    // Block header (1 + 01), literal 'a', end-of-block, zero padding.
    let out = compress(&[b"a"]);
    assert_eq!(out, [0x4B, 0x04, 0x00]);
    assert_eq!(inflate(&out), b"a");
}

#[test]
fn three_byte_input_is_all_literals() {
    let out = compress(&[b"abc"]);
    // 3 header bits + three 8-bit literals + 7-bit end-of-block = 34 bits.
    assert_eq!(out.len(), 5);
    assert_eq!(inflate(&out), b"abc");
}

#[test]
fn roundtrip_exactly_one_batch() {
    let input = patterned_data(32_768);
    assert_eq!(inflate(&compress(&[&input])), input);
}

#[test]
fn roundtrip_one_batch_plus_literal_tail() {
    let input = patterned_data(32_769);
    assert_eq!(inflate(&compress(&[&input])), input);
}

#[test]
fn roundtrip_across_many_batches() {
    let input = mixed_data(128 * 1024 + 321);
    assert_eq!(inflate(&compress(&[&input])), input);
}

#[test]
fn repeated_runs_compress_tightly() {
    let input = vec![b'A'; 400_000];
    let out = compress(&[&input]);
    assert!(
        out.len() < 8192,
        "run of 400k bytes should collapse to back-references, got {} bytes",
        out.len()
    );
    assert_eq!(inflate(&out), input);
}

#[test]
fn binary_sequence_roundtrip() {
    let mut input = Vec::with_capacity(256_000);
    for _ in 0..1000 {
        input.extend(0..=255u8);
    }
    assert_eq!(inflate(&compress(&[&input])), input);
}

#[test]
fn match_can_reference_slid_history() {
    let mut input = patterned_data(40_000);
    let (head, tail) = input.split_at_mut(32_768);
    tail[100..400].copy_from_slice(&head[100..400]);
    assert_eq!(inflate(&compress(&[&input])), input);
}

#[test]
fn chunked_writes_match_single_write() {
    let input = mixed_data(70_000);
    let whole = compress(&[&input]);
    let split = compress(&[&input[..11], &input[11..40_000], &input[40_000..]]);
    assert_eq!(whole, split);
}

#[test]
fn encoder_reuse_starts_a_fresh_stream() {
    let first = mixed_data(50_000);
    let second = patterned_data(9_000);

    let mut encoder = Deflater::new();
    let _ = compress_with(&mut encoder, &[&first]);
    let reused = compress_with(&mut encoder, &[&second]);

    assert_eq!(reused, compress(&[&second]));
    assert_eq!(inflate(&reused), second);
}

#[test]
fn length_symbol_boundaries() {
    assert_eq!(length_index(3), 0);
    assert_eq!(length_index(10), 7);
    assert_eq!(length_index(11), 8);
    assert_eq!(length_index(227), 27);
    assert_eq!(length_index(257), 27);
    // 258 must use the dedicated zero-extra-bit symbol 285.
    assert_eq!(length_index(258), 28);
    assert_eq!(LEN_EXTRA[28], 0);
}

#[test]
fn distance_symbol_boundaries() {
    assert_eq!(distance_index(1), 0);
    assert_eq!(distance_index(4), 3);
    assert_eq!(distance_index(5), 4);
    assert_eq!(distance_index(24_577), 29);
    assert_eq!(distance_index(32_767), 29);
}

#[test]
fn fixed_code_table_boundaries() {
    assert_eq!(fixed_litlen_code(0), (0x30, 8));
    assert_eq!(fixed_litlen_code(143), (0xBF, 8));
    assert_eq!(fixed_litlen_code(144), (0x190, 9));
    assert_eq!(fixed_litlen_code(255), (0x1FF, 9));
    assert_eq!(fixed_litlen_code(256), (0x00, 7));
    assert_eq!(fixed_litlen_code(279), (0x17, 7));
    assert_eq!(fixed_litlen_code(280), (0xC0, 8));
    assert_eq!(fixed_litlen_code(287), (0xC7, 8));
}

#[test]
fn bit_reversal() {
    assert_eq!(reverse_bits(0b1, 5), 0b10000);
    assert_eq!(reverse_bits(0x91, 8), 0x89);
    assert_eq!(reverse_bits(0x00, 7), 0x00);
}
