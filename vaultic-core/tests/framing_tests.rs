// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Framing codec tests.

use proptest::prelude::*;

use vaultic_core::net::framing::{
    encode_frame, encode_header, now_millis, parse_header, FrameHeader, FRAME_HEADER_SIZE,
};
use vaultic_core::net::{FrameError, Reassembler};

#[test]
fn test_header_roundtrip() {
    let encoded = encode_header(4096, 1_760_000_000_123).unwrap();
    assert_eq!(encoded.len(), FRAME_HEADER_SIZE);
    assert_eq!(
        parse_header(&encoded).unwrap(),
        FrameHeader {
            length: 4096,
            timestamp_millis: 1_760_000_000_123,
        }
    );
}

#[test]
fn test_header_is_left_zero_padded_ascii() {
    let encoded = encode_header(5, 7).unwrap();
    assert!(encoded.starts_with(b"0"));
    assert!(encoded.ends_with(b"5 7"));
}

#[test]
fn test_parse_rejects_garbage_header() {
    let mut bad = [b'x'; FRAME_HEADER_SIZE];
    assert!(matches!(
        parse_header(&bad),
        Err(FrameError::InvalidHeader)
    ));
    bad[..FRAME_HEADER_SIZE].copy_from_slice(b"00000000000000000000000000000000");
    // all digits but no separator
    assert!(parse_header(&bad).is_err());
}

#[test]
fn test_encode_frame_prefixes_header() {
    let frame = encode_frame(b"hello").unwrap();
    assert_eq!(frame.len(), FRAME_HEADER_SIZE + 5);
    let header = parse_header(&frame[..FRAME_HEADER_SIZE]).unwrap();
    assert_eq!(header.length, 5);
    assert!(header.timestamp_millis <= now_millis());
    assert_eq!(&frame[FRAME_HEADER_SIZE..], b"hello");
}

#[test]
fn test_reassembler_splits_concatenated_frames() {
    let mut wire = encode_frame(b"first").unwrap();
    wire.extend(encode_frame(b"second").unwrap());
    wire.extend(encode_frame(b"").unwrap());

    let mut reassembler = Reassembler::new(None);
    let messages = reassembler.push(&wire).unwrap();
    assert_eq!(messages, vec![b"first".to_vec(), b"second".to_vec(), vec![]]);
}

#[test]
fn test_reassembler_recovers_after_bad_header() {
    let mut reassembler = Reassembler::new(None);
    assert!(reassembler.push(&[b'!'; FRAME_HEADER_SIZE]).is_err());

    // State is reset; a clean frame parses again.
    let messages = reassembler.push(&encode_frame(b"ok").unwrap()).unwrap();
    assert_eq!(messages, vec![b"ok".to_vec()]);
}

proptest! {
    /// Reassembly must not depend on how the byte stream is chunked.
    #[test]
    fn test_chunking_invariance(
        bodies in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..8),
        chunk in 1usize..96,
    ) {
        let mut wire = Vec::new();
        for body in &bodies {
            wire.extend(encode_frame(body).unwrap());
        }

        let mut reassembler = Reassembler::new(None);
        let mut messages = Vec::new();
        for piece in wire.chunks(chunk) {
            messages.extend(reassembler.push(piece).unwrap());
        }
        prop_assert_eq!(messages, bodies);
    }
}
