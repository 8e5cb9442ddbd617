// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Framing Codec
//!
//! Reconstructs message boundaries from a TCP byte stream. Each frame is a
//! fixed-width ASCII header followed by exactly that many raw body bytes:
//!
//! ```text
//! header (32 bytes) = "<decimal length> <decimal millis timestamp>"
//!                     zero-padded on the left to the full width
//! body   (length bytes, ciphertext once the channel is enabled)
//! ```
//!
//! The timestamp is recorded when the header is built. Frame-age enforcement
//! is off by default (matching the behavior of deployed peers); when a
//! maximum age is configured, frames whose header timestamp is older than
//! the threshold at the moment the body completes are dropped.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Fixed width of the frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 32;

/// Upper bound on a single frame body. Large enough for any file this
/// protocol transfers, small enough to reject a corrupted length field
/// before allocating.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Framing error types.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame header is not a valid \"<length> <timestamp>\" pair")]
    InvalidHeader,
    #[error("rendered frame header exceeds {FRAME_HEADER_SIZE} bytes")]
    HeaderOverflow,
    #[error("frame length {0} exceeds maximum message size")]
    OversizedFrame(usize),
}

/// Parsed frame header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Body length in bytes.
    pub length: usize,
    /// Milliseconds since the Unix epoch when the header was built.
    pub timestamp_millis: u64,
}

/// Returns milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Encodes a frame header for a body of `length` bytes.
///
/// Fails with [`FrameError::HeaderOverflow`] if the rendered text does not
/// fit the fixed width — the send must fail rather than corrupt framing.
pub fn encode_header(length: usize, timestamp_millis: u64) -> Result<[u8; FRAME_HEADER_SIZE], FrameError> {
    let rendered = format!("{length} {timestamp_millis}");
    if rendered.len() > FRAME_HEADER_SIZE {
        return Err(FrameError::HeaderOverflow);
    }

    let mut header = [b'0'; FRAME_HEADER_SIZE];
    header[FRAME_HEADER_SIZE - rendered.len()..].copy_from_slice(rendered.as_bytes());
    Ok(header)
}

/// Parses a fixed-width frame header.
pub fn parse_header(bytes: &[u8]) -> Result<FrameHeader, FrameError> {
    if bytes.len() != FRAME_HEADER_SIZE {
        return Err(FrameError::InvalidHeader);
    }

    let text = std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidHeader)?;
    let (length_field, timestamp_field) = text.split_once(' ').ok_or(FrameError::InvalidHeader)?;

    let length: usize = length_field.parse().map_err(|_| FrameError::InvalidHeader)?;
    let timestamp_millis: u64 = timestamp_field
        .parse()
        .map_err(|_| FrameError::InvalidHeader)?;

    if length > MAX_MESSAGE_SIZE {
        return Err(FrameError::OversizedFrame(length));
    }

    Ok(FrameHeader {
        length,
        timestamp_millis,
    })
}

/// Encodes a complete frame (header + body) ready for transmission.
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, FrameError> {
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::OversizedFrame(body.len()));
    }

    let header = encode_header(body.len(), now_millis())?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Per-connection reassembly state.
///
/// Bytes arrive in arbitrary chunks with no boundary guarantee; `push`
/// carries partial headers and bodies across calls and yields every
/// completed frame in arrival order.
#[derive(Debug)]
pub struct Reassembler {
    network_buffer: Vec<u8>,
    message_buffer: Vec<u8>,
    in_progress: bool,
    bytes_remaining: usize,
    current_header: Option<FrameHeader>,
    max_frame_age: Option<Duration>,
}

impl Reassembler {
    /// Creates a reassembler. `max_frame_age` of `None` disables the
    /// staleness check.
    pub fn new(max_frame_age: Option<Duration>) -> Self {
        Reassembler {
            network_buffer: Vec::new(),
            message_buffer: Vec::new(),
            in_progress: false,
            bytes_remaining: 0,
            current_header: None,
            max_frame_age,
        }
    }

    /// Appends newly read bytes and returns any frames completed by them.
    ///
    /// On a header parse failure all carried state is discarded and the
    /// error is returned; the connection itself survives.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        self.network_buffer.extend_from_slice(data);

        let mut completed = Vec::new();
        loop {
            if self.in_progress {
                if self.network_buffer.len() >= self.bytes_remaining {
                    // The rest of the body is available
                    let remaining = self.bytes_remaining;
                    self.message_buffer
                        .extend_from_slice(&self.network_buffer[..remaining]);
                    self.network_buffer.drain(..remaining);

                    let body = std::mem::take(&mut self.message_buffer);
                    let header = self.current_header.take();
                    self.in_progress = false;
                    self.bytes_remaining = 0;

                    if self.is_fresh(header) {
                        completed.push(body);
                    } else {
                        tracing::debug!(bytes = body.len(), "dropped stale frame");
                    }
                } else {
                    // Consume everything available and wait for more data
                    self.bytes_remaining -= self.network_buffer.len();
                    self.message_buffer.append(&mut self.network_buffer);
                    break;
                }
            } else if self.network_buffer.len() >= FRAME_HEADER_SIZE {
                let header = match parse_header(&self.network_buffer[..FRAME_HEADER_SIZE]) {
                    Ok(header) => header,
                    Err(err) => {
                        self.reset();
                        return Err(err);
                    }
                };
                self.network_buffer.drain(..FRAME_HEADER_SIZE);
                self.bytes_remaining = header.length;
                self.current_header = Some(header);
                self.in_progress = true;
            } else {
                // Not enough bytes for a full header yet
                break;
            }
        }

        Ok(completed)
    }

    /// Discards all carried reassembly state.
    pub fn reset(&mut self) {
        self.network_buffer.clear();
        self.message_buffer.clear();
        self.in_progress = false;
        self.bytes_remaining = 0;
        self.current_header = None;
    }

    /// Checks the header timestamp against the time the body completed.
    fn is_fresh(&self, header: Option<FrameHeader>) -> bool {
        let (Some(max_age), Some(header)) = (self.max_frame_age, header) else {
            return true;
        };
        let age = now_millis().saturating_sub(header.timestamp_millis);
        age <= max_age.as_millis() as u64
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Reassembler::new(None)
    }
}

// INLINE_TEST_REQUIRED: Tests private carry state between push calls
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_carried_across_reads() {
        let mut reassembler = Reassembler::new(None);
        let frame = encode_frame(b"hello").unwrap();

        // Feed half the header, then the rest
        let split = FRAME_HEADER_SIZE / 2;
        assert!(reassembler.push(&frame[..split]).unwrap().is_empty());
        assert!(!reassembler.in_progress);

        let frames = reassembler.push(&frame[split..]).unwrap();
        assert_eq!(frames, vec![b"hello".to_vec()]);
        assert!(reassembler.network_buffer.is_empty());
    }

    #[test]
    fn test_body_carried_across_reads() {
        let mut reassembler = Reassembler::new(None);
        let frame = encode_frame(b"abcdef").unwrap();

        let split = FRAME_HEADER_SIZE + 2;
        assert!(reassembler.push(&frame[..split]).unwrap().is_empty());
        assert!(reassembler.in_progress);
        assert_eq!(reassembler.bytes_remaining, 4);

        let frames = reassembler.push(&frame[split..]).unwrap();
        assert_eq!(frames, vec![b"abcdef".to_vec()]);
    }

    #[test]
    fn test_bad_header_resets_state() {
        let mut reassembler = Reassembler::new(None);
        assert!(reassembler.push(&[b'x'; FRAME_HEADER_SIZE]).is_err());
        assert!(reassembler.network_buffer.is_empty());
        assert!(!reassembler.in_progress);

        // The reassembler remains usable after a reset
        let frame = encode_frame(b"ok").unwrap();
        let frames = reassembler.push(&frame).unwrap();
        assert_eq!(frames, vec![b"ok".to_vec()]);
    }

    #[test]
    fn test_stale_frame_dropped_when_age_enforced() {
        let mut reassembler = Reassembler::new(Some(Duration::from_millis(500)));

        // A header stamped well in the past
        let header = encode_header(3, now_millis() - 10_000).unwrap();
        let mut frame = header.to_vec();
        frame.extend_from_slice(b"old");
        assert!(reassembler.push(&frame).unwrap().is_empty());

        // A fresh frame still goes through
        let fresh = encode_frame(b"new").unwrap();
        assert_eq!(reassembler.push(&fresh).unwrap(), vec![b"new".to_vec()]);
    }
}
