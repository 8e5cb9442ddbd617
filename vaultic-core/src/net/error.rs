// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Error Types

use thiserror::Error;

use crate::crypto::ChannelError;
use crate::net::framing::FrameError;

/// Network layer error types.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("already connected")]
    AlreadyConnected,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("message of {0} bytes exceeds the maximum message size")]
    MessageTooLarge(usize),
    #[error("received message is not valid UTF-8")]
    InvalidUtf8,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
