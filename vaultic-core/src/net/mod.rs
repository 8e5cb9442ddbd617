// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Framed Transport
//!
//! Length-prefixed framing over TCP, a single poll-driven multiplexer
//! thread that owns every socket, and connection handles that session
//! workers talk to through queues.

pub mod connection;
pub mod error;
pub mod framing;
pub mod interface;
pub mod multiplexer;

pub use connection::{Connection, DEFAULT_RECEIVE_TIMEOUT};
pub use error::NetworkError;
pub use framing::{FrameError, FrameHeader, Reassembler, FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use interface::{ClientInterface, ServerInterface, DEFAULT_CONNECT_TIMEOUT};
pub use multiplexer::{ConnectionCallback, Multiplexer, MultiplexerConfig, MuxCommand};
