// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Framed Connection
//!
//! The session-facing half of one socket. The multiplexer thread owns the
//! socket itself; a `Connection` owns the queue endpoints: an inbound
//! receiver of fully reassembled frames (still ciphertext once the channel
//! is enabled) and an outbound sender of frames awaiting transmission. The
//! attached [`SecureChannel`] encrypts on send and decrypts on receive.
//!
//! Shutdown is signalled by channel disconnection: when the multiplexer
//! tears the connection down it drops the inbound sender, and any blocked
//! `receive` observes the closed queue and returns absent.

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::warn;

use crate::crypto::SecureChannel;
use crate::net::error::NetworkError;
use crate::net::framing::MAX_MESSAGE_SIZE;
use crate::net::multiplexer::MuxCommand;

/// Default wait for a blocking receive when the caller gives no timeout to
/// a request/response helper.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// One established connection, identified by the peer (address, port) pair
/// for its whole lifetime.
pub struct Connection {
    peer: SocketAddr,
    inbound: Receiver<Vec<u8>>,
    outbound: Sender<Vec<u8>>,
    channel: Mutex<SecureChannel>,
    control: Sender<MuxCommand>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}

impl Connection {
    pub(crate) fn new(
        peer: SocketAddr,
        inbound: Receiver<Vec<u8>>,
        outbound: Sender<Vec<u8>>,
        control: Sender<MuxCommand>,
    ) -> Self {
        Connection {
            peer,
            inbound,
            outbound,
            channel: Mutex::new(SecureChannel::new()),
            control,
        }
    }

    /// The peer (address, port) identity of this connection.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Locks the attached secure channel.
    pub fn channel(&self) -> MutexGuard<'_, SecureChannel> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encrypts (if enabled) and enqueues one message for transmission.
    /// Returns as soon as the frame is queued.
    pub fn send_raw(&self, message: &[u8]) -> Result<(), NetworkError> {
        let payload = self.channel().encrypt(message)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge(payload.len()));
        }
        self.outbound
            .send(payload)
            .map_err(|_| NetworkError::ConnectionClosed)
    }

    /// Sends one text message.
    pub fn send(&self, message: &str) -> Result<(), NetworkError> {
        self.send_raw(message.as_bytes())
    }

    /// Blocks until a frame arrives, the timeout elapses, or the connection
    /// shuts down. Returns `None` on timeout or shutdown. A frame that
    /// fails to decrypt is dropped and the wait continues.
    pub fn receive_raw(&self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>, NetworkError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let frame = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    match self.inbound.recv_timeout(deadline - now) {
                        Ok(frame) => frame,
                        Err(RecvTimeoutError::Timeout) => return Ok(None),
                        Err(RecvTimeoutError::Disconnected) => return Ok(None),
                    }
                }
                None => match self.inbound.recv() {
                    Ok(frame) => frame,
                    Err(_) => return Ok(None),
                },
            };

            match self.channel().decrypt(&frame) {
                Ok(plain) => return Ok(Some(plain)),
                Err(err) => {
                    // Frame-fatal but connection-survivable
                    warn!(peer = %self.peer, error = %err, "dropped undecryptable frame");
                }
            }
        }
    }

    /// Blocking text receive. Returns `None` on timeout or shutdown.
    pub fn receive(&self, timeout: Option<Duration>) -> Result<Option<String>, NetworkError> {
        match self.receive_raw(timeout)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| NetworkError::InvalidUtf8),
            None => Ok(None),
        }
    }

    /// Sends one message and blocks for the reply. Not safe to call
    /// concurrently on the same connection from two callers; the session
    /// state machine is the single owner of this pattern.
    pub fn request(&self, message: &str) -> Result<Option<String>, NetworkError> {
        self.send(message)?;
        self.receive(Some(DEFAULT_RECEIVE_TIMEOUT))
    }

    /// Sends one raw message and blocks for the text reply.
    pub fn request_raw(&self, message: &[u8]) -> Result<Option<String>, NetworkError> {
        self.send_raw(message)?;
        self.receive(Some(DEFAULT_RECEIVE_TIMEOUT))
    }

    /// Asks the multiplexer to tear this connection down. The disconnect
    /// callback fires once the socket is deregistered.
    pub fn close(&self) {
        let _ = self.control.send(MuxCommand::Close(self.peer));
    }
}
