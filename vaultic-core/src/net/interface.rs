// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Interfaces
//!
//! Thin ownership wrappers around the multiplexer. A [`ServerInterface`]
//! binds a listening socket and surfaces accepted peers through its connect
//! callback; a [`ClientInterface`] dials a single peer and hands back its
//! connection. Both tear everything down on `stop` or drop.

use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tracing::info;

use crate::net::connection::Connection;
use crate::net::error::NetworkError;
use crate::net::multiplexer::{ConnectionCallback, Multiplexer, MultiplexerConfig};

/// Default wait for an outbound TCP connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A listening endpoint. Accepted connections are delivered through the
/// connect callback; disconnects through the disconnect callback.
pub struct ServerInterface {
    local_addr: SocketAddr,
    multiplexer: Multiplexer,
}

impl ServerInterface {
    /// Binds `addr` (port 0 picks a free port) and starts accepting.
    pub fn listen<A: ToSocketAddrs>(
        addr: A,
        on_connect: ConnectionCallback,
        on_disconnect: ConnectionCallback,
        config: MultiplexerConfig,
    ) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let multiplexer = Multiplexer::spawn(Some(listener), on_connect, on_disconnect, config)?;

        info!(addr = %local_addr, "listening");
        Ok(ServerInterface {
            local_addr,
            multiplexer,
        })
    }

    /// The bound (address, port) pair.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and closes every live connection.
    pub fn stop(&mut self) {
        self.multiplexer.stop();
    }
}

/// A dialing endpoint holding at most one connection.
pub struct ClientInterface {
    multiplexer: Multiplexer,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl ClientInterface {
    /// Starts the transport thread without any connection.
    pub fn new(
        on_connect: ConnectionCallback,
        on_disconnect: ConnectionCallback,
        config: MultiplexerConfig,
    ) -> Result<Self, NetworkError> {
        let multiplexer = Multiplexer::spawn(None, on_connect, on_disconnect, config)?;
        Ok(ClientInterface {
            multiplexer,
            connection: Mutex::new(None),
        })
    }

    /// Dials `addr` and returns the established connection. Fails if a
    /// connection is already held.
    pub fn connect<A: ToSocketAddrs>(&self, addr: A) -> Result<Arc<Connection>, NetworkError> {
        let mut slot = self
            .connection
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_some() {
            return Err(NetworkError::AlreadyConnected);
        }

        let mut last_error = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&candidate, DEFAULT_CONNECT_TIMEOUT) {
                Ok(stream) => {
                    let connection = self.multiplexer.register(stream)?;
                    info!(peer = %connection.peer(), "connected");
                    *slot = Some(connection.clone());
                    return Ok(connection);
                }
                Err(err) => last_error = Some(err),
            }
        }

        Err(match last_error {
            Some(err) => NetworkError::ConnectionFailed(err.to_string()),
            None => NetworkError::ConnectionFailed("address resolved to nothing".into()),
        })
    }

    /// The held connection, if any.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Closes the held connection (if any) and stops the transport thread.
    pub fn stop(&mut self) {
        if let Some(connection) = self
            .connection
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            connection.close();
        }
        self.multiplexer.stop();
    }
}
