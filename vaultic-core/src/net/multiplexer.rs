// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Socket Multiplexer
//!
//! A single dedicated worker thread owns every raw socket. It polls for
//! readiness, runs the framing codec on readable sockets, flushes queued
//! outbound frames (one framed message per connection per tick, with a
//! partial-write carry), accepts new connections when given a listener, and
//! fires the connect/disconnect callbacks.
//!
//! No other thread touches sockets or the connection registry; session
//! workers interact with a connection only through its queues. Tearing a
//! connection down drops its inbound sender, which unblocks any waiting
//! receive on the session side.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, error, info, warn};

use crate::net::connection::Connection;
use crate::net::error::NetworkError;
use crate::net::framing::{self, Reassembler};

/// Token reserved for the listening socket.
const LISTENER_TOKEN: Token = Token(0);

/// Control messages for the multiplexer thread.
pub enum MuxCommand {
    /// Wrap an established socket into a connection and register it.
    Register {
        stream: std::net::TcpStream,
        reply: Option<Sender<Arc<Connection>>>,
    },
    /// Tear down one connection by its peer identity.
    Close(SocketAddr),
    /// Tear down everything and exit the worker.
    Shutdown,
}

/// Callback invoked with a connection handle on connect or disconnect.
pub type ConnectionCallback = Box<dyn Fn(&Arc<Connection>) + Send>;

/// Multiplexer tuning knobs.
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Poll timeout per loop iteration; also the idle cadence.
    pub poll_interval: Duration,
    /// Frame staleness threshold; `None` disables the check.
    pub max_frame_age: Option<Duration>,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        MultiplexerConfig {
            poll_interval: Duration::from_millis(25),
            max_frame_age: None,
        }
    }
}

/// Handle to the multiplexer worker thread.
pub struct Multiplexer {
    commands: Sender<MuxCommand>,
    thread: Option<JoinHandle<()>>,
}

impl Multiplexer {
    /// Spawns the worker. With a listener, accepted sockets become
    /// connections automatically; without one, connections arrive only via
    /// [`MuxCommand::Register`].
    pub fn spawn(
        listener: Option<std::net::TcpListener>,
        on_connect: ConnectionCallback,
        on_disconnect: ConnectionCallback,
        config: MultiplexerConfig,
    ) -> Result<Self, NetworkError> {
        let poll = Poll::new()?;

        let listener = match listener {
            Some(listener) => {
                listener.set_nonblocking(true)?;
                let mut listener = TcpListener::from_std(listener);
                poll.registry()
                    .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
                Some(listener)
            }
            None => None,
        };

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let mut worker = MuxWorker {
            poll,
            listener,
            registry: HashMap::new(),
            by_peer: HashMap::new(),
            next_token: LISTENER_TOKEN.0 + 1,
            commands: command_rx,
            command_tx: command_tx.clone(),
            on_connect,
            on_disconnect,
            config,
        };

        let thread = std::thread::Builder::new()
            .name("vaultic-mux".into())
            .spawn(move || worker.run())
            .map_err(NetworkError::Io)?;

        Ok(Multiplexer {
            commands: command_tx,
            thread: Some(thread),
        })
    }

    /// Registers an outbound socket and waits for its connection handle.
    pub(crate) fn register(
        &self,
        stream: std::net::TcpStream,
    ) -> Result<Arc<Connection>, NetworkError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(MuxCommand::Register {
                stream,
                reply: Some(reply_tx),
            })
            .map_err(|_| NetworkError::ConnectionClosed)?;

        reply_rx.recv_timeout(Duration::from_secs(5)).map_err(|_| {
            NetworkError::ConnectionFailed("multiplexer did not register the connection".into())
        })
    }

    /// Stops accepting, tears down every live connection, and joins the
    /// worker thread.
    pub fn stop(&mut self) {
        let _ = self.commands.send(MuxCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One registered socket and its transport-side state.
struct Registered {
    stream: TcpStream,
    inbound: Sender<Vec<u8>>,
    outbound: Receiver<Vec<u8>>,
    reassembler: Reassembler,
    write_carry: Vec<u8>,
    write_offset: usize,
    handle: Arc<Connection>,
}

/// Worker-thread state: the only owner of sockets and the registry.
struct MuxWorker {
    poll: Poll,
    listener: Option<TcpListener>,
    registry: HashMap<Token, Registered>,
    by_peer: HashMap<SocketAddr, Token>,
    next_token: usize,
    commands: Receiver<MuxCommand>,
    command_tx: Sender<MuxCommand>,
    on_connect: ConnectionCallback,
    on_disconnect: ConnectionCallback,
    config: MultiplexerConfig,
}

impl MuxWorker {
    fn run(&mut self) {
        let mut events = Events::with_capacity(128);

        'outer: loop {
            if let Err(err) = self.poll.poll(&mut events, Some(self.config.poll_interval)) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %err, "poll failed, stopping multiplexer");
                break;
            }

            let mut to_close = Vec::new();
            for event in events.iter() {
                let token = event.token();
                if token == LISTENER_TOKEN && self.listener.is_some() {
                    self.accept_ready();
                } else if event.is_readable() || event.is_read_closed() {
                    if !self.read_ready(token) {
                        to_close.push(token);
                    }
                }
            }
            for token in to_close {
                self.close_connection(token);
            }

            loop {
                match self.commands.try_recv() {
                    Ok(MuxCommand::Register { stream, reply }) => {
                        self.register_std(stream, reply);
                    }
                    Ok(MuxCommand::Close(peer)) => {
                        if let Some(token) = self.by_peer.get(&peer).copied() {
                            self.close_connection(token);
                        }
                    }
                    Ok(MuxCommand::Shutdown) | Err(TryRecvError::Disconnected) => break 'outer,
                    Err(TryRecvError::Empty) => break,
                }
            }

            // One framed write attempt per connection per tick
            let tokens: Vec<Token> = self.registry.keys().copied().collect();
            for token in tokens {
                if !self.flush_ready(token) {
                    self.close_connection(token);
                }
            }
        }

        let tokens: Vec<Token> = self.registry.keys().copied().collect();
        for token in tokens {
            self.close_connection(token);
        }
        self.listener.take();
        debug!("multiplexer stopped");
    }

    /// Accepts every pending socket on the listener.
    fn accept_ready(&mut self) {
        let mut accepted = Vec::new();
        if let Some(listener) = self.listener.as_ref() {
            loop {
                match listener.accept() {
                    Ok(pair) => accepted.push(pair),
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        break;
                    }
                }
            }
        }
        for (stream, peer) in accepted {
            self.add_connection(stream, peer, None);
        }
    }

    /// Converts a connected std socket and registers it.
    fn register_std(
        &mut self,
        stream: std::net::TcpStream,
        reply: Option<Sender<Arc<Connection>>>,
    ) {
        let registered = stream
            .set_nonblocking(true)
            .and_then(|_| stream.peer_addr())
            .map(|peer| (TcpStream::from_std(stream), peer));

        match registered {
            Ok((stream, peer)) => self.add_connection(stream, peer, reply),
            Err(err) => warn!(error = %err, "failed to prepare socket for registration"),
        }
    }

    /// Wraps a socket into a connection, registers it for readiness events,
    /// and fires the connect callback.
    fn add_connection(
        &mut self,
        mut stream: TcpStream,
        peer: SocketAddr,
        reply: Option<Sender<Arc<Connection>>>,
    ) {
        let token = Token(self.next_token);
        self.next_token += 1;

        if let Err(err) = self
            .poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)
        {
            warn!(peer = %peer, error = %err, "failed to register connection");
            return;
        }

        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded();
        let handle = Arc::new(Connection::new(
            peer,
            inbound_rx,
            outbound_tx,
            self.command_tx.clone(),
        ));

        self.registry.insert(
            token,
            Registered {
                stream,
                inbound: inbound_tx,
                outbound: outbound_rx,
                reassembler: Reassembler::new(self.config.max_frame_age),
                write_carry: Vec::new(),
                write_offset: 0,
                handle: handle.clone(),
            },
        );
        self.by_peer.insert(peer, token);

        info!(peer = %peer, "connection established");
        (self.on_connect)(&handle);
        if let Some(reply) = reply {
            let _ = reply.send(handle);
        }
    }

    /// Drains readable bytes through the reassembler. Returns false when
    /// the connection must be torn down (peer close or read error).
    fn read_ready(&mut self, token: Token) -> bool {
        let Some(registered) = self.registry.get_mut(&token) else {
            return true;
        };

        let mut buffer = [0u8; 4096];
        loop {
            match registered.stream.read(&mut buffer) {
                // Zero-byte read signals peer close
                Ok(0) => return false,
                Ok(n) => match registered.reassembler.push(&buffer[..n]) {
                    Ok(frames) => {
                        for frame in frames {
                            if registered.inbound.send(frame).is_err() {
                                // Session side is gone
                                return false;
                            }
                        }
                    }
                    Err(err) => {
                        // Frame dropped, reassembly state reset, keep going
                        warn!(peer = %registered.handle.peer(), error = %err, "dropped unframeable data");
                    }
                },
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return true,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(peer = %registered.handle.peer(), error = %err, "read failed");
                    return false;
                }
            }
        }
    }

    /// Writes the pending carry, or frames and writes one queued message.
    /// Returns false when the connection must be torn down.
    fn flush_ready(&mut self, token: Token) -> bool {
        let Some(registered) = self.registry.get_mut(&token) else {
            return true;
        };

        if registered.write_carry.is_empty() {
            match registered.outbound.try_recv() {
                Ok(body) => match framing::encode_frame(&body) {
                    Ok(frame) => {
                        registered.write_carry = frame;
                        registered.write_offset = 0;
                    }
                    Err(err) => {
                        warn!(peer = %registered.handle.peer(), error = %err, "dropped unframeable message");
                        return true;
                    }
                },
                // Nothing queued (or session side gone; reads detect that)
                Err(_) => return true,
            }
        }

        while registered.write_offset < registered.write_carry.len() {
            match registered
                .stream
                .write(&registered.write_carry[registered.write_offset..])
            {
                Ok(0) => return false,
                Ok(n) => registered.write_offset += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return true,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(peer = %registered.handle.peer(), error = %err, "write failed");
                    return false;
                }
            }
        }

        registered.write_carry.clear();
        registered.write_offset = 0;
        true
    }

    /// Deregisters and drops one connection, firing the disconnect
    /// callback exactly once. Dropping the inbound sender unblocks any
    /// waiting receive on the session side.
    fn close_connection(&mut self, token: Token) {
        let Some(mut registered) = self.registry.remove(&token) else {
            return;
        };
        self.by_peer.remove(&registered.handle.peer());
        let _ = self.poll.registry().deregister(&mut registered.stream);

        let handle = registered.handle.clone();
        drop(registered);

        info!(peer = %handle.peer(), "connection closed");
        (self.on_disconnect)(&handle);
    }
}
