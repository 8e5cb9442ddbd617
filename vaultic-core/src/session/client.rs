// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Client Session
//!
//! The client-side state machine mirrors the server's: authenticate first,
//! then idle. Instead of inbound envelopes, the client idle state polls an
//! intent queue fed by the [`FileClient`] facade, and every outcome is
//! reported back as a [`ClientEvent`]. Transport failures and protocol
//! refusals stay distinguishable: refusals arrive inside the operation's
//! own event, transport trouble as [`ClientEvent::TransportError`].

use std::collections::VecDeque;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::warn;

use crate::crypto::PublicCoordinates;
use crate::net::multiplexer::MultiplexerConfig;
use crate::net::{ClientInterface, Connection, NetworkError};
use crate::proto::{
    decode_envelope, encode_envelope, AdminData, AuthPayload, Envelope, LoginRequest,
    PrivilegeLevel, RemoveFilesRequest, UploadFile, ViewFilesRequest,
};

use super::driver::{drive, SessionError, SessionState, Step};
use super::HANDSHAKE_TIMEOUT;

/// How often the idle state checks the intent queue.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Ceiling on one blocking facade call; a shade above the connection's
/// own receive timeout so the session reports first.
const FACADE_TIMEOUT: Duration = Duration::from_secs(35);

/// Client-facing error types.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("client session worker is gone")]
    WorkerGone,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One file queued for upload.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Per-file upload verdict.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub name: String,
    pub success: bool,
    pub message: String,
}

/// Everything the session worker reports back.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Authenticated,
    LoginResult {
        success: bool,
        message: String,
        level: Option<PrivilegeLevel>,
    },
    LogoutResult {
        success: bool,
        message: String,
    },
    UploadResult {
        name: String,
        success: bool,
        message: String,
    },
    UploadComplete,
    FileList {
        success: bool,
        message: String,
        files: Vec<String>,
    },
    RemoveResult {
        success: bool,
        message: String,
    },
    AdminDataResult {
        success: bool,
        message: String,
        data: Option<AdminData>,
    },
    HeartbeatAck,
    TransportError {
        message: String,
    },
    Disconnected,
}

/// Everything a client session state needs.
pub struct ClientContext {
    pub connection: Arc<Connection>,
    pub intents: Receiver<ClientState>,
    pub events: Sender<ClientEvent>,
}

impl ClientContext {
    fn send(&self, envelope: &Envelope) -> Result<(), SessionError> {
        self.connection.send(&encode_envelope(envelope)?)?;
        Ok(())
    }

    /// Sends one envelope and decodes the reply.
    fn exchange(&self, envelope: &Envelope) -> Result<Envelope, SessionError> {
        let Some(reply) = self.connection.request(&encode_envelope(envelope)?)? else {
            return Err(SessionError::ReplyTimeout);
        };
        Ok(decode_envelope(&reply)?)
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

/// Client-side session states, fed through the intent queue.
pub enum ClientState {
    Authenticate,
    Idle,
    Login {
        register: bool,
        email: String,
        password: String,
    },
    Logout,
    Upload {
        files: Vec<UploadItem>,
    },
    ViewFiles {
        user_email: String,
    },
    RemoveFiles {
        user_email: String,
        files: Vec<String>,
    },
    ViewAdminData,
    Heartbeat,
}

impl SessionState for ClientState {
    type Context = ClientContext;

    fn idle() -> Self {
        ClientState::Idle
    }

    fn name(&self) -> &'static str {
        match self {
            ClientState::Authenticate => "authenticate",
            ClientState::Idle => "idle",
            ClientState::Login { .. } => "login",
            ClientState::Logout => "logout",
            ClientState::Upload { .. } => "upload",
            ClientState::ViewFiles { .. } => "view_files",
            ClientState::RemoveFiles { .. } => "remove_files",
            ClientState::ViewAdminData => "view_admin_data",
            ClientState::Heartbeat => "heartbeat",
        }
    }

    fn run(
        self,
        ctx: &mut ClientContext,
        pending: &mut VecDeque<Self>,
    ) -> Result<Step, SessionError> {
        let name = self.name();
        let result = match self {
            ClientState::Authenticate => return run_authenticate(ctx),
            ClientState::Idle => return run_idle(ctx, pending),
            ClientState::Login {
                register,
                email,
                password,
            } => run_login(ctx, register, email, password),
            ClientState::Logout => run_logout(ctx),
            ClientState::Upload { files } => run_upload(ctx, files),
            ClientState::ViewFiles { user_email } => run_view_files(ctx, user_email),
            ClientState::RemoveFiles { user_email, files } => {
                run_remove_files(ctx, user_email, files)
            }
            ClientState::ViewAdminData => run_view_admin_data(ctx),
            ClientState::Heartbeat => run_heartbeat(ctx),
        };

        // Report the failure as an event so the facade unblocks; only a
        // closed connection ends the session.
        match result {
            Ok(step) => Ok(step),
            Err(err) => {
                warn!(state = name, error = %err, "operation failed");
                let fatal = matches!(
                    err,
                    SessionError::Network(NetworkError::ConnectionClosed)
                );
                ctx.emit(ClientEvent::TransportError {
                    message: err.to_string(),
                });
                Ok(if fatal { Step::Stop } else { Step::Continue })
            }
        }
    }
}

/// Mirror of the server handshake: absorb the offered key, reply with our
/// own, await confirmation, enable the channel.
fn run_authenticate(ctx: &mut ClientContext) -> Result<Step, SessionError> {
    match handshake(ctx) {
        Ok(()) => {
            ctx.emit(ClientEvent::Authenticated);
            Ok(Step::Continue)
        }
        Err(err) => {
            warn!(peer = %ctx.connection.peer(), error = %err, "handshake failed");
            ctx.emit(ClientEvent::TransportError {
                message: err.to_string(),
            });
            Ok(Step::Stop)
        }
    }
}

fn handshake(ctx: &mut ClientContext) -> Result<(), SessionError> {
    let Some(offer) = ctx.connection.receive(Some(HANDSHAKE_TIMEOUT))? else {
        return Err(SessionError::Handshake("no key offer".into()));
    };
    let Envelope::Auth(payload) = decode_envelope(&offer)? else {
        return Err(SessionError::Handshake("expected a key offer".into()));
    };
    let (Some(x), Some(y)) = (payload.x, payload.y) else {
        return Err(SessionError::Handshake("key offer without coordinates".into()));
    };

    let coordinates = ctx.connection.channel().generate_key_pair(&mut OsRng)?;
    ctx.connection
        .channel()
        .derive_shared_key(&PublicCoordinates { x, y })?;
    ctx.send(&Envelope::Auth(AuthPayload {
        authenticated: true,
        x: Some(coordinates.x),
        y: Some(coordinates.y),
    }))?;

    let Some(confirmation) = ctx.connection.receive(Some(HANDSHAKE_TIMEOUT))? else {
        return Err(SessionError::Handshake("no confirmation".into()));
    };
    match decode_envelope(&confirmation)? {
        Envelope::Auth(payload) if payload.authenticated => {
            ctx.connection.channel().set_enabled(true);
            Ok(())
        }
        _ => Err(SessionError::Handshake("peer refused the key exchange".into())),
    }
}

/// Polls the intent queue. A dropped intent sender is the shutdown signal.
fn run_idle(
    ctx: &mut ClientContext,
    pending: &mut VecDeque<ClientState>,
) -> Result<Step, SessionError> {
    match ctx.intents.recv_timeout(IDLE_POLL) {
        Ok(state) => pending.push_back(state),
        Err(RecvTimeoutError::Timeout) => {}
        Err(RecvTimeoutError::Disconnected) => return Ok(Step::Stop),
    }
    Ok(Step::Continue)
}

fn run_login(
    ctx: &mut ClientContext,
    register: bool,
    email: String,
    password: String,
) -> Result<Step, SessionError> {
    let reply = ctx.exchange(&Envelope::Login(LoginRequest {
        register_user: register,
        email,
        password,
    }))?;
    match reply {
        Envelope::LoginResponse(response) => {
            ctx.emit(ClientEvent::LoginResult {
                success: response.success,
                message: response.message,
                level: response.level,
            });
            Ok(Step::Continue)
        }
        other => Err(unexpected(&other)),
    }
}

fn run_logout(ctx: &mut ClientContext) -> Result<Step, SessionError> {
    match ctx.exchange(&Envelope::Logout)? {
        Envelope::Response(response) => {
            ctx.emit(ClientEvent::LogoutResult {
                success: response.success,
                message: response.message,
            });
            Ok(Step::Continue)
        }
        other => Err(unexpected(&other)),
    }
}

/// Drives the lockstep upload: announce a file, await the ready verdict,
/// send the raw body, await the stored confirmation. A session-rejected
/// refusal means the server never entered its upload loop, so the batch is
/// abandoned without an end marker.
fn run_upload(ctx: &mut ClientContext, files: Vec<UploadItem>) -> Result<Step, SessionError> {
    ctx.send(&Envelope::UploadStart)?;

    for item in files {
        let verdict = ctx.exchange(&Envelope::UploadFile(UploadFile {
            name: item.name.clone(),
        }))?;
        let Envelope::UploadResult(result) = verdict else {
            return Err(unexpected(&verdict));
        };

        if !result.success {
            let aborted = result.session_rejected;
            ctx.emit(ClientEvent::UploadResult {
                name: item.name,
                success: false,
                message: result.message,
            });
            if aborted {
                ctx.emit(ClientEvent::UploadComplete);
                return Ok(Step::Continue);
            }
            continue;
        }

        ctx.connection.send_raw(&item.bytes)?;
        let Some(stored) = ctx
            .connection
            .receive(Some(crate::net::DEFAULT_RECEIVE_TIMEOUT))?
        else {
            return Err(SessionError::ReplyTimeout);
        };
        match decode_envelope(&stored)? {
            Envelope::UploadResult(result) => ctx.emit(ClientEvent::UploadResult {
                name: item.name,
                success: result.success,
                message: result.message,
            }),
            other => return Err(unexpected(&other)),
        }
    }

    ctx.send(&Envelope::UploadEnd)?;
    ctx.emit(ClientEvent::UploadComplete);
    Ok(Step::Continue)
}

fn run_view_files(ctx: &mut ClientContext, user_email: String) -> Result<Step, SessionError> {
    match ctx.exchange(&Envelope::ViewFilesRequest(ViewFilesRequest { user_email }))? {
        Envelope::ViewFilesResponse(response) => {
            ctx.emit(ClientEvent::FileList {
                success: response.success,
                message: response.message,
                files: response.files.unwrap_or_default(),
            });
            Ok(Step::Continue)
        }
        other => Err(unexpected(&other)),
    }
}

fn run_remove_files(
    ctx: &mut ClientContext,
    user_email: String,
    files: Vec<String>,
) -> Result<Step, SessionError> {
    match ctx.exchange(&Envelope::RemoveFiles(RemoveFilesRequest { user_email, files }))? {
        Envelope::Response(response) => {
            ctx.emit(ClientEvent::RemoveResult {
                success: response.success,
                message: response.message,
            });
            Ok(Step::Continue)
        }
        other => Err(unexpected(&other)),
    }
}

fn run_view_admin_data(ctx: &mut ClientContext) -> Result<Step, SessionError> {
    match ctx.exchange(&Envelope::ViewAdminDataRequest)? {
        Envelope::ViewAdminDataResponse(response) => {
            ctx.emit(ClientEvent::AdminDataResult {
                success: response.success,
                message: response.message,
                data: response.data,
            });
            Ok(Step::Continue)
        }
        other => Err(unexpected(&other)),
    }
}

fn run_heartbeat(ctx: &mut ClientContext) -> Result<Step, SessionError> {
    match ctx.exchange(&Envelope::Heartbeat)? {
        Envelope::Heartbeat => {
            ctx.emit(ClientEvent::HeartbeatAck);
            Ok(Step::Continue)
        }
        other => Err(unexpected(&other)),
    }
}

fn unexpected(envelope: &Envelope) -> SessionError {
    SessionError::UnexpectedReply(format!("{envelope:?}"))
}

/// Connected file client. Blocking helpers submit an intent to the session
/// worker and wait for its outcome event; the raw event stream is also
/// available for callers that want to multiplex.
pub struct FileClient {
    interface: ClientInterface,
    intents: Option<Sender<ClientState>>,
    events: Receiver<ClientEvent>,
    worker: Option<JoinHandle<()>>,
}

impl FileClient {
    /// Dials `addr` and blocks until the secure channel is established.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (intent_tx, intent_rx) = crossbeam_channel::unbounded();

        let disconnect_events = event_tx.clone();
        let interface = ClientInterface::new(
            Box::new(|_| {}),
            Box::new(move |_| {
                let _ = disconnect_events.send(ClientEvent::Disconnected);
            }),
            MultiplexerConfig::default(),
        )?;
        let connection = interface.connect(addr)?;

        let mut ctx = ClientContext {
            connection,
            intents: intent_rx,
            events: event_tx,
        };
        let worker = std::thread::Builder::new()
            .name("vaultic-client".into())
            .spawn(move || drive(ClientState::Authenticate, &mut ctx))?;

        let client = FileClient {
            interface,
            intents: Some(intent_tx),
            events: event_rx,
            worker: Some(worker),
        };
        client.wait_for("authentication", HANDSHAKE_TIMEOUT + Duration::from_secs(5), |event| {
            matches!(event, ClientEvent::Authenticated).then_some(())
        })?;
        Ok(client)
    }

    /// The raw event stream, for callers driving intents directly.
    pub fn events(&self) -> &Receiver<ClientEvent> {
        &self.events
    }

    pub fn register(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(bool, String, Option<PrivilegeLevel>), ClientError> {
        self.login_inner(true, email, password)
    }

    pub fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(bool, String, Option<PrivilegeLevel>), ClientError> {
        self.login_inner(false, email, password)
    }

    fn login_inner(
        &self,
        register: bool,
        email: &str,
        password: &str,
    ) -> Result<(bool, String, Option<PrivilegeLevel>), ClientError> {
        self.submit(ClientState::Login {
            register,
            email: email.to_string(),
            password: password.to_string(),
        })?;
        self.wait_for("login response", FACADE_TIMEOUT, |event| match event {
            ClientEvent::LoginResult {
                success,
                message,
                level,
            } => Some((success, message, level)),
            _ => None,
        })
    }

    pub fn logout(&self) -> Result<(bool, String), ClientError> {
        self.submit(ClientState::Logout)?;
        self.wait_for("logout response", FACADE_TIMEOUT, |event| match event {
            ClientEvent::LogoutResult { success, message } => Some((success, message)),
            _ => None,
        })
    }

    /// Uploads a batch, returning one verdict per attempted file.
    pub fn upload(&self, files: Vec<UploadItem>) -> Result<Vec<UploadOutcome>, ClientError> {
        self.submit(ClientState::Upload { files })?;
        let mut outcomes = Vec::new();
        loop {
            let done = self.wait_for("upload progress", FACADE_TIMEOUT, |event| match event {
                ClientEvent::UploadResult {
                    name,
                    success,
                    message,
                } => Some(Some(UploadOutcome {
                    name,
                    success,
                    message,
                })),
                ClientEvent::UploadComplete => Some(None),
                _ => None,
            })?;
            match done {
                Some(outcome) => outcomes.push(outcome),
                None => return Ok(outcomes),
            }
        }
    }

    pub fn view_files(&self, user_email: &str) -> Result<(bool, String, Vec<String>), ClientError> {
        self.submit(ClientState::ViewFiles {
            user_email: user_email.to_string(),
        })?;
        self.wait_for("file list", FACADE_TIMEOUT, |event| match event {
            ClientEvent::FileList {
                success,
                message,
                files,
            } => Some((success, message, files)),
            _ => None,
        })
    }

    pub fn remove_files(
        &self,
        user_email: &str,
        files: Vec<String>,
    ) -> Result<(bool, String), ClientError> {
        self.submit(ClientState::RemoveFiles {
            user_email: user_email.to_string(),
            files,
        })?;
        self.wait_for("remove response", FACADE_TIMEOUT, |event| match event {
            ClientEvent::RemoveResult { success, message } => Some((success, message)),
            _ => None,
        })
    }

    pub fn admin_data(&self) -> Result<(bool, String, Option<AdminData>), ClientError> {
        self.submit(ClientState::ViewAdminData)?;
        self.wait_for("admin data", FACADE_TIMEOUT, |event| match event {
            ClientEvent::AdminDataResult {
                success,
                message,
                data,
            } => Some((success, message, data)),
            _ => None,
        })
    }

    pub fn ping(&self) -> Result<(), ClientError> {
        self.submit(ClientState::Heartbeat)?;
        self.wait_for("heartbeat ack", FACADE_TIMEOUT, |event| {
            matches!(event, ClientEvent::HeartbeatAck).then_some(())
        })
    }

    /// Closes the connection and joins the session worker.
    pub fn shutdown(&mut self) {
        self.intents.take();
        self.interface.stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn submit(&self, intent: ClientState) -> Result<(), ClientError> {
        let Some(intents) = self.intents.as_ref() else {
            return Err(ClientError::WorkerGone);
        };
        intents.send(intent).map_err(|_| ClientError::WorkerGone)
    }

    /// Waits for the event `pick` accepts, surfacing transport failures.
    fn wait_for<T>(
        &self,
        what: &'static str,
        timeout: Duration,
        mut pick: impl FnMut(ClientEvent) -> Option<T>,
    ) -> Result<T, ClientError> {
        let deadline = Instant::now() + timeout;
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(ClientError::Timeout(what));
            };
            match self.events.recv_timeout(remaining) {
                Ok(ClientEvent::TransportError { message }) => {
                    return Err(ClientError::Transport(message));
                }
                Ok(ClientEvent::Disconnected) => {
                    return Err(ClientError::Transport("connection closed".into()));
                }
                Ok(event) => {
                    if let Some(value) = pick(event) {
                        return Ok(value);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Err(ClientError::Timeout(what)),
                Err(RecvTimeoutError::Disconnected) => return Err(ClientError::WorkerGone),
            }
        }
    }
}

impl Drop for FileClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
