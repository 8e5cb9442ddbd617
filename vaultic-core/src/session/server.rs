// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Server Session
//!
//! The per-connection server state machine and the [`FileServer`] facade
//! that spawns one session worker per accepted connection. A session opens
//! with the key exchange, then loops in idle dispatching inbound envelopes
//! to operation states by their discriminator.

use std::collections::VecDeque;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use rand::rngs::OsRng;
use tracing::{debug, info, warn};

use crate::crypto::PublicCoordinates;
use crate::net::multiplexer::MultiplexerConfig;
use crate::net::{Connection, NetworkError, ServerInterface};
use crate::proto::{
    decode_envelope, encode_envelope, AdminData, AuthPayload, BasicResponse, Envelope,
    ErrorMessage, LoginResponse, PrivilegeLevel, UploadResult, UserView, ViewAdminDataResponse,
    ViewFilesResponse,
};
use crate::store::{ServerDataManager, StoreError, UserRecord};

use super::driver::{drive, SessionError, SessionState, Step};
use super::{HANDSHAKE_TIMEOUT, MSG_INSUFFICIENT_PERMISSION, MSG_NOT_LOGGED_IN};

/// How long the upload loop waits for the next announcement or file body
/// before accepting the transfer as partial.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything a server session state needs.
pub struct ServerContext {
    pub connection: Arc<Connection>,
    pub data: ServerDataManager,
}

impl ServerContext {
    fn send(&self, envelope: &Envelope) -> Result<(), SessionError> {
        self.connection.send(&encode_envelope(envelope)?)?;
        Ok(())
    }

    fn peer(&self) -> SocketAddr {
        self.connection.peer()
    }

    /// The requester's stored privilege, defaulting to the low level when
    /// the account vanished mid-session.
    fn privilege_of(&self, email: &str) -> Result<PrivilegeLevel, SessionError> {
        Ok(self
            .data
            .user(email)?
            .map(|record| record.privilege)
            .unwrap_or(PrivilegeLevel::User))
    }
}

/// Server-side session states.
pub enum ServerState {
    Authenticate,
    Idle,
    Login {
        register: bool,
        email: String,
        password: String,
    },
    Logout,
    Upload,
    ViewFiles {
        user_email: String,
    },
    RemoveFiles {
        user_email: String,
        files: Vec<String>,
    },
    ViewAdminData,
}

impl SessionState for ServerState {
    type Context = ServerContext;

    fn idle() -> Self {
        ServerState::Idle
    }

    fn name(&self) -> &'static str {
        match self {
            ServerState::Authenticate => "authenticate",
            ServerState::Idle => "idle",
            ServerState::Login { .. } => "login",
            ServerState::Logout => "logout",
            ServerState::Upload => "upload",
            ServerState::ViewFiles { .. } => "view_files",
            ServerState::RemoveFiles { .. } => "remove_files",
            ServerState::ViewAdminData => "view_admin_data",
        }
    }

    fn run(
        self,
        ctx: &mut ServerContext,
        pending: &mut VecDeque<Self>,
    ) -> Result<Step, SessionError> {
        match self {
            ServerState::Authenticate => run_authenticate(ctx),
            ServerState::Idle => run_idle(ctx, pending),
            ServerState::Login {
                register,
                email,
                password,
            } => run_login(ctx, register, email, password),
            ServerState::Logout => run_logout(ctx),
            ServerState::Upload => run_upload(ctx),
            ServerState::ViewFiles { user_email } => run_view_files(ctx, user_email),
            ServerState::RemoveFiles { user_email, files } => {
                run_remove_files(ctx, user_email, files)
            }
            ServerState::ViewAdminData => run_view_admin_data(ctx),
        }
    }
}

/// Offers the server's public key, absorbs the peer's, derives the shared
/// secret, confirms, and enables the channel. Any failure ends the session;
/// nothing else runs over an unauthenticated connection.
fn run_authenticate(ctx: &mut ServerContext) -> Result<Step, SessionError> {
    match handshake(ctx) {
        Ok(()) => {
            debug!(peer = %ctx.peer(), "channel established");
            Ok(Step::Continue)
        }
        Err(err) => {
            warn!(peer = %ctx.peer(), error = %err, "handshake failed");
            Ok(Step::Stop)
        }
    }
}

fn handshake(ctx: &mut ServerContext) -> Result<(), SessionError> {
    let coordinates = ctx.connection.channel().generate_key_pair(&mut OsRng)?;
    ctx.send(&Envelope::Auth(AuthPayload {
        authenticated: false,
        x: Some(coordinates.x),
        y: Some(coordinates.y),
    }))?;

    let Some(reply) = ctx.connection.receive(Some(HANDSHAKE_TIMEOUT))? else {
        return Err(SessionError::Handshake("no key reply".into()));
    };
    let Envelope::Auth(payload) = decode_envelope(&reply)? else {
        return Err(SessionError::Handshake("expected a key reply".into()));
    };
    let (Some(x), Some(y)) = (payload.x, payload.y) else {
        return Err(SessionError::Handshake("key reply without coordinates".into()));
    };

    ctx.connection
        .channel()
        .derive_shared_key(&PublicCoordinates { x, y })?;
    // Confirmation goes out in the clear; everything after is encrypted.
    ctx.send(&Envelope::Auth(AuthPayload {
        authenticated: true,
        x: None,
        y: None,
    }))?;
    ctx.connection.channel().set_enabled(true);
    Ok(())
}

/// Blocks for the next envelope and dispatches it by discriminator. An
/// envelope this state cannot place is logged and dropped; nothing is
/// waiting for a reply to it.
fn run_idle(ctx: &mut ServerContext, pending: &mut VecDeque<ServerState>) -> Result<Step, SessionError> {
    let Some(text) = ctx.connection.receive(None)? else {
        return Ok(Step::Stop);
    };

    match decode_envelope(&text) {
        Ok(Envelope::Login(request)) => pending.push_back(ServerState::Login {
            register: request.register_user,
            email: request.email,
            password: request.password,
        }),
        Ok(Envelope::Logout) => pending.push_back(ServerState::Logout),
        Ok(Envelope::UploadStart) => pending.push_back(ServerState::Upload),
        Ok(Envelope::ViewFilesRequest(request)) => pending.push_back(ServerState::ViewFiles {
            user_email: request.user_email,
        }),
        Ok(Envelope::RemoveFiles(request)) => pending.push_back(ServerState::RemoveFiles {
            user_email: request.user_email,
            files: request.files,
        }),
        Ok(Envelope::ViewAdminDataRequest) => pending.push_back(ServerState::ViewAdminData),
        Ok(Envelope::Heartbeat) => ctx.send(&Envelope::Heartbeat)?,
        Ok(other) => {
            debug!(peer = %ctx.peer(), envelope = ?other, "ignoring unexpected envelope");
        }
        Err(err) => {
            warn!(peer = %ctx.peer(), error = %err, "ignoring undecodable envelope");
        }
    }
    Ok(Step::Continue)
}

fn run_login(
    ctx: &mut ServerContext,
    register: bool,
    email: String,
    password: String,
) -> Result<Step, SessionError> {
    let response = if register {
        handle_register(ctx, &email, &password)?
    } else {
        handle_login(ctx, &email, &password)?
    };
    ctx.send(&Envelope::LoginResponse(response))?;
    Ok(Step::Continue)
}

fn handle_login(
    ctx: &ServerContext,
    email: &str,
    password: &str,
) -> Result<LoginResponse, SessionError> {
    let Some(record) = ctx.data.user(email)? else {
        return Ok(failure_login("Account does not exist"));
    };
    if record.password != password {
        return Ok(failure_login("Incorrect password"));
    }
    if !ctx.data.login_session(ctx.peer(), email) {
        return Ok(failure_login("Already logged in"));
    }
    ctx.data.log(email, "Logged in")?;
    Ok(LoginResponse {
        success: true,
        message: "Successfully logged in".into(),
        level: Some(record.privilege),
    })
}

fn handle_register(
    ctx: &ServerContext,
    email: &str,
    password: &str,
) -> Result<LoginResponse, SessionError> {
    if ctx.data.user(email)?.is_some() {
        return Ok(failure_login("Account already exists"));
    }

    // The first account on a fresh server is the administrator.
    let privilege = if ctx.data.user_count()? == 0 {
        PrivilegeLevel::Admin
    } else {
        PrivilegeLevel::User
    };
    ctx.data.create_user(UserRecord {
        email: email.to_string(),
        password: password.to_string(),
        privilege,
    })?;

    // Registration creates the account only; the client logs in explicitly.
    ctx.data.log(email, "Account registered")?;
    Ok(LoginResponse {
        success: true,
        message: "Successfully registered account".into(),
        level: Some(privilege),
    })
}

fn failure_login(message: &str) -> LoginResponse {
    LoginResponse {
        success: false,
        message: message.into(),
        level: None,
    }
}

fn run_logout(ctx: &mut ServerContext) -> Result<Step, SessionError> {
    let response = match ctx.data.logout_session(ctx.peer()) {
        Some(email) => {
            ctx.data.log(&email, "Logged out")?;
            BasicResponse {
                success: true,
                message: "Successfully logged out".into(),
            }
        }
        None => BasicResponse {
            success: false,
            message: MSG_NOT_LOGGED_IN.into(),
        },
    };
    ctx.send(&Envelope::Response(response))?;
    Ok(Step::Continue)
}

/// Lockstep upload loop: for each announced file the server replies ready,
/// receives the raw body as the next frame, stores it, and confirms. The
/// loop ends on the end marker, a timeout, or connection loss; files
/// received so far stay stored.
fn run_upload(ctx: &mut ServerContext) -> Result<Step, SessionError> {
    let Some(email) = ctx.data.session_user(ctx.peer()) else {
        ctx.send(&Envelope::UploadResult(UploadResult {
            success: false,
            message: MSG_NOT_LOGGED_IN.into(),
            path: None,
            session_rejected: true,
        }))?;
        return Ok(Step::Continue);
    };

    loop {
        let Some(text) = ctx.connection.receive(Some(UPLOAD_TIMEOUT))? else {
            break;
        };
        match decode_envelope(&text) {
            Ok(Envelope::UploadEnd) => break,
            Ok(Envelope::UploadFile(file)) => {
                match ctx.data.file_exists(&email, &file.name) {
                    Err(StoreError::InvalidPath(_)) => {
                        ctx.send(&Envelope::UploadResult(UploadResult {
                            success: false,
                            message: "Invalid file name".into(),
                            path: None,
                            session_rejected: false,
                        }))?;
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                    Ok(true) => {
                        ctx.send(&Envelope::UploadResult(UploadResult {
                            success: false,
                            message: "File already exists".into(),
                            path: None,
                            session_rejected: false,
                        }))?;
                        continue;
                    }
                    Ok(false) => {}
                }

                ctx.send(&Envelope::UploadResult(UploadResult {
                    success: true,
                    message: "Upload ready".into(),
                    path: None,
                    session_rejected: false,
                }))?;

                let Some(bytes) = ctx.connection.receive_raw(Some(UPLOAD_TIMEOUT))? else {
                    break;
                };
                ctx.data.write_file(&email, &file.name, &bytes)?;
                ctx.data.log(&email, format!("Uploaded {}", file.name))?;
                ctx.send(&Envelope::UploadResult(UploadResult {
                    success: true,
                    message: format!("Successfully uploaded {}", file.name),
                    path: Some(format!("{}/{}", email, file.name)),
                    session_rejected: false,
                }))?;
            }
            // The peer is waiting on a reply inside this loop, so unlike
            // idle we answer the unexpected envelope with an error.
            Ok(_) | Err(_) => {
                ctx.send(&Envelope::Error(ErrorMessage {
                    message: "Unexpected message during upload".into(),
                }))?;
            }
        }
    }
    Ok(Step::Continue)
}

fn run_view_files(ctx: &mut ServerContext, user_email: String) -> Result<Step, SessionError> {
    let response = match authorize_target(ctx, &user_email)? {
        Err(message) => ViewFilesResponse {
            success: false,
            message,
            files: None,
        },
        Ok(requester) => {
            let files = ctx.data.list_files(&user_email)?;
            if requester == user_email {
                ctx.data.log(&requester, "Viewed files")?;
            } else {
                ctx.data
                    .log(&requester, format!("Viewed {user_email}'s files"))?;
            }
            ViewFilesResponse {
                success: true,
                message: "Successfully viewed files".into(),
                files: Some(files),
            }
        }
    };
    ctx.send(&Envelope::ViewFilesResponse(response))?;
    Ok(Step::Continue)
}

fn run_remove_files(
    ctx: &mut ServerContext,
    user_email: String,
    files: Vec<String>,
) -> Result<Step, SessionError> {
    let response = match authorize_target(ctx, &user_email)? {
        Err(message) => BasicResponse {
            success: false,
            message,
        },
        Ok(requester) => {
            let mut removed = 0usize;
            for name in &files {
                match ctx.data.delete_file(&user_email, name) {
                    Ok(()) => {
                        removed += 1;
                        if requester == user_email {
                            ctx.data.log(&requester, format!("Removed {name}"))?;
                        } else {
                            ctx.data.log(
                                &requester,
                                format!("Removed {name} from {user_email}'s folder"),
                            )?;
                        }
                    }
                    // Missing or malformed names are skipped, not fatal
                    Err(StoreError::NotFound(_)) | Err(StoreError::InvalidPath(_)) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            BasicResponse {
                success: true,
                message: format!("Successfully removed {removed} file(s)"),
            }
        }
    };
    ctx.send(&Envelope::Response(response))?;
    Ok(Step::Continue)
}

fn run_view_admin_data(ctx: &mut ServerContext) -> Result<Step, SessionError> {
    let response = match require_admin(ctx)? {
        Err(message) => ViewAdminDataResponse {
            success: false,
            message,
            data: None,
        },
        Ok(requester) => {
            let users = ctx
                .data
                .users()?
                .into_iter()
                .map(|record| UserView {
                    email: record.email,
                    privilege: record.privilege,
                })
                .collect();
            let interactions = ctx.data.interactions()?;
            ctx.data.log(&requester, "Viewed admin data")?;
            ViewAdminDataResponse {
                success: true,
                message: "Successfully retrieved data".into(),
                data: Some(AdminData {
                    users,
                    interactions,
                }),
            }
        }
    };
    ctx.send(&Envelope::ViewAdminDataResponse(response))?;
    Ok(Step::Continue)
}

/// A logged-in user may target their own tree; targeting another user's
/// requires the administrator level. Returns the requester email or the
/// refusal message.
fn authorize_target(
    ctx: &ServerContext,
    target: &str,
) -> Result<Result<String, String>, SessionError> {
    let Some(requester) = ctx.data.session_user(ctx.peer()) else {
        return Ok(Err(MSG_NOT_LOGGED_IN.into()));
    };
    if requester != target && ctx.privilege_of(&requester)? < PrivilegeLevel::Admin {
        return Ok(Err(MSG_INSUFFICIENT_PERMISSION.into()));
    }
    Ok(Ok(requester))
}

fn require_admin(ctx: &ServerContext) -> Result<Result<String, String>, SessionError> {
    let Some(requester) = ctx.data.session_user(ctx.peer()) else {
        return Ok(Err(MSG_NOT_LOGGED_IN.into()));
    };
    if ctx.privilege_of(&requester)? < PrivilegeLevel::Admin {
        return Ok(Err(MSG_INSUFFICIENT_PERMISSION.into()));
    }
    Ok(Ok(requester))
}

/// Listening file server: one session worker thread per connection.
pub struct FileServer {
    interface: ServerInterface,
    data: ServerDataManager,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl FileServer {
    /// Binds `addr` (port 0 picks a free port) and serves until stopped.
    pub fn start<A: ToSocketAddrs>(
        addr: A,
        data: ServerDataManager,
    ) -> Result<Self, NetworkError> {
        let workers: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let connect_data = data.clone();
        let connect_workers = workers.clone();
        let on_connect = Box::new(move |connection: &Arc<Connection>| {
            let mut ctx = ServerContext {
                connection: connection.clone(),
                data: connect_data.clone(),
            };
            let spawned = std::thread::Builder::new()
                .name(format!("vaultic-session-{}", connection.peer()))
                .spawn(move || {
                    drive(ServerState::Authenticate, &mut ctx);
                    ctx.connection.close();
                });
            match spawned {
                Ok(handle) => connect_workers
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(handle),
                Err(err) => warn!(error = %err, "failed to spawn session worker"),
            }
        });

        // A dropped connection releases its session binding even when the
        // worker never reached logout.
        let disconnect_data = data.clone();
        let on_disconnect = Box::new(move |connection: &Arc<Connection>| {
            if let Some(email) = disconnect_data.logout_session(connection.peer()) {
                info!(peer = %connection.peer(), user = %email, "session released on disconnect");
            }
        });

        let interface =
            ServerInterface::listen(addr, on_connect, on_disconnect, MultiplexerConfig::default())?;
        Ok(FileServer {
            interface,
            data,
            workers,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.interface.local_addr()
    }

    pub fn data(&self) -> &ServerDataManager {
        &self.data
    }

    /// Closes every connection and joins the session workers.
    pub fn stop(&mut self) {
        self.interface.stop();
        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.stop();
    }
}
