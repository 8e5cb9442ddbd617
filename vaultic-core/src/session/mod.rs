// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session State Machines
//!
//! Per-connection state machines for both sides of the protocol, a shared
//! driver, and the [`FileServer`]/[`FileClient`] facades that own the
//! worker threads.

mod client;
mod driver;
mod server;

use std::time::Duration;

pub use client::{
    ClientContext, ClientError, ClientEvent, ClientState, FileClient, UploadItem, UploadOutcome,
};
pub use driver::{drive, SessionError, SessionState, Step};
pub use server::{FileServer, ServerContext, ServerState};

/// Refusal sent when an operation needs a logged-in account.
pub const MSG_NOT_LOGGED_IN: &str = "Not logged in";

/// Refusal sent when an operation needs the administrator level.
pub const MSG_INSUFFICIENT_PERMISSION: &str = "Insufficient permission";

/// How long either side waits on a key exchange step.
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
