// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Message Envelopes
//!
//! The small fixed set of tagged payload shapes exchanged inside frame
//! bodies. Every envelope is a JSON object with an `action` discriminator;
//! dispatch is by discriminator alone, one decode per envelope.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use thiserror::Error;

/// Envelope encode/decode error types.
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("invalid envelope: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Two-level privilege flag carried on the wire as its integer value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum PrivilegeLevel {
    User = 1,
    Admin = 2,
}

/// A tagged application-level message carried inside a frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Envelope {
    Auth(AuthPayload),
    Login(LoginRequest),
    LoginResponse(LoginResponse),
    Logout,
    Response(BasicResponse),
    Error(ErrorMessage),
    UploadStart,
    UploadFile(UploadFile),
    UploadResult(UploadResult),
    UploadEnd,
    ViewFilesRequest(ViewFilesRequest),
    ViewFilesResponse(ViewFilesResponse),
    RemoveFiles(RemoveFilesRequest),
    ViewAdminDataRequest,
    ViewAdminDataResponse(ViewAdminDataResponse),
    Heartbeat,
}

/// Key exchange step. The opening request carries public coordinates and
/// `authenticated: false`; the closing confirmation carries no coordinates
/// and `authenticated: true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub register_user: bool,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub level: Option<PrivilegeLevel>,
}

/// Generic success/failure reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

/// Announces one file by name before its raw body frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFile {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Set when the refusal ends the whole upload session rather than a
    /// single file. Absent on the wire when false, so peers that do not
    /// know the field still parse.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub session_rejected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFilesRequest {
    pub user_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFilesResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveFilesRequest {
    pub user_email: String,
    pub files: Vec<String>,
}

/// One interaction log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_email: String,
    pub message: String,
    pub timestamp: u64,
}

/// User listing entry for administrative queries (no password).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub email: String,
    pub privilege: PrivilegeLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminData {
    pub users: Vec<UserView>,
    pub interactions: Vec<Interaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewAdminDataResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Option<AdminData>,
}

/// Serializes an envelope to its JSON wire form.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtoError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Parses an envelope from its JSON wire form.
pub fn decode_envelope(text: &str) -> Result<Envelope, ProtoError> {
    Ok(serde_json::from_str(text)?)
}
