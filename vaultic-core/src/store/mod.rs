// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Server-Side Storage
//!
//! Accounts, the interaction log, and per-user file blobs behind small
//! trait seams, each with an in-memory backend for tests and a
//! filesystem-backed one for deployment.

mod fs;
mod manager;
mod memory;

use thiserror::Error;

pub use fs::{DirBlobStore, JsonLogStore, JsonUserStore};
pub use manager::ServerDataManager;
pub use memory::{MemoryBlobStore, MemoryLogStore, MemoryUserStore};

use crate::proto::{Interaction, PrivilegeLevel};

/// Storage error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One stored account.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserRecord {
    pub email: String,
    pub password: String,
    pub privilege: PrivilegeLevel,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("privilege", &self.privilege)
            .finish()
    }
}

/// Account storage keyed by email.
pub trait UserStore: Send + Sync {
    fn lookup(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    /// Fails with `AlreadyExists` when the email is taken.
    fn create(&self, record: UserRecord) -> Result<(), StoreError>;
    /// Fails with `NotFound` when the account is missing.
    fn update(&self, record: UserRecord) -> Result<(), StoreError>;
    fn count(&self) -> Result<usize, StoreError>;
    fn all(&self) -> Result<Vec<UserRecord>, StoreError>;
}

/// Append-only interaction log.
pub trait LogStore: Send + Sync {
    fn append(&self, entry: Interaction) -> Result<(), StoreError>;
    fn all(&self) -> Result<Vec<Interaction>, StoreError>;
}

/// Per-user file blob storage. Paths are relative, `/`-separated, and
/// validated before use.
pub trait BlobStore: Send + Sync {
    fn write(&self, email: &str, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
    fn exists(&self, email: &str, path: &str) -> Result<bool, StoreError>;
    /// Relative paths of every blob under the user's tree, sorted.
    fn list(&self, email: &str) -> Result<Vec<String>, StoreError>;
    /// Fails with `NotFound` when the blob is missing.
    fn delete(&self, email: &str, path: &str) -> Result<(), StoreError>;
}

/// Rejects empty, absolute, traversing, and backslash-bearing paths, and
/// returns the cleaned `/`-separated components.
pub(crate) fn sanitize_relative_path(path: &str) -> Result<Vec<String>, StoreError> {
    if path.is_empty() || path.contains('\\') || path.starts_with('/') {
        return Err(StoreError::InvalidPath(path.into()));
    }
    let mut components = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." | ".." => return Err(StoreError::InvalidPath(path.into())),
            other => components.push(other.to_string()),
        }
    }
    Ok(components)
}

// INLINE_TEST_REQUIRED: sanitize_relative_path is private to the module.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_accepts_nested_relative_paths() {
        let parts = sanitize_relative_path("docs/notes/a.txt").unwrap();
        assert_eq!(parts, vec!["docs", "notes", "a.txt"]);
    }

    #[test]
    fn test_sanitize_rejects_traversal_and_absolute() {
        for bad in ["", "/etc/passwd", "../a", "a/../b", "a//b", "a\\b", "."] {
            assert!(sanitize_relative_path(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_user_record_debug_redacts_password() {
        let record = UserRecord {
            email: "a@b.c".into(),
            password: "hunter2".into(),
            privilege: PrivilegeLevel::User,
        };
        let debug = format!("{record:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }
}
