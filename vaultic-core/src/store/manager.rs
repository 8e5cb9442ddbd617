// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Server Data Manager
//!
//! One clonable handle bundling the account store, the interaction log,
//! the blob store, and the live peer-to-account session table. Session
//! workers share a single manager across connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::proto::Interaction;

use super::{
    BlobStore, DirBlobStore, JsonLogStore, JsonUserStore, LogStore, MemoryBlobStore,
    MemoryLogStore, MemoryUserStore, StoreError, UserRecord, UserStore,
};

/// Shared server-side state: stores plus the live session table.
#[derive(Clone)]
pub struct ServerDataManager {
    users: Arc<dyn UserStore>,
    logs: Arc<dyn LogStore>,
    blobs: Arc<dyn BlobStore>,
    sessions: Arc<Mutex<HashMap<SocketAddr, String>>>,
}

impl ServerDataManager {
    pub fn new(users: Arc<dyn UserStore>, logs: Arc<dyn LogStore>, blobs: Arc<dyn BlobStore>) -> Self {
        ServerDataManager {
            users,
            logs,
            blobs,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Everything in process memory; state is lost on shutdown.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryLogStore::new()),
            Arc::new(MemoryBlobStore::new()),
        )
    }

    /// `users.json`, `logs.json`, and a `files/` tree under `data_dir`.
    pub fn persistent<P: AsRef<Path>>(data_dir: P) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        Ok(Self::new(
            Arc::new(JsonUserStore::open(data_dir.join("users.json"))?),
            Arc::new(JsonLogStore::open(data_dir.join("logs.json"))?),
            Arc::new(DirBlobStore::open(data_dir.join("files"))?),
        ))
    }

    // --- accounts ---

    pub fn user(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.users.lookup(email)
    }

    pub fn users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.users.all()
    }

    pub fn user_count(&self) -> Result<usize, StoreError> {
        self.users.count()
    }

    pub fn create_user(&self, record: UserRecord) -> Result<(), StoreError> {
        self.users.create(record)
    }

    pub fn update_user(&self, record: UserRecord) -> Result<(), StoreError> {
        self.users.update(record)
    }

    // --- sessions ---

    /// Binds a peer to an account. Refused when the peer already holds a
    /// session or the account is active on another connection.
    pub fn login_session(&self, peer: SocketAddr, email: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(&peer) || sessions.values().any(|active| active == email) {
            return false;
        }
        sessions.insert(peer, email.to_string());
        true
    }

    /// Releases the peer's session, returning the account it held.
    pub fn logout_session(&self, peer: SocketAddr) -> Option<String> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&peer)
    }

    /// The account bound to this peer, if any.
    pub fn session_user(&self, peer: SocketAddr) -> Option<String> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&peer)
            .cloned()
    }

    // --- interaction log ---

    /// Appends one log entry stamped with the current time.
    pub fn log(&self, email: &str, message: impl Into<String>) -> Result<(), StoreError> {
        let message = message.into();
        info!(user = %email, "{message}");
        self.logs.append(Interaction {
            user_email: email.to_string(),
            message,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        })
    }

    pub fn interactions(&self) -> Result<Vec<Interaction>, StoreError> {
        self.logs.all()
    }

    // --- file blobs ---

    pub fn write_file(&self, email: &str, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs.write(email, path, bytes)
    }

    pub fn file_exists(&self, email: &str, path: &str) -> Result<bool, StoreError> {
        self.blobs.exists(email, path)
    }

    pub fn list_files(&self, email: &str) -> Result<Vec<String>, StoreError> {
        self.blobs.list(email)
    }

    pub fn delete_file(&self, email: &str, path: &str) -> Result<(), StoreError> {
        self.blobs.delete(email, path)
    }
}
