// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-Memory Storage Backends
//!
//! Keep everything in process memory. Used by tests and by servers run
//! with persistence disabled.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::proto::Interaction;

use super::{sanitize_relative_path, BlobStore, LogStore, StoreError, UserRecord, UserStore};

/// Accounts in a mutex-guarded map.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn lookup(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.lock().unwrap_or_else(|e| e.into_inner()).get(email).cloned())
    }

    fn create(&self, record: UserRecord) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(&record.email) {
            return Err(StoreError::AlreadyExists(record.email));
        }
        users.insert(record.email.clone(), record);
        Ok(())
    }

    fn update(&self, record: UserRecord) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if !users.contains_key(&record.email) {
            return Err(StoreError::NotFound(record.email));
        }
        users.insert(record.email.clone(), record);
        Ok(())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.users.lock().unwrap_or_else(|e| e.into_inner()).len())
    }

    fn all(&self) -> Result<Vec<UserRecord>, StoreError> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let mut records: Vec<UserRecord> = users.values().cloned().collect();
        records.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(records)
    }
}

/// Interaction log in a mutex-guarded vector.
#[derive(Default)]
pub struct MemoryLogStore {
    entries: Mutex<Vec<Interaction>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn append(&self, entry: Interaction) -> Result<(), StoreError> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).push(entry);
        Ok(())
    }

    fn all(&self) -> Result<Vec<Interaction>, StoreError> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// Blobs keyed by (email, relative path). BTreeMap keeps listings sorted.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw blob contents, for tests.
    pub fn read(&self, email: &str, path: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(email)
            .and_then(|tree| tree.get(path).cloned())
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&self, email: &str, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let key = sanitize_relative_path(path)?.join("/");
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(email.to_string())
            .or_default()
            .insert(key, bytes.to_vec());
        Ok(())
    }

    fn exists(&self, email: &str, path: &str) -> Result<bool, StoreError> {
        let key = sanitize_relative_path(path)?.join("/");
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(email)
            .is_some_and(|tree| tree.contains_key(&key)))
    }

    fn list(&self, email: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(email)
            .map(|tree| tree.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&self, email: &str, path: &str) -> Result<(), StoreError> {
        let key = sanitize_relative_path(path)?.join("/");
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        let removed = blobs
            .get_mut(email)
            .and_then(|tree| tree.remove(&key))
            .is_some();
        if removed {
            Ok(())
        } else {
            Err(StoreError::NotFound(path.into()))
        }
    }
}
