// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Filesystem Storage Backends
//!
//! Accounts in `users.json`, the interaction log in `logs.json`, and one
//! directory tree per user for file blobs. JSON stores load once on open
//! and write the whole document back on every mutation; the data volumes
//! here stay small enough for that to be the simplest correct thing.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::proto::Interaction;

use super::{sanitize_relative_path, BlobStore, LogStore, StoreError, UserRecord, UserStore};

#[derive(Default, Serialize, Deserialize)]
struct UsersDocument {
    users: HashMap<String, UserRecord>,
}

#[derive(Default, Serialize, Deserialize)]
struct LogsDocument {
    interactions: Vec<Interaction>,
}

fn load_document<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StoreError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn save_document<T: Serialize>(path: &Path, document: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(document)?)?;
    Ok(())
}

/// Accounts persisted as one JSON document.
pub struct JsonUserStore {
    path: PathBuf,
    users: Mutex<HashMap<String, UserRecord>>,
}

impl JsonUserStore {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        let document: UsersDocument = load_document(&path)?;
        Ok(JsonUserStore {
            path,
            users: Mutex::new(document.users),
        })
    }

    fn persist(&self, users: &HashMap<String, UserRecord>) -> Result<(), StoreError> {
        save_document(
            &self.path,
            &UsersDocument {
                users: users.clone(),
            },
        )
    }
}

impl UserStore for JsonUserStore {
    fn lookup(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.lock().unwrap_or_else(|e| e.into_inner()).get(email).cloned())
    }

    fn create(&self, record: UserRecord) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(&record.email) {
            return Err(StoreError::AlreadyExists(record.email));
        }
        users.insert(record.email.clone(), record);
        self.persist(&users)
    }

    fn update(&self, record: UserRecord) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if !users.contains_key(&record.email) {
            return Err(StoreError::NotFound(record.email));
        }
        users.insert(record.email.clone(), record);
        self.persist(&users)
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

/// Interaction log persisted as one JSON document.
pub struct JsonLogStore {
    path: PathBuf,
    entries: Mutex<Vec<Interaction>>,
}

impl JsonLogStore {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        let document: LogsDocument = load_document(&path)?;
        Ok(JsonLogStore {
            path,
            entries: Mutex::new(document.interactions),
        })
    }
}

impl LogStore for JsonLogStore {
    fn append(&self, entry: Interaction) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
        save_document(
            &self.path,
            &LogsDocument {
                interactions: entries.clone(),
            },
        )
    }

    fn all(&self) -> Result<Vec<Interaction>, StoreError> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// File blobs stored under `<root>/<email>/<relative path>`.
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(DirBlobStore { root })
    }

    fn blob_path(&self, email: &str, path: &str) -> Result<PathBuf, StoreError> {
        // Email doubles as a directory name; hold it to the same rules.
        let mut full = self.root.clone();
        for part in sanitize_relative_path(email)? {
            full.push(part);
        }
        for part in sanitize_relative_path(path)? {
            full.push(part);
        }
        Ok(full)
    }

    fn collect(
        dir: &Path,
        prefix: &mut Vec<String>,
        out: &mut Vec<String>,
    ) -> Result<(), StoreError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                prefix.push(name);
                Self::collect(&entry.path(), prefix, out)?;
                prefix.pop();
            } else if prefix.is_empty() {
                out.push(name);
            } else {
                out.push(format!("{}/{}", prefix.join("/"), name));
            }
        }
        Ok(())
    }
}

impl BlobStore for DirBlobStore {
    fn write(&self, email: &str, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let full = self.blob_path(email, path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, bytes)?;
        Ok(())
    }

    fn exists(&self, email: &str, path: &str) -> Result<bool, StoreError> {
        Ok(self.blob_path(email, path)?.is_file())
    }

    fn list(&self, email: &str) -> Result<Vec<String>, StoreError> {
        let mut user_root = self.root.clone();
        for part in sanitize_relative_path(email)? {
            user_root.push(part);
        }
        if !user_root.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        Self::collect(&user_root, &mut Vec::new(), &mut files)?;
        files.sort();
        Ok(files)
    }

    fn delete(&self, email: &str, path: &str) -> Result<(), StoreError> {
        let full = self.blob_path(email, path)?;
        if !full.is_file() {
            return Err(StoreError::NotFound(path.into()));
        }
        fs::remove_file(full)?;
        Ok(())
    }
}
