// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Disk,
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub storage_backend: StorageBackend,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let listen_addr = std::env::var("VAULTIC_LISTEN_ADDR")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(|| "0.0.0.0:5050".parse().unwrap());

        let data_dir = std::env::var("VAULTIC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let storage_backend = match std::env::var("VAULTIC_STORAGE").as_deref() {
            Ok("memory") => StorageBackend::Memory,
            _ => StorageBackend::Disk,
        };

        ServerConfig {
            listen_addr,
            data_dir,
            storage_backend,
        }
    }
}
