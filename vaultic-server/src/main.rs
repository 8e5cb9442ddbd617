//! Vaultic Server
//!
//! Standalone file vault server. Accepts framed TCP connections, performs
//! the key exchange, and serves login, upload, listing, removal, and
//! administrative queries backed by on-disk or in-memory storage.

mod config;

use tracing::{error, info};

use vaultic_core::session::FileServer;
use vaultic_core::store::ServerDataManager;

use config::{ServerConfig, StorageBackend};

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vaultic_server=info".parse().unwrap())
                .add_directive("vaultic_core=info".parse().unwrap()),
        )
        .init();

    let config = ServerConfig::from_env();
    info!("Starting Vaultic Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Listen address: {}", config.listen_addr);
    info!("Storage backend: {:?}", config.storage_backend);

    let data = match config.storage_backend {
        StorageBackend::Memory => ServerDataManager::in_memory(),
        StorageBackend::Disk => {
            info!("Data directory: {}", config.data_dir.display());
            match ServerDataManager::persistent(&config.data_dir) {
                Ok(data) => data,
                Err(err) => {
                    error!("Failed to open data directory: {err}");
                    std::process::exit(1);
                }
            }
        }
    };

    let server = match FileServer::start(config.listen_addr, data) {
        Ok(server) => server,
        Err(err) => {
            error!("Failed to start server: {err}");
            std::process::exit(1);
        }
    };
    info!("Serving on {}", server.local_addr());

    loop {
        std::thread::park();
    }
}
