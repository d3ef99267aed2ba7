//! Dropgate server binary: config from the environment, structured
//! logging, store selection, graceful shutdown on ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use dropgate_events::EventBus;
use dropgate_protocol::Config;
use dropgate_server::{AppState, Server, ServerError};
use dropgate_storage::{DiskStore, MemoryStore, ObjectStore};
use dropgate_upload::{InMemoryRecordStore, RecordStore, UploadManager};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    // DROPGATE_DATA_DIR selects the disk store; unset runs in memory.
    let objects: Arc<dyn ObjectStore> = match std::env::var("DROPGATE_DATA_DIR") {
        Ok(dir) => {
            tracing::info!(dir = %dir, "using disk object store");
            Arc::new(DiskStore::new(&dir).await?)
        }
        Err(_) => {
            tracing::warn!("DROPGATE_DATA_DIR unset, objects are held in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let records: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let bus = Arc::new(EventBus::with_config(&config));
    let manager = Arc::new(UploadManager::new(
        config.clone(),
        Arc::clone(&objects),
        Arc::clone(&records),
        Arc::clone(&bus),
    ));

    let state = AppState {
        config,
        manager,
        records,
        bus,
    };

    let addr: SocketAddr = std::env::var("DROPGATE_BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".into())
        .parse()?;

    let server = Server::new(state);
    let shutdown = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown.shutdown();
        }
    });

    server.run(addr).await
}
