//! Server lifecycle: bind, serve, background sweep, graceful shutdown.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;
use crate::{ServerError, router};

/// The ingestion HTTP server.
pub struct Server {
    state: AppState,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    pub fn new(state: AppState) -> Arc<Self> {
        Arc::new(Self {
            state,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the bound address. Only available after [`run`](Self::run)
    /// binds the socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap()
    }

    /// Gracefully shuts down the server: the accept loop stops, the sweep
    /// task ends, and every live event stream is torn down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binds `addr` and serves until cancellation.
    pub async fn run(self: &Arc<Self>, addr: SocketAddr) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().unwrap() = Some(local_addr);
        tracing::info!("listening on {local_addr}");

        let sweep = tokio::spawn(sweep_task(
            Arc::clone(&self.state.manager),
            self.state.config.sweep_interval,
            self.cancel.clone(),
        ));

        // Close live subscriptions on cancellation so in-flight SSE
        // streams end and graceful shutdown can complete.
        let bus = Arc::clone(&self.state.bus);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            bus.close();
        });

        let app = router(self.state.clone());
        let cancel = self.cancel.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        let _ = sweep.await;
        tracing::info!("server stopped");
        Ok(())
    }
}

/// Periodic expiry sweep. The only caller of
/// [`UploadManager::expire_stale`], on a fixed interval, until cancelled.
pub async fn sweep_task(
    manager: Arc<dropgate_upload::UploadManager>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so a fresh process does
    // not sweep before anything can exist.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let expired = manager.expire_stale().await;
                if expired > 0 {
                    tracing::info!(expired, "expiry sweep");
                }
            }
        }
    }
}
