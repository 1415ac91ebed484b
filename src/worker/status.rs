use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{extract::State, routing::get, Router};
use tokio_util::sync::CancellationToken;

/// Counters for tasks handled by this worker process.
#[derive(Debug, Default)]
pub struct WorkerStats {
    finished: AtomicU64,
    failed: AtomicU64,
}

impl WorkerStats {
    pub fn record_finished(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn render(&self) -> String {
        format!(
            "Finish count: {}\nFailure count: {}\n",
            self.finished(),
            self.failed()
        )
    }
}

pub fn status_app(stats: Arc<WorkerStats>) -> Router {
    Router::new()
        .route("/", get(|State(stats): State<Arc<WorkerStats>>| async move { stats.render() }))
        .with_state(stats)
}

pub async fn run_status_page(addr: SocketAddr, stats: Arc<WorkerStats>, shutdown: CancellationToken) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::warn!(addr = %addr, error = %e, "Failed to start worker status page");
            return;
        }
    };
    if let Ok(local) = listener.local_addr() {
        tracing::info!(addr = %local, "Worker status page available");
    }

    let served = axum::serve(listener, status_app(stats))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(e) = served {
        tracing::error!(error = %e, "Worker status page failed");
    }
}
