//! Helpers for running a real scheduler on a loopback port.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use taskmaster::grpc::GrpcServer;
use taskmaster::scheduler::GroupRouter;
use taskmaster::worker::GrpcTaskSource;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A scheduler serving gRPC from a temporary snapshot directory.
pub struct TestServer {
    pub addr: SocketAddr,
    pub router: Arc<GroupRouter>,
    pub shutdown: CancellationToken,
    _owned_dir: Option<TempDir>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let mut server = Self::start_in(dir.path(), Duration::from_secs(60)).await;
        server._owned_dir = Some(dir);
        server
    }

    /// Start against a caller-owned snapshot directory.
    pub async fn start_in(snapshot_dir: &Path, default_lease: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let (router, _fatal_rx) = GroupRouter::open(
            snapshot_dir,
            Duration::from_millis(50),
            shutdown.clone(),
        )
        .await
        .unwrap();
        let router = Arc::new(router);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = GrpcServer::new(addr, Arc::clone(&router), default_lease);
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            let _ = server
                .serve(listener, async move { token.cancelled().await })
                .await;
        });

        let server = Self {
            addr,
            router,
            shutdown,
            _owned_dir: None,
            handle,
        };
        assert!(
            wait_for(
                || async { GrpcTaskSource::connect(&server.endpoint()).await.is_ok() },
                Duration::from_secs(5),
                Duration::from_millis(20),
            )
            .await,
            "server did not start listening on {}",
            server.addr
        );
        server
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn client(&self) -> GrpcTaskSource {
        GrpcTaskSource::connect(&self.endpoint())
            .await
            .unwrap()
            .with_rpc_timeout(Duration::from_secs(2))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.handle.abort();
    }
}

/// Poll `condition` until it holds or `timeout_duration` passes.
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
#[allow(dead_code)]
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(20)).await;
    assert!(result, "{}", message);
}
