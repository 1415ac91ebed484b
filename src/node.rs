use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::dashboard::{run_dashboard, DashboardState};
use crate::error::{Result, TaskmasterError};
use crate::grpc::GrpcServer;
use crate::scheduler::GroupRouter;

/// Scheduler process: the group router plus its gRPC and dashboard frontends.
pub struct Node {
    pub config: ServerConfig,
    pub router: Arc<GroupRouter>,
    fatal_rx: mpsc::UnboundedReceiver<TaskmasterError>,
    shutdown: CancellationToken,
}

impl Node {
    /// Open the snapshot directory and load every existing group.
    pub async fn new(config: ServerConfig, shutdown: CancellationToken) -> Result<Self> {
        let (router, fatal_rx) = GroupRouter::open(
            config.snapshot_dir.clone(),
            config.snapshot_interval,
            shutdown.clone(),
        )
        .await?;

        tracing::info!(
            snapshot_dir = %router.snapshot_dir().display(),
            groups = router.group_names().await.len(),
            "Scheduler state loaded"
        );

        Ok(Self {
            config,
            router: Arc::new(router),
            fatal_rx,
            shutdown,
        })
    }

    /// Run until shutdown or a fatal persistence error.
    ///
    /// 1. Spawns the dashboard if an address is configured
    /// 2. Serves gRPC until the shutdown token fires
    ///
    /// A snapshot write failure cancels the shutdown token and is returned.
    /// Unflushed changes are not written on the way out.
    pub async fn run(mut self) -> Result<()> {
        if let Some(dashboard_addr) = self.config.dashboard_addr {
            let state = DashboardState {
                router: Arc::clone(&self.router),
            };
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                run_dashboard(dashboard_addr, state, shutdown).await;
            });
        }

        let server = GrpcServer::new(
            self.config.listen_addr,
            Arc::clone(&self.router),
            self.config.default_lease,
        );
        let token = self.shutdown.clone();
        let serve = server.run(async move { token.cancelled().await });

        tokio::select! {
            served = serve => {
                served?;
                tracing::info!("Scheduler stopped");
                Ok(())
            }
            Some(err) = self.fatal_rx.recv() => {
                tracing::error!(error = %err, "Fatal persistence error, shutting down");
                self.shutdown.cancel();
                Err(err)
            }
        }
    }
}
