use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use crate::error::Result;
use crate::grpc::task_service::TaskMasterService;
use crate::proto::task_master_server::TaskMasterServer;
use crate::scheduler::GroupRouter;

pub struct GrpcServer {
    addr: SocketAddr,
    router: Arc<GroupRouter>,
    default_lease: Duration,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, router: Arc<GroupRouter>, default_lease: Duration) -> Self {
        Self {
            addr,
            router,
            default_lease,
        }
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener, then drain in-flight calls.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        let service = TaskMasterService::new(self.router, self.default_lease);

        tracing::info!(addr = %local_addr, "Starting gRPC server");

        Server::builder()
            .add_service(TaskMasterServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await?;
        Ok(())
    }
}
