use std::time::Duration;

use chrono::{DateTime, Utc};
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use crate::error::{Result, TaskmasterError};
use crate::proto::task_master_client::TaskMasterClient;
use crate::proto::{ExtendRequest, FinishRequest, InsertRequest, QueryRequest};
use crate::scheduler::queue::lease_deadline;
use crate::scheduler::{GroupRouter, Task};

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// What a worker needs from the scheduler.
///
/// `query` reports "nothing to do" (unknown or empty group) as `Ok(None)`;
/// every other failure is an error.
#[tonic::async_trait]
pub trait TaskSource: Send + Sync {
    async fn query(&self, group: &str, loan: Duration) -> Result<Option<Task>>;

    async fn extend(&self, group: &str, id: &str, loan: Duration) -> Result<()>;

    async fn finish(&self, group: &str, id: &str) -> Result<()>;
}

/// [`TaskSource`] over the gRPC API. Every call carries a deadline.
#[derive(Debug, Clone)]
pub struct GrpcTaskSource {
    client: TaskMasterClient<Channel>,
    rpc_timeout: Duration,
}

impl GrpcTaskSource {
    pub async fn connect(addr: &str) -> Result<Self> {
        let channel = Endpoint::from_shared(addr.to_string())
            .map_err(|e| TaskmasterError::Internal(format!("invalid endpoint {}: {}", addr, e)))?
            .connect_timeout(DEFAULT_RPC_TIMEOUT)
            .connect()
            .await?;
        Ok(Self::new(channel))
    }

    pub fn new(channel: Channel) -> Self {
        Self {
            client: TaskMasterClient::new(channel),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    fn request<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        request.set_timeout(self.rpc_timeout);
        request
    }

    /// Insert a payload into `group`; used by the CLI and tests.
    pub async fn insert(&self, group: &str, payload: String) -> Result<String> {
        let response = self
            .client
            .clone()
            .insert(self.request(InsertRequest {
                group: group.to_string(),
                payload,
            }))
            .await?;
        Ok(response.into_inner().id)
    }
}

fn expiry_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[tonic::async_trait]
impl TaskSource for GrpcTaskSource {
    async fn query(&self, group: &str, loan: Duration) -> Result<Option<Task>> {
        let request = self.request(QueryRequest {
            group: group.to_string(),
            loan_duration_ms: duration_millis(loan),
        });
        match self.client.clone().query(request).await {
            Ok(response) => {
                let resp = response.into_inner();
                Ok(Some(Task {
                    id: resp.id,
                    payload: resp.payload,
                    lease_expiry: expiry_from_millis(resp.lease_expiry_ms),
                }))
            }
            Err(status) => {
                let err = TaskmasterError::from(status);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn extend(&self, group: &str, id: &str, loan: Duration) -> Result<()> {
        let request = self.request(ExtendRequest {
            group: group.to_string(),
            id: id.to_string(),
            loan_duration_ms: duration_millis(loan),
        });
        self.client.clone().extend(request).await?;
        Ok(())
    }

    async fn finish(&self, group: &str, id: &str) -> Result<()> {
        let request = self.request(FinishRequest {
            group: group.to_string(),
            id: id.to_string(),
        });
        self.client.clone().finish(request).await?;
        Ok(())
    }
}

/// In-process source, for running a worker inside the scheduler process.
#[tonic::async_trait]
impl TaskSource for GroupRouter {
    async fn query(&self, group: &str, loan: Duration) -> Result<Option<Task>> {
        match GroupRouter::query(self, group, loan).await {
            Ok(task) => Ok(Some(task)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn extend(&self, group: &str, id: &str, loan: Duration) -> Result<()> {
        GroupRouter::extend(self, group, id, lease_deadline(Utc::now(), loan)).await
    }

    async fn finish(&self, group: &str, id: &str) -> Result<()> {
        GroupRouter::finish(self, group, id).await
    }
}
