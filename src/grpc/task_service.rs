use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tonic::{Request, Response, Status};

use crate::error::TaskmasterError;
use crate::proto::task_master_server::TaskMaster;
use crate::proto::{
    ExtendRequest, ExtendResponse, FinishRequest, FinishResponse, InsertRequest, InsertResponse,
    QueryRequest, QueryResponse,
};
use crate::scheduler::queue::lease_deadline;
use crate::scheduler::GroupRouter;

/// gRPC front for the [`GroupRouter`].
pub struct TaskMasterService {
    router: Arc<GroupRouter>,
    default_lease: Duration,
}

impl TaskMasterService {
    pub fn new(router: Arc<GroupRouter>, default_lease: Duration) -> Self {
        Self {
            router,
            default_lease,
        }
    }

    fn loan(&self, loan_duration_ms: u64) -> Duration {
        if loan_duration_ms == 0 {
            self.default_lease
        } else {
            Duration::from_millis(loan_duration_ms)
        }
    }
}

#[tonic::async_trait]
impl TaskMaster for TaskMasterService {
    async fn insert(
        &self,
        request: Request<InsertRequest>,
    ) -> Result<Response<InsertResponse>, Status> {
        let req = request.into_inner();

        let id = self
            .router
            .insert(&req.group, req.payload)
            .await
            .map_err(|e| {
                tracing::warn!(group = %req.group, error = %e, "Insert failed");
                Status::from(e)
            })?;

        tracing::info!(group = %req.group, task_id = %id, "Task inserted");
        Ok(Response::new(InsertResponse { id }))
    }

    async fn query(
        &self,
        request: Request<QueryRequest>,
    ) -> Result<Response<QueryResponse>, Status> {
        let req = request.into_inner();
        let loan = self.loan(req.loan_duration_ms);

        match self.router.query(&req.group, loan).await {
            Ok(task) => {
                tracing::info!(
                    group = %req.group,
                    task_id = %task.id,
                    loan_ms = loan.as_millis() as u64,
                    "Task leased"
                );
                Ok(Response::new(QueryResponse {
                    id: task.id,
                    payload: task.payload,
                    lease_expiry_ms: task.lease_expiry.timestamp_millis(),
                }))
            }
            // Expected whenever workers outpace producers
            Err(e @ TaskmasterError::NoTaskAvailable) => Err(e.into()),
            Err(e) => {
                tracing::debug!(group = %req.group, error = %e, "Query rejected");
                Err(e.into())
            }
        }
    }

    async fn extend(
        &self,
        request: Request<ExtendRequest>,
    ) -> Result<Response<ExtendResponse>, Status> {
        let req = request.into_inner();
        let deadline = lease_deadline(Utc::now(), self.loan(req.loan_duration_ms));

        self.router
            .extend(&req.group, &req.id, deadline)
            .await
            .map_err(|e| {
                tracing::warn!(group = %req.group, task_id = %req.id, error = %e, "Extend failed");
                Status::from(e)
            })?;

        Ok(Response::new(ExtendResponse {}))
    }

    async fn finish(
        &self,
        request: Request<FinishRequest>,
    ) -> Result<Response<FinishResponse>, Status> {
        let req = request.into_inner();

        self.router
            .finish(&req.group, &req.id)
            .await
            .map_err(|e| {
                tracing::warn!(group = %req.group, task_id = %req.id, error = %e, "Finish failed");
                Status::from(e)
            })?;

        Ok(Response::new(FinishResponse {}))
    }
}
