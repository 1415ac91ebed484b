use std::path::PathBuf;

use thiserror::Error;
use tonic::Status;

#[derive(Error, Debug)]
pub enum TaskmasterError {
    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("no active task with ID `{0}`")]
    TaskNotFound(String),

    #[error("no available tasks at present")]
    NoTaskAvailable,

    #[error("invalid group name: {0:?}")]
    InvalidGroup(String),

    #[error("invalid task payload: {0}")]
    InvalidPayload(String),

    #[error("snapshot I/O error on {path}: {source}")]
    SnapshotIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot format error: {0}")]
    SnapshotFormat(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("lease on task `{0}` was lost")]
    LeaseLost(String),

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskmasterError {
    pub(crate) fn snapshot_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SnapshotIo {
            path: path.into(),
            source,
        }
    }

    /// True for the not-found family: unknown group, unknown id, or nothing to lease.
    pub fn is_not_found(&self) -> bool {
        match self {
            TaskmasterError::GroupNotFound(_)
            | TaskmasterError::TaskNotFound(_)
            | TaskmasterError::NoTaskAvailable => true,
            TaskmasterError::Grpc(status) => status.code() == tonic::Code::NotFound,
            _ => false,
        }
    }
}

impl From<TaskmasterError> for Status {
    fn from(err: TaskmasterError) -> Self {
        match err {
            TaskmasterError::GroupNotFound(_)
            | TaskmasterError::TaskNotFound(_)
            | TaskmasterError::NoTaskAvailable => Status::not_found(err.to_string()),
            TaskmasterError::InvalidGroup(_) | TaskmasterError::InvalidPayload(_) => {
                Status::invalid_argument(err.to_string())
            }
            TaskmasterError::Grpc(status) => status,
            other => Status::internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskmasterError>;
