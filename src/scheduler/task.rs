use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lease state of a task, derived from its expiry at observation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Leased,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "Pending"),
            TaskState::Leased => write!(f, "Leased"),
        }
    }
}

/// A unit of opaque work. The payload is never interpreted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub payload: String,
    pub lease_expiry: DateTime<Utc>,
}

impl Task {
    /// New task, available immediately.
    pub fn new(payload: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            lease_expiry: now,
        }
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.lease_expiry <= now
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> TaskState {
        if self.is_available(now) {
            TaskState::Pending
        } else {
            TaskState::Leased
        }
    }
}
