//! Server-side task storage: the per-group lease engine, its snapshot
//! persistence, and the router that owns one store per group.

pub mod queue;
pub mod router;
pub mod snapshot;
pub mod store;
pub mod task;

pub use queue::TaskQueue;
pub use router::{GroupRouter, GroupStatus, TaskStatus};
pub use snapshot::Snapshot;
pub use store::TaskStore;
pub use task::{Task, TaskState};
