//! Client side of the task queue.
//!
//! A worker leases tasks from one group and runs them:
//! - **Querying**: ask the scheduler for any available task
//! - **Executing**: decode the payload into a [`CommandSpec`] and run it
//!   while a [`LeaseRefresher`] keeps the lease alive
//! - **Finishing**: report success so the task is removed
//!
//! Any failure leaves the task leased; it becomes available again once the
//! lease runs out, so payloads may run more than once.
//!
//! # Components
//!
//! - [`WorkerAgent`]: the polling loop
//! - [`TaskSource`]: scheduler operations the agent depends on, implemented
//!   over gRPC by [`GrpcTaskSource`] and in-process by `GroupRouter`
//! - [`CommandExecutor`]: runs payload processes with a timeout
//! - [`WorkerStats`]: finish/failure counters behind the status page

pub mod agent;
pub mod client;
pub mod executor;
pub mod lease;
pub mod status;

pub use agent::{Cycle, WorkerAgent};
pub use client::{GrpcTaskSource, TaskSource};
pub use executor::{CommandExecutor, CommandSpec, ExecutionResult, ExecutionStatus};
pub use lease::LeaseRefresher;
pub use status::WorkerStats;
