use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::{Result, TaskmasterError};
use crate::worker::client::TaskSource;
use crate::worker::executor::{CommandExecutor, CommandSpec, ExecutionStatus};
use crate::worker::lease::LeaseRefresher;
use crate::worker::status::WorkerStats;

/// Outcome of one successful pass through the worker loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    /// Nothing to lease in the group
    Idle,
    /// The task ran and was reported finished
    Finished(String),
}

/// Polls a group for tasks, runs them with a live lease, and reports them finished.
///
/// A task whose payload cannot be decoded, whose execution fails, or whose
/// lease cannot be kept is left unfinished; it returns to the pool when its
/// lease expires.
pub struct WorkerAgent<S: TaskSource + ?Sized> {
    source: Arc<S>,
    config: WorkerConfig,
    executor: CommandExecutor,
    stats: Arc<WorkerStats>,
}

impl<S: TaskSource + ?Sized> WorkerAgent<S> {
    pub fn new(source: Arc<S>, config: WorkerConfig) -> Self {
        Self {
            executor: CommandExecutor::new(config.task_timeout),
            source,
            config,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Loop until `shutdown` is cancelled. Idle and failed cycles sleep for
    /// the retry interval; a finished task is followed immediately by the
    /// next query.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(group = %self.config.group, "Worker started");

        loop {
            let cycle = tokio::select! {
                _ = shutdown.cancelled() => break,
                cycle = self.run_once() => cycle,
            };

            match cycle {
                Ok(Cycle::Finished(_)) => continue,
                Ok(Cycle::Idle) => {
                    tracing::debug!(group = %self.config.group, "No task available");
                }
                Err(e) => {
                    self.stats.record_failed();
                    tracing::warn!(group = %self.config.group, error = %e, "Worker cycle failed");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_interval) => {}
            }
        }

        tracing::info!(group = %self.config.group, "Worker stopped");
    }

    /// Query, execute, and finish at most one task.
    pub async fn run_once(&self) -> Result<Cycle> {
        let group = self.config.group.as_str();
        let loan = self.config.lease_duration;

        let Some(task) = self.source.query(group, loan).await? else {
            return Ok(Cycle::Idle);
        };
        tracing::info!(group, task_id = %task.id, lease_expiry = %task.lease_expiry, "Working on task");

        let spec = CommandSpec::decode(&task.payload)?;

        let execution = CancellationToken::new();
        let done = CancellationToken::new();
        let refresher = LeaseRefresher::new(loan, self.config.lease_margin);

        let run = async {
            let result = self.executor.execute(&task.id, &spec, &execution).await;
            done.cancel();
            result
        };
        let keep_alive = refresher.run(
            &*self.source,
            group,
            &task.id,
            task.lease_expiry,
            &execution,
            &done,
        );
        let (result, lease) = tokio::join!(run, keep_alive);

        lease?;
        match result.status {
            ExecutionStatus::Succeeded => {
                tracing::debug!(task_id = %task.id, output = %result.output, "Task output");
            }
            status => {
                return Err(TaskmasterError::Execution(format!(
                    "task `{}` {}: {}",
                    task.id,
                    status,
                    result.error.unwrap_or_default()
                )));
            }
        }

        self.source.finish(group, &task.id).await?;
        self.stats.record_finished();
        tracing::info!(group, task_id = %task.id, "Task is committed");
        Ok(Cycle::Finished(task.id))
    }
}
