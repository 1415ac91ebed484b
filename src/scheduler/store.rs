use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TaskmasterError};
use crate::scheduler::queue::TaskQueue;
use crate::scheduler::snapshot::{read_snapshot, write_snapshot, Snapshot};
use crate::scheduler::task::Task;

/// The lease engine for one group, bound to its snapshot file.
#[derive(Debug)]
pub struct TaskStore {
    group: String,
    path: PathBuf,
    queue: RwLock<TaskQueue>,
}

impl TaskStore {
    /// Open the store for `group`, adopting the snapshot at `path` if there is one.
    ///
    /// A missing file yields an empty, dirty store so the first persistence
    /// tick creates it. A file that fails to parse is logged and replaced by an
    /// empty store; the old file is left on disk until the next mutation is
    /// flushed over it.
    pub async fn open(group: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let group = group.into();
        let path = path.into();

        let queue = match read_snapshot(&path).await {
            Ok(Some(snapshot)) => {
                let age = Utc::now() - snapshot.created_at;
                tracing::info!(
                    group = %group,
                    path = %path.display(),
                    tasks = snapshot.tasks.len(),
                    age_secs = age.num_seconds(),
                    "Loaded snapshot"
                );
                TaskQueue::from_snapshot(snapshot)
            }
            Ok(None) => {
                tracing::debug!(group = %group, path = %path.display(), "No snapshot, starting empty");
                TaskQueue::new()
            }
            Err(TaskmasterError::SnapshotFormat(e)) => {
                tracing::warn!(
                    group = %group,
                    path = %path.display(),
                    error = %e,
                    "Snapshot is corrupted, starting with an empty store"
                );
                let mut queue = TaskQueue::new();
                queue.mark_clean();
                queue
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            group,
            path,
            queue: RwLock::new(queue),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an immediately available task.
    pub async fn new_task(&self, payload: String) -> String {
        let id = self.queue.write().await.new_task(payload, Utc::now());
        tracing::debug!(group = %self.group, task_id = %id, "Task created");
        id
    }

    /// Lease an available task for `loan`. [`TaskmasterError::NoTaskAvailable`]
    /// is the normal answer for an idle group.
    pub async fn query(&self, loan: Duration) -> Result<Task> {
        let task = self
            .queue
            .write()
            .await
            .lease_next(loan, Utc::now())
            .ok_or(TaskmasterError::NoTaskAvailable)?;
        tracing::debug!(
            group = %self.group,
            task_id = %task.id,
            lease_expiry = %task.lease_expiry,
            "Task leased"
        );
        Ok(task)
    }

    pub async fn extend_lease(&self, id: &str, deadline: DateTime<Utc>) -> Result<()> {
        self.queue.write().await.extend(id, deadline)?;
        tracing::debug!(group = %self.group, task_id = %id, deadline = %deadline, "Lease extended");
        Ok(())
    }

    pub async fn mark_complete(&self, id: &str) -> Result<()> {
        self.queue.write().await.complete(id)?;
        tracing::info!(group = %self.group, task_id = %id, "Task finished");
        Ok(())
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.queue.read().await.snapshot(Utc::now())
    }

    pub async fn len(&self) -> usize {
        self.queue.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.read().await.is_empty()
    }

    pub async fn is_dirty(&self) -> bool {
        self.queue.read().await.is_dirty()
    }

    /// Write the snapshot file if there are unsaved changes.
    ///
    /// Returns whether a file was written. The dirty flag is cleared only when
    /// no mutation landed while the file was being written.
    pub async fn flush(&self) -> Result<bool> {
        let (snapshot, revision) = {
            let queue = self.queue.read().await;
            if !queue.is_dirty() {
                return Ok(false);
            }
            (queue.snapshot(Utc::now()), queue.revision())
        };

        write_snapshot(&self.path, &snapshot).await?;
        self.queue.write().await.mark_clean_at(revision);

        tracing::debug!(
            group = %self.group,
            tasks = snapshot.tasks.len(),
            "Snapshot written"
        );
        Ok(true)
    }

    /// Flush every `interval` until `shutdown` fires.
    ///
    /// A failed write is fatal: it is logged, forwarded on `fatal_tx`, and the
    /// loop exits. A zero interval is reported the same way. Nothing is
    /// flushed on shutdown.
    pub fn spawn_persistence(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
        fatal_tx: mpsc::UnboundedSender<TaskmasterError>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            if interval.is_zero() {
                tracing::error!(group = %store.group, "Snapshot interval is zero, persistence disabled");
                let _ = fatal_tx.send(TaskmasterError::InvalidConfig(
                    "snapshot interval must be greater than zero".to_string(),
                ));
                return;
            }
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!(group = %store.group, "Persistence stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = store.flush().await {
                            tracing::error!(
                                group = %store.group,
                                path = %store.path.display(),
                                error = %e,
                                "Failed to write snapshot"
                            );
                            let _ = fatal_tx.send(e);
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Run `f` against the queue under the shared lock.
    pub async fn with_queue<R>(&self, f: impl FnOnce(&TaskQueue) -> R) -> R {
        f(&*self.queue.read().await)
    }
}
