use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TaskmasterError};
use crate::scheduler::snapshot::{group_from_path, snapshot_path};
use crate::scheduler::store::TaskStore;
use crate::scheduler::task::{Task, TaskState};

const MAX_GROUP_LEN: usize = 128;

/// Group names double as snapshot file stems, so they are restricted to a
/// conservative character set and may not start with a dot.
pub fn validate_group(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_GROUP_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(TaskmasterError::InvalidGroup(name.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub id: String,
    pub state: TaskState,
    pub lease_expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub name: String,
    pub task_count: usize,
    pub tasks: Vec<TaskStatus>,
}

/// Owns every group's [`TaskStore`] and routes operations to them.
///
/// Stores are created on first Insert (or at startup from existing snapshot
/// files) and live until the process exits. Each store gets its own
/// persistence task tied to the router's shutdown token.
pub struct GroupRouter {
    snapshot_dir: PathBuf,
    snapshot_interval: Duration,
    groups: RwLock<HashMap<String, Arc<TaskStore>>>,
    shutdown: CancellationToken,
    fatal_tx: mpsc::UnboundedSender<TaskmasterError>,
}

impl GroupRouter {
    /// Create the router and eagerly load every `<group>.json` in `snapshot_dir`.
    ///
    /// The returned receiver yields snapshot write failures, which the owner
    /// should treat as fatal.
    pub async fn open(
        snapshot_dir: impl Into<PathBuf>,
        snapshot_interval: Duration,
        shutdown: CancellationToken,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TaskmasterError>)> {
        let snapshot_dir = snapshot_dir.into();
        if snapshot_interval.is_zero() {
            return Err(TaskmasterError::InvalidConfig(
                "snapshot interval must be greater than zero".to_string(),
            ));
        }
        fs::create_dir_all(&snapshot_dir)
            .await
            .map_err(|e| TaskmasterError::snapshot_io(&snapshot_dir, e))?;

        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let router = Self {
            snapshot_dir,
            snapshot_interval,
            groups: RwLock::new(HashMap::new()),
            shutdown,
            fatal_tx,
        };
        router.load_existing().await?;
        Ok((router, fatal_rx))
    }

    async fn load_existing(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.snapshot_dir)
            .await
            .map_err(|e| TaskmasterError::snapshot_io(&self.snapshot_dir, e))?;

        let mut groups = self.groups.write().await;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TaskmasterError::snapshot_io(&self.snapshot_dir, e))?
        {
            let path = entry.path();
            let Some(group) = group_from_path(&path) else {
                continue;
            };
            if validate_group(&group).is_err() {
                tracing::warn!(path = %path.display(), "Skipping snapshot with invalid group name");
                continue;
            }

            let store = TaskStore::open(group.clone(), path).await.map_err(|e| {
                tracing::error!(group = %group, error = %e, "Failed to load group");
                e
            })?;
            self.register(&mut groups, store);
        }

        tracing::info!(
            dir = %self.snapshot_dir.display(),
            groups = groups.len(),
            "Group router ready"
        );
        Ok(())
    }

    fn register(
        &self,
        groups: &mut HashMap<String, Arc<TaskStore>>,
        store: TaskStore,
    ) -> Arc<TaskStore> {
        let store = Arc::new(store);
        store.spawn_persistence(
            self.snapshot_interval,
            self.shutdown.child_token(),
            self.fatal_tx.clone(),
        );
        groups.insert(store.group().to_string(), Arc::clone(&store));
        store
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Look up an existing group. Never creates one.
    pub async fn get(&self, group: &str) -> Result<Arc<TaskStore>> {
        self.groups
            .read()
            .await
            .get(group)
            .cloned()
            .ok_or_else(|| TaskmasterError::GroupNotFound(group.to_string()))
    }

    async fn get_or_create(&self, group: &str) -> Result<Arc<TaskStore>> {
        if let Some(store) = self.groups.read().await.get(group) {
            return Ok(Arc::clone(store));
        }

        validate_group(group)?;

        let mut groups = self.groups.write().await;
        // Another Insert may have created it while we waited for the lock.
        if let Some(store) = groups.get(group) {
            return Ok(Arc::clone(store));
        }

        let path = snapshot_path(&self.snapshot_dir, group);
        let store = TaskStore::open(group, path).await.map_err(|e| {
            TaskmasterError::Internal(format!(
                "error returned while initializing group `{}`: {}",
                group, e
            ))
        })?;
        tracing::info!(group = %group, "Group created");
        Ok(self.register(&mut groups, store))
    }

    /// Add a task to `group`, creating the group if it does not exist.
    pub async fn insert(&self, group: &str, payload: String) -> Result<String> {
        let store = self.get_or_create(group).await?;
        Ok(store.new_task(payload).await)
    }

    pub async fn query(&self, group: &str, loan: Duration) -> Result<Task> {
        self.get(group).await?.query(loan).await
    }

    pub async fn extend(&self, group: &str, id: &str, deadline: DateTime<Utc>) -> Result<()> {
        self.get(group).await?.extend_lease(id, deadline).await
    }

    pub async fn finish(&self, group: &str, id: &str) -> Result<()> {
        self.get(group).await?.mark_complete(id).await
    }

    /// Group names in sorted order
    pub async fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Point-in-time view of every group, with lease state evaluated now.
    pub async fn status(&self) -> Vec<GroupStatus> {
        let mut stores: Vec<Arc<TaskStore>> = self.groups.read().await.values().cloned().collect();
        stores.sort_by(|a, b| a.group().cmp(b.group()));

        let now = Utc::now();
        let mut report = Vec::with_capacity(stores.len());
        for store in stores {
            let tasks: Vec<TaskStatus> = store
                .with_queue(|queue| {
                    queue
                        .all_tasks()
                        .into_iter()
                        .map(|task| TaskStatus {
                            id: task.id.clone(),
                            state: task.state_at(now),
                            lease_expiry: task.lease_expiry,
                        })
                        .collect()
                })
                .await;
            report.push(GroupStatus {
                name: store.group().to_string(),
                task_count: tasks.len(),
                tasks,
            });
        }
        report
    }
}
