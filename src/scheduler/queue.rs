use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, TaskmasterError};
use crate::scheduler::snapshot::Snapshot;
use crate::scheduler::task::Task;

/// Leases longer than this are clamped so expiries stay representable on disk.
const MAX_LEASE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + loan`, clamped to [`MAX_LEASE`].
pub fn lease_deadline(now: DateTime<Utc>, loan: Duration) -> DateTime<Utc> {
    let loan =
        chrono::Duration::from_std(loan.min(MAX_LEASE)).unwrap_or(chrono::Duration::zero());
    now.checked_add_signed(loan).unwrap_or(now)
}

/// The task mapping of one group plus its dirty flag.
///
/// Every method takes `now` explicitly; the async [`TaskStore`] wrapper
/// supplies the wall clock and the lock.
///
/// [`TaskStore`]: crate::scheduler::TaskStore
#[derive(Debug)]
pub struct TaskQueue {
    tasks: HashMap<String, Task>,
    dirty: bool,
    // Bumped on every mutation so a flush can tell whether it raced a writer.
    revision: u64,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    /// Empty queue that still needs its first snapshot written.
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            dirty: true,
            revision: 0,
        }
    }

    /// Queue adopted from a snapshot; clean until the next mutation.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            tasks: snapshot.tasks,
            dirty: false,
            revision: 0,
        }
    }

    /// Create a task that is available immediately and return its id.
    pub fn new_task(&mut self, payload: String, now: DateTime<Utc>) -> String {
        let task = Task::new(payload, now);
        let id = task.id.clone();
        self.tasks.insert(id.clone(), task);
        self.touch();
        id
    }

    /// Lease any task whose expiry has passed.
    ///
    /// Which of several eligible tasks is picked is unspecified. The returned
    /// copy carries the new expiry.
    pub fn lease_next(&mut self, loan: Duration, now: DateTime<Utc>) -> Option<Task> {
        let task = self.tasks.values_mut().find(|t| t.is_available(now))?;
        task.lease_expiry = lease_deadline(now, loan);
        let leased = task.clone();
        self.touch();
        Some(leased)
    }

    /// Overwrite the expiry of a task. Leases are not fenced: any caller may extend.
    pub fn extend(&mut self, id: &str, deadline: DateTime<Utc>) -> Result<()> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| TaskmasterError::TaskNotFound(id.to_string()))?;
        task.lease_expiry = deadline;
        self.touch();
        Ok(())
    }

    /// Remove a finished task.
    pub fn complete(&mut self, id: &str) -> Result<()> {
        self.tasks
            .remove(id)
            .ok_or_else(|| TaskmasterError::TaskNotFound(id.to_string()))?;
        self.touch();
        Ok(())
    }

    /// Copy of the current mapping. Leaves the dirty flag alone.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        Snapshot {
            created_at: now,
            tasks: self.tasks.clone(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// All tasks ordered by id, for stable status output
    pub fn all_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Clear the dirty flag only if nothing changed since `revision` was read.
    pub fn mark_clean_at(&mut self, revision: u64) -> bool {
        if self.revision == revision {
            self.dirty = false;
            true
        } else {
            false
        }
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
