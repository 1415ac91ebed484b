//! On-disk snapshots of a group's task mapping.
//!
//! Each group is stored as pretty-printed JSON in `<group>.json` inside the
//! snapshot directory. Writes go to `<group>.json.tmp` first and are renamed
//! into place, so a crash mid-write leaves the previous snapshot readable.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, TaskmasterError};
use crate::scheduler::task::Task;

pub const SNAPSHOT_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub created_at: DateTime<Utc>,
    pub tasks: HashMap<String, Task>,
}

/// Path of the snapshot file for `group` under `dir`.
pub fn snapshot_path(dir: &Path, group: &str) -> PathBuf {
    dir.join(format!("{}.{}", group, SNAPSHOT_EXTENSION))
}

/// Group name encoded in a snapshot file path, if it is one.
pub fn group_from_path(path: &Path) -> Option<String> {
    if path.extension()? != SNAPSHOT_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}

/// Read a snapshot. `Ok(None)` when the file does not exist; a
/// [`TaskmasterError::SnapshotFormat`] when it exists but does not parse.
pub async fn read_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TaskmasterError::snapshot_io(path, e)),
    };
    let snapshot = serde_json::from_slice(&data)?;
    Ok(Some(snapshot))
}

/// Write a snapshot through a temp file and rename it over `path`.
pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let data = serde_json::to_vec_pretty(snapshot)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, &data)
        .await
        .map_err(|e| TaskmasterError::snapshot_io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| TaskmasterError::snapshot_io(path, e))?;
    Ok(())
}
