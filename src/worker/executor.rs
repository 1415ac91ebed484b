use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TaskmasterError};

/// Payload format understood by workers: a program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub base: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(base: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            base: base.into(),
            args,
        }
    }

    /// Shorthand for `sh -c <script>`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh", vec!["-c".to_string(), script.into()])
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| TaskmasterError::InvalidPayload(e.to_string()))
    }

    pub fn decode(payload: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(payload)
            .map_err(|_| TaskmasterError::InvalidPayload(format!("unknown task format: {}", payload)))?;
        if spec.base.trim().is_empty() {
            return Err(TaskmasterError::InvalidPayload(
                "command cannot be empty".to_string(),
            ));
        }
        Ok(spec)
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    /// Stopped because the lease could not be kept
    Cancelled,
    TimedOut,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Succeeded => write!(f, "succeeded"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
            ExecutionStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of running one payload
#[derive(Debug)]
pub struct ExecutionResult {
    pub task_id: String,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    /// stdout followed by stderr
    pub output: String,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn aborted(task_id: &str, status: ExecutionStatus, error: String) -> Self {
        Self {
            task_id: task_id.to_string(),
            status,
            exit_code: None,
            output: String::new(),
            error: Some(error),
        }
    }
}

/// Runs [`CommandSpec`]s as child processes.
///
/// The child is killed if execution is cancelled or exceeds the timeout.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn execute(
        &self,
        task_id: &str,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        tracing::info!(task_id, command = %spec, "Executing task");

        let child = Command::new(&spec.base)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(task_id, error = %e, "Failed to start task");
                return ExecutionResult::aborted(task_id, ExecutionStatus::Failed, e.to_string());
            }
        };

        tokio::select! {
            output = child.wait_with_output() => Self::process_output(task_id, output),
            _ = cancel.cancelled() => {
                tracing::warn!(task_id, "Task execution cancelled");
                ExecutionResult::aborted(
                    task_id,
                    ExecutionStatus::Cancelled,
                    "execution cancelled".to_string(),
                )
            }
            _ = tokio::time::sleep(self.timeout) => {
                tracing::warn!(task_id, timeout_secs = self.timeout.as_secs(), "Task timed out");
                ExecutionResult::aborted(
                    task_id,
                    ExecutionStatus::TimedOut,
                    format!("execution exceeded {:?}", self.timeout),
                )
            }
        }
    }

    fn process_output(
        task_id: &str,
        result: std::result::Result<std::process::Output, std::io::Error>,
    ) -> ExecutionResult {
        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let exit_code = output.status.code();

                let (status, error) = if output.status.success() {
                    (ExecutionStatus::Succeeded, None)
                } else if stderr.is_empty() {
                    (
                        ExecutionStatus::Failed,
                        Some(format!("Exit code: {:?}", exit_code)),
                    )
                } else {
                    (ExecutionStatus::Failed, Some(stderr.to_string()))
                };

                tracing::info!(
                    task_id,
                    status = %status,
                    exit_code = ?exit_code,
                    "Task process exited"
                );

                ExecutionResult {
                    task_id: task_id.to_string(),
                    status,
                    exit_code,
                    output: format!("{}{}", stdout, stderr),
                    error,
                }
            }
            Err(e) => {
                tracing::error!(task_id, error = %e, "Task execution failed");
                ExecutionResult::aborted(task_id, ExecutionStatus::Failed, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_spec_json_shape() {
        let spec = CommandSpec::new("echo", vec!["hello".into(), "world".into()]);
        let encoded = spec.encode().unwrap();
        assert_eq!(encoded, r#"{"base":"echo","args":["hello","world"]}"#);
        assert_eq!(CommandSpec::decode(&encoded).unwrap(), spec);
    }

    #[test]
    fn args_default_to_empty() {
        let spec = CommandSpec::decode(r#"{"base":"true"}"#).unwrap();
        assert_eq!(spec.base, "true");
        assert!(spec.args.is_empty());
    }

    #[test]
    fn rejects_unknown_payloads() {
        assert!(matches!(
            CommandSpec::decode("echo hi"),
            Err(TaskmasterError::InvalidPayload(_))
        ));
        assert!(matches!(
            CommandSpec::decode(r#"{"base":"  "}"#),
            Err(TaskmasterError::InvalidPayload(_))
        ));
    }

    #[test]
    fn display_joins_arguments() {
        let spec = CommandSpec::shell("echo hi");
        assert_eq!(spec.to_string(), "sh -c echo hi");
    }
}
