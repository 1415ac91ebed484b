use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TaskmasterError};
use crate::scheduler::queue::lease_deadline;
use crate::worker::client::TaskSource;

/// Keeps a task's lease alive while its payload runs.
///
/// Execution must stop `margin` before the lease runs out. The lease is
/// extended to `2 * period` from now once per `period`, or earlier so that
/// an extension has `margin` to land before that cutoff. If an extension
/// fails, or has not landed by the cutoff, the execution token is cancelled
/// and the refresher stops. It also stops as soon as `done` is cancelled by
/// the execution side.
pub struct LeaseRefresher {
    period: Duration,
    margin: Duration,
}

impl LeaseRefresher {
    pub fn new(period: Duration, margin: Duration) -> Self {
        Self { period, margin }
    }

    pub fn extension(&self) -> Duration {
        self.period * 2
    }

    pub async fn run<S: TaskSource + ?Sized>(
        &self,
        source: &S,
        group: &str,
        task_id: &str,
        lease_expiry: DateTime<Utc>,
        execution: &CancellationToken,
        done: &CancellationToken,
    ) -> Result<()> {
        let mut deadline = lease_expiry;

        loop {
            let wait = self.period.min(self.time_until_refresh(deadline));

            tokio::select! {
                _ = done.cancelled() => return Ok(()),
                _ = tokio::time::sleep(wait) => {}
            }

            let sent_at = Utc::now();
            let extended = tokio::select! {
                _ = done.cancelled() => return Ok(()),
                extended = tokio::time::timeout(
                    self.time_until_cutoff(deadline),
                    source.extend(group, task_id, self.extension()),
                ) => extended,
            };

            match extended {
                Ok(Ok(())) => {
                    deadline = lease_deadline(sent_at, self.extension());
                    tracing::debug!(group, task_id, deadline = %deadline, "Lease extended");
                }
                Ok(Err(e)) => {
                    tracing::warn!(group, task_id, error = %e, "Lease extension failed, cancelling execution");
                    execution.cancel();
                    return Err(TaskmasterError::LeaseLost(task_id.to_string()));
                }
                Err(_) => {
                    tracing::warn!(group, task_id, "Lease about to expire, cancelling execution");
                    execution.cancel();
                    return Err(TaskmasterError::LeaseLost(task_id.to_string()));
                }
            }
        }
    }

    /// Time left before execution has to stop.
    fn time_until_cutoff(&self, deadline: DateTime<Utc>) -> Duration {
        time_until(deadline).saturating_sub(self.margin)
    }

    /// Latest moment to send an extension and still leave it `margin` to land.
    fn time_until_refresh(&self, deadline: DateTime<Utc>) -> Duration {
        self.time_until_cutoff(deadline).saturating_sub(self.margin)
    }
}

fn time_until(deadline: DateTime<Utc>) -> Duration {
    (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extends_by_twice_the_period() {
        let refresher = LeaseRefresher::new(Duration::from_secs(60), Duration::from_secs(1));
        assert_eq!(refresher.extension(), Duration::from_secs(120));
    }

    #[test]
    fn cutoff_respects_margin() {
        let refresher = LeaseRefresher::new(Duration::from_secs(60), Duration::from_secs(1));
        let past = Utc::now() - chrono::Duration::seconds(5);
        assert_eq!(refresher.time_until_cutoff(past), Duration::ZERO);

        let soon = Utc::now() + chrono::Duration::milliseconds(500);
        assert_eq!(refresher.time_until_cutoff(soon), Duration::ZERO);

        let later = Utc::now() + chrono::Duration::seconds(30);
        let cutoff = refresher.time_until_cutoff(later);
        assert!(cutoff <= Duration::from_secs(29));
        assert!(cutoff > Duration::from_secs(28));
    }

    #[test]
    fn refresh_leaves_margin_before_cutoff() {
        let refresher = LeaseRefresher::new(Duration::from_secs(60), Duration::from_secs(1));
        let later = Utc::now() + chrono::Duration::seconds(30);
        let refresh = refresher.time_until_refresh(later);
        assert!(refresh <= Duration::from_secs(28));
        assert!(refresh > Duration::from_secs(27));

        let soon = Utc::now() + chrono::Duration::milliseconds(1500);
        assert_eq!(refresher.time_until_refresh(soon), Duration::ZERO);
    }
}
