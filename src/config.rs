use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server-side settings shared by every group store.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// gRPC listen address
    pub listen_addr: SocketAddr,
    /// Status page listen address, disabled when `None`
    pub dashboard_addr: Option<SocketAddr>,
    /// Directory holding one `<group>.json` snapshot per group
    pub snapshot_dir: PathBuf,
    /// How often dirty stores are written to disk
    pub snapshot_interval: Duration,
    /// Lease granted when a Query asks for a zero duration
    pub default_lease: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 50051)),
            dashboard_addr: None,
            snapshot_dir: PathBuf::from("snapshots"),
            snapshot_interval: Duration::from_secs(30),
            default_lease: Duration::from_secs(60 * 60),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr,
            snapshot_dir: snapshot_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_dashboard(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = Some(addr);
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    pub fn with_default_lease(mut self, lease: Duration) -> Self {
        self.default_lease = lease;
        self
    }
}

/// Worker agent settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Scheduler address, e.g. `http://127.0.0.1:50051`
    pub server_addr: String,
    /// Group this worker pulls tasks from
    pub group: String,
    /// Loan requested on Query; also the lease refresh period
    pub lease_duration: Duration,
    /// Upper bound on a single payload execution
    pub task_timeout: Duration,
    /// Sleep after an empty Query or any failed cycle
    pub retry_interval: Duration,
    /// Execution stops this long before the lease runs out
    pub lease_margin: Duration,
    /// Optional finish-count page
    pub status_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_addr: "http://127.0.0.1:50051".to_string(),
            group: "default".to_string(),
            lease_duration: Duration::from_secs(60),
            task_timeout: Duration::from_secs(60 * 60),
            retry_interval: Duration::from_secs(30),
            lease_margin: Duration::from_secs(1),
            status_addr: None,
        }
    }
}

impl WorkerConfig {
    pub fn new(server_addr: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            group: group.into(),
            ..Default::default()
        }
    }

    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_lease_margin(mut self, margin: Duration) -> Self {
        self.lease_margin = margin;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:50051");
        assert!(cfg.dashboard_addr.is_none());
        assert_eq!(cfg.snapshot_dir, PathBuf::from("snapshots"));
        assert_eq!(cfg.snapshot_interval, Duration::from_secs(30));
        assert_eq!(cfg.default_lease, Duration::from_secs(3600));
    }

    #[test]
    fn server_config_builders() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let dash: SocketAddr = "10.0.0.1:8080".parse().unwrap();
        let cfg = ServerConfig::new(addr, "/var/lib/taskmaster")
            .with_dashboard(dash)
            .with_snapshot_interval(Duration::from_millis(250))
            .with_default_lease(Duration::from_secs(90));
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.default_lease, Duration::from_secs(90));
        assert_eq!(cfg.dashboard_addr, Some(dash));
        assert_eq!(cfg.snapshot_dir, PathBuf::from("/var/lib/taskmaster"));
        assert_eq!(cfg.snapshot_interval, Duration::from_millis(250));
    }

    #[test]
    fn worker_config_default() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.server_addr, "http://127.0.0.1:50051");
        assert_eq!(cfg.group, "default");
        assert_eq!(cfg.lease_duration, Duration::from_secs(60));
        assert_eq!(cfg.task_timeout, Duration::from_secs(3600));
        assert_eq!(cfg.retry_interval, Duration::from_secs(30));
        assert_eq!(cfg.lease_margin, Duration::from_secs(1));
        assert!(cfg.status_addr.is_none());
    }

    #[test]
    fn worker_config_builders() {
        let cfg = WorkerConfig::new("http://scheduler:50051", "encode")
            .with_lease_duration(Duration::from_secs(5))
            .with_retry_interval(Duration::from_millis(100))
            .with_lease_margin(Duration::from_millis(10))
            .with_task_timeout(Duration::from_secs(30));
        assert_eq!(cfg.server_addr, "http://scheduler:50051");
        assert_eq!(cfg.group, "encode");
        assert_eq!(cfg.lease_duration, Duration::from_secs(5));
        assert_eq!(cfg.retry_interval, Duration::from_millis(100));
        assert_eq!(cfg.lease_margin, Duration::from_millis(10));
        assert_eq!(cfg.task_timeout, Duration::from_secs(30));
    }
}
