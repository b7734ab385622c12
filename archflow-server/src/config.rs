//! Scheduler configuration
//!
//! Defines every tunable of the scheduler: where the workflow and the
//! database live, how tasks are batched and dispatched, how many jobs and
//! packages run at once, and the shared directory layout.

use archflow_core::domain::package::{SharedDirectories, join_dir};
use std::path::PathBuf;
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Workflow document loaded at startup
    pub workflow_file: PathBuf,

    /// PostgreSQL connection string; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// HTTP bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: String,

    /// Base URL of the worker gateway (e.g., "http://localhost:4730")
    pub worker_gateway_url: String,

    /// Number of tasks sent to a worker in one batch
    pub task_batch_size: usize,

    /// Maximum time a batch may take before it is abandoned
    pub dispatch_timeout: Duration,

    /// Concurrent job executions
    pub worker_count: usize,

    /// Packages allowed to be active at the same time
    pub max_concurrent_packages: usize,

    /// Deferred packages allowed to wait for a slot
    pub max_queued_packages: usize,

    /// Deferred packages older than this are failed instead of activated
    pub queued_package_timeout: Option<Duration>,

    /// How long the dispatcher waits for a ready job before looping
    pub poll_interval: Duration,

    pub shared_directory: String,
    pub processing_directory: String,
    pub watch_directory: String,
    pub rejected_directory: String,

    /// Directory holding `<name>.json` processing configurations
    pub processing_config_dir: PathBuf,

    /// Park decisions nobody has configured until a user supplies a choice
    pub interactive_decisions: bool,
}

const DEFAULT_SHARED_DIRECTORY: &str = "/var/archivematica/sharedDirectory/";

impl Config {
    /// Creates a configuration with defaults for the given shared directory
    pub fn new(shared_directory: impl Into<String>) -> Self {
        let dirs = SharedDirectories::new(shared_directory);
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            workflow_file: PathBuf::from("workflow.json"),
            database_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            worker_gateway_url: "http://localhost:4730".to_string(),
            task_batch_size: 128,
            dispatch_timeout: Duration::from_secs(3600),
            worker_count: cpus + 1,
            max_concurrent_packages: cpus / 2 + 1,
            max_queued_packages: 1024,
            queued_package_timeout: None,
            poll_interval: Duration::from_millis(1000),
            processing_config_dir: PathBuf::from(join_dir(
                &join_dir(&dirs.shared, "sharedMicroServiceTasksConfig"),
                "processingMCPConfigs",
            )),
            processing_directory: dirs.processing,
            watch_directory: dirs.watch,
            rejected_directory: dirs.rejected,
            shared_directory: dirs.shared,
            interactive_decisions: true,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - ARCHFLOW_WORKFLOW_FILE (default: workflow.json)
    /// - DATABASE_URL (in-memory store when unset)
    /// - ARCHFLOW_BIND_ADDR (default: 0.0.0.0:8080)
    /// - ARCHFLOW_WORKER_GATEWAY_URL (default: http://localhost:4730)
    /// - ARCHFLOW_TASK_BATCH_SIZE (default: 128)
    /// - ARCHFLOW_DISPATCH_TIMEOUT (seconds, default: 3600)
    /// - ARCHFLOW_WORKER_COUNT (default: CPUs + 1)
    /// - ARCHFLOW_MAX_CONCURRENT_PACKAGES (default: CPUs / 2 + 1)
    /// - ARCHFLOW_MAX_QUEUED_PACKAGES (default: 1024)
    /// - ARCHFLOW_QUEUED_PACKAGE_TIMEOUT (seconds, unset by default)
    /// - ARCHFLOW_POLL_INTERVAL (milliseconds, default: 1000)
    /// - ARCHFLOW_SHARED_DIRECTORY, ARCHFLOW_PROCESSING_DIRECTORY,
    ///   ARCHFLOW_WATCH_DIRECTORY, ARCHFLOW_REJECTED_DIRECTORY,
    ///   ARCHFLOW_PROCESSING_CONFIG_DIR
    /// - ARCHFLOW_INTERACTIVE_DECISIONS (default: true)
    pub fn from_env() -> anyhow::Result<Self> {
        let shared = std::env::var("ARCHFLOW_SHARED_DIRECTORY")
            .unwrap_or_else(|_| DEFAULT_SHARED_DIRECTORY.to_string());
        let mut config = Self::new(shared);

        if let Ok(path) = std::env::var("ARCHFLOW_WORKFLOW_FILE") {
            config.workflow_file = PathBuf::from(path);
        }

        config.database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        if let Ok(addr) = std::env::var("ARCHFLOW_BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Ok(url) = std::env::var("ARCHFLOW_WORKER_GATEWAY_URL") {
            config.worker_gateway_url = url;
        }

        config.task_batch_size = env_parse("ARCHFLOW_TASK_BATCH_SIZE")?
            .unwrap_or(config.task_batch_size);

        config.dispatch_timeout = env_parse::<u64>("ARCHFLOW_DISPATCH_TIMEOUT")?
            .map(Duration::from_secs)
            .unwrap_or(config.dispatch_timeout);

        config.worker_count = env_parse("ARCHFLOW_WORKER_COUNT")?.unwrap_or(config.worker_count);

        config.max_concurrent_packages = env_parse("ARCHFLOW_MAX_CONCURRENT_PACKAGES")?
            .unwrap_or(config.max_concurrent_packages);

        config.max_queued_packages = env_parse("ARCHFLOW_MAX_QUEUED_PACKAGES")?
            .unwrap_or(config.max_queued_packages);

        config.queued_package_timeout =
            env_parse::<u64>("ARCHFLOW_QUEUED_PACKAGE_TIMEOUT")?.map(Duration::from_secs);

        config.poll_interval = env_parse::<u64>("ARCHFLOW_POLL_INTERVAL")?
            .map(Duration::from_millis)
            .unwrap_or(config.poll_interval);

        if let Ok(dir) = std::env::var("ARCHFLOW_PROCESSING_DIRECTORY") {
            config.processing_directory = dir;
        }
        if let Ok(dir) = std::env::var("ARCHFLOW_WATCH_DIRECTORY") {
            config.watch_directory = dir;
        }
        if let Ok(dir) = std::env::var("ARCHFLOW_REJECTED_DIRECTORY") {
            config.rejected_directory = dir;
        }
        if let Ok(dir) = std::env::var("ARCHFLOW_PROCESSING_CONFIG_DIR") {
            config.processing_config_dir = PathBuf::from(dir);
        }

        config.interactive_decisions = env_parse("ARCHFLOW_INTERACTIVE_DECISIONS")?
            .unwrap_or(config.interactive_decisions);

        Ok(config)
    }

    /// Shared directory layout used to build replacement mappings
    pub fn shared_directories(&self) -> SharedDirectories {
        SharedDirectories {
            shared: self.shared_directory.clone(),
            processing: self.processing_directory.clone(),
            watch: self.watch_directory.clone(),
            rejected: self.rejected_directory.clone(),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !self.worker_gateway_url.starts_with("http://")
            && !self.worker_gateway_url.starts_with("https://")
        {
            anyhow::bail!("worker_gateway_url must start with http:// or https://");
        }

        if self.task_batch_size == 0 {
            anyhow::bail!("task_batch_size must be greater than 0");
        }

        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be greater than 0");
        }

        if self.max_concurrent_packages == 0 {
            anyhow::bail!("max_concurrent_packages must be greater than 0");
        }

        if self.dispatch_timeout.is_zero() {
            anyhow::bail!("dispatch_timeout must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.shared_directory.is_empty() {
            anyhow::bail!("shared_directory cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_SHARED_DIRECTORY)
    }
}

/// Reads and parses an optional environment variable
fn env_parse<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.task_batch_size, 128);
        assert_eq!(config.dispatch_timeout, Duration::from_secs(3600));
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.worker_count >= 2);
        assert!(config.max_concurrent_packages >= 1);
        assert!(config.interactive_decisions);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_directories_derive_from_shared() {
        let config = Config::new("/srv/shared");
        assert_eq!(config.shared_directory, "/srv/shared/");
        assert_eq!(config.processing_directory, "/srv/shared/currentlyProcessing/");
        assert_eq!(config.watch_directory, "/srv/shared/watchedDirectories/");
        assert_eq!(
            config.processing_config_dir,
            PathBuf::from("/srv/shared/sharedMicroServiceTasksConfig/processingMCPConfigs/")
        );
        assert_eq!(config.shared_directories().rejected, "/srv/shared/rejected/");
    }

    #[test]
    fn test_validate_rejects_invalid_values() {
        let mut config = Config::default();
        config.task_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.worker_gateway_url = "localhost:4730".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.worker_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_parse_missing_variable() {
        let value: Option<usize> = env_parse("ARCHFLOW_TEST_SURELY_UNSET_VARIABLE").unwrap();
        assert!(value.is_none());
    }
}
