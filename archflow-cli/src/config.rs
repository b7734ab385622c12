//! CLI configuration

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the scheduler's HTTP API
    pub scheduler_url: String,
}
