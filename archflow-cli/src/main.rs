//! Archflow CLI
//!
//! Command-line interface for workflow documents and a running scheduler.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "archflow")]
#[command(about = "Archival package workflow CLI", long_about = None)]
struct Cli {
    /// Scheduler URL
    #[arg(
        long,
        env = "ARCHFLOW_SCHEDULER_URL",
        default_value = "http://localhost:8080"
    )]
    scheduler_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        scheduler_url: cli.scheduler_url,
    };

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scheduler_url_flag() {
        let cli = Cli::try_parse_from([
            "archflow",
            "--scheduler-url",
            "http://scheduler:9000",
            "decision",
            "list",
        ])
        .unwrap();
        assert_eq!(cli.scheduler_url, "http://scheduler:9000");
    }
}
