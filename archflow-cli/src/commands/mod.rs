//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod decision;
mod package;
mod workflow;

pub use decision::DecisionCommands;
pub use package::PackageCommands;
pub use workflow::WorkflowCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Inspect workflow documents offline
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },
    /// Start and inspect packages
    Package {
        #[command(subcommand)]
        command: PackageCommands,
    },
    /// List and answer parked decisions
    Decision {
        #[command(subcommand)]
        command: DecisionCommands,
    },
}

/// Routes a command to its handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Workflow { command } => workflow::handle_workflow_command(command),
        Commands::Package { command } => package::handle_package_command(command, config).await,
        Commands::Decision { command } => decision::handle_decision_command(command, config).await,
    }
}
