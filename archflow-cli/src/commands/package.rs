//! Package command handlers

use anyhow::{Result, bail};
use archflow_client::SchedulerClient;
use archflow_core::domain::job::JobStatus;
use archflow_core::domain::package::{PackageKind, PackageStatus};
use archflow_core::dto::package::{PackageDetails, StartPackage};
use clap::Subcommand;
use colored::*;
use uuid::Uuid;

use crate::config::Config;

/// Package subcommands
#[derive(Subcommand)]
pub enum PackageCommands {
    /// Start processing a package
    Start {
        /// Package directory, absolute or relative to the shared directory
        #[arg(short, long)]
        path: String,

        /// Package kind: transfer, sip or dip
        #[arg(short, long)]
        kind: PackageKind,

        /// Chain to start
        #[arg(short, long, conflicts_with = "watched_directory")]
        chain: Option<String>,

        /// Watched directory whose chain should be started
        #[arg(short, long)]
        watched_directory: Option<String>,

        /// Processing configuration name
        #[arg(long)]
        processing_config: Option<String>,
    },
    /// Show a package and its jobs
    Get {
        /// Package ID
        id: Uuid,
    },
}

pub async fn handle_package_command(command: PackageCommands, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);

    match command {
        PackageCommands::Start {
            path,
            kind,
            chain,
            watched_directory,
            processing_config,
        } => {
            let req = start_request(path, kind, chain, watched_directory, processing_config)?;
            start_package(&client, req).await
        }
        PackageCommands::Get { id } => get_package(&client, id).await,
    }
}

fn start_request(
    path: String,
    kind: PackageKind,
    chain_id: Option<String>,
    watched_directory: Option<String>,
    processing_configuration: Option<String>,
) -> Result<StartPackage> {
    if chain_id.is_none() && watched_directory.is_none() {
        bail!("either --chain or --watched-directory is required");
    }
    Ok(StartPackage {
        path,
        kind,
        chain_id,
        watched_directory,
        processing_configuration,
    })
}

async fn start_package(client: &SchedulerClient, req: StartPackage) -> Result<()> {
    let package = client.start_package(req).await?;

    println!("{}", "✓ Package started".green().bold());
    println!("  ID:     {}", package.id.to_string().cyan());
    println!("  Kind:   {}", package.kind);
    println!("  Path:   {}", package.current_path.dimmed());
    println!("  Status: {}", colored_status(package.status));
    Ok(())
}

async fn get_package(client: &SchedulerClient, id: Uuid) -> Result<()> {
    let details = client.get_package(id).await?;
    print_package_details(&details);
    Ok(())
}

fn colored_status(status: PackageStatus) -> ColoredString {
    match status {
        PackageStatus::Done => status.to_string().green(),
        PackageStatus::Failed | PackageStatus::Rejected => status.to_string().red(),
        PackageStatus::Processing => status.to_string().yellow(),
        PackageStatus::Unknown => status.to_string().normal(),
    }
}

fn print_package_details(details: &PackageDetails) {
    let package = &details.package;
    println!("{}", "Package Details:".bold());
    println!("  ID:       {}", package.id.to_string().cyan());
    println!("  Kind:     {}", package.kind);
    println!("  Path:     {}", package.current_path);
    println!("  Status:   {}", colored_status(package.status));
    if !package.processing_configuration.is_empty() {
        println!("  Config:   {}", package.processing_configuration);
    }
    println!("  Created:  {}", package.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed) = package.completed_at {
        println!("  Finished: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }

    if details.jobs.is_empty() {
        return;
    }
    println!("\n{}", format!("Jobs ({}):", details.jobs.len()).bold());
    for job in &details.jobs {
        let status = match job.status {
            JobStatus::CompletedSuccessfully => job.status.to_string().green(),
            JobStatus::Failed => job.status.to_string().red(),
            _ => job.status.to_string().yellow(),
        };
        let exit_code = job.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} {} [{}] exit {}",
            "▸".cyan(),
            job.link_id.dimmed(),
            job.description,
            status,
            exit_code
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_request_needs_a_chain() {
        let err = start_request("t/".to_string(), PackageKind::Transfer, None, None, None).unwrap_err();
        assert!(err.to_string().contains("--chain"));

        let req = start_request(
            "t/".to_string(),
            PackageKind::Sip,
            Some("C1".to_string()),
            None,
            Some("automated".to_string()),
        )
        .unwrap();
        assert_eq!(req.chain_id.as_deref(), Some("C1"));
        assert_eq!(req.processing_configuration.as_deref(), Some("automated"));
    }
}
