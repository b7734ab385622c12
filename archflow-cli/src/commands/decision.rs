//! Decision command handlers
//!
//! Lists jobs parked on a choice and answers them by job ID or prefix.

use anyhow::{Result, bail};
use archflow_client::SchedulerClient;
use archflow_core::dto::decision::AwaitingDecision;
use clap::Subcommand;
use colored::*;

use crate::config::Config;
use crate::id_resolver::resolve_decision;
use crate::types::IdOrPrefix;

/// Decision subcommands
#[derive(Subcommand)]
pub enum DecisionCommands {
    /// List parked decisions
    List,
    /// Answer a parked decision
    Make {
        /// Job ID or unambiguous prefix
        job_id: String,

        /// Value of one of the offered choices
        choice: String,
    },
}

pub async fn handle_decision_command(command: DecisionCommands, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);

    match command {
        DecisionCommands::List => list_decisions(&client).await,
        DecisionCommands::Make { job_id, choice } => make_decision(&client, &job_id, &choice).await,
    }
}

async fn list_decisions(client: &SchedulerClient) -> Result<()> {
    let decisions = client.list_decisions().await?;

    if decisions.is_empty() {
        println!("{}", "No decisions awaiting.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("{} decision(s) awaiting:", decisions.len()).bold()
    );
    println!();
    for decision in &decisions {
        print_decision(decision);
    }
    Ok(())
}

async fn make_decision(client: &SchedulerClient, job_id: &str, choice: &str) -> Result<()> {
    let decision = resolve_decision(client, &IdOrPrefix::parse(job_id)).await?;

    if !decision.choices.iter().any(|c| c.value == choice) {
        let offered: Vec<&str> = decision.choices.iter().map(|c| c.value.as_str()).collect();
        bail!(
            "'{}' is not offered by job {}; choose one of: {}",
            choice,
            decision.job_id,
            offered.join(", ")
        );
    }

    client.make_decision(decision.job_id, choice).await?;

    println!(
        "{}",
        format!("✓ Job {} resumed with '{}'", decision.job_id, choice)
            .green()
            .bold()
    );
    Ok(())
}

fn print_decision(decision: &AwaitingDecision) {
    println!("  {} {}", "▸".cyan(), decision.description.bold());
    println!("    Job:     {}", decision.job_id.to_string().cyan());
    println!("    Package: {}", decision.package_id.to_string().dimmed());
    println!("    Link:    {} ({})", decision.link_id.dimmed(), decision.kind);
    println!(
        "    Waiting: {}",
        decision
            .awaiting_since
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    for choice in &decision.choices {
        println!("      {} {}", choice.value.cyan(), choice.label);
    }
    println!();
}
