//! Workflow command handlers
//!
//! Loads a workflow document with the same validation the scheduler applies
//! at startup, without contacting the scheduler.

use anyhow::{Context, Result};
use archflow_core::Workflow;
use archflow_core::workflow::{JobKind, Link, LinkConfig};
use clap::Subcommand;
use colored::*;
use std::collections::{BTreeSet, VecDeque};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Workflow subcommands
#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// Check that a workflow document is valid
    Validate {
        /// Path to the workflow JSON document
        file: PathBuf,
    },
    /// Print the chains of a workflow, or the links of one chain
    Show {
        /// Path to the workflow JSON document
        file: PathBuf,

        /// Chain whose reachable links should be listed
        #[arg(short, long)]
        chain: Option<String>,
    },
}

pub fn handle_workflow_command(command: WorkflowCommands) -> Result<()> {
    match command {
        WorkflowCommands::Validate { file } => validate_workflow(&file),
        WorkflowCommands::Show { file, chain } => show_workflow(&file, chain.as_deref()),
    }
}

fn load(file: &Path) -> Result<Workflow> {
    let reader = File::open(file)
        .with_context(|| format!("Failed to open workflow file: {}", file.display()))?;
    Workflow::load(BufReader::new(reader))
        .with_context(|| format!("Invalid workflow: {}", file.display()))
}

fn validate_workflow(file: &Path) -> Result<()> {
    let workflow = load(file)?;

    println!("{}", "✓ Workflow is valid".green().bold());
    println!("  {}", workflow.to_string().dimmed());
    Ok(())
}

fn show_workflow(file: &Path, chain_id: Option<&str>) -> Result<()> {
    let workflow = load(file)?;

    match chain_id {
        Some(chain_id) => print_chain(&workflow, chain_id),
        None => {
            print_overview(&workflow);
            Ok(())
        }
    }
}

fn print_overview(workflow: &Workflow) {
    println!("{}", format!("{}", workflow).bold());
    println!();

    println!("{}", "Chains:".bold());
    for chain in workflow.chains() {
        println!(
            "  {} {} {}",
            "▸".cyan(),
            chain.id.cyan(),
            chain.description.text()
        );
        println!("    Entry: {}", chain.link_id.dimmed());
    }

    let watched: Vec<_> = workflow.watched_directories().collect();
    if !watched.is_empty() {
        println!();
        println!("{}", "Watched directories:".bold());
        for dir in watched {
            println!(
                "  {} {} ({}) → {}",
                "▸".cyan(),
                dir.path,
                dir.unit_type,
                dir.chain_id.cyan()
            );
        }
    }
}

fn print_chain(workflow: &Workflow, chain_id: &str) -> Result<()> {
    let chain = workflow.chain(chain_id)?;

    println!("{}", "Chain Details:".bold());
    println!("  ID:          {}", chain.id.cyan());
    println!("  Description: {}", chain.description.text());
    println!();
    println!("{}", "Links:".bold());

    for link_id in reachable_links(workflow, &chain.link_id)? {
        print_link(workflow.link(&link_id)?);
    }
    Ok(())
}

/// Links reachable from `entry` without changing chains, in visiting order
fn reachable_links(workflow: &Workflow, entry: &str) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut order = Vec::new();
    let mut pending = VecDeque::from([entry.to_string()]);

    while let Some(link_id) = pending.pop_front() {
        if !seen.insert(link_id.clone()) {
            continue;
        }
        let link = workflow.link(&link_id)?;
        order.push(link_id);

        for next in link.referenced_links() {
            if !seen.contains(next) {
                pending.push_back(next.to_string());
            }
        }
    }
    Ok(order)
}

fn print_link(link: &Link) {
    let kind = JobKind::for_link(link);
    let end = if link.is_terminal() { " (end)".yellow().to_string() } else { String::new() };
    println!(
        "  {} {} {}{}",
        "▸".cyan(),
        link.id.cyan(),
        link.description.text(),
        end
    );
    println!("    Kind: {}", kind.to_string().dimmed());

    for (code, route) in &link.exit_codes {
        let target = route.link_id.as_deref().unwrap_or("-");
        println!("    {} → {} [{}]", code, target, route.job_status);
    }
    if let Some(fallback) = &link.fallback_link_id {
        println!("    * → {} [{}]", fallback, link.fallback_job_status);
    }
    if let LinkConfig::NextChainDecision { chain_choices } = &link.config {
        println!("    Chains: {}", chain_choices.join(", ").dimmed());
    }
}
