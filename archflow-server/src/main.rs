//! Archflow Scheduler
//!
//! Walks archival packages through a workflow graph of chains and links.
//!
//! Architecture:
//! - Configuration: settings from environment or defaults
//! - Workflow: the graph, loaded and validated once at startup
//! - Repository: PostgreSQL, or process memory when no database is configured
//! - Backend: batches tasks and dispatches them to the worker gateway
//! - Queue: one job in flight per package, bounded concurrency
//! - API: HTTP endpoints for packages, decisions and the workflow

use anyhow::{Context, Result};
use archflow_core::Workflow;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod backend;
pub mod config;
pub mod db;
pub mod files;
pub mod jobs;
pub mod queue;
pub mod repository;
pub mod service;
#[cfg(test)]
mod test_support;

use crate::backend::{HttpTransport, TaskBackend};
use crate::config::Config;
use crate::files::StoreFileEnumerator;
use crate::jobs::{DecisionResolver, JobEnvironment};
use crate::queue::{PackageQueue, QueueLimits};
use crate::repository::{InMemoryRepository, PgRepository, Repository};
use crate::service::{AppState, package_service};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "archflow_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Archflow Scheduler...");

    let config = load_config()?;
    info!(
        "Loaded configuration: workflow={}, gateway={}, workers={}",
        config.workflow_file.display(),
        config.worker_gateway_url,
        config.worker_count
    );

    let workflow = Arc::new(load_workflow(&config)?);
    info!("Workflow loaded: {}", workflow);

    let repository = connect_repository(&config).await?;
    let directories = config.shared_directories();

    let transport = Arc::new(HttpTransport::new(
        config.worker_gateway_url.clone(),
        config.dispatch_timeout,
    ));
    let backend = Arc::new(TaskBackend::new(
        transport,
        Arc::clone(&repository),
        config.task_batch_size,
    ));

    let env = JobEnvironment {
        workflow: Arc::clone(&workflow),
        repository: Arc::clone(&repository),
        backend,
        files: Arc::new(StoreFileEnumerator::new(Arc::clone(&repository))),
        decisions: DecisionResolver::new(
            Arc::clone(&repository),
            config.processing_config_dir.clone(),
            config.interactive_decisions,
        ),
        directories: directories.clone(),
    };

    let queue = Arc::new(PackageQueue::new(
        Arc::new(env),
        QueueLimits {
            worker_count: config.worker_count,
            max_concurrent_packages: config.max_concurrent_packages,
            max_queued_packages: config.max_queued_packages,
            queued_package_timeout: config.queued_package_timeout,
        },
    ));

    let state = AppState {
        workflow,
        repository,
        queue: Arc::clone(&queue),
        directories,
    };

    package_service::fail_unfinished_packages(&state)
        .await
        .context("Failed to sweep unfinished packages")?;

    let dispatcher = tokio::spawn(Arc::clone(&queue).run(config.poll_interval));

    // Build router with all API endpoints
    let app = api::create_router(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    let shutdown = queue.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            shutdown.cancel();
        })
        .await
        .context("HTTP server failed")?;

    queue.shutdown();
    if let Err(e) = dispatcher.await {
        tracing::error!("Dispatcher task failed: {}", e);
    }
    queue.wait_idle().await;
    info!("Archflow Scheduler stopped");

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            info!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn load_workflow(config: &Config) -> Result<Workflow> {
    let file = File::open(&config.workflow_file).with_context(|| {
        format!(
            "Failed to open workflow {}",
            config.workflow_file.display()
        )
    })?;
    Workflow::load(BufReader::new(file)).with_context(|| {
        format!(
            "Invalid workflow {}",
            config.workflow_file.display()
        )
    })
}

/// Connects to PostgreSQL when configured, otherwise keeps state in memory
async fn connect_repository(config: &Config) -> Result<Arc<dyn Repository>> {
    let Some(database_url) = &config.database_url else {
        info!("DATABASE_URL not set; using the in-memory store");
        return Ok(Arc::new(InMemoryRepository::new()));
    };

    info!("Connecting to database...");
    let pool = db::create_pool(database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(Arc::new(PgRepository::new(pool)))
}
