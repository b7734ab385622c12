//! Package Service
//!
//! Starting packages on a chain, reading them back, and the startup sweep.

use archflow_core::WorkflowError;
use archflow_core::domain::package::{
    Package, PackageStatus, SHARED_PATH_PLACEHOLDER, SharedDirectories,
};
use archflow_core::dto::package::{JobSummary, PackageDetails, StartPackage};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::jobs::{ChainError, DecisionError, JobChain};
use crate::queue::{ScheduleError, Scheduled, ScheduledJob};
use crate::repository::RepositoryError;

/// Service error type
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("package {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Starts processing a package
///
/// The chain is `chain_id` when given, otherwise the chain of the named
/// watched directory. The package is created on first sight, its persisted
/// context is restored and its first job is handed to the queue.
pub async fn start_package(state: &AppState, req: StartPackage) -> Result<Package> {
    let chain_id = resolve_chain(state, &req)?;
    let path = stored_path(&state.directories, &req.path)?;

    let package = state
        .repository
        .get_or_create_package(&path, req.kind, req.processing_configuration.as_deref())
        .await?;

    let context = JobChain::stored_context(state.repository.as_ref(), package.id).await?;
    let mut chain = JobChain::new(package.clone(), Arc::clone(&state.workflow), &chain_id, context)?;
    let job = chain
        .next()?
        .ok_or_else(|| ServiceError::Validation(format!("chain {} has no entry link", chain_id)))?;

    let previous = package.status;
    state
        .repository
        .update_package_status(package.id, PackageStatus::Processing)
        .await?;

    match state.queue.schedule_job(ScheduledJob::new(job, chain)) {
        Ok(Scheduled::Queued) => {
            info!("Package {} ({}) started on chain {}", package.id, package.kind, chain_id);
        }
        Ok(Scheduled::Deferred) => {
            info!("Package {} deferred until a slot frees up", package.id);
        }
        Err(ScheduleError::QueueFull) => {
            state
                .repository
                .update_package_status(package.id, previous)
                .await?;
            return Err(ScheduleError::QueueFull.into());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Package {
        status: PackageStatus::Processing,
        ..package
    })
}

/// Get a package with its jobs
pub async fn get_package(state: &AppState, id: Uuid) -> Result<PackageDetails> {
    let package = state
        .repository
        .find_package(id)
        .await?
        .ok_or(ServiceError::NotFound(id))?;
    let jobs = state.repository.list_jobs(id).await?;

    Ok(PackageDetails {
        package: package.into(),
        jobs: jobs.into_iter().map(JobSummary::from).collect(),
    })
}

/// Fails packages a previous run left unfinished
pub async fn fail_unfinished_packages(state: &AppState) -> Result<u64> {
    let count = state.repository.fail_unfinished_packages().await?;
    if count > 0 {
        warn!("Marked {} unfinished package(s) from a previous run as failed", count);
    }
    Ok(count)
}

fn resolve_chain(state: &AppState, req: &StartPackage) -> Result<String> {
    if let Some(chain_id) = &req.chain_id {
        state.workflow.chain(chain_id)?;
        return Ok(chain_id.clone());
    }

    let Some(watched) = &req.watched_directory else {
        return Err(ServiceError::Validation(
            "either chain_id or watched_directory is required".to_string(),
        ));
    };
    state
        .workflow
        .watched_directory(watched)
        .map(|w| w.chain_id.clone())
        .ok_or_else(|| ServiceError::Validation(format!("unknown watched directory '{}'", watched)))
}

/// Package location as stored: shared directory abbreviated, trailing slash
fn stored_path(dirs: &SharedDirectories, path: &str) -> Result<String> {
    let path = path.trim();
    if path.is_empty() {
        return Err(ServiceError::Validation("package path is required".to_string()));
    }

    let stored = if path.starts_with(SHARED_PATH_PLACEHOLDER) {
        path.to_string()
    } else if path.starts_with('/') {
        dirs.abbreviate(&format!("{}/", path.trim_end_matches('/')))
    } else {
        format!("{}{}", SHARED_PATH_PLACEHOLDER, path)
    };
    Ok(format!("{}/", stored.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobProgress, QueueLimits};
    use crate::repository::Repository;
    use crate::service::decision_service;
    use crate::test_support::{TestEnvironment, e2e_processing_config};
    use archflow_core::domain::job::JobStatus;
    use archflow_core::domain::package::PackageKind;
    use std::time::Duration;

    fn limits() -> QueueLimits {
        QueueLimits {
            worker_count: 2,
            max_concurrent_packages: 2,
            max_queued_packages: 2,
            queued_package_timeout: None,
        }
    }

    fn start_request(path: &str) -> StartPackage {
        StartPackage {
            path: path.to_string(),
            kind: PackageKind::Transfer,
            chain_id: None,
            watched_directory: Some("activeTransfers/standardTransfer/".to_string()),
            processing_configuration: Some("automated".to_string()),
        }
    }

    #[test]
    fn test_stored_path() {
        let dirs = SharedDirectories::new("/var/archflow/shared");
        assert_eq!(
            stored_path(&dirs, "/var/archflow/shared/currentlyProcessing/t").unwrap(),
            "%sharedPath%currentlyProcessing/t/"
        );
        assert_eq!(stored_path(&dirs, "watchedDirectories/t/").unwrap(), "%sharedPath%watchedDirectories/t/");
        assert_eq!(stored_path(&dirs, "/mnt/elsewhere/t").unwrap(), "/mnt/elsewhere/t/");
        assert!(stored_path(&dirs, "  ").is_err());
    }

    #[tokio::test]
    async fn test_start_requires_a_known_chain() {
        let env = TestEnvironment::new();
        let state = env.app_state(limits());

        let mut req = start_request("t/");
        req.watched_directory = None;
        assert!(matches!(
            start_package(&state, req.clone()).await,
            Err(ServiceError::Validation(_))
        ));

        req.chain_id = Some("C9".to_string());
        assert!(matches!(
            start_package(&state, req).await,
            Err(ServiceError::Workflow(WorkflowError::UnknownChain(_)))
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let env = TestEnvironment::new();
        let state = env.app_state(limits());

        let package = start_package(&state, start_request("t/")).await.unwrap();
        assert_eq!(package.status, PackageStatus::Processing);
        let err = start_package(&state, start_request("t/")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Schedule(ScheduleError::PackageActive(id)) if id == package.id));
    }

    #[tokio::test]
    async fn test_startup_sweep_fails_unfinished_packages() {
        let env = TestEnvironment::new();
        let state = env.app_state(limits());

        let package = start_package(&state, start_request("t/")).await.unwrap();
        assert_eq!(fail_unfinished_packages(&state).await.unwrap(), 1);
        let details = get_package(&state, package.id).await.unwrap();
        assert_eq!(details.package.status, PackageStatus::Failed);

        assert!(matches!(
            get_package(&state, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_runs_until_chain_decision() {
        let env = TestEnvironment::new().with_processing_config("automated", e2e_processing_config());
        let state = env.app_state(limits());

        let id = Uuid::new_v4();
        let relative = format!("currentlyProcessing/images-{}/", id);
        let objects = env.shared.path().join(&relative).join("objects");
        std::fs::create_dir_all(&objects).unwrap();
        for name in ["a.tif", "b.tif", "c.tif"] {
            std::fs::write(objects.join(name), name).unwrap();
        }

        let package = start_package(&state, start_request(&relative)).await.unwrap();
        assert_eq!(package.id, id);

        let mut links = Vec::new();
        loop {
            let handle = state
                .queue
                .process_one_job(Duration::from_secs(5))
                .await
                .expect("a ready job");
            let report = handle.await.unwrap();
            links.push(report.link_id.clone());
            if report.progress == JobProgress::AwaitingDecision {
                break;
            }
            assert_eq!(report.progress, JobProgress::Continued);
        }

        assert_eq!(links, ["L1", "L2", "L3", "L4", "L5"]);
        assert_eq!(env.transport.batch_sizes(), vec![1, 3, 1]);
        assert!(
            state
                .queue
                .process_one_job(Duration::from_millis(20))
                .await
                .is_none()
        );

        let awaiting = decision_service::list_awaiting(&state);
        assert_eq!(awaiting.len(), 1);
        assert_eq!(awaiting[0].link_id, "L5");
        let values: Vec<&str> = awaiting[0].choices.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, ["C2", "C3"]);
        assert_eq!(awaiting[0].choices[0].label, "Store AIP");

        let report = decision_service::make_decision(&state, awaiting[0].job_id, "C2")
            .await
            .unwrap();
        assert_eq!(report.progress, JobProgress::Continued);

        let report = state
            .queue
            .process_one_job(Duration::from_secs(5))
            .await
            .unwrap()
            .await
            .unwrap();
        assert_eq!(report.link_id, "L6");
        assert_eq!(report.progress, JobProgress::Finished(PackageStatus::Done));
        assert_eq!(env.transport.batch_sizes(), vec![1, 3, 1, 1]);
        assert_eq!(
            env.transport.received().last().map(String::as_str),
            Some(format!("--location=/api/v2/location/default/ --uuid={}", id).as_str())
        );

        let details = get_package(&state, id).await.unwrap();
        assert_eq!(details.package.status, PackageStatus::Done);
        assert_eq!(details.jobs.len(), 6);
        assert!(details.jobs.iter().all(|j| j.status == JobStatus::CompletedSuccessfully));
        assert_eq!(
            env.repository.find_decision(id, "L5").await.unwrap().as_deref(),
            Some("C2")
        );
        assert_eq!(state.queue.active_package_count(), 0);
    }
}
