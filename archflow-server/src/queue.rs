//! Package queue
//!
//! Schedules jobs so that each package has at most one job in flight while
//! jobs of different packages run concurrently. A package is active from
//! its first scheduled job until its chain is exhausted or fails; packages
//! arriving while the active set is full wait in a deferred queue per unit
//! type and are activated DIPs first, then SIPs, then transfers.
//!
//! Executions are bounded by a semaphore. A job waiting for a decision is
//! parked in `waiting_choices` and holds neither a permit nor a task.

use archflow_core::domain::job::JobStatus;
use archflow_core::domain::package::{PackageKind, PackageStatus};
use archflow_core::dto::decision::AwaitingDecision;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::jobs::{Completion, DecisionError, Job, JobChain, JobEnvironment, JobOutcome};

/// Errors returned by [`PackageQueue::schedule_job`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("package {0} already has a job in flight")]
    PackageActive(Uuid),

    #[error("deferred package queue is full")]
    QueueFull,
}

/// Limits applied by the queue
#[derive(Debug, Clone, Copy)]
pub struct QueueLimits {
    /// Concurrent job executions
    pub worker_count: usize,
    pub max_concurrent_packages: usize,
    pub max_queued_packages: usize,
    /// Deferred packages older than this are failed instead of activated
    pub queued_package_timeout: Option<Duration>,
}

/// A job travelling with the chain that issued it
#[derive(Debug)]
pub struct ScheduledJob {
    pub job: Job,
    pub chain: JobChain,
}

impl ScheduledJob {
    pub fn new(job: Job, chain: JobChain) -> Self {
        Self { job, chain }
    }
}

/// Whether a scheduled job can run right away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    Queued,
    Deferred,
}

/// What happened to a package after one of its jobs ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobProgress {
    /// The package's next job was queued
    Continued,
    /// The job is parked until a decision is made
    AwaitingDecision,
    /// The package left the queue with this status
    Finished(PackageStatus),
}

/// Summary of one job execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: Uuid,
    pub package_id: Uuid,
    pub link_id: String,
    pub exit_code: Option<i32>,
    pub progress: JobProgress,
}

struct DeferredPackage {
    scheduled: ScheduledJob,
    deferred_at: Instant,
}

struct ParkedJob {
    scheduled: ScheduledJob,
    since: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    job_queue: VecDeque<ScheduledJob>,
    active_packages: HashMap<Uuid, PackageKind>,
    deferred_dips: VecDeque<DeferredPackage>,
    deferred_sips: VecDeque<DeferredPackage>,
    deferred_transfers: VecDeque<DeferredPackage>,
    waiting_choices: HashMap<Uuid, ParkedJob>,
}

impl QueueState {
    fn deferred_mut(&mut self, kind: PackageKind) -> &mut VecDeque<DeferredPackage> {
        match kind {
            PackageKind::Dip => &mut self.deferred_dips,
            PackageKind::Sip => &mut self.deferred_sips,
            PackageKind::Transfer => &mut self.deferred_transfers,
        }
    }

    fn deferred_len(&self) -> usize {
        self.deferred_dips.len() + self.deferred_sips.len() + self.deferred_transfers.len()
    }

    fn is_deferred(&self, package_id: Uuid) -> bool {
        self.deferred_dips
            .iter()
            .chain(&self.deferred_sips)
            .chain(&self.deferred_transfers)
            .any(|d| d.scheduled.job.package.id == package_id)
    }

    fn pop_deferred(&mut self) -> Option<DeferredPackage> {
        self.deferred_dips
            .pop_front()
            .or_else(|| self.deferred_sips.pop_front())
            .or_else(|| self.deferred_transfers.pop_front())
    }
}

/// Scheduler of package jobs
pub struct PackageQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    permits: Arc<Semaphore>,
    limits: QueueLimits,
    env: Arc<JobEnvironment>,
    shutdown: CancellationToken,
}

impl PackageQueue {
    pub fn new(env: Arc<JobEnvironment>, limits: QueueLimits) -> Self {
        let limits = QueueLimits {
            worker_count: limits.worker_count.max(1),
            max_concurrent_packages: limits.max_concurrent_packages.max(1),
            ..limits
        };
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Notify::new(),
            permits: Arc::new(Semaphore::new(limits.worker_count)),
            limits,
            env,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token cancelled when the queue shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn active_package_count(&self) -> usize {
        self.state.lock().active_packages.len()
    }

    pub fn deferred_package_count(&self) -> usize {
        self.state.lock().deferred_len()
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Queues the first job of a package
    ///
    /// # Errors
    /// [`ScheduleError::PackageActive`] when the package is already active or
    /// deferred, [`ScheduleError::QueueFull`] when it would have to wait and
    /// the deferred queue is full.
    pub fn schedule_job(&self, scheduled: ScheduledJob) -> Result<Scheduled, ScheduleError> {
        let package_id = scheduled.job.package.id;
        let kind = scheduled.job.package.kind;
        let mut state = self.state.lock();

        if state.active_packages.contains_key(&package_id) || state.is_deferred(package_id) {
            return Err(ScheduleError::PackageActive(package_id));
        }

        if state.active_packages.len() >= self.limits.max_concurrent_packages {
            if state.deferred_len() >= self.limits.max_queued_packages {
                return Err(ScheduleError::QueueFull);
            }
            debug!("Deferring {} {}", kind, package_id);
            state.deferred_mut(kind).push_back(DeferredPackage {
                scheduled,
                deferred_at: Instant::now(),
            });
            return Ok(Scheduled::Deferred);
        }

        state.active_packages.insert(package_id, kind);
        state.job_queue.push_back(scheduled);
        drop(state);

        self.ready.notify_one();
        Ok(Scheduled::Queued)
    }

    fn requeue(&self, scheduled: ScheduledJob) {
        self.state.lock().job_queue.push_back(scheduled);
        self.ready.notify_one();
    }

    /// Waits up to `timeout` for a ready job
    async fn pop_job(&self, timeout: Duration) -> Option<ScheduledJob> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.ready.notified();
            if let Some(scheduled) = self.state.lock().job_queue.pop_front() {
                return Some(scheduled);
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => return None,
                _ = self.shutdown.cancelled() => return None,
            }
        }
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Runs the next ready job on a spawned task
    ///
    /// Returns `None` when no job became ready within `timeout` or the queue
    /// is shutting down.
    pub async fn process_one_job(self: &Arc<Self>, timeout: Duration) -> Option<JoinHandle<JobReport>> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok()?,
            _ = self.shutdown.cancelled() => return None,
        };
        let scheduled = self.pop_job(timeout).await?;

        let queue = Arc::clone(self);
        Some(tokio::spawn(async move {
            let report = queue.execute(scheduled).await;
            drop(permit);
            report
        }))
    }

    async fn execute(&self, scheduled: ScheduledJob) -> JobReport {
        let ScheduledJob { mut job, chain } = scheduled;
        let repository = &self.env.repository;

        if let Err(e) = repository.create_job(&job.record()).await {
            warn!("Failed to record job {}: {}", job.id, e);
        }

        match job.execute(&self.env).await {
            Ok(JobOutcome::Completed(completion)) => self.complete(job, chain, completion).await,
            Ok(JobOutcome::AwaitingDecision(_)) => {
                let report = JobReport {
                    job_id: job.id,
                    package_id: job.package.id,
                    link_id: job.link.id.clone(),
                    exit_code: None,
                    progress: JobProgress::AwaitingDecision,
                };
                self.state.lock().waiting_choices.insert(
                    job.id,
                    ParkedJob {
                        scheduled: ScheduledJob::new(job, chain),
                        since: Utc::now(),
                    },
                );
                report
            }
            Err(e) => {
                error!(
                    "Job {} of package {} failed at link {}: {}",
                    job.id, job.package.id, job.link.id, e
                );
                if let Err(e) = repository
                    .update_job_status(job.id, JobStatus::Failed, None)
                    .await
                {
                    warn!("Failed to update job {}: {}", job.id, e);
                }
                self.finish_package(job.package.id, PackageStatus::Failed).await;
                JobReport {
                    job_id: job.id,
                    package_id: job.package.id,
                    link_id: job.link.id.clone(),
                    exit_code: None,
                    progress: JobProgress::Finished(PackageStatus::Failed),
                }
            }
        }
    }

    /// Advances the chain past a completed job and queues what follows
    async fn complete(&self, job: Job, mut chain: JobChain, completion: Completion) -> JobReport {
        let repository = &self.env.repository;
        let package_id = job.package.id;
        let mut report = JobReport {
            job_id: job.id,
            package_id,
            link_id: job.link.id.clone(),
            exit_code: Some(completion.exit_code),
            progress: JobProgress::Continued,
        };

        let advanced = chain.advance(&completion);
        let status = match &advanced {
            Ok(advance) => advance.status,
            Err(_) => job.link.status_for(completion.exit_code),
        };
        if let Err(e) = repository
            .update_job_status(job.id, status, Some(completion.exit_code))
            .await
        {
            warn!("Failed to update job {}: {}", job.id, e);
        }

        let next = advanced.and_then(|advance| {
            if advance.exhausted {
                Ok(None)
            } else {
                chain.next()
            }
        });

        match next {
            Ok(Some(next_job)) => {
                debug!("Package {} continues with link {}", package_id, next_job.link.id);
                self.requeue(ScheduledJob::new(next_job, chain));
            }
            Ok(None) => {
                info!("Package {} completed its workflow", package_id);
                self.finish_package(package_id, PackageStatus::Done).await;
                report.progress = JobProgress::Finished(PackageStatus::Done);
            }
            Err(e) => {
                error!("Package {} stopped after link {}: {}", package_id, job.link.id, e);
                self.finish_package(package_id, PackageStatus::Failed).await;
                report.progress = JobProgress::Finished(PackageStatus::Failed);
            }
        }

        report
    }

    /// Records the final status, frees the package slot and activates deferred packages
    async fn finish_package(&self, package_id: Uuid, status: PackageStatus) {
        if let Err(e) = self
            .env
            .repository
            .update_package_status(package_id, status)
            .await
        {
            warn!("Failed to update package {}: {}", package_id, e);
        }

        let mut expired = Vec::new();
        let mut activated = 0;
        {
            let mut state = self.state.lock();
            state.active_packages.remove(&package_id);

            while state.active_packages.len() < self.limits.max_concurrent_packages {
                let Some(deferred) = state.pop_deferred() else {
                    break;
                };
                let package = &deferred.scheduled.job.package;

                if self
                    .limits
                    .queued_package_timeout
                    .is_some_and(|timeout| deferred.deferred_at.elapsed() > timeout)
                {
                    expired.push(package.id);
                    continue;
                }

                state.active_packages.insert(package.id, package.kind);
                state.job_queue.push_back(deferred.scheduled);
                activated += 1;
            }
        }

        for _ in 0..activated {
            self.ready.notify_one();
        }

        for id in expired {
            warn!("Package {} waited too long in the deferred queue", id);
            if let Err(e) = self
                .env
                .repository
                .update_package_status(id, PackageStatus::Failed)
                .await
            {
                warn!("Failed to update package {}: {}", id, e);
            }
        }
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Jobs parked until a user decides, oldest first
    pub fn awaiting_decisions(&self) -> Vec<AwaitingDecision> {
        let state = self.state.lock();
        let mut decisions: Vec<AwaitingDecision> = state
            .waiting_choices
            .values()
            .map(|parked| {
                let job = &parked.scheduled.job;
                AwaitingDecision {
                    job_id: job.id,
                    package_id: job.package.id,
                    chain_id: job.chain_id.clone(),
                    link_id: job.link.id.clone(),
                    kind: job.kind(),
                    description: job.link.description.text().to_string(),
                    choices: job.pending_choices().map(<[_]>::to_vec).unwrap_or_default(),
                    awaiting_since: parked.since,
                }
            })
            .collect();
        decisions.sort_by_key(|d| d.awaiting_since);
        decisions
    }

    /// Resolves a parked decision and continues its package
    ///
    /// Once the choice is accepted the package continues on a spawned task,
    /// so dropping the returned future does not lose the job.
    ///
    /// # Errors
    /// [`DecisionError::NotFound`] when no job with this id is parked and
    /// [`DecisionError::InvalidChoice`] when `choice` was not offered; the
    /// job stays parked in that case.
    pub async fn decide(self: &Arc<Self>, job_id: Uuid, choice: &str) -> Result<JobReport, DecisionError> {
        let mut parked = self
            .state
            .lock()
            .waiting_choices
            .remove(&job_id)
            .ok_or(DecisionError::NotFound(job_id))?;

        let completion = match parked.scheduled.job.decide(choice) {
            Ok(completion) => completion,
            Err(e) => {
                self.state.lock().waiting_choices.insert(job_id, parked);
                return Err(e);
            }
        };

        let ScheduledJob { job, chain } = parked.scheduled;
        info!("Decision '{}' made for job {} at link {}", choice, job_id, job.link.id);

        let queue = Arc::clone(self);
        let choice = choice.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = queue
                .env
                .decisions
                .remember(job.package.id, &job.link.id, &choice)
                .await
            {
                warn!("Failed to store decision for job {}: {}", job_id, e);
            }
            queue.complete(job, chain, completion).await
        });

        Ok(handle.await?)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Processes jobs until the queue shuts down
    pub async fn run(self: Arc<Self>, poll_interval: Duration) {
        info!(
            "Package queue started ({} worker(s), {} concurrent package(s))",
            self.limits.worker_count, self.limits.max_concurrent_packages
        );

        while !self.shutdown.is_cancelled() {
            if let Some(handle) = self.process_one_job(poll_interval).await {
                tokio::spawn(async move {
                    if let Err(e) = handle.await {
                        error!("Job task panicked: {}", e);
                    }
                });
            }
        }

        info!("Package queue stopped");
    }

    /// Waits until no job is executing
    pub async fn wait_idle(&self) {
        let permits = u32::try_from(self.limits.worker_count).unwrap_or(u32::MAX);
        match self.permits.acquire_many(permits).await {
            Ok(all) => drop(all),
            Err(e) => warn!("Semaphore closed while waiting for jobs: {}", e),
        }
    }
}
