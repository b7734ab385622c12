//! Task backend
//!
//! Batches the tasks of a job per capability, dispatches full batches to the
//! workers on detached tokio tasks and hands completed tasks back to the job
//! in whatever order the batches finish.
//!
//! Flow for one job:
//! 1. `submit_task` moves each task into the backend; a batch that reaches
//!    `batch_size` is dispatched immediately
//! 2. `wait_for_results` flushes the partial batch and returns [`TaskResults`]
//! 3. `TaskResults::next` yields every submitted task exactly once, with its
//!    result recorded

mod transport;

pub use transport::{HttpTransport, Transport, TransportError};

use archflow_core::domain::task::{Task, TaskResult};
use archflow_core::dto::task::{BatchRequest, BatchResponse};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::repository::Repository;

/// Transport retries before a batch is given up
pub const MAX_RETRIES: u32 = 5;

/// Backoff applied between transport retries
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Dispatches tasks to remote workers
pub struct TaskBackend {
    dispatcher: Dispatcher,
    batch_size: usize,
    jobs: Mutex<HashMap<Uuid, JobDispatch>>,
}

#[derive(Clone)]
struct Dispatcher {
    transport: Arc<dyn Transport>,
    repository: Arc<dyn Repository>,
    retry: RetryPolicy,
}

/// Dispatch state of one job
struct JobDispatch {
    capability: Option<String>,
    batch: Vec<Task>,
    slots: HashMap<Uuid, TaskSlot>,
    outcomes_tx: mpsc::UnboundedSender<BatchOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<BatchOutcome>,
}

/// Task held until its batch reports back
enum TaskSlot {
    Pending(Task),
    Complete,
}

/// Results of one finished batch
struct BatchOutcome {
    results: HashMap<Uuid, TaskResult>,
}

impl JobDispatch {
    fn new() -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            capability: None,
            batch: Vec::new(),
            slots: HashMap::new(),
            outcomes_tx,
            outcomes_rx,
        }
    }

    fn take_batch(&mut self) -> Option<(String, Vec<Task>)> {
        if self.batch.is_empty() {
            return None;
        }
        let capability = self.capability.clone().unwrap_or_default();
        Some((capability, std::mem::take(&mut self.batch)))
    }
}

impl TaskBackend {
    /// Creates a backend
    ///
    /// # Arguments
    /// * `transport` - Channel to the workers
    /// * `repository` - Store receiving the task audit log
    /// * `batch_size` - Tasks per batch (at least 1)
    pub fn new(
        transport: Arc<dyn Transport>,
        repository: Arc<dyn Repository>,
        batch_size: usize,
    ) -> Self {
        Self {
            dispatcher: Dispatcher {
                transport,
                repository,
                retry: RetryPolicy::default(),
            },
            batch_size: batch_size.max(1),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.dispatcher.retry = retry;
        self
    }

    /// Adds a task to the job's current batch
    ///
    /// Never blocks: full batches are dispatched on a spawned task. Must be
    /// called from within a tokio runtime.
    pub fn submit_task(&self, job_id: Uuid, capability: &str, task: Task) {
        let mut ready = Vec::new();
        let mut jobs = self.jobs.lock();
        let dispatch = jobs.entry(job_id).or_insert_with(JobDispatch::new);

        if dispatch.capability.as_deref() != Some(capability) {
            ready.extend(dispatch.take_batch());
            dispatch.capability = Some(capability.to_string());
        }

        dispatch.slots.insert(task.id, TaskSlot::Pending(task.clone()));
        dispatch.batch.push(task);

        if dispatch.batch.len() >= self.batch_size {
            ready.extend(dispatch.take_batch());
        }

        for (capability, tasks) in ready {
            self.spawn_dispatch(job_id, capability, tasks, dispatch.outcomes_tx.clone());
        }
    }

    /// Flushes the job's partial batch and returns its result stream
    ///
    /// The job's dispatch state is removed, so the returned stream is the
    /// only way to collect the submitted tasks.
    pub fn wait_for_results(&self, job_id: Uuid) -> TaskResults {
        let Some(mut dispatch) = self.jobs.lock().remove(&job_id) else {
            return TaskResults::empty();
        };

        if let Some((capability, tasks)) = dispatch.take_batch() {
            self.spawn_dispatch(job_id, capability, tasks, dispatch.outcomes_tx.clone());
        }

        let JobDispatch {
            slots, outcomes_rx, ..
        } = dispatch;
        TaskResults::new(slots, outcomes_rx)
    }

    fn spawn_dispatch(
        &self,
        job_id: Uuid,
        capability: String,
        tasks: Vec<Task>,
        outcomes: mpsc::UnboundedSender<BatchOutcome>,
    ) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.dispatch(job_id, &capability, tasks).await;
            if outcomes.send(outcome).is_err() {
                debug!("Results for job {} arrived after it stopped waiting", job_id);
            }
        });
    }
}

// =============================================================================
// Batch Dispatch
// =============================================================================

impl Dispatcher {
    /// Runs one batch to completion; every task gets a result
    async fn dispatch(&self, job_id: Uuid, capability: &str, mut tasks: Vec<Task>) -> BatchOutcome {
        let request = BatchRequest::new(tasks.iter().map(Task::payload));
        debug!(
            "Dispatching batch {} ({} task(s)) of job {} to {}",
            request.batch_id,
            request.len(),
            job_id,
            capability
        );

        let submitted = self.submit_with_retry(capability, &request).await;
        let mut results: HashMap<Uuid, TaskResult> = match submitted {
            Ok(response) => {
                let mut returned = response.task_results;
                tasks
                    .iter()
                    .map(|task| {
                        let result = match returned.remove(&task.id) {
                            Some(payload) => TaskResult::from(payload),
                            None => {
                                warn!("Worker returned no result for task {}", task.id);
                                TaskResult::failure(format!("no result returned for task {}", task.id))
                            }
                        };
                        (task.id, result)
                    })
                    .collect()
            }
            Err(e) => {
                error!(
                    "Giving up on batch {} of job {} after {} retries: {}",
                    request.batch_id, job_id, MAX_RETRIES, e
                );
                let reason = e.to_string();
                tasks
                    .iter()
                    .map(|task| (task.id, TaskResult::failure(reason.clone())))
                    .collect()
            }
        };

        for task in &mut tasks {
            let Some(result) = results.get(&task.id).cloned() else {
                continue;
            };
            debug!(
                task_id = %task.id,
                exit_code = result.exit_code,
                "Task finished\nstdout: {}\nstderr: {}",
                result.stdout,
                result.stderr
            );
            if let Err(e) = task.record_result(result) {
                warn!("{}", e);
                results.remove(&task.id);
                continue;
            }
            write_output_files(task).await;
        }

        let repository = Arc::clone(&self.repository);
        tokio::spawn(async move {
            if let Err(e) = repository.log_tasks(job_id, &tasks).await {
                warn!("Failed to log tasks of job {}: {}", job_id, e);
            }
        });

        BatchOutcome { results }
    }

    /// Submits a batch, retrying transport errors with exponential backoff
    async fn submit_with_retry(
        &self,
        capability: &str,
        request: &BatchRequest,
    ) -> Result<BatchResponse, TransportError> {
        let mut attempt = 0;
        let mut delay = self.retry.initial_delay;

        loop {
            attempt += 1;

            match self.transport.submit_batch(capability, request).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!(
                            "Batch {} dispatched after {} attempt(s)",
                            request.batch_id, attempt
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt > MAX_RETRIES {
                        return Err(e);
                    }

                    warn!(
                        "Failed to dispatch batch {} (attempt {}/{}): {}",
                        request.batch_id,
                        attempt,
                        MAX_RETRIES + 1,
                        e
                    );
                    tokio::time::sleep(delay).await;

                    delay = (delay * 2).min(self.retry.max_delay);
                }
            }
        }
    }
}

/// Writes captured output to the task's stdout/stderr files
async fn write_output_files(task: &Task) {
    let Some(result) = task.result() else {
        return;
    };

    for (path, content) in [
        (task.stdout_file.as_deref(), &result.stdout),
        (task.stderr_file.as_deref(), &result.stderr),
    ] {
        let Some(path) = path else { continue };
        if let Err(e) = tokio::fs::write(path, content).await {
            warn!("Failed to write output of task {} to {}: {}", task.id, path, e);
        }
    }
}

// =============================================================================
// Result Stream
// =============================================================================

/// Completed tasks of one job, yielded as their batches finish
pub struct TaskResults {
    slots: HashMap<Uuid, TaskSlot>,
    outstanding: usize,
    ready: VecDeque<Task>,
    outcomes: Option<mpsc::UnboundedReceiver<BatchOutcome>>,
}

impl TaskResults {
    fn new(slots: HashMap<Uuid, TaskSlot>, outcomes: mpsc::UnboundedReceiver<BatchOutcome>) -> Self {
        let outstanding = slots
            .values()
            .filter(|slot| matches!(slot, TaskSlot::Pending(_)))
            .count();
        Self {
            slots,
            outstanding,
            ready: VecDeque::new(),
            outcomes: Some(outcomes),
        }
    }

    fn empty() -> Self {
        Self {
            slots: HashMap::new(),
            outstanding: 0,
            ready: VecDeque::new(),
            outcomes: None,
        }
    }

    /// Tasks not yet yielded
    pub fn remaining(&self) -> usize {
        self.outstanding + self.ready.len()
    }

    /// Next completed task, or `None` once every submitted task was yielded
    pub async fn next(&mut self) -> Option<Task> {
        loop {
            if let Some(task) = self.ready.pop_front() {
                return Some(task);
            }
            if self.outstanding == 0 {
                return None;
            }

            let outcome = match self.outcomes.as_mut() {
                Some(outcomes) => outcomes.recv().await,
                None => None,
            };
            match outcome {
                Some(outcome) => self.apply(outcome),
                None => self.fail_outstanding(),
            }
        }
    }

    fn apply(&mut self, outcome: BatchOutcome) {
        for (id, result) in outcome.results {
            let Some(slot) = self.slots.get_mut(&id) else {
                warn!("Result for unknown task {}", id);
                continue;
            };
            match std::mem::replace(slot, TaskSlot::Complete) {
                TaskSlot::Pending(mut task) => {
                    if let Err(e) = task.record_result(result) {
                        warn!("{}", e);
                    }
                    self.outstanding -= 1;
                    self.ready.push_back(task);
                }
                TaskSlot::Complete => warn!("Duplicate result for task {}", id),
            }
        }
    }

    /// Completes every pending task with the failure sentinel
    fn fail_outstanding(&mut self) {
        warn!("{} task(s) lost their batch; marking them failed", self.outstanding);
        for slot in self.slots.values_mut() {
            if let TaskSlot::Pending(mut task) = std::mem::replace(slot, TaskSlot::Complete) {
                if let Err(e) = task.record_result(TaskResult::failure("batch dispatch was lost")) {
                    warn!("{}", e);
                }
                self.ready.push_back(task);
            }
        }
        self.outstanding = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::test_support::{EchoTransport, FailingTransport, ShuffledTransport, fast_retries};
    use archflow_core::domain::task::TASK_FAILURE_EXIT_CODE;
    use std::collections::HashSet;

    fn backend(transport: Arc<dyn Transport>, batch_size: usize) -> (TaskBackend, Arc<InMemoryRepository>) {
        let repository = Arc::new(InMemoryRepository::new());
        let backend = TaskBackend::new(transport, repository.clone(), batch_size)
            .with_retry_policy(fast_retries());
        (backend, repository)
    }

    async fn collect(mut results: TaskResults) -> Vec<Task> {
        let mut tasks = Vec::new();
        while let Some(task) = results.next().await {
            tasks.push(task);
        }
        tasks
    }

    #[tokio::test]
    async fn test_every_task_is_returned_once_with_its_result() {
        let transport = Arc::new(ShuffledTransport::new());
        let (backend, _) = backend(transport.clone(), 3);
        let job_id = Uuid::new_v4();

        let mut submitted = HashMap::new();
        for i in 0..10 {
            let task = Task::new(format!("arg-{}", i));
            submitted.insert(task.id, task.arguments.clone());
            backend.submit_task(job_id, "echo_v0.0", task);
        }

        let tasks = collect(backend.wait_for_results(job_id)).await;
        assert_eq!(tasks.len(), 10);
        let mut sizes = transport.batch_sizes();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 3, 3, 3]);

        let ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 10);
        for task in &tasks {
            let result = task.result().unwrap();
            assert_eq!(result.exit_code, 0);
            assert_eq!(result.stdout, submitted[&task.id]);
        }
    }

    #[tokio::test]
    async fn test_wait_without_tasks_is_empty() {
        let (backend, _) = backend(Arc::new(EchoTransport::new()), 4);
        let mut results = backend.wait_for_results(Uuid::new_v4());
        assert_eq!(results.remaining(), 0);
        assert!(results.next().await.is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_gives_sentinel_after_retries() {
        let transport = Arc::new(FailingTransport::new());
        let (backend, _) = backend(transport.clone(), 8);
        let job_id = Uuid::new_v4();

        backend.submit_task(job_id, "echo_v0.0", Task::new("a"));
        backend.submit_task(job_id, "echo_v0.0", Task::new("b"));

        let tasks = collect(backend.wait_for_results(job_id)).await;
        assert_eq!(tasks.len(), 2);
        for task in &tasks {
            assert_eq!(task.exit_code(), Some(TASK_FAILURE_EXIT_CODE));
            assert!(!task.result().unwrap().stderr.is_empty());
        }
        assert_eq!(transport.calls(), MAX_RETRIES as usize + 1);
    }

    #[tokio::test]
    async fn test_missing_result_gets_sentinel() {
        let transport = Arc::new(EchoTransport::new().dropping("skip-me"));
        let (backend, _) = backend(transport, 8);
        let job_id = Uuid::new_v4();

        backend.submit_task(job_id, "echo_v0.0", Task::new("keep"));
        backend.submit_task(job_id, "echo_v0.0", Task::new("skip-me"));

        let tasks = collect(backend.wait_for_results(job_id)).await;
        let by_args: HashMap<&str, i32> = tasks
            .iter()
            .map(|t| (t.arguments.as_str(), t.exit_code().unwrap()))
            .collect();
        assert_eq!(by_args["keep"], 0);
        assert_eq!(by_args["skip-me"], TASK_FAILURE_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_completed_tasks_are_logged_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let stdout_path = dir.path().join("out.log");
        let (backend, repository) = backend(Arc::new(EchoTransport::new()), 8);
        let job_id = Uuid::new_v4();

        let task = Task::new("hello").with_output_files(
            Some(stdout_path.to_string_lossy().into_owned()),
            None,
        );
        let task_id = task.id;
        backend.submit_task(job_id, "echo_v0.0", task);
        let tasks = collect(backend.wait_for_results(job_id)).await;
        assert_eq!(tasks.len(), 1);

        assert_eq!(std::fs::read_to_string(&stdout_path).unwrap(), "hello");

        for _ in 0..50 {
            if !repository.logged_tasks(job_id).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let logged = repository.logged_tasks(job_id);
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].id, task_id);
        assert!(logged[0].is_done());
    }
}
