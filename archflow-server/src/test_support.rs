//! Shared test fixtures: fake worker transports, a small workflow and a
//! ready-made job environment over the in-memory repository.

use archflow_core::domain::job::JobStatus;
use archflow_core::domain::package::SharedDirectories;
use archflow_core::dto::task::{BatchRequest, BatchResponse, TaskResultPayload};
use archflow_core::workflow::{Label, Link, Workflow};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::backend::{RetryPolicy, TaskBackend, Transport, TransportError};
use crate::files::StoreFileEnumerator;
use crate::jobs::{DecisionResolver, JobEnvironment};
use crate::queue::{PackageQueue, QueueLimits};
use crate::repository::InMemoryRepository;
use crate::service::AppState;

/// Arguments containing this marker make [`EchoTransport`] exit with 3
pub const FAIL_MARKER: &str = "fail-me";

pub fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

// =============================================================================
// Transports
// =============================================================================

/// Worker that prints its arguments and exits 0
#[derive(Default)]
pub struct EchoTransport {
    batches: Mutex<Vec<usize>>,
    received: Mutex<Vec<String>>,
    dropped: HashSet<String>,
}

impl EchoTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Omits the result of tasks whose arguments equal `arguments`
    pub fn dropping(mut self, arguments: &str) -> Self {
        self.dropped.insert(arguments.to_string());
        self
    }

    /// Size of every batch received, in arrival order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }

    /// Arguments of every task received, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    fn answer(&self, batch: &BatchRequest) -> BatchResponse {
        self.batches.lock().push(batch.len());
        let mut received = self.received.lock();

        let task_results = batch
            .tasks
            .values()
            .inspect(|task| received.push(task.arguments.clone()))
            .filter(|task| !self.dropped.contains(&task.arguments))
            .map(|task| {
                let exit_code = if task.arguments.contains(FAIL_MARKER) { 3 } else { 0 };
                let result = TaskResultPayload {
                    exit_code,
                    stdout: task.arguments.clone(),
                    stderr: String::new(),
                    finished_timestamp: Some("2024-05-01T10:20:30.123456".to_string()),
                };
                (task.uuid, result)
            })
            .collect();

        BatchResponse { task_results }
    }
}

#[async_trait]
impl Transport for EchoTransport {
    async fn submit_batch(
        &self,
        _capability: &str,
        batch: &BatchRequest,
    ) -> Result<BatchResponse, TransportError> {
        Ok(self.answer(batch))
    }
}

/// Echo worker whose batches finish after a batch-dependent delay
#[derive(Default)]
pub struct ShuffledTransport {
    echo: EchoTransport,
}

impl ShuffledTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.echo.batch_sizes()
    }
}

#[async_trait]
impl Transport for ShuffledTransport {
    async fn submit_batch(
        &self,
        capability: &str,
        batch: &BatchRequest,
    ) -> Result<BatchResponse, TransportError> {
        let delay = u64::from(batch.batch_id.as_bytes()[0] % 16);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.echo.submit_batch(capability, batch).await
    }
}

/// Gateway that never has a worker available
#[derive(Default)]
pub struct FailingTransport {
    calls: AtomicUsize,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn submit_batch(
        &self,
        capability: &str,
        _batch: &BatchRequest,
    ) -> Result<BatchResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Unavailable(capability.to_string()))
    }
}

// =============================================================================
// Workflow
// =============================================================================

/// Standalone link routing nowhere, for exercising a single job
pub fn link_fixture(id: &str, config: Value) -> Link {
    Link {
        id: id.to_string(),
        description: Label::from("Fixture"),
        group: Label::default(),
        config: serde_json::from_value(config).unwrap(),
        exit_codes: BTreeMap::new(),
        fallback_link_id: None,
        fallback_job_status: JobStatus::Failed,
        end: true,
    }
}

/// Choices printed by the storage location script of the workflow fixture
pub const LOCATION_CHOICES: &str =
    r#"{"default": {"description": "Default Location", "uri": "/api/v2/location/default/"}}"#;

/// Transfer workflow: identify files, pick a storage location, then choose a chain
///
/// C1: L1 (directory) -> L2 (files) -> L3 (output) -> L4 (output decision)
/// -> L5 (next chain decision), offering C2 (store) and C3 (reject).
pub fn workflow_document() -> Value {
    let ok = "Completed successfully";
    json!({
        "chains": {
            "C1": {"description": {"en": "Approve standard transfer"}, "link_id": "L1"},
            "C2": {"description": {"en": "Store AIP"}, "link_id": "L6"},
            "C3": {"description": {"en": "Reject transfer"}, "link_id": "LFAIL"}
        },
        "links": {
            "L1": {
                "description": {"en": "Verify transfer structure"},
                "group": {"en": "Verify transfer compliance"},
                "config": {"kind": "directory_client_script", "execute": "verify_v0.0",
                           "arguments": "--dir=%SIPDirectory% --objects=%relativeLocation%",
                           "filter_subdir": "objects"},
                "exit_codes": {"0": {"link_id": "L2", "job_status": ok}},
                "fallback_link_id": "LFAIL",
                "fallback_job_status": "Failed"
            },
            "L2": {
                "description": {"en": "Identify file format"},
                "config": {"kind": "files_client_script", "execute": "identify_v1.0",
                           "arguments": "--file-uuid=%fileUUID% --path=%relativeLocation%",
                           "filter_subdir": "objects"},
                "exit_codes": {"0": {"link_id": "L3", "job_status": ok}},
                "fallback_link_id": "LFAIL",
                "fallback_job_status": "Failed"
            },
            "L3": {
                "description": {"en": "Retrieve AIP storage locations"},
                "config": {"kind": "output_client_script", "execute": "storage_locations_v0.0",
                           "arguments": LOCATION_CHOICES},
                "exit_codes": {"0": {"link_id": "L4", "job_status": ok}},
                "fallback_link_id": "LFAIL",
                "fallback_job_status": "Failed"
            },
            "L4": {
                "description": {"en": "Store AIP location"},
                "config": {"kind": "output_decision", "variable": "AIPsStore"},
                "exit_codes": {"0": {"link_id": "L5", "job_status": ok}},
                "fallback_link_id": "LFAIL",
                "fallback_job_status": "Failed"
            },
            "L5": {
                "description": {"en": "Store AIP"},
                "config": {"kind": "next_chain_decision", "chain_choices": ["C2", "C3"]},
                "exit_codes": {},
                "fallback_job_status": ok,
                "end": true
            },
            "L6": {
                "description": {"en": "Store the AIP"},
                "config": {"kind": "client_script", "execute": "store_aip_v0.0",
                           "arguments": "--location=%AIPsStore% --uuid=%SIPUUID%"},
                "exit_codes": {"0": {"link_id": null, "job_status": ok}},
                "fallback_job_status": "Failed",
                "end": true
            },
            "LFAIL": {
                "description": {"en": "Move to the failed directory"},
                "config": {"kind": "set_unit_variable", "variable": "failedAt", "value": "%SIPUUID%"},
                "exit_codes": {},
                "fallback_job_status": ok,
                "end": true
            }
        },
        "watched_directories": [
            {"path": "activeTransfers/standardTransfer", "unit_type": "Transfer", "chain_id": "C1", "only_dirs": true}
        ]
    })
}

pub fn workflow() -> Arc<Workflow> {
    Arc::new(Workflow::from_value(workflow_document()).unwrap())
}

/// Processing configuration answering the storage location decision
pub fn e2e_processing_config() -> Value {
    json!({"preconfigured_choices": [
        {"applies_to": "L4", "go_to_chain": "/api/v2/location/default/"}
    ]})
}

// =============================================================================
// Environment
// =============================================================================

/// Everything a job or the queue needs, rooted in a temporary shared directory
pub struct TestEnvironment {
    pub shared: tempfile::TempDir,
    pub directories: SharedDirectories,
    pub workflow: Arc<Workflow>,
    pub repository: Arc<InMemoryRepository>,
    pub transport: Arc<EchoTransport>,
    pub backend: Arc<TaskBackend>,
    pub processing_config_dir: PathBuf,
    interactive: bool,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let transport = Arc::new(EchoTransport::new());
        Self::with_transport(Arc::clone(&transport) as Arc<dyn Transport>, transport)
    }

    /// Environment whose worker gateway always fails
    pub fn failing() -> Self {
        Self::with_transport(Arc::new(FailingTransport::new()), Arc::new(EchoTransport::new()))
    }

    fn with_transport(dispatch: Arc<dyn Transport>, transport: Arc<EchoTransport>) -> Self {
        let shared = tempfile::tempdir().unwrap();
        let directories = SharedDirectories::new(shared.path().to_string_lossy().into_owned());
        let processing_config_dir = shared.path().join("processingConfigs");
        std::fs::create_dir_all(&processing_config_dir).unwrap();

        let repository = Arc::new(InMemoryRepository::new());
        let backend = TaskBackend::new(dispatch, repository.clone(), 128).with_retry_policy(fast_retries());

        Self {
            shared,
            directories,
            workflow: workflow(),
            repository,
            transport,
            backend: Arc::new(backend),
            processing_config_dir,
            interactive: true,
        }
    }

    pub fn non_interactive(mut self) -> Self {
        self.interactive = false;
        self
    }

    /// Writes `<name>.json` into the processing configuration directory
    pub fn with_processing_config(self, name: &str, config: Value) -> Self {
        let path = self.processing_config_dir.join(format!("{}.json", name));
        std::fs::write(path, config.to_string()).unwrap();
        self
    }

    pub fn job_environment(&self) -> JobEnvironment {
        JobEnvironment {
            workflow: Arc::clone(&self.workflow),
            repository: self.repository.clone(),
            backend: Arc::clone(&self.backend),
            files: Arc::new(StoreFileEnumerator::new(self.repository.clone())),
            decisions: DecisionResolver::new(
                self.repository.clone(),
                self.processing_config_dir.clone(),
                self.interactive,
            ),
            directories: self.directories.clone(),
        }
    }

    pub fn queue(&self, limits: QueueLimits) -> Arc<PackageQueue> {
        Arc::new(PackageQueue::new(Arc::new(self.job_environment()), limits))
    }

    pub fn app_state(&self, limits: QueueLimits) -> AppState {
        AppState {
            workflow: Arc::clone(&self.workflow),
            repository: self.repository.clone(),
            queue: self.queue(limits),
            directories: self.directories.clone(),
        }
    }
}
