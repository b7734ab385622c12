//! Worker batch protocol
//!
//! A batch groups tasks sharing one capability. Workers answer with one
//! result per task id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Batch of tasks posted to a worker capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub batch_id: Uuid,
    pub tasks: HashMap<Uuid, TaskPayload>,
}

/// One task as seen by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub uuid: Uuid,
    #[serde(rename = "createdDate")]
    pub created_date: DateTime<Utc>,
    pub arguments: String,
    pub wants_output: bool,
}

/// Worker answer for a whole batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    pub task_results: HashMap<Uuid, TaskResultPayload>,
}

/// Result of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResultPayload {
    #[serde(rename = "exitCode")]
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Workers report this as an ISO 8601 string, sometimes without offset
    #[serde(rename = "finishedTimestamp", default)]
    pub finished_timestamp: Option<String>,
}

impl BatchRequest {
    pub fn new(payloads: impl IntoIterator<Item = TaskPayload>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            tasks: payloads.into_iter().map(|task| (task.uuid, task)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
