//! Task domain types
//!
//! A task is one command invocation dispatched to a remote worker. Its
//! result is recorded exactly once.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dto::task::{TaskPayload, TaskResultPayload};

/// Exit code recorded when a task could not be dispatched or its result was lost
pub const TASK_FAILURE_EXIT_CODE: i32 = 1;

/// Errors raised by task bookkeeping
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task {0} already has a result")]
    AlreadyCompleted(Uuid),
}

/// Unit of work sent to a remote worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Argument string, already substituted
    pub arguments: String,
    pub stdout_file: Option<String>,
    pub stderr_file: Option<String>,
    pub wants_output: bool,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    result: Option<TaskResult>,
}

/// Outcome reported by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub finished_timestamp: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(arguments: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            arguments: arguments.into(),
            stdout_file: None,
            stderr_file: None,
            wants_output: false,
            start_timestamp: Utc::now(),
            result: None,
        }
    }

    /// Sets the capture files; a task with capture files always wants output
    pub fn with_output_files(mut self, stdout_file: Option<String>, stderr_file: Option<String>) -> Self {
        self.wants_output |= stdout_file.is_some() || stderr_file.is_some();
        self.stdout_file = stdout_file;
        self.stderr_file = stderr_file;
        self
    }

    pub fn wanting_output(mut self) -> Self {
        self.wants_output = true;
        self
    }

    /// Records the worker's result
    ///
    /// # Errors
    /// Returns [`TaskError::AlreadyCompleted`] if a result was already set.
    pub fn record_result(&mut self, result: TaskResult) -> Result<(), TaskError> {
        if self.result.is_some() {
            return Err(TaskError::AlreadyCompleted(self.id));
        }
        self.result = Some(result);
        Ok(())
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.result.as_ref().map(|r| r.exit_code)
    }

    pub fn is_done(&self) -> bool {
        self.result.is_some()
    }

    /// Wire representation sent to workers
    pub fn payload(&self) -> TaskPayload {
        TaskPayload {
            uuid: self.id,
            created_date: self.start_timestamp,
            arguments: self.arguments.clone(),
            wants_output: self.wants_output,
        }
    }
}

impl TaskResult {
    /// Result used when the worker never answered for a task
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            exit_code: TASK_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: reason.into(),
            finished_timestamp: Some(Utc::now()),
        }
    }
}

impl From<TaskResultPayload> for TaskResult {
    fn from(payload: TaskResultPayload) -> Self {
        Self {
            exit_code: payload.exit_code,
            stdout: payload.stdout,
            stderr: payload.stderr,
            finished_timestamp: payload
                .finished_timestamp
                .as_deref()
                .and_then(parse_timestamp),
        }
    }
}

/// Accepts RFC 3339 timestamps and naive ISO 8601 ones (read as UTC)
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
