//! Job domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::package::PackageKind;
use crate::workflow::JobKind;

/// Job status
///
/// Workflow documents refer to statuses by their English label; storage
/// uses the numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "Unknown")]
    Unknown,
    #[serde(rename = "Awaiting decision")]
    AwaitingDecision,
    #[serde(rename = "Completed successfully")]
    CompletedSuccessfully,
    #[serde(rename = "Executing command(s)")]
    ExecutingCommands,
    #[serde(rename = "Failed")]
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Unknown,
        JobStatus::AwaitingDecision,
        JobStatus::CompletedSuccessfully,
        JobStatus::ExecutingCommands,
        JobStatus::Failed,
    ];

    /// Numeric code used in job rows
    pub fn code(self) -> i16 {
        match self {
            JobStatus::Unknown => 0,
            JobStatus::AwaitingDecision => 1,
            JobStatus::CompletedSuccessfully => 2,
            JobStatus::ExecutingCommands => 3,
            JobStatus::Failed => 4,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Label used in workflow documents
    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Unknown => "Unknown",
            JobStatus::AwaitingDecision => "Awaiting decision",
            JobStatus::CompletedSuccessfully => "Completed successfully",
            JobStatus::ExecutingCommands => "Executing command(s)",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == label)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Persisted job row
///
/// One row per executed link. The scheduler writes it; the API and the CLI
/// read it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub package_id: Uuid,
    pub unit_type: PackageKind,
    pub chain_id: String,
    pub link_id: String,
    pub kind: JobKind,
    pub description: String,
    pub group: String,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}
