//! Package DTOs
//!
//! Requests and summaries exchanged with the scheduler's package endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{JobRecord, JobStatus};
use crate::domain::package::{Package, PackageKind, PackageStatus};
use crate::workflow::JobKind;

/// Request to start processing a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPackage {
    /// Package location, absolute or relative to the shared directory
    pub path: String,

    pub kind: PackageKind,

    /// Chain to start; takes precedence over `watched_directory`
    #[serde(default)]
    pub chain_id: Option<String>,

    /// Watched directory whose chain should be started
    #[serde(default)]
    pub watched_directory: Option<String>,

    /// Processing configuration name (transfers only)
    #[serde(default)]
    pub processing_configuration: Option<String>,
}

/// Summary information about a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSummary {
    pub id: Uuid,
    pub kind: PackageKind,
    pub current_path: String,
    pub status: PackageStatus,
    pub processing_configuration: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Package> for PackageSummary {
    fn from(package: Package) -> Self {
        PackageSummary {
            id: package.id,
            kind: package.kind,
            current_path: package.current_path,
            status: package.status,
            processing_configuration: package.processing_configuration,
            created_at: package.created_at,
            completed_at: package.completed_at,
        }
    }
}

/// One executed link of a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub chain_id: String,
    pub link_id: String,
    pub kind: JobKind,
    pub description: String,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for JobSummary {
    fn from(job: JobRecord) -> Self {
        JobSummary {
            id: job.id,
            chain_id: job.chain_id,
            link_id: job.link_id,
            kind: job.kind,
            description: job.description,
            status: job.status,
            exit_code: job.exit_code,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Package together with its jobs, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDetails {
    #[serde(flatten)]
    pub package: PackageSummary,
    pub jobs: Vec<JobSummary>,
}
