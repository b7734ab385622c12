//! Repository layer
//!
//! Persistence consumed by the scheduler: packages, job rows, the task audit
//! log, unit variables, stored decisions and file rows. The scheduler never
//! relies on the store for in-flight state; the in-memory job and task values
//! are authoritative.
//!
//! Two implementations are provided behind the [`Repository`] trait:
//! - [`PgRepository`]: PostgreSQL through sqlx
//! - [`InMemoryRepository`]: process-local, used for development and tests

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PgRepository;

use archflow_core::domain::file::FileRecord;
use archflow_core::domain::job::{JobRecord, JobStatus};
use archflow_core::domain::package::{Package, PackageKind, PackageStatus};
use archflow_core::domain::task::Task;
use archflow_core::domain::unit_variable::UnitVariable;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a repository
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("package not found: {0}")]
    PackageNotFound(Uuid),

    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Store consumed by the scheduler
#[async_trait]
pub trait Repository: Send + Sync {
    // -------------------------------------------------------------------------
    // Packages
    // -------------------------------------------------------------------------

    /// Returns the package stored for `path`, creating it when missing
    ///
    /// A trailing `-<uuid>` in the path's basename is the package identity.
    /// Without one the package is looked up by path, and a fresh uuid is
    /// minted when nothing matches.
    ///
    /// # Arguments
    /// * `path` - Package location with the shared directory abbreviated
    /// * `kind` - Unit type of a newly created package
    /// * `processing_configuration` - Configuration name for a new package
    async fn get_or_create_package(
        &self,
        path: &str,
        kind: PackageKind,
        processing_configuration: Option<&str>,
    ) -> Result<Package, RepositoryError>;

    async fn find_package(&self, id: Uuid) -> Result<Option<Package>, RepositoryError>;

    /// Sets the package status; terminal statuses also stamp `completed_at`
    async fn update_package_status(
        &self,
        id: Uuid,
        status: PackageStatus,
    ) -> Result<(), RepositoryError>;

    async fn update_package_path(&self, id: Uuid, path: &str) -> Result<(), RepositoryError>;

    /// Marks every processing or unknown package as failed
    ///
    /// # Returns
    /// The number of packages updated
    async fn fail_unfinished_packages(&self) -> Result<u64, RepositoryError>;

    // -------------------------------------------------------------------------
    // Jobs
    // -------------------------------------------------------------------------

    async fn create_job(&self, job: &JobRecord) -> Result<(), RepositoryError>;

    /// Records a job's status, and its exit code once it completed
    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        exit_code: Option<i32>,
    ) -> Result<(), RepositoryError>;

    /// Jobs of a package, oldest first
    async fn list_jobs(&self, package_id: Uuid) -> Result<Vec<JobRecord>, RepositoryError>;

    // -------------------------------------------------------------------------
    // Task audit
    // -------------------------------------------------------------------------

    /// Appends completed tasks to the audit log
    async fn log_tasks(&self, job_id: Uuid, tasks: &[Task]) -> Result<(), RepositoryError>;

    // -------------------------------------------------------------------------
    // Unit variables
    // -------------------------------------------------------------------------

    async fn get_unit_variable(
        &self,
        package_id: Uuid,
        variable: &str,
    ) -> Result<Option<UnitVariable>, RepositoryError>;

    /// Inserts or replaces the (package, variable) row
    async fn set_unit_variable(&self, variable: &UnitVariable) -> Result<(), RepositoryError>;

    /// Every variable of a package, in the order they were stored
    async fn list_unit_variables(
        &self,
        package_id: Uuid,
    ) -> Result<Vec<UnitVariable>, RepositoryError>;

    // -------------------------------------------------------------------------
    // Decisions
    // -------------------------------------------------------------------------

    /// Stored preference for a decision link of a package
    async fn find_decision(
        &self,
        package_id: Uuid,
        link_id: &str,
    ) -> Result<Option<String>, RepositoryError>;

    async fn store_decision(
        &self,
        package_id: Uuid,
        link_id: &str,
        choice: &str,
    ) -> Result<(), RepositoryError>;

    // -------------------------------------------------------------------------
    // Files
    // -------------------------------------------------------------------------

    async fn list_files(&self, package_id: Uuid) -> Result<Vec<FileRecord>, RepositoryError>;

    async fn add_file(&self, file: &FileRecord) -> Result<(), RepositoryError>;
}
