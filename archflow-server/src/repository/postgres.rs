//! PostgreSQL repository
//!
//! Tables are created by [`crate::db::run_migrations`].

use archflow_core::domain::file::FileRecord;
use archflow_core::domain::job::{JobRecord, JobStatus};
use archflow_core::domain::package::{Package, PackageKind, PackageStatus, uuid_from_path};
use archflow_core::domain::task::Task;
use archflow_core::domain::unit_variable::UnitVariable;
use archflow_core::workflow::JobKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{Repository, RepositoryError};

/// Repository backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PACKAGE_COLUMNS: &str = "id, kind, current_path, status, processing_configuration, \
     aip_filename, sip_type, created_at, completed_at";

const JOB_COLUMNS: &str = "id, package_id, unit_type, chain_id, link_id, kind, description, \
     group_name, status, exit_code, created_at, completed_at";

#[async_trait]
impl Repository for PgRepository {
    async fn get_or_create_package(
        &self,
        path: &str,
        kind: PackageKind,
        processing_configuration: Option<&str>,
    ) -> Result<Package, RepositoryError> {
        let existing = match uuid_from_path(path) {
            Some(id) => self.find_package(id).await?,
            None => sqlx::query_as::<_, PackageRow>(&format!(
                "SELECT {} FROM packages WHERE current_path = $1 ORDER BY created_at LIMIT 1",
                PACKAGE_COLUMNS
            ))
            .bind(path)
            .fetch_optional(&self.pool)
            .await?
            .map(Package::try_from)
            .transpose()?,
        };
        if let Some(package) = existing {
            return Ok(package);
        }

        let id = uuid_from_path(path).unwrap_or_else(Uuid::new_v4);
        let mut package = Package::new(id, kind, path);
        if let Some(name) = processing_configuration {
            package.processing_configuration = name.to_string();
        }

        sqlx::query(
            r#"
            INSERT INTO packages (id, kind, current_path, status, processing_configuration,
                                  aip_filename, sip_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(package.id)
        .bind(package.kind.as_str())
        .bind(&package.current_path)
        .bind(package.status.as_str())
        .bind(&package.processing_configuration)
        .bind(&package.aip_filename)
        .bind(&package.sip_type)
        .bind(package.created_at)
        .execute(&self.pool)
        .await?;

        Ok(package)
    }

    async fn find_package(&self, id: Uuid) -> Result<Option<Package>, RepositoryError> {
        sqlx::query_as::<_, PackageRow>(&format!(
            "SELECT {} FROM packages WHERE id = $1",
            PACKAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Package::try_from)
        .transpose()
    }

    async fn update_package_status(
        &self,
        id: Uuid,
        status: PackageStatus,
    ) -> Result<(), RepositoryError> {
        let completed_at = status.is_terminal().then(Utc::now);

        let result = sqlx::query(
            r#"
            UPDATE packages
            SET status = $1, completed_at = COALESCE($2, completed_at)
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::PackageNotFound(id));
        }
        Ok(())
    }

    async fn update_package_path(&self, id: Uuid, path: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE packages SET current_path = $1 WHERE id = $2")
            .bind(path)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::PackageNotFound(id));
        }
        Ok(())
    }

    async fn fail_unfinished_packages(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE packages
            SET status = $1, completed_at = $2
            WHERE status IN ($3, $4)
            "#,
        )
        .bind(PackageStatus::Failed.as_str())
        .bind(Utc::now())
        .bind(PackageStatus::Processing.as_str())
        .bind(PackageStatus::Unknown.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn create_job(&self, job: &JobRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, package_id, unit_type, chain_id, link_id, kind, description,
                              group_name, status, exit_code, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(job.id)
        .bind(job.package_id)
        .bind(job.unit_type.as_str())
        .bind(&job.chain_id)
        .bind(&job.link_id)
        .bind(job.kind.as_str())
        .bind(&job.description)
        .bind(&job.group)
        .bind(job.status.code())
        .bind(job.exit_code)
        .bind(job.created_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        exit_code: Option<i32>,
    ) -> Result<(), RepositoryError> {
        let completed_at = exit_code.map(|_| Utc::now());

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1,
                exit_code = COALESCE($2, exit_code),
                completed_at = COALESCE($3, completed_at)
            WHERE id = $4
            "#,
        )
        .bind(status.code())
        .bind(exit_code)
        .bind(completed_at)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::JobNotFound(job_id));
        }
        Ok(())
    }

    async fn list_jobs(&self, package_id: Uuid) -> Result<Vec<JobRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE package_id = $1 ORDER BY created_at ASC",
            JOB_COLUMNS
        ))
        .bind(package_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }

    async fn log_tasks(&self, job_id: Uuid, tasks: &[Task]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for task in tasks {
            let result = task.result();
            sqlx::query(
                r#"
                INSERT INTO tasks (id, job_id, arguments, stdout_file, stderr_file, wants_output,
                                   exit_code, stdout, stderr, start_time, end_time)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(task.id)
            .bind(job_id)
            .bind(&task.arguments)
            .bind(&task.stdout_file)
            .bind(&task.stderr_file)
            .bind(task.wants_output)
            .bind(result.map(|r| r.exit_code))
            .bind(result.map(|r| r.stdout.as_str()))
            .bind(result.map(|r| r.stderr.as_str()))
            .bind(task.start_timestamp)
            .bind(result.and_then(|r| r.finished_timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_unit_variable(
        &self,
        package_id: Uuid,
        variable: &str,
    ) -> Result<Option<UnitVariable>, RepositoryError> {
        sqlx::query_as::<_, UnitVariableRow>(
            r#"
            SELECT package_id, unit_type, variable, value, link_id, updated_at
            FROM unit_variables
            WHERE package_id = $1 AND variable = $2
            "#,
        )
        .bind(package_id)
        .bind(variable)
        .fetch_optional(&self.pool)
        .await?
        .map(UnitVariable::try_from)
        .transpose()
    }

    async fn set_unit_variable(&self, variable: &UnitVariable) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO unit_variables (package_id, unit_type, variable, value, link_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (package_id, variable)
            DO UPDATE SET value = EXCLUDED.value,
                          link_id = EXCLUDED.link_id,
                          updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(variable.package_id)
        .bind(variable.unit_type.as_str())
        .bind(&variable.variable)
        .bind(&variable.value)
        .bind(&variable.link_id)
        .bind(variable.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_unit_variables(
        &self,
        package_id: Uuid,
    ) -> Result<Vec<UnitVariable>, RepositoryError> {
        let rows = sqlx::query_as::<_, UnitVariableRow>(
            r#"
            SELECT package_id, unit_type, variable, value, link_id, updated_at
            FROM unit_variables
            WHERE package_id = $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(package_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UnitVariable::try_from).collect()
    }

    async fn find_decision(
        &self,
        package_id: Uuid,
        link_id: &str,
    ) -> Result<Option<String>, RepositoryError> {
        let choice = sqlx::query_scalar::<_, String>(
            "SELECT choice FROM decisions WHERE package_id = $1 AND link_id = $2",
        )
        .bind(package_id)
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(choice)
    }

    async fn store_decision(
        &self,
        package_id: Uuid,
        link_id: &str,
        choice: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO decisions (package_id, link_id, choice, decided_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (package_id, link_id)
            DO UPDATE SET choice = EXCLUDED.choice, decided_at = EXCLUDED.decided_at
            "#,
        )
        .bind(package_id)
        .bind(link_id)
        .bind(choice)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_files(&self, package_id: Uuid) -> Result<Vec<FileRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, package_id, original_location, current_location, file_grp_use
            FROM files
            WHERE package_id = $1
            ORDER BY current_location
            "#,
        )
        .bind(package_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FileRecord::from).collect())
    }

    async fn add_file(&self, file: &FileRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO files (id, package_id, original_location, current_location, file_grp_use)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(file.id)
        .bind(file.package_id)
        .bind(&file.original_location)
        .bind(&file.current_location)
        .bind(&file.file_grp_use)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_kind(value: &str) -> Result<PackageKind, RepositoryError> {
    value.parse().map_err(RepositoryError::Corrupt)
}

fn parse_package_status(value: &str) -> Result<PackageStatus, RepositoryError> {
    PackageStatus::parse(value)
        .ok_or_else(|| RepositoryError::Corrupt(format!("unknown package status '{}'", value)))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PackageRow {
    id: Uuid,
    kind: String,
    current_path: String,
    status: String,
    processing_configuration: String,
    aip_filename: Option<String>,
    sip_type: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PackageRow> for Package {
    type Error = RepositoryError;

    fn try_from(row: PackageRow) -> Result<Self, Self::Error> {
        Ok(Package {
            id: row.id,
            kind: parse_kind(&row.kind)?,
            current_path: row.current_path,
            status: parse_package_status(&row.status)?,
            processing_configuration: row.processing_configuration,
            aip_filename: row.aip_filename,
            sip_type: row.sip_type,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    package_id: Uuid,
    unit_type: String,
    chain_id: String,
    link_id: String,
    kind: String,
    description: String,
    group_name: String,
    status: i16,
    exit_code: Option<i32>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = RepositoryError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let kind = JobKind::parse(&row.kind)
            .ok_or_else(|| RepositoryError::Corrupt(format!("unknown job kind '{}'", row.kind)))?;
        let status = JobStatus::from_code(row.status)
            .ok_or_else(|| RepositoryError::Corrupt(format!("unknown job status {}", row.status)))?;

        Ok(JobRecord {
            id: row.id,
            package_id: row.package_id,
            unit_type: parse_kind(&row.unit_type)?,
            chain_id: row.chain_id,
            link_id: row.link_id,
            kind,
            description: row.description,
            group: row.group_name,
            status,
            exit_code: row.exit_code,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UnitVariableRow {
    package_id: Uuid,
    unit_type: String,
    variable: String,
    value: String,
    link_id: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UnitVariableRow> for UnitVariable {
    type Error = RepositoryError;

    fn try_from(row: UnitVariableRow) -> Result<Self, Self::Error> {
        Ok(UnitVariable {
            package_id: row.package_id,
            unit_type: parse_kind(&row.unit_type)?,
            variable: row.variable,
            value: row.value,
            link_id: row.link_id,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    package_id: Uuid,
    original_location: String,
    current_location: String,
    file_grp_use: String,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        FileRecord {
            id: row.id,
            package_id: row.package_id,
            original_location: row.original_location,
            current_location: row.current_location,
            file_grp_use: row.file_grp_use,
        }
    }
}
