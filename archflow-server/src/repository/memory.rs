//! In-memory repository
//!
//! Keeps every row in process memory behind a single mutex. Used when no
//! database is configured and throughout the test suite.

use archflow_core::domain::file::FileRecord;
use archflow_core::domain::job::{JobRecord, JobStatus};
use archflow_core::domain::package::{Package, PackageKind, PackageStatus, uuid_from_path};
use archflow_core::domain::task::Task;
use archflow_core::domain::unit_variable::UnitVariable;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::{Repository, RepositoryError};

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    packages: HashMap<Uuid, Package>,
    jobs: Vec<JobRecord>,
    tasks: Vec<(Uuid, Task)>,
    unit_variables: Vec<UnitVariable>,
    decisions: HashMap<(Uuid, String), String>,
    files: Vec<FileRecord>,
    decisions_read_only: bool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks logged for a job, in logging order
    pub fn logged_tasks(&self, job_id: Uuid) -> Vec<Task> {
        self.state
            .lock()
            .tasks
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, task)| task.clone())
            .collect()
    }

    /// Inserts a package as is
    pub fn insert_package(&self, package: Package) {
        self.state.lock().packages.insert(package.id, package);
    }

    /// Makes every later `store_decision` fail
    #[cfg(test)]
    pub fn refuse_decision_writes(&self) {
        self.state.lock().decisions_read_only = true;
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_or_create_package(
        &self,
        path: &str,
        kind: PackageKind,
        processing_configuration: Option<&str>,
    ) -> Result<Package, RepositoryError> {
        let mut state = self.state.lock();

        let id = match uuid_from_path(path) {
            Some(id) => {
                if let Some(existing) = state.packages.get(&id) {
                    return Ok(existing.clone());
                }
                id
            }
            None => {
                if let Some(existing) = state.packages.values().find(|p| p.current_path == path) {
                    return Ok(existing.clone());
                }
                Uuid::new_v4()
            }
        };

        let mut package = Package::new(id, kind, path);
        if let Some(name) = processing_configuration {
            package.processing_configuration = name.to_string();
        }
        state.packages.insert(id, package.clone());
        Ok(package)
    }

    async fn find_package(&self, id: Uuid) -> Result<Option<Package>, RepositoryError> {
        Ok(self.state.lock().packages.get(&id).cloned())
    }

    async fn update_package_status(
        &self,
        id: Uuid,
        status: PackageStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let package = state
            .packages
            .get_mut(&id)
            .ok_or(RepositoryError::PackageNotFound(id))?;
        package.status = status;
        if status.is_terminal() {
            package.completed_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn update_package_path(&self, id: Uuid, path: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let package = state
            .packages
            .get_mut(&id)
            .ok_or(RepositoryError::PackageNotFound(id))?;
        package.current_path = path.to_string();
        Ok(())
    }

    async fn fail_unfinished_packages(&self) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock();
        let now = chrono::Utc::now();
        let mut count = 0;
        for package in state.packages.values_mut() {
            if matches!(
                package.status,
                PackageStatus::Processing | PackageStatus::Unknown
            ) {
                package.status = PackageStatus::Failed;
                package.completed_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn create_job(&self, job: &JobRecord) -> Result<(), RepositoryError> {
        self.state.lock().jobs.push(job.clone());
        Ok(())
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        exit_code: Option<i32>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == job_id)
            .ok_or(RepositoryError::JobNotFound(job_id))?;
        job.status = status;
        if exit_code.is_some() {
            job.exit_code = exit_code;
            job.completed_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn list_jobs(&self, package_id: Uuid) -> Result<Vec<JobRecord>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .jobs
            .iter()
            .filter(|job| job.package_id == package_id)
            .cloned()
            .collect())
    }

    async fn log_tasks(&self, job_id: Uuid, tasks: &[Task]) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        state
            .tasks
            .extend(tasks.iter().map(|task| (job_id, task.clone())));
        Ok(())
    }

    async fn get_unit_variable(
        &self,
        package_id: Uuid,
        variable: &str,
    ) -> Result<Option<UnitVariable>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .unit_variables
            .iter()
            .find(|row| row.package_id == package_id && row.variable == variable)
            .cloned())
    }

    async fn set_unit_variable(&self, variable: &UnitVariable) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        state
            .unit_variables
            .retain(|row| !(row.package_id == variable.package_id && row.variable == variable.variable));
        state.unit_variables.push(variable.clone());
        Ok(())
    }

    async fn list_unit_variables(
        &self,
        package_id: Uuid,
    ) -> Result<Vec<UnitVariable>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .unit_variables
            .iter()
            .filter(|row| row.package_id == package_id)
            .cloned()
            .collect())
    }

    async fn find_decision(
        &self,
        package_id: Uuid,
        link_id: &str,
    ) -> Result<Option<String>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .decisions
            .get(&(package_id, link_id.to_string()))
            .cloned())
    }

    async fn store_decision(
        &self,
        package_id: Uuid,
        link_id: &str,
        choice: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        if state.decisions_read_only {
            return Err(RepositoryError::Corrupt(format!(
                "decision table is read-only (package {})",
                package_id
            )));
        }
        state
            .decisions
            .insert((package_id, link_id.to_string()), choice.to_string());
        Ok(())
    }

    async fn list_files(&self, package_id: Uuid) -> Result<Vec<FileRecord>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .files
            .iter()
            .filter(|file| file.package_id == package_id)
            .cloned()
            .collect())
    }

    async fn add_file(&self, file: &FileRecord) -> Result<(), RepositoryError> {
        self.state.lock().files.push(file.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_uses_path_uuid() {
        let repo = InMemoryRepository::new();
        let id = Uuid::new_v4();
        let path = format!("%sharedPath%currentlyProcessing/images-{}/", id);

        let package = repo
            .get_or_create_package(&path, PackageKind::Transfer, Some("automated"))
            .await
            .unwrap();
        assert_eq!(package.id, id);
        assert_eq!(package.processing_configuration, "automated");

        let again = repo
            .get_or_create_package(&path, PackageKind::Transfer, None)
            .await
            .unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.processing_configuration, "automated");
    }

    #[tokio::test]
    async fn test_get_or_create_by_path_without_uuid() {
        let repo = InMemoryRepository::new();
        let first = repo
            .get_or_create_package("/in/images/", PackageKind::Sip, None)
            .await
            .unwrap();
        let second = repo
            .get_or_create_package("/in/images/", PackageKind::Sip, None)
            .await
            .unwrap();
        let other = repo
            .get_or_create_package("/in/maps/", PackageKind::Sip, None)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other.id);
        assert_eq!(first.processing_configuration, "default");
    }

    #[tokio::test]
    async fn test_fail_unfinished_packages() {
        let repo = InMemoryRepository::new();
        let a = repo.get_or_create_package("/a/", PackageKind::Transfer, None).await.unwrap();
        let b = repo.get_or_create_package("/b/", PackageKind::Transfer, None).await.unwrap();
        let c = repo.get_or_create_package("/c/", PackageKind::Transfer, None).await.unwrap();
        repo.update_package_status(a.id, PackageStatus::Processing).await.unwrap();
        repo.update_package_status(b.id, PackageStatus::Done).await.unwrap();

        assert_eq!(repo.fail_unfinished_packages().await.unwrap(), 2);

        for (id, expected) in [
            (a.id, PackageStatus::Failed),
            (b.id, PackageStatus::Done),
            (c.id, PackageStatus::Failed),
        ] {
            let package = repo.find_package(id).await.unwrap().unwrap();
            assert_eq!(package.status, expected);
        }
    }

    #[tokio::test]
    async fn test_unit_variable_upsert() {
        let repo = InMemoryRepository::new();
        let package_id = Uuid::new_v4();

        let first = UnitVariable::new(package_id, PackageKind::Sip, "reNormalize", "a", None);
        let second = UnitVariable::new(
            package_id,
            PackageKind::Sip,
            "reNormalize",
            "b",
            Some("L9".to_string()),
        );
        repo.set_unit_variable(&first).await.unwrap();
        repo.set_unit_variable(&second).await.unwrap();

        let stored = repo
            .get_unit_variable(package_id, "reNormalize")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value, "b");
        assert_eq!(stored.link_id.as_deref(), Some("L9"));
        assert_eq!(repo.list_unit_variables(package_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_decisions_and_missing_rows() {
        let repo = InMemoryRepository::new();
        let package_id = Uuid::new_v4();

        assert!(repo.find_decision(package_id, "L5").await.unwrap().is_none());
        repo.store_decision(package_id, "L5", "C2").await.unwrap();
        assert_eq!(
            repo.find_decision(package_id, "L5").await.unwrap().as_deref(),
            Some("C2")
        );

        let err = repo
            .update_package_status(package_id, PackageStatus::Done)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::PackageNotFound(id) if id == package_id));
        assert!(repo.update_package_path(package_id, "/x/").await.is_err());
    }

    #[tokio::test]
    async fn test_package_moves_keep_identity() {
        let repo = InMemoryRepository::new();
        let package = repo
            .get_or_create_package("%sharedPath%watchedDirectories/t/", PackageKind::Transfer, None)
            .await
            .unwrap();

        repo.update_package_path(package.id, "%sharedPath%currentlyProcessing/t/")
            .await
            .unwrap();
        let moved = repo.find_package(package.id).await.unwrap().unwrap();
        assert_eq!(moved.current_path, "%sharedPath%currentlyProcessing/t/");

        let found = repo
            .get_or_create_package("%sharedPath%currentlyProcessing/t/", PackageKind::Transfer, None)
            .await
            .unwrap();
        assert_eq!(found.id, package.id);
    }
}
