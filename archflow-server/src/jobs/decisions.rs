//! Decision resolution
//!
//! A decision link is answered, in order, by:
//! 1. the preference stored for (package, link)
//! 2. the package's processing configuration
//! 3. a user, through the queue's `decide`, when interactive decisions are on

use archflow_core::domain::package::Package;
use archflow_core::processing::ProcessingConfig;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::repository::{Repository, RepositoryError};

/// Errors raised while answering a decision
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("no job awaiting a decision: {0}")]
    NotFound(Uuid),

    #[error("job {0} is not awaiting a decision")]
    NotAwaiting(Uuid),

    #[error("'{choice}' is not a valid choice for job {job_id}")]
    InvalidChoice { job_id: Uuid, choice: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("decision task failed: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}

/// Looks up answers that do not need a user
pub struct DecisionResolver {
    repository: Arc<dyn Repository>,
    processing_config_dir: PathBuf,
    interactive: bool,
}

impl DecisionResolver {
    /// Creates a resolver
    ///
    /// # Arguments
    /// * `repository` - Store holding remembered preferences
    /// * `processing_config_dir` - Directory of `<name>.json` processing configurations
    /// * `interactive` - Whether unanswered decisions wait for a user
    pub fn new(
        repository: Arc<dyn Repository>,
        processing_config_dir: impl Into<PathBuf>,
        interactive: bool,
    ) -> Self {
        Self {
            repository,
            processing_config_dir: processing_config_dir.into(),
            interactive,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Answer known without asking a user, if any
    pub async fn preconfigured_choice(
        &self,
        package: &Package,
        link_id: &str,
    ) -> Result<Option<String>, RepositoryError> {
        if let Some(choice) = self.repository.find_decision(package.id, link_id).await? {
            debug!("Using stored preference for link {} of {}", link_id, package.id);
            return Ok(Some(choice));
        }

        let config = self
            .processing_config(&package.processing_configuration)
            .await;
        Ok(config.and_then(|config| config.choice_for(link_id).map(str::to_string)))
    }

    /// Persists a choice as the package's preference for the link
    pub async fn remember(
        &self,
        package_id: Uuid,
        link_id: &str,
        choice: &str,
    ) -> Result<(), RepositoryError> {
        self.repository.store_decision(package_id, link_id, choice).await
    }

    /// Reads `<name>.json`; missing or malformed files yield `None`
    async fn processing_config(&self, name: &str) -> Option<ProcessingConfig> {
        if name.is_empty() || name.contains('/') || name.contains("..") {
            warn!("Ignoring invalid processing configuration name '{}'", name);
            return None;
        }

        let path = self.processing_config_dir.join(format!("{}.json", name));
        let document = match tokio::fs::read_to_string(&path).await {
            Ok(document) => document,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read processing configuration {}: {}", path.display(), e);
                return None;
            }
        };

        match ProcessingConfig::parse(&document) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Malformed processing configuration {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use archflow_core::domain::package::PackageKind;

    fn package(config: &str) -> Package {
        let mut package = Package::new(Uuid::new_v4(), PackageKind::Transfer, "/t/");
        package.processing_configuration = config.to_string();
        package
    }

    #[tokio::test]
    async fn test_processing_config_answers_link() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("automated.json"),
            r#"{"preconfigured_choices": [{"applies_to": "L5", "go_to_chain": "C2"}]}"#,
        )
        .unwrap();
        let resolver = DecisionResolver::new(Arc::new(InMemoryRepository::new()), dir.path(), true);

        let package = package("automated");
        assert_eq!(
            resolver.preconfigured_choice(&package, "L5").await.unwrap().as_deref(),
            Some("C2")
        );
        assert!(resolver.preconfigured_choice(&package, "L4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stored_preference_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.json"),
            r#"{"preconfigured_choices": [{"applies_to": "L5", "go_to_chain": "C2"}]}"#,
        )
        .unwrap();
        let resolver = DecisionResolver::new(Arc::new(InMemoryRepository::new()), dir.path(), false);
        let package = package("default");

        resolver.remember(package.id, "L5", "C3").await.unwrap();
        assert_eq!(
            resolver.preconfigured_choice(&package, "L5").await.unwrap().as_deref(),
            Some("C3")
        );
        assert!(!resolver.is_interactive());
    }

    #[tokio::test]
    async fn test_missing_or_malformed_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "<xml/>").unwrap();
        let resolver = DecisionResolver::new(Arc::new(InMemoryRepository::new()), dir.path(), true);

        assert!(resolver.preconfigured_choice(&package("absent"), "L5").await.unwrap().is_none());
        assert!(resolver.preconfigured_choice(&package("broken"), "L5").await.unwrap().is_none());
        assert!(resolver.preconfigured_choice(&package("../etc"), "L5").await.unwrap().is_none());
    }
}
