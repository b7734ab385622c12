//! Jobs
//!
//! A job is the execution of one link for one package. Its kind comes from
//! the link configuration:
//! - client scripts fan tasks out to the workers and take the highest exit code
//! - decisions resolve a choice, or park until a user supplies one
//! - unit variable jobs read or write package-scoped facts locally
//!
//! A job never touches its chain. What it learned travels back in its
//! [`Completion`] as a [`ChainEffect`], which the chain applies when it
//! advances.

pub mod chain;
mod client;
pub mod decisions;
mod local;

pub use chain::{Advance, ChainError, JobChain};
pub use decisions::{DecisionError, DecisionResolver};

use archflow_core::Context;
use archflow_core::choices::{DecisionChoice, GeneratedChoices};
use archflow_core::domain::job::{JobRecord, JobStatus};
use archflow_core::domain::package::{Package, SharedDirectories};
use archflow_core::domain::task::Task;
use archflow_core::workflow::{JobKind, Link, LinkConfig, Workflow};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::TaskBackend;
use crate::files::{FileEnumerator, FileError};
use crate::repository::{Repository, RepositoryError};

/// Exit code of a decision nobody configured when interactive decisions are off
pub const INCOMPLETE_CONFIGURATION_EXIT_CODE: i32 = 2;

/// Errors that stop a job from completing
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} was already executed")]
    AlreadyExecuted(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Files(#[from] FileError),
}

/// Collaborators a job needs to execute
pub struct JobEnvironment {
    pub workflow: Arc<Workflow>,
    pub repository: Arc<dyn Repository>,
    pub backend: Arc<TaskBackend>,
    pub files: Arc<dyn FileEnumerator>,
    pub decisions: DecisionResolver,
    pub directories: SharedDirectories,
}

/// Change a completed job asks its chain to make
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEffect {
    /// Extend the chain context; later keys overwrite
    MergeContext(Context),
    /// Choices offered to the next output decision
    GeneratedChoices(GeneratedChoices),
    /// Continue with another chain's entry link
    JumpToChain(String),
    /// Continue with a specific link
    JumpToLink(String),
}

/// Final result of a job
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub exit_code: i32,
    pub effect: Option<ChainEffect>,
}

impl Completion {
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            effect: None,
        }
    }

    pub fn with_effect(exit_code: i32, effect: ChainEffect) -> Self {
        Self {
            exit_code,
            effect: Some(effect),
        }
    }
}

/// What [`Job::execute`] produced
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Completion),
    /// Parked until `decide` is called with one of these choices
    AwaitingDecision(Vec<DecisionChoice>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Created,
    Running,
    AwaitingDecision(Vec<DecisionChoice>),
    Completed { exit_code: i32 },
}

/// Execution of one link for one package
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub package: Package,
    pub chain_id: String,
    pub link: Link,
    /// Context snapshot taken when the job was created
    pub context: Context,
    /// Choices generated by an earlier output client script of the chain
    pub generated_choices: GeneratedChoices,
    pub created_at: DateTime<Utc>,
    state: JobState,
    tasks: Vec<Task>,
}

impl Job {
    pub fn new(
        package: Package,
        chain_id: impl Into<String>,
        link: &Link,
        context: Context,
        generated_choices: GeneratedChoices,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            package,
            chain_id: chain_id.into(),
            link: link.clone(),
            context,
            generated_choices,
            created_at: Utc::now(),
            state: JobState::Created,
            tasks: Vec::new(),
        }
    }

    pub fn kind(&self) -> JobKind {
        JobKind::for_link(&self.link)
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Tasks returned by the workers, in completion order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            JobState::Completed { exit_code } => Some(exit_code),
            _ => None,
        }
    }

    /// Row written when the job starts
    pub fn record(&self) -> JobRecord {
        let status = if self.kind().is_decision() {
            JobStatus::AwaitingDecision
        } else {
            JobStatus::ExecutingCommands
        };

        JobRecord {
            id: self.id,
            package_id: self.package.id,
            unit_type: self.package.kind,
            chain_id: self.chain_id.clone(),
            link_id: self.link.id.clone(),
            kind: self.kind(),
            description: self.link.description.text().to_string(),
            group: self.link.group.text().to_string(),
            status,
            exit_code: None,
            created_at: self.created_at,
            completed_at: None,
        }
    }

    /// Runs the job once
    ///
    /// # Errors
    /// Returns [`JobError::AlreadyExecuted`] on a second call, and any
    /// repository or file enumeration failure.
    pub async fn execute(&mut self, env: &JobEnvironment) -> Result<JobOutcome, JobError> {
        if self.state != JobState::Created {
            return Err(JobError::AlreadyExecuted(self.id));
        }
        self.state = JobState::Running;

        debug!(
            "Executing job {} ({}) for link {} of package {}",
            self.id,
            self.kind(),
            self.link.id,
            self.package.id
        );

        let outcome = match self.link.config.clone() {
            LinkConfig::ClientScript(script) => self.run_client_script(env, &script, None).await?,
            LinkConfig::DirectoryClientScript(script) => {
                let subdir = script.filter_subdir.clone();
                self.run_client_script(env, &script, subdir.as_deref()).await?
            }
            LinkConfig::FilesClientScript(script) => self.run_files_client_script(env, &script).await?,
            LinkConfig::OutputClientScript(script) => self.run_output_client_script(env, &script).await?,
            LinkConfig::NextChainDecision { .. }
            | LinkConfig::OutputDecision { .. }
            | LinkConfig::UpdateContextDecision { .. } => self.run_decision(env).await?,
            LinkConfig::GetUnitVariable {
                variable,
                default_link_id,
            } => {
                self.get_unit_variable(env, &variable, default_link_id.as_deref())
                    .await?
            }
            LinkConfig::SetUnitVariable {
                variable,
                value,
                link_id,
            } => {
                self.set_unit_variable(env, &variable, value.as_deref(), link_id)
                    .await?
            }
        };

        match &outcome {
            JobOutcome::Completed(completion) => {
                self.state = JobState::Completed {
                    exit_code: completion.exit_code,
                };
            }
            JobOutcome::AwaitingDecision(choices) => {
                info!(
                    "Job {} (link {}) awaits a decision among {} choice(s)",
                    self.id,
                    self.link.id,
                    choices.len()
                );
                self.state = JobState::AwaitingDecision(choices.clone());
            }
        }

        Ok(outcome)
    }

    /// Completes a parked decision with `choice`
    ///
    /// # Errors
    /// [`DecisionError::NotAwaiting`] when the job is not parked, and
    /// [`DecisionError::InvalidChoice`] when `choice` was not offered; the
    /// job stays parked in that case.
    pub fn decide(&mut self, choice: &str) -> Result<Completion, DecisionError> {
        let JobState::AwaitingDecision(choices) = &self.state else {
            return Err(DecisionError::NotAwaiting(self.id));
        };

        if !choices.iter().any(|c| c.value == choice) {
            return Err(DecisionError::InvalidChoice {
                job_id: self.id,
                choice: choice.to_string(),
            });
        }

        let completion = self.decision_completion(choice);
        self.state = JobState::Completed {
            exit_code: completion.exit_code,
        };
        Ok(completion)
    }

    /// Choices currently offered, if the job is parked
    pub fn pending_choices(&self) -> Option<&[DecisionChoice]> {
        match &self.state {
            JobState::AwaitingDecision(choices) => Some(choices),
            _ => None,
        }
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    fn decision_choices(&self, env: &JobEnvironment) -> Vec<DecisionChoice> {
        match &self.link.config {
            LinkConfig::NextChainDecision { chain_choices } => chain_choices
                .iter()
                .map(|chain_id| {
                    let label = env
                        .workflow
                        .chain(chain_id)
                        .map(|chain| chain.description.text().to_string())
                        .unwrap_or_default();
                    DecisionChoice::new(chain_id.clone(), label)
                })
                .collect(),
            LinkConfig::OutputDecision { .. } => self
                .generated_choices
                .iter()
                .map(|(_, choice)| DecisionChoice::new(choice.uri.clone(), choice.description.clone()))
                .collect(),
            LinkConfig::UpdateContextDecision { replacements } => replacements
                .iter()
                .map(|r| DecisionChoice::new(r.id.clone(), r.description.text().to_string()))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn decision_completion(&self, choice: &str) -> Completion {
        let effect = match &self.link.config {
            LinkConfig::NextChainDecision { .. } => ChainEffect::JumpToChain(choice.to_string()),
            LinkConfig::OutputDecision { variable } => {
                ChainEffect::MergeContext(Context::new().with(Context::placeholder(variable), choice))
            }
            LinkConfig::UpdateContextDecision { replacements } => {
                let items = replacements
                    .iter()
                    .find(|r| r.id == choice)
                    .map(|r| {
                        r.items
                            .iter()
                            .map(|(key, value)| (Context::placeholder(key), value.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                ChainEffect::MergeContext(items)
            }
            _ => return Completion::new(0),
        };
        Completion::with_effect(0, effect)
    }

    async fn run_decision(&mut self, env: &JobEnvironment) -> Result<JobOutcome, JobError> {
        let choices = self.decision_choices(env);

        if let Some(choice) = env
            .decisions
            .preconfigured_choice(&self.package, &self.link.id)
            .await?
        {
            if choices.iter().any(|c| c.value == choice) {
                info!(
                    "Decision at link {} for {} resolved to '{}' without user input",
                    self.link.id, self.package.id, choice
                );
                if let Err(e) = env
                    .decisions
                    .remember(self.package.id, &self.link.id, &choice)
                    .await
                {
                    warn!("Failed to store decision for link {} of {}: {}", self.link.id, self.package.id, e);
                }
                return Ok(JobOutcome::Completed(self.decision_completion(&choice)));
            }
            warn!(
                "Configured choice '{}' is not offered at link {}; ignoring it",
                choice, self.link.id
            );
        }

        if choices.is_empty() {
            warn!(
                "Decision at link {} of {} has nothing to choose from; completing with exit code {}",
                self.link.id, self.package.id, INCOMPLETE_CONFIGURATION_EXIT_CODE
            );
            return Ok(JobOutcome::Completed(Completion::new(
                INCOMPLETE_CONFIGURATION_EXIT_CODE,
            )));
        }

        if env.decisions.is_interactive() {
            return Ok(JobOutcome::AwaitingDecision(choices));
        }

        warn!(
            "No configured choice for link {} of {}; completing with exit code {}",
            self.link.id, self.package.id, INCOMPLETE_CONFIGURATION_EXIT_CODE
        );
        Ok(JobOutcome::Completed(Completion::new(
            INCOMPLETE_CONFIGURATION_EXIT_CODE,
        )))
    }
}
