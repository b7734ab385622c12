//! Job chains
//!
//! A [`JobChain`] walks the links of one package, one job at a time. It owns
//! the substitution context and the choices generated along the way, and is
//! moved together with its only outstanding job.

use archflow_core::choices::GeneratedChoices;
use archflow_core::domain::job::JobStatus;
use archflow_core::domain::package::Package;
use archflow_core::domain::unit_variable::REPLACEMENT_DICT_VARIABLE;
use archflow_core::workflow::Workflow;
use archflow_core::{Context, ContextError, WorkflowError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::{ChainEffect, Completion, Job};
use crate::repository::{Repository, RepositoryError};

/// Structural errors that end a package's processing
#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("link {link_id} has no next link and is not terminal")]
    DeadEnd { link_id: String },

    #[error("job {0} is still outstanding")]
    JobOutstanding(Uuid),

    #[error("no job was issued for this chain")]
    NoJobIssued,

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("stored context is unusable: {0}")]
    Context(#[from] ContextError),
}

/// Result of advancing past a completed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Status to record on the completed job
    pub status: JobStatus,
    /// Whether the chain has no further link
    pub exhausted: bool,
}

/// Progress of one package through the workflow
#[derive(Debug)]
pub struct JobChain {
    package: Package,
    workflow: Arc<Workflow>,
    chain_id: String,
    current_link: Option<String>,
    context: Context,
    generated_choices: GeneratedChoices,
    outstanding: Option<Uuid>,
}

impl JobChain {
    /// Creates a chain positioned on the entry link of `chain_id`
    ///
    /// # Errors
    /// Returns [`WorkflowError::UnknownChain`] if the chain does not exist.
    pub fn new(
        package: Package,
        workflow: Arc<Workflow>,
        chain_id: &str,
        context: Context,
    ) -> Result<Self, ChainError> {
        let entry = workflow.chain(chain_id)?.link_id.clone();
        Ok(Self {
            package,
            workflow,
            chain_id: chain_id.to_string(),
            current_link: Some(entry),
            context,
            generated_choices: GeneratedChoices::default(),
            outstanding: None,
        })
    }

    /// Context persisted for a package in its `replacementDict` unit variable
    pub async fn stored_context(
        repository: &dyn Repository,
        package_id: Uuid,
    ) -> Result<Context, ChainError> {
        match repository
            .get_unit_variable(package_id, REPLACEMENT_DICT_VARIABLE)
            .await?
        {
            Some(variable) if !variable.value.is_empty() => Ok(Context::from_json(&variable.value)?),
            _ => Ok(Context::new()),
        }
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn current_link(&self) -> Option<&str> {
        self.current_link.as_deref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_link.is_none()
    }

    /// Builds the job for the current link, or `None` once exhausted
    ///
    /// # Errors
    /// [`ChainError::JobOutstanding`] while the previous job has not been
    /// passed to [`JobChain::advance`].
    pub fn next(&mut self) -> Result<Option<Job>, ChainError> {
        if let Some(job_id) = self.outstanding {
            return Err(ChainError::JobOutstanding(job_id));
        }
        let Some(link_id) = self.current_link.as_deref() else {
            return Ok(None);
        };

        let link = self.workflow.link(link_id)?;
        let job = Job::new(
            self.package.clone(),
            self.chain_id.clone(),
            link,
            self.context.clone(),
            self.generated_choices.clone(),
        );
        self.outstanding = Some(job.id);
        Ok(Some(job))
    }

    /// Moves past the current link using the job's completion
    ///
    /// # Errors
    /// [`ChainError::DeadEnd`] when the exit code leads nowhere from a
    /// non-terminal link, and workflow errors for unknown jump targets.
    pub fn advance(&mut self, completion: &Completion) -> Result<Advance, ChainError> {
        let Some(job_id) = self.outstanding.take() else {
            return Err(ChainError::NoJobIssued);
        };
        let Some(link_id) = self.current_link.clone() else {
            return Err(ChainError::NoJobIssued);
        };

        let workflow = Arc::clone(&self.workflow);
        let link = workflow.link(&link_id)?;
        let resolution = link.resolve(completion.exit_code);
        debug!(
            "Job {} at link {} exited {} ({})",
            job_id, link_id, completion.exit_code, resolution.status
        );

        let mut jump = None;
        match &completion.effect {
            Some(ChainEffect::MergeContext(entries)) => {
                self.context = self.context.layered(entries);
            }
            Some(ChainEffect::GeneratedChoices(choices)) => {
                self.generated_choices = choices.clone();
            }
            Some(ChainEffect::JumpToChain(chain_id)) => {
                let chain = workflow.chain(chain_id)?;
                self.chain_id = chain.id.clone();
                jump = Some(chain.link_id.clone());
            }
            Some(ChainEffect::JumpToLink(target)) => {
                workflow.link(target)?;
                jump = Some(target.clone());
            }
            None => {}
        }

        let advance = |exhausted| Advance {
            status: resolution.status,
            exhausted,
        };

        if let Some(target) = jump {
            debug!("Package {} jumps to link {}", self.package.id, target);
            self.current_link = Some(target);
            return Ok(advance(false));
        }

        match resolution.next_link {
            Some(next) => {
                self.current_link = Some(next.to_string());
                Ok(advance(false))
            }
            None if link.is_terminal() => {
                self.current_link = None;
                Ok(advance(true))
            }
            None => Err(ChainError::DeadEnd { link_id }),
        }
    }
}
