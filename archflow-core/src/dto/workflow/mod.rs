//! Workflow DTOs

use serde::{Deserialize, Serialize};

use crate::workflow::Workflow;

/// Size of the loaded workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub chains: usize,
    pub links: usize,
    pub watched_directories: usize,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(workflow: &Workflow) -> Self {
        WorkflowSummary {
            chains: workflow.chain_count(),
            links: workflow.link_count(),
            watched_directories: workflow.watched_directory_count(),
        }
    }
}
