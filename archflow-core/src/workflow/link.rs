//! Links, their job configuration and exit-code routing

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Label;
use crate::domain::job::JobStatus;

/// One step of the workflow
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: String,
    pub description: Label,
    pub group: Label,
    pub config: LinkConfig,
    pub exit_codes: BTreeMap<i32, ExitCodeRoute>,
    pub fallback_link_id: Option<String>,
    pub fallback_job_status: JobStatus,
    pub end: bool,
}

/// Explicit routing entry for one exit code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitCodeRoute {
    pub link_id: Option<String>,
    pub job_status: JobStatus,
}

/// Where an exit code leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    /// Next link, if any
    pub next_link: Option<&'a str>,
    /// Status recorded for the completed job
    pub status: JobStatus,
    /// Whether the exit code had an explicit entry (otherwise the fallback applied)
    pub explicit: bool,
}

impl Link {
    pub fn is_terminal(&self) -> bool {
        self.end
    }

    /// Resolves an exit code to the next link and job status
    ///
    /// Codes without an entry in the exit-code table take the fallback link
    /// and fallback status. Every code resolves.
    pub fn resolve(&self, exit_code: i32) -> Resolution<'_> {
        match self.exit_codes.get(&exit_code) {
            Some(route) => Resolution {
                next_link: route.link_id.as_deref(),
                status: route.job_status,
                explicit: true,
            },
            None => Resolution {
                next_link: self.fallback_link_id.as_deref(),
                status: self.fallback_job_status,
                explicit: false,
            },
        }
    }

    pub fn next_link_id(&self, exit_code: i32) -> Option<&str> {
        self.resolve(exit_code).next_link
    }

    pub fn status_for(&self, exit_code: i32) -> JobStatus {
        self.resolve(exit_code).status
    }

    /// Every link id this link can lead to
    pub fn referenced_links(&self) -> impl Iterator<Item = &str> {
        self.exit_codes
            .values()
            .filter_map(|route| route.link_id.as_deref())
            .chain(self.fallback_link_id.as_deref())
            .chain(self.config.referenced_links())
    }
}

// =============================================================================
// Job Configuration
// =============================================================================

/// Kind of job a link produces, together with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkConfig {
    /// One task built from the argument template
    ClientScript(ScriptConfig),
    /// One task for the package directory
    DirectoryClientScript(ScriptConfig),
    /// One task per package file
    FilesClientScript(ScriptConfig),
    /// One task whose stdout lists choices for a following output decision
    OutputClientScript(ScriptConfig),
    /// Choose the chain to continue with
    NextChainDecision { chain_choices: Vec<String> },
    /// Choose one of the generated choices and store it in the context
    OutputDecision { variable: String },
    /// Choose a set of context entries
    UpdateContextDecision { replacements: Vec<ContextReplacement> },
    /// Jump to the link stored with a unit variable
    GetUnitVariable {
        variable: String,
        #[serde(default)]
        default_link_id: Option<String>,
    },
    /// Store a unit variable
    SetUnitVariable {
        variable: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        link_id: Option<String>,
    },
}

/// Parameters shared by the client-script kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Worker capability (script name) to run
    pub execute: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub filter_subdir: Option<String>,
    #[serde(default)]
    pub filter_file_end: Option<String>,
    #[serde(default)]
    pub stdout_file: Option<String>,
    #[serde(default)]
    pub stderr_file: Option<String>,
}

/// Named set of context entries offered by an update-context decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextReplacement {
    pub id: String,
    #[serde(default)]
    pub description: Label,
    pub items: BTreeMap<String, String>,
}

impl LinkConfig {
    pub fn kind(&self) -> JobKind {
        match self {
            LinkConfig::ClientScript(_) => JobKind::ClientScript,
            LinkConfig::DirectoryClientScript(_) => JobKind::DirectoryClientScript,
            LinkConfig::FilesClientScript(_) => JobKind::FilesClientScript,
            LinkConfig::OutputClientScript(_) => JobKind::OutputClientScript,
            LinkConfig::NextChainDecision { .. } => JobKind::NextChainDecision,
            LinkConfig::OutputDecision { .. } => JobKind::OutputDecision,
            LinkConfig::UpdateContextDecision { .. } => JobKind::UpdateContextDecision,
            LinkConfig::GetUnitVariable { .. } => JobKind::GetUnitVariable,
            LinkConfig::SetUnitVariable { .. } => JobKind::SetUnitVariable,
        }
    }

    /// Script parameters of the client-script kinds
    pub fn script(&self) -> Option<&ScriptConfig> {
        match self {
            LinkConfig::ClientScript(script)
            | LinkConfig::DirectoryClientScript(script)
            | LinkConfig::FilesClientScript(script)
            | LinkConfig::OutputClientScript(script) => Some(script),
            _ => None,
        }
    }

    pub(crate) fn referenced_links(&self) -> impl Iterator<Item = &str> {
        let ids: Vec<&str> = match self {
            LinkConfig::GetUnitVariable {
                default_link_id, ..
            } => default_link_id.as_deref().into_iter().collect(),
            LinkConfig::SetUnitVariable { link_id, .. } => link_id.as_deref().into_iter().collect(),
            _ => Vec::new(),
        };
        ids.into_iter()
    }

    pub(crate) fn referenced_chains(&self) -> impl Iterator<Item = &str> {
        let ids: Vec<&str> = match self {
            LinkConfig::NextChainDecision { chain_choices } => {
                chain_choices.iter().map(String::as_str).collect()
            }
            _ => Vec::new(),
        };
        ids.into_iter()
    }
}

/// Job variant produced by a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ClientScript,
    DirectoryClientScript,
    FilesClientScript,
    OutputClientScript,
    NextChainDecision,
    OutputDecision,
    UpdateContextDecision,
    GetUnitVariable,
    SetUnitVariable,
}

impl JobKind {
    pub const ALL: [JobKind; 9] = [
        JobKind::ClientScript,
        JobKind::DirectoryClientScript,
        JobKind::FilesClientScript,
        JobKind::OutputClientScript,
        JobKind::NextChainDecision,
        JobKind::OutputDecision,
        JobKind::UpdateContextDecision,
        JobKind::GetUnitVariable,
        JobKind::SetUnitVariable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::ClientScript => "client_script",
            JobKind::DirectoryClientScript => "directory_client_script",
            JobKind::FilesClientScript => "files_client_script",
            JobKind::OutputClientScript => "output_client_script",
            JobKind::NextChainDecision => "next_chain_decision",
            JobKind::OutputDecision => "output_decision",
            JobKind::UpdateContextDecision => "update_context_decision",
            JobKind::GetUnitVariable => "get_unit_variable",
            JobKind::SetUnitVariable => "set_unit_variable",
        }
    }

    /// Job kind a link produces
    pub fn for_link(link: &Link) -> Self {
        link.config.kind()
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    pub fn is_decision(self) -> bool {
        matches!(
            self,
            JobKind::NextChainDecision | JobKind::OutputDecision | JobKind::UpdateContextDecision
        )
    }

    pub fn dispatches_tasks(self) -> bool {
        matches!(
            self,
            JobKind::ClientScript
                | JobKind::DirectoryClientScript
                | JobKind::FilesClientScript
                | JobKind::OutputClientScript
        )
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
