//! Workflow graph
//!
//! A workflow document declares chains, links and watched directories.
//! Loading runs four stages: JSON parsing, schema validation, serde
//! decoding and referential checks. Any violation is fatal; the loader never
//! repairs a document. The resulting [`Workflow`] is read-only.

mod label;
mod link;
mod schema;

pub use label::{FALLBACK_LANG, Label};
pub use link::{ContextReplacement, ExitCodeRoute, JobKind, Link, LinkConfig, Resolution, ScriptConfig};
pub use schema::SCHEMA_V1;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;
use thiserror::Error;

use crate::domain::job::JobStatus;
use crate::domain::package::PackageKind;

/// Errors raised while loading or querying a workflow
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to read workflow: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid workflow JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema violation at {path}: {message}")]
    Schema { path: String, message: String },

    #[error("{from}: unknown job status {label:?}")]
    UnknownStatus { from: String, label: String },

    #[error("link {link_id}: exit code key {key:?} is not an integer")]
    InvalidExitCode { link_id: String, key: String },

    #[error("{from} references unknown link {link_id}")]
    DanglingLink { from: String, link_id: String },

    #[error("{from} references unknown chain {chain_id}")]
    DanglingChain { from: String, chain_id: String },

    #[error("link not found: {0}")]
    UnknownLink(String),

    #[error("chain not found: {0}")]
    UnknownChain(String),
}

/// Named sequence of links, entered at `link_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chain {
    pub id: String,
    pub description: Label,
    pub link_id: String,
}

/// Directory whose new entries start a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedDirectory {
    pub path: String,
    pub unit_type: PackageKind,
    pub chain_id: String,
    #[serde(default)]
    pub only_dirs: bool,
}

/// Validated workflow graph
#[derive(Debug, Clone)]
pub struct Workflow {
    chains: BTreeMap<String, Chain>,
    links: BTreeMap<String, Link>,
    watched_directories: Vec<WatchedDirectory>,
}

// =============================================================================
// Document Shape
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawWorkflow {
    chains: BTreeMap<String, RawChain>,
    links: BTreeMap<String, RawLink>,
    watched_directories: Vec<WatchedDirectory>,
}

#[derive(Debug, Deserialize)]
struct RawChain {
    #[serde(default)]
    description: Label,
    link_id: String,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    #[serde(default)]
    description: Label,
    #[serde(default)]
    group: Label,
    config: LinkConfig,
    exit_codes: BTreeMap<String, RawExitCode>,
    #[serde(default)]
    fallback_link_id: Option<String>,
    fallback_job_status: String,
    #[serde(default)]
    end: bool,
}

#[derive(Debug, Deserialize)]
struct RawExitCode {
    #[serde(default)]
    link_id: Option<String>,
    job_status: String,
}

fn decode_status(from: &str, label: &str) -> Result<JobStatus, WorkflowError> {
    JobStatus::from_label(label).ok_or_else(|| WorkflowError::UnknownStatus {
        from: from.to_string(),
        label: label.to_string(),
    })
}

impl RawLink {
    fn decode(self, id: String) -> Result<Link, WorkflowError> {
        let origin = format!("link {}", id);
        let mut exit_codes = BTreeMap::new();

        for (key, route) in self.exit_codes {
            let code: i32 = key.parse().map_err(|_| WorkflowError::InvalidExitCode {
                link_id: id.clone(),
                key: key.clone(),
            })?;
            let job_status = decode_status(&origin, &route.job_status)?;
            exit_codes.insert(
                code,
                ExitCodeRoute {
                    link_id: route.link_id,
                    job_status,
                },
            );
        }

        Ok(Link {
            fallback_job_status: decode_status(&origin, &self.fallback_job_status)?,
            id,
            description: self.description,
            group: self.group,
            config: self.config,
            exit_codes,
            fallback_link_id: self.fallback_link_id,
            end: self.end,
        })
    }
}

// =============================================================================
// Loading
// =============================================================================

impl Workflow {
    /// Loads a workflow document from a reader
    pub fn load<R: Read>(reader: R) -> Result<Self, WorkflowError> {
        let document: Value = serde_json::from_reader(reader)?;
        Self::from_value(document)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, WorkflowError> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(document: &str) -> Result<Self, WorkflowError> {
        Self::from_value(serde_json::from_str(document)?)
    }

    /// Validates and decodes an already parsed document
    pub fn from_value(document: Value) -> Result<Self, WorkflowError> {
        schema::validate(&document)?;
        let raw: RawWorkflow = serde_json::from_value(document)?;

        let chains = raw
            .chains
            .into_iter()
            .map(|(id, chain)| {
                let chain = Chain {
                    id: id.clone(),
                    description: chain.description,
                    link_id: chain.link_id,
                };
                (id, chain)
            })
            .collect();

        let mut links = BTreeMap::new();
        for (id, link) in raw.links {
            links.insert(id.clone(), link.decode(id)?);
        }

        let workflow = Self {
            chains,
            links,
            watched_directories: raw.watched_directories,
        };
        workflow.check_references()?;
        Ok(workflow)
    }

    fn check_references(&self) -> Result<(), WorkflowError> {
        for chain in self.chains.values() {
            self.expect_link(&format!("chain {}", chain.id), &chain.link_id)?;
        }

        for link in self.links.values() {
            let origin = format!("link {}", link.id);
            for link_id in link.referenced_links() {
                self.expect_link(&origin, link_id)?;
            }
            for chain_id in link.config.referenced_chains() {
                self.expect_chain(&origin, chain_id)?;
            }
        }

        for watched in &self.watched_directories {
            self.expect_chain(&format!("watched directory {}", watched.path), &watched.chain_id)?;
        }

        Ok(())
    }

    fn expect_link(&self, from: &str, link_id: &str) -> Result<(), WorkflowError> {
        if self.links.contains_key(link_id) {
            return Ok(());
        }
        Err(WorkflowError::DanglingLink {
            from: from.to_string(),
            link_id: link_id.to_string(),
        })
    }

    fn expect_chain(&self, from: &str, chain_id: &str) -> Result<(), WorkflowError> {
        if self.chains.contains_key(chain_id) {
            return Ok(());
        }
        Err(WorkflowError::DanglingChain {
            from: from.to_string(),
            chain_id: chain_id.to_string(),
        })
    }
}

// =============================================================================
// Queries
// =============================================================================

impl Workflow {
    pub fn link(&self, id: &str) -> Result<&Link, WorkflowError> {
        self.links
            .get(id)
            .ok_or_else(|| WorkflowError::UnknownLink(id.to_string()))
    }

    pub fn chain(&self, id: &str) -> Result<&Chain, WorkflowError> {
        self.chains
            .get(id)
            .ok_or_else(|| WorkflowError::UnknownChain(id.to_string()))
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn watched_directories(&self) -> impl Iterator<Item = &WatchedDirectory> {
        self.watched_directories.iter()
    }

    /// Watched directory declared for `path`, ignoring surrounding slashes
    pub fn watched_directory(&self, path: &str) -> Option<&WatchedDirectory> {
        let wanted = path.trim_matches('/');
        self.watched_directories
            .iter()
            .find(|watched| watched.path.trim_matches('/') == wanted)
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn watched_directory_count(&self) -> usize {
        self.watched_directories.len()
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chains {}, links {}, watched directories {}",
            self.chain_count(),
            self.link_count(),
            self.watched_directory_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "chains": {
                "C1": {"description": {"en": "Approve"}, "link_id": "A"},
                "C2": {"link_id": "C"}
            },
            "links": {
                "A": {
                    "description": {"en": "Run script"},
                    "group": {"en": "Transfer"},
                    "config": {"kind": "client_script", "execute": "echo_v0.0", "arguments": "%SIPUUID%"},
                    "exit_codes": {"0": {"link_id": "B", "job_status": "Completed successfully"}},
                    "fallback_link_id": "C",
                    "fallback_job_status": "Failed"
                },
                "B": {
                    "config": {"kind": "next_chain_decision", "chain_choices": ["C2"]},
                    "exit_codes": {},
                    "fallback_job_status": "Completed successfully",
                    "end": true
                },
                "C": {
                    "config": {"kind": "set_unit_variable", "variable": "reNormalize", "link_id": "A"},
                    "exit_codes": {"0": {"link_id": null, "job_status": "Completed successfully"}},
                    "fallback_job_status": "Failed",
                    "end": true
                }
            },
            "watched_directories": [
                {"path": "/activeTransfers/standardTransfer", "unit_type": "Transfer", "chain_id": "C1", "only_dirs": true}
            ]
        })
    }

    #[test]
    fn test_load_valid_document() {
        let workflow = Workflow::from_value(document()).unwrap();
        assert_eq!(workflow.to_string(), "Chains 2, links 3, watched directories 1");

        let chain = workflow.chain("C1").unwrap();
        assert_eq!(chain.description.text(), "Approve");
        assert_eq!(workflow.link(&chain.link_id).unwrap().config.kind(), JobKind::ClientScript);

        for link in workflow.links() {
            for code in [-1, 0, 1, 2] {
                if let Some(next) = link.next_link_id(code) {
                    assert!(workflow.link(next).is_ok());
                }
            }
        }
    }

    #[test]
    fn test_load_from_reader() {
        let text = serde_json::to_vec(&document()).unwrap();
        let workflow = Workflow::load(text.as_slice()).unwrap();
        assert_eq!(workflow.link_count(), 3);
    }

    #[test]
    fn test_fallback_literal_example() {
        let workflow = Workflow::from_value(document()).unwrap();
        let link = workflow.link("A").unwrap();
        assert_eq!(link.next_link_id(0), Some("B"));
        assert_eq!(link.next_link_id(1), Some("C"));
        assert_eq!(link.status_for(1), JobStatus::Failed);
    }

    #[test]
    fn test_dangling_link_is_rejected() {
        let mut doc = document();
        doc["links"]["A"]["exit_codes"]["0"]["link_id"] = json!("missing");
        let err = Workflow::from_value(doc).unwrap_err();
        assert!(
            matches!(err, WorkflowError::DanglingLink { ref from, ref link_id } if from == "link A" && link_id == "missing")
        );
    }

    #[test]
    fn test_dangling_chain_is_rejected() {
        let mut doc = document();
        doc["watched_directories"][0]["chain_id"] = json!("C9");
        let err = Workflow::from_value(doc).unwrap_err();
        assert!(matches!(err, WorkflowError::DanglingChain { ref chain_id, .. } if chain_id == "C9"));

        let mut doc = document();
        doc["links"]["B"]["config"]["chain_choices"] = json!(["C2", "C3"]);
        assert!(matches!(
            Workflow::from_value(doc),
            Err(WorkflowError::DanglingChain { .. })
        ));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let mut doc = document();
        doc["links"]["A"]["fallback_job_status"] = json!("Exploded");
        let err = Workflow::from_value(doc).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStatus { ref label, .. } if label == "Exploded"));
    }

    #[test]
    fn test_schema_violation_reports_path() {
        let mut doc = document();
        doc["links"]["A"]["config"] = json!({"kind": "client_script"});
        match Workflow::from_value(doc) {
            Err(WorkflowError::Schema { path, .. }) => assert!(path.starts_with("/links/A/config")),
            other => panic!("expected schema error, got {:?}", other),
        }

        let mut doc = document();
        doc["links"]["A"]["exit_codes"]["zero"] = json!({"job_status": "Failed"});
        assert!(matches!(
            Workflow::from_value(doc),
            Err(WorkflowError::Schema { .. })
        ));
    }

    #[test]
    fn test_unknown_ids_and_watched_lookup() {
        let workflow = Workflow::from_value(document()).unwrap();
        assert!(matches!(workflow.link("Z"), Err(WorkflowError::UnknownLink(_))));
        assert!(matches!(workflow.chain("Z"), Err(WorkflowError::UnknownChain(_))));

        let watched = workflow
            .watched_directory("activeTransfers/standardTransfer/")
            .unwrap();
        assert_eq!(watched.unit_type, PackageKind::Transfer);
        assert!(workflow.watched_directory("/activeTransfers/zipped").is_none());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            Workflow::from_str("{not json"),
            Err(WorkflowError::Json(_))
        ));
    }
}
