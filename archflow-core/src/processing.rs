//! Processing configuration documents
//!
//! A processing configuration answers workflow decisions ahead of time so
//! packages can run unattended. Documents are JSON:
//!
//! ```json
//! {"preconfigured_choices": [{"applies_to": "<link id>", "go_to_chain": "<choice>"}]}
//! ```

use serde::{Deserialize, Serialize};

/// A stored answer for one decision link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreconfiguredChoice {
    pub applies_to: String,
    pub go_to_chain: String,
}

/// Named set of preconfigured choices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default)]
    pub preconfigured_choices: Vec<PreconfiguredChoice>,
}

impl ProcessingConfig {
    pub fn parse(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }

    /// Preconfigured choice for `link_id`; the last matching entry wins
    pub fn choice_for(&self, link_id: &str) -> Option<&str> {
        self.preconfigured_choices
            .iter()
            .rev()
            .find(|choice| choice.applies_to == link_id)
            .map(|choice| choice.go_to_chain.as_str())
    }
}
