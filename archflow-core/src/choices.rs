//! Decision choices
//!
//! Output client scripts print a JSON object of candidate choices on stdout;
//! a following output decision picks one of them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry printed by an output client script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedChoice {
    pub description: String,
    pub uri: String,
}

/// Choices generated by an output client script, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratedChoices(BTreeMap<String, GeneratedChoice>);

impl GeneratedChoices {
    /// Parses `{"key": {"description": "...", "uri": "..."}}` from script output
    pub fn parse(stdout: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(stdout.trim())
    }

    pub fn get(&self, key: &str) -> Option<&GeneratedChoice> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GeneratedChoice)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, GeneratedChoice)> for GeneratedChoices {
    fn from_iter<I: IntoIterator<Item = (String, GeneratedChoice)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Candidate answer offered by a decision job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionChoice {
    /// Value reported back through `decide`
    pub value: String,
    /// Human-readable description
    pub label: String,
}

impl DecisionChoice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}
