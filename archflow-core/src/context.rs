//! Substitution context
//!
//! A [`Context`] maps `%placeholder%` keys to replacement values. It is
//! immutable: every update produces a new value, so each job of a chain
//! sees a stable snapshot of what earlier jobs decided.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised when decoding a stored context
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("stored context is not a JSON object: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Placeholder to value mapping used to build task arguments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    entries: BTreeMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy with one more entry
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Context {
        self.extended([(key, value)])
    }

    /// Returns a copy extended with `entries`; later entries overwrite earlier keys
    pub fn extended<I, K, V>(&self, entries: I) -> Context
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = self.clone();
        for (key, value) in entries {
            next.entries.insert(key.into(), value.into());
        }
        next
    }

    /// Returns a copy where every key of `overrides` wins
    pub fn layered(&self, overrides: &Context) -> Context {
        self.extended(overrides.iter())
    }

    /// Replaces every known `%key%` token in `template`
    ///
    /// Substitution is a single left-to-right pass: replacement values are
    /// never rescanned, and unknown tokens are kept verbatim.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];

            let Some(end) = tail[1..].find('%') else {
                out.push_str(tail);
                return out;
            };

            let token = &tail[..end + 2];
            match self.entries.get(token) {
                Some(value) => {
                    out.push_str(value);
                    rest = &tail[token.len()..];
                }
                None => {
                    out.push('%');
                    rest = &tail[1..];
                }
            }
        }

        out.push_str(rest);
        out
    }

    /// Decodes a JSON object stored as a unit variable
    ///
    /// Non-string values keep their JSON text. Keys are wrapped as
    /// placeholders when stored bare.
    pub fn from_json(document: &str) -> Result<Context, ContextError> {
        let entries: BTreeMap<String, Value> = serde_json::from_str(document)?;
        Ok(entries
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                (Context::placeholder(&key), value)
            })
            .collect())
    }

    /// Wraps a bare variable name as `%name%`
    pub fn placeholder(name: &str) -> String {
        if name.len() >= 2 && name.starts_with('%') && name.ends_with('%') {
            name.to_string()
        } else {
            format!("%{}%", name)
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Context
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Context::new().extended(iter)
    }
}
