//! Translated labels

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Language used when a translation is missing
pub const FALLBACK_LANG: &str = "en";

/// Human-readable text keyed by language code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(BTreeMap<String, String>);

impl Label {
    /// Translation for `lang`, falling back to English
    pub fn get(&self, lang: &str) -> Option<&str> {
        self.0
            .get(lang)
            .or_else(|| self.0.get(FALLBACK_LANG))
            .map(String::as_str)
    }

    /// English text, or any translation when English is missing
    pub fn text(&self) -> &str {
        self.get(FALLBACK_LANG)
            .or_else(|| self.0.values().next().map(String::as_str))
            .unwrap_or_default()
    }
}

impl From<&str> for Label {
    fn from(text: &str) -> Self {
        Self(BTreeMap::from([(FALLBACK_LANG.to_string(), text.to_string())]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_fallback() {
        let label: Label =
            serde_json::from_str(r#"{"en": "Approve transfer", "fr": "Approuver"}"#).unwrap();
        assert_eq!(label.get("fr"), Some("Approuver"));
        assert_eq!(label.get("de"), Some("Approve transfer"));
        assert_eq!(label.text(), "Approve transfer");
    }

    #[test]
    fn test_label_without_english() {
        let label: Label = serde_json::from_str(r#"{"pt_BR": "Aprovar"}"#).unwrap();
        assert_eq!(label.get("en"), None);
        assert_eq!(label.text(), "Aprovar");
        assert_eq!(Label::default().text(), "");
    }
}
