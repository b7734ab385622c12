//! Unit variable domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::package::PackageKind;

/// Name of the unit variable holding persisted context entries
pub const REPLACEMENT_DICT_VARIABLE: &str = "replacementDict";

/// Key/value fact scoped to a package
///
/// Written by set-unit-variable links and read back by get-unit-variable
/// links, which use `link_id` to redirect the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitVariable {
    pub package_id: Uuid,
    pub unit_type: PackageKind,
    pub variable: String,
    pub value: String,
    pub link_id: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl UnitVariable {
    pub fn new(
        package_id: Uuid,
        unit_type: PackageKind,
        variable: impl Into<String>,
        value: impl Into<String>,
        link_id: Option<String>,
    ) -> Self {
        Self {
            package_id,
            unit_type,
            variable: variable.into(),
            value: value.into(),
            link_id,
            updated_at: chrono::Utc::now(),
        }
    }
}
