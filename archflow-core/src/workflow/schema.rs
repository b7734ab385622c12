//! Schema validation of raw workflow documents

use jsonschema::JSONSchema;
use serde_json::Value;

use super::WorkflowError;

/// Versioned schema every workflow document must satisfy
pub const SCHEMA_V1: &str = include_str!("../../assets/workflow-schema-v1.json");

/// Validates `document` against [`SCHEMA_V1`], reporting the first violation
pub(crate) fn validate(document: &Value) -> Result<(), WorkflowError> {
    let schema: Value = serde_json::from_str(SCHEMA_V1)?;
    let compiled = JSONSchema::compile(&schema).map_err(|e| WorkflowError::Schema {
        path: "<schema>".to_string(),
        message: e.to_string(),
    })?;

    if let Err(mut errors) = compiled.validate(document) {
        if let Some(error) = errors.next() {
            let path = error.instance_path.to_string();
            return Err(WorkflowError::Schema {
                path: if path.is_empty() { "/".to_string() } else { path },
                message: error.to_string(),
            });
        }
    }

    Ok(())
}
