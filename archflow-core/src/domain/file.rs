//! File domain types

use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::context::Context;

/// `%fileUUID%` value for files found on disk without a stored row
pub const UNTRACKED_FILE_UUID: &str = "None";

/// Stored file row belonging to a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub package_id: Uuid,
    pub original_location: String,
    /// Location relative to the package placeholder, e.g. `%transferDirectory%objects/a.tif`
    pub current_location: String,
    pub file_grp_use: String,
}

impl FileRecord {
    /// Absolute on-disk path given the package directory
    pub fn absolute_path(&self, unit_directory: &str) -> String {
        self.current_location
            .replace("%SIPDirectory%", unit_directory)
            .replace("%transferDirectory%", unit_directory)
    }

    /// Per-file placeholder mapping
    pub fn replacement_mapping(&self, unit_directory: &str) -> Context {
        let absolute = self.absolute_path(unit_directory);
        let location = Path::new(&self.current_location);
        let directory = location
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = location
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = location
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension_with_dot = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };

        Context::from_iter([
            ("%fileUUID%", self.id.to_string()),
            ("%originalLocation%", self.original_location.clone()),
            ("%currentLocation%", self.current_location.clone()),
            ("%fileGrpUse%", self.file_grp_use.clone()),
            ("%fileDirectory%", directory),
            ("%fileName%", name),
            ("%fileExtension%", extension),
            ("%fileExtensionWithDot%", extension_with_dot),
            ("%relativeLocation%", absolute.clone()),
            ("%inputFile%", absolute.clone()),
            ("%fileFullName%", absolute),
        ])
    }

    /// Mapping for a file on disk that has no stored row
    pub fn untracked_mapping(path: &str) -> Context {
        Context::from_iter([
            ("%relativeLocation%", path),
            ("%fileUUID%", UNTRACKED_FILE_UUID),
            ("%fileGrpUse%", ""),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_mapping() {
        let record = FileRecord {
            id: Uuid::new_v4(),
            package_id: Uuid::new_v4(),
            original_location: "%transferDirectory%objects/scan.tar.gz".to_string(),
            current_location: "%transferDirectory%objects/scan.tar.gz".to_string(),
            file_grp_use: "original".to_string(),
        };

        let mapping = record.replacement_mapping("/data/transfer/");

        assert_eq!(mapping.get("%fileUUID%"), Some(record.id.to_string().as_str()));
        assert_eq!(mapping.get("%fileName%"), Some("scan.tar"));
        assert_eq!(mapping.get("%fileExtension%"), Some("gz"));
        assert_eq!(mapping.get("%fileExtensionWithDot%"), Some(".gz"));
        assert_eq!(
            mapping.get("%fileDirectory%"),
            Some("%transferDirectory%objects")
        );
        assert_eq!(
            mapping.get("%inputFile%"),
            Some("/data/transfer/objects/scan.tar.gz")
        );
        assert_eq!(mapping.get("%fileGrpUse%"), Some("original"));
    }

    #[test]
    fn test_untracked_mapping_uses_sentinel_uuid() {
        let mapping = FileRecord::untracked_mapping("/data/transfer/objects/new.txt");
        assert_eq!(mapping.get("%fileUUID%"), Some("None"));
        assert_eq!(mapping.get("%fileGrpUse%"), Some(""));
        assert_eq!(
            mapping.get("%relativeLocation%"),
            Some("/data/transfer/objects/new.txt")
        );
    }
}
