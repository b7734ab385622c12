//! Package domain types
//!
//! A package is a transfer, a SIP or a DIP travelling through the workflow.
//! Paths are stored with the shared directory abbreviated to
//! [`SHARED_PATH_PLACEHOLDER`] and expanded through [`SharedDirectories`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Context;

/// Placeholder standing in for the shared directory in stored paths
pub const SHARED_PATH_PLACEHOLDER: &str = "%sharedPath%";

/// Unit type of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageKind {
    #[serde(rename = "Transfer")]
    Transfer,
    #[serde(rename = "SIP")]
    Sip,
    #[serde(rename = "DIP")]
    Dip,
}

impl PackageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageKind::Transfer => "Transfer",
            PackageKind::Sip => "SIP",
            PackageKind::Dip => "DIP",
        }
    }

    /// Placeholder used for the package directory in stored file locations
    pub fn path_placeholder(self) -> &'static str {
        match self {
            PackageKind::Transfer => "%transferDirectory%",
            PackageKind::Sip | PackageKind::Dip => "%SIPDirectory%",
        }
    }
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PackageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transfer" => Ok(PackageKind::Transfer),
            "sip" => Ok(PackageKind::Sip),
            "dip" => Ok(PackageKind::Dip),
            other => Err(format!("unknown package kind '{}'", other)),
        }
    }
}

/// Package processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    Unknown,
    Processing,
    Done,
    Failed,
    Rejected,
}

impl PackageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageStatus::Unknown => "unknown",
            PackageStatus::Processing => "processing",
            PackageStatus::Done => "done",
            PackageStatus::Failed => "failed",
            PackageStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(PackageStatus::Unknown),
            "processing" => Some(PackageStatus::Processing),
            "done" => Some(PackageStatus::Done),
            "failed" => Some(PackageStatus::Failed),
            "rejected" => Some(PackageStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PackageStatus::Done | PackageStatus::Failed | PackageStatus::Rejected
        )
    }
}

impl std::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transfer, SIP or DIP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    pub kind: PackageKind,
    /// Current location, as stored (may contain `%sharedPath%`)
    pub current_path: String,
    pub status: PackageStatus,
    /// Name of the processing configuration used to answer decisions
    pub processing_configuration: String,
    pub aip_filename: Option<String>,
    pub sip_type: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Package {
    pub fn new(id: Uuid, kind: PackageKind, current_path: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            current_path: current_path.into(),
            status: PackageStatus::Unknown,
            processing_configuration: "default".to_string(),
            aip_filename: None,
            sip_type: None,
            created_at: chrono::Utc::now(),
            completed_at: None,
        }
    }

    /// Directory basename with the trailing `-<uuid>` removed
    pub fn package_name(&self) -> String {
        basename(&self.current_path).replace(&format!("-{}", self.id), "")
    }

    /// Builds the placeholder mapping for this package
    ///
    /// Base replacements come first, then package-level values. When
    /// `filter_subdir` is given, `%relativeLocation%` points at that
    /// subdirectory instead of the package root.
    pub fn replacement_mapping(
        &self,
        dirs: &SharedDirectories,
        filter_subdir: Option<&str>,
    ) -> Context {
        let path = dirs.expand(&self.current_path);
        let relative_location = match filter_subdir {
            Some(subdir) => dirs.abbreviate(&join_path(&path, subdir)),
            None => dirs.abbreviate(&path),
        };

        let mut entries = vec![
            ("%SIPUUID%", self.id.to_string()),
            ("%SIPName%", self.package_name()),
            ("%SIPLogsDirectory%", join_dir(&path, "logs")),
            ("%SIPObjectsDirectory%", join_dir(&path, "objects")),
            ("%SIPDirectoryBasename%", basename(&path).to_string()),
            ("%relativeLocation%", relative_location),
            ("%unitType%", self.kind.as_str().to_string()),
        ];

        match self.kind {
            PackageKind::Transfer => {
                entries.push(("%transferDirectory%", path.clone()));
                entries.push((
                    "%processingConfiguration%",
                    self.processing_configuration.clone(),
                ));
            }
            PackageKind::Sip => {
                entries.push(("%AIPFilename%", self.aip_filename.clone().unwrap_or_default()));
                entries.push(("%SIPType%", self.sip_type.clone().unwrap_or_default()));
            }
            PackageKind::Dip => {}
        }
        entries.push(("%SIPDirectory%", path));

        dirs.base_replacements().extended(entries)
    }
}

// =============================================================================
// Shared Directories
// =============================================================================

/// Locations of the shared directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedDirectories {
    /// Shared directory, always with a trailing slash
    pub shared: String,
    pub processing: String,
    pub watch: String,
    pub rejected: String,
}

impl SharedDirectories {
    /// Creates the directory set with the conventional layout under `shared`
    pub fn new(shared: impl Into<String>) -> Self {
        let shared = with_trailing_slash(&shared.into());
        Self {
            processing: join_dir(&shared, "currentlyProcessing"),
            watch: join_dir(&shared, "watchedDirectories"),
            rejected: join_dir(&shared, "rejected"),
            shared,
        }
    }

    pub fn tmp(&self) -> String {
        join_dir(&self.shared, "tmp")
    }

    /// Replaces `%sharedPath%` with the shared directory
    pub fn expand(&self, path: &str) -> String {
        path.replace(SHARED_PATH_PLACEHOLDER, &self.shared)
    }

    /// Replaces the leading shared directory with `%sharedPath%`
    pub fn abbreviate(&self, path: &str) -> String {
        path.replacen(&self.shared, SHARED_PATH_PLACEHOLDER, 1)
    }

    /// Replacements available to every job
    pub fn base_replacements(&self) -> Context {
        Context::from_iter([
            ("%tmpDirectory%", self.tmp()),
            ("%processingDirectory%", self.processing.clone()),
            ("%watchDirectoryPath%", self.watch.clone()),
            ("%rejectedDirectory%", self.rejected.clone()),
        ])
    }
}

// =============================================================================
// Path Helpers
// =============================================================================

/// Extracts the uuid suffix (`name-<uuid>`) from a package path
pub fn uuid_from_path(path: &str) -> Option<Uuid> {
    let name = basename(path);
    let split = name.len().checked_sub(36)?;
    let (head, tail) = (name.get(..split)?, name.get(split..)?);
    if !head.ends_with('-') {
        return None;
    }
    Uuid::parse_str(tail).ok()
}

/// Last path component, ignoring trailing slashes
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Joins a directory name onto `base`, keeping a trailing slash
pub fn join_dir(base: &str, name: &str) -> String {
    format!("{}/{}/", base.trim_end_matches('/'), name.trim_matches('/'))
}

/// Joins a relative path onto `base`
pub fn join_path(base: &str, relative: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), relative.trim_start_matches('/'))
}

fn with_trailing_slash(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}
