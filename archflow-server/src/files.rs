//! File enumeration for files client scripts
//!
//! Produces one placeholder mapping per file of a package. Stored file rows
//! whose file still exists on disk keep their identity; anything else found
//! by walking the package directory is reported as untracked.

use archflow_core::Context;
use archflow_core::domain::file::FileRecord;
use archflow_core::domain::package::{Package, SharedDirectories, join_path};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::repository::{Repository, RepositoryError};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Source of the files a files client script iterates over
#[async_trait]
pub trait FileEnumerator: Send + Sync {
    /// Per-file mappings, ordered by path
    ///
    /// # Arguments
    /// * `package` - Package whose files are listed
    /// * `dirs` - Shared directory layout used to expand stored paths
    /// * `filter_subdir` - Restricts the listing to this subdirectory
    /// * `filter_file_end` - Keeps only paths ending with this suffix
    async fn enumerate(
        &self,
        package: &Package,
        dirs: &SharedDirectories,
        filter_subdir: Option<&str>,
        filter_file_end: Option<&str>,
    ) -> Result<Vec<Context>, FileError>;
}

/// Enumerator reconciling stored file rows with the directory contents
pub struct StoreFileEnumerator {
    repository: Arc<dyn Repository>,
}

impl StoreFileEnumerator {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl FileEnumerator for StoreFileEnumerator {
    async fn enumerate(
        &self,
        package: &Package,
        dirs: &SharedDirectories,
        filter_subdir: Option<&str>,
        filter_file_end: Option<&str>,
    ) -> Result<Vec<Context>, FileError> {
        let unit_directory = format!("{}/", dirs.expand(&package.current_path).trim_end_matches('/'));
        let start = match filter_subdir {
            Some(subdir) => join_path(&unit_directory, subdir),
            None => unit_directory.clone(),
        };
        let start_prefix = format!("{}/", start.trim_end_matches('/'));
        let wanted = |path: &str| {
            path.starts_with(&start_prefix)
                && filter_file_end.is_none_or(|suffix| path.ends_with(suffix))
        };

        let on_disk = walk(PathBuf::from(&start)).await?;
        let mut mappings: BTreeMap<String, Context> = BTreeMap::new();

        for record in self.repository.list_files(package.id).await? {
            let path = record.absolute_path(&unit_directory);
            if wanted(&path) && on_disk.contains(&path) {
                mappings.insert(path, record.replacement_mapping(&unit_directory));
            }
        }

        for path in on_disk {
            if wanted(&path) && !mappings.contains_key(&path) {
                let mapping = FileRecord::untracked_mapping(&path);
                mappings.insert(path, mapping);
            }
        }

        Ok(mappings.into_values().collect())
    }
}

/// Lists every regular file below `root`; a missing root is empty
async fn walk(root: PathBuf) -> Result<Vec<String>, FileError> {
    let mut files = Vec::new();
    let mut pending = vec![root];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(FileError::Walk {
                    path: dir.to_string_lossy().into_owned(),
                    source,
                });
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(FileError::Walk {
                        path: dir.to_string_lossy().into_owned(),
                        source,
                    });
                }
            };

            let path = entry.path();
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => pending.push(path),
                Ok(kind) if kind.is_file() => files.push(path.to_string_lossy().into_owned()),
                _ => {}
            }
        }
    }

    files.sort();
    Ok(files)
}
