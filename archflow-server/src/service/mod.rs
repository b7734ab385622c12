//! Service Module
//!
//! Business logic behind the HTTP API. Services coordinate the workflow,
//! the repository and the package queue.

pub mod decision;
pub mod package;

pub use decision as decision_service;
pub use package as package_service;

use archflow_core::Workflow;
use archflow_core::domain::package::SharedDirectories;
use std::sync::Arc;

use crate::queue::PackageQueue;
use crate::repository::Repository;

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<Workflow>,
    pub repository: Arc<dyn Repository>,
    pub queue: Arc<PackageQueue>,
    pub directories: SharedDirectories,
}
