//! Package API Handlers
//!
//! HTTP endpoints for starting and inspecting packages.

use archflow_core::dto::package::{PackageDetails, PackageSummary, StartPackage};
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::{AppState, package_service};

/// POST /api/packages
/// Start processing a package on a chain
pub async fn start_package(
    State(state): State<AppState>,
    Json(req): Json<StartPackage>,
) -> ApiResult<Json<PackageSummary>> {
    tracing::info!("Starting {} package at {}", req.kind, req.path);

    let package = package_service::start_package(&state, req).await?;
    Ok(Json(package.into()))
}

/// GET /api/packages/{id}
/// Get a package with its jobs
pub async fn get_package(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PackageDetails>> {
    tracing::debug!("Getting package: {}", id);

    let details = package_service::get_package(&state, id).await?;
    Ok(Json(details))
}
