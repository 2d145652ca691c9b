//! Health check endpoints for probes and monitoring.

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

use crate::{AppState, predictors::ModelFamily};

/// Detailed health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: always "healthy" once the server is accepting requests
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
    /// Loaded models
    pub models: ModelStatus,
}

/// Summary of the loaded artifacts.
#[derive(Debug, Serialize)]
pub struct ModelStatus {
    /// Families of the three base models, in stacking order
    pub base: [ModelFamily; 3],
    /// Description of the stacking regressor
    pub stacker: String,
    /// Number of known regions
    pub regions: usize,
    /// Number of known machinery types
    pub machinery_types: usize,
}

/// Full health check with model summary.
///
/// Artifacts are loaded before the listener binds, so reaching this handler
/// means every model is available.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let models = &state.models;
    let health = HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        models: ModelStatus {
            base: models.base_families(),
            stacker: models.stacker.describe(),
            regions: models.region.len(),
            machinery_types: models.machinery.len(),
        },
    };

    (StatusCode::OK, Json(health))
}

/// Liveness probe.
///
/// Returns 200 if the service is running.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}
