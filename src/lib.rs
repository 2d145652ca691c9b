//! Future sales forecasting service.
//!
//! A request is encoded into a fixed 14-column feature row, scored by three
//! pre-trained base models (gradient-boosted trees, an LSTM, and a Prophet
//! style decomposition) and blended by a stacking regressor. Artifacts are
//! loaded once into a [`services::ModelBundle`] and shared read-only.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod config;
pub mod encoding;
pub mod features;
mod middleware;
pub mod models;
pub mod observability;
pub mod predictors;
pub mod routes;
pub mod services;

#[cfg(test)]
mod tests;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::OracleConfig>,
    pub models: Arc<services::ModelBundle>,
}

impl AppState {
    pub fn new(config: config::OracleConfig, models: services::ModelBundle) -> Self {
        Self {
            config: Arc::new(config),
            models: Arc::new(models),
        }
    }
}

pub fn build_app(config: &config::OracleConfig, state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/v1/forecast", post(routes::forecast::create_forecast))
        .route(
            "/v1/forecast/options",
            get(routes::forecast::forecast_options),
        )
        .layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}
