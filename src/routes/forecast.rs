//! Forecast endpoints: the HTTP rendition of the sales forecast form.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use axum_valid::{Valid, ValidRejection};
use serde::Serialize;

use super::error::ApiError;
use crate::{
    AppState,
    models::{ForecastInput, ForecastOutcome, ForecastRequest, FormDefaults, InfluenceLevel},
    services::predict_future_sales,
};

/// Produce a blended sales forecast.
///
/// The region must be one the region encoder was trained on. Unknown
/// machinery types are accepted and encoded as out-of-vocabulary.
#[tracing::instrument(name = "forecast.create", skip_all)]
pub async fn create_forecast(
    State(state): State<AppState>,
    payload: Result<Valid<Json<ForecastRequest>>, ValidRejection<JsonRejection>>,
) -> Result<Json<ForecastOutcome>, ApiError> {
    let Valid(Json(request)) = payload?;

    if !state.models.region.contains(&request.region) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "unknown_region",
            format!(
                "Unknown region '{}'. Known regions: {}",
                request.region,
                state.models.regions().join(", ")
            ),
        )
        .with_param("region"));
    }

    let input = ForecastInput::from(request);
    let outcome = predict_future_sales(&state.models, &input)?;

    tracing::info!(
        customer_id = input.customer_id,
        date = %input.date,
        region = %input.region,
        forecast = outcome.forecast,
        "Forecast produced"
    );

    Ok(Json(outcome))
}

/// Choices and defaults for building a forecast request.
#[derive(Debug, Serialize)]
pub struct ForecastOptions {
    pub regions: Vec<String>,
    pub machinery_types: Vec<String>,
    pub influence_levels: [InfluenceLevel; 3],
    pub defaults: FormDefaults,
}

#[tracing::instrument(name = "forecast.options", skip(state))]
pub async fn forecast_options(State(state): State<AppState>) -> Json<ForecastOptions> {
    Json(ForecastOptions {
        regions: state.models.regions().to_vec(),
        machinery_types: state.models.machinery_types().to_vec(),
        influence_levels: InfluenceLevel::ALL,
        defaults: FormDefaults::default(),
    })
}
