//! Feature construction for the base models.
//!
//! The recipe is fixed by the trained artifacts: calendar columns, encoded
//! categories, two interaction terms and three lag columns that are always 0
//! because no sales history is available at serving time.

use chrono::{Datelike, NaiveDate};

use crate::{
    encoding::{CategoryEncoder, ordinal_code},
    models::{FeatureVector, ForecastInput},
};

/// Number of time steps the recurrent model looks back over.
pub const SEQUENCE_LENGTH: usize = 7;

/// Regressor column names the decomposition model was fitted with.
pub const BUDGET_REGRESSOR: &str = "Budget";
pub const MARKET_SHARE_REGRESSOR: &str = "Market_Share";

/// Calendar columns derived from a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    /// Monday = 0 … Sunday = 6.
    pub day_of_week: u32,
    pub month: u32,
    pub quarter: u32,
}

impl CalendarFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        let month = date.month();
        Self {
            day_of_week: date.weekday().num_days_from_monday(),
            month,
            quarter: quarter_of(month),
        }
    }
}

/// Quarter (1–4) of a calendar month. Only called with `Datelike::month()`,
/// which is always 1–12.
fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

/// Learned category tables used by [`build_features`].
#[derive(Debug, Clone, Copy)]
pub struct Encoders<'a> {
    pub machinery: &'a CategoryEncoder,
    pub region: &'a CategoryEncoder,
}

/// Build the 14-column feature row for one input.
///
/// Performs no validation: ranges are enforced before the input gets here.
pub fn build_features(input: &ForecastInput, encoders: Encoders<'_>) -> FeatureVector {
    let calendar = CalendarFeatures::from_date(input.date);

    let machinery_code = encoders.machinery.encode(&input.machinery_type);
    let region_code = encoders.region.encode(&input.region);
    let political_code = ordinal_code(&input.political);
    let marketing_code = ordinal_code(&input.marketing);

    if !encoders.machinery.contains(&input.machinery_type) {
        tracing::warn!(
            machinery_type = %input.machinery_type,
            "Machinery type not seen during training, encoding as out-of-vocabulary"
        );
    }
    if !encoders.region.contains(&input.region) {
        tracing::warn!(
            region = %input.region,
            "Region not seen during training, encoding as out-of-vocabulary"
        );
    }

    let budget_market_share = input.budget * input.market_share;
    let political_marketing = (political_code * marketing_code) as f64;

    // Lag columns (7/14/30 days back) have no history to draw from.
    let (sales_lag_7, sales_lag_14, sales_lag_30) = (0.0, 0.0, 0.0);

    tracing::debug!(
        day_of_week = calendar.day_of_week,
        month = calendar.month,
        quarter = calendar.quarter,
        machinery_code,
        region_code,
        political_code,
        marketing_code,
        "Encoded forecast features"
    );

    FeatureVector::new([
        calendar.day_of_week as f64,
        calendar.month as f64,
        calendar.quarter as f64,
        machinery_code as f64,
        region_code as f64,
        input.market_share,
        political_code as f64,
        marketing_code as f64,
        input.budget,
        budget_market_share,
        political_marketing,
        sales_lag_7,
        sales_lag_14,
        sales_lag_30,
    ])
}

/// Input window for the recurrent model: the current row repeated for every
/// step of the look-back window.
pub fn sequence_window(features: &FeatureVector) -> Vec<Vec<f64>> {
    vec![features.as_slice().to_vec(); SEQUENCE_LENGTH]
}
