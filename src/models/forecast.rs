use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Number of columns the base models were trained on.
pub const FEATURE_COUNT: usize = 14;

/// Column names of [`FeatureVector`], in training order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "day_of_week",
    "month",
    "quarter",
    "machinery_type",
    "region",
    "market_share",
    "political_influence",
    "marketing_effort",
    "budget",
    "budget_market_share",
    "political_marketing",
    "sales_lag_7",
    "sales_lag_14",
    "sales_lag_30",
];

/// Raw inputs for one forecast.
///
/// `political` and `marketing` are free strings at this level; the ordinal
/// encoder maps anything outside Low/Medium/High to 0. Range checks are the
/// caller's job (see [`ForecastRequest`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastInput {
    pub customer_id: u64,
    pub date: NaiveDate,
    /// Expected daily sales percentage. Collected but not a model feature.
    pub daily_sales_pct: f64,
    pub market_share: f64,
    pub political: String,
    pub marketing: String,
    pub budget: f64,
    pub machinery_type: String,
    pub region: String,
}

/// The fixed-order 14-column feature row fed to the base models.
///
/// Column order is a contract with the trained artifacts: see [`FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub(crate) fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        self.0
    }

    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value of a named column, if the name is known.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.0[idx])
    }
}

impl std::ops::Index<usize> for FeatureVector {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Outputs of the three base models for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseForecasts {
    pub gradient_boosted: f64,
    pub sequence: f64,
    pub decomposition: f64,
}

impl BaseForecasts {
    /// The stacker's input row: `[gradient_boosted, sequence, decomposition]`.
    pub fn as_row(&self) -> [f64; 3] {
        [self.gradient_boosted, self.sequence, self.decomposition]
    }
}

/// Everything computed for one forecast, final value included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastOutcome {
    pub forecast: f64,
    pub base_forecasts: BaseForecasts,
    pub features: FeatureVector,
}

/// Political influence / marketing effort levels offered by the form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfluenceLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl InfluenceLevel {
    pub const ALL: [InfluenceLevel; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl std::fmt::Display for InfluenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InfluenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            other => Err(format!(
                "unknown level '{other}', expected one of Low, Medium, High"
            )),
        }
    }
}

/// Forecast request as submitted to the API.
///
/// Field ranges mirror the constraints of the original input form.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForecastRequest {
    /// Customer identifier
    #[serde(default = "default_customer_id")]
    pub customer_id: u64,
    /// Date to forecast
    pub date: NaiveDate,
    /// Expected daily sales percentage
    #[serde(default = "default_daily_sales_pct")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub daily_sales_pct: f64,
    /// Projected market share fraction
    #[validate(range(min = 0.0, max = 1.0))]
    pub market_share: f64,
    /// Expected political impact
    #[serde(default)]
    pub political: InfluenceLevel,
    /// Planned marketing intensity
    #[serde(default)]
    pub marketing: InfluenceLevel,
    /// Planned budget
    #[validate(range(min = 0.0))]
    pub budget: f64,
    /// Type of machinery (free text; unknown types are allowed)
    #[validate(length(max = 200))]
    pub machinery_type: String,
    /// Target region (must be a region the encoder knows)
    #[validate(length(min = 1, max = 200))]
    pub region: String,
}

impl From<ForecastRequest> for ForecastInput {
    fn from(req: ForecastRequest) -> Self {
        Self {
            customer_id: req.customer_id,
            date: req.date,
            daily_sales_pct: req.daily_sales_pct,
            market_share: req.market_share,
            political: req.political.as_str().to_string(),
            marketing: req.marketing.as_str().to_string(),
            budget: req.budget,
            machinery_type: req.machinery_type,
            region: req.region,
        }
    }
}

/// Default values pre-filled by the input form.
#[derive(Debug, Clone, Serialize)]
pub struct FormDefaults {
    pub customer_id: u64,
    pub daily_sales_pct: f64,
    pub market_share: f64,
    pub political: InfluenceLevel,
    pub marketing: InfluenceLevel,
    pub budget: f64,
    pub machinery_type: &'static str,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            customer_id: default_customer_id(),
            daily_sales_pct: default_daily_sales_pct(),
            market_share: 0.5,
            political: InfluenceLevel::Low,
            marketing: InfluenceLevel::Low,
            budget: 100_000.0,
            machinery_type: "Backhoe Loader",
        }
    }
}

fn default_customer_id() -> u64 {
    1
}

fn default_daily_sales_pct() -> f64 {
    50.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(market_share: f64, budget: f64, daily_sales_pct: f64) -> ForecastRequest {
        ForecastRequest {
            customer_id: 1,
            date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            daily_sales_pct,
            market_share,
            political: InfluenceLevel::Medium,
            marketing: InfluenceLevel::High,
            budget,
            machinery_type: "Backhoe Loader".into(),
            region: "North".into(),
        }
    }

    #[test]
    fn test_request_within_ranges_is_valid() {
        assert!(request(0.5, 100_000.0, 50.0).validate().is_ok());
        assert!(request(0.0, 0.0, 0.0).validate().is_ok());
        assert!(request(1.0, 1e9, 100.0).validate().is_ok());
    }

    #[test]
    fn test_request_out_of_range_rejected() {
        let errors = request(1.5, -1.0, 101.0).validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("market_share"));
        assert!(fields.contains_key("budget"));
        assert!(fields.contains_key("daily_sales_pct"));
    }

    #[test]
    fn test_request_into_input_uses_level_labels() {
        let input: ForecastInput = request(0.5, 10.0, 50.0).into();
        assert_eq!(input.political, "Medium");
        assert_eq!(input.marketing, "High");
        assert_eq!(input.region, "North");
    }

    #[test]
    fn test_request_defaults_from_json() {
        let req: ForecastRequest = serde_json::from_value(serde_json::json!({
            "date": "2024-06-15",
            "market_share": 0.25,
            "budget": 5000.0,
            "machinery_type": "Excavator",
            "region": "North"
        }))
        .unwrap();

        assert_eq!(req.customer_id, 1);
        assert_eq!(req.daily_sales_pct, 50.0);
        assert_eq!(req.political, InfluenceLevel::Low);
        assert_eq!(req.marketing, InfluenceLevel::Low);
    }

    #[test]
    fn test_request_rejects_unknown_level() {
        let result: Result<ForecastRequest, _> = serde_json::from_value(serde_json::json!({
            "date": "2024-06-15",
            "market_share": 0.25,
            "budget": 5000.0,
            "political": "Extreme",
            "machinery_type": "Excavator",
            "region": "North"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_influence_level_round_trips_through_str() {
        for level in InfluenceLevel::ALL {
            assert_eq!(level.as_str().parse::<InfluenceLevel>().unwrap(), level);
        }
        assert!("low".parse::<InfluenceLevel>().is_err());
    }

    #[test]
    fn test_feature_names_cover_every_column() {
        let vector = FeatureVector::new(std::array::from_fn(|i| i as f64));
        assert_eq!(vector.get("day_of_week"), Some(0.0));
        assert_eq!(vector.get("budget_market_share"), Some(9.0));
        assert_eq!(vector.get("sales_lag_30"), Some(13.0));
        assert_eq!(vector.get("weather"), None);
    }
}
