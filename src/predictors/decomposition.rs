//! Additive/multiplicative time-series decomposition evaluated from fitted
//! Prophet parameters.
//!
//! ```text
//! yhat = trend(t) · (1 + Σ multiplicative) + Σ additive · y_scale
//! ```
//!
//! `t` is the date's offset from `start` in units of `t_scale_days`. Seasonal
//! terms use days since the Unix epoch, extra regressors are standardized
//! with the mean and deviation recorded at fit time. Holiday components are
//! not evaluated, so artifacts that carry them are rejected along with any
//! other unrecognized key.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use super::{DatedRow, ModelFamily, ModelInput, Predictor, PredictorError, finite, unsupported};

#[derive(Debug, thiserror::Error)]
pub enum DecompositionLoadError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid start timestamp '{0}'")]
    Start(String),

    #[error("unsupported growth '{0}' (expected 'linear' or 'flat')")]
    Growth(String),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentMode {
    #[default]
    Additive,
    Multiplicative,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Growth {
    Linear,
    Flat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Seasonality {
    name: String,
    period: f64,
    fourier_order: usize,
    #[serde(default)]
    mode: ComponentMode,
    beta: Vec<f64>,
}

impl Seasonality {
    /// `Σ beta · [sin(2π·1·t/P), cos(2π·1·t/P), sin(2π·2·t/P), ...]`
    fn evaluate(&self, epoch_days: f64) -> f64 {
        (0..self.fourier_order)
            .map(|i| {
                let angle = 2.0 * (i + 1) as f64 * std::f64::consts::PI * epoch_days / self.period;
                self.beta[2 * i] * angle.sin() + self.beta[2 * i + 1] * angle.cos()
            })
            .sum()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Regressor {
    name: String,
    #[serde(default)]
    mu: f64,
    #[serde(default = "default_std")]
    std: f64,
    coef: f64,
    #[serde(default)]
    mode: ComponentMode,
}

fn default_std() -> f64 {
    1.0
}

/// Fitted decomposition model.
#[derive(Debug, Clone)]
pub struct DecompositionModel {
    start: NaiveDateTime,
    t_scale_days: f64,
    y_scale: f64,
    growth: Growth,
    k: f64,
    m: f64,
    changepoints_t: Vec<f64>,
    delta: Vec<f64>,
    seasonalities: Vec<Seasonality>,
    regressors: Vec<Regressor>,
}

impl DecompositionModel {
    pub fn from_json(contents: &str) -> Result<Self, DecompositionLoadError> {
        let raw: DecompositionArtifact = serde_json::from_str(contents)?;

        let has_holidays = match &raw.holidays {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Array(rows)) => !rows.is_empty(),
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        };
        if has_holidays {
            return Err(invalid("holiday components are not supported"));
        }

        let start = parse_start(&raw.start)?;
        let growth = match raw.growth.as_str() {
            "linear" => Growth::Linear,
            "flat" => Growth::Flat,
            other => return Err(DecompositionLoadError::Growth(other.to_string())),
        };

        if !(raw.t_scale_days.is_finite() && raw.t_scale_days > 0.0) {
            return Err(invalid("t_scale_days must be positive"));
        }
        if !raw.y_scale.is_finite() {
            return Err(invalid("y_scale must be finite"));
        }
        if raw.changepoints_t.len() != raw.delta.len() {
            return Err(invalid(format!(
                "{} changepoints but {} rate adjustments",
                raw.changepoints_t.len(),
                raw.delta.len()
            )));
        }
        for season in &raw.seasonalities {
            if !(season.period.is_finite() && season.period > 0.0) {
                return Err(invalid(format!(
                    "seasonality '{}' has non-positive period",
                    season.name
                )));
            }
            if season.beta.len() != 2 * season.fourier_order {
                return Err(invalid(format!(
                    "seasonality '{}' has {} coefficients, expected {}",
                    season.name,
                    season.beta.len(),
                    2 * season.fourier_order
                )));
            }
        }
        for regressor in &raw.regressors {
            if !(regressor.std.is_finite() && regressor.std > 0.0) {
                return Err(invalid(format!(
                    "regressor '{}' has non-positive std",
                    regressor.name
                )));
            }
        }

        Ok(Self {
            start,
            t_scale_days: raw.t_scale_days,
            y_scale: raw.y_scale,
            growth,
            k: raw.k,
            m: raw.m,
            changepoints_t: raw.changepoints_t,
            delta: raw.delta,
            seasonalities: raw.seasonalities,
            regressors: raw.regressors,
        })
    }

    /// Names of the extra regressors the model expects on every row.
    pub fn regressor_names(&self) -> impl Iterator<Item = &str> {
        self.regressors.iter().map(|r| r.name.as_str())
    }

    /// Trend component at `date`, in output units.
    pub fn trend(&self, date: NaiveDate) -> f64 {
        let t = self.scaled_time(date);
        let scaled = match self.growth {
            Growth::Flat => self.m,
            Growth::Linear => {
                let (mut k, mut m) = (self.k, self.m);
                for (&cp, &delta) in self.changepoints_t.iter().zip(&self.delta) {
                    if t >= cp {
                        k += delta;
                        m -= cp * delta;
                    }
                }
                k * t + m
            }
        };
        scaled * self.y_scale
    }

    /// Point forecast for one dated row.
    pub fn predict_row(&self, row: &DatedRow) -> Result<f64, PredictorError> {
        let epoch_days = days_since_epoch(row.date);
        let mut additive = 0.0;
        let mut multiplicative = 0.0;

        for season in &self.seasonalities {
            let value = season.evaluate(epoch_days);
            match season.mode {
                ComponentMode::Additive => additive += value,
                ComponentMode::Multiplicative => multiplicative += value,
            }
        }

        for regressor in &self.regressors {
            let x = row
                .column(&regressor.name)
                .ok_or_else(|| PredictorError::MissingRegressor(regressor.name.clone()))?;
            let value = (x - regressor.mu) / regressor.std * regressor.coef;
            match regressor.mode {
                ComponentMode::Additive => additive += value,
                ComponentMode::Multiplicative => multiplicative += value,
            }
        }

        let yhat = self.trend(row.date) * (1.0 + multiplicative) + additive * self.y_scale;
        finite(ModelFamily::Decomposition, yhat)
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        let elapsed = date.and_time(NaiveTime::MIN) - self.start;
        elapsed.num_seconds() as f64 / 86_400.0 / self.t_scale_days
    }
}

impl Predictor for DecompositionModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::Decomposition
    }

    fn predict(&self, input: ModelInput<'_>) -> Result<f64, PredictorError> {
        match input {
            ModelInput::Dated(row) => self.predict_row(row),
            other => Err(unsupported(self.family(), "dated row", &other)),
        }
    }

    fn describe(&self) -> String {
        let regressors: Vec<&str> = self.regressor_names().collect();
        format!(
            "{} growth, {} changepoints, {} seasonalities, regressors [{}]",
            match self.growth {
                Growth::Linear => "linear",
                Growth::Flat => "flat",
            },
            self.changepoints_t.len(),
            self.seasonalities.len(),
            regressors.join(", ")
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DecompositionArtifact {
    start: String,
    t_scale_days: f64,
    #[serde(default = "default_y_scale")]
    y_scale: f64,
    #[serde(default = "default_growth")]
    growth: String,
    #[serde(default)]
    k: f64,
    #[serde(default)]
    m: f64,
    #[serde(default)]
    changepoints_t: Vec<f64>,
    #[serde(default)]
    delta: Vec<f64>,
    #[serde(default)]
    seasonalities: Vec<Seasonality>,
    #[serde(default)]
    regressors: Vec<Regressor>,
    /// Exports write `null` or `[]` when the model was fit without holidays.
    #[serde(default)]
    holidays: Option<serde_json::Value>,
}

fn default_y_scale() -> f64 {
    1.0
}

fn default_growth() -> String {
    "linear".into()
}

fn invalid(message: impl Into<String>) -> DecompositionLoadError {
    DecompositionLoadError::Invalid(message.into())
}

fn parse_start(raw: &str) -> Result<NaiveDateTime, DecompositionLoadError> {
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| DecompositionLoadError::Start(raw.to_string()))
}

fn days_since_epoch(date: NaiveDate) -> f64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp() as f64 / 86_400.0
}
