//! Pre-trained model families behind a single [`Predictor`] capability.
//!
//! Each family consumes its own view of the request:
//!
//! - [`TreeEnsemble`]: one tabular row (XGBoost and LightGBM JSON dumps)
//! - [`LstmRegressor`]: a window of rows, oldest first (Keras LSTM weights)
//! - [`DecompositionModel`]: a dated row with named regressor columns
//!   (Prophet parameters)
//!
//! All implementations are immutable after loading and predict through
//! `&self`, so a loaded model can be shared across threads behind an `Arc`.

mod decomposition;
mod recurrent;
mod tree;

use std::fmt;

use chrono::NaiveDate;
pub use decomposition::*;
pub use recurrent::*;
use serde::Serialize;
pub use tree::*;

/// Model family of a loaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    GradientBoostedTrees,
    Recurrent,
    Decomposition,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelFamily::GradientBoostedTrees => "gradient_boosted_trees",
            ModelFamily::Recurrent => "recurrent",
            ModelFamily::Decomposition => "decomposition",
        })
    }
}

/// One dated observation with named regressor columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedRow {
    pub date: NaiveDate,
    pub columns: Vec<(String, f64)>,
}

impl DatedRow {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, value: f64) -> Self {
        self.columns.push((name.into(), value));
        self
    }

    pub fn column(&self, name: &str) -> Option<f64> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// Input handed to a predictor.
#[derive(Debug, Clone, Copy)]
pub enum ModelInput<'a> {
    /// A single feature row.
    Row(&'a [f64]),
    /// A sequence of feature rows, oldest first.
    Window(&'a [Vec<f64>]),
    /// A dated row with named regressors.
    Dated(&'a DatedRow),
}

impl ModelInput<'_> {
    fn kind(&self) -> &'static str {
        match self {
            ModelInput::Row(_) => "row",
            ModelInput::Window(_) => "window",
            ModelInput::Dated(_) => "dated row",
        }
    }
}

/// Errors raised while evaluating a loaded model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictorError {
    #[error("{family} model expects a {expected} input, got a {got}")]
    UnsupportedInput {
        family: ModelFamily,
        expected: &'static str,
        got: &'static str,
    },

    #[error("dimension mismatch: expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("empty input sequence")]
    EmptySequence,

    #[error("regressor '{0}' missing from input row")]
    MissingRegressor(String),

    #[error("{0} model produced a non-finite prediction")]
    NonFinite(ModelFamily),
}

/// A loaded, immutable model that maps an input to one scalar.
pub trait Predictor: Send + Sync + fmt::Debug {
    /// Family this model belongs to.
    fn family(&self) -> ModelFamily;

    /// Evaluate the model on one input.
    fn predict(&self, input: ModelInput<'_>) -> Result<f64, PredictorError>;

    /// Short human-readable description for logs and health output.
    fn describe(&self) -> String {
        self.family().to_string()
    }
}

fn unsupported(
    family: ModelFamily,
    expected: &'static str,
    input: &ModelInput<'_>,
) -> PredictorError {
    PredictorError::UnsupportedInput {
        family,
        expected,
        got: input.kind(),
    }
}

fn finite(family: ModelFamily, value: f64) -> Result<f64, PredictorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PredictorError::NonFinite(family))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dated_row_column_lookup() {
        let row = DatedRow::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .with_column("Budget", 10.0)
            .with_column("Market_Share", 0.2);

        assert_eq!(row.column("Budget"), Some(10.0));
        assert_eq!(row.column("Market_Share"), Some(0.2));
        assert_eq!(row.column("budget"), None);
    }

    #[test]
    fn test_unsupported_input_message() {
        let err = unsupported(ModelFamily::Recurrent, "window", &ModelInput::Row(&[1.0]));
        assert_eq!(
            err.to_string(),
            "recurrent model expects a window input, got a row"
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(finite(ModelFamily::Decomposition, 1.5).is_ok());
        assert_eq!(
            finite(ModelFamily::Decomposition, f64::NAN),
            Err(PredictorError::NonFinite(ModelFamily::Decomposition))
        );
    }
}
