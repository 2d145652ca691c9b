//! Future sales forecasting by stacking three base models.
//!
//! # Algorithm
//!
//! 1. Encode the request into the 14-column feature row.
//! 2. Run the three base models, each on its own view of the row:
//!    - gradient-boosted trees on the row itself
//!    - the recurrent model on the row repeated over the look-back window
//!    - the decomposition model on the date plus the `Budget` and
//!      `Market_Share` regressors
//! 3. Feed `[gradient_boosted, sequence, decomposition]` to the stacking
//!    regressor, whose output is the forecast.
//!
//! The pipeline holds no state between calls; everything it reads comes from
//! the shared [`ModelBundle`].

use crate::{
    features::{BUDGET_REGRESSOR, MARKET_SHARE_REGRESSOR, build_features, sequence_window},
    models::{BaseForecasts, ForecastInput, ForecastOutcome},
    predictors::{DatedRow, ModelInput, PredictorError},
    services::ModelBundle,
};

/// Produce a forecast for one input using the loaded models.
///
/// Unknown categories never fail here: they are encoded as out-of-vocabulary.
/// An error means a model could not evaluate the features it was given.
#[tracing::instrument(
    name = "forecast.predict",
    skip_all,
    fields(customer_id = input.customer_id, date = %input.date)
)]
pub fn predict_future_sales(
    models: &ModelBundle,
    input: &ForecastInput,
) -> Result<ForecastOutcome, PredictorError> {
    let features = build_features(input, models.encoders());

    let gradient_boosted = models
        .gradient_boosted
        .predict(ModelInput::Row(features.as_slice()))?;

    let window = sequence_window(&features);
    let sequence = models.sequence.predict(ModelInput::Window(&window))?;

    let dated = DatedRow::new(input.date)
        .with_column(BUDGET_REGRESSOR, input.budget)
        .with_column(MARKET_SHARE_REGRESSOR, input.market_share);
    let decomposition = models.decomposition.predict(ModelInput::Dated(&dated))?;

    let base_forecasts = BaseForecasts {
        gradient_boosted,
        sequence,
        decomposition,
    };
    tracing::debug!(
        gradient_boosted,
        sequence,
        decomposition,
        "Base model forecasts"
    );

    let forecast = models
        .stacker
        .predict(ModelInput::Row(&base_forecasts.as_row()))?;

    tracing::debug!(forecast, "Stacked forecast");

    Ok(ForecastOutcome {
        forecast,
        base_forecasts,
        features,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use chrono::NaiveDate;

    use super::*;
    use crate::{
        encoding::CategoryEncoder,
        predictors::{ModelFamily, Predictor},
    };

    /// Records what it was called with and returns a fixed value.
    #[derive(Debug, Default)]
    struct Recorder {
        value: f64,
        calls: AtomicUsize,
        rows: Mutex<Vec<Vec<f64>>>,
        windows: Mutex<Vec<Vec<Vec<f64>>>>,
        dated: Mutex<Vec<DatedRow>>,
    }

    impl Recorder {
        fn returning(value: f64) -> Arc<Self> {
            Arc::new(Self {
                value,
                ..Default::default()
            })
        }
    }

    impl Predictor for Recorder {
        fn family(&self) -> ModelFamily {
            ModelFamily::GradientBoostedTrees
        }

        fn predict(&self, input: ModelInput<'_>) -> Result<f64, PredictorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match input {
                ModelInput::Row(row) => self.rows.lock().unwrap().push(row.to_vec()),
                ModelInput::Window(window) => self.windows.lock().unwrap().push(window.to_vec()),
                ModelInput::Dated(row) => self.dated.lock().unwrap().push(row.clone()),
            }
            Ok(self.value)
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl Predictor for Failing {
        fn family(&self) -> ModelFamily {
            ModelFamily::Recurrent
        }

        fn predict(&self, _input: ModelInput<'_>) -> Result<f64, PredictorError> {
            Err(PredictorError::EmptySequence)
        }
    }

    struct Harness {
        gradient_boosted: Arc<Recorder>,
        sequence: Arc<Recorder>,
        decomposition: Arc<Recorder>,
        stacker: Arc<Recorder>,
        bundle: ModelBundle,
    }

    fn harness() -> Harness {
        let gradient_boosted = Recorder::returning(10.0);
        let sequence = Recorder::returning(20.0);
        let decomposition = Recorder::returning(30.0);
        let stacker = Recorder::returning(42.5);

        let bundle = ModelBundle {
            gradient_boosted: gradient_boosted.clone(),
            sequence: sequence.clone(),
            decomposition: decomposition.clone(),
            stacker: stacker.clone(),
            machinery: CategoryEncoder::from_classes(["Backhoe Loader", "Crane"]).unwrap(),
            region: CategoryEncoder::from_classes(["East", "North", "South"]).unwrap(),
        };

        Harness {
            gradient_boosted,
            sequence,
            decomposition,
            stacker,
            bundle,
        }
    }

    fn input() -> ForecastInput {
        ForecastInput {
            customer_id: 7,
            date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            daily_sales_pct: 50.0,
            market_share: 0.5,
            political: "Medium".into(),
            marketing: "High".into(),
            budget: 100_000.0,
            machinery_type: "Backhoe Loader".into(),
            region: "South".into(),
        }
    }

    #[test]
    fn test_stacker_receives_base_forecasts_in_order() {
        let h = harness();
        let outcome = predict_future_sales(&h.bundle, &input()).unwrap();

        assert_eq!(outcome.forecast, 42.5);
        assert_eq!(outcome.base_forecasts.as_row(), [10.0, 20.0, 30.0]);
        assert_eq!(*h.stacker.rows.lock().unwrap(), vec![vec![10.0, 20.0, 30.0]]);
    }

    #[test]
    fn test_each_base_model_gets_its_view() {
        let h = harness();
        let outcome = predict_future_sales(&h.bundle, &input()).unwrap();

        let rows = h.gradient_boosted.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], outcome.features.as_slice());

        let windows = h.sequence.windows.lock().unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), 7);
        assert!(windows[0].iter().all(|row| row == outcome.features.as_slice()));

        let dated = h.decomposition.dated.lock().unwrap();
        assert_eq!(dated.len(), 1);
        assert_eq!(dated[0].date, input().date);
        assert_eq!(dated[0].column("Budget"), Some(100_000.0));
        assert_eq!(dated[0].column("Market_Share"), Some(0.5));
    }

    #[test]
    fn test_features_in_outcome() {
        let h = harness();
        let outcome = predict_future_sales(&h.bundle, &input()).unwrap();
        assert_eq!(
            outcome.features.values(),
            [5.0, 6.0, 2.0, 0.0, 2.0, 0.5, 1.0, 2.0, 100_000.0, 50_000.0, 2.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_unknown_labels_still_forecast() {
        let h = harness();
        let mut input = input();
        input.machinery_type = "Flying Car".into();
        input.region = "Atlantis".into();

        let outcome = predict_future_sales(&h.bundle, &input).unwrap();
        assert_eq!(outcome.features[3], -1.0);
        assert_eq!(outcome.features[4], -1.0);
        assert_eq!(outcome.forecast, 42.5);
    }

    #[test]
    fn test_base_model_failure_stops_pipeline() {
        let mut h = harness();
        h.bundle.sequence = Arc::new(Failing);

        let err = predict_future_sales(&h.bundle, &input()).unwrap_err();
        assert_eq!(err, PredictorError::EmptySequence);
        assert_eq!(h.stacker.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.decomposition.calls.load(Ordering::SeqCst), 0);
    }
}
