mod forecasting;
mod model_bundle;

pub use forecasting::predict_future_sales;
pub use model_bundle::{ArtifactError, ModelBundle};
