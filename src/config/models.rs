use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Location and file names of the six exported artifacts loaded at startup.
///
/// File names are resolved relative to `artifact_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    /// Directory containing the artifacts.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Gradient-boosted tree regressor (XGBoost JSON dump).
    #[serde(default = "default_gradient_boosted")]
    pub gradient_boosted: String,

    /// Recurrent regressor (Keras LSTM weights as JSON).
    #[serde(default = "default_sequence")]
    pub sequence: String,

    /// Decomposition model (Prophet parameters as JSON).
    #[serde(default = "default_decomposition")]
    pub decomposition: String,

    /// Stacking regressor over the three base forecasts (LightGBM `dump_model` JSON).
    #[serde(default = "default_stacker")]
    pub stacker: String,

    /// Label encoder for machinery types.
    #[serde(default = "default_machinery_encoder")]
    pub machinery_encoder: String,

    /// Label encoder for regions.
    #[serde(default = "default_region_encoder")]
    pub region_encoder: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            gradient_boosted: default_gradient_boosted(),
            sequence: default_sequence(),
            decomposition: default_decomposition(),
            stacker: default_stacker(),
            machinery_encoder: default_machinery_encoder(),
            region_encoder: default_region_encoder(),
        }
    }
}

impl ModelsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.artifact_dir.as_os_str().is_empty() {
            return Err("models.artifact_dir must not be empty".into());
        }

        let names = [
            ("gradient_boosted", &self.gradient_boosted),
            ("sequence", &self.sequence),
            ("decomposition", &self.decomposition),
            ("stacker", &self.stacker),
            ("machinery_encoder", &self.machinery_encoder),
            ("region_encoder", &self.region_encoder),
        ];
        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(format!("models.{field} must name an artifact file"));
            }
        }

        Ok(())
    }

    /// Full path of an artifact file.
    pub fn path_of(&self, file: &str) -> PathBuf {
        self.artifact_dir.join(file)
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_gradient_boosted() -> String {
    "xgb_model.json".into()
}

fn default_sequence() -> String {
    "lstm_model.json".into()
}

fn default_decomposition() -> String {
    "prophet_model.json".into()
}

fn default_stacker() -> String {
    "lgbm_model.json".into()
}

fn default_machinery_encoder() -> String {
    "le_mach.json".into()
}

fn default_region_encoder() -> String {
    "le_region.json".into()
}
