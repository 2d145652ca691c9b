//! Loading of the six pre-trained artifacts into one shared, immutable bundle.

use std::{
    fmt, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    config::ModelsConfig,
    encoding::CategoryEncoder,
    features::Encoders,
    predictors::{DecompositionModel, LstmRegressor, ModelFamily, Predictor, TreeEnsemble},
};

/// Errors raised while loading artifacts at startup. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Missing {label} file: '{file}' (looked in {})", path.display())]
    Missing {
        label: &'static str,
        file: String,
        path: PathBuf,
    },

    #[error("Failed to read {label} file '{}': {source}", path.display())]
    Io {
        label: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid {label} file '{}': {message}", path.display())]
    Invalid {
        label: &'static str,
        path: PathBuf,
        message: String,
    },
}

impl ArtifactError {
    /// Human-readable artifact name, e.g. "XGBoost".
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactError::Missing { label, .. }
            | ArtifactError::Io { label, .. }
            | ArtifactError::Invalid { label, .. } => label,
        }
    }
}

/// One artifact slot: display label plus the file it is read from.
#[derive(Debug, Clone, Copy)]
struct Slot<'a> {
    label: &'static str,
    file: &'a str,
}

impl Slot<'_> {
    fn read(&self, dir: &Path) -> Result<(PathBuf, String), ArtifactError> {
        let path = dir.join(self.file);
        let contents = std::fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
            label: self.label,
            path: path.clone(),
            source,
        })?;
        Ok((path, contents))
    }

    fn load<T, E: fmt::Display>(
        &self,
        dir: &Path,
        parse: impl FnOnce(&str) -> Result<T, E>,
    ) -> Result<T, ArtifactError> {
        let (path, contents) = self.read(dir)?;
        parse(&contents).map_err(|e| ArtifactError::Invalid {
            label: self.label,
            path,
            message: e.to_string(),
        })
    }
}

/// Every artifact the forecast pipeline needs, loaded once and shared
/// read-only across requests.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub gradient_boosted: Arc<dyn Predictor>,
    pub sequence: Arc<dyn Predictor>,
    pub decomposition: Arc<dyn Predictor>,
    pub stacker: Arc<dyn Predictor>,
    pub machinery: CategoryEncoder,
    pub region: CategoryEncoder,
}

impl ModelBundle {
    /// Load all artifacts named in `config`.
    ///
    /// Every file's existence is checked first, in a fixed order, so the
    /// first missing artifact is reported before any parsing happens.
    pub fn load(config: &ModelsConfig) -> Result<Self, ArtifactError> {
        let dir = config.artifact_dir.as_path();
        let xgboost = Slot {
            label: "XGBoost",
            file: &config.gradient_boosted,
        };
        let lstm = Slot {
            label: "LSTM",
            file: &config.sequence,
        };
        let prophet = Slot {
            label: "Prophet",
            file: &config.decomposition,
        };
        let lightgbm = Slot {
            label: "LightGBM",
            file: &config.stacker,
        };
        let machinery = Slot {
            label: "Machinery Encoder",
            file: &config.machinery_encoder,
        };
        let region = Slot {
            label: "Region Encoder",
            file: &config.region_encoder,
        };

        for slot in [xgboost, lstm, prophet, lightgbm, machinery, region] {
            let path = dir.join(slot.file);
            if !path.is_file() {
                return Err(ArtifactError::Missing {
                    label: slot.label,
                    file: slot.file.to_string(),
                    path,
                });
            }
        }

        let bundle = Self {
            gradient_boosted: Arc::new(xgboost.load(dir, TreeEnsemble::from_json)?),
            sequence: Arc::new(lstm.load(dir, LstmRegressor::from_json)?),
            decomposition: Arc::new(prophet.load(dir, DecompositionModel::from_json)?),
            stacker: Arc::new(lightgbm.load(dir, TreeEnsemble::from_json)?),
            machinery: machinery.load(dir, CategoryEncoder::from_json)?,
            region: region.load(dir, CategoryEncoder::from_json)?,
        };

        tracing::info!(
            artifact_dir = %dir.display(),
            gradient_boosted = %bundle.gradient_boosted.describe(),
            sequence = %bundle.sequence.describe(),
            decomposition = %bundle.decomposition.describe(),
            stacker = %bundle.stacker.describe(),
            machinery_classes = bundle.machinery.len(),
            region_classes = bundle.region.len(),
            "Loaded forecast models"
        );

        Ok(bundle)
    }

    /// Encoders in the shape the feature builder takes.
    pub fn encoders(&self) -> Encoders<'_> {
        Encoders {
            machinery: &self.machinery,
            region: &self.region,
        }
    }

    /// Region labels the region encoder was trained on.
    pub fn regions(&self) -> &[String] {
        self.region.classes()
    }

    /// Machinery labels the machinery encoder was trained on.
    pub fn machinery_types(&self) -> &[String] {
        self.machinery.classes()
    }

    /// Families of the three base models, in stacking column order.
    pub fn base_families(&self) -> [ModelFamily; 3] {
        [
            self.gradient_boosted.family(),
            self.sequence.family(),
            self.decomposition.family(),
        ]
    }
}
