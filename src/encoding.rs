//! Categorical and ordinal encoders.
//!
//! Both encoders are total: an unknown label never fails, it maps to a fixed
//! code ([`OUT_OF_VOCABULARY`] for learned categories, `0` for ordinal levels).

use std::collections::HashMap;

use serde::Deserialize;

/// Code returned for a label the encoder was not trained on.
pub const OUT_OF_VOCABULARY: i64 = -1;

/// Immutable label → code table learned at training time.
///
/// Codes are positions in the trained class list, matching scikit-learn's
/// `LabelEncoder.classes_`.
#[derive(Debug, Clone)]
pub struct CategoryEncoder {
    classes: Vec<String>,
    codes: HashMap<String, i64>,
}

/// On-disk form of a label encoder: `{"classes": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EncoderArtifact {
    Wrapped { classes: Vec<String> },
    Bare(Vec<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("encoder has no classes")]
    Empty,

    #[error("duplicate class label '{0}'")]
    DuplicateLabel(String),

    #[error("invalid encoder document: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CategoryEncoder {
    /// Build an encoder from the trained class list, in code order.
    pub fn from_classes<I, S>(classes: I) -> Result<Self, EncoderError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        if classes.is_empty() {
            return Err(EncoderError::Empty);
        }

        let mut codes = HashMap::with_capacity(classes.len());
        for (idx, label) in classes.iter().enumerate() {
            if codes.insert(label.clone(), idx as i64).is_some() {
                return Err(EncoderError::DuplicateLabel(label.clone()));
            }
        }

        Ok(Self { classes, codes })
    }

    /// Parse an exported encoder document.
    pub fn from_json(contents: &str) -> Result<Self, EncoderError> {
        let classes = match serde_json::from_str::<EncoderArtifact>(contents)? {
            EncoderArtifact::Wrapped { classes } | EncoderArtifact::Bare(classes) => classes,
        };
        Self::from_classes(classes)
    }

    /// Code of `label`, or [`OUT_OF_VOCABULARY`] when it was never seen.
    pub fn encode(&self, label: &str) -> i64 {
        self.codes.get(label).copied().unwrap_or(OUT_OF_VOCABULARY)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.codes.contains_key(label)
    }

    /// Known labels in code order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Fixed ordinal code for an influence level: Low/Medium/High → 0/1/2.
///
/// Anything else (including different casing) encodes as 0, the same as "Low".
pub fn ordinal_code(level: &str) -> i64 {
    match level {
        "Medium" => 1,
        "High" => 2,
        _ => 0,
    }
}
