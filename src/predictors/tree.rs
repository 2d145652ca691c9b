//! Gradient-boosted tree ensembles loaded from XGBoost and LightGBM JSON dumps.
//!
//! Two on-disk shapes are accepted:
//!
//! - XGBoost: `{"base_score": 0.5, "feature_names": [...], "trees": [...]}` where
//!   each tree is one element of `Booster.get_dump(dump_format="json")`.
//!   A row goes to `yes` when `x < split_condition`, to `missing` when NaN.
//!   XGBoost keeps thresholds and features in single precision, so both sides
//!   are narrowed to `f32` before comparing.
//! - LightGBM: the document produced by `Booster.dump_model()`. A row goes
//!   left when `x <= threshold`; missing values follow `default_left`
//!   according to the split's `missing_type`. Only objectives whose raw score
//!   is the prediction are accepted.

use serde::Deserialize;
use serde_json::Value;

use super::{ModelFamily, ModelInput, Predictor, PredictorError, finite, unsupported};

/// LightGBM's threshold for treating a value as zero.
const ZERO_THRESHOLD: f64 = 1e-35;

/// LightGBM objectives that apply no output transform.
const IDENTITY_OBJECTIVES: &[&str] = &[
    "regression",
    "regression_l2",
    "regression_l1",
    "l2",
    "l1",
    "mse",
    "mae",
    "rmse",
    "huber",
    "fair",
    "quantile",
    "mape",
];

/// Which library produced the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeFormat {
    XgBoost,
    LightGbm,
}

impl std::fmt::Display for TreeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TreeFormat::XgBoost => "xgboost",
            TreeFormat::LightGbm => "lightgbm",
        })
    }
}

/// Errors raised while loading a tree ensemble.
#[derive(Debug, thiserror::Error)]
pub enum TreeLoadError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unrecognized tree dump: expected a 'trees' (XGBoost) or 'tree_info' (LightGBM) field")]
    UnknownFormat,

    #[error("ensemble contains no trees")]
    Empty,

    #[error("objective '{0}' transforms the raw score and is not supported")]
    UnsupportedObjective(String),

    #[error("tree {tree}: {reason}")]
    Malformed { tree: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MissingRule {
    /// NaN goes to the default side.
    NaN { default_left: bool },
    /// NaN is treated as zero and zero goes to the default side.
    Zero { default_left: bool },
    /// NaN is treated as zero and compared normally.
    None,
}

/// How a split compares a feature against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    /// XGBoost: `x < threshold` in single precision goes left.
    LessThanF32,
    /// LightGBM: `x <= threshold` in double precision goes left.
    LessOrEqual,
}

impl Comparison {
    fn goes_left(self, x: f64, threshold: f64) -> bool {
        match self {
            Comparison::LessThanF32 => (x as f32) < (threshold as f32),
            Comparison::LessOrEqual => x <= threshold,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        comparison: Comparison,
        missing: MissingRule,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn evaluate(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    comparison,
                    missing,
                    left,
                    right,
                } => {
                    let x = row[*feature];
                    let go_left = match *missing {
                        MissingRule::NaN { default_left } if x.is_nan() => default_left,
                        MissingRule::Zero { default_left }
                            if x.is_nan() || x.abs() <= ZERO_THRESHOLD =>
                        {
                            default_left
                        }
                        _ => {
                            let x = if x.is_nan() { 0.0 } else { x };
                            comparison.goes_left(x, *threshold)
                        }
                    };
                    node = if go_left { left } else { right };
                }
            }
        }
    }

    fn max_feature(&self) -> Option<usize> {
        match self {
            Node::Leaf(_) => None,
            Node::Split {
                feature,
                left,
                right,
                ..
            } => [Some(*feature), left.max_feature(), right.max_feature()]
                .into_iter()
                .flatten()
                .max(),
        }
    }
}

/// A loaded gradient-boosted tree ensemble (regression output).
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    format: TreeFormat,
    trees: Vec<Node>,
    base_score: f64,
    average_output: bool,
    /// Row width declared by the artifact, if any.
    declared_features: Option<usize>,
    /// Smallest row width that reaches every split.
    required_features: usize,
}

impl TreeEnsemble {
    /// Parse an XGBoost or LightGBM JSON dump, detecting the format.
    pub fn from_json(contents: &str) -> Result<Self, TreeLoadError> {
        let raw: Value = serde_json::from_str(contents)?;

        if raw.get("tree_info").is_some() {
            let artifact: LightGbmArtifact = serde_json::from_value(raw)?;
            Self::from_lightgbm(artifact)
        } else if raw.get("trees").is_some() {
            let artifact: XgBoostArtifact = serde_json::from_value(raw)?;
            Self::from_xgboost(artifact)
        } else {
            Err(TreeLoadError::UnknownFormat)
        }
    }

    fn from_xgboost(artifact: XgBoostArtifact) -> Result<Self, TreeLoadError> {
        if artifact.trees.is_empty() {
            return Err(TreeLoadError::Empty);
        }

        let trees = artifact
            .trees
            .iter()
            .enumerate()
            .map(|(idx, root)| {
                convert_xgboost(root, &artifact.feature_names).map_err(|reason| {
                    TreeLoadError::Malformed { tree: idx, reason }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let declared = (!artifact.feature_names.is_empty()).then_some(artifact.feature_names.len());
        Ok(Self::assemble(
            TreeFormat::XgBoost,
            trees,
            artifact.base_score,
            false,
            declared,
        ))
    }

    fn from_lightgbm(artifact: LightGbmArtifact) -> Result<Self, TreeLoadError> {
        if artifact.tree_info.is_empty() {
            return Err(TreeLoadError::Empty);
        }
        if let Some(objective) = &artifact.objective {
            // e.g. "regression" or "huber alpha:0.9"
            let name = objective.split_whitespace().next().unwrap_or_default();
            if !IDENTITY_OBJECTIVES.contains(&name) {
                return Err(TreeLoadError::UnsupportedObjective(objective.clone()));
            }
        }

        let trees = artifact
            .tree_info
            .iter()
            .enumerate()
            .map(|(idx, tree)| {
                convert_lightgbm(&tree.tree_structure)
                    .map_err(|reason| TreeLoadError::Malformed { tree: idx, reason })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::assemble(
            TreeFormat::LightGbm,
            trees,
            0.0,
            artifact.average_output,
            artifact.max_feature_idx.map(|idx| idx + 1),
        ))
    }

    fn assemble(
        format: TreeFormat,
        trees: Vec<Node>,
        base_score: f64,
        average_output: bool,
        declared_features: Option<usize>,
    ) -> Self {
        let required_features = trees
            .iter()
            .filter_map(Node::max_feature)
            .max()
            .map_or(0, |idx| idx + 1);

        Self {
            format,
            trees,
            base_score,
            average_output,
            declared_features,
            required_features,
        }
    }

    pub fn format(&self) -> TreeFormat {
        self.format
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Evaluate the ensemble on one row.
    pub fn predict_row(&self, row: &[f64]) -> Result<f64, PredictorError> {
        match self.declared_features {
            Some(expected) if row.len() != expected => {
                return Err(PredictorError::DimensionMismatch {
                    expected,
                    got: row.len(),
                });
            }
            _ if row.len() < self.required_features => {
                return Err(PredictorError::DimensionMismatch {
                    expected: self.required_features,
                    got: row.len(),
                });
            }
            _ => {}
        }

        let sum: f64 = self.trees.iter().map(|tree| tree.evaluate(row)).sum();
        let raw = if self.average_output {
            sum / self.trees.len() as f64
        } else {
            sum
        };

        finite(ModelFamily::GradientBoostedTrees, self.base_score + raw)
    }
}

impl Predictor for TreeEnsemble {
    fn family(&self) -> ModelFamily {
        ModelFamily::GradientBoostedTrees
    }

    fn predict(&self, input: ModelInput<'_>) -> Result<f64, PredictorError> {
        match input {
            ModelInput::Row(row) => self.predict_row(row),
            other => Err(unsupported(self.family(), "row", &other)),
        }
    }

    fn describe(&self) -> String {
        format!("{} ensemble with {} trees", self.format, self.trees.len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// XGBoost dump
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct XgBoostArtifact {
    base_score: f64,
    #[serde(default)]
    feature_names: Vec<String>,
    trees: Vec<XgBoostNode>,
}

#[derive(Debug, Deserialize)]
struct XgBoostNode {
    nodeid: u32,
    #[serde(default)]
    split: Option<String>,
    #[serde(default)]
    split_condition: Option<f64>,
    #[serde(default)]
    yes: Option<u32>,
    #[serde(default)]
    no: Option<u32>,
    #[serde(default)]
    missing: Option<u32>,
    #[serde(default)]
    leaf: Option<f64>,
    #[serde(default)]
    children: Vec<XgBoostNode>,
}

fn convert_xgboost(node: &XgBoostNode, feature_names: &[String]) -> Result<Node, String> {
    if let Some(leaf) = node.leaf {
        return Ok(Node::Leaf(leaf));
    }

    let split = node
        .split
        .as_deref()
        .ok_or_else(|| format!("node {} has neither 'leaf' nor 'split'", node.nodeid))?;
    let feature = resolve_xgboost_feature(split, feature_names)
        .ok_or_else(|| format!("node {}: unknown split feature '{split}'", node.nodeid))?;
    let threshold = node
        .split_condition
        .ok_or_else(|| format!("node {} is missing 'split_condition'", node.nodeid))?;
    let (Some(yes), Some(no)) = (node.yes, node.no) else {
        return Err(format!("node {} is missing 'yes'/'no' children", node.nodeid));
    };

    let child = |id: u32| {
        node.children
            .iter()
            .find(|c| c.nodeid == id)
            .ok_or_else(|| format!("node {} references missing child {id}", node.nodeid))
    };

    Ok(Node::Split {
        feature,
        threshold,
        comparison: Comparison::LessThanF32,
        missing: MissingRule::NaN {
            default_left: node.missing.unwrap_or(yes) == yes,
        },
        left: Box::new(convert_xgboost(child(yes)?, feature_names)?),
        right: Box::new(convert_xgboost(child(no)?, feature_names)?),
    })
}

/// XGBoost names unnamed features `f0`, `f1`, ...
fn resolve_xgboost_feature(split: &str, feature_names: &[String]) -> Option<usize> {
    if let Some(idx) = feature_names.iter().position(|name| name == split) {
        return Some(idx);
    }
    split.strip_prefix('f')?.parse().ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// LightGBM dump
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LightGbmArtifact {
    tree_info: Vec<LightGbmTree>,
    #[serde(default)]
    average_output: bool,
    #[serde(default)]
    max_feature_idx: Option<usize>,
    #[serde(default)]
    objective: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LightGbmTree {
    tree_structure: LightGbmNode,
}

#[derive(Debug, Deserialize)]
struct LightGbmNode {
    #[serde(default)]
    split_feature: Option<usize>,
    #[serde(default)]
    threshold: Option<Value>,
    #[serde(default)]
    decision_type: Option<String>,
    #[serde(default)]
    default_left: Option<bool>,
    #[serde(default)]
    missing_type: Option<String>,
    #[serde(default)]
    left_child: Option<Box<LightGbmNode>>,
    #[serde(default)]
    right_child: Option<Box<LightGbmNode>>,
    #[serde(default)]
    leaf_value: Option<f64>,
}

fn convert_lightgbm(node: &LightGbmNode) -> Result<Node, String> {
    if let Some(leaf) = node.leaf_value {
        return Ok(Node::Leaf(leaf));
    }

    let feature = node
        .split_feature
        .ok_or("split node is missing 'split_feature'")?;

    match node.decision_type.as_deref().unwrap_or("<=") {
        "<=" => {}
        other => return Err(format!("unsupported decision type '{other}'")),
    }

    let threshold = node
        .threshold
        .as_ref()
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("split on feature {feature} has no numeric threshold"))?;

    let default_left = node.default_left.unwrap_or(true);
    let missing = match node.missing_type.as_deref().unwrap_or("None") {
        "NaN" => MissingRule::NaN { default_left },
        "Zero" => MissingRule::Zero { default_left },
        "None" => MissingRule::None,
        other => return Err(format!("unsupported missing type '{other}'")),
    };

    let (Some(left), Some(right)) = (&node.left_child, &node.right_child) else {
        return Err(format!("split on feature {feature} is missing a child"));
    };

    Ok(Node::Split {
        feature,
        threshold,
        comparison: Comparison::LessOrEqual,
        missing,
        left: Box::new(convert_lightgbm(left)?),
        right: Box::new(convert_lightgbm(right)?),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    /// Two stumps on f0 and f8 plus base score.
    fn xgboost_dump() -> String {
        json!({
            "base_score": 0.5,
            "trees": [
                {
                    "nodeid": 0, "depth": 0, "split": "f0", "split_condition": 5.0,
                    "yes": 1, "no": 2, "missing": 2,
                    "children": [
                        {"nodeid": 1, "leaf": 10.0},
                        {"nodeid": 2, "leaf": 20.0}
                    ]
                },
                {
                    "nodeid": 0, "depth": 0, "split": "f8", "split_condition": 50000.0,
                    "yes": 1, "no": 2, "missing": 1,
                    "children": [
                        {"nodeid": 2, "leaf": 3.0},
                        {"nodeid": 1, "leaf": -1.0}
                    ]
                }
            ]
        })
        .to_string()
    }

    fn lightgbm_dump() -> String {
        json!({
            "name": "tree",
            "version": "v4",
            "max_feature_idx": 2,
            "average_output": false,
            "tree_info": [
                {
                    "tree_index": 0,
                    "tree_structure": {
                        "split_index": 0,
                        "split_feature": 1,
                        "threshold": 100.0,
                        "decision_type": "<=",
                        "default_left": true,
                        "missing_type": "None",
                        "left_child": {"leaf_index": 0, "leaf_value": 1.0},
                        "right_child": {
                            "split_index": 1,
                            "split_feature": 2,
                            "threshold": 0.0,
                            "decision_type": "<=",
                            "default_left": false,
                            "missing_type": "NaN",
                            "left_child": {"leaf_index": 1, "leaf_value": 2.0},
                            "right_child": {"leaf_index": 2, "leaf_value": 4.0}
                        }
                    }
                },
                {
                    "tree_index": 1,
                    "tree_structure": {"leaf_value": 0.25}
                }
            ]
        })
        .to_string()
    }

    #[test]
    fn test_xgboost_sums_leaves_and_base_score() {
        let model = TreeEnsemble::from_json(&xgboost_dump()).unwrap();
        assert_eq!(model.format(), TreeFormat::XgBoost);
        assert_eq!(model.num_trees(), 2);

        let mut row = vec![0.0; 14];
        row[0] = 4.0;
        row[8] = 100_000.0;
        // f0 < 5 → 10, f8 >= 50000 → 3
        assert_eq!(model.predict_row(&row).unwrap(), 0.5 + 10.0 + 3.0);

        row[0] = 5.0;
        row[8] = 10.0;
        // split is strict: 5 is not < 5
        assert_eq!(model.predict_row(&row).unwrap(), 0.5 + 20.0 - 1.0);
    }

    #[test]
    fn test_xgboost_missing_follows_missing_branch() {
        let model = TreeEnsemble::from_json(&xgboost_dump()).unwrap();
        let mut row = vec![0.0; 14];
        row[0] = f64::NAN;
        row[8] = f64::NAN;
        assert_eq!(model.predict_row(&row).unwrap(), 0.5 + 20.0 - 1.0);
    }

    #[test]
    fn test_xgboost_named_features() {
        let dump = json!({
            "base_score": 0.0,
            "feature_names": ["gb", "seq", "dec"],
            "trees": [{
                "nodeid": 0, "split": "dec", "split_condition": 1.0,
                "yes": 1, "no": 2, "missing": 1,
                "children": [{"nodeid": 1, "leaf": -1.0}, {"nodeid": 2, "leaf": 1.0}]
            }]
        })
        .to_string();

        let model = TreeEnsemble::from_json(&dump).unwrap();
        assert_eq!(model.predict_row(&[0.0, 0.0, 2.0]).unwrap(), 1.0);
        assert_eq!(
            model.predict_row(&[0.0, 0.0]),
            Err(PredictorError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        );
    }

    #[test]
    fn test_xgboost_compares_in_single_precision() {
        // 0.33 as f64 is below the f32-rounded threshold, but equal once narrowed.
        let dump = json!({
            "base_score": 0.0,
            "trees": [{
                "nodeid": 0, "split": "f5", "split_condition": 0.33f32 as f64,
                "yes": 1, "no": 2, "missing": 1,
                "children": [{"nodeid": 1, "leaf": 1.0}, {"nodeid": 2, "leaf": 2.0}]
            }]
        })
        .to_string();

        let model = TreeEnsemble::from_json(&dump).unwrap();
        let mut row = vec![0.0; 14];
        row[5] = 0.33;
        assert_eq!(model.predict_row(&row).unwrap(), 2.0);

        row[5] = 0.32;
        assert_eq!(model.predict_row(&row).unwrap(), 1.0);
    }

    #[test]
    fn test_lightgbm_keeps_double_precision() {
        let dump = json!({
            "tree_info": [{
                "tree_structure": {
                    "split_feature": 0,
                    "threshold": 0.33,
                    "decision_type": "<=",
                    "left_child": {"leaf_value": 1.0},
                    "right_child": {"leaf_value": 2.0}
                }
            }]
        })
        .to_string();

        let model = TreeEnsemble::from_json(&dump).unwrap();
        assert_eq!(model.predict_row(&[0.33]).unwrap(), 1.0);
        assert_eq!(model.predict_row(&[0.33f32 as f64]).unwrap(), 2.0);
    }

    #[rstest]
    #[case::poisson("poisson")]
    #[case::tweedie("tweedie tweedie_variance_power:1.5")]
    #[case::binary("binary sigmoid:1")]
    fn test_lightgbm_rejects_transforming_objective(#[case] objective: &str) {
        let mut dump: Value = serde_json::from_str(&lightgbm_dump()).unwrap();
        dump["objective"] = json!(objective);

        let err = TreeEnsemble::from_json(&dump.to_string()).unwrap_err();
        assert!(
            matches!(err, TreeLoadError::UnsupportedObjective(ref o) if o == objective),
            "{err}"
        );
    }

    #[test]
    fn test_lightgbm_accepts_regression_objective() {
        let mut dump: Value = serde_json::from_str(&lightgbm_dump()).unwrap();
        dump["objective"] = json!("huber alpha:0.9");
        assert!(TreeEnsemble::from_json(&dump.to_string()).is_ok());
    }

    #[test]
    fn test_lightgbm_inclusive_threshold() {
        let model = TreeEnsemble::from_json(&lightgbm_dump()).unwrap();
        assert_eq!(model.format(), TreeFormat::LightGbm);

        assert_eq!(model.predict_row(&[0.0, 100.0, 5.0]).unwrap(), 1.25);
        assert_eq!(model.predict_row(&[0.0, 101.0, 0.0]).unwrap(), 2.25);
        assert_eq!(model.predict_row(&[0.0, 101.0, 0.5]).unwrap(), 4.25);
    }

    #[test]
    fn test_lightgbm_missing_rules() {
        let model = TreeEnsemble::from_json(&lightgbm_dump()).unwrap();
        // missing_type None: NaN compared as 0 → left
        assert_eq!(model.predict_row(&[0.0, f64::NAN, 0.5]).unwrap(), 1.25);
        // missing_type NaN with default_left = false → right
        assert_eq!(model.predict_row(&[0.0, 500.0, f64::NAN]).unwrap(), 4.25);
    }

    #[test]
    fn test_lightgbm_average_output() {
        let mut dump: Value = serde_json::from_str(&lightgbm_dump()).unwrap();
        dump["average_output"] = json!(true);

        let model = TreeEnsemble::from_json(&dump.to_string()).unwrap();
        assert_eq!(model.predict_row(&[0.0, 0.0, 0.0]).unwrap(), 1.25 / 2.0);
    }

    #[test]
    fn test_lightgbm_rejects_categorical_split() {
        let dump = json!({
            "tree_info": [{
                "tree_structure": {
                    "split_feature": 0,
                    "threshold": "1||3",
                    "decision_type": "==",
                    "left_child": {"leaf_value": 1.0},
                    "right_child": {"leaf_value": 2.0}
                }
            }]
        })
        .to_string();

        let err = TreeEnsemble::from_json(&dump).unwrap_err();
        assert!(err.to_string().contains("decision type '=='"), "{err}");
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = TreeEnsemble::from_json(r#"{"learner": {}}"#).unwrap_err();
        assert!(matches!(err, TreeLoadError::UnknownFormat));
    }

    #[test]
    fn test_empty_ensemble_rejected() {
        let err = TreeEnsemble::from_json(r#"{"base_score": 0.5, "trees": []}"#).unwrap_err();
        assert!(matches!(err, TreeLoadError::Empty));
    }

    #[test]
    fn test_dangling_child_reference_rejected() {
        let dump = json!({
            "base_score": 0.5,
            "trees": [{
                "nodeid": 0, "split": "f0", "split_condition": 1.0,
                "yes": 1, "no": 7, "children": [{"nodeid": 1, "leaf": 1.0}]
            }]
        })
        .to_string();

        let err = TreeEnsemble::from_json(&dump).unwrap_err();
        assert!(
            matches!(err, TreeLoadError::Malformed { tree: 0, .. }),
            "{err}"
        );
    }

    #[test]
    fn test_short_row_rejected() {
        let model = TreeEnsemble::from_json(&xgboost_dump()).unwrap();
        assert_eq!(
            model.predict_row(&[1.0, 2.0]),
            Err(PredictorError::DimensionMismatch {
                expected: 9,
                got: 2
            })
        );
    }

    #[test]
    fn test_predictor_rejects_window_input() {
        let model = TreeEnsemble::from_json(&xgboost_dump()).unwrap();
        let window = vec![vec![0.0; 14]; 7];
        let err = model.predict(ModelInput::Window(&window)).unwrap_err();
        assert!(matches!(err, PredictorError::UnsupportedInput { .. }));
    }
}
