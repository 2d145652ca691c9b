//! Stacked LSTM regressor evaluated from exported Keras weights.
//!
//! Weights use the Keras layout: `kernel` is `input_dim × 4·units`,
//! `recurrent_kernel` is `units × 4·units` and `bias` is `4·units`, with gate
//! blocks ordered input, forget, cell, output. Gates use `sigmoid` and the
//! cell uses `tanh`; layers exported with other activations are rejected, as
//! are unrecognized keys.

use serde::Deserialize;

use super::{ModelFamily, ModelInput, Predictor, PredictorError, finite, unsupported};

#[derive(Debug, thiserror::Error)]
pub enum RecurrentLoadError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model has no LSTM layers")]
    NoRecurrentLayers,

    #[error("{layer}: {reason}")]
    Shape { layer: String, reason: String },

    #[error("unsupported activation '{0}' (expected 'linear' or 'relu')")]
    Activation(String),

    #[error("{layer}: {role} '{got}' is not supported (expected '{expected}')")]
    GateActivation {
        layer: String,
        role: &'static str,
        got: String,
        expected: &'static str,
    },
}

/// Dense row-major matrix.
#[derive(Debug, Clone)]
struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    fn from_nested(nested: Vec<Vec<f64>>, layer: &str, name: &str) -> Result<Self, RecurrentLoadError> {
        let rows = nested.len();
        let cols = nested.first().map_or(0, Vec::len);
        if rows == 0 || cols == 0 {
            return Err(shape_error(layer, format!("'{name}' is empty")));
        }
        if let Some(bad) = nested.iter().position(|row| row.len() != cols) {
            return Err(shape_error(
                layer,
                format!("'{name}' row {bad} has {} columns, expected {cols}", nested[bad].len()),
            ));
        }

        Ok(Self {
            rows,
            cols,
            data: nested.into_iter().flatten().collect(),
        })
    }

    /// Accumulate `x · self` into `out`.
    fn accumulate(&self, x: &[f64], out: &mut [f64]) {
        for (r, &xv) in x.iter().enumerate() {
            if xv == 0.0 {
                continue;
            }
            let row = &self.data[r * self.cols..(r + 1) * self.cols];
            for (o, &w) in out.iter_mut().zip(row) {
                *o += xv * w;
            }
        }
    }
}

fn shape_error(layer: &str, reason: String) -> RecurrentLoadError {
    RecurrentLoadError::Shape {
        layer: layer.to_string(),
        reason,
    }
}

/// Activation applied after a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
        }
    }
}

#[derive(Debug, Clone)]
struct LstmLayer {
    units: usize,
    kernel: Matrix,
    recurrent_kernel: Matrix,
    bias: Vec<f64>,
}

impl LstmLayer {
    /// Run the layer over a sequence, returning the hidden state at every step.
    fn forward(&self, inputs: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let units = self.units;
        let mut h = vec![0.0; units];
        let mut c = vec![0.0; units];
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let mut z = self.bias.clone();
            self.kernel.accumulate(x, &mut z);
            self.recurrent_kernel.accumulate(&h, &mut z);

            for j in 0..units {
                let input_gate = sigmoid(z[j]);
                let forget_gate = sigmoid(z[units + j]);
                let candidate = z[2 * units + j].tanh();
                let output_gate = sigmoid(z[3 * units + j]);

                c[j] = forget_gate * c[j] + input_gate * candidate;
                h[j] = output_gate * c[j].tanh();
            }
            outputs.push(h.clone());
        }

        outputs
    }
}

#[derive(Debug, Clone)]
struct DenseLayer {
    kernel: Matrix,
    bias: Vec<f64>,
    activation: Activation,
}

impl DenseLayer {
    fn forward(&self, x: &[f64]) -> Vec<f64> {
        let mut out = self.bias.clone();
        self.kernel.accumulate(x, &mut out);
        out.into_iter().map(|v| self.activation.apply(v)).collect()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// A stacked LSTM followed by dense layers ending in a single output.
#[derive(Debug, Clone)]
pub struct LstmRegressor {
    input_dim: usize,
    lstm: Vec<LstmLayer>,
    dense: Vec<DenseLayer>,
}

impl LstmRegressor {
    /// Parse and shape-check exported weights.
    pub fn from_json(contents: &str) -> Result<Self, RecurrentLoadError> {
        let artifact: LstmArtifact = serde_json::from_str(contents)?;
        if artifact.lstm.is_empty() {
            return Err(RecurrentLoadError::NoRecurrentLayers);
        }

        let mut lstm = Vec::with_capacity(artifact.lstm.len());
        let mut width: Option<usize> = None;
        for (idx, raw) in artifact.lstm.into_iter().enumerate() {
            let name = format!("lstm[{idx}]");
            let layer = raw.into_layer(&name)?;
            if let Some(expected) = width.filter(|&w| w != layer.kernel.rows) {
                return Err(shape_error(
                    &name,
                    format!(
                        "kernel expects {} inputs, previous layer has {expected} units",
                        layer.kernel.rows
                    ),
                ));
            }
            width = Some(layer.units);
            lstm.push(layer);
        }

        let input_dim = lstm[0].kernel.rows;
        let mut width = lstm[lstm.len() - 1].units;

        let mut dense = Vec::with_capacity(artifact.dense.len());
        for (idx, raw) in artifact.dense.into_iter().enumerate() {
            let name = format!("dense[{idx}]");
            let layer = raw.into_layer(&name)?;
            if layer.kernel.rows != width {
                return Err(shape_error(
                    &name,
                    format!(
                        "kernel expects {} inputs, previous layer has {width} outputs",
                        layer.kernel.rows
                    ),
                ));
            }
            width = layer.kernel.cols;
            dense.push(layer);
        }

        if width != 1 {
            return Err(shape_error(
                "output",
                format!("model produces {width} values, expected a single output"),
            ));
        }

        Ok(Self {
            input_dim,
            lstm,
            dense,
        })
    }

    /// Number of features each time step must carry.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Evaluate the network on a window of rows, oldest first.
    pub fn predict_window(&self, window: &[Vec<f64>]) -> Result<f64, PredictorError> {
        if window.is_empty() {
            return Err(PredictorError::EmptySequence);
        }
        if let Some(row) = window.iter().find(|row| row.len() != self.input_dim) {
            return Err(PredictorError::DimensionMismatch {
                expected: self.input_dim,
                got: row.len(),
            });
        }

        let mut sequence = window.to_vec();
        for layer in &self.lstm {
            sequence = layer.forward(&sequence);
        }

        let mut x = sequence.pop().unwrap_or_default();
        for layer in &self.dense {
            x = layer.forward(&x);
        }

        finite(ModelFamily::Recurrent, x.first().copied().unwrap_or(f64::NAN))
    }
}

impl Predictor for LstmRegressor {
    fn family(&self) -> ModelFamily {
        ModelFamily::Recurrent
    }

    fn predict(&self, input: ModelInput<'_>) -> Result<f64, PredictorError> {
        match input {
            ModelInput::Window(window) => self.predict_window(window),
            other => Err(unsupported(self.family(), "window", &other)),
        }
    }

    fn describe(&self) -> String {
        let units: Vec<String> = self.lstm.iter().map(|l| l.units.to_string()).collect();
        format!(
            "lstm {} → {} dense layers over {} features",
            units.join("/"),
            self.dense.len(),
            self.input_dim
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LstmArtifact {
    lstm: Vec<RawLstmLayer>,
    #[serde(default)]
    dense: Vec<RawDenseLayer>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLstmLayer {
    units: usize,
    kernel: Vec<Vec<f64>>,
    recurrent_kernel: Vec<Vec<f64>>,
    bias: Vec<f64>,
    #[serde(default)]
    activation: Option<String>,
    #[serde(default)]
    recurrent_activation: Option<String>,
}

impl RawLstmLayer {
    fn into_layer(self, name: &str) -> Result<LstmLayer, RecurrentLoadError> {
        let gates = 4 * self.units;
        if self.units == 0 {
            return Err(shape_error(name, "units must be positive".into()));
        }
        check_gate_activation(name, "activation", self.activation.as_deref(), "tanh")?;
        check_gate_activation(
            name,
            "recurrent_activation",
            self.recurrent_activation.as_deref(),
            "sigmoid",
        )?;

        let kernel = Matrix::from_nested(self.kernel, name, "kernel")?;
        let recurrent_kernel = Matrix::from_nested(self.recurrent_kernel, name, "recurrent_kernel")?;

        if kernel.cols != gates {
            return Err(shape_error(
                name,
                format!("kernel has {} columns, expected {gates}", kernel.cols),
            ));
        }
        if recurrent_kernel.rows != self.units || recurrent_kernel.cols != gates {
            return Err(shape_error(
                name,
                format!(
                    "recurrent_kernel is {}×{}, expected {}×{gates}",
                    recurrent_kernel.rows, recurrent_kernel.cols, self.units
                ),
            ));
        }
        if self.bias.len() != gates {
            return Err(shape_error(
                name,
                format!("bias has {} values, expected {gates}", self.bias.len()),
            ));
        }

        Ok(LstmLayer {
            units: self.units,
            kernel,
            recurrent_kernel,
            bias: self.bias,
        })
    }
}

fn check_gate_activation(
    layer: &str,
    role: &'static str,
    got: Option<&str>,
    expected: &'static str,
) -> Result<(), RecurrentLoadError> {
    match got {
        None => Ok(()),
        Some(got) if got == expected => Ok(()),
        Some(got) => Err(RecurrentLoadError::GateActivation {
            layer: layer.to_string(),
            role,
            got: got.to_string(),
            expected,
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDenseLayer {
    kernel: Vec<Vec<f64>>,
    bias: Vec<f64>,
    #[serde(default = "default_activation")]
    activation: String,
}

fn default_activation() -> String {
    "linear".into()
}

impl RawDenseLayer {
    fn into_layer(self, name: &str) -> Result<DenseLayer, RecurrentLoadError> {
        let activation = match self.activation.as_str() {
            "linear" => Activation::Linear,
            "relu" => Activation::Relu,
            other => return Err(RecurrentLoadError::Activation(other.to_string())),
        };

        let kernel = Matrix::from_nested(self.kernel, name, "kernel")?;
        if self.bias.len() != kernel.cols {
            return Err(shape_error(
                name,
                format!("bias has {} values, expected {}", self.bias.len(), kernel.cols),
            ));
        }

        Ok(DenseLayer {
            kernel,
            bias: self.bias,
            activation,
        })
    }
}
