//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - handed to the external fitting engine as JSON
//! - moved between the worker thread and the interactive thread
//! - exported to CSV

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Lumped-parameter model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelKind {
    /// Piston-flow model.
    Pfm,
    /// Exponential model.
    Em,
    /// Exponential-piston model.
    Epm,
    /// Dispersion model.
    Dm,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [ModelKind::Pfm, ModelKind::Em, ModelKind::Epm, ModelKind::Dm];

    /// Position in [`ModelKind::ALL`].
    pub fn index(self) -> usize {
        match self {
            ModelKind::Pfm => 0,
            ModelKind::Em => 1,
            ModelKind::Epm => 2,
            ModelKind::Dm => 3,
        }
    }

    /// Short label, also used as the `modelType` column in exports.
    pub fn code(self) -> &'static str {
        match self {
            ModelKind::Pfm => "PFM",
            ModelKind::Em => "EM",
            ModelKind::Epm => "EPM",
            ModelKind::Dm => "DM",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Pfm => "piston-flow",
            ModelKind::Em => "exponential",
            ModelKind::Epm => "exponential-piston",
            ModelKind::Dm => "dispersion",
        }
    }

    /// Parameter symbols shown in the terminal UI.
    pub fn param_symbols(self) -> &'static [&'static str] {
        match self {
            ModelKind::Pfm | ModelKind::Em => &["τ"],
            ModelKind::Epm => &["τ", "η"],
            ModelKind::Dm => &["τ", "PD"],
        }
    }

    /// Parameter names used in exported CSV headers.
    pub fn param_csv_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::Pfm | ModelKind::Em => &["T"],
            ModelKind::Epm => &["T", "n"],
            ModelKind::Dm => &["T", "PD"],
        }
    }

    /// Number of fitted parameters (and bound pairs).
    pub fn arity(self) -> usize {
        self.param_csv_names().len()
    }

    /// Piston flow is the only family whose engine output has no response function.
    pub fn has_response_function(self) -> bool {
        self != ModelKind::Pfm
    }

    pub fn from_code(code: &str) -> Option<ModelKind> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.code().eq_ignore_ascii_case(code.trim()))
    }
}

/// A paired `(x, y)` series.
///
/// Used for the input dataset, the observations and every series the engine
/// produces. `x` and `y` always have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Series {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        debug_assert_eq!(x.len(), y.len());
        Self { x, y }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }

    pub fn x_range(&self) -> Option<(f64, f64)> {
        min_max(&self.x)
    }

    pub fn y_range(&self) -> Option<(f64, f64)> {
        min_max(&self.y)
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let mut it = values.iter().copied().filter(|v| v.is_finite());
    let first = it.next()?;
    Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

/// One fitting configuration submitted to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVariant {
    pub kind: ModelKind,
    /// `(lower, upper)` per parameter, in `kind.param_csv_names()` order.
    pub bounds: Vec<(f64, f64)>,
    /// Present only when beta refinement is enabled for this variant.
    pub beta: Option<f64>,
}

/// Accuracy estimate attached to fitted parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Accuracy {
    /// One accuracy value per parameter.
    StdError { params_accuracy: Vec<f64> },
    /// Confidence intervals, produced when uncertainty estimation is requested.
    Confidence {
        confidence_interval: Vec<f64>,
        confidence_level: Vec<f64>,
    },
}

impl Accuracy {
    /// Per-parameter accuracy figure used in tables (interval half-width for
    /// the confidence variant).
    pub fn per_param(&self) -> &[f64] {
        match self {
            Accuracy::StdError { params_accuracy } => params_accuracy,
            Accuracy::Confidence {
                confidence_interval, ..
            } => confidence_interval,
        }
    }
}

/// Output of one variant fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittingResult {
    pub model_type: ModelKind,
    pub params: Vec<f64>,
    pub accuracy: Accuracy,
    #[serde(default)]
    pub beta: Option<f64>,
    pub mse: f64,
    pub model_efficiency: f64,
    pub observations: Series,
    pub output: Series,
    /// Absent for the piston-flow family.
    #[serde(default)]
    pub response_function: Option<Series>,
}

/// Everything the orchestrator needs for one batch run.
#[derive(Debug, Clone)]
pub struct ComputationRequest {
    pub variants: Vec<ModelVariant>,
    pub dataset: Series,
    pub observations: Series,
    pub alpha: f64,
    pub want_uncertainty: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_matches_param_names() {
        assert_eq!(ModelKind::Pfm.arity(), 1);
        assert_eq!(ModelKind::Em.arity(), 1);
        assert_eq!(ModelKind::Epm.arity(), 2);
        assert_eq!(ModelKind::Dm.arity(), 2);
        for kind in ModelKind::ALL {
            assert_eq!(kind.param_symbols().len(), kind.arity());
        }
    }

    #[test]
    fn only_piston_flow_lacks_response_function() {
        let without: Vec<_> = ModelKind::ALL
            .into_iter()
            .filter(|k| !k.has_response_function())
            .collect();
        assert_eq!(without, vec![ModelKind::Pfm]);
    }

    #[test]
    fn fitting_result_json_shape() {
        let json = r#"{
            "model_type": "EPM",
            "params": [12.5, 1.2],
            "accuracy": {"kind": "std_error", "params_accuracy": [0.5, 0.01]},
            "mse": 4.2,
            "model_efficiency": 0.9,
            "observations": {"x": [1990.0], "y": [10.0]},
            "output": {"x": [1990.0, 1991.0], "y": [9.0, 8.0]},
            "response_function": {"x": [0.0], "y": [1.0]}
        }"#;
        let result: FittingResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.model_type, ModelKind::Epm);
        assert_eq!(result.beta, None);
        assert_eq!(result.accuracy.per_param(), &[0.5, 0.01]);
        assert_eq!(result.output.len(), 2);
    }

    #[test]
    fn series_ranges_skip_non_finite() {
        let s = Series::new(vec![3.0, f64::NAN, 1.0], vec![0.0, 5.0, -2.0]);
        assert_eq!(s.x_range(), Some((1.0, 3.0)));
        assert_eq!(s.y_range(), Some((-2.0, 5.0)));
        assert_eq!(Series::default().x_range(), None);
    }
}
