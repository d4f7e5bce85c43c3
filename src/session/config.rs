//! Run configuration as edited by the user.

use std::path::PathBuf;

use crate::domain::{ModelKind, ModelVariant};
use crate::session::bounds::BoundPair;

pub const DEFAULT_ALPHA: f64 = 1.0;
pub const DEFAULT_BETA: f64 = 0.5;

/// Default search bounds for a parameter, by its csv name.
pub fn default_bounds(param: &str) -> (f64, f64) {
    match param {
        "n" => (1.0, 5.0),
        "PD" => (0.01, 1.0),
        _ => (1.0, 100.0),
    }
}

/// User choices for one model family.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection {
    pub kind: ModelKind,
    pub enabled: bool,
    pub beta_enabled: bool,
    pub beta: f64,
    bounds: Vec<BoundPair>,
}

impl ModelSelection {
    pub fn new(kind: ModelKind) -> Self {
        let bounds = kind
            .param_csv_names()
            .iter()
            .map(|name| {
                let (lo, hi) = default_bounds(name);
                BoundPair::new(lo, hi)
            })
            .collect();
        Self {
            kind,
            enabled: false,
            beta_enabled: false,
            beta: DEFAULT_BETA,
            bounds,
        }
    }

    pub fn bounds(&self) -> &[BoundPair] {
        &self.bounds
    }

    /// Returns `None` if `param` is out of range for this family.
    pub fn on_lower_changed(&mut self, param: usize, value: f64) -> Option<bool> {
        let pair = self.bounds.get_mut(param)?;
        let valid = pair.on_lower_changed(value);
        tracing::trace!(model = self.kind.code(), param, value, valid, "parameter lower bound changed");
        Some(valid)
    }

    pub fn on_upper_changed(&mut self, param: usize, value: f64) -> Option<bool> {
        let pair = self.bounds.get_mut(param)?;
        let valid = pair.on_upper_changed(value);
        tracing::trace!(model = self.kind.code(), param, value, valid, "parameter upper bound changed");
        Some(valid)
    }

    /// True while any of this family's bound pairs is inverted.
    pub fn has_warning(&self) -> bool {
        self.bounds.iter().any(|b| !b.is_valid())
    }

    pub fn to_variant(&self) -> ModelVariant {
        ModelVariant {
            kind: self.kind,
            bounds: self.bounds.iter().map(BoundPair::as_tuple).collect(),
            beta: self.beta_enabled.then_some(self.beta),
        }
    }
}

/// Everything needed to build a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub input_file: Option<PathBuf>,
    pub observations_file: Option<PathBuf>,
    pub alpha: f64,
    pub want_uncertainty: bool,
    /// One entry per family, in `ModelKind::ALL` order.
    pub models: [ModelSelection; 4],
    /// Order in which enabled families are fitted. Families missing here
    /// follow in `ModelKind::ALL` order; repeats are ignored.
    pub run_order: Vec<ModelKind>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_file: None,
            observations_file: None,
            alpha: DEFAULT_ALPHA,
            want_uncertainty: false,
            models: ModelKind::ALL.map(ModelSelection::new),
            run_order: ModelKind::ALL.to_vec(),
        }
    }
}

impl SessionConfig {
    pub fn model(&self, kind: ModelKind) -> &ModelSelection {
        &self.models[kind.index()]
    }

    pub fn model_mut(&mut self, kind: ModelKind) -> &mut ModelSelection {
        &mut self.models[kind.index()]
    }

    /// Variants for enabled families, in run order.
    pub fn variants(&self) -> Vec<ModelVariant> {
        let mut seen = [false; 4];
        self.run_order
            .iter()
            .chain(ModelKind::ALL.iter())
            .filter(|kind| !std::mem::replace(&mut seen[kind.index()], true))
            .map(|&kind| self.model(kind))
            .filter(|m| m.enabled)
            .map(ModelSelection::to_variant)
            .collect()
    }
}
