//! Fit engine adapter.
//!
//! The numerical tracer method lives outside this crate. Everything the
//! session needs from it is the [`FitEngine`] seam: one blocking call that
//! turns an input series, observations and a variant into a [`FittingResult`].

use crate::domain::{FittingResult, ModelVariant, Series};
use crate::error::AppError;

pub mod command;

pub use command::CommandEngine;

/// External fitting routine.
///
/// Implementations may take seconds per call and are invoked from the
/// orchestrator's worker thread, hence `Send + Sync`.
pub trait FitEngine: Send + Sync {
    fn fit(
        &self,
        dataset: &Series,
        observations: &Series,
        alpha: f64,
        variants: &[ModelVariant],
        want_uncertainty: bool,
    ) -> Result<FittingResult, AppError>;
}
