//! Session controller: turns user intent into calls on the core.
//!
//! The controller owns the registry and the plot bounds. The worker thread
//! never touches them: every result reaches the registry through
//! [`Session::pump`] (or [`Session::wait`]), on the thread that owns the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::{ComputationRequest, ModelKind};
use crate::engine::FitEngine;
use crate::error::AppError;
use crate::io::{dataset_name, export_parameters, export_results, read_input_series, read_observation_series, timestamp_now};
use crate::session::bounds::{Axis, AxisUpdate, BOUNDS_WARNING, PlotBounds, Viewport};
use crate::session::config::SessionConfig;
use crate::session::orchestrator::{CancelToken, Orchestrator, RunEvent, RunHandle};
use crate::session::registry::{Registry, ResultEntry};

/// Margin added around the data when a result is plotted.
const PLOT_PADDING: f64 = 2.0;

/// A variant that failed during the last run.
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub kind: ModelKind,
    pub message: String,
}

pub struct Session {
    config: SessionConfig,
    registry: Registry,
    plot: PlotBounds,
    selected: Option<usize>,
    orchestrator: Orchestrator,
    active: Option<RunHandle>,
    run_name: String,
    busy_label: String,
    progress: f64,
    progress_label: String,
    failures: Vec<RunFailure>,
}

impl Session {
    pub fn new(engine: Arc<dyn FitEngine>, config: SessionConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
            plot: PlotBounds::default(),
            selected: None,
            orchestrator: Orchestrator::new(engine),
            active: None,
            run_name: String::new(),
            busy_label: String::new(),
            progress: 0.0,
            progress_label: String::new(),
            failures: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn plot(&self) -> &PlotBounds {
        &self.plot
    }

    pub fn selected(&self) -> Option<&ResultEntry> {
        self.selected.and_then(|o| self.registry.get(o))
    }

    pub fn busy_label(&self) -> &str {
        &self.busy_label
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn progress_label(&self) -> &str {
        &self.progress_label
    }

    pub fn failures(&self) -> &[RunFailure] {
        &self.failures
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Validate the configuration and load both files.
    ///
    /// All problems are collected into one multi-line configuration error.
    pub fn preflight(&self) -> Result<ComputationRequest, AppError> {
        let config = &self.config;
        let mut problems = Vec::new();

        let mut missing = Vec::new();
        if config.input_file.is_none() {
            missing.push("input file");
        }
        if config.observations_file.is_none() {
            missing.push("observations file");
        }
        if !missing.is_empty() {
            problems.push(format!("Define {}", missing.join(" and ")));
        }

        if config.models.iter().any(|m| m.enabled && m.has_warning()) {
            problems.push(BOUNDS_WARNING.to_string());
        }

        let variants = config.variants();
        if variants.is_empty() {
            problems.push("Select at least one model".to_string());
        }

        if !(config.alpha.is_finite() && config.alpha > 0.0) {
            problems.push(format!("Alpha must be a positive number (got {})", config.alpha));
        }

        let dataset = match &config.input_file {
            Some(path) => read_input_series(path)
                .map_err(|e| problems.push(format!("Input file: {e}")))
                .ok(),
            None => None,
        };
        let observations = match &config.observations_file {
            Some(path) => read_observation_series(path)
                .map_err(|e| problems.push(format!("Observations file: {e}")))
                .ok(),
            None => None,
        };

        match (dataset, observations) {
            (Some(dataset), Some(observations)) if problems.is_empty() => Ok(ComputationRequest {
                variants,
                dataset,
                observations,
                alpha: config.alpha,
                want_uncertainty: config.want_uncertainty,
            }),
            _ => Err(AppError::config(problems.join("\n"))),
        }
    }

    /// Validate, then start a background run.
    pub fn start_run(&mut self) -> Result<(), AppError> {
        if self.is_running() {
            return Err(AppError::config("A run is already in progress."));
        }
        let request = self.preflight()?;

        self.run_name = self
            .config
            .observations_file
            .as_deref()
            .map(dataset_name)
            .unwrap_or_default();
        self.failures.clear();
        self.progress = 0.0;
        self.progress_label.clear();

        tracing::info!(dataset = %self.run_name, variants = request.variants.len(), "starting run");
        let handle = self.orchestrator.spawn(request, CancelToken::new())?;
        self.active = Some(handle);
        Ok(())
    }

    /// Ask the worker to stop after the variant in flight.
    pub fn cancel_run(&self) {
        if let Some(handle) = &self.active {
            handle.cancel();
        }
    }

    /// Apply every event already queued by the worker. Never blocks.
    ///
    /// Returns how many events were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let Some(handle) = &self.active else {
                break;
            };
            match handle.try_next() {
                Some(event) => {
                    self.apply(&event);
                    applied += 1;
                }
                None => {
                    if handle.is_done() {
                        self.finish_run();
                    }
                    break;
                }
            }
        }
        applied
    }

    /// Block until the active run finishes, applying events as they arrive.
    pub fn wait(&mut self, mut on_event: impl FnMut(&RunEvent, &Registry)) {
        let Some(handle) = self.active.take() else {
            return;
        };
        for event in handle.iter() {
            self.apply(&event);
            on_event(&event, &self.registry);
        }
        handle.join();
        self.busy_label.clear();
    }

    fn apply(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Started { label } => {
                self.busy_label = label.clone();
            }
            RunEvent::Progress { percent, label } => {
                self.progress = *percent;
                self.progress_label = label.clone();
            }
            RunEvent::ResultReady { result } => {
                let ordinal = self.registry.add(&self.run_name, (**result).clone()).ordinal();
                if self.selected.is_none() {
                    let _ = self.select(ordinal);
                }
            }
            RunEvent::Failed { variant, error } => {
                self.failures.push(RunFailure {
                    kind: variant.kind,
                    message: error.message().to_string(),
                });
            }
            RunEvent::Finished { .. } => {
                self.finish_run();
            }
        }
    }

    fn finish_run(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.join();
        }
        self.busy_label.clear();
    }

    /// Show a result: redraw the plot around its data and push the new axis
    /// bounds through the propagator.
    pub fn select(&mut self, ordinal: usize) -> Result<(), AppError> {
        let entry = self
            .registry
            .get(ordinal)
            .ok_or_else(|| AppError::config(format!("No result with number {ordinal}.")))?;
        let result = entry.result();

        let x = padded(result.observations.x_range().or(result.output.x_range()));
        let y_view = padded(result.output.y_range());
        let y_controls = padded(result.observations.y_range().or(result.output.y_range()));

        self.plot.reset_viewport(Viewport::new(x, y_view));
        self.plot.on_lower_changed(Axis::X, x.0);
        self.plot.on_upper_changed(Axis::X, x.1);
        self.plot.on_lower_changed(Axis::Y, y_controls.0);
        self.plot.on_upper_changed(Axis::Y, y_controls.1);

        self.selected = Some(ordinal);
        Ok(())
    }

    pub fn on_axis_lower_changed(&mut self, axis: Axis, value: f64) -> AxisUpdate {
        self.plot.on_lower_changed(axis, value)
    }

    pub fn on_axis_upper_changed(&mut self, axis: Axis, value: f64) -> AxisUpdate {
        self.plot.on_upper_changed(axis, value)
    }

    pub fn on_param_lower_changed(&mut self, kind: ModelKind, param: usize, value: f64) -> Option<bool> {
        self.config.model_mut(kind).on_lower_changed(param, value)
    }

    pub fn on_param_upper_changed(&mut self, kind: ModelKind, param: usize, value: f64) -> Option<bool> {
        self.config.model_mut(kind).on_upper_changed(param, value)
    }

    pub fn toggle_checked(&mut self, ordinal: usize) -> Result<bool, AppError> {
        self.registry.toggle_checked(ordinal)
    }

    /// Label of the check-all button.
    pub fn check_button_label(&self) -> &'static str {
        if self.registry.any_checked() { "Uncheck" } else { "Check all" }
    }

    /// Check everything, or uncheck everything if anything is checked.
    pub fn toggle_check_all(&mut self) {
        if self.registry.any_checked() {
            self.registry.uncheck_all();
        } else {
            self.registry.check_all();
        }
    }

    /// Save and delete act on checked entries only.
    pub fn can_act_on_checked(&self) -> bool {
        self.registry.any_checked()
    }

    /// Delete checked entries. The selection follows its entry to its new
    /// ordinal, or is cleared if the entry was deleted.
    pub fn delete_checked(&mut self) -> Result<usize, AppError> {
        let checked = self.registry.checked_ordinals();
        let selected = self.selected;
        let removed = self.registry.delete(&checked)?;

        self.selected = selected
            .filter(|o| !checked.contains(o))
            .map(|o| o - checked.range(..o).count());
        if self.selected.is_none() {
            self.plot = PlotBounds::default();
        }
        Ok(removed)
    }

    /// Export checked results under `dir`. Returns the results directory.
    pub fn export_checked(&self, dir: &Path) -> Result<PathBuf, AppError> {
        if !self.registry.any_checked() {
            return Err(AppError::config("No results checked."));
        }
        export_results(dir, self.registry.checked(), &timestamp_now())
    }

    /// Export the parameter table of every entry under `dir`.
    pub fn export_parameter_table(&self, dir: &Path) -> Result<PathBuf, AppError> {
        export_parameters(dir, &self.registry, &timestamp_now())
    }
}

fn padded(range: Option<(f64, f64)>) -> (f64, f64) {
    let (lo, hi) = range.unwrap_or((0.0, 1.0));
    (lo - PLOT_PADDING, hi + PLOT_PADDING)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::domain::{Accuracy, FittingResult, ModelVariant, Series};
    use crate::error::ErrorKind;

    struct EchoEngine;

    impl FitEngine for EchoEngine {
        fn fit(
            &self,
            _dataset: &Series,
            observations: &Series,
            _alpha: f64,
            variants: &[ModelVariant],
            _want_uncertainty: bool,
        ) -> Result<FittingResult, AppError> {
            let kind = variants[0].kind;
            if kind == ModelKind::Dm {
                return Err(AppError::fit("no convergence"));
            }
            Ok(FittingResult {
                model_type: kind,
                params: vec![5.0; kind.arity()],
                accuracy: Accuracy::StdError {
                    params_accuracy: vec![0.5; kind.arity()],
                },
                beta: variants[0].beta,
                mse: 1.0,
                model_efficiency: 0.8,
                observations: observations.clone(),
                output: Series::new(vec![1990.0, 2000.0], vec![20.0, 30.0]),
                response_function: kind.has_response_function().then(Series::default),
            })
        }
    }

    fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    fn session(dir: &Path) -> Session {
        let mut config = SessionConfig::default();
        config.input_file = Some(write_csv(dir, "input.csv", "year,t\n1960,100\n1970,50\n"));
        config.observations_file = Some(write_csv(dir, "spring.csv", "year,t\n1992,10\n1998,25\n"));
        Session::new(Arc::new(EchoEngine), config)
    }

    #[test]
    fn preflight_aggregates_every_problem() {
        let mut config = SessionConfig::default();
        config.model_mut(ModelKind::Em).enabled = true;
        config.model_mut(ModelKind::Em).on_lower_changed(0, 500.0);
        let session = Session::new(Arc::new(EchoEngine), config);

        let err = session.preflight().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let lines: Vec<&str> = err.message().lines().collect();
        assert_eq!(lines, vec!["Define input file and observations file", "Set correct bounds"]);
    }

    #[test]
    fn preflight_requires_a_model_and_readable_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.config_mut().observations_file = Some(write_csv(dir.path(), "bad.csv", "1990,1\n1991,x\n"));

        let err = s.preflight().unwrap_err();
        let message = err.message();
        assert!(message.contains("Select at least one model"));
        assert!(message.contains("Observations file: Line 2"));
        assert!(!s.is_running());
    }

    #[test]
    fn run_results_land_in_registry_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        for kind in [ModelKind::Pfm, ModelKind::Epm, ModelKind::Dm] {
            s.config_mut().model_mut(kind).enabled = true;
        }

        s.start_run().unwrap();
        assert!(s.start_run().is_err());
        let mut seen = Vec::new();
        s.wait(|event, _| seen.push(format!("{event:?}").split([' ', '{']).next().unwrap_or("").to_string()));

        assert!(!s.is_running());
        let names: Vec<String> = s.registry().entries().iter().map(ResultEntry::display_name).collect();
        assert_eq!(names, vec!["1. spring", "2. spring_1"]);
        assert_eq!(s.failures().len(), 1);
        assert_eq!(s.failures()[0].kind, ModelKind::Dm);
        assert_eq!(s.busy_label(), "");
        assert_eq!(seen.first().map(String::as_str), Some("Started"));
        assert_eq!(seen.last().map(String::as_str), Some("Finished"));
    }

    #[test]
    fn first_result_is_plotted_with_padded_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.config_mut().model_mut(ModelKind::Em).enabled = true;
        s.start_run().unwrap();
        s.wait(|_, _| {});

        assert_eq!(s.selected().map(ResultEntry::ordinal), Some(1));
        let viewport = s.plot().viewport();
        assert_eq!(viewport.x, (1990.0, 2000.0));
        // Output y range opens the view, observation bounds then narrow it.
        assert_eq!(viewport.y, (8.0, 27.0));
        assert!(s.plot().is_valid());
    }

    #[test]
    fn delete_checked_keeps_selection_on_survivor() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        for kind in [ModelKind::Pfm, ModelKind::Em, ModelKind::Epm] {
            s.config_mut().model_mut(kind).enabled = true;
        }
        s.start_run().unwrap();
        s.wait(|_, _| {});

        s.select(3).unwrap();
        assert_eq!(s.check_button_label(), "Check all");
        s.toggle_checked(1).unwrap();
        assert_eq!(s.check_button_label(), "Uncheck");
        assert!(s.can_act_on_checked());

        assert_eq!(s.delete_checked().unwrap(), 1);
        let selected = s.selected().unwrap();
        assert_eq!(selected.ordinal(), 2);
        assert_eq!(selected.name(), "spring_2");
        assert!(!s.can_act_on_checked());

        s.toggle_check_all();
        s.delete_checked().unwrap();
        assert!(s.registry().is_empty());
        assert!(s.selected().is_none());
    }

    #[test]
    fn exports_require_checked_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.config_mut().model_mut(ModelKind::Em).enabled = true;
        s.start_run().unwrap();
        s.wait(|_, _| {});

        assert!(s.export_checked(dir.path()).is_err());
        s.toggle_check_all();
        let root = s.export_checked(dir.path()).unwrap();
        assert!(root.join("spring").join("output.csv").is_file());

        let table = s.export_parameter_table(dir.path()).unwrap();
        assert!(table.is_file());
    }
}
