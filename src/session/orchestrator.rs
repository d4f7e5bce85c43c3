//! Background computation pipeline.
//!
//! A run fits each variant of a [`ComputationRequest`] in the order supplied,
//! one engine call at a time, on a dedicated worker thread. Progress and
//! results travel back to the interactive thread over an ordered channel:
//!
//! `Started` → (`Progress`, `ResultReady`) per successful variant → `Finished`
//!
//! A failing variant yields `Failed` instead of its pair and the batch moves
//! on. Cancellation is cooperative and only observed between variants.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::domain::{ComputationRequest, FittingResult, ModelVariant};
use crate::engine::FitEngine;
use crate::error::AppError;

/// Busy label carried by [`RunEvent::Started`].
pub const CALCULATIONS_LABEL: &str = "Calculations in progress";

/// Event emitted by a run, in emission order.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started { label: String },
    Progress { percent: f64, label: String },
    ResultReady { result: Box<FittingResult> },
    Failed { variant: ModelVariant, error: AppError },
    Finished { cancelled: bool },
}

/// Shared flag checked by the worker between variants.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Completion percentage after `done` of `total` variants.
///
/// The fraction is rounded to two decimals (ties to even) before scaling, so
/// `1/3` reports `33.0` and `1/8` reports `12.0`.
pub fn progress_percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let fraction = done as f64 / total as f64;
    // `{:.2}` rounds the exact binary value, half to even.
    let rounded = format!("{fraction:.2}").parse::<f64>().unwrap_or(fraction);
    rounded * 100.0
}

/// Label shown next to the progress bar, e.g. `"33.0%"`.
pub fn progress_label(percent: f64) -> String {
    format!("{percent:?}%")
}

/// Drives one batch of fits through the engine.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn FitEngine>,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn FitEngine>) -> Self {
        Self { engine }
    }

    /// Execute the run on the calling thread, pushing events into `tx`.
    ///
    /// Stops early if the receiving side hangs up.
    pub fn run(&self, request: &ComputationRequest, cancel: &CancelToken, tx: &Sender<RunEvent>) {
        let total = request.variants.len();
        tracing::info!(variants = total, alpha = request.alpha, "fit run started");

        if tx
            .send(RunEvent::Started {
                label: CALCULATIONS_LABEL.to_string(),
            })
            .is_err()
        {
            return;
        }

        let mut cancelled = false;
        for (index, variant) in request.variants.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(completed = index, total, "fit run cancelled");
                cancelled = true;
                break;
            }

            tracing::debug!(model = variant.kind.code(), index, "fitting variant");
            let outcome = self.engine.fit(
                &request.dataset,
                &request.observations,
                request.alpha,
                std::slice::from_ref(variant),
                request.want_uncertainty,
            );

            let delivered = match outcome {
                Ok(result) => {
                    let percent = progress_percent(index + 1, total);
                    tx.send(RunEvent::Progress {
                        percent,
                        label: progress_label(percent),
                    })
                    .and_then(|()| {
                        tx.send(RunEvent::ResultReady {
                            result: Box::new(result),
                        })
                    })
                    .is_ok()
                }
                Err(error) => {
                    tracing::warn!(model = variant.kind.code(), error = %error, "variant fit failed");
                    tx.send(RunEvent::Failed {
                        variant: variant.clone(),
                        error,
                    })
                    .is_ok()
                }
            };

            if !delivered {
                tracing::debug!("event consumer disconnected; stopping run");
                return;
            }
        }

        let _ = tx.send(RunEvent::Finished { cancelled });
        tracing::info!(cancelled, "fit run finished");
    }

    /// Start the run on a worker thread and hand back its event stream.
    pub fn spawn(&self, request: ComputationRequest, cancel: CancelToken) -> Result<RunHandle, AppError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let orchestrator = self.clone();
        let worker_cancel = cancel.clone();
        let worker = thread::Builder::new()
            .name("fit-worker".to_string())
            .spawn(move || orchestrator.run(&request, &worker_cancel, &tx))
            .map_err(|e| AppError::io(format!("Failed to start fit worker: {e}")))?;

        Ok(RunHandle {
            events: rx,
            cancel,
            worker: Some(worker),
        })
    }
}

/// Consumer side of a spawned run.
pub struct RunHandle {
    events: Receiver<RunEvent>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl RunHandle {
    /// Next event if one is already queued; never blocks.
    pub fn try_next(&self) -> Option<RunEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Blocking iterator over the remaining events; ends when the worker exits.
    pub fn iter(&self) -> impl Iterator<Item = RunEvent> + '_ {
        self.events.iter()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the worker has exited and every event has been drained.
    pub fn is_done(&self) -> bool {
        let worker_done = self.worker.as_ref().is_none_or(|w| w.is_finished());
        worker_done && self.events.is_empty()
    }

    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("fit worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::{Accuracy, ModelKind, Series};

    struct StubEngine {
        fail_on: Option<ModelKind>,
        calls: Mutex<Vec<ModelKind>>,
    }

    impl StubEngine {
        fn new(fail_on: Option<ModelKind>) -> Self {
            Self {
                fail_on,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl FitEngine for StubEngine {
        fn fit(
            &self,
            _dataset: &Series,
            _observations: &Series,
            _alpha: f64,
            variants: &[ModelVariant],
            _want_uncertainty: bool,
        ) -> Result<FittingResult, AppError> {
            assert_eq!(variants.len(), 1);
            let kind = variants[0].kind;
            self.calls.lock().unwrap().push(kind);
            if self.fail_on == Some(kind) {
                return Err(AppError::fit("singular jacobian"));
            }
            Ok(FittingResult {
                model_type: kind,
                params: vec![1.0; kind.arity()],
                accuracy: Accuracy::StdError {
                    params_accuracy: vec![0.1; kind.arity()],
                },
                beta: variants[0].beta,
                mse: 1.0,
                model_efficiency: 0.5,
                observations: Series::default(),
                output: Series::default(),
                response_function: None,
            })
        }
    }

    fn request(kinds: &[ModelKind]) -> ComputationRequest {
        ComputationRequest {
            variants: kinds
                .iter()
                .map(|&kind| ModelVariant {
                    kind,
                    bounds: vec![(1.0, 10.0); kind.arity()],
                    beta: None,
                })
                .collect(),
            dataset: Series::default(),
            observations: Series::default(),
            alpha: 1.0,
            want_uncertainty: false,
        }
    }

    fn collect(engine: Arc<StubEngine>, req: &ComputationRequest, cancel: &CancelToken) -> Vec<RunEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Orchestrator::new(engine).run(req, cancel, &tx);
        drop(tx);
        rx.iter().collect()
    }

    #[test]
    fn rounds_fraction_before_scaling() {
        let got: Vec<f64> = (1..=3).map(|i| progress_percent(i, 3)).collect();
        assert_eq!(got, vec![33.0, 67.0, 100.0]);
        assert_eq!(progress_label(33.0), "33.0%");
        // 1/8 = 0.125 rounds to 0.12 with ties-to-even.
        assert_eq!(progress_percent(1, 8), 12.0);
    }

    #[test]
    fn rounding_uses_the_stored_fraction() {
        // 1/40 is stored just above 0.025, 3/40 just below 0.075.
        assert_eq!(progress_percent(1, 40), 3.0);
        assert_eq!(progress_percent(3, 40), 7.000000000000001);
        assert_eq!(progress_label(progress_percent(3, 40)), "7.000000000000001%");
    }

    #[test]
    fn progress_is_non_decreasing_and_ends_at_100() {
        for n in 1..=25 {
            let values: Vec<f64> = (1..=n).map(|i| progress_percent(i, n)).collect();
            assert!(values.windows(2).all(|w| w[0] <= w[1]), "n={n}: {values:?}");
            assert_eq!(*values.last().unwrap(), 100.0);
        }
    }

    #[test]
    fn events_arrive_in_order() {
        let kinds = [ModelKind::Pfm, ModelKind::Em, ModelKind::Dm];
        let engine = Arc::new(StubEngine::new(None));
        let events = collect(engine.clone(), &request(&kinds), &CancelToken::new());

        assert_eq!(events.len(), 2 + 2 * kinds.len());
        assert!(matches!(&events[0], RunEvent::Started { label } if label == CALCULATIONS_LABEL));
        for (i, kind) in kinds.iter().enumerate() {
            match (&events[1 + 2 * i], &events[2 + 2 * i]) {
                (RunEvent::Progress { percent, label }, RunEvent::ResultReady { result }) => {
                    assert_eq!(*percent, progress_percent(i + 1, kinds.len()));
                    assert_eq!(label, &progress_label(*percent));
                    assert_eq!(result.model_type, *kind);
                }
                other => panic!("unexpected pair: {other:?}"),
            }
        }
        assert!(matches!(events.last(), Some(RunEvent::Finished { cancelled: false })));
        assert_eq!(*engine.calls.lock().unwrap(), kinds.to_vec());
    }

    #[test]
    fn failed_variant_does_not_abort_batch() {
        let kinds = [ModelKind::Pfm, ModelKind::Em, ModelKind::Epm];
        let engine = Arc::new(StubEngine::new(Some(ModelKind::Em)));
        let events = collect(engine, &request(&kinds), &CancelToken::new());

        let results: Vec<ModelKind> = events
            .iter()
            .filter_map(|e| match e {
                RunEvent::ResultReady { result } => Some(result.model_type),
                _ => None,
            })
            .collect();
        assert_eq!(results, vec![ModelKind::Pfm, ModelKind::Epm]);
        assert!(events.iter().any(|e| matches!(
            e,
            RunEvent::Failed { variant, .. } if variant.kind == ModelKind::Em
        )));
        assert!(matches!(events.last(), Some(RunEvent::Finished { cancelled: false })));
    }

    #[test]
    fn cancelled_before_start_fits_nothing() {
        let engine = Arc::new(StubEngine::new(None));
        let cancel = CancelToken::new();
        cancel.cancel();
        let events = collect(engine.clone(), &request(&[ModelKind::Pfm, ModelKind::Em]), &cancel);

        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], RunEvent::Finished { cancelled: true }));
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn spawned_run_streams_to_consumer() {
        let engine = Arc::new(StubEngine::new(None));
        let handle = Orchestrator::new(engine)
            .spawn(request(&[ModelKind::Epm, ModelKind::Pfm]), CancelToken::new())
            .unwrap();
        let events: Vec<RunEvent> = handle.iter().collect();
        assert_eq!(events.len(), 6);
        assert!(handle.is_done());
        handle.join();
    }
}
