use crate::core::data::Dataset;
use crate::core::model::GraphNetModel;
use crate::engine::config::TrainConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::{FitReport, StopSignal};
use crate::engine::trainer::Trainer;
use tracing::{info, instrument};

/// Result of a training workflow: the fitted model plus the run summary.
#[derive(Debug)]
pub struct TrainOutcome {
    pub model: GraphNetModel,
    pub report: FitReport,
}

/// Fits a fresh model to `dataset` under `config`.
///
/// This is the library's training entry point: it validates the
/// configuration, initializes the model, and drives the optimization loop,
/// reporting phase and epoch progress through `reporter`. Either a
/// well-formed [`TrainOutcome`] is returned or a specific [`EngineError`];
/// there is no partial-success state.
#[instrument(skip_all, name = "training_workflow")]
pub fn run(
    dataset: &Dataset,
    config: &TrainConfig,
    reporter: &ProgressReporter,
) -> Result<TrainOutcome, EngineError> {
    run_with_stop(dataset, config, reporter, &StopSignal::new())
}

/// Like [`run`], with a cooperative cancellation signal checked between
/// optimization steps.
#[instrument(skip_all, name = "training_workflow")]
pub fn run_with_stop(
    dataset: &Dataset,
    config: &TrainConfig,
    reporter: &ProgressReporter,
    stop: &StopSignal,
) -> Result<TrainOutcome, EngineError> {
    // === Phase 0: Preparation ===
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    info!(
        examples = dataset.len(),
        layers = config.model.layer_count,
        family = config.model.family.name(),
        "Validating configuration and initializing model."
    );
    let mut trainer = Trainer::new(config)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Optimization ===
    reporter.report(Progress::PhaseStart { name: "Training" });
    let report = trainer.fit(dataset, reporter, stop)?;
    reporter.report(Progress::PhaseFinish);

    info!(
        phase = ?report.phase,
        epochs = report.epochs_completed,
        final_loss = report.final_loss(),
        "Training workflow complete."
    );
    Ok(TrainOutcome {
        model: trainer.into_model(),
        report,
    })
}
