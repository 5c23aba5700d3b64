use crate::core::graph::molecule::MolecularGraph;
use crate::core::model::GraphNetModel;
use crate::core::probability::distribution::Distribution;
use crate::engine::error::EngineError;
use crate::engine::inference::InferenceEngine;
use tracing::{info, instrument};

/// Applies a fitted model to new molecules, returning one calibrated
/// [`Distribution`] per input in input order.
///
/// Parameters are frozen for the duration of the call; prediction has no
/// side effects on the model.
#[instrument(skip_all, name = "prediction_workflow")]
pub fn run(
    model: &GraphNetModel,
    graphs: &[MolecularGraph],
) -> Result<Vec<Distribution>, EngineError> {
    info!(
        molecules = graphs.len(),
        family = model.family().name(),
        "Running prediction workflow."
    );
    let engine = InferenceEngine::new(model);
    let predictions = engine.predict(graphs)?;
    info!(
        predictions = predictions.len(),
        "Prediction workflow complete."
    );
    Ok(predictions)
}
