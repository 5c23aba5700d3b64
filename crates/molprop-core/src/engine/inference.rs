use super::error::EngineError;
use crate::core::graph::batch::Batcher;
use crate::core::graph::molecule::MolecularGraph;
use crate::core::model::GraphNetModel;
use crate::core::probability::distribution::Distribution;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Molecules per forward pass when predicting over large inputs. Purely a
/// memory/vectorization trade-off; results are batch-invariant.
const PREDICTION_CHUNK: usize = 256;

/// Applies a fitted model to new molecules with parameters frozen.
///
/// Borrows the model immutably for its whole lifetime, so no training
/// update can run concurrently with prediction. Returns full distribution
/// objects rather than point estimates; results for a molecule are the
/// same whether it is submitted alone or co-batched with others, up to
/// floating-point associativity.
pub struct InferenceEngine<'a> {
    model: &'a GraphNetModel,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(model: &'a GraphNetModel) -> Self {
        Self { model }
    }

    /// Predicts one [`Distribution`] per input molecule, in input order.
    pub fn predict(&self, graphs: &[MolecularGraph]) -> Result<Vec<Distribution>, EngineError> {
        if graphs.is_empty() {
            return Ok(Vec::new());
        }

        let chunks: Vec<&[MolecularGraph]> = graphs.chunks(PREDICTION_CHUNK).collect();

        #[cfg(feature = "parallel")]
        let results: Vec<Result<Vec<Distribution>, EngineError>> =
            chunks.par_iter().map(|c| self.predict_chunk(c)).collect();

        #[cfg(not(feature = "parallel"))]
        let results: Vec<Result<Vec<Distribution>, EngineError>> =
            chunks.iter().map(|c| self.predict_chunk(c)).collect();

        let mut out = Vec::with_capacity(graphs.len());
        for result in results {
            out.extend(result?);
        }
        Ok(out)
    }

    /// Convenience for a single molecule.
    pub fn predict_single(&self, graph: &MolecularGraph) -> Result<Distribution, EngineError> {
        let mut predictions = self.predict(std::slice::from_ref(graph))?;
        Ok(predictions.remove(0))
    }

    fn predict_chunk(&self, graphs: &[MolecularGraph]) -> Result<Vec<Distribution>, EngineError> {
        let refs: Vec<&MolecularGraph> = graphs.iter().collect();
        let batch = Batcher::combine(&refs)?;
        self.model.check_batch(&batch)?;
        let forward = self.model.forward(&batch)?;
        Ok(self.model.distributions(&forward))
    }
}
