use super::config::TrainConfig;
use super::convergence::{ConvergenceDecision, ConvergencePolicy, PlateauPatience};
use super::error::EngineError;
use super::optimizer::Optimizer;
use super::progress::{Progress, ProgressReporter};
use super::state::{EpochRecord, FitReport, StopSignal, TrainerPhase};
use crate::core::data::Dataset;
use crate::core::graph::batch::{Batcher, DimensionMismatchError};
use crate::core::graph::molecule::MolecularGraph;
use crate::core::model::GraphNetModel;
use crate::core::probability::distribution::LogProbError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::time::Instant;
use tracing::{info, warn};

/// Drives gradient-based optimization of a [`GraphNetModel`] by minimizing
/// the mean negative log-likelihood over shuffled mini-batches.
///
/// The trainer exclusively owns the model and the optimizer state; a
/// forward pass during training borrows parameters read-only and only the
/// update step mutates them. A step whose loss is non-finite never touches
/// the parameters: it either consumes one configured instability retry
/// (shrinking the learning rate) or fails the run.
pub struct Trainer {
    model: GraphNetModel,
    optimizer: Optimizer,
    policy: Box<dyn ConvergencePolicy>,
    config: TrainConfig,
    phase: TrainerPhase,
    rng: StdRng,
    retries_left: usize,
}

impl Trainer {
    /// Builds a trainer with freshly initialized parameters and the default
    /// plateau-patience convergence policy.
    pub fn new(config: &TrainConfig) -> Result<Self, EngineError> {
        let policy = Box::new(PlateauPatience::from_config(&config.convergence));
        Self::with_policy(config, policy)
    }

    /// Like [`Trainer::new`] but with a caller-supplied convergence policy.
    pub fn with_policy(
        config: &TrainConfig,
        policy: Box<dyn ConvergencePolicy>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.optimization.seed);
        let model = GraphNetModel::new(config.model, &mut rng);
        let optimizer = Optimizer::new(
            config.optimization.optimizer,
            config.optimization.learning_rate,
        );
        Ok(Self {
            model,
            optimizer,
            policy,
            config: config.clone(),
            phase: TrainerPhase::Initialized,
            rng,
            retries_left: config.optimization.instability_retries,
        })
    }

    pub fn phase(&self) -> TrainerPhase {
        self.phase
    }

    pub fn model(&self) -> &GraphNetModel {
        &self.model
    }

    pub fn into_model(self) -> GraphNetModel {
        self.model
    }

    /// Runs the training loop over `dataset` until convergence, exhaustion
    /// of the epoch budget, cancellation, or failure.
    pub fn fit(
        &mut self,
        dataset: &Dataset,
        reporter: &ProgressReporter,
        stop: &StopSignal,
    ) -> Result<FitReport, EngineError> {
        self.check_dataset(dataset)?;

        let epochs = self.config.optimization.epochs;
        let batch_size = self.config.optimization.batch_size;
        let started = Instant::now();
        let mut history: Vec<EpochRecord> = Vec::new();
        let mut indices: Vec<usize> = (0..dataset.len()).collect();

        self.phase = TrainerPhase::Training;
        info!(
            examples = dataset.len(),
            epochs, batch_size, "Starting training run."
        );

        'epochs: for epoch in 0..epochs {
            if self.interrupted(stop, started) {
                self.phase = TrainerPhase::Stopped;
                break 'epochs;
            }
            reporter.report(Progress::EpochStart {
                epoch,
                total: epochs,
            });
            indices.shuffle(&mut self.rng);

            let mut loss_sum = 0.0;
            let mut scored = 0usize;
            for (step, chunk) in indices.chunks(batch_size).enumerate() {
                if self.interrupted(stop, started) {
                    self.phase = TrainerPhase::Stopped;
                    break 'epochs;
                }
                match self.run_step(dataset, chunk, epoch, step)? {
                    Some(batch_loss_sum) => {
                        loss_sum += batch_loss_sum;
                        scored += chunk.len();
                    }
                    None => {} // instability absorbed by a retry
                }
                reporter.report(Progress::StepIncrement);
            }

            if scored == 0 {
                continue;
            }
            let mean_nll = loss_sum / scored as f64;
            history.push(EpochRecord { epoch, mean_nll });
            reporter.report(Progress::EpochFinish { epoch, mean_nll });
            info!(epoch, mean_nll, "Epoch finished.");

            if self.policy.observe(epoch, mean_nll) == ConvergenceDecision::Converged {
                info!(epoch, "Convergence policy reported a plateau.");
                self.phase = TrainerPhase::Converged;
                break 'epochs;
            }
        }

        if self.phase == TrainerPhase::Training {
            // Epoch budget exhausted without convergence.
            self.phase = TrainerPhase::Stopped;
        }
        Ok(FitReport {
            phase: self.phase,
            epochs_completed: history.len(),
            history,
            final_learning_rate: self.optimizer.learning_rate(),
        })
    }

    /// One optimization step. Returns the batch's summed loss, or `None`
    /// when a non-finite loss was absorbed by an instability retry. Either
    /// way the parameters are untouched unless the update was applied.
    fn run_step(
        &mut self,
        dataset: &Dataset,
        chunk: &[usize],
        epoch: usize,
        step: usize,
    ) -> Result<Option<f64>, EngineError> {
        let graphs: Vec<&MolecularGraph> = chunk.iter().map(|&i| dataset.get(i).0).collect();
        let targets: Vec<_> = chunk.iter().map(|&i| *dataset.get(i).1).collect();

        let batch = Batcher::combine(&graphs)?;
        let forward = self.model.forward(&batch)?;
        let (losses, d_outputs) = self.model.nll(&forward, &targets)?;

        let batch_loss_sum: f64 = losses.iter().sum();
        let mean_loss = batch_loss_sum / losses.len() as f64;
        if !mean_loss.is_finite() {
            if self.retries_left > 0 {
                self.retries_left -= 1;
                let factor = self.config.optimization.backoff_factor;
                self.optimizer.scale_learning_rate(factor);
                warn!(
                    epoch,
                    step,
                    loss = mean_loss,
                    learning_rate = self.optimizer.learning_rate(),
                    "Non-finite loss absorbed; learning rate reduced."
                );
                return Ok(None);
            }
            self.phase = TrainerPhase::Failed;
            return Err(EngineError::NumericalInstability {
                epoch,
                step,
                loss: mean_loss,
            });
        }

        // Mean reduction over the batch.
        let d_outputs = d_outputs / losses.len() as f64;
        let grads = self.model.backward(&batch, &forward, &d_outputs);
        self.optimizer.step(self.model.tensors_mut(), &grads.tensors());
        Ok(Some(batch_loss_sum))
    }

    fn check_dataset(&self, dataset: &Dataset) -> Result<(), EngineError> {
        let hyper = self.model.hyper();
        if dataset.atom_feature_dim() != hyper.atom_features {
            return Err(DimensionMismatchError {
                context: "atom features vs model",
                expected: hyper.atom_features,
                found: dataset.atom_feature_dim(),
            }
            .into());
        }
        if dataset.bond_feature_dim() > 0 && dataset.bond_feature_dim() != hyper.bond_features {
            return Err(DimensionMismatchError {
                context: "bond features vs model",
                expected: hyper.bond_features,
                found: dataset.bond_feature_dim(),
            }
            .into());
        }
        for (_, target) in dataset.iter() {
            if !target.is_compatible_with(&hyper.family) {
                return Err(LogProbError::FamilyMismatch {
                    family: hyper.family.name(),
                    target: target.kind_name(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn interrupted(&self, stop: &StopSignal, started: Instant) -> bool {
        if stop.is_requested() {
            return true;
        }
        match self.config.optimization.max_wall_clock {
            Some(budget) => started.elapsed() >= budget,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::Target;
    use crate::core::graph::atom::Atom;
    use crate::core::graph::bond::{Bond, BondOrder};
    use crate::core::net::message_passing::Aggregation;
    use crate::core::net::readout::ReadoutKind;
    use crate::core::probability::distribution::DistributionFamily;
    use crate::engine::config::{OptimizerKind, TrainConfigBuilder};
    use nalgebra::DVector;
    use std::time::Duration;

    fn molecule(first: f64, second: f64) -> MolecularGraph {
        let atoms = vec![
            Atom::new(DVector::from_vec(vec![first, second])),
            Atom::new(DVector::from_vec(vec![second, first])),
            Atom::new(DVector::from_vec(vec![first, first])),
        ];
        let bonds = vec![
            Bond::with_order(0, 1, BondOrder::Single),
            Bond::with_order(1, 2, BondOrder::Double),
        ];
        MolecularGraph::build(atoms, bonds).unwrap()
    }

    fn separable_dataset() -> Dataset {
        // Two clearly distinguishable molecule populations with opposite
        // targets.
        let mut entries = Vec::new();
        for i in 0..4 {
            let jitter = 0.05 * i as f64;
            entries.push((molecule(1.0 + jitter, 0.0), Target::Scalar(1.0)));
            entries.push((molecule(0.0, 1.0 + jitter), Target::Scalar(-1.0)));
        }
        Dataset::new(entries).unwrap()
    }

    fn base_config() -> TrainConfigBuilder {
        TrainConfigBuilder::new()
            .atom_features(2)
            .bond_features(4)
            .hidden_dim(8)
            .layer_count(2)
            .aggregation(Aggregation::Sum)
            .readout(ReadoutKind::Mean)
            .family(DistributionFamily::Gaussian)
            .epochs(30)
            .batch_size(4)
            .learning_rate(5e-3)
            .optimizer(OptimizerKind::adam())
            .convergence_patience(30)
            .seed(42)
    }

    #[test]
    fn training_reduces_mean_nll_on_separable_data() {
        let dataset = separable_dataset();
        let config = base_config().build().unwrap();
        let mut trainer = Trainer::new(&config).unwrap();
        let report = trainer
            .fit(&dataset, &ProgressReporter::new(), &StopSignal::new())
            .unwrap();

        assert!(report.epochs_completed >= 10);
        let first = report.history.first().unwrap().mean_nll;
        let last = report.history.last().unwrap().mean_nll;
        assert!(
            last < first,
            "expected loss to drop, got {first} -> {last}"
        );
    }

    #[test]
    fn instability_fails_the_run_and_leaves_parameters_untouched() {
        // Absurd feature magnitudes overflow the Gaussian quadratic term.
        let poisoned = Dataset::new(vec![(molecule(1e200, 0.0), Target::Scalar(0.0))]).unwrap();
        let config = base_config().epochs(3).batch_size(1).build().unwrap();
        let mut trainer = Trainer::new(&config).unwrap();

        let before: Vec<_> = trainer
            .model()
            .named_tensors()
            .into_iter()
            .map(|(name, tensor)| (name, tensor.clone()))
            .collect();

        let result = trainer.fit(&poisoned, &ProgressReporter::new(), &StopSignal::new());
        assert!(matches!(
            result,
            Err(EngineError::NumericalInstability {
                epoch: 0,
                step: 0,
                ..
            })
        ));
        assert_eq!(trainer.phase(), TrainerPhase::Failed);

        for ((name, old), (_, new)) in before.iter().zip(trainer.model().named_tensors()) {
            assert_eq!(old, new, "tensor '{name}' changed during a failed step");
        }
    }

    #[test]
    fn instability_retries_shrink_the_learning_rate_and_continue() {
        let mut entries = vec![(molecule(1e200, 0.0), Target::Scalar(0.0))];
        for _ in 0..3 {
            entries.push((molecule(1.0, 0.0), Target::Scalar(0.5)));
        }
        let dataset = Dataset::new(entries).unwrap();
        let config = base_config()
            .epochs(2)
            .batch_size(1)
            .instability_retries(2)
            .backoff_factor(0.5)
            .convergence_patience(10)
            .build()
            .unwrap();
        let mut trainer = Trainer::new(&config).unwrap();
        let report = trainer
            .fit(&dataset, &ProgressReporter::new(), &StopSignal::new())
            .unwrap();

        // One poisoned step per epoch, two epochs, two retries consumed.
        assert_eq!(report.epochs_completed, 2);
        assert!((report.final_learning_rate - 5e-3 * 0.25).abs() < 1e-12);
    }

    #[test]
    fn requested_stop_ends_the_run_before_any_epoch() {
        let dataset = separable_dataset();
        let config = base_config().build().unwrap();
        let mut trainer = Trainer::new(&config).unwrap();
        let stop = StopSignal::new();
        stop.request_stop();

        let report = trainer
            .fit(&dataset, &ProgressReporter::new(), &stop)
            .unwrap();
        assert_eq!(report.phase, TrainerPhase::Stopped);
        assert_eq!(report.epochs_completed, 0);
    }

    #[test]
    fn zero_wall_clock_budget_stops_immediately() {
        let dataset = separable_dataset();
        let config = base_config()
            .max_wall_clock(Duration::ZERO)
            .build()
            .unwrap();
        let mut trainer = Trainer::new(&config).unwrap();
        let report = trainer
            .fit(&dataset, &ProgressReporter::new(), &StopSignal::new())
            .unwrap();
        assert_eq!(report.phase, TrainerPhase::Stopped);
    }

    #[test]
    fn convergence_policy_can_end_the_run_early() {
        let dataset = separable_dataset();
        let config = base_config()
            .epochs(50)
            .convergence_patience(1)
            .min_delta(1e9)
            .build()
            .unwrap();
        let mut trainer = Trainer::new(&config).unwrap();
        let report = trainer
            .fit(&dataset, &ProgressReporter::new(), &StopSignal::new())
            .unwrap();
        assert_eq!(report.phase, TrainerPhase::Converged);
        assert!(report.epochs_completed < 50);
    }

    #[test]
    fn fit_rejects_targets_from_another_family() {
        let dataset = Dataset::new(vec![(molecule(1.0, 0.0), Target::Class(0))]).unwrap();
        let config = base_config().build().unwrap();
        let mut trainer = Trainer::new(&config).unwrap();
        let result = trainer.fit(&dataset, &ProgressReporter::new(), &StopSignal::new());
        assert!(matches!(result, Err(EngineError::Target { .. })));
        assert_eq!(trainer.phase(), TrainerPhase::Initialized);
    }

    #[test]
    fn fit_rejects_dataset_with_foreign_dimensions() {
        let wide = MolecularGraph::build(
            vec![Atom::new(DVector::from_element(7, 1.0))],
            vec![],
        )
        .unwrap();
        let dataset = Dataset::new(vec![(wide, Target::Scalar(0.0))]).unwrap();
        let config = base_config().build().unwrap();
        let mut trainer = Trainer::new(&config).unwrap();
        let result = trainer.fit(&dataset, &ProgressReporter::new(), &StopSignal::new());
        assert!(matches!(result, Err(EngineError::DimensionMismatch { .. })));
    }
}
