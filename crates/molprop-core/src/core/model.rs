use super::checkpoint::{self, CheckpointError};
use super::data::Target;
use super::graph::batch::{BatchedGraph, DimensionMismatchError};
use super::net::linear::LinearParams;
use super::net::message_passing::{Aggregation, Propagator, PropagatorCache, PropagatorGrads};
use super::net::readout::{EmptyGraphError, GateParams, Readout, ReadoutCache, ReadoutKind};
use super::probability::distribution::{Distribution, DistributionFamily, LogProbError};
use super::probability::head::ProbabilisticHead;
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything needed to reconstruct a model's tensor shapes without
/// external input. Stored verbatim in checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelHyperParams {
    pub atom_features: usize,
    pub bond_features: usize,
    pub hidden_dim: usize,
    pub layer_count: usize,
    pub aggregation: Aggregation,
    pub readout: ReadoutKind,
    pub residual: bool,
    pub family: DistributionFamily,
}

/// Gradient arena matching [`GraphNetModel`]'s learned tensors, accumulated
/// by one backward pass and consumed by the optimizer.
#[derive(Debug, Clone)]
pub struct ModelGradients {
    pub propagator: PropagatorGrads,
    pub gate: Option<GateParams>,
    pub head: LinearParams,
}

impl ModelGradients {
    /// Gradient tensors in the model's canonical order.
    pub fn tensors(&self) -> Vec<&DMatrix<f64>> {
        let mut out = vec![&self.propagator.embed.w, &self.propagator.embed.b];
        for layer in &self.propagator.layers {
            out.push(&layer.w_msg);
            out.push(&layer.b_msg);
            out.push(&layer.w_self);
            out.push(&layer.w_agg);
            out.push(&layer.b_upd);
        }
        if let Some(gate) = &self.gate {
            out.push(&gate.a);
            out.push(&gate.c);
        }
        out.push(&self.head.w);
        out.push(&self.head.b);
        out
    }
}

/// Intermediate state of one vectorized forward pass, retained for the
/// backward pass and for turning raw head outputs into distributions.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub propagation: PropagatorCache,
    pub pooled: DMatrix<f64>,
    pub readout: ReadoutCache,
    pub outputs: DMatrix<f64>,
}

/// The complete learned model: propagation stack, readout, and
/// probabilistic head, owning every learned tensor.
///
/// The model is the single owner of its parameters. Forward passes borrow
/// them immutably; only the trainer's update step mutates them, through
/// [`GraphNetModel::tensors_mut`]. There is no global model state anywhere
/// in the crate — callers pass models explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNetModel {
    hyper: ModelHyperParams,
    propagator: Propagator,
    readout: Readout,
    head: ProbabilisticHead,
}

impl GraphNetModel {
    /// Initializes a model with Glorot-normal weights drawn from `rng`.
    pub fn new<R: Rng>(hyper: ModelHyperParams, rng: &mut R) -> Self {
        Self {
            propagator: Propagator::init(
                hyper.atom_features,
                hyper.bond_features,
                hyper.hidden_dim,
                hyper.layer_count,
                hyper.aggregation,
                hyper.residual,
                rng,
            ),
            readout: Readout::init(hyper.readout, hyper.hidden_dim, rng),
            head: ProbabilisticHead::init(hyper.hidden_dim, hyper.family, rng),
            hyper,
        }
    }

    /// A model of the right shapes with all tensors zeroed, used as the
    /// target of checkpoint loading.
    pub fn zeros(hyper: ModelHyperParams) -> Self {
        Self {
            propagator: Propagator::zeros(
                hyper.atom_features,
                hyper.bond_features,
                hyper.hidden_dim,
                hyper.layer_count,
                hyper.aggregation,
                hyper.residual,
            ),
            readout: Readout::zeros(hyper.readout, hyper.hidden_dim),
            head: ProbabilisticHead::zeros(hyper.hidden_dim, hyper.family),
            hyper,
        }
    }

    pub fn hyper(&self) -> &ModelHyperParams {
        &self.hyper
    }

    pub fn family(&self) -> DistributionFamily {
        self.hyper.family
    }

    /// Checks a batch's feature widths against the model's expectations.
    /// Edge-free batches are compatible with any bond width.
    pub fn check_batch(&self, batch: &BatchedGraph) -> Result<(), DimensionMismatchError> {
        if batch.atom_feature_dim() != self.hyper.atom_features {
            return Err(DimensionMismatchError {
                context: "atom features vs model",
                expected: self.hyper.atom_features,
                found: batch.atom_feature_dim(),
            });
        }
        if batch.num_edges() > 0 && batch.bond_feature_dim() != self.hyper.bond_features {
            return Err(DimensionMismatchError {
                context: "bond features vs model",
                expected: self.hyper.bond_features,
                found: batch.bond_feature_dim(),
            });
        }
        Ok(())
    }

    /// Runs the full vectorized forward pass over a batch.
    pub fn forward(&self, batch: &BatchedGraph) -> Result<ForwardPass, EmptyGraphError> {
        let propagation = self.propagator.forward(batch);
        let (pooled, readout) = self.readout.forward(&propagation.node_embeddings, batch)?;
        let outputs = self.head.forward(&pooled);
        Ok(ForwardPass {
            propagation,
            pooled,
            readout,
            outputs,
        })
    }

    /// Turns a forward pass's raw outputs into one distribution per
    /// molecule, in batch order.
    pub fn distributions(&self, forward: &ForwardPass) -> Vec<Distribution> {
        self.head.distributions(&forward.outputs)
    }

    /// Per-molecule negative log-likelihoods of `targets` plus the gradient
    /// of their sum w.r.t. the raw head outputs.
    pub fn nll(
        &self,
        forward: &ForwardPass,
        targets: &[Target],
    ) -> Result<(Vec<f64>, DMatrix<f64>), LogProbError> {
        self.head.nll(&forward.outputs, targets)
    }

    /// Backpropagates an output gradient through head, readout, and
    /// propagator, returning a fresh gradient arena.
    pub fn backward(
        &self,
        batch: &BatchedGraph,
        forward: &ForwardPass,
        d_outputs: &DMatrix<f64>,
    ) -> ModelGradients {
        let mut grads = ModelGradients {
            propagator: self.propagator.zero_grads(),
            gate: self.readout.gate.as_ref().map(GateParams::zeros_like),
            head: self.head.linear.zeros_like(),
        };
        let d_pooled = self.head.backward(&forward.pooled, d_outputs, &mut grads.head);
        let d_nodes = self.readout.backward(
            &forward.propagation.node_embeddings,
            &forward.readout,
            batch,
            &d_pooled,
            grads.gate.as_mut(),
        );
        self.propagator
            .backward(batch, &forward.propagation, &d_nodes, &mut grads.propagator);
        grads
    }

    /// Canonical names of every learned tensor, in the same order as
    /// [`GraphNetModel::tensors_mut`] and [`ModelGradients::tensors`].
    pub fn tensor_names(&self) -> Vec<String> {
        let mut names = vec!["embed.w".to_string(), "embed.b".to_string()];
        for l in 0..self.propagator.layers.len() {
            for part in ["w_msg", "b_msg", "w_self", "w_agg", "b_upd"] {
                names.push(format!("layers.{l}.{part}"));
            }
        }
        if self.readout.gate.is_some() {
            names.push("gate.a".to_string());
            names.push("gate.c".to_string());
        }
        names.push("head.w".to_string());
        names.push("head.b".to_string());
        names
    }

    /// Named read-only views of every learned tensor, canonical order.
    pub fn named_tensors(&self) -> Vec<(String, &DMatrix<f64>)> {
        self.tensor_names()
            .into_iter()
            .zip(self.tensor_views())
            .collect()
    }

    fn tensor_views(&self) -> Vec<&DMatrix<f64>> {
        let mut out = vec![&self.propagator.embed.w, &self.propagator.embed.b];
        for layer in &self.propagator.layers {
            out.push(&layer.w_msg);
            out.push(&layer.b_msg);
            out.push(&layer.w_self);
            out.push(&layer.w_agg);
            out.push(&layer.b_upd);
        }
        if let Some(gate) = &self.readout.gate {
            out.push(&gate.a);
            out.push(&gate.c);
        }
        out.push(&self.head.linear.w);
        out.push(&self.head.linear.b);
        out
    }

    /// Mutable views of every learned tensor, canonical order. This is the
    /// only mutation path into a constructed model; it exists for the
    /// optimizer's update step and checkpoint loading.
    pub fn tensors_mut(&mut self) -> Vec<&mut DMatrix<f64>> {
        let mut out: Vec<&mut DMatrix<f64>> =
            vec![&mut self.propagator.embed.w, &mut self.propagator.embed.b];
        for layer in &mut self.propagator.layers {
            out.push(&mut layer.w_msg);
            out.push(&mut layer.b_msg);
            out.push(&mut layer.w_self);
            out.push(&mut layer.w_agg);
            out.push(&mut layer.b_upd);
        }
        if let Some(gate) = &mut self.readout.gate {
            out.push(&mut gate.a);
            out.push(&mut gate.c);
        }
        out.push(&mut self.head.linear.w);
        out.push(&mut self.head.linear.b);
        out
    }

    /// Persists hyperparameters and all tensors to a TOML checkpoint.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        checkpoint::save(self, path)
    }

    /// Reconstructs a model from a checkpoint written by
    /// [`GraphNetModel::save`].
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        checkpoint::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::atom::Atom;
    use crate::core::graph::batch::Batcher;
    use crate::core::graph::bond::{Bond, BondOrder};
    use crate::core::graph::molecule::MolecularGraph;
    use approx::assert_relative_eq;
    use nalgebra::DVector;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn hyper(readout: ReadoutKind, family: DistributionFamily) -> ModelHyperParams {
        ModelHyperParams {
            atom_features: 2,
            bond_features: 4,
            hidden_dim: 6,
            layer_count: 2,
            aggregation: Aggregation::Sum,
            readout,
            residual: true,
            family,
        }
    }

    fn ring(tags: &[f64]) -> MolecularGraph {
        let n = tags.len();
        let atoms = tags
            .iter()
            .map(|&t| Atom::new(DVector::from_vec(vec![t, 1.0 - t])))
            .collect();
        let bonds = (0..n)
            .map(|i| Bond::with_order(i, (i + 1) % n, BondOrder::Aromatic))
            .collect();
        MolecularGraph::build(atoms, bonds).unwrap()
    }

    #[test]
    fn forward_produces_one_output_row_per_molecule() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = GraphNetModel::new(
            hyper(ReadoutKind::Gated, DistributionFamily::Gaussian),
            &mut rng,
        );
        let g1 = ring(&[0.1, 0.2, 0.3]);
        let g2 = ring(&[0.4, 0.5, 0.6, 0.7]);
        let batch = Batcher::combine(&[&g1, &g2]).unwrap();

        let forward = model.forward(&batch).unwrap();
        assert_eq!(forward.pooled.nrows(), 2);
        assert_eq!(forward.pooled.ncols(), 6);
        assert_eq!(forward.outputs.nrows(), 2);
        assert_eq!(forward.outputs.ncols(), 2);
        assert_eq!(model.distributions(&forward).len(), 2);
    }

    #[test]
    fn predictions_are_invariant_under_atom_relabeling() {
        let mut rng = StdRng::seed_from_u64(13);
        let model = GraphNetModel::new(
            hyper(ReadoutKind::Gated, DistributionFamily::Gaussian),
            &mut rng,
        );

        // A path A-B-C and the same molecule listed as C-B-A.
        let original = MolecularGraph::build(
            vec![
                Atom::new(DVector::from_vec(vec![0.1, 0.9])),
                Atom::new(DVector::from_vec(vec![0.5, 0.5])),
                Atom::new(DVector::from_vec(vec![0.9, 0.1])),
            ],
            vec![
                Bond::with_order(0, 1, BondOrder::Single),
                Bond::with_order(1, 2, BondOrder::Double),
            ],
        )
        .unwrap();
        let relabeled = MolecularGraph::build(
            vec![
                Atom::new(DVector::from_vec(vec![0.9, 0.1])),
                Atom::new(DVector::from_vec(vec![0.5, 0.5])),
                Atom::new(DVector::from_vec(vec![0.1, 0.9])),
            ],
            vec![
                Bond::with_order(2, 1, BondOrder::Single),
                Bond::with_order(1, 0, BondOrder::Double),
            ],
        )
        .unwrap();

        let fwd_a = model
            .forward(&Batcher::combine(&[&original]).unwrap())
            .unwrap();
        let fwd_b = model
            .forward(&Batcher::combine(&[&relabeled]).unwrap())
            .unwrap();
        let (a, b) = (
            model.distributions(&fwd_a).remove(0),
            model.distributions(&fwd_b).remove(0),
        );
        match (a, b) {
            (
                Distribution::Gaussian {
                    mean: m1,
                    variance: v1,
                },
                Distribution::Gaussian {
                    mean: m2,
                    variance: v2,
                },
            ) => {
                assert_relative_eq!(m1, m2, epsilon = 1e-9);
                assert_relative_eq!(v1, v2, epsilon = 1e-9);
            }
            other => panic!("unexpected distributions {other:?}"),
        }
    }

    #[test]
    fn tensor_names_match_tensor_views_in_count_and_order() {
        let mut rng = StdRng::seed_from_u64(2);
        let gated = GraphNetModel::new(
            hyper(ReadoutKind::Gated, DistributionFamily::Bernoulli),
            &mut rng,
        );
        let named = gated.named_tensors();
        // embed (2) + 2 layers x 5 + gate (2) + head (2).
        assert_eq!(named.len(), 16);
        assert_eq!(named[0].0, "embed.w");
        assert_eq!(named[2].0, "layers.0.w_msg");
        assert_eq!(named[12].0, "gate.a");
        assert_eq!(named[14].0, "head.w");

        let sum_pooled = GraphNetModel::new(
            hyper(ReadoutKind::Sum, DistributionFamily::Bernoulli),
            &mut rng,
        );
        assert_eq!(sum_pooled.named_tensors().len(), 14);
    }

    #[test]
    fn check_batch_rejects_foreign_feature_widths() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = GraphNetModel::new(
            hyper(ReadoutKind::Mean, DistributionFamily::Gaussian),
            &mut rng,
        );
        let wide = MolecularGraph::build(
            vec![Atom::new(DVector::from_element(5, 1.0))],
            vec![],
        )
        .unwrap();
        let batch = Batcher::combine(&[&wide]).unwrap();
        assert!(matches!(
            model.check_batch(&batch),
            Err(DimensionMismatchError {
                expected: 2,
                found: 5,
                ..
            })
        ));
    }

    #[test]
    fn backward_gradient_matches_finite_differences_through_the_whole_model() {
        let mut rng = StdRng::seed_from_u64(29);
        let model = GraphNetModel::new(
            hyper(ReadoutKind::Gated, DistributionFamily::Gaussian),
            &mut rng,
        );
        let g1 = ring(&[0.2, 0.4, 0.6]);
        let g2 = ring(&[0.3, 0.5]);
        let batch = Batcher::combine(&[&g1, &g2]).unwrap();
        let targets = [Target::Scalar(1.0), Target::Scalar(-0.5)];

        let loss_of = |m: &GraphNetModel| {
            let fwd = m.forward(&batch).unwrap();
            m.nll(&fwd, &targets).unwrap().0.iter().sum::<f64>()
        };

        let forward = model.forward(&batch).unwrap();
        let (_, d_out) = model.nll(&forward, &targets).unwrap();
        let grads = model.backward(&batch, &forward, &d_out);

        let base = loss_of(&model);
        let eps = 1e-6;
        let analytic = grads.tensors();
        for slot in 0..analytic.len() {
            // One representative entry per tensor keeps this fast.
            let mut bumped = model.clone();
            {
                let mut views = bumped.tensors_mut();
                views[slot][(0, 0)] += eps;
            }
            let numeric = (loss_of(&bumped) - base) / eps;
            assert_relative_eq!(analytic[slot][(0, 0)], numeric, epsilon = 1e-6, max_relative = 1e-3);
        }
    }
}
