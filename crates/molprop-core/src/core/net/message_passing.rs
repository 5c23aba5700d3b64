use super::linear::LinearParams;
use super::ops::{add_row_broadcast, column_sums, relu, relu_backward};
use crate::core::graph::batch::BatchedGraph;
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Permutation-invariant reducer applied to incoming messages.
///
/// Fixed per model configuration, never per call; the choice is part of the
/// model hyperparameters and travels with checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Mean,
}

#[derive(Debug, Error)]
#[error("Invalid aggregation string")]
pub struct ParseAggregationError;

impl FromStr for Aggregation {
    type Err = ParseAggregationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "mean" | "avg" | "average" => Ok(Self::Mean),
            _ => Err(ParseAggregationError),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Sum => "sum",
                Self::Mean => "mean",
            }
        )
    }
}

/// Learned parameters of one message-passing round.
///
/// A round computes, for every directed edge, a message from the source
/// atom's state and the bond features, reduces incoming messages per target
/// atom with the configured [`Aggregation`], and updates each atom's state
/// from its previous state and the aggregate. The struct doubles as its own
/// gradient container (see [`MessagePassingParams::zeros_like`]).
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePassingParams {
    /// Message transform, `(hidden + d_bond) x hidden`.
    pub w_msg: DMatrix<f64>,
    pub b_msg: DMatrix<f64>,
    /// Self-state transform in the update, `hidden x hidden`.
    pub w_self: DMatrix<f64>,
    /// Aggregate transform in the update, `hidden x hidden`.
    pub w_agg: DMatrix<f64>,
    pub b_upd: DMatrix<f64>,
}

/// Intermediate activations cached by a layer's forward pass for backprop.
#[derive(Debug, Clone)]
pub struct LayerCache {
    pub input: DMatrix<f64>,
    pub msg_in: DMatrix<f64>,
    pub msg_pre: DMatrix<f64>,
    pub agg: DMatrix<f64>,
    pub upd_pre: DMatrix<f64>,
}

impl MessagePassingParams {
    pub fn init<R: Rng>(hidden: usize, d_bond: usize, rng: &mut R) -> Self {
        let msg = LinearParams::init(hidden + d_bond, hidden, rng);
        let own = LinearParams::init(hidden, hidden, rng);
        let agg = LinearParams::init(hidden, hidden, rng);
        Self {
            w_msg: msg.w,
            b_msg: msg.b,
            w_self: own.w,
            w_agg: agg.w,
            b_upd: DMatrix::zeros(1, hidden),
        }
    }

    pub fn zeros(hidden: usize, d_bond: usize) -> Self {
        Self {
            w_msg: DMatrix::zeros(hidden + d_bond, hidden),
            b_msg: DMatrix::zeros(1, hidden),
            w_self: DMatrix::zeros(hidden, hidden),
            w_agg: DMatrix::zeros(hidden, hidden),
            b_upd: DMatrix::zeros(1, hidden),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            w_msg: DMatrix::zeros(self.w_msg.nrows(), self.w_msg.ncols()),
            b_msg: DMatrix::zeros(1, self.b_msg.ncols()),
            w_self: DMatrix::zeros(self.w_self.nrows(), self.w_self.ncols()),
            w_agg: DMatrix::zeros(self.w_agg.nrows(), self.w_agg.ncols()),
            b_upd: DMatrix::zeros(1, self.b_upd.ncols()),
        }
    }

    /// One message-passing round over the batch.
    ///
    /// The per-target reduction is a scatter-add (followed by a degree
    /// division for [`Aggregation::Mean`]), so the result is independent of
    /// incidence-list order up to floating-point associativity.
    pub fn forward(
        &self,
        h: &DMatrix<f64>,
        batch: &BatchedGraph,
        aggregation: Aggregation,
        residual: bool,
    ) -> (DMatrix<f64>, LayerCache) {
        let hidden = self.w_self.nrows();
        let d_bond = batch.bond_feature_dim();
        let num_edges = batch.num_edges();

        let mut msg_in = DMatrix::zeros(num_edges, hidden + d_bond);
        for e in 0..num_edges {
            let src = batch.edge_sources()[e];
            for k in 0..hidden {
                msg_in[(e, k)] = h[(src, k)];
            }
            for k in 0..d_bond {
                msg_in[(e, hidden + k)] = batch.edge_features()[(e, k)];
            }
        }

        let mut msg_pre = &msg_in * &self.w_msg;
        add_row_broadcast(&mut msg_pre, &self.b_msg);
        let msg_act = relu(&msg_pre);

        let mut agg = DMatrix::zeros(h.nrows(), hidden);
        for e in 0..num_edges {
            let tgt = batch.edge_targets()[e];
            for k in 0..hidden {
                agg[(tgt, k)] += msg_act[(e, k)];
            }
        }
        if aggregation == Aggregation::Mean {
            for (i, &degree) in batch.in_degrees().iter().enumerate() {
                if degree > 0 {
                    let scale = 1.0 / degree as f64;
                    for k in 0..hidden {
                        agg[(i, k)] *= scale;
                    }
                }
            }
        }

        let mut upd_pre = h * &self.w_self + &agg * &self.w_agg;
        add_row_broadcast(&mut upd_pre, &self.b_upd);
        let activated = relu(&upd_pre);
        let out = if residual { h + &activated } else { activated };

        let cache = LayerCache {
            input: h.clone(),
            msg_in,
            msg_pre,
            agg,
            upd_pre,
        };
        (out, cache)
    }

    /// Backpropagates `d_out` through the round, accumulating parameter
    /// gradients into `grads` and returning the gradient w.r.t. the input
    /// atom states.
    pub fn backward(
        &self,
        cache: &LayerCache,
        batch: &BatchedGraph,
        aggregation: Aggregation,
        residual: bool,
        d_out: &DMatrix<f64>,
        grads: &mut MessagePassingParams,
    ) -> DMatrix<f64> {
        let hidden = self.w_self.nrows();
        let num_edges = batch.num_edges();

        let d_upd_pre = relu_backward(&cache.upd_pre, d_out);
        grads.w_self += cache.input.transpose() * &d_upd_pre;
        grads.w_agg += cache.agg.transpose() * &d_upd_pre;
        grads.b_upd += column_sums(&d_upd_pre);

        let mut d_h = &d_upd_pre * self.w_self.transpose();
        if residual {
            d_h += d_out;
        }
        let d_agg = &d_upd_pre * self.w_agg.transpose();

        let mut d_msg_act = DMatrix::zeros(num_edges, hidden);
        for e in 0..num_edges {
            let tgt = batch.edge_targets()[e];
            let scale = match aggregation {
                Aggregation::Sum => 1.0,
                Aggregation::Mean => 1.0 / batch.in_degrees()[tgt].max(1) as f64,
            };
            for k in 0..hidden {
                d_msg_act[(e, k)] = d_agg[(tgt, k)] * scale;
            }
        }

        let d_msg_pre = relu_backward(&cache.msg_pre, &d_msg_act);
        grads.w_msg += cache.msg_in.transpose() * &d_msg_pre;
        grads.b_msg += column_sums(&d_msg_pre);

        let d_msg_in = &d_msg_pre * self.w_msg.transpose();
        for e in 0..num_edges {
            let src = batch.edge_sources()[e];
            for k in 0..hidden {
                d_h[(src, k)] += d_msg_in[(e, k)];
            }
        }
        d_h
    }
}

/// The full propagation stack: input projection followed by `L` identical
/// message-passing rounds applied as an explicit loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Propagator {
    pub embed: LinearParams,
    pub layers: Vec<MessagePassingParams>,
    pub aggregation: Aggregation,
    pub residual: bool,
}

/// Per-layer caches plus the final node embeddings of one forward pass.
#[derive(Debug, Clone)]
pub struct PropagatorCache {
    pub layers: Vec<LayerCache>,
    pub node_embeddings: DMatrix<f64>,
}

/// Gradient container mirroring [`Propagator`]'s learned tensors.
#[derive(Debug, Clone)]
pub struct PropagatorGrads {
    pub embed: LinearParams,
    pub layers: Vec<MessagePassingParams>,
}

impl Propagator {
    pub fn init<R: Rng>(
        d_atom: usize,
        d_bond: usize,
        hidden: usize,
        layer_count: usize,
        aggregation: Aggregation,
        residual: bool,
        rng: &mut R,
    ) -> Self {
        Self {
            embed: LinearParams::init(d_atom, hidden, rng),
            layers: (0..layer_count)
                .map(|_| MessagePassingParams::init(hidden, d_bond, rng))
                .collect(),
            aggregation,
            residual,
        }
    }

    pub fn zeros(
        d_atom: usize,
        d_bond: usize,
        hidden: usize,
        layer_count: usize,
        aggregation: Aggregation,
        residual: bool,
    ) -> Self {
        Self {
            embed: LinearParams::zeros(d_atom, hidden),
            layers: (0..layer_count)
                .map(|_| MessagePassingParams::zeros(hidden, d_bond))
                .collect(),
            aggregation,
            residual,
        }
    }

    pub fn zero_grads(&self) -> PropagatorGrads {
        PropagatorGrads {
            embed: self.embed.zeros_like(),
            layers: self.layers.iter().map(|l| l.zeros_like()).collect(),
        }
    }

    pub fn hidden_dim(&self) -> usize {
        self.embed.output_dim()
    }

    /// Runs the projection and all rounds, returning the caches needed for
    /// the backward pass.
    pub fn forward(&self, batch: &BatchedGraph) -> PropagatorCache {
        let mut h = self.embed.forward(batch.atom_features());
        let mut caches = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (next, cache) = layer.forward(&h, batch, self.aggregation, self.residual);
            caches.push(cache);
            h = next;
        }
        PropagatorCache {
            layers: caches,
            node_embeddings: h,
        }
    }

    /// Backpropagates the gradient w.r.t. the final node embeddings down the
    /// stack, accumulating into `grads`.
    pub fn backward(
        &self,
        batch: &BatchedGraph,
        cache: &PropagatorCache,
        d_nodes: &DMatrix<f64>,
        grads: &mut PropagatorGrads,
    ) {
        let mut d_h = d_nodes.clone();
        for l in (0..self.layers.len()).rev() {
            d_h = self.layers[l].backward(
                &cache.layers[l],
                batch,
                self.aggregation,
                self.residual,
                &d_h,
                &mut grads.layers[l],
            );
        }
        self.embed
            .backward(batch.atom_features(), &d_h, &mut grads.embed);
    }
}
