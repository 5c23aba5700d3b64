use super::ops::sigmoid;
use crate::core::graph::batch::BatchedGraph;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Molecule {molecule_index} has no atoms to pool")]
pub struct EmptyGraphError {
    pub molecule_index: usize,
}

/// Pooling strategy used to reduce per-atom states to one vector per
/// molecule. `Gated` is a learned weighted sum: each atom contributes with a
/// sigmoid gate computed from its own embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadoutKind {
    Sum,
    Mean,
    Gated,
}

#[derive(Debug, Error)]
#[error("Invalid readout string")]
pub struct ParseReadoutError;

impl FromStr for ReadoutKind {
    type Err = ParseReadoutError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "mean" | "avg" | "average" => Ok(Self::Mean),
            "gated" | "gate" => Ok(Self::Gated),
            _ => Err(ParseReadoutError),
        }
    }
}

impl fmt::Display for ReadoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Sum => "sum",
                Self::Mean => "mean",
                Self::Gated => "gated",
            }
        )
    }
}

/// Gate parameters for [`ReadoutKind::Gated`]: a scoring vector `a`
/// (`hidden x 1`) and scalar offset `c` (`1 x 1`). Stored as matrices so
/// they travel through the same optimizer/checkpoint plumbing as every
/// other tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct GateParams {
    pub a: DMatrix<f64>,
    pub c: DMatrix<f64>,
}

impl GateParams {
    pub fn init<R: Rng>(hidden: usize, rng: &mut R) -> Self {
        let std_dev = (1.0 / hidden as f64).sqrt();
        let normal = Normal::new(0.0, std_dev).expect("finite standard deviation");
        Self {
            a: DMatrix::from_fn(hidden, 1, |_, _| normal.sample(rng)),
            c: DMatrix::zeros(1, 1),
        }
    }

    pub fn zeros(hidden: usize) -> Self {
        Self {
            a: DMatrix::zeros(hidden, 1),
            c: DMatrix::zeros(1, 1),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.a.nrows())
    }
}

/// Permutation-invariant pooling over batch segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Readout {
    pub kind: ReadoutKind,
    /// Present iff `kind == Gated`.
    pub gate: Option<GateParams>,
}

/// Forward-pass byproducts needed by the backward pass: the pre-sigmoid
/// gate scores per atom (gated readout only).
#[derive(Debug, Clone, Default)]
pub struct ReadoutCache {
    pub gate_pre: Option<DVector<f64>>,
}

impl Readout {
    pub fn init<R: Rng>(kind: ReadoutKind, hidden: usize, rng: &mut R) -> Self {
        let gate = match kind {
            ReadoutKind::Gated => Some(GateParams::init(hidden, rng)),
            _ => None,
        };
        Self { kind, gate }
    }

    pub fn zeros(kind: ReadoutKind, hidden: usize) -> Self {
        let gate = match kind {
            ReadoutKind::Gated => Some(GateParams::zeros(hidden)),
            _ => None,
        };
        Self { kind, gate }
    }

    /// Pools node embeddings into one row per molecule, respecting batch
    /// boundaries so no pooled vector mixes atoms of different molecules.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyGraphError`] if a boundary segment is empty. Graph
    /// construction already rejects zero-atom molecules, so this is a
    /// defensive check against internal inconsistencies.
    pub fn forward(
        &self,
        h: &DMatrix<f64>,
        batch: &BatchedGraph,
    ) -> Result<(DMatrix<f64>, ReadoutCache), EmptyGraphError> {
        let hidden = h.ncols();
        let num_molecules = batch.num_molecules();
        let mut pooled = DMatrix::zeros(num_molecules, hidden);

        let gate_pre = match self.kind {
            ReadoutKind::Gated => {
                let gate = self.gate.as_ref().expect("gated readout carries gate");
                let mut pre = DVector::zeros(h.nrows());
                for i in 0..h.nrows() {
                    let mut s = gate.c[(0, 0)];
                    for k in 0..hidden {
                        s += h[(i, k)] * gate.a[(k, 0)];
                    }
                    pre[i] = s;
                }
                Some(pre)
            }
            _ => None,
        };

        for m in 0..num_molecules {
            let range = batch.molecule_range(m);
            if range.is_empty() {
                return Err(EmptyGraphError { molecule_index: m });
            }
            let count = range.len() as f64;
            for i in range {
                let weight = match self.kind {
                    ReadoutKind::Sum => 1.0,
                    ReadoutKind::Mean => 1.0 / count,
                    ReadoutKind::Gated => {
                        sigmoid(gate_pre.as_ref().expect("gate scores computed")[i])
                    }
                };
                for k in 0..hidden {
                    pooled[(m, k)] += weight * h[(i, k)];
                }
            }
        }

        Ok((pooled, ReadoutCache { gate_pre }))
    }

    /// Backpropagates the pooled-embedding gradient to the node embeddings,
    /// accumulating gate gradients into `gate_grads` for the gated variant.
    pub fn backward(
        &self,
        h: &DMatrix<f64>,
        cache: &ReadoutCache,
        batch: &BatchedGraph,
        d_pooled: &DMatrix<f64>,
        gate_grads: Option<&mut GateParams>,
    ) -> DMatrix<f64> {
        let hidden = h.ncols();
        let mut d_h = DMatrix::zeros(h.nrows(), hidden);

        match self.kind {
            ReadoutKind::Sum | ReadoutKind::Mean => {
                for m in 0..batch.num_molecules() {
                    let range = batch.molecule_range(m);
                    let weight = match self.kind {
                        ReadoutKind::Sum => 1.0,
                        _ => 1.0 / range.len() as f64,
                    };
                    for i in range {
                        for k in 0..hidden {
                            d_h[(i, k)] = weight * d_pooled[(m, k)];
                        }
                    }
                }
            }
            ReadoutKind::Gated => {
                let gate = self.gate.as_ref().expect("gated readout carries gate");
                let pre = cache.gate_pre.as_ref().expect("gate scores cached");
                let grads = gate_grads.expect("gate gradient container provided");
                for m in 0..batch.num_molecules() {
                    let range = batch.molecule_range(m);
                    for i in range {
                        let w = sigmoid(pre[i]);
                        let dw = w * (1.0 - w);
                        // dg . h_i drives both the gate score and vector grads.
                        let mut dot = 0.0;
                        for k in 0..hidden {
                            dot += d_pooled[(m, k)] * h[(i, k)];
                        }
                        let d_score = dw * dot;
                        for k in 0..hidden {
                            d_h[(i, k)] = w * d_pooled[(m, k)] + d_score * gate.a[(k, 0)];
                            grads.a[(k, 0)] += d_score * h[(i, k)];
                        }
                        grads.c[(0, 0)] += d_score;
                    }
                }
            }
        }
        d_h
    }
}
