use super::distribution::{Distribution, DistributionFamily, LogProbError};
use crate::core::data::Target;
use crate::core::net::linear::LinearParams;
use crate::core::net::ops::{sigmoid, softplus};
use nalgebra::DMatrix;
use rand::Rng;

/// Additive floor applied to the softplus-linked variance so the Gaussian
/// scale stays strictly positive and its reciprocal bounded.
pub const VARIANCE_FLOOR: f64 = 1e-6;

/// Maps graph embeddings to the raw parameters of the configured output
/// family and scores targets under the induced distribution.
///
/// Link functions are applied on top of a single affine projection:
/// identity for the Gaussian location, softplus (+ floor) for its scale,
/// sigmoid for the Bernoulli probability, softmax for categorical classes.
/// Domain constraints therefore hold by construction; nothing downstream
/// clamps parameters after the fact.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilisticHead {
    pub family: DistributionFamily,
    pub linear: LinearParams,
}

impl ProbabilisticHead {
    pub fn init<R: Rng>(hidden: usize, family: DistributionFamily, rng: &mut R) -> Self {
        Self {
            family,
            linear: LinearParams::init(hidden, family.parameter_count(), rng),
        }
    }

    pub fn zeros(hidden: usize, family: DistributionFamily) -> Self {
        Self {
            family,
            linear: LinearParams::zeros(hidden, family.parameter_count()),
        }
    }

    /// Raw (pre-link) head outputs, one row per molecule.
    pub fn forward(&self, pooled: &DMatrix<f64>) -> DMatrix<f64> {
        self.linear.forward(pooled)
    }

    /// Applies the family's link functions to raw outputs, yielding one
    /// well-formed [`Distribution`] per molecule.
    pub fn distributions(&self, outputs: &DMatrix<f64>) -> Vec<Distribution> {
        (0..outputs.nrows())
            .map(|m| match self.family {
                DistributionFamily::Gaussian => Distribution::Gaussian {
                    mean: outputs[(m, 0)],
                    variance: softplus(outputs[(m, 1)]) + VARIANCE_FLOOR,
                },
                DistributionFamily::Bernoulli => Distribution::Bernoulli {
                    probability: sigmoid(outputs[(m, 0)]),
                },
                DistributionFamily::Categorical { classes } => {
                    let row = outputs.row(m);
                    let max = row.max();
                    let exps: Vec<f64> = (0..classes).map(|j| (row[j] - max).exp()).collect();
                    let norm: f64 = exps.iter().sum();
                    Distribution::Categorical {
                        probabilities: exps.into_iter().map(|e| e / norm).collect(),
                    }
                }
            })
            .collect()
    }

    /// Per-molecule negative log-likelihoods and their gradients w.r.t. the
    /// raw head outputs.
    ///
    /// Computed in logit space with stable formulations, so the result is
    /// finite for any finite raw outputs — saturation shows up as a large
    /// but finite loss, not `inf`/`NaN`.
    pub fn nll(
        &self,
        outputs: &DMatrix<f64>,
        targets: &[Target],
    ) -> Result<(Vec<f64>, DMatrix<f64>), LogProbError> {
        debug_assert_eq!(outputs.nrows(), targets.len());
        let mut losses = Vec::with_capacity(targets.len());
        let mut d_out = DMatrix::zeros(outputs.nrows(), outputs.ncols());

        for (m, target) in targets.iter().enumerate() {
            match (self.family, target) {
                (DistributionFamily::Gaussian, Target::Scalar(y)) => {
                    let mean = outputs[(m, 0)];
                    let raw_scale = outputs[(m, 1)];
                    let variance = softplus(raw_scale) + VARIANCE_FLOOR;
                    let residual = y - mean;
                    losses.push(
                        0.5 * (2.0 * std::f64::consts::PI * variance).ln()
                            + residual * residual / (2.0 * variance),
                    );
                    d_out[(m, 0)] = -residual / variance;
                    let d_variance = 0.5 / variance
                        - residual * residual / (2.0 * variance * variance);
                    d_out[(m, 1)] = d_variance * sigmoid(raw_scale);
                }
                (DistributionFamily::Bernoulli, Target::Binary(hit)) => {
                    let z = outputs[(m, 0)];
                    let y = f64::from(*hit);
                    losses.push(z.max(0.0) - z * y + (-z.abs()).exp().ln_1p());
                    d_out[(m, 0)] = sigmoid(z) - y;
                }
                (DistributionFamily::Categorical { classes }, Target::Class(class)) => {
                    if *class >= classes {
                        return Err(LogProbError::ClassOutOfRange {
                            class: *class,
                            classes,
                        });
                    }
                    let row = outputs.row(m);
                    let max = row.max();
                    let exps: Vec<f64> = (0..classes).map(|j| (row[j] - max).exp()).collect();
                    let norm: f64 = exps.iter().sum();
                    losses.push(max + norm.ln() - row[*class]);
                    for j in 0..classes {
                        d_out[(m, j)] =
                            exps[j] / norm - if j == *class { 1.0 } else { 0.0 };
                    }
                }
                (family, target) => {
                    return Err(LogProbError::FamilyMismatch {
                        family: family.name(),
                        target: target.kind_name(),
                    });
                }
            }
        }
        Ok((losses, d_out))
    }

    /// Backpropagates the raw-output gradient through the head projection.
    pub fn backward(
        &self,
        pooled: &DMatrix<f64>,
        d_outputs: &DMatrix<f64>,
        grads: &mut LinearParams,
    ) -> DMatrix<f64> {
        self.linear.backward(pooled, d_outputs, grads)
    }
}
