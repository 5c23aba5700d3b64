use crate::core::data::Target;
use rand::Rng;
use rand_distr::{Distribution as RandDistribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest probability admitted inside a logarithm. Keeps `log_prob`
/// finite when a link function saturates in floating point.
const LOG_PROB_FLOOR: f64 = 1e-300;

/// The distribution family a model predicts, fixed at construction and
/// stored with checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DistributionFamily {
    Gaussian,
    Bernoulli,
    Categorical { classes: usize },
}

impl DistributionFamily {
    /// Number of raw outputs the probabilistic head emits for this family.
    pub fn parameter_count(&self) -> usize {
        match self {
            Self::Gaussian => 2,
            Self::Bernoulli => 1,
            Self::Categorical { classes } => *classes,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gaussian => "gaussian",
            Self::Bernoulli => "bernoulli",
            Self::Categorical { .. } => "categorical",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogProbError {
    #[error("Target kind '{target}' is incompatible with distribution family '{family}'")]
    FamilyMismatch {
        family: &'static str,
        target: &'static str,
    },

    #[error("Class {class} is out of range for a categorical over {classes} classes")]
    ClassOutOfRange { class: usize, classes: usize },
}

/// A draw from a [`Distribution`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Continuous(f64),
    Binary(bool),
    Class(usize),
}

/// A calibrated prediction: the distribution family plus its parameters.
///
/// Parameters satisfy the family's domain constraints by construction —
/// the head's link functions guarantee `variance > 0` and probabilities in
/// `[0, 1]` summing to one — so holders of a `Distribution` never need to
/// re-validate.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Gaussian { mean: f64, variance: f64 },
    Bernoulli { probability: f64 },
    Categorical { probabilities: Vec<f64> },
}

impl Distribution {
    pub fn family(&self) -> DistributionFamily {
        match self {
            Self::Gaussian { .. } => DistributionFamily::Gaussian,
            Self::Bernoulli { .. } => DistributionFamily::Bernoulli,
            Self::Categorical { probabilities } => DistributionFamily::Categorical {
                classes: probabilities.len(),
            },
        }
    }

    /// Expected value: the Gaussian mean, the Bernoulli success
    /// probability, or the probability-weighted class index.
    pub fn mean(&self) -> f64 {
        match self {
            Self::Gaussian { mean, .. } => *mean,
            Self::Bernoulli { probability } => *probability,
            Self::Categorical { probabilities } => probabilities
                .iter()
                .enumerate()
                .map(|(class, p)| class as f64 * p)
                .sum(),
        }
    }

    /// Log-density (or log-mass) of `target` under this distribution.
    ///
    /// Stays finite for parameters at the edge of the valid domain: saturated
    /// probabilities are floored inside the logarithm rather than producing
    /// `-inf`.
    pub fn log_prob(&self, target: &Target) -> Result<f64, LogProbError> {
        match (self, target) {
            (Self::Gaussian { mean, variance }, Target::Scalar(y)) => {
                let residual = y - mean;
                Ok(-0.5 * (2.0 * std::f64::consts::PI * variance).ln()
                    - residual * residual / (2.0 * variance))
            }
            (Self::Bernoulli { probability }, Target::Binary(hit)) => {
                let p = if *hit { *probability } else { 1.0 - probability };
                Ok(p.max(LOG_PROB_FLOOR).ln())
            }
            (Self::Categorical { probabilities }, Target::Class(class)) => {
                let p = probabilities
                    .get(*class)
                    .ok_or(LogProbError::ClassOutOfRange {
                        class: *class,
                        classes: probabilities.len(),
                    })?;
                Ok(p.max(LOG_PROB_FLOOR).ln())
            }
            (dist, target) => Err(LogProbError::FamilyMismatch {
                family: dist.family().name(),
                target: target.kind_name(),
            }),
        }
    }

    /// Draws one sample using the provided RNG.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Sample {
        match self {
            Self::Gaussian { mean, variance } => {
                let normal = Normal::new(*mean, variance.sqrt())
                    .expect("variance is positive by construction");
                Sample::Continuous(normal.sample(rng))
            }
            Self::Bernoulli { probability } => Sample::Binary(rng.gen_bool(*probability)),
            Self::Categorical { probabilities } => {
                let draw: f64 = rng.r#gen();
                let mut cumulative = 0.0;
                for (class, p) in probabilities.iter().enumerate() {
                    cumulative += p;
                    if draw < cumulative {
                        return Sample::Class(class);
                    }
                }
                Sample::Class(probabilities.len() - 1)
            }
        }
    }
}
