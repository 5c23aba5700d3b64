use crate::core::model::ModelHyperParams;
use crate::core::net::message_passing::Aggregation;
use crate::core::net::readout::ReadoutKind;
use crate::core::probability::distribution::DistributionFamily;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },
}

/// Parameter-update rule applied by the trainer, chosen per run rather than
/// hardcoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd { momentum: f64 },
    Adam { beta1: f64, beta2: f64, epsilon: f64 },
}

impl OptimizerKind {
    /// Plain gradient descent without momentum.
    pub fn sgd() -> Self {
        Self::Sgd { momentum: 0.0 }
    }

    /// Adam with its customary defaults.
    pub fn adam() -> Self {
        Self::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub seed: u64,
    /// Number of times a non-finite step loss may be absorbed by shrinking
    /// the learning rate before the run fails. Zero means fail fast.
    pub instability_retries: usize,
    /// Learning-rate multiplier applied on each absorbed instability.
    pub backoff_factor: f64,
    /// Wall-clock budget checked between steps; `None` disables it.
    pub max_wall_clock: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceConfig {
    /// Epochs without sufficient improvement before training converges.
    pub patience: usize,
    /// Minimum epoch-loss improvement that resets the patience counter.
    pub min_delta: f64,
}

/// Complete description of one training run: the model to build and how to
/// optimize it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub model: ModelHyperParams,
    pub optimization: OptimizationConfig,
    pub convergence: ConvergenceConfig,
}

/// Builder requiring every scientifically meaningful choice to be explicit.
/// Aggregation, readout, and output family have no defaults on purpose:
/// they change what the model computes, so the caller must pick them.
pub struct TrainConfigBuilder {
    atom_features: Option<usize>,
    bond_features: Option<usize>,
    hidden_dim: Option<usize>,
    layer_count: Option<usize>,
    aggregation: Option<Aggregation>,
    readout: Option<ReadoutKind>,
    residual: bool,
    family: Option<DistributionFamily>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    learning_rate: Option<f64>,
    optimizer: OptimizerKind,
    seed: u64,
    instability_retries: usize,
    backoff_factor: f64,
    max_wall_clock: Option<Duration>,
    convergence_patience: Option<usize>,
    min_delta: f64,
}

impl Default for TrainConfigBuilder {
    fn default() -> Self {
        Self {
            atom_features: None,
            bond_features: None,
            hidden_dim: None,
            layer_count: None,
            aggregation: None,
            readout: None,
            residual: false,
            family: None,
            epochs: None,
            batch_size: None,
            learning_rate: None,
            optimizer: OptimizerKind::sgd(),
            seed: 0,
            instability_retries: 0,
            backoff_factor: 0.5,
            max_wall_clock: None,
            convergence_patience: None,
            min_delta: 1e-4,
        }
    }
}

impl TrainConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atom_features(mut self, n: usize) -> Self {
        self.atom_features = Some(n);
        self
    }
    pub fn bond_features(mut self, n: usize) -> Self {
        self.bond_features = Some(n);
        self
    }
    pub fn hidden_dim(mut self, n: usize) -> Self {
        self.hidden_dim = Some(n);
        self
    }
    pub fn layer_count(mut self, n: usize) -> Self {
        self.layer_count = Some(n);
        self
    }
    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }
    pub fn readout(mut self, readout: ReadoutKind) -> Self {
        self.readout = Some(readout);
        self
    }
    pub fn residual(mut self, residual: bool) -> Self {
        self.residual = residual;
        self
    }
    pub fn family(mut self, family: DistributionFamily) -> Self {
        self.family = Some(family);
        self
    }
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = Some(epochs);
        self
    }
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = Some(learning_rate);
        self
    }
    pub fn optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
    pub fn instability_retries(mut self, retries: usize) -> Self {
        self.instability_retries = retries;
        self
    }
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }
    pub fn max_wall_clock(mut self, budget: Duration) -> Self {
        self.max_wall_clock = Some(budget);
        self
    }
    pub fn convergence_patience(mut self, patience: usize) -> Self {
        self.convergence_patience = Some(patience);
        self
    }
    pub fn min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    pub fn build(self) -> Result<TrainConfig, ConfigError> {
        let model = ModelHyperParams {
            atom_features: require(self.atom_features, "atom_features")?,
            bond_features: self
                .bond_features
                .ok_or(ConfigError::MissingParameter("bond_features"))?,
            hidden_dim: require(self.hidden_dim, "hidden_dim")?,
            layer_count: require(self.layer_count, "layer_count")?,
            aggregation: self
                .aggregation
                .ok_or(ConfigError::MissingParameter("aggregation"))?,
            readout: self
                .readout
                .ok_or(ConfigError::MissingParameter("readout"))?,
            residual: self.residual,
            family: self
                .family
                .ok_or(ConfigError::MissingParameter("family"))?,
        };
        let optimization = OptimizationConfig {
            epochs: require(self.epochs, "epochs")?,
            batch_size: require(self.batch_size, "batch_size")?,
            learning_rate: self
                .learning_rate
                .ok_or(ConfigError::MissingParameter("learning_rate"))?,
            optimizer: self.optimizer,
            seed: self.seed,
            instability_retries: self.instability_retries,
            backoff_factor: self.backoff_factor,
            max_wall_clock: self.max_wall_clock,
        };
        let convergence = ConvergenceConfig {
            patience: require(self.convergence_patience, "convergence_patience")?,
            min_delta: self.min_delta,
        };

        let config = TrainConfig {
            model,
            optimization,
            convergence,
        };
        config.validate()?;
        Ok(config)
    }
}

fn require(value: Option<usize>, name: &'static str) -> Result<usize, ConfigError> {
    let v = value.ok_or(ConfigError::MissingParameter(name))?;
    if v == 0 {
        return Err(ConfigError::InvalidParameter {
            parameter: name,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(v)
}

impl TrainConfig {
    /// Cross-field sanity checks shared by the builder and by callers that
    /// assemble a config directly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.optimization.learning_rate > 0.0 && self.optimization.learning_rate.is_finite())
        {
            return Err(ConfigError::InvalidParameter {
                parameter: "learning_rate",
                reason: format!(
                    "must be positive and finite, got {}",
                    self.optimization.learning_rate
                ),
            });
        }
        if !(self.optimization.backoff_factor > 0.0 && self.optimization.backoff_factor < 1.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "backoff_factor",
                reason: format!(
                    "must lie in (0, 1), got {}",
                    self.optimization.backoff_factor
                ),
            });
        }
        if let DistributionFamily::Categorical { classes } = self.model.family {
            if classes < 2 {
                return Err(ConfigError::InvalidParameter {
                    parameter: "family",
                    reason: format!("a categorical needs at least 2 classes, got {classes}"),
                });
            }
        }
        if self.convergence.patience == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "convergence_patience",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
