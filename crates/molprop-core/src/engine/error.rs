use thiserror::Error;

use super::config::ConfigError;
use crate::core::checkpoint::CheckpointError;
use crate::core::data::DatasetError;
use crate::core::graph::batch::{BatchError, DimensionMismatchError};
use crate::core::graph::molecule::ValidationError;
use crate::core::net::readout::EmptyGraphError;
use crate::core::probability::distribution::LogProbError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Malformed molecular graph: {source}")]
    Validation {
        #[from]
        source: ValidationError,
    },

    #[error("Batching failed: {source}")]
    Batch {
        #[from]
        source: BatchError,
    },

    #[error("Incompatible feature dimensions: {source}")]
    DimensionMismatch {
        #[from]
        source: DimensionMismatchError,
    },

    #[error("Degenerate graph reached the readout: {source}")]
    EmptyGraph {
        #[from]
        source: EmptyGraphError,
    },

    #[error("Dataset error: {source}")]
    Dataset {
        #[from]
        source: DatasetError,
    },

    #[error("Target incompatible with the configured distribution family: {source}")]
    Target {
        #[from]
        source: LogProbError,
    },

    #[error("Non-finite loss at epoch {epoch}, step {step}: {loss}")]
    NumericalInstability {
        epoch: usize,
        step: usize,
        loss: f64,
    },

    #[error("Checkpoint error: {source}")]
    Checkpoint {
        #[from]
        source: CheckpointError,
    },
}
