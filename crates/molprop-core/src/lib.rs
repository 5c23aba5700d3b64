//! # MolProp Core Library
//!
//! A probabilistic graph-network library for calibrated molecular property
//! prediction: molecules in, full predictive distributions out.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear separation of concerns,
//! making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models
//!   (`MolecularGraph`, `BatchedGraph`), the vectorized network primitives
//!   (message passing, readout, probabilistic heads), distributions, and
//!   checkpoint I/O.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer orchestrates model
//!   fitting and application: training configuration, the optimizer and its
//!   running state, the trainer state machine, convergence policies, and the
//!   frozen-parameter inference engine.
//!
//! - **[`workflows`]: The Public API.** This is the highest-level, user-facing layer. It ties the
//!   `engine` and `core` together to execute complete procedures — fitting a
//!   model to a labeled dataset and predicting distributions for new
//!   molecules. It provides a simple and powerful entry point for end-users
//!   of the library.

pub mod core;
pub mod engine;
pub mod workflows;
