//! # Workflows Module
//!
//! High-level entry points that tie `core` and `engine` together into
//! complete procedures.
//!
//! ## Overview
//!
//! Workflows are the top-level API for users of the library. Each workflow
//! handles validation, progress reporting, and result organization, and
//! either completes with well-formed results or returns a specific, named
//! error.
//!
//! - **Training** ([`train`]) - Fit a fresh model to a labeled dataset
//! - **Prediction** ([`predict`]) - Apply a fitted model to new molecules

pub mod predict;
pub mod train;
