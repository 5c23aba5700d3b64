//! # Molecular Graph Module
//!
//! Data structures representing molecules as attributed graphs, validated at
//! construction and immutable afterwards.
//!
//! ## Key Components
//!
//! - [`atom`] - Attributed graph nodes, with an element-table featurization helper
//! - [`bond`] - Attributed edges between atoms, including bond-order encodings
//! - [`element`] - Static table of element constants for featurization
//! - [`molecule`] - The validated per-molecule graph with derived adjacency
//! - [`batch`] - Block-structured multi-molecule batches for vectorized passes
//!
//! ## Usage
//!
//! Graphs are built once from normalized records supplied by the molecule
//! I/O layer and are read-only thereafter; batches are transient views
//! assembled per forward pass.
//!
//! ```ignore
//! use molprop::core::graph::{atom::Atom, bond::{Bond, BondOrder}, molecule::MolecularGraph};
//!
//! let atoms = vec![Atom::from_element("C", 0).unwrap(), Atom::from_element("O", 0).unwrap()];
//! let bonds = vec![Bond::with_order(0, 1, BondOrder::Double)];
//! let graph = MolecularGraph::build(atoms, bonds)?;
//! ```

pub mod atom;
pub mod batch;
pub mod bond;
pub mod element;
pub mod molecule;
