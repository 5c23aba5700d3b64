//! Vectorized network primitives with hand-derived gradients.
//!
//! Every layer exposes a forward pass that caches what its backward pass
//! needs, and a backward pass that accumulates parameter gradients into a
//! zeroed twin of its parameter struct. All computation is expressed as
//! batch matrix operations over `nalgebra` dynamic matrices; there is no
//! per-atom dispatch anywhere.

pub mod linear;
pub mod message_passing;
pub mod ops;
pub mod readout;
