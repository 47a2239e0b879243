//! Model registry: module hierarchy plus the quantization side-table
//!
//! The host describes its modules once as a [`ModuleTree`]. An
//! [`AutoQuantizer`] prepared from it owns one
//! [`QuantizationState`](crate::state::QuantizationState) per container
//! scope and drives the lifecycle:
//!
//! ```text
//! prepare -> run (calibrating) x N -> finalize -> run (converted)
//!                  ^                                   |
//!                  +----------- recalibrate -----------+
//! ```
//!
//! `save` / `load` externalize and restore the finalized decisions.

mod quantizer;
mod tree;

#[cfg(test)]
mod tests;

pub use quantizer::{AutoQuantizer, Phase};
pub use tree::{ModuleScope, ModuleTree, ScopeId};
