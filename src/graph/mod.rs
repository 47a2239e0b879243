//! Data-flow graph over recorded ops and pooling scale reconciliation
//!
//! The graph is derived from tensor ids: an edge `A -> B` exists when an
//! output id of `A` is an input id of `B`. It is rebuilt from the live
//! states whenever needed and never persisted.

mod build;
mod sync;

#[cfg(test)]
mod tests;

pub use build::{DependencyGraph, Node, OpNode, ParentNode};
pub use sync::sync_pool_scale_zp;
