//! Quantization state: op records, observers and finalized parameters
//!
//! One [`QuantizationState`] exists per participating module scope. All of
//! them live in a [`QuantStateMap`] side-table keyed by the scope's
//! fully-qualified name (`""` for the root).

mod convert;
mod quant_state;


use std::collections::BTreeMap;

pub use convert::{OpConvertInfo, TensorAction};
pub(crate) use convert::apply_actions;
pub use quant_state::{QuantizationState, TensorIdAllocator, MAX_TENSOR_ID};
pub(crate) use quant_state::{LoadedNonQOp, LoadedQOp, LoadedState};

/// Scope fqn → quantization state
pub type QuantStateMap = BTreeMap<String, QuantizationState>;
