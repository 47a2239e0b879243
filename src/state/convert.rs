//! Conversion info: the runtime actions a converted call site needs

use crate::tensor::{Dtype, QParams, Tensor};
use crate::Result;

/// What to do with one tensor slot before or after a quantized op
#[derive(Debug, Clone, PartialEq)]
pub enum TensorAction {
    /// Leave the tensor as it arrives
    Passthrough,
    /// Bring the tensor back to plain precision
    Dequantize,
    /// Make sure the tensor is quantized with exactly these parameters,
    /// requantizing if it arrives quantized differently. Codes are clamped
    /// to `quant_range`.
    Quantize {
        qparams: QParams,
        dtype: Dtype,
        quant_range: (i64, i64),
    },
}

impl TensorAction {
    pub fn apply(&self, tensor: Tensor) -> Result<Tensor> {
        match self {
            TensorAction::Passthrough => Ok(tensor),
            TensorAction::Dequantize => Ok(tensor.dequantize()),
            TensorAction::Quantize {
                qparams,
                dtype,
                quant_range,
            } => {
                if tensor.is_quantized_as(qparams, *dtype) {
                    Ok(tensor)
                } else {
                    tensor.quantize_in_range(qparams, *dtype, *quant_range)
                }
            }
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, TensorAction::Passthrough)
    }
}

/// Cached per-record conversion plan
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpConvertInfo {
    pub inputs: Vec<TensorAction>,
    pub weights: Vec<TensorAction>,
    pub outputs: Vec<TensorAction>,
}

impl OpConvertInfo {
    /// Whether the call site can run without touching any tensor
    pub fn is_noop(&self) -> bool {
        self.inputs
            .iter()
            .chain(&self.weights)
            .chain(&self.outputs)
            .all(TensorAction::is_passthrough)
    }
}

/// Apply one action per slot; slots beyond the plan pass through
pub(crate) fn apply_actions<T, F>(
    actions: &[TensorAction],
    slots: Vec<T>,
    mut apply: F,
) -> Result<Vec<T>>
where
    F: FnMut(&TensorAction, T) -> Result<T>,
{
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| match actions.get(i) {
            Some(action) => apply(action, slot),
            None => Ok(slot),
        })
        .collect()
}
