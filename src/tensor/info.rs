//! Tensor descriptors and affine quantization parameters

use super::Dtype;
use std::fmt;
use std::str::FromStr;

/// Identity of a tensor inside one execution trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorInfo {
    /// Trace-unique id, stable across repeated passes
    pub id: u64,
    /// Precision the model produces the tensor in
    pub orig_dtype: Dtype,
    /// Precision the tensor should have at inference time
    pub inf_dtype: Dtype,
}

impl TensorInfo {
    pub fn new(id: u64, orig_dtype: Dtype, inf_dtype: Dtype) -> Self {
        Self {
            id,
            orig_dtype,
            inf_dtype,
        }
    }
}

/// Scale/zero-point pair. One entry for per-tensor schemes, one entry per
/// channel (axis 0) for per-channel schemes.
#[derive(Debug, Clone, PartialEq)]
pub struct QParams {
    pub scale: Vec<f32>,
    pub zero_point: Vec<i64>,
}

impl QParams {
    pub fn per_tensor(scale: f32, zero_point: i64) -> Self {
        Self {
            scale: vec![scale],
            zero_point: vec![zero_point],
        }
    }

    pub fn per_channel(scale: Vec<f32>, zero_point: Vec<i64>) -> Self {
        Self { scale, zero_point }
    }

    pub fn is_per_channel(&self) -> bool {
        self.scale.len() > 1
    }

    pub fn num_channels(&self) -> usize {
        self.scale.len()
    }

    /// Parameters for channel `c`; per-tensor parameters apply to every channel.
    pub fn channel(&self, c: usize) -> (f32, i64) {
        if self.is_per_channel() {
            (self.scale[c], self.zero_point[c])
        } else {
            (self.scale[0], self.zero_point[0])
        }
    }
}

/// Key of a weight observer / weight qparams entry: `"<record idx>_<weight id>"`.
///
/// Weights are not shared across invocations, so the owning record index is
/// part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeightKey {
    pub op_idx: usize,
    pub tensor_id: u64,
}

impl WeightKey {
    pub fn new(op_idx: usize, tensor_id: u64) -> Self {
        Self { op_idx, tensor_id }
    }
}

impl fmt::Display for WeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.op_idx, self.tensor_id)
    }
}

impl FromStr for WeightKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let bad = || crate::Error::InvalidParameter(format!("malformed weight key: {s}"));
        let (idx, id) = s.split_once('_').ok_or_else(bad)?;
        Ok(Self {
            op_idx: idx.parse().map_err(|_| bad())?,
            tensor_id: id.parse().map_err(|_| bad())?,
        })
    }
}
