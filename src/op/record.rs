//! Per-invocation operator records

use super::OpType;
use crate::observer::QConfig;
use crate::tensor::TensorInfo;

/// A quantizable operator seen during tracing
#[derive(Debug, Clone, PartialEq)]
pub struct SeenQOpInfo {
    /// Insertion order within the owning scope
    pub idx: usize,
    pub op_type: OpType,
    /// Location in the module hierarchy
    pub fqn: String,
    /// `None` marks a non-tensor argument slot
    pub input_tensor_infos: Vec<Option<TensorInfo>>,
    /// Weight ids are slot positions within this record
    pub weight_tensor_infos: Vec<Option<TensorInfo>>,
    pub output_tensor_infos: Vec<Option<TensorInfo>>,
    pub qconfig: QConfig,
}

impl SeenQOpInfo {
    /// Ids of all present input descriptors
    pub fn input_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.input_tensor_infos.iter().flatten().map(|t| t.id)
    }

    pub fn output_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.output_tensor_infos.iter().flatten().map(|t| t.id)
    }
}

/// An operator that runs in plain precision
#[derive(Debug, Clone, PartialEq)]
pub struct SeenNonQOpInfo {
    pub op_type: OpType,
    pub fqn: String,
    pub input_tensor_infos: Vec<Option<TensorInfo>>,
    pub output_tensor_infos: Vec<Option<TensorInfo>>,
}
