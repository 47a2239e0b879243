//! Tensors, tensor descriptors and precisions
//!
//! - [`Dtype`] / [`QScheme`]: closed precision and scheme vocabularies
//! - [`TensorInfo`]: provenance descriptor (id + original/inference precision)
//! - [`QParams`]: scale/zero-point, per-tensor or per-channel
//! - [`Tensor`]: runtime value handed to hooks and kernels

mod dtype;
mod info;
mod value;

#[cfg(test)]
mod tests;

pub use dtype::{Dtype, QScheme};
pub use info::{QParams, TensorInfo, WeightKey};
pub use value::Tensor;
