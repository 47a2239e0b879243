//! # Autoquant: automatic post-training quantization core
//!
//! Autoquant intercepts a model's operator calls while it runs, decides per
//! call whether to observe or quantize, tracks tensor provenance across the
//! unrolled graph, and persists the resulting decisions so they can be
//! reproduced or hand-tuned.
//!
//! ## Architecture
//!
//! - **tensor**: runtime tensors, descriptors, precisions and qparams
//! - **observer**: streaming statistics and qparam computation
//! - **op**: operator identity and seen-op records
//! - **state**: per-scope quantization state and conversion plans
//! - **model**: module hierarchy and the [`AutoQuantizer`] lifecycle
//! - **dispatch**: hook classification and the [`Trace`] driver
//! - **graph**: data-flow graph and pooling scale synchronization
//! - **persist**: qconf documents (JSON, YAML)
//! - **config**: declarative YAML run configuration and CLI arguments
//!
//! ## Example
//!
//! ```no_run
//! use autoquant::model::{AutoQuantizer, ModuleTree};
//! use autoquant::observer::QConfig;
//! use autoquant::op::OpType;
//! use autoquant::tensor::Tensor;
//!
//! let mut tree = ModuleTree::new("Net");
//! let root = tree.root();
//! let fc = tree.add_child(root, "fc", OpType::module("nn.Linear"))?;
//!
//! let mut quantizer = AutoQuantizer::prepare(tree, QConfig::default());
//! let weight = Tensor::from_vec(vec![0.5, -0.25]);
//! for _ in 0..4 {
//!     quantizer.run(vec![Tensor::from_vec(vec![1.0, 2.0])], |trace, inputs| {
//!         trace.call_module(fc, inputs, vec![weight.clone()], |_, inputs, weights| {
//!             let x = inputs[0].clone().unwrap_or_else(|| Tensor::zeros(&[2]));
//!             let y: f32 = x.data().iter().zip(weights[0].data().iter()).map(|(a, b)| a * b).sum();
//!             Ok(vec![Tensor::from_vec(vec![y])])
//!         })
//!     })?;
//! }
//! quantizer.finalize()?;
//! # Ok::<(), autoquant::Error>(())
//! ```

pub mod config;
pub mod dispatch;
pub mod graph;
pub mod model;
pub mod observer;
pub mod op;
pub mod persist;
pub mod state;
pub mod tensor;

pub mod error;

// Re-export commonly used types
pub use dispatch::{HookType, Trace};
pub use error::{Error, Result};
pub use model::{AutoQuantizer, ModuleTree, Phase, ScopeId};
pub use observer::QConfig;
pub use op::{OpKind, OpType};
pub use tensor::{Dtype, QParams, Tensor, TensorInfo};
