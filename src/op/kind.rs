//! Operator identity: stable names resolved to an enumerated kind

use std::collections::HashMap;
use std::fmt;

const BUILTIN_PREFIX: &str = "<built-in method ";

/// What an operator does, as far as quantization is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Convolution,
    Linear,
    EmbeddingBag,
    TransposedConvolution,
    Recurrent,
    Pooling,
    /// Pure reshaping (flatten) that never changes values
    ShapeOnly,
    ElementwiseAdd,
    Other,
}

impl OpKind {
    pub fn is_quantizable(&self) -> bool {
        !matches!(self, OpKind::Other)
    }

    /// Kinds whose module form owns weight tensors
    pub fn has_weights(&self) -> bool {
        matches!(
            self,
            OpKind::Convolution
                | OpKind::Linear
                | OpKind::EmbeddingBag
                | OpKind::TransposedConvolution
                | OpKind::Recurrent
        )
    }

    /// Kinds whose output must keep the input's scale/zero-point
    pub fn preserves_qparams(&self) -> bool {
        matches!(self, OpKind::Pooling | OpKind::ShapeOnly)
    }

    /// Built-in name table
    pub fn classify(name: &str) -> OpKind {
        let name = builtin_method_name(name)
            .map(|m| format!("torch.{m}"))
            .unwrap_or_else(|| name.to_string());
        match name.as_str() {
            "nn.Conv2d" | "nn.Conv3d" | "F.conv2d" | "F.conv3d" => OpKind::Convolution,
            "nn.Linear" | "F.linear" => OpKind::Linear,
            "nn.EmbeddingBag" | "F.embedding_bag" => OpKind::EmbeddingBag,
            "nn.ConvTranspose2d" | "nn.ConvTranspose3d" | "F.conv_transpose2d"
            | "F.conv_transpose3d" => OpKind::TransposedConvolution,
            "nn.LSTM" => OpKind::Recurrent,
            "nn.MaxPool2d" | "nn.MaxPool3d" | "nn.AvgPool2d" | "nn.AvgPool3d"
            | "nn.AdaptiveAvgPool2d" | "nn.AdaptiveAvgPool3d" | "F.max_pool2d"
            | "F.max_pool3d" | "F.avg_pool2d" | "F.avg_pool3d" | "F.adaptive_avg_pool2d"
            | "F.adaptive_avg_pool3d" => OpKind::Pooling,
            "nn.Flatten" | "torch.flatten" => OpKind::ShapeOnly,
            "torch.add" | "Tensor.add" => OpKind::ElementwiseAdd,
            _ => OpKind::Other,
        }
    }
}

/// `"<built-in method flatten of type object at 0x7f..>"` → `"flatten"`
fn builtin_method_name(name: &str) -> Option<&str> {
    name.strip_prefix(BUILTIN_PREFIX)?.split_whitespace().next()
}

/// Identity of a called operator or module class
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpType {
    pub name: String,
    pub kind: OpKind,
    pub is_module: bool,
}

impl OpType {
    /// A functional operator resolved against the built-in table
    pub fn function(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: OpKind::classify(&name),
            name,
            is_module: false,
        }
    }

    /// A module class resolved against the built-in table
    pub fn module(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: OpKind::classify(&name),
            name,
            is_module: true,
        }
    }

    /// Built-in leaf modules are invoked as single operators by their parent.
    /// Containers and user-defined modules are scopes of their own.
    pub fn is_leaf_module(&self) -> bool {
        self.is_module
            && self.name.starts_with("nn.")
            && !matches!(self.name.as_str(), "nn.Sequential" | "nn.ModuleList" | "nn.ModuleDict")
    }

    /// Whether a name stored in a qconf file refers to this operator.
    ///
    /// Names match exactly, with one exception: built-in method names
    /// (`<built-in method NAME of ... at ADDR>`) end in a memory address that
    /// changes from run to run, so they match when every whitespace-separated
    /// token except the last is equal.
    pub fn matches_persisted(&self, persisted: &str) -> bool {
        if self.name == persisted {
            return true;
        }
        if !persisted.starts_with(BUILTIN_PREFIX) {
            return false;
        }
        let live: Vec<&str> = self.name.split_whitespace().collect();
        let saved: Vec<&str> = persisted.split_whitespace().collect();
        !live.is_empty() && live.len() == saved.len() && live[..live.len() - 1] == saved[..saved.len() - 1]
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Name → kind table with user registrations layered over the built-ins
#[derive(Debug, Clone, Default)]
pub struct OpRegistry {
    overrides: HashMap<String, OpKind>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or reclassify) an operator name
    pub fn register(&mut self, name: impl Into<String>, kind: OpKind) -> &mut Self {
        self.overrides.insert(name.into(), kind);
        self
    }

    pub fn kind_of(&self, name: &str) -> OpKind {
        self.overrides
            .get(name)
            .copied()
            .unwrap_or_else(|| OpKind::classify(name))
    }

    pub fn function(&self, name: impl Into<String>) -> OpType {
        let name = name.into();
        OpType {
            kind: self.kind_of(&name),
            name,
            is_module: false,
        }
    }

    pub fn module(&self, name: impl Into<String>) -> OpType {
        let name = name.into();
        OpType {
            kind: self.kind_of(&name),
            name,
            is_module: true,
        }
    }
}
