//! Numeric precisions and quantization schemes
//!
//! Both enums round-trip through the string vocabulary used by qconf files
//! (`torch.quint8`, `torch.per_tensor_affine`, ...). Parsing an unknown name
//! is a lookup error, never a silent default.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Tensor element precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Dtype {
    /// Plain 32-bit float
    #[default]
    Float32,
    /// Unsigned 8-bit affine quantized
    QUInt8,
    /// Signed 8-bit quantized
    QInt8,
}

impl Dtype {
    pub const ALL: [Dtype; 3] = [Dtype::Float32, Dtype::QUInt8, Dtype::QInt8];

    /// Wire name of this precision
    pub fn name(&self) -> &'static str {
        match self {
            Dtype::Float32 => "torch.float32",
            Dtype::QUInt8 => "torch.quint8",
            Dtype::QInt8 => "torch.qint8",
        }
    }

    /// Whether values of this precision carry scale/zero-point
    pub fn is_quantized(&self) -> bool {
        matches!(self, Dtype::QUInt8 | Dtype::QInt8)
    }

    /// Representable integer range `(quant_min, quant_max)`.
    ///
    /// With `reduce_range` the range loses its top bit, which keeps
    /// accumulation headroom on some integer kernels.
    ///
    /// Float32 has no integer range and returns `None`.
    pub fn quant_range(&self, reduce_range: bool) -> Option<(i64, i64)> {
        match (self, reduce_range) {
            (Dtype::QUInt8, false) => Some((0, 255)),
            (Dtype::QUInt8, true) => Some((0, 127)),
            (Dtype::QInt8, false) => Some((-128, 127)),
            (Dtype::QInt8, true) => Some((-64, 63)),
            (Dtype::Float32, _) => None,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dtype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Dtype::ALL
            .iter()
            .copied()
            .find(|d| d.name() == s)
            .ok_or_else(|| Error::UnknownDtype(s.to_string()))
    }
}

/// Affine mapping scheme used by an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QScheme {
    #[default]
    PerTensorAffine,
    PerTensorSymmetric,
    PerChannelAffine,
    PerChannelSymmetric,
}

impl QScheme {
    pub const ALL: [QScheme; 4] = [
        QScheme::PerTensorAffine,
        QScheme::PerTensorSymmetric,
        QScheme::PerChannelAffine,
        QScheme::PerChannelSymmetric,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            QScheme::PerTensorAffine => "torch.per_tensor_affine",
            QScheme::PerTensorSymmetric => "torch.per_tensor_symmetric",
            QScheme::PerChannelAffine => "torch.per_channel_affine",
            QScheme::PerChannelSymmetric => "torch.per_channel_symmetric",
        }
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(
            self,
            QScheme::PerTensorSymmetric | QScheme::PerChannelSymmetric
        )
    }

    pub fn is_per_channel(&self) -> bool {
        matches!(
            self,
            QScheme::PerChannelAffine | QScheme::PerChannelSymmetric
        )
    }
}

impl fmt::Display for QScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        QScheme::ALL
            .iter()
            .copied()
            .find(|q| q.name() == s)
            .ok_or_else(|| Error::UnknownQScheme(s.to_string()))
    }
}
