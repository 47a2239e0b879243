//! Observer factories, their persisted settings and per-op qconfig

use super::Observer;
use crate::tensor::{Dtype, QScheme};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Observer class vocabulary accepted in qconf files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverKind {
    MinMax,
    MovingAverageMinMax,
    PerChannelMinMax,
    MovingAveragePerChannelMinMax,
    Histogram,
    Placeholder,
}

impl ObserverKind {
    pub const ALL: [ObserverKind; 6] = [
        ObserverKind::MinMax,
        ObserverKind::MovingAverageMinMax,
        ObserverKind::PerChannelMinMax,
        ObserverKind::MovingAveragePerChannelMinMax,
        ObserverKind::Histogram,
        ObserverKind::Placeholder,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ObserverKind::MinMax => "MinMaxObserver",
            ObserverKind::MovingAverageMinMax => "MovingAverageMinMaxObserver",
            ObserverKind::PerChannelMinMax => "PerChannelMinMaxObserver",
            ObserverKind::MovingAveragePerChannelMinMax => "MovingAveragePerChannelMinMaxObserver",
            ObserverKind::Histogram => "HistogramObserver",
            ObserverKind::Placeholder => "PlaceholderObserver",
        }
    }

    /// Default `(dtype, qscheme)` when a setting leaves them out
    pub fn defaults(&self) -> (Dtype, QScheme) {
        match self {
            ObserverKind::PerChannelMinMax | ObserverKind::MovingAveragePerChannelMinMax => {
                (Dtype::QUInt8, QScheme::PerChannelAffine)
            }
            ObserverKind::Placeholder => (Dtype::Float32, QScheme::PerTensorAffine),
            _ => (Dtype::QUInt8, QScheme::PerTensorAffine),
        }
    }

    pub fn is_per_channel(&self) -> bool {
        matches!(
            self,
            ObserverKind::PerChannelMinMax | ObserverKind::MovingAveragePerChannelMinMax
        )
    }
}

impl fmt::Display for ObserverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObserverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObserverKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| Error::UnknownObserver(s.to_string()))
    }
}

/// Observer constructor argument
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverArg {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Anything a text config cannot represent; dropped on save
    Opaque(String),
}

impl ObserverArg {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ObserverArg::Int(v) => Some(*v as f64),
            ObserverArg::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ObserverArg::Int(v) => Some(*v),
            ObserverArg::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ObserverArg::Bool(v) => Some(*v),
            ObserverArg::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    fn to_value(&self) -> Option<serde_json::Value> {
        match self {
            ObserverArg::Int(v) => Some((*v).into()),
            ObserverArg::Float(v) => serde_json::Number::from_f64(*v).map(serde_json::Value::Number),
            ObserverArg::Bool(v) => Some((*v).into()),
            ObserverArg::Opaque(_) => None,
        }
    }

    fn from_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => ObserverArg::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ObserverArg::Int(i),
                None => ObserverArg::Float(n.as_f64().unwrap_or_default()),
            },
            other => ObserverArg::Opaque(other.to_string()),
        }
    }
}

/// Text form of an observer factory as stored in qconf files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverSetting {
    /// Observer class name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qscheme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,

    /// Remaining constructor arguments (numbers and booleans)
    #[serde(flatten)]
    pub args: BTreeMap<String, serde_json::Value>,
}

/// Observer factory: class plus constructor arguments
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverSpec {
    pub kind: ObserverKind,
    pub dtype: Dtype,
    pub qscheme: QScheme,
    pub args: BTreeMap<String, ObserverArg>,
}

impl ObserverSpec {
    /// Factory with the class defaults
    pub fn new(kind: ObserverKind) -> Self {
        let (dtype, qscheme) = kind.defaults();
        Self {
            kind,
            dtype,
            qscheme,
            args: BTreeMap::new(),
        }
    }

    pub fn with_dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_qscheme(mut self, qscheme: QScheme) -> Self {
        self.qscheme = qscheme;
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, arg: ObserverArg) -> Self {
        self.args.insert(name.into(), arg);
        self
    }

    pub fn arg(&self, name: &str) -> Option<&ObserverArg> {
        self.args.get(name)
    }

    pub fn reduce_range(&self) -> bool {
        self.arg("reduce_range")
            .and_then(ObserverArg::as_bool)
            .unwrap_or(false)
    }

    /// Integer range honouring explicit `quant_min`/`quant_max` overrides
    pub fn quant_range(&self) -> Option<(i64, i64)> {
        let (qmin, qmax) = self.dtype.quant_range(self.reduce_range())?;
        let qmin = self.arg("quant_min").and_then(ObserverArg::as_i64).unwrap_or(qmin);
        let qmax = self.arg("quant_max").and_then(ObserverArg::as_i64).unwrap_or(qmax);
        Some((qmin, qmax))
    }

    pub fn eps(&self) -> f32 {
        self.arg("eps")
            .and_then(ObserverArg::as_f64)
            .map(|e| e as f32)
            .unwrap_or(f32::EPSILON)
    }

    /// Instantiate a fresh observer
    pub fn build(&self) -> Result<Observer> {
        Observer::new(self.clone())
    }

    /// Persisted form; opaque arguments are dropped
    pub fn to_setting(&self) -> ObserverSetting {
        let mut args = BTreeMap::new();
        for (name, arg) in &self.args {
            match arg.to_value() {
                Some(value) => {
                    args.insert(name.clone(), value);
                }
                None => tracing::warn!(
                    observer = self.kind.name(),
                    arg = name.as_str(),
                    "dropping observer argument that cannot be saved"
                ),
            }
        }
        ObserverSetting {
            name: self.kind.name().to_string(),
            qscheme: Some(self.qscheme.name().to_string()),
            dtype: Some(self.dtype.name().to_string()),
            args,
        }
    }

    /// Parse a persisted setting. Unknown class, qscheme or dtype names fail.
    pub fn from_setting(setting: &ObserverSetting) -> Result<Self> {
        let kind: ObserverKind = setting.name.parse()?;
        let (default_dtype, default_qscheme) = kind.defaults();
        let dtype = match &setting.dtype {
            Some(name) => name.parse()?,
            None => default_dtype,
        };
        let qscheme = match &setting.qscheme {
            Some(name) => name.parse()?,
            None => default_qscheme,
        };
        let args = setting
            .args
            .iter()
            .map(|(name, value)| (name.clone(), ObserverArg::from_value(value)))
            .collect();
        Ok(Self {
            kind,
            dtype,
            qscheme,
            args,
        })
    }
}

/// Observer factories for one quantizable op
#[derive(Debug, Clone, PartialEq)]
pub struct QConfig {
    pub activation: ObserverSpec,
    pub weight: ObserverSpec,
}

impl QConfig {
    pub fn new(activation: ObserverSpec, weight: ObserverSpec) -> Self {
        Self { activation, weight }
    }
}

impl Default for QConfig {
    /// Static int8: uint8 per-tensor affine activations, int8 per-channel
    /// symmetric weights
    fn default() -> Self {
        Self {
            activation: ObserverSpec::new(ObserverKind::MinMax)
                .with_dtype(Dtype::QUInt8)
                .with_qscheme(QScheme::PerTensorAffine),
            weight: ObserverSpec::new(ObserverKind::PerChannelMinMax)
                .with_dtype(Dtype::QInt8)
                .with_qscheme(QScheme::PerChannelSymmetric),
        }
    }
}
