//! Serializable qconf document
//!
//! Layout (JSON shown, YAML mirrors it):
//!
//! ```text
//! { "<scope fqn>": {
//!     "q_op_infos": { "<idx>": { "op_type", "op_type_is_module", "fqn",
//!                                "input_tensor_infos", "weight_tensor_infos",
//!                                "output_tensor_infos",
//!                                "activation_observer", "weight_observer" } },
//!     "nonq_op_infos": { "<n>": { "op_type", "fqn",
//!                                 "input_tensor_infos", "output_tensor_infos" } },
//!     "layer_output_infos": [ ... ] } }
//! ```
//!
//! A tensor entry is `{}` for an absent slot, otherwise `id` (activations
//! only), `orig_dtype`, `inf_dtype` and, when finalized, `scale` and
//! `zero_point`.

use super::format::ConfigFormat;
use crate::observer::{ObserverSetting, ObserverSpec, QConfig};
use crate::op::{SeenNonQOpInfo, SeenQOpInfo};
use crate::state::{LoadedNonQOp, LoadedQOp, QuantStateMap, QuantizationState, MAX_TENSOR_ID};
use crate::tensor::{Dtype, QParams, TensorInfo, WeightKey};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One tensor slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedTensorInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_dtype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inf_dtype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec<f32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_point: Option<Vec<i64>>,
}

impl PersistedTensorInfo {
    /// `{}` marks a slot that held no tensor
    pub fn is_absent(&self) -> bool {
        self.id.is_none() && self.orig_dtype.is_none() && self.inf_dtype.is_none()
    }

    fn from_info(info: &Option<TensorInfo>, with_id: bool, qparams: Option<&QParams>) -> Self {
        match info {
            None => Self::default(),
            Some(info) => Self {
                id: with_id.then_some(info.id),
                orig_dtype: Some(info.orig_dtype.name().to_string()),
                inf_dtype: Some(info.inf_dtype.name().to_string()),
                scale: qparams.map(|qp| qp.scale.clone()),
                zero_point: qparams.map(|qp| qp.zero_point.clone()),
            },
        }
    }

    fn dtypes(&self) -> Result<(Dtype, Dtype)> {
        let field = |value: &Option<String>, name: &str| -> Result<Dtype> {
            value
                .as_deref()
                .ok_or_else(|| Error::Serialization(format!("tensor entry without {name}")))?
                .parse()
        };
        Ok((field(&self.orig_dtype, "orig_dtype")?, field(&self.inf_dtype, "inf_dtype")?))
    }

    /// Attached parameters, if any
    pub fn qparams(&self) -> Result<Option<QParams>> {
        match (&self.scale, &self.zero_point) {
            (None, None) => Ok(None),
            (Some(scale), Some(zero_point)) => {
                if scale.is_empty() || scale.len() != zero_point.len() {
                    return Err(Error::InvalidParameter(format!(
                        "scale has {} entries but zero_point has {}",
                        scale.len(),
                        zero_point.len()
                    )));
                }
                Ok(Some(QParams::per_channel(scale.clone(), zero_point.clone())))
            }
            _ => Err(Error::InvalidParameter(
                "scale and zero_point must be given together".to_string(),
            )),
        }
    }

    /// Decode an activation slot
    pub fn decode_activation(&self) -> Result<Option<(TensorInfo, Option<QParams>)>> {
        if self.is_absent() {
            return Ok(None);
        }
        let id = self
            .id
            .ok_or_else(|| Error::Serialization("activation entry without id".to_string()))?;
        if id > MAX_TENSOR_ID {
            return Err(Error::InvalidParameter(format!(
                "tensor id {id} exceeds the largest supported id {MAX_TENSOR_ID}"
            )));
        }
        let (orig, inf) = self.dtypes()?;
        Ok(Some((TensorInfo::new(id, orig, inf), self.qparams()?)))
    }

    /// Decode a weight slot; weight ids are assigned by position
    pub fn decode_weight(&self, id: u64) -> Result<Option<(TensorInfo, Option<QParams>)>> {
        if self.is_absent() {
            return Ok(None);
        }
        let (orig, inf) = self.dtypes()?;
        Ok(Some((TensorInfo::new(id, orig, inf), self.qparams()?)))
    }
}

/// Persisted quantizable record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedQOpInfo {
    pub op_type: String,
    #[serde(default)]
    pub op_type_is_module: bool,
    pub fqn: String,
    #[serde(default)]
    pub input_tensor_infos: Vec<PersistedTensorInfo>,
    #[serde(default)]
    pub weight_tensor_infos: Vec<PersistedTensorInfo>,
    #[serde(default)]
    pub output_tensor_infos: Vec<PersistedTensorInfo>,
    pub activation_observer: ObserverSetting,
    pub weight_observer: ObserverSetting,
}

/// Persisted non-quantizable record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedNonQOpInfo {
    pub op_type: String,
    pub fqn: String,
    #[serde(default)]
    pub input_tensor_infos: Vec<PersistedTensorInfo>,
    #[serde(default)]
    pub output_tensor_infos: Vec<PersistedTensorInfo>,
}

/// Everything persisted for one scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    #[serde(default)]
    pub q_op_infos: BTreeMap<usize, PersistedQOpInfo>,
    #[serde(default)]
    pub nonq_op_infos: BTreeMap<usize, PersistedNonQOpInfo>,
    #[serde(default)]
    pub layer_output_infos: Vec<PersistedTensorInfo>,
}

/// Counts reported by `autoquant inspect`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SummaryStats {
    pub scopes: usize,
    pub q_ops: usize,
    pub nonq_ops: usize,
    pub activation_params: usize,
    pub weight_params: usize,
}

/// A full qconf document: scope fqn → [`LayerInfo`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QConfSummary {
    layers: BTreeMap<String, LayerInfo>,
}

impl QConfSummary {
    pub fn from_states(states: &QuantStateMap) -> Self {
        let layers = states
            .iter()
            .map(|(fqn, state)| (fqn.clone(), layer_from_state(state)))
            .collect();
        Self { layers }
    }

    pub fn layers(&self) -> &BTreeMap<String, LayerInfo> {
        &self.layers
    }

    pub fn layer(&self, fqn: &str) -> Option<&LayerInfo> {
        self.layers.get(fqn)
    }

    pub fn layer_mut(&mut self, fqn: &str) -> Option<&mut LayerInfo> {
        self.layers.get_mut(fqn)
    }

    pub fn to_string(&self, format: ConfigFormat, pretty: bool) -> Result<String> {
        match format {
            ConfigFormat::Json if pretty => serde_json::to_string_pretty(self)
                .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}"))),
            ConfigFormat::Json => serde_json::to_string(self)
                .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}"))),
            ConfigFormat::Yaml => serde_yaml::to_string(self)
                .map_err(|e| Error::Serialization(format!("YAML serialization failed: {e}"))),
        }
    }

    pub fn from_str(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}"))),
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| Error::Serialization(format!("YAML deserialization failed: {e}"))),
        }
    }

    /// Read a document, detecting the format from the extension
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::Serialization(format!("unsupported qconf extension: {}", path.display()))
        })?;
        let content = fs::read_to_string(path)?;
        Self::from_str(&content, format)
    }

    pub fn summary(&self) -> SummaryStats {
        let mut stats = SummaryStats {
            scopes: self.layers.len(),
            ..SummaryStats::default()
        };
        for layer in self.layers.values() {
            stats.q_ops += layer.q_op_infos.len();
            stats.nonq_ops += layer.nonq_op_infos.len();
            for op in layer.q_op_infos.values() {
                stats.activation_params += op
                    .input_tensor_infos
                    .iter()
                    .chain(&op.output_tensor_infos)
                    .filter(|t| t.scale.is_some())
                    .count();
                stats.weight_params += op
                    .weight_tensor_infos
                    .iter()
                    .filter(|t| t.scale.is_some())
                    .count();
            }
        }
        stats
    }

    /// Decode every entry without a model: dtype, qscheme and observer
    /// names must resolve and parameters must be well formed.
    pub fn validate(&self) -> Result<()> {
        for layer in self.layers.values() {
            for op in layer.q_op_infos.values() {
                decode_q_op(op, 0)?;
            }
            for op in layer.nonq_op_infos.values() {
                decode_nonq_op(op)?;
            }
            for entry in &layer.layer_output_infos {
                entry.decode_activation()?;
            }
        }
        Ok(())
    }
}

fn layer_from_state(state: &QuantizationState) -> LayerInfo {
    let q_op_infos = state
        .q_op_infos()
        .iter()
        .map(|(idx, record)| (*idx, q_op_from_record(state, record)))
        .collect();
    let nonq_op_infos = state
        .nonq_op_infos()
        .iter()
        .enumerate()
        .map(|(idx, record)| (idx, nonq_op_from_record(record)))
        .collect();
    let layer_output_infos = state
        .output_qtensor_infos()
        .iter()
        .map(|info| activation_entry(state, info))
        .collect();
    LayerInfo {
        q_op_infos,
        nonq_op_infos,
        layer_output_infos,
    }
}

fn activation_entry(state: &QuantizationState, info: &Option<TensorInfo>) -> PersistedTensorInfo {
    let qparams = info.and_then(|t| state.scale_zp(t.id));
    PersistedTensorInfo::from_info(info, true, qparams)
}

fn q_op_from_record(state: &QuantizationState, record: &SeenQOpInfo) -> PersistedQOpInfo {
    let weight_tensor_infos = record
        .weight_tensor_infos
        .iter()
        .map(|info| {
            let qparams = info.and_then(|t| state.weight_scale_zp(WeightKey::new(record.idx, t.id)));
            PersistedTensorInfo::from_info(info, false, qparams)
        })
        .collect();
    PersistedQOpInfo {
        op_type: record.op_type.name.clone(),
        op_type_is_module: record.op_type.is_module,
        fqn: record.fqn.clone(),
        input_tensor_infos: record
            .input_tensor_infos
            .iter()
            .map(|info| activation_entry(state, info))
            .collect(),
        weight_tensor_infos,
        output_tensor_infos: record
            .output_tensor_infos
            .iter()
            .map(|info| activation_entry(state, info))
            .collect(),
        activation_observer: record.qconfig.activation.to_setting(),
        weight_observer: record.qconfig.weight.to_setting(),
    }
}

fn nonq_op_from_record(record: &SeenNonQOpInfo) -> PersistedNonQOpInfo {
    let plain = |infos: &[Option<TensorInfo>]| {
        infos
            .iter()
            .map(|info| PersistedTensorInfo::from_info(info, true, None))
            .collect()
    };
    PersistedNonQOpInfo {
        op_type: record.op_type.name.clone(),
        fqn: record.fqn.clone(),
        input_tensor_infos: plain(&record.input_tensor_infos),
        output_tensor_infos: plain(&record.output_tensor_infos),
    }
}

/// Decoded activation slots plus the parameters they carried
pub(crate) type DecodedSlots = (Vec<Option<TensorInfo>>, BTreeMap<u64, QParams>);

pub(crate) fn decode_activations(entries: &[PersistedTensorInfo]) -> Result<DecodedSlots> {
    let mut infos = Vec::with_capacity(entries.len());
    let mut params = BTreeMap::new();
    for entry in entries {
        match entry.decode_activation()? {
            Some((info, qparams)) => {
                if let Some(qparams) = qparams {
                    params.insert(info.id, qparams);
                }
                infos.push(Some(info));
            }
            None => infos.push(None),
        }
    }
    Ok((infos, params))
}

/// Decode a persisted quantizable record stored at `idx`
pub(crate) fn decode_q_op(
    op: &PersistedQOpInfo,
    idx: usize,
) -> Result<(LoadedQOp, BTreeMap<u64, QParams>, BTreeMap<WeightKey, QParams>)> {
    let (input_tensor_infos, mut params) = decode_activations(&op.input_tensor_infos)?;
    let (output_tensor_infos, output_params) = decode_activations(&op.output_tensor_infos)?;
    params.extend(output_params);

    let mut weight_tensor_infos = Vec::with_capacity(op.weight_tensor_infos.len());
    let mut weight_params = BTreeMap::new();
    let mut next_weight = 0u64;
    for entry in &op.weight_tensor_infos {
        match entry.decode_weight(next_weight)? {
            Some((info, qparams)) => {
                if let Some(qparams) = qparams {
                    weight_params.insert(WeightKey::new(idx, info.id), qparams);
                }
                weight_tensor_infos.push(Some(info));
                next_weight += 1;
            }
            None => weight_tensor_infos.push(None),
        }
    }

    let qconfig = QConfig::new(
        ObserverSpec::from_setting(&op.activation_observer)?,
        ObserverSpec::from_setting(&op.weight_observer)?,
    );
    // fail now rather than at observer insertion
    qconfig.activation.build()?;
    qconfig.weight.build()?;

    Ok((
        LoadedQOp {
            input_tensor_infos,
            weight_tensor_infos,
            output_tensor_infos,
            qconfig,
        },
        params,
        weight_params,
    ))
}

pub(crate) fn decode_nonq_op(op: &PersistedNonQOpInfo) -> Result<LoadedNonQOp> {
    let (input_tensor_infos, _) = decode_activations(&op.input_tensor_infos)?;
    let (output_tensor_infos, _) = decode_activations(&op.output_tensor_infos)?;
    Ok(LoadedNonQOp {
        input_tensor_infos,
        output_tensor_infos,
    })
}
