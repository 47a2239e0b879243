//! Per-scope quantization state

use super::convert::{OpConvertInfo, TensorAction};
use crate::observer::{Observer, ObserverSpec, QConfig};
use crate::op::{OpType, SeenNonQOpInfo, SeenQOpInfo};
use crate::tensor::{Dtype, QParams, Tensor, TensorInfo, WeightKey};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Largest tensor id accepted from a qconf document: the largest integer
/// every JSON reader represents exactly
pub const MAX_TENSOR_ID: u64 = (1 << 53) - 1;

/// Hands out trace-unique tensor ids
#[derive(Debug, Clone, Default)]
pub struct TensorIdAllocator {
    next: u64,
}

impl TensorIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }

    /// Never hand out an id at or below `id` again
    pub fn reserve_through(&mut self, id: u64) -> Result<()> {
        let next = id.checked_add(1).ok_or_else(|| {
            Error::InvalidParameter(format!("tensor id {id} leaves no ids to allocate"))
        })?;
        self.next = self.next.max(next);
        Ok(())
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Everything one module scope learns about its operators
///
/// Records are appended on the first pass and matched by position on every
/// later pass, so a scope's control flow must be static for the cached
/// parameters to stay valid.
#[derive(Debug, Clone)]
pub struct QuantizationState {
    fqn: String,
    q_op_infos: BTreeMap<usize, SeenQOpInfo>,
    nonq_op_infos: Vec<SeenNonQOpInfo>,
    tensor_id_to_observer: BTreeMap<u64, Observer>,
    weight_tensor_id_to_observer: BTreeMap<WeightKey, Observer>,
    tensor_id_to_scale_zp: BTreeMap<u64, QParams>,
    weight_tensor_id_to_scale_zp: BTreeMap<WeightKey, QParams>,
    output_qtensor_infos: Vec<Option<TensorInfo>>,
    idx_to_op_convert_info: BTreeMap<usize, OpConvertInfo>,
    cur_op_idx: usize,
    cur_nonq_idx: usize,
    first_call_complete: bool,
}

impl QuantizationState {
    pub fn new(fqn: impl Into<String>) -> Self {
        Self {
            fqn: fqn.into(),
            q_op_infos: BTreeMap::new(),
            nonq_op_infos: Vec::new(),
            tensor_id_to_observer: BTreeMap::new(),
            weight_tensor_id_to_observer: BTreeMap::new(),
            tensor_id_to_scale_zp: BTreeMap::new(),
            weight_tensor_id_to_scale_zp: BTreeMap::new(),
            output_qtensor_infos: Vec::new(),
            idx_to_op_convert_info: BTreeMap::new(),
            cur_op_idx: 0,
            cur_nonq_idx: 0,
            first_call_complete: false,
        }
    }

    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    pub fn q_op_infos(&self) -> &BTreeMap<usize, SeenQOpInfo> {
        &self.q_op_infos
    }

    pub fn q_op_info(&self, idx: usize) -> Option<&SeenQOpInfo> {
        self.q_op_infos.get(&idx)
    }

    pub fn nonq_op_infos(&self) -> &[SeenNonQOpInfo] {
        &self.nonq_op_infos
    }

    pub fn output_qtensor_infos(&self) -> &[Option<TensorInfo>] {
        &self.output_qtensor_infos
    }

    pub fn tensor_id_to_scale_zp(&self) -> &BTreeMap<u64, QParams> {
        &self.tensor_id_to_scale_zp
    }

    pub fn weight_tensor_id_to_scale_zp(&self) -> &BTreeMap<WeightKey, QParams> {
        &self.weight_tensor_id_to_scale_zp
    }

    pub fn scale_zp(&self, id: u64) -> Option<&QParams> {
        self.tensor_id_to_scale_zp.get(&id)
    }

    pub fn weight_scale_zp(&self, key: WeightKey) -> Option<&QParams> {
        self.weight_tensor_id_to_scale_zp.get(&key)
    }

    pub fn observer(&self, id: u64) -> Option<&Observer> {
        self.tensor_id_to_observer.get(&id)
    }

    pub fn weight_observer(&self, key: WeightKey) -> Option<&Observer> {
        self.weight_tensor_id_to_observer.get(&key)
    }

    pub fn num_observers(&self) -> usize {
        self.tensor_id_to_observer.len() + self.weight_tensor_id_to_observer.len()
    }

    pub fn is_first_call(&self) -> bool {
        !self.first_call_complete
    }

    pub fn is_empty(&self) -> bool {
        self.q_op_infos.is_empty() && self.nonq_op_infos.is_empty()
    }

    /// Freeze the record layout once the first full pass is over
    pub fn mark_first_call_complete(&mut self) {
        self.first_call_complete = true;
    }

    /// Rewind the per-call cursors; called on every entry into the scope
    pub fn reset_to_new_call(&mut self) {
        self.cur_op_idx = 0;
        self.cur_nonq_idx = 0;
    }

    /// On a repeat call, fail if the scope exits before reaching every
    /// recorded op
    pub fn check_call_complete(&self) -> Result<()> {
        if !self.first_call_complete {
            return Ok(());
        }
        if let Some(seen) = self.q_op_infos.get(&self.cur_op_idx) {
            return Err(self.mismatch(
                self.cur_op_idx,
                format!("{} at '{}'", seen.op_type, seen.fqn),
                "end of scope".to_string(),
            ));
        }
        if let Some(seen) = self.nonq_op_infos.get(self.cur_nonq_idx) {
            return Err(self.mismatch(
                self.cur_nonq_idx,
                format!("non-quantized {} at '{}'", seen.op_type, seen.fqn),
                "end of scope".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a call of `op` inside this scope gets operator hooks.
    ///
    /// Quantizable functions and quantizable built-in leaf modules are
    /// claimed; whether the claim agrees with what was recorded is checked by
    /// [`record_or_match`](Self::record_or_match).
    pub fn cur_op_needs_hooks(&self, op: &OpType) -> bool {
        op.kind.is_quantizable() && (!op.is_module || op.is_leaf_module())
    }

    fn mismatch(&self, index: usize, expected: String, found: String) -> Error {
        Error::StructuralMismatch {
            scope: self.fqn.clone(),
            index,
            expected,
            found,
        }
    }

    /// Record a quantizable call on the first pass, or match it against the
    /// record at the cursor on later passes. Returns the record index.
    pub fn record_or_match(
        &mut self,
        op: &OpType,
        fqn: &str,
        inputs: &[Option<Tensor>],
        num_weights: usize,
        qconfig: &QConfig,
        ids: &mut TensorIdAllocator,
    ) -> Result<usize> {
        let idx = self.cur_op_idx;

        if let Some(seen) = self.q_op_infos.get(&idx) {
            if seen.op_type.name != op.name || seen.fqn != fqn {
                return Err(self.mismatch(
                    idx,
                    format!("{} at '{}'", seen.op_type, seen.fqn),
                    format!("{op} at '{fqn}'"),
                ));
            }
            return Ok(idx);
        }

        if self.first_call_complete {
            return Err(self.mismatch(
                idx,
                "end of recorded ops".to_string(),
                format!("{op} at '{fqn}'"),
            ));
        }

        let act_dtype = qconfig.activation.dtype;
        let input_tensor_infos: Vec<Option<TensorInfo>> = inputs
            .iter()
            .map(|slot| {
                slot.as_ref().map(|t| {
                    let (id, orig_dtype) = match t.info() {
                        Some(info) => (info.id, info.orig_dtype),
                        None => (ids.next_id(), t.dtype()),
                    };
                    TensorInfo::new(id, orig_dtype, act_dtype)
                })
            })
            .collect();
        let weight_tensor_infos = (0..num_weights)
            .map(|i| Some(TensorInfo::new(i as u64, Dtype::Float32, qconfig.weight.dtype)))
            .collect();

        for info in input_tensor_infos.iter().flatten() {
            if !self.tensor_id_to_observer.contains_key(&info.id) {
                self.tensor_id_to_observer
                    .insert(info.id, qconfig.activation.build()?);
            }
        }
        for i in 0..num_weights {
            self.weight_tensor_id_to_observer
                .insert(WeightKey::new(idx, i as u64), qconfig.weight.build()?);
        }

        tracing::debug!(scope = %self.fqn, idx, op = %op, fqn, "recorded quantizable op");
        self.q_op_infos.insert(
            idx,
            SeenQOpInfo {
                idx,
                op_type: op.clone(),
                fqn: fqn.to_string(),
                input_tensor_infos,
                weight_tensor_infos,
                output_tensor_infos: Vec::new(),
                qconfig: qconfig.clone(),
            },
        );
        Ok(idx)
    }

    /// Attach output descriptors of record `idx` to `outputs` (assigning new
    /// ids the first time) and advance the cursor.
    pub fn record_outputs(
        &mut self,
        idx: usize,
        outputs: &mut [Tensor],
        ids: &mut TensorIdAllocator,
    ) -> Result<()> {
        let recorded = self
            .q_op_infos
            .get(&idx)
            .map(|r| (r.output_tensor_infos.clone(), r.qconfig.activation.clone()))
            .ok_or_else(|| Error::InvalidState(format!("no op record {idx} in '{}'", self.fqn)))?;
        let (infos, act_spec) = recorded;

        if infos.is_empty() && !outputs.is_empty() {
            let mut new_infos = Vec::with_capacity(outputs.len());
            for t in outputs.iter_mut() {
                let info = TensorInfo::new(ids.next_id(), t.dtype(), act_spec.dtype);
                if !self.tensor_id_to_observer.contains_key(&info.id) {
                    self.tensor_id_to_observer.insert(info.id, act_spec.build()?);
                }
                t.set_info(info);
                new_infos.push(Some(info));
            }
            if let Some(record) = self.q_op_infos.get_mut(&idx) {
                record.output_tensor_infos = new_infos;
            }
        } else {
            if infos.len() != outputs.len() {
                return Err(self.mismatch(
                    idx,
                    format!("{} outputs", infos.len()),
                    format!("{} outputs", outputs.len()),
                ));
            }
            for (t, info) in outputs.iter_mut().zip(&infos) {
                if let Some(info) = info {
                    t.set_info(*info);
                }
            }
        }

        self.cur_op_idx = idx + 1;
        Ok(())
    }

    /// Non-quantizable counterpart of [`record_or_match`](Self::record_or_match)
    pub fn record_or_match_nonq(
        &mut self,
        op: &OpType,
        fqn: &str,
        inputs: &[Option<Tensor>],
        ids: &mut TensorIdAllocator,
    ) -> Result<usize> {
        let idx = self.cur_nonq_idx;

        if let Some(seen) = self.nonq_op_infos.get(idx) {
            if seen.op_type.name != op.name || seen.fqn != fqn {
                return Err(self.mismatch(
                    idx,
                    format!("non-quantized {} at '{}'", seen.op_type, seen.fqn),
                    format!("{op} at '{fqn}'"),
                ));
            }
            return Ok(idx);
        }

        if self.first_call_complete {
            return Err(self.mismatch(
                idx,
                "end of recorded non-quantized ops".to_string(),
                format!("{op} at '{fqn}'"),
            ));
        }

        let input_tensor_infos = inputs
            .iter()
            .map(|slot| {
                slot.as_ref().map(|t| {
                    let (id, orig_dtype) = match t.info() {
                        Some(info) => (info.id, info.orig_dtype),
                        None => (ids.next_id(), t.dtype()),
                    };
                    TensorInfo::new(id, orig_dtype, Dtype::Float32)
                })
            })
            .collect();

        tracing::debug!(scope = %self.fqn, idx, op = %op, fqn, "recorded non-quantizable op");
        self.nonq_op_infos.push(SeenNonQOpInfo {
            op_type: op.clone(),
            fqn: fqn.to_string(),
            input_tensor_infos,
            output_tensor_infos: Vec::new(),
        });
        Ok(idx)
    }

    pub fn record_nonq_outputs(
        &mut self,
        idx: usize,
        outputs: &mut [Tensor],
        ids: &mut TensorIdAllocator,
    ) -> Result<()> {
        let infos = self
            .nonq_op_infos
            .get(idx)
            .map(|r| r.output_tensor_infos.clone())
            .ok_or_else(|| {
                Error::InvalidState(format!("no non-quantized record {idx} in '{}'", self.fqn))
            })?;

        if infos.is_empty() && !outputs.is_empty() {
            let new_infos = outputs
                .iter_mut()
                .map(|t| {
                    let info = TensorInfo::new(ids.next_id(), t.dtype(), Dtype::Float32);
                    t.set_info(info);
                    Some(info)
                })
                .collect();
            self.nonq_op_infos[idx].output_tensor_infos = new_infos;
        } else {
            if infos.len() != outputs.len() {
                return Err(self.mismatch(
                    idx,
                    format!("{} outputs", infos.len()),
                    format!("{} outputs", outputs.len()),
                ));
            }
            for (t, info) in outputs.iter_mut().zip(&infos) {
                if let Some(info) = info {
                    t.set_info(*info);
                }
            }
        }

        self.cur_nonq_idx = idx + 1;
        Ok(())
    }

    /// Record the scope's outputs on the first call, attach the recorded
    /// descriptors on later calls.
    pub fn record_layer_outputs(&mut self, outputs: &mut [Tensor], ids: &mut TensorIdAllocator) {
        if self.first_call_complete || !self.output_qtensor_infos.is_empty() {
            for (t, info) in outputs.iter_mut().zip(&self.output_qtensor_infos) {
                if let Some(info) = info {
                    t.set_info(*info);
                }
            }
            return;
        }
        self.output_qtensor_infos = outputs
            .iter_mut()
            .map(|t| {
                let info = match t.info() {
                    Some(info) => *info,
                    None => TensorInfo::new(ids.next_id(), t.dtype(), t.dtype()),
                };
                t.set_info(info);
                Some(info)
            })
            .collect();
    }

    /// Feed a live activation into its observer; ids without one are ignored
    pub fn observe(&mut self, id: u64, tensor: &Tensor) {
        if let Some(observer) = self.tensor_id_to_observer.get_mut(&id) {
            observer.observe(tensor);
        }
    }

    pub fn observe_weight(&mut self, key: WeightKey, tensor: &Tensor) {
        if let Some(observer) = self.weight_tensor_id_to_observer.get_mut(&key) {
            observer.observe(tensor);
        }
    }

    /// Turn observer statistics into scale/zero-point for every observer
    /// targeting a quantized precision, then drop all observers.
    pub fn finalize_parameters(&mut self) {
        for (id, observer) in &self.tensor_id_to_observer {
            if observer.dtype().is_quantized() {
                if let Some(qparams) = observer.calculate_qparams() {
                    self.tensor_id_to_scale_zp.insert(*id, qparams);
                }
            }
        }
        for (key, observer) in &self.weight_tensor_id_to_observer {
            if observer.dtype().is_quantized() {
                if let Some(qparams) = observer.calculate_qparams() {
                    self.weight_tensor_id_to_scale_zp.insert(*key, qparams);
                }
            }
        }
        tracing::debug!(
            scope = %self.fqn,
            activations = self.tensor_id_to_scale_zp.len(),
            weights = self.weight_tensor_id_to_scale_zp.len(),
            "finalized qparams"
        );
        self.tensor_id_to_observer.clear();
        self.weight_tensor_id_to_observer.clear();
        self.idx_to_op_convert_info.clear();
    }

    /// Recreate observers from each record's qconfig
    pub fn insert_observers(&mut self) -> Result<()> {
        self.tensor_id_to_observer.clear();
        self.weight_tensor_id_to_observer.clear();
        for (idx, record) in &self.q_op_infos {
            let act = &record.qconfig.activation;
            for info in record
                .input_tensor_infos
                .iter()
                .chain(&record.output_tensor_infos)
                .flatten()
            {
                if !self.tensor_id_to_observer.contains_key(&info.id) {
                    self.tensor_id_to_observer.insert(info.id, act.build()?);
                }
            }
            for info in record.weight_tensor_infos.iter().flatten() {
                self.weight_tensor_id_to_observer.insert(
                    WeightKey::new(*idx, info.id),
                    record.qconfig.weight.build()?,
                );
            }
        }
        Ok(())
    }

    /// Derive the runtime actions for one record
    pub fn compute_convert_info(&self, record: &SeenQOpInfo) -> OpConvertInfo {
        let activation_action = |info: &Option<TensorInfo>, fallback: TensorAction| match info {
            None => TensorAction::Passthrough,
            Some(info) => match (
                self.tensor_id_to_scale_zp.get(&info.id),
                effective_range(&record.qconfig.activation, info.inf_dtype),
            ) {
                (Some(qparams), Some(quant_range)) => TensorAction::Quantize {
                    qparams: qparams.clone(),
                    dtype: info.inf_dtype,
                    quant_range,
                },
                _ => fallback,
            },
        };

        let inputs = record
            .input_tensor_infos
            .iter()
            .map(|info| activation_action(info, TensorAction::Dequantize))
            .collect();
        let outputs = record
            .output_tensor_infos
            .iter()
            .map(|info| activation_action(info, TensorAction::Passthrough))
            .collect();
        let weights = record
            .weight_tensor_infos
            .iter()
            .map(|info| match info {
                Some(info) => match (
                    self.weight_tensor_id_to_scale_zp
                        .get(&WeightKey::new(record.idx, info.id)),
                    effective_range(&record.qconfig.weight, info.inf_dtype),
                ) {
                    (Some(qparams), Some(quant_range)) => TensorAction::Quantize {
                        qparams: qparams.clone(),
                        dtype: info.inf_dtype,
                        quant_range,
                    },
                    _ => TensorAction::Passthrough,
                },
                None => TensorAction::Passthrough,
            })
            .collect();

        OpConvertInfo {
            inputs,
            weights,
            outputs,
        }
    }

    /// Conversion info for record `idx`, computed once and cached
    pub fn convert_info(&mut self, idx: usize) -> Result<&OpConvertInfo> {
        if !self.idx_to_op_convert_info.contains_key(&idx) {
            let record = self
                .q_op_infos
                .get(&idx)
                .ok_or_else(|| Error::InvalidState(format!("no op record {idx} in '{}'", self.fqn)))?;
            let info = self.compute_convert_info(record);
            self.idx_to_op_convert_info.insert(idx, info);
        }
        self.idx_to_op_convert_info
            .get(&idx)
            .ok_or_else(|| Error::InvalidState(format!("no convert info for op {idx}")))
    }

    /// Precompute conversion info for every record
    pub fn attach_op_convert_info(&mut self) {
        let infos: BTreeMap<usize, OpConvertInfo> = self
            .q_op_infos
            .iter()
            .map(|(idx, record)| (*idx, self.compute_convert_info(record)))
            .collect();
        self.idx_to_op_convert_info = infos;
    }

    /// Actions applied to the scope's outputs on a converted pass: outputs
    /// that started life in plain precision leave the scope dequantized
    pub fn layer_output_actions(&self) -> Vec<TensorAction> {
        self.output_qtensor_infos
            .iter()
            .map(|info| match info {
                Some(info) if !info.orig_dtype.is_quantized() => TensorAction::Dequantize,
                _ => TensorAction::Passthrough,
            })
            .collect()
    }

    pub fn has_convert_info(&self, idx: usize) -> bool {
        self.idx_to_op_convert_info.contains_key(&idx)
    }

    /// Overwrite an existing activation entry; returns whether one existed
    pub(crate) fn sync_scale_zp(&mut self, id: u64, qparams: &QParams) -> bool {
        match self.tensor_id_to_scale_zp.get_mut(&id) {
            Some(slot) => {
                *slot = qparams.clone();
                self.idx_to_op_convert_info.clear();
                true
            }
            None => false,
        }
    }

    /// Replace descriptors, qconfigs and parameters wholesale with a
    /// validated document (used by the qconf loader)
    pub(crate) fn overwrite(&mut self, loaded: LoadedState) {
        for (idx, record) in loaded.q_op_infos {
            if let Some(live) = self.q_op_infos.get_mut(&idx) {
                live.input_tensor_infos = record.input_tensor_infos;
                live.weight_tensor_infos = record.weight_tensor_infos;
                live.output_tensor_infos = record.output_tensor_infos;
                live.qconfig = record.qconfig;
            }
        }
        for (idx, record) in loaded.nonq_op_infos {
            if let Some(live) = self.nonq_op_infos.get_mut(idx) {
                live.input_tensor_infos = record.input_tensor_infos;
                live.output_tensor_infos = record.output_tensor_infos;
            }
        }
        self.tensor_id_to_scale_zp = loaded.tensor_id_to_scale_zp;
        self.weight_tensor_id_to_scale_zp = loaded.weight_tensor_id_to_scale_zp;
        self.output_qtensor_infos = loaded.output_qtensor_infos;
        self.idx_to_op_convert_info.clear();
        self.first_call_complete = true;
    }

    /// Largest tensor id referenced anywhere in this scope
    pub fn max_tensor_id(&self) -> Option<u64> {
        let q = self.q_op_infos.values().flat_map(|r| {
            r.input_tensor_infos
                .iter()
                .chain(&r.output_tensor_infos)
                .flatten()
                .map(|t| t.id)
        });
        let nonq = self.nonq_op_infos.iter().flat_map(|r| {
            r.input_tensor_infos
                .iter()
                .chain(&r.output_tensor_infos)
                .flatten()
                .map(|t| t.id)
        });
        let outs = self.output_qtensor_infos.iter().flatten().map(|t| t.id);
        q.chain(nonq).chain(outs).max()
    }
}

/// Code range the observer fitted parameters for; `None` for plain dtypes.
/// A descriptor whose dtype differs from the observer's falls back to the
/// full range of that dtype.
fn effective_range(spec: &ObserverSpec, dtype: Dtype) -> Option<(i64, i64)> {
    if !dtype.is_quantized() {
        return None;
    }
    if spec.dtype == dtype {
        spec.quant_range()
    } else {
        dtype.quant_range(false)
    }
}

/// Decoded replacement for a live scope, validated before it is applied
#[derive(Debug, Clone, Default)]
pub(crate) struct LoadedState {
    pub q_op_infos: Vec<(usize, LoadedQOp)>,
    pub nonq_op_infos: Vec<(usize, LoadedNonQOp)>,
    pub tensor_id_to_scale_zp: BTreeMap<u64, QParams>,
    pub weight_tensor_id_to_scale_zp: BTreeMap<WeightKey, QParams>,
    pub output_qtensor_infos: Vec<Option<TensorInfo>>,
}

#[derive(Debug, Clone)]
pub(crate) struct LoadedQOp {
    pub input_tensor_infos: Vec<Option<TensorInfo>>,
    pub weight_tensor_infos: Vec<Option<TensorInfo>>,
    pub output_tensor_infos: Vec<Option<TensorInfo>>,
    pub qconfig: QConfig,
}

#[derive(Debug, Clone)]
pub(crate) struct LoadedNonQOp {
    pub input_tensor_infos: Vec<Option<TensorInfo>>,
    pub output_tensor_infos: Vec<Option<TensorInfo>>,
}
