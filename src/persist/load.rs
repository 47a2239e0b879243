//! Restoring qconf documents into a prepared model

use super::document::{decode_activations, decode_nonq_op, decode_q_op, LayerInfo, QConfSummary};
use crate::model::{AutoQuantizer, Phase};
use crate::state::{LoadedState, QuantizationState};
use crate::{Error, Result};
use std::path::Path;

/// Load a qconf document into a model that has completed at least one pass.
///
/// The format is detected from the file extension. Every scope and record
/// of the document is validated against the live model before anything is
/// written, so a rejected document leaves the model untouched.
pub fn load_qconf_summary(quantizer: &mut AutoQuantizer, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let summary = QConfSummary::read(path)?;
    apply_summary(quantizer, &summary)?;
    tracing::info!(path = %path.display(), phase = %quantizer.phase(), "loaded qconf");
    Ok(())
}

/// Validate `summary` against the live states, then apply it
pub fn apply_summary(quantizer: &mut AutoQuantizer, summary: &QConfSummary) -> Result<()> {
    let mut staged = Vec::with_capacity(quantizer.states.len());
    for (fqn, state) in &quantizer.states {
        let layer = summary
            .layer(fqn)
            .ok_or_else(|| Error::ConfigMismatch(format!("scope '{fqn}' missing from qconf")))?;
        staged.push((fqn.clone(), stage_layer(state, layer)?));
    }

    let has_params = staged
        .iter()
        .any(|(_, s)| !s.tensor_id_to_scale_zp.is_empty() || !s.weight_tensor_id_to_scale_zp.is_empty());

    for (fqn, loaded) in staged {
        if let Some(state) = quantizer.states.get_mut(&fqn) {
            state.overwrite(loaded);
        }
    }
    quantizer.freeze_structure()?;
    for state in quantizer.states.values_mut() {
        state.insert_observers()?;
        if has_params {
            state.attach_op_convert_info();
        }
    }
    quantizer.set_phase(if has_params {
        Phase::Converted
    } else {
        Phase::Calibrating
    });
    Ok(())
}

fn stage_layer(state: &QuantizationState, layer: &LayerInfo) -> Result<LoadedState> {
    let mut loaded = LoadedState::default();

    for (idx, op) in &layer.q_op_infos {
        let live = state.q_op_info(*idx).ok_or_else(|| {
            Error::ConfigMismatch(format!("scope '{}' has no op {idx}", state.fqn()))
        })?;
        if !live.op_type.matches_persisted(&op.op_type) || live.fqn != op.fqn {
            return Err(Error::ConfigMismatch(format!(
                "scope '{}' op {idx}: model has {} at '{}', qconf has {} at '{}'",
                state.fqn(),
                live.op_type,
                live.fqn,
                op.op_type,
                op.fqn
            )));
        }
        let (record, params, weight_params) = decode_q_op(op, *idx)?;
        loaded.tensor_id_to_scale_zp.extend(params);
        loaded.weight_tensor_id_to_scale_zp.extend(weight_params);
        loaded.q_op_infos.push((*idx, record));
    }

    for (idx, op) in &layer.nonq_op_infos {
        let live = state.nonq_op_infos().get(*idx).ok_or_else(|| {
            Error::ConfigMismatch(format!(
                "scope '{}' has no non-quantized op {idx}",
                state.fqn()
            ))
        })?;
        if !live.op_type.matches_persisted(&op.op_type) || live.fqn != op.fqn {
            return Err(Error::ConfigMismatch(format!(
                "scope '{}' non-quantized op {idx}: model has {} at '{}', qconf has {} at '{}'",
                state.fqn(),
                live.op_type,
                live.fqn,
                op.op_type,
                op.fqn
            )));
        }
        loaded.nonq_op_infos.push((*idx, decode_nonq_op(op)?));
    }

    let (outputs, params) = decode_activations(&layer.layer_output_infos)?;
    loaded.output_qtensor_infos = outputs;
    loaded.tensor_id_to_scale_zp.extend(params);
    Ok(loaded)
}
