//! Forward-pass driver performing hook actions inline

use super::hook::{function_hook_type, module_hook_type, HookType};
use crate::model::{AutoQuantizer, Phase, ScopeId};
use crate::op::OpType;
use crate::state::{apply_actions, QuantizationState};
use crate::tensor::{Tensor, TensorInfo, WeightKey};
use crate::{Error, Result};

/// One forward pass over a prepared model
///
/// The host's forward code calls [`call_function`](Trace::call_function) for
/// every functional op and [`call_module`](Trace::call_module) for every
/// sub-module; kernels stay with the caller.
pub struct Trace<'a> {
    quantizer: &'a mut AutoQuantizer,
}

impl<'a> Trace<'a> {
    pub(crate) fn new(quantizer: &'a mut AutoQuantizer) -> Self {
        Self { quantizer }
    }

    pub fn phase(&self) -> Phase {
        self.quantizer.phase
    }

    fn state_mut(&mut self, fqn: &str) -> Result<&mut QuantizationState> {
        self.quantizer
            .states
            .get_mut(fqn)
            .ok_or_else(|| Error::InvalidState(format!("no quantization state for '{fqn}'")))
    }

    /// Run a functional op called from inside `scope`
    pub fn call_function<K>(
        &mut self,
        scope: ScopeId,
        op: &OpType,
        inputs: Vec<Option<Tensor>>,
        weights: Vec<Tensor>,
        kernel: K,
    ) -> Result<Vec<Tensor>>
    where
        K: FnOnce(Vec<Option<Tensor>>, Vec<Tensor>) -> Result<Vec<Tensor>>,
    {
        let fqn = self.quantizer.tree.get(scope)?.fqn().to_string();
        let hook = function_hook_type(self.quantizer.states.get(&fqn), op);
        tracing::debug!(scope = %fqn, op = %op, ?hook, "function call");

        match hook {
            HookType::OpHooks => {
                self.run_op_hooks(&fqn, op, &fqn, inputs, weights, |_, i, w| kernel(i, w))
            }
            HookType::ArgDequants => {
                self.run_arg_dequants(&fqn, op, &fqn, inputs, weights, |_, i, w| kernel(i, w))
            }
            HookType::ModuleIoHooks | HookType::None => kernel(inputs, weights),
        }
    }

    /// Run sub-module `child`. For leaf modules `forward` is the kernel; for
    /// containers it issues further calls on the trace.
    pub fn call_module<F>(
        &mut self,
        child: ScopeId,
        inputs: Vec<Option<Tensor>>,
        weights: Vec<Tensor>,
        forward: F,
    ) -> Result<Vec<Tensor>>
    where
        F: FnOnce(&mut Self, Vec<Option<Tensor>>, Vec<Tensor>) -> Result<Vec<Tensor>>,
    {
        let (hook, child_fqn, parent_fqn, op) = {
            let tree = &self.quantizer.tree;
            let states = &self.quantizer.states;
            let scope = tree.get(child)?;
            let parent_fqn = match scope.parent() {
                Some(parent) => Some(tree.get(parent)?.fqn().to_string()),
                None => None,
            };
            let parent_state = parent_fqn.as_deref().and_then(|p| states.get(p));
            let hook = module_hook_type(parent_state, scope, states.get(scope.fqn()));
            (
                hook,
                scope.fqn().to_string(),
                parent_fqn,
                scope.op_type().clone(),
            )
        };
        tracing::debug!(module = %child_fqn, op = %op, ?hook, "module call");

        match (hook, parent_fqn) {
            (HookType::OpHooks, Some(parent)) => {
                self.run_op_hooks(&parent, &op, &child_fqn, inputs, weights, forward)
            }
            (HookType::ArgDequants, Some(parent)) => {
                self.run_arg_dequants(&parent, &op, &child_fqn, inputs, weights, forward)
            }
            (HookType::ModuleIoHooks, _) => self.run_module_io(&child_fqn, inputs, weights, forward),
            _ => forward(self, inputs, weights),
        }
    }

    pub(crate) fn run_root<F>(&mut self, inputs: Vec<Option<Tensor>>, forward: F) -> Result<Vec<Tensor>>
    where
        F: FnOnce(&mut Self, Vec<Option<Tensor>>) -> Result<Vec<Tensor>>,
    {
        let root = self.quantizer.tree.root();
        let fqn = self.quantizer.tree.get(root)?.fqn().to_string();
        self.run_module_io(&fqn, inputs, Vec::new(), |trace, i, _| forward(trace, i))
    }

    fn run_op_hooks<K>(
        &mut self,
        scope_fqn: &str,
        op: &OpType,
        op_fqn: &str,
        inputs: Vec<Option<Tensor>>,
        weights: Vec<Tensor>,
        kernel: K,
    ) -> Result<Vec<Tensor>>
    where
        K: FnOnce(&mut Self, Vec<Option<Tensor>>, Vec<Tensor>) -> Result<Vec<Tensor>>,
    {
        let phase = self.quantizer.phase;
        let idx = {
            let q = &mut *self.quantizer;
            let state = q
                .states
                .get_mut(scope_fqn)
                .ok_or_else(|| Error::InvalidState(format!("no quantization state for '{scope_fqn}'")))?;
            state.record_or_match(op, op_fqn, &inputs, weights.len(), &q.qconfig, &mut q.ids)?
        };

        match phase {
            Phase::Calibrating => {
                let inputs: Vec<Option<Tensor>> = inputs
                    .into_iter()
                    .map(|slot| slot.map(|t| t.dequantize()))
                    .collect();
                {
                    let state = self.state_mut(scope_fqn)?;
                    let input_ids: Vec<Option<u64>> = state
                        .q_op_info(idx)
                        .map(|r| r.input_tensor_infos.iter().map(|i| i.map(|t| t.id)).collect())
                        .unwrap_or_default();
                    for (slot, id) in inputs.iter().zip(input_ids) {
                        if let (Some(t), Some(id)) = (slot, id) {
                            state.observe(id, t);
                        }
                    }
                    for (i, w) in weights.iter().enumerate() {
                        state.observe_weight(WeightKey::new(idx, i as u64), w);
                    }
                }

                let mut outputs = kernel(self, inputs, weights)?;

                let q = &mut *self.quantizer;
                let state = q
                    .states
                    .get_mut(scope_fqn)
                    .ok_or_else(|| Error::InvalidState(format!("no quantization state for '{scope_fqn}'")))?;
                state.record_outputs(idx, &mut outputs, &mut q.ids)?;
                for t in &outputs {
                    if let Some(info) = t.info() {
                        state.observe(info.id, t);
                    }
                }
                Ok(outputs)
            }
            Phase::Converted => {
                let plan = self.state_mut(scope_fqn)?.convert_info(idx)?.clone();
                let inputs = apply_actions(&plan.inputs, inputs, |action, slot| {
                    slot.map(|t| action.apply(t)).transpose()
                })?;
                let weights = apply_actions(&plan.weights, weights, |action, t| action.apply(t))?;

                let mut outputs = kernel(self, inputs, weights)?;

                let q = &mut *self.quantizer;
                let state = q
                    .states
                    .get_mut(scope_fqn)
                    .ok_or_else(|| Error::InvalidState(format!("no quantization state for '{scope_fqn}'")))?;
                state.record_outputs(idx, &mut outputs, &mut q.ids)?;
                apply_actions(&plan.outputs, outputs, |action, t| action.apply(t))
            }
        }
    }

    fn run_arg_dequants<K>(
        &mut self,
        scope_fqn: &str,
        op: &OpType,
        op_fqn: &str,
        inputs: Vec<Option<Tensor>>,
        weights: Vec<Tensor>,
        kernel: K,
    ) -> Result<Vec<Tensor>>
    where
        K: FnOnce(&mut Self, Vec<Option<Tensor>>, Vec<Tensor>) -> Result<Vec<Tensor>>,
    {
        let inputs: Vec<Option<Tensor>> = inputs
            .into_iter()
            .map(|slot| slot.map(|t| t.dequantize()))
            .collect();

        let idx = {
            let q = &mut *self.quantizer;
            let state = q
                .states
                .get_mut(scope_fqn)
                .ok_or_else(|| Error::InvalidState(format!("no quantization state for '{scope_fqn}'")))?;
            state.record_or_match_nonq(op, op_fqn, &inputs, &mut q.ids)?
        };

        let mut outputs = kernel(self, inputs, weights)?;

        let q = &mut *self.quantizer;
        let state = q
            .states
            .get_mut(scope_fqn)
            .ok_or_else(|| Error::InvalidState(format!("no quantization state for '{scope_fqn}'")))?;
        state.record_nonq_outputs(idx, &mut outputs, &mut q.ids)?;
        Ok(outputs)
    }

    fn run_module_io<F>(
        &mut self,
        fqn: &str,
        mut inputs: Vec<Option<Tensor>>,
        weights: Vec<Tensor>,
        forward: F,
    ) -> Result<Vec<Tensor>>
    where
        F: FnOnce(&mut Self, Vec<Option<Tensor>>, Vec<Tensor>) -> Result<Vec<Tensor>>,
    {
        {
            let q = &mut *self.quantizer;
            let state = q
                .states
                .get_mut(fqn)
                .ok_or_else(|| Error::InvalidState(format!("no quantization state for '{fqn}'")))?;
            state.reset_to_new_call();
            if state.is_first_call() {
                for t in inputs.iter_mut().flatten() {
                    if t.info().is_none() {
                        t.set_info(TensorInfo::new(q.ids.next_id(), t.dtype(), t.dtype()));
                    }
                }
            }
        }

        let mut outputs = forward(self, inputs, weights)?;

        let phase = self.quantizer.phase;
        let q = &mut *self.quantizer;
        let state = q
            .states
            .get_mut(fqn)
            .ok_or_else(|| Error::InvalidState(format!("no quantization state for '{fqn}'")))?;
        state.check_call_complete()?;
        state.record_layer_outputs(&mut outputs, &mut q.ids);
        match phase {
            Phase::Calibrating => Ok(outputs),
            Phase::Converted => {
                let actions = state.layer_output_actions();
                apply_actions(&actions, outputs, |action, t| action.apply(t))
            }
        }
    }
}
