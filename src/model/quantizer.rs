//! Top-level registry and lifecycle

use super::tree::ModuleTree;
use crate::config::AutoQuantConfig;
use crate::dispatch::Trace;
use crate::graph::{sync_pool_scale_zp, DependencyGraph};
use crate::observer::QConfig;
use crate::persist::{load_qconf_summary, save_quant_state, QConfSummary, SaveConfig};
use crate::state::{QuantStateMap, QuantizationState, TensorIdAllocator};
use crate::tensor::Tensor;
use crate::{Error, Result};
use std::fmt;
use std::path::Path;

/// Whether passes observe or run quantized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Calibrating,
    Converted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Calibrating => f.write_str("calibrating"),
            Phase::Converted => f.write_str("converted"),
        }
    }
}

/// A prepared model: hierarchy, per-scope state and lifecycle phase
#[derive(Debug, Clone)]
pub struct AutoQuantizer {
    pub(crate) tree: ModuleTree,
    pub(crate) states: QuantStateMap,
    pub(crate) qconfig: QConfig,
    pub(crate) ids: TensorIdAllocator,
    pub(crate) phase: Phase,
    sync_pool_scales: bool,
    passes: usize,
}

impl AutoQuantizer {
    /// Attach a quantization state to the root and every container scope.
    /// Leaf modules are treated as operators of their parent.
    pub fn prepare(tree: ModuleTree, qconfig: QConfig) -> Self {
        let root = tree.root();
        let states: QuantStateMap = tree
            .iter()
            .filter(|(id, scope)| *id == root || !scope.is_leaf())
            .map(|(_, scope)| (scope.fqn().to_string(), QuantizationState::new(scope.fqn())))
            .collect();
        tracing::info!(scopes = states.len(), modules = tree.len(), "prepared model");

        Self {
            tree,
            states,
            qconfig,
            ids: TensorIdAllocator::new(),
            phase: Phase::Calibrating,
            sync_pool_scales: true,
            passes: 0,
        }
    }

    /// Prepare with the qconfig and calibration options of a run config
    pub fn from_config(tree: ModuleTree, config: &AutoQuantConfig) -> Result<Self> {
        let qconfig = config.qconfig.to_qconfig()?;
        Ok(Self::prepare(tree, qconfig).with_sync_pool_scales(config.calibration.sync_pool_scales))
    }

    pub fn with_sync_pool_scales(mut self, enabled: bool) -> Self {
        self.sync_pool_scales = enabled;
        self
    }

    pub fn tree(&self) -> &ModuleTree {
        &self.tree
    }

    pub fn states(&self) -> &QuantStateMap {
        &self.states
    }

    pub fn state(&self, fqn: &str) -> Option<&QuantizationState> {
        self.states.get(fqn)
    }

    pub fn qconfig(&self) -> &QConfig {
        &self.qconfig
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_converted(&self) -> bool {
        self.phase == Phase::Converted
    }

    /// Completed passes since preparation or the last recalibration
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn sync_pool_scales(&self) -> bool {
        self.sync_pool_scales
    }

    /// Run one forward pass. `forward` is the root module's body; it calls
    /// back into the [`Trace`] for every op and sub-module.
    pub fn run<F>(&mut self, inputs: Vec<Tensor>, forward: F) -> Result<Vec<Tensor>>
    where
        F: for<'t> FnOnce(&mut Trace<'t>, Vec<Option<Tensor>>) -> Result<Vec<Tensor>>,
    {
        let inputs = inputs.into_iter().map(Some).collect();
        let outputs = Trace::new(self).run_root(inputs, forward)?;

        if self.passes == 0 {
            for state in self.states.values_mut() {
                state.mark_first_call_complete();
            }
        }
        self.passes += 1;
        tracing::debug!(pass = self.passes, phase = %self.phase, "forward pass complete");
        Ok(outputs)
    }

    /// Compute qparams from the collected statistics, reconcile pooling
    /// parameters and switch to converted passes.
    pub fn finalize(&mut self) -> Result<()> {
        if self.phase == Phase::Converted {
            return Err(Error::InvalidState("model is already converted".to_string()));
        }
        if self.passes == 0 {
            return Err(Error::InvalidState(
                "finalize called before any calibration pass".to_string(),
            ));
        }

        for state in self.states.values_mut() {
            state.finalize_parameters();
        }
        let synced = if self.sync_pool_scales {
            let graph = DependencyGraph::build(&self.states);
            sync_pool_scale_zp(&mut self.states, &graph)
        } else {
            0
        };
        for state in self.states.values_mut() {
            state.attach_op_convert_info();
        }
        self.phase = Phase::Converted;

        let activations: usize = self.states.values().map(|s| s.tensor_id_to_scale_zp().len()).sum();
        let weights: usize = self
            .states
            .values()
            .map(|s| s.weight_tensor_id_to_scale_zp().len())
            .sum();
        tracing::info!(
            passes = self.passes,
            activations,
            weights,
            synced,
            "finalized quantization parameters"
        );
        Ok(())
    }

    /// Go back to calibration with fresh observers, keeping the recorded
    /// structure
    pub fn recalibrate(&mut self) -> Result<()> {
        for state in self.states.values_mut() {
            state.insert_observers()?;
        }
        self.phase = Phase::Calibrating;
        self.passes = 0;
        tracing::info!("recalibrating");
        Ok(())
    }

    /// Mark the recorded structure as complete without a pass, as after a
    /// load
    pub(crate) fn freeze_structure(&mut self) -> Result<()> {
        for state in self.states.values_mut() {
            state.mark_first_call_complete();
        }
        if let Some(max) = self.states.values().filter_map(|s| s.max_tensor_id()).max() {
            self.ids.reserve_through(max)?;
        }
        Ok(())
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Current data-flow graph over all records
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::build(&self.states)
    }

    /// Persisted form of the current state
    pub fn summary(&self) -> QConfSummary {
        QConfSummary::from_states(&self.states)
    }

    pub fn save(&self, path: impl AsRef<Path>, config: &SaveConfig) -> Result<()> {
        save_quant_state(self, path, config)
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        load_qconf_summary(self, path)
    }
}
