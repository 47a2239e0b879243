//! Hook classification for operator and module calls

use crate::model::ModuleScope;
use crate::op::OpType;
use crate::state::QuantizationState;

/// Which instrumentation a call receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    /// Observe (calibrating) or substitute quantized tensors (converted)
    /// around a quantizable op
    OpHooks,
    /// Enter a module scope that owns its own quantization state
    ModuleIoHooks,
    /// Convert stray quantized arguments back to plain precision
    ArgDequants,
    /// Pass through untouched
    None,
}

/// Classify a functional call made inside a scope.
pub fn function_hook_type(parent: Option<&QuantizationState>, op: &OpType) -> HookType {
    match parent {
        Some(state) if state.cur_op_needs_hooks(op) => HookType::OpHooks,
        Some(_) => HookType::ArgDequants,
        None => HookType::None,
    }
}

/// Classify a sub-module call. The result is cached on the child scope, so
/// the decision is made once per module.
///
/// A quantizable leaf module claimed by its parent gets operator hooks and
/// never IO hooks, even if it were to own a state of its own.
pub fn module_hook_type(
    parent: Option<&QuantizationState>,
    child: &ModuleScope,
    child_state: Option<&QuantizationState>,
) -> HookType {
    if let Some(cached) = child.cached_hook_type() {
        return cached;
    }

    let needs_op_hooks = parent.is_some_and(|state| state.cur_op_needs_hooks(child.op_type()));
    let result = if needs_op_hooks {
        HookType::OpHooks
    } else if child_state.is_some() {
        HookType::ModuleIoHooks
    } else if parent.is_some() {
        HookType::ArgDequants
    } else {
        HookType::None
    };

    child.cache_hook_type(result);
    result
}
