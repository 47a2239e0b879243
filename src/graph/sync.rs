//! Pooling scale synchronization
//!
//! Pooling and flatten never change values, so their outputs must carry the
//! parameters of the tensor feeding the chain. Otherwise a quantized pool
//! would requantize for nothing.

use super::build::{DependencyGraph, OpNode};
use crate::op::OpKind;
use crate::state::QuantStateMap;
use crate::tensor::QParams;
use std::collections::BTreeSet;

fn is_chain_op(op: &OpNode) -> bool {
    op.op_type.kind.preserves_qparams()
}

fn live_scale_zp<'a>(states: &'a QuantStateMap, scope: &str, id: u64) -> Option<&'a QParams> {
    states.get(scope).and_then(|s| s.scale_zp(id))
}

/// Align every pooling chain's output parameters with its input. Returns the
/// number of scale entries overwritten.
pub fn sync_pool_scale_zp(states: &mut QuantStateMap, graph: &DependencyGraph) -> usize {
    let mut overwritten = 0;

    for (start, node) in graph.op_nodes() {
        if !node.quantized || node.op_type.kind != OpKind::Pooling {
            continue;
        }
        let (Some(in_id), Some(out_id)) = (node.first_input_id(), node.first_output_id()) else {
            continue;
        };
        match (
            live_scale_zp(states, &node.scope, in_id),
            live_scale_zp(states, &node.scope, out_id),
        ) {
            (Some(input), Some(output)) if input != output => {}
            _ => continue,
        }

        // Walk back to the head of the chain
        let mut begin = start;
        for _ in 0..graph.len() {
            let Some(op) = graph.op(begin) else { break };
            match op.predecessors.as_slice() {
                [only] if graph.op(*only).is_some_and(is_chain_op) => begin = *only,
                _ => break,
            }
        }
        let Some(head) = graph.op(begin) else {
            continue;
        };

        let Some(truth) = head
            .first_input_id()
            .and_then(|id| live_scale_zp(states, &head.scope, id))
            .cloned()
        else {
            tracing::debug!(fqn = %head.fqn, "pooling chain head has no input parameters");
            continue;
        };

        let mut ids = Vec::new();
        ids.extend(head.first_output_id());
        let mut visited = BTreeSet::from([begin]);
        collect_chain_outputs(graph, begin, &mut visited, &mut ids);

        for id in ids {
            for state in states.values_mut() {
                if state.sync_scale_zp(id, &truth) {
                    overwritten += 1;
                }
            }
        }
        tracing::debug!(fqn = %node.fqn, head = %head.fqn, "synced pooling chain");
    }

    overwritten
}

fn collect_chain_outputs(
    graph: &DependencyGraph,
    from: usize,
    visited: &mut BTreeSet<usize>,
    ids: &mut Vec<u64>,
) {
    let Some(op) = graph.op(from) else { return };
    for &next in &op.successors {
        let Some(next_op) = graph.op(next) else { continue };
        if !is_chain_op(next_op) || !visited.insert(next) {
            continue;
        }
        ids.extend(next_op.first_output_id());
        collect_chain_outputs(graph, next, visited, ids);
    }
}
