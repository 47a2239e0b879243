use super::*;
use crate::model::{AutoQuantizer, ModuleTree, ScopeId};
use crate::observer::QConfig;
use crate::op::OpType;
use crate::tensor::Tensor;
use crate::Result;

fn input_tensor(inputs: &[Option<Tensor>]) -> Tensor {
    inputs[0]
        .as_ref()
        .map(Tensor::dequantize)
        .unwrap_or_else(|| Tensor::zeros(&[1]))
}

/// input -> conv -> pool -> flatten -> output
fn conv_pool_flatten(sync: bool) -> (AutoQuantizer, ScopeId, ScopeId) {
    let mut tree = ModuleTree::new("Net");
    let root = tree.root();
    let conv = tree.add_child(root, "conv", OpType::module("nn.Conv2d")).unwrap();
    let pool = tree.add_child(root, "pool", OpType::module("nn.MaxPool2d")).unwrap();
    let quantizer = AutoQuantizer::prepare(tree, QConfig::default()).with_sync_pool_scales(sync);
    (quantizer, conv, pool)
}

fn run_pass(quantizer: &mut AutoQuantizer, conv: ScopeId, pool: ScopeId, x: Vec<f32>) -> Result<Vec<Tensor>> {
    let root = quantizer.tree().root();
    quantizer.run(vec![Tensor::from_vec(x)], |trace, inputs| {
        let y = trace.call_module(conv, inputs, vec![Tensor::from_vec(vec![2.0])], |_, i, _| {
            Ok(vec![Tensor::new(input_tensor(&i).data().mapv(|v| v * 2.0))])
        })?;
        let y = trace.call_module(pool, y.into_iter().map(Some).collect(), vec![], |_, i, _| {
            let max = input_tensor(&i).data().fold(f32::MIN, |m, &v| m.max(v));
            Ok(vec![Tensor::from_vec(vec![max])])
        })?;
        trace.call_function(
            root,
            &OpType::function("torch.flatten"),
            y.into_iter().map(Some).collect(),
            vec![],
            |i, _| Ok(vec![input_tensor(&i)]),
        )
    })
}

fn output_id(quantizer: &AutoQuantizer, idx: usize) -> u64 {
    quantizer
        .state("")
        .and_then(|s| s.q_op_info(idx))
        .and_then(|r| r.output_tensor_infos[0])
        .map(|t| t.id)
        .unwrap()
}

#[test]
fn test_graph_links_by_tensor_id() {
    let (mut quantizer, conv, pool) = conv_pool_flatten(true);
    run_pass(&mut quantizer, conv, pool, vec![-0.5, 1.0, 0.25, 1.5]).unwrap();

    let graph = quantizer.dependency_graph();
    // parent node + three ops
    assert_eq!(graph.len(), 4);
    assert!(matches!(graph.nodes()[0], Node::Parent(_)));
    assert_eq!(graph.num_edges(), 2);

    let conv_node = graph.find_op("conv", "nn.Conv2d").unwrap();
    let pool_node = graph.find_op("pool", "nn.MaxPool2d").unwrap();
    let flatten_node = graph.find_op("", "torch.flatten").unwrap();
    assert_eq!(graph.op(conv_node).unwrap().successors, vec![pool_node]);
    assert_eq!(graph.op(pool_node).unwrap().predecessors, vec![conv_node]);
    assert_eq!(graph.op(pool_node).unwrap().successors, vec![flatten_node]);
    assert!(graph.op(conv_node).unwrap().predecessors.is_empty());
}

#[test]
fn test_duplicate_edges_collapse() {
    let mut tree = ModuleTree::new("Net");
    let root = tree.root();
    let conv = tree.add_child(root, "conv", OpType::module("nn.Conv2d")).unwrap();
    let mut quantizer = AutoQuantizer::prepare(tree, QConfig::default());
    quantizer
        .run(vec![Tensor::from_vec(vec![1.0])], |trace, inputs| {
            let y = trace.call_module(conv, inputs, vec![], |_, i, _| Ok(vec![input_tensor(&i)]))?;
            let twice = vec![Some(y[0].clone()), Some(y[0].clone())];
            trace.call_function(root, &OpType::function("torch.add"), twice, vec![], |i, _| {
                Ok(vec![input_tensor(&i)])
            })
        })
        .unwrap();

    let graph = quantizer.dependency_graph();
    let add = graph.find_op("", "torch.add").unwrap();
    assert_eq!(graph.op(add).unwrap().predecessors.len(), 1);
    assert_eq!(graph.num_edges(), 1);
}

#[test]
fn test_pool_chain_takes_conv_output_params() {
    let (mut quantizer, conv, pool) = conv_pool_flatten(true);
    for x in [vec![-0.5, 1.0, 0.25, 1.5], vec![0.5, -0.25, 1.0, 1.25]] {
        run_pass(&mut quantizer, conv, pool, x).unwrap();
    }
    quantizer.finalize().unwrap();

    let state = quantizer.state("").unwrap();
    let conv_out = state.scale_zp(output_id(&quantizer, 0)).unwrap();
    let pool_out = state.scale_zp(output_id(&quantizer, 1)).unwrap();
    let flatten_out = state.scale_zp(output_id(&quantizer, 2)).unwrap();
    assert_eq!(pool_out, conv_out);
    assert_eq!(flatten_out, conv_out);
}

#[test]
fn test_sync_disabled_keeps_observed_params() {
    let (mut quantizer, conv, pool) = conv_pool_flatten(false);
    run_pass(&mut quantizer, conv, pool, vec![-0.5, 1.0, 0.25, 1.5]).unwrap();
    quantizer.finalize().unwrap();

    let state = quantizer.state("").unwrap();
    let conv_out = state.scale_zp(output_id(&quantizer, 0)).unwrap();
    let flatten_out = state.scale_zp(output_id(&quantizer, 2)).unwrap();
    assert_ne!(flatten_out, conv_out);
}

#[test]
fn test_sync_reports_overwritten_entries() {
    let (mut quantizer, conv, pool) = conv_pool_flatten(false);
    run_pass(&mut quantizer, conv, pool, vec![-0.5, 1.0, 0.25, 1.5]).unwrap();
    quantizer.finalize().unwrap();

    let graph = quantizer.dependency_graph();
    let mut states = quantizer.states().clone();
    assert_eq!(sync_pool_scale_zp(&mut states, &graph), 2);

    // already in agreement
    let graph = DependencyGraph::build(&states);
    assert_eq!(sync_pool_scale_zp(&mut states, &graph), 0);
}

#[test]
fn test_empty_graph() {
    let states = crate::state::QuantStateMap::new();
    let graph = DependencyGraph::build(&states);
    assert!(graph.is_empty());
    assert_eq!(graph.num_edges(), 0);
}
