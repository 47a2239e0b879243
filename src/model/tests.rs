use super::*;
use crate::config::AutoQuantConfig;
use crate::observer::{ObserverKind, QConfig};
use crate::op::OpType;
use crate::tensor::Tensor;
use crate::Error;

fn tree() -> (ModuleTree, ScopeId) {
    let mut tree = ModuleTree::new("Net");
    let root = tree.root();
    let fc = tree.add_child(root, "fc", OpType::module("nn.Linear")).unwrap();
    let body = tree.add_child(root, "body", OpType::module("nn.Sequential")).unwrap();
    tree.add_child(body, "0", OpType::module("nn.Conv2d")).unwrap();
    (tree, fc)
}

fn linear_pass(quantizer: &mut AutoQuantizer, fc: ScopeId, x: Vec<f32>) {
    quantizer
        .run(vec![Tensor::from_vec(x)], |trace, inputs| {
            trace.call_module(fc, inputs, vec![Tensor::from_vec(vec![0.3])], |_, i, _| {
                let x = i[0].as_ref().map(Tensor::dequantize).unwrap();
                Ok(vec![Tensor::new(x.data().mapv(|v| v * 0.3))])
            })
        })
        .unwrap();
}

#[test]
fn test_tree_paths() {
    let (tree, fc) = tree();
    assert_eq!(tree.len(), 4);
    assert_eq!(tree.get(fc).unwrap().fqn(), "fc");
    let conv = tree.find("body.0").unwrap();
    assert_eq!(tree.get(conv).unwrap().name(), "0");
    assert!(tree.get(conv).unwrap().is_leaf());
    assert_eq!(tree.get(tree.root()).unwrap().children().len(), 2);
}

#[test]
fn test_tree_rejects_bad_children() {
    let (mut tree, fc) = tree();
    let root = tree.root();
    assert!(tree.add_child(fc, "inner", OpType::module("nn.ReLU")).is_err());
    assert!(tree.add_child(root, "fc", OpType::module("nn.ReLU")).is_err());
    assert!(tree.add_child(root, "a.b", OpType::module("nn.ReLU")).is_err());
    assert!(tree.add_child(root, "", OpType::module("nn.ReLU")).is_err());
}

#[test]
fn test_prepare_attaches_states_to_containers() {
    let (tree, _) = tree();
    let quantizer = AutoQuantizer::prepare(tree, QConfig::default());
    let scopes: Vec<&str> = quantizer.states().keys().map(String::as_str).collect();
    assert_eq!(scopes, vec!["", "body"]);
    assert_eq!(quantizer.phase(), Phase::Calibrating);
    assert_eq!(quantizer.passes(), 0);
}

#[test]
fn test_finalize_requires_a_pass() {
    let (tree, _) = tree();
    let mut quantizer = AutoQuantizer::prepare(tree, QConfig::default());
    assert!(matches!(quantizer.finalize(), Err(Error::InvalidState(_))));
}

#[test]
fn test_lifecycle() {
    let (tree, fc) = tree();
    let mut quantizer = AutoQuantizer::prepare(tree, QConfig::default());
    linear_pass(&mut quantizer, fc, vec![-1.0, 1.0]);
    linear_pass(&mut quantizer, fc, vec![-2.0, 0.5]);
    assert_eq!(quantizer.passes(), 2);
    assert!(!quantizer.state("").unwrap().is_first_call());

    quantizer.finalize().unwrap();
    assert!(quantizer.is_converted());
    assert!(matches!(quantizer.finalize(), Err(Error::InvalidState(_))));
    let root = quantizer.state("").unwrap();
    assert_eq!(root.num_observers(), 0);
    assert!(root.has_convert_info(0));

    linear_pass(&mut quantizer, fc, vec![0.5, 0.5]);

    quantizer.recalibrate().unwrap();
    assert_eq!(quantizer.phase(), Phase::Calibrating);
    assert_eq!(quantizer.passes(), 0);
    assert!(quantizer.state("").unwrap().num_observers() > 0);
    linear_pass(&mut quantizer, fc, vec![-4.0, 4.0]);
    quantizer.finalize().unwrap();
}

#[test]
fn test_from_config() {
    let (tree, _) = tree();
    let mut config = AutoQuantConfig::default();
    config.calibration.sync_pool_scales = false;
    config.qconfig.activation.name = "HistogramObserver".to_string();

    let quantizer = AutoQuantizer::from_config(tree, &config).unwrap();
    assert!(!quantizer.sync_pool_scales());
    assert_eq!(quantizer.qconfig().activation.kind, ObserverKind::Histogram);
}

#[test]
fn test_from_config_unknown_observer() {
    let (tree, _) = tree();
    let mut config = AutoQuantConfig::default();
    config.qconfig.weight.name = "FancyObserver".to_string();
    let err = AutoQuantizer::from_config(tree, &config).unwrap_err();
    assert!(err.is_lookup());
}
