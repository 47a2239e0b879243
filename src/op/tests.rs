use super::*;

#[test]
fn test_classify_builtin_table() {
    assert_eq!(OpKind::classify("nn.Conv2d"), OpKind::Convolution);
    assert_eq!(OpKind::classify("F.linear"), OpKind::Linear);
    assert_eq!(OpKind::classify("nn.EmbeddingBag"), OpKind::EmbeddingBag);
    assert_eq!(OpKind::classify("nn.ConvTranspose3d"), OpKind::TransposedConvolution);
    assert_eq!(OpKind::classify("nn.LSTM"), OpKind::Recurrent);
    assert_eq!(OpKind::classify("F.adaptive_avg_pool2d"), OpKind::Pooling);
    assert_eq!(OpKind::classify("nn.Flatten"), OpKind::ShapeOnly);
    assert_eq!(OpKind::classify("torch.add"), OpKind::ElementwiseAdd);
    assert_eq!(OpKind::classify("F.relu"), OpKind::Other);
}

#[test]
fn test_classify_builtin_method_names() {
    let name = "<built-in method flatten of type object at 0x7f3a2c>";
    assert_eq!(OpKind::classify(name), OpKind::ShapeOnly);
    assert_eq!(OpKind::classify("<built-in method relu of type object at 0x1>"), OpKind::Other);
}

#[test]
fn test_kind_properties() {
    assert!(OpKind::Convolution.has_weights());
    assert!(!OpKind::Pooling.has_weights());
    assert!(OpKind::Pooling.preserves_qparams());
    assert!(OpKind::ShapeOnly.preserves_qparams());
    assert!(!OpKind::Linear.preserves_qparams());
    assert!(!OpKind::Other.is_quantizable());
}

#[test]
fn test_leaf_modules() {
    assert!(OpType::module("nn.Conv2d").is_leaf_module());
    assert!(!OpType::module("nn.Sequential").is_leaf_module());
    assert!(!OpType::module("ResidualBlock").is_leaf_module());
    assert!(!OpType::function("F.relu").is_leaf_module());
}

#[test]
fn test_matches_persisted_exact() {
    let op = OpType::module("nn.Conv2d");
    assert!(op.matches_persisted("nn.Conv2d"));
    assert!(!op.matches_persisted("nn.Conv3d"));
}

#[test]
fn test_matches_persisted_builtin_address() {
    let live = OpType::function("<built-in method add of type object at 0x7f0001>");
    assert!(live.matches_persisted("<built-in method add of type object at 0x7f9999>"));
    assert!(!live.matches_persisted("<built-in method mul of type object at 0x7f0001>"));
    // The address tolerance only applies to built-in method names
    let plain = OpType::function("torch.add 1");
    assert!(!plain.matches_persisted("torch.add 2"));
}

#[test]
fn test_registry_overrides() {
    let mut registry = OpRegistry::new();
    registry.register("my.fused_pool", OpKind::Pooling);
    assert_eq!(registry.function("my.fused_pool").kind, OpKind::Pooling);
    assert_eq!(registry.module("nn.Linear").kind, OpKind::Linear);
    assert!(registry.module("nn.Linear").is_module);
}
