use autoquant::{AutoQuantizer, Dtype, ModuleTree, OpType, QConfig, Tensor};
use proptest::collection::vec;
use proptest::prelude::*;

fn calibrate(batches: &[Vec<f32>]) -> AutoQuantizer {
    let mut tree = ModuleTree::new("Net");
    let root = tree.root();
    let fc = tree
        .add_child(root, "fc", OpType::module("nn.Linear"))
        .unwrap();
    let mut quantizer = AutoQuantizer::prepare(tree, QConfig::default());
    for x in batches {
        quantizer
            .run(vec![Tensor::from_vec(x.clone())], |trace, inputs| {
                trace.call_module(
                    fc,
                    inputs,
                    vec![Tensor::from_vec(vec![0.5, -2.0, 1.0])],
                    |_, i, _| {
                        let x = i[0].as_ref().map(Tensor::dequantize).unwrap();
                        Ok(vec![Tensor::new(x.data().mapv(|v| v * 0.5 + 1.0))])
                    },
                )
            })
            .unwrap();
    }
    quantizer.finalize().unwrap();
    quantizer
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_finalized_params_are_valid(
        batches in vec(vec(-1000.0f32..1000.0, 1..16), 1..4)
    ) {
        let quantizer = calibrate(&batches);
        let state = quantizer.state("").unwrap();
        let (qmin, qmax) = Dtype::QUInt8.quant_range(false).unwrap();

        prop_assert!(!state.tensor_id_to_scale_zp().is_empty());
        for qparams in state.tensor_id_to_scale_zp().values() {
            prop_assert!(qparams.scale.iter().all(|s| s.is_finite() && *s > 0.0));
            prop_assert!(qparams.zero_point.iter().all(|z| (qmin..=qmax).contains(z)));
        }

        let (wmin, wmax) = Dtype::QInt8.quant_range(false).unwrap();
        for qparams in state.weight_tensor_id_to_scale_zp().values() {
            prop_assert!(qparams.scale.iter().all(|s| s.is_finite() && *s > 0.0));
            prop_assert!(qparams.zero_point.iter().all(|z| (wmin..=wmax).contains(z)));
        }
    }

    #[test]
    fn prop_records_do_not_depend_on_data(
        a in vec(-10.0f32..10.0, 1..8),
        b in vec(-10.0f32..10.0, 1..8),
    ) {
        let one = calibrate(&[a.clone()]);
        let two = calibrate(&[a, b]);
        prop_assert_eq!(
            one.state("").unwrap().q_op_infos(),
            two.state("").unwrap().q_op_infos()
        );
    }
}
