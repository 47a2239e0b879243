//! Tests for observers and observer settings

use super::*;
use crate::tensor::{Dtype, QScheme, Tensor};
use approx::assert_abs_diff_eq;
use proptest::prelude::*;

fn observe_all(spec: ObserverSpec, batches: &[Vec<f32>]) -> Observer {
    let mut observer = spec.build().unwrap();
    for batch in batches {
        observer.observe(&Tensor::from_vec(batch.clone()));
    }
    observer
}

// ========================================================================
// PROPERTY TESTS - qparams are always valid
// ========================================================================

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(200))]

    /// Quantized observers produce a positive scale and an in-range zero point
    #[test]
    fn prop_min_max_qparams_valid(
        data in prop::collection::vec(-100.0f32..100.0, 1..100),
        symmetric in any::<bool>(),
        signed in any::<bool>(),
    ) {
        let dtype = if signed { Dtype::QInt8 } else { Dtype::QUInt8 };
        let qscheme = if symmetric { QScheme::PerTensorSymmetric } else { QScheme::PerTensorAffine };
        let spec = ObserverSpec::new(ObserverKind::MinMax).with_dtype(dtype).with_qscheme(qscheme);
        let qp = observe_all(spec, &[data]).calculate_qparams().unwrap();
        let (qmin, qmax) = dtype.quant_range(false).unwrap();

        prop_assert!(qp.scale[0] > 0.0);
        prop_assert!(qp.zero_point[0] >= qmin && qp.zero_point[0] <= qmax);
    }

    #[test]
    fn prop_histogram_qparams_valid(
        data in prop::collection::vec(-10.0f32..10.0, 1..200),
    ) {
        let spec = ObserverSpec::new(ObserverKind::Histogram)
            .with_arg("bins", ObserverArg::Int(256));
        let qp = observe_all(spec, &[data]).calculate_qparams().unwrap();

        prop_assert!(qp.scale[0] > 0.0);
        prop_assert!(qp.zero_point[0] >= 0 && qp.zero_point[0] <= 255);
    }

    #[test]
    fn prop_per_channel_qparams_valid(
        data in prop::collection::vec(-5.0f32..5.0, 12),
    ) {
        let spec = QConfig::default().weight;
        let mut observer = spec.build().unwrap();
        observer.observe(&Tensor::from_shape_vec(&[3, 4], data).unwrap());
        let qp = observer.calculate_qparams().unwrap();

        prop_assert_eq!(qp.num_channels(), 3);
        for c in 0..3 {
            let (scale, zp) = qp.channel(c);
            prop_assert!(scale > 0.0);
            prop_assert_eq!(zp, 0);
        }
    }
}

// ========================================================================
// UNIT TESTS
// ========================================================================

#[test]
fn test_min_max_affine_uint8() {
    let spec = ObserverSpec::new(ObserverKind::MinMax);
    let observer = observe_all(spec, &[vec![-1.0, 0.0], vec![3.0]]);
    assert_eq!(observer.min_max(), Some((-1.0, 3.0)));
    assert_eq!(observer.num_batches(), 2);

    let qp = observer.calculate_qparams().unwrap();
    assert_abs_diff_eq!(qp.scale[0], 4.0 / 255.0, epsilon = 1e-6);
    assert_eq!(qp.zero_point[0], 64);
}

#[test]
fn test_symmetric_uint8_zero_point_is_midpoint() {
    let spec = ObserverSpec::new(ObserverKind::MinMax).with_qscheme(QScheme::PerTensorSymmetric);
    let qp = observe_all(spec, &[vec![-2.0, 1.0]])
        .calculate_qparams()
        .unwrap();
    assert_eq!(qp.zero_point[0], 128);
    assert_abs_diff_eq!(qp.scale[0], 2.0 / 127.5, epsilon = 1e-6);
}

#[test]
fn test_all_positive_range_includes_zero() {
    let spec = ObserverSpec::new(ObserverKind::MinMax);
    let qp = observe_all(spec, &[vec![2.0, 4.0]])
        .calculate_qparams()
        .unwrap();
    assert_eq!(qp.zero_point[0], 0);
    assert_abs_diff_eq!(qp.scale[0], 4.0 / 255.0, epsilon = 1e-6);
}

#[test]
fn test_constant_zero_input_uses_eps() {
    let spec = ObserverSpec::new(ObserverKind::MinMax);
    let qp = observe_all(spec, &[vec![0.0; 8]])
        .calculate_qparams()
        .unwrap();
    assert!(qp.scale[0] > 0.0);
}

#[test]
fn test_no_data_defaults() {
    let observer = ObserverSpec::new(ObserverKind::MinMax).build().unwrap();
    assert!(!observer.has_data());
    let qp = observer.calculate_qparams().unwrap();
    assert_eq!(qp.scale, vec![1.0]);
    assert_eq!(qp.zero_point, vec![0]);
}

#[test]
fn test_moving_average_smooths() {
    let spec = ObserverSpec::new(ObserverKind::MovingAverageMinMax)
        .with_arg("averaging_constant", ObserverArg::Float(0.5));
    let observer = observe_all(spec, &[vec![0.0, 2.0], vec![0.0, 4.0]]);
    let (_, hi) = observer.min_max().unwrap();
    assert_abs_diff_eq!(hi, 3.0, epsilon = 1e-6);
}

#[test]
fn test_placeholder_has_no_qparams() {
    let observer = observe_all(ObserverSpec::new(ObserverKind::Placeholder), &[vec![1.0]]);
    assert_eq!(observer.dtype(), Dtype::Float32);
    assert!(observer.calculate_qparams().is_none());
}

#[test]
fn test_reduce_range_halves_codes() {
    let spec = ObserverSpec::new(ObserverKind::MinMax)
        .with_arg("reduce_range", ObserverArg::Bool(true));
    assert_eq!(spec.quant_range(), Some((0, 127)));
}

#[test]
fn test_per_channel_rejects_other_axis() {
    let spec = ObserverSpec::new(ObserverKind::PerChannelMinMax)
        .with_arg("ch_axis", ObserverArg::Int(1));
    assert!(spec.build().is_err());
}

#[test]
fn test_histogram_uniform_close_to_min_max() {
    let data: Vec<f32> = (0..1000).map(|i| i as f32 / 999.0).collect();
    let spec = ObserverSpec::new(ObserverKind::Histogram);
    let qp = observe_all(spec, &[data]).calculate_qparams().unwrap();

    assert!(qp.scale[0] <= 1.0 / 255.0 + 1e-6);
    assert!(qp.scale[0] >= 0.9 / 255.0);
    assert_eq!(qp.zero_point[0], 0);
}

#[test]
fn test_histogram_grows_range() {
    let mut hist = Histogram::new(16);
    hist.observe(&[0.0, 1.0]);
    hist.observe(&[-1.0, 3.0]);
    assert_eq!(hist.range(), Some((-1.0, 3.0)));
    assert_abs_diff_eq!(hist.total(), 4.0);
}

#[test]
fn test_reset_clears_statistics() {
    let mut observer = observe_all(ObserverSpec::new(ObserverKind::MinMax), &[vec![1.0]]);
    observer.reset().unwrap();
    assert!(!observer.has_data());
    assert!(observer.min_max().is_none());
}

// ========================================================================
// SETTINGS
// ========================================================================

#[test]
fn test_setting_round_trip() {
    let spec = ObserverSpec::new(ObserverKind::MovingAverageMinMax)
        .with_arg("averaging_constant", ObserverArg::Float(0.1))
        .with_arg("reduce_range", ObserverArg::Bool(true))
        .with_arg("quant_max", ObserverArg::Int(100));
    let setting = spec.to_setting();
    assert_eq!(setting.name, "MovingAverageMinMaxObserver");
    assert_eq!(setting.dtype.as_deref(), Some("torch.quint8"));

    let json = serde_json::to_string(&setting).unwrap();
    let parsed: ObserverSetting = serde_json::from_str(&json).unwrap();
    assert_eq!(ObserverSpec::from_setting(&parsed).unwrap(), spec);
}

#[test]
fn test_opaque_args_dropped_on_save() {
    let spec = ObserverSpec::new(ObserverKind::MinMax)
        .with_arg("factory", ObserverArg::Opaque("<function>".into()))
        .with_arg("eps", ObserverArg::Float(1e-6));
    let setting = spec.to_setting();
    assert!(!setting.args.contains_key("factory"));
    assert!(setting.args.contains_key("eps"));
}

#[test]
fn test_setting_flat_json_layout() {
    let json = r#"{"name": "MinMaxObserver", "qscheme": "torch.per_tensor_symmetric",
                   "dtype": "torch.qint8", "reduce_range": false, "eps": 1e-5}"#;
    let setting: ObserverSetting = serde_json::from_str(json).unwrap();
    let spec = ObserverSpec::from_setting(&setting).unwrap();
    assert_eq!(spec.dtype, Dtype::QInt8);
    assert_eq!(spec.qscheme, QScheme::PerTensorSymmetric);
    assert!(!spec.reduce_range());
    assert_abs_diff_eq!(spec.eps(), 1e-5);
}

#[test]
fn test_setting_unknown_names_fail() {
    let mut setting = QConfig::default().activation.to_setting();
    setting.dtype = Some("torch.qint9".into());
    assert!(matches!(
        ObserverSpec::from_setting(&setting),
        Err(crate::Error::UnknownDtype(_))
    ));

    let mut setting = QConfig::default().activation.to_setting();
    setting.qscheme = Some("torch.per_group".into());
    assert!(matches!(
        ObserverSpec::from_setting(&setting),
        Err(crate::Error::UnknownQScheme(_))
    ));

    let mut setting = QConfig::default().activation.to_setting();
    setting.name = "FancyObserver".into();
    assert!(matches!(
        ObserverSpec::from_setting(&setting),
        Err(crate::Error::UnknownObserver(_))
    ));
}

#[test]
fn test_default_qconfig() {
    let qconfig = QConfig::default();
    assert_eq!(qconfig.activation.dtype, Dtype::QUInt8);
    assert_eq!(qconfig.weight.dtype, Dtype::QInt8);
    assert!(qconfig.weight.qscheme.is_per_channel());
}

#[test]
fn test_quant_range_must_fit_dtype() {
    let inverted = ObserverSpec::new(ObserverKind::MinMax)
        .with_arg("quant_min", ObserverArg::Int(10))
        .with_arg("quant_max", ObserverArg::Int(0));
    assert!(matches!(inverted.build(), Err(crate::Error::InvalidParameter(_))));

    let too_wide = ObserverSpec::new(ObserverKind::MinMax)
        .with_dtype(Dtype::QInt8)
        .with_arg("quant_min", ObserverArg::Int(-128))
        .with_arg("quant_max", ObserverArg::Int(255));
    assert!(matches!(too_wide.build(), Err(crate::Error::InvalidParameter(_))));

    let narrowed = ObserverSpec::new(ObserverKind::MinMax)
        .with_arg("quant_min", ObserverArg::Int(16))
        .with_arg("quant_max", ObserverArg::Int(240));
    assert!(narrowed.build().is_ok());
}
