//! Tests for tensors and precisions

use super::*;
use approx::assert_abs_diff_eq;
use proptest::prelude::*;

#[test]
fn test_dtype_names_round_trip() {
    for dtype in Dtype::ALL {
        assert_eq!(dtype.name().parse::<Dtype>().unwrap(), dtype);
    }
}

#[test]
fn test_unknown_dtype_is_lookup_error() {
    let err = "torch.qint9".parse::<Dtype>().unwrap_err();
    assert!(err.is_lookup());
    assert!(err.to_string().contains("torch.qint9"));
}

#[test]
fn test_unknown_qscheme_is_lookup_error() {
    let err = "torch.per_block".parse::<QScheme>().unwrap_err();
    assert!(err.is_lookup());
}

#[test]
fn test_quant_ranges() {
    assert_eq!(Dtype::QUInt8.quant_range(false), Some((0, 255)));
    assert_eq!(Dtype::QInt8.quant_range(false), Some((-128, 127)));
    assert_eq!(Dtype::QUInt8.quant_range(true), Some((0, 127)));
    assert_eq!(Dtype::Float32.quant_range(false), None);
    assert!(!Dtype::Float32.is_quantized());
}

#[test]
fn test_weight_key_format() {
    let key = WeightKey::new(3, 1);
    assert_eq!(key.to_string(), "3_1");
    assert_eq!("3_1".parse::<WeightKey>().unwrap(), key);
    assert!("31".parse::<WeightKey>().is_err());
}

#[test]
fn test_quantize_per_tensor() {
    let t = Tensor::from_vec(vec![-1.0, 0.0, 0.5, 1.0]);
    let qp = QParams::per_tensor(1.0 / 127.5, 128);
    let q = t.quantize(&qp, Dtype::QUInt8).unwrap();

    assert_eq!(q.dtype(), Dtype::QUInt8);
    assert!(q.is_quantized_as(&qp, Dtype::QUInt8));
    let codes = q.as_slice().unwrap();
    assert!(codes.iter().all(|&c| (0.0..=255.0).contains(&c)));

    let back = q.dequantize();
    assert_eq!(back.dtype(), Dtype::Float32);
    for (a, b) in back.as_slice().unwrap().iter().zip(t.as_slice().unwrap()) {
        assert_abs_diff_eq!(a, b, epsilon = 0.01);
    }
}

#[test]
fn test_quantize_clamps_out_of_range() {
    let t = Tensor::from_vec(vec![100.0, -100.0]);
    let q = t
        .quantize(&QParams::per_tensor(0.1, 0), Dtype::QInt8)
        .unwrap();
    assert_eq!(q.as_slice().unwrap(), &[127.0, -128.0]);
}

#[test]
fn test_quantize_in_range_clamps_to_narrow_codes() {
    let t = Tensor::from_vec(vec![100.0, -100.0, 1.0]);
    let q = t
        .quantize_in_range(&QParams::per_tensor(0.1, 64), Dtype::QUInt8, (0, 127))
        .unwrap();
    assert_eq!(q.as_slice().unwrap(), &[127.0, 0.0, 74.0]);

    let bad = t.quantize_in_range(&QParams::per_tensor(0.1, 0), Dtype::QInt8, (-128, 255));
    assert!(bad.is_err());
}

#[test]
fn test_quantize_per_channel() {
    let t = Tensor::from_shape_vec(&[2, 2], vec![1.0, -1.0, 10.0, -10.0]).unwrap();
    let qp = QParams::per_channel(vec![1.0 / 127.0, 10.0 / 127.0], vec![0, 0]);
    let q = t.quantize(&qp, Dtype::QInt8).unwrap();
    assert_eq!(q.as_slice().unwrap(), &[127.0, -127.0, 127.0, -127.0]);
}

#[test]
fn test_per_channel_shape_mismatch() {
    let t = Tensor::from_vec(vec![1.0, 2.0, 3.0]);
    let qp = QParams::per_channel(vec![1.0, 1.0], vec![0, 0]);
    assert!(t.quantize(&qp, Dtype::QInt8).is_err());
}

#[test]
fn test_quantize_to_float_rejected() {
    let t = Tensor::from_vec(vec![1.0]);
    assert!(t
        .quantize(&QParams::per_tensor(1.0, 0), Dtype::Float32)
        .is_err());
}

#[test]
fn test_dequantize_float_is_identity() {
    let t = Tensor::from_vec(vec![1.5, 2.5]);
    assert_eq!(t.dequantize(), t);
}

#[test]
fn test_info_survives_quantization() {
    let info = TensorInfo::new(7, Dtype::Float32, Dtype::QUInt8);
    let t = Tensor::from_vec(vec![0.25]).with_info(info);
    let q = t
        .quantize(&QParams::per_tensor(0.01, 0), Dtype::QUInt8)
        .unwrap();
    assert_eq!(q.info(), Some(&info));
    assert_eq!(q.dequantize().info(), Some(&info));
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(100))]

    /// Dequantized values stay within half a step of the input when in range
    #[test]
    fn prop_quantize_error_bounded(
        data in prop::collection::vec(-1.0f32..1.0, 1..64),
    ) {
        let qp = QParams::per_tensor(2.0 / 255.0, 128);
        let q = Tensor::from_vec(data.clone()).quantize(&qp, Dtype::QUInt8).unwrap();
        let back = q.dequantize();
        for (a, b) in back.as_slice().unwrap().iter().zip(&data) {
            prop_assert!((a - b).abs() <= 2.0 / 255.0);
        }
    }
}
