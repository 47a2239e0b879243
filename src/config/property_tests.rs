//! Property tests for YAML schema serialization

use crate::config::schema::*;
use crate::config::validate::validate_config;
use crate::observer::{ObserverKind, ObserverSpec};
use crate::persist::ConfigFormat;
use crate::tensor::{Dtype, QScheme};
use proptest::prelude::*;
use std::path::PathBuf;

fn arb_activation_kind() -> impl Strategy<Value = ObserverKind> {
    prop_oneof![
        Just(ObserverKind::MinMax),
        Just(ObserverKind::MovingAverageMinMax),
        Just(ObserverKind::Histogram),
    ]
}

fn arb_weight_kind() -> impl Strategy<Value = ObserverKind> {
    prop_oneof![
        Just(ObserverKind::MinMax),
        Just(ObserverKind::PerChannelMinMax),
        Just(ObserverKind::MovingAveragePerChannelMinMax),
    ]
}

fn arb_qconfig_spec() -> impl Strategy<Value = QConfigSpec> {
    (arb_activation_kind(), arb_weight_kind(), any::<bool>()).prop_map(
        |(act, weight, reduce_range)| {
            let activation = ObserverSpec::new(act)
                .with_arg("reduce_range", crate::observer::ObserverArg::Bool(reduce_range));
            let weight = ObserverSpec::new(weight).with_dtype(Dtype::QInt8).with_qscheme(
                if weight.is_per_channel() {
                    QScheme::PerChannelSymmetric
                } else {
                    QScheme::PerTensorSymmetric
                },
            );
            QConfigSpec {
                activation: activation.to_setting(),
                weight: weight.to_setting(),
            }
        },
    )
}

fn arb_config() -> impl Strategy<Value = AutoQuantConfig> {
    (
        arb_qconfig_spec(),
        1usize..64,
        any::<bool>(),
        prop_oneof![Just(ConfigFormat::Json), Just(ConfigFormat::Yaml)],
        any::<bool>(),
        prop::string::string_regex("[a-z][a-z0-9_]{0,12}").unwrap(),
    )
        .prop_map(|(qconfig, passes, sync, format, pretty, stem)| AutoQuantConfig {
            qconfig,
            calibration: CalibrationParams {
                passes,
                sync_pool_scales: sync,
            },
            output: OutputSpec {
                path: Some(PathBuf::from(format!("{stem}.{}", format.extension()))),
                format,
                pretty,
            },
        })
}

proptest! {
    #[test]
    fn prop_yaml_roundtrip(config in arb_config()) {
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: AutoQuantConfig = serde_yaml::from_str(&yaml).unwrap();
        prop_assert_eq!(parsed, config);
    }

    #[test]
    fn prop_generated_configs_validate(config in arb_config()) {
        prop_assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn prop_qconfig_resolves(config in arb_config()) {
        let qconfig = config.qconfig.to_qconfig().unwrap();
        prop_assert!(!qconfig.activation.kind.is_per_channel());
        prop_assert_eq!(qconfig.weight.dtype, Dtype::QInt8);
    }
}
