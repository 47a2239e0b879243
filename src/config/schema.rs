//! YAML schema for autoquant run configuration

use crate::observer::{ObserverSetting, ObserverSpec, QConfig};
use crate::persist::{ConfigFormat, SaveConfig};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AutoQuantConfig {
    /// Observer factories applied to every quantizable op
    #[serde(default)]
    pub qconfig: QConfigSpec,

    /// Calibration behavior
    #[serde(default)]
    pub calibration: CalibrationParams,

    /// Where and how the qconf file is written
    #[serde(default)]
    pub output: OutputSpec,
}

/// Activation and weight observer settings, in qconf file form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QConfigSpec {
    pub activation: ObserverSetting,
    pub weight: ObserverSetting,
}

impl QConfigSpec {
    /// Resolve the settings against the observer vocabulary
    pub fn to_qconfig(&self) -> Result<QConfig> {
        Ok(QConfig::new(
            ObserverSpec::from_setting(&self.activation)?,
            ObserverSpec::from_setting(&self.weight)?,
        ))
    }
}

impl Default for QConfigSpec {
    fn default() -> Self {
        let qconfig = QConfig::default();
        Self {
            activation: qconfig.activation.to_setting(),
            weight: qconfig.weight.to_setting(),
        }
    }
}

/// Calibration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Calibration passes to run before finalizing
    #[serde(default = "default_passes")]
    pub passes: usize,

    /// Align pooling/flatten outputs with their inputs after finalizing
    #[serde(default = "default_true")]
    pub sync_pool_scales: bool,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            passes: default_passes(),
            sync_pool_scales: true,
        }
    }
}

/// Output of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Qconf path; nothing is written when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub format: ConfigFormat,

    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl OutputSpec {
    pub fn save_config(&self) -> SaveConfig {
        SaveConfig::new(self.format).with_pretty(self.pretty)
    }
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            path: None,
            format: ConfigFormat::default(),
            pretty: true,
        }
    }
}

fn default_passes() -> usize {
    1
}

fn default_true() -> bool {
    true
}
