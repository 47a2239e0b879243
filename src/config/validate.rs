//! Configuration validation

use super::schema::AutoQuantConfig;
use crate::observer::ObserverSpec;
use crate::persist::ConfigFormat;

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid calibration passes: {0} (must be > 0)")]
    InvalidPasses(usize),

    #[error("Invalid {role} observer: {reason}")]
    InvalidObserver { role: &'static str, reason: String },

    #[error("Activation observer {0} is per-channel (activations are observed per-tensor)")]
    PerChannelActivation(String),

    #[error("Invalid {role} quantization range: [{qmin}, {qmax}]")]
    InvalidQuantRange {
        role: &'static str,
        qmin: i64,
        qmax: i64,
    },

    #[error("Output path {path} does not match format {format:?}")]
    OutputFormatMismatch { path: String, format: ConfigFormat },
}

fn check_observer(
    role: &'static str,
    setting: &crate::observer::ObserverSetting,
) -> Result<ObserverSpec, ValidationError> {
    let spec = ObserverSpec::from_setting(setting).map_err(|e| ValidationError::InvalidObserver {
        role,
        reason: e.to_string(),
    })?;
    if let Some((qmin, qmax)) = spec.quant_range() {
        if qmin >= qmax {
            return Err(ValidationError::InvalidQuantRange { role, qmin, qmax });
        }
    }
    spec.build().map_err(|e| ValidationError::InvalidObserver {
        role,
        reason: e.to_string(),
    })?;
    Ok(spec)
}

/// Validate a run configuration
///
/// Checks:
/// - Observer names, dtypes and qschemes resolve
/// - Activations use a per-tensor observer
/// - Numeric values are in valid ranges
/// - The output path's extension agrees with the output format
pub fn validate_config(config: &AutoQuantConfig) -> Result<(), ValidationError> {
    if config.calibration.passes == 0 {
        return Err(ValidationError::InvalidPasses(config.calibration.passes));
    }

    let activation = check_observer("activation", &config.qconfig.activation)?;
    if activation.kind.is_per_channel() {
        return Err(ValidationError::PerChannelActivation(
            activation.kind.name().to_string(),
        ));
    }
    check_observer("weight", &config.qconfig.weight)?;

    if let Some(path) = &config.output.path {
        if let Some(detected) = ConfigFormat::from_path(path) {
            if detected != config.output.format {
                return Err(ValidationError::OutputFormatMismatch {
                    path: path.display().to_string(),
                    format: config.output.format,
                });
            }
        }
    }

    Ok(())
}
