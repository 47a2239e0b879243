//! Reading run configuration from YAML

use super::schema::AutoQuantConfig;
use super::validate::validate_config;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Parse YAML text into a validated configuration
pub fn parse_config(yaml: &str) -> Result<AutoQuantConfig> {
    let config: AutoQuantConfig = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))?;
    validate_config(&config).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))?;
    Ok(config)
}

/// Load and validate a configuration file
///
/// # Example
///
/// ```no_run
/// use autoquant::config::load_config;
///
/// let config = load_config("autoquant.yaml")?;
/// println!("{} calibration passes", config.calibration.passes);
/// # Ok::<(), autoquant::Error>(())
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AutoQuantConfig> {
    let yaml = fs::read_to_string(path.as_ref()).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {e}",
            path.as_ref().display()
        ))
    })?;
    parse_config(&yaml)
}
