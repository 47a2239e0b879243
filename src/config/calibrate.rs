//! Single-call calibration from a run configuration

use super::load::load_config;
use super::schema::AutoQuantConfig;
use super::validate::validate_config;
use crate::dispatch::Trace;
use crate::model::{AutoQuantizer, ModuleTree};
use crate::tensor::Tensor;
use crate::{Error, Result};
use std::path::Path;

/// Calibrate a model the way `config` describes.
///
/// This:
/// 1. Validates the configuration
/// 2. Prepares the model with the configured qconfig and pooling sync
/// 3. Runs `calibration.passes` forward passes, cycling through `batches`
/// 4. Finalizes the quantization parameters
/// 5. Saves a qconf to `output.path` when one is set
///
/// `forward` is the root module's body, called once per pass.
pub fn calibrate_from_config<F>(
    tree: ModuleTree,
    config: &AutoQuantConfig,
    batches: &[Vec<Tensor>],
    mut forward: F,
) -> Result<AutoQuantizer>
where
    F: for<'t> FnMut(&mut Trace<'t>, Vec<Option<Tensor>>) -> Result<Vec<Tensor>>,
{
    validate_config(config).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))?;
    if batches.is_empty() {
        return Err(Error::InvalidParameter(
            "calibration needs at least one input batch".to_string(),
        ));
    }

    let mut quantizer = AutoQuantizer::from_config(tree, config)?;
    for batch in batches.iter().cycle().take(config.calibration.passes) {
        quantizer.run(batch.clone(), |trace, inputs| forward(trace, inputs))?;
    }
    quantizer.finalize()?;

    if let Some(path) = &config.output.path {
        quantizer.save(path, &config.output.save_config())?;
    }
    Ok(quantizer)
}

/// Load a YAML run configuration and calibrate with it
///
/// # Example
///
/// ```no_run
/// use autoquant::config::calibrate_from_yaml;
/// use autoquant::model::ModuleTree;
/// use autoquant::tensor::Tensor;
///
/// let batches = vec![vec![Tensor::from_vec(vec![0.5, -1.0])]];
/// let quantizer = calibrate_from_yaml("autoquant.yaml", ModuleTree::new("Net"), &batches, |_, inputs| {
///     Ok(inputs.into_iter().flatten().collect())
/// })?;
/// assert!(quantizer.is_converted());
/// # Ok::<(), autoquant::Error>(())
/// ```
pub fn calibrate_from_yaml<P, F>(
    config_path: P,
    tree: ModuleTree,
    batches: &[Vec<Tensor>],
    forward: F,
) -> Result<AutoQuantizer>
where
    P: AsRef<Path>,
    F: for<'t> FnMut(&mut Trace<'t>, Vec<Option<Tensor>>) -> Result<Vec<Tensor>>,
{
    let config = load_config(config_path)?;
    calibrate_from_config(tree, &config, batches, forward)
}
