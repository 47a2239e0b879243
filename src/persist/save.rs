//! Writing qconf documents

use super::document::QConfSummary;
use super::format::SaveConfig;
use crate::model::AutoQuantizer;
use crate::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Save every scope's records, qconfigs and finalized parameters
///
/// # Example
///
/// ```no_run
/// use autoquant::model::{AutoQuantizer, ModuleTree};
/// use autoquant::observer::QConfig;
/// use autoquant::persist::{save_quant_state, ConfigFormat, SaveConfig};
///
/// let quantizer = AutoQuantizer::prepare(ModuleTree::new("Net"), QConfig::default());
/// save_quant_state(&quantizer, "qconf.json", &SaveConfig::new(ConfigFormat::Json)).unwrap();
/// ```
pub fn save_quant_state(
    quantizer: &AutoQuantizer,
    path: impl AsRef<Path>,
    config: &SaveConfig,
) -> Result<()> {
    let path = path.as_ref();
    let summary = QConfSummary::from_states(quantizer.states());
    let data = summary.to_string(config.format, config.pretty)?;

    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;

    tracing::info!(path = %path.display(), format = ?config.format, "saved qconf");
    Ok(())
}
