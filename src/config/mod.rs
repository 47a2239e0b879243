//! Declarative YAML configuration
//!
//! # Example
//!
//! ```yaml
//! qconfig:
//!   activation:
//!     name: HistogramObserver
//!     dtype: torch.quint8
//!     qscheme: torch.per_tensor_affine
//!     bins: 2048
//!   weight:
//!     name: PerChannelMinMaxObserver
//!     dtype: torch.qint8
//!     qscheme: torch.per_channel_symmetric
//!
//! calibration:
//!   passes: 8
//!   sync_pool_scales: true
//!
//! output:
//!   path: qconf.json
//!   format: json
//! ```

mod calibrate;
mod cli;
mod load;
mod schema;
mod validate;


#[cfg(test)]
mod property_tests;

pub use calibrate::{calibrate_from_config, calibrate_from_yaml};
pub use cli::{
    parse_args, CheckArgs, Cli, Command, ConvertArgs, InspectArgs, OutputFormat, ValidateArgs,
};
pub use load::{load_config, parse_config};
pub use schema::{AutoQuantConfig, CalibrationParams, OutputSpec, QConfigSpec};
pub use validate::{validate_config, ValidationError};
