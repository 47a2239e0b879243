//! Observers: streaming statistics for deriving quantization parameters
//!
//! Observer classes form a closed vocabulary ([`ObserverKind`]) so that a
//! qconf file naming an unknown class fails to load instead of silently
//! falling back to a default:
//! - Min-Max: full observed range
//! - Moving Average Min-Max: smoothed range over calibration batches
//! - Per-Channel Min-Max: one range per slice of axis 0 (weights)
//! - Histogram: range narrowed by an L2 quantization-error search
//! - Placeholder: records nothing, targets float precision

mod calibrator;
mod helpers;
mod histogram;
mod spec;

#[cfg(test)]
mod tests;

pub use calibrator::Observer;
pub use helpers::calculate_qparams;
pub use histogram::Histogram;
pub use spec::{ObserverArg, ObserverKind, ObserverSetting, ObserverSpec, QConfig};
