//! Persistence of quantization decisions (qconf files)
//!
//! A qconf file captures, per scope, every recorded op with its tensor
//! descriptors, observer settings and finalized scale/zero-point. Saving
//! after calibration and loading into a freshly traced model reproduces the
//! same quantized behavior; editing the file tunes it.

mod document;
mod format;
mod load;
mod save;


pub use document::{
    LayerInfo, PersistedNonQOpInfo, PersistedQOpInfo, PersistedTensorInfo, QConfSummary,
    SummaryStats,
};
pub use format::{ConfigFormat, SaveConfig};
pub use load::{apply_summary, load_qconf_summary};
pub use save::save_quant_state;
