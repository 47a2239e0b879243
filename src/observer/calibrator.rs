//! Streaming observers that accumulate tensor statistics

use super::helpers::{batch_min_max, calculate_qparams};
use super::histogram::Histogram;
use super::{ObserverArg, ObserverKind, ObserverSpec};
use crate::tensor::{QParams, Tensor};
use crate::{Error, Result};
use ndarray::Axis;

const DEFAULT_AVERAGING_CONSTANT: f32 = 0.01;
const DEFAULT_BINS: usize = 2048;

#[derive(Clone, Debug)]
enum Stats {
    /// Running min/max; `momentum` set for the moving-average variant
    MinMax {
        min: Option<f32>,
        max: Option<f32>,
        momentum: Option<f32>,
    },
    /// Per-channel running min/max along axis 0
    PerChannel {
        min: Vec<f32>,
        max: Vec<f32>,
        momentum: Option<f32>,
    },
    Histogram(Histogram),
    Placeholder,
}

/// Observer instance created from an [`ObserverSpec`]
#[derive(Clone, Debug)]
pub struct Observer {
    spec: ObserverSpec,
    stats: Stats,
    num_batches: usize,
}

impl Observer {
    pub fn new(spec: ObserverSpec) -> Result<Self> {
        if spec.kind.is_per_channel() {
            let axis = spec.arg("ch_axis").and_then(ObserverArg::as_i64).unwrap_or(0);
            if axis != 0 {
                return Err(Error::InvalidParameter(format!(
                    "{} only supports ch_axis=0, got {axis}",
                    spec.kind
                )));
            }
        }

        if let (Some((qmin, qmax)), Some((lo, hi))) =
            (spec.quant_range(), spec.dtype.quant_range(false))
        {
            if qmin >= qmax || qmin < lo || qmax > hi {
                return Err(Error::InvalidParameter(format!(
                    "{} range [{qmin}, {qmax}] is empty or outside [{lo}, {hi}] of {}",
                    spec.kind, spec.dtype
                )));
            }
        }

        let momentum = || {
            spec.arg("averaging_constant")
                .and_then(ObserverArg::as_f64)
                .map(|m| m as f32)
                .unwrap_or(DEFAULT_AVERAGING_CONSTANT)
        };

        let stats = match spec.kind {
            ObserverKind::MinMax => Stats::MinMax {
                min: None,
                max: None,
                momentum: None,
            },
            ObserverKind::MovingAverageMinMax => Stats::MinMax {
                min: None,
                max: None,
                momentum: Some(momentum()),
            },
            ObserverKind::PerChannelMinMax => Stats::PerChannel {
                min: Vec::new(),
                max: Vec::new(),
                momentum: None,
            },
            ObserverKind::MovingAveragePerChannelMinMax => Stats::PerChannel {
                min: Vec::new(),
                max: Vec::new(),
                momentum: Some(momentum()),
            },
            ObserverKind::Histogram => {
                let bins = spec
                    .arg("bins")
                    .and_then(ObserverArg::as_i64)
                    .unwrap_or(DEFAULT_BINS as i64);
                if bins <= 0 {
                    return Err(Error::InvalidParameter(format!(
                        "histogram bins must be > 0, got {bins}"
                    )));
                }
                Stats::Histogram(Histogram::new(bins as usize))
            }
            ObserverKind::Placeholder => Stats::Placeholder,
        };

        Ok(Self {
            spec,
            stats,
            num_batches: 0,
        })
    }

    pub fn spec(&self) -> &ObserverSpec {
        &self.spec
    }

    pub fn dtype(&self) -> crate::tensor::Dtype {
        self.spec.dtype
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    pub fn has_data(&self) -> bool {
        self.num_batches > 0
    }

    /// Accumulate statistics from a tensor. Quantized tensors are observed in
    /// their dequantized form.
    pub fn observe(&mut self, tensor: &Tensor) {
        let tensor = tensor.dequantize();
        if tensor.is_empty() {
            return;
        }

        match &mut self.stats {
            Stats::MinMax { min, max, momentum } => {
                let Some((lo, hi)) = batch_min_max(tensor.data().iter().copied()) else {
                    return;
                };
                update_running(min, lo, *momentum, f32::min);
                update_running(max, hi, *momentum, f32::max);
            }
            Stats::PerChannel { min, max, momentum } => {
                let data = tensor.data();
                if data.ndim() == 0 {
                    return;
                }
                let channels = data.len_of(Axis(0));
                if !min.is_empty() && min.len() != channels {
                    tracing::warn!(
                        expected = min.len(),
                        got = channels,
                        "channel count changed, restarting per-channel statistics"
                    );
                    min.clear();
                    max.clear();
                }
                let first = min.is_empty();
                for (c, lane) in data.axis_iter(Axis(0)).enumerate() {
                    let Some((lo, hi)) = batch_min_max(lane.iter().copied()) else {
                        continue;
                    };
                    if first {
                        min.push(lo);
                        max.push(hi);
                    } else if let Some(m) = momentum {
                        min[c] += (lo - min[c]) * *m;
                        max[c] += (hi - max[c]) * *m;
                    } else {
                        min[c] = min[c].min(lo);
                        max[c] = max[c].max(hi);
                    }
                }
            }
            Stats::Histogram(hist) => match tensor.as_slice() {
                Some(slice) => hist.observe(slice),
                None => hist.observe(&tensor.data().iter().copied().collect::<Vec<_>>()),
            },
            Stats::Placeholder => {}
        }

        self.num_batches += 1;
    }

    /// Observed `(min, max)` for per-tensor observers
    pub fn min_max(&self) -> Option<(f32, f32)> {
        match &self.stats {
            Stats::MinMax {
                min: Some(lo),
                max: Some(hi),
                ..
            } => Some((*lo, *hi)),
            Stats::Histogram(hist) => hist.range(),
            _ => None,
        }
    }

    /// Scale/zero-point from the accumulated statistics.
    ///
    /// Returns `None` when the observer targets a non-quantized precision.
    pub fn calculate_qparams(&self) -> Option<QParams> {
        let quant_range = self.spec.quant_range()?;
        let symmetric = self.spec.qscheme.is_symmetric();
        let eps = self.spec.eps();
        let compute = |lo: f32, hi: f32| {
            calculate_qparams(lo, hi, self.spec.dtype, symmetric, quant_range, eps)
        };

        let qparams = match &self.stats {
            Stats::MinMax { min, max, .. } => {
                let (scale, zp) = compute(
                    min.unwrap_or(f32::INFINITY),
                    max.unwrap_or(f32::NEG_INFINITY),
                );
                QParams::per_tensor(scale, zp)
            }
            Stats::PerChannel { min, max, .. } if !min.is_empty() => {
                let (scale, zero_point) = min
                    .iter()
                    .zip(max)
                    .map(|(&lo, &hi)| compute(lo, hi))
                    .unzip();
                QParams::per_channel(scale, zero_point)
            }
            Stats::PerChannel { .. } => QParams::per_tensor(1.0, 0),
            Stats::Histogram(hist) => {
                let levels = (quant_range.1 - quant_range.0 + 1) as usize;
                let (scale, zp) = match hist.search_range(levels) {
                    Some((lo, hi)) => compute(lo, hi),
                    None => compute(f32::INFINITY, f32::NEG_INFINITY),
                };
                QParams::per_tensor(scale, zp)
            }
            Stats::Placeholder => return None,
        };
        Some(qparams)
    }

    /// Forget all statistics
    pub fn reset(&mut self) -> Result<()> {
        *self = Observer::new(self.spec.clone())?;
        Ok(())
    }
}

fn update_running(
    slot: &mut Option<f32>,
    value: f32,
    momentum: Option<f32>,
    pick: fn(f32, f32) -> f32,
) {
    *slot = Some(match (*slot, momentum) {
        (None, _) => value,
        (Some(prev), Some(m)) => prev + (value - prev) * m,
        (Some(prev), None) => pick(prev, value),
    });
}
