//! Scale/zero-point arithmetic shared by all observers

use crate::tensor::Dtype;

/// Compute `(scale, zero_point)` for an observed range.
///
/// The range is widened to include zero so that zero is exactly
/// representable. An empty range (no data observed) yields `(1.0, 0)`.
pub fn calculate_qparams(
    min_val: f32,
    max_val: f32,
    dtype: Dtype,
    symmetric: bool,
    quant_range: (i64, i64),
    eps: f32,
) -> (f32, i64) {
    let (qmin, qmax) = quant_range;
    if !min_val.is_finite() || !max_val.is_finite() || min_val > max_val {
        return (1.0, 0);
    }

    let min_neg = min_val.min(0.0);
    let max_pos = max_val.max(0.0);
    let levels = (qmax - qmin) as f32;

    if symmetric {
        let max_abs = (-min_neg).max(max_pos);
        let scale = (max_abs / (levels / 2.0)).max(eps);
        let zero_point = if dtype == Dtype::QUInt8 {
            (qmin + qmax + 1) / 2
        } else {
            0
        };
        (scale, zero_point)
    } else {
        let scale = ((max_pos - min_neg) / levels).max(eps);
        let zero_point = qmin - (min_neg / scale).round() as i64;
        (scale, zero_point.clamp(qmin, qmax))
    }
}

/// Running min/max of a batch
pub(crate) fn batch_min_max(data: impl IntoIterator<Item = f32>) -> Option<(f32, f32)> {
    data.into_iter().fold(None, |acc, x| match acc {
        None => Some((x, x)),
        Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
    })
}
