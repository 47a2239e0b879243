//! Histogram statistics with an L2 range search

use super::helpers::batch_min_max;

/// Fixed-bin histogram over a range that grows as data arrives
#[derive(Clone, Debug)]
pub struct Histogram {
    counts: Vec<f32>,
    min: f32,
    max: f32,
    initialized: bool,
}

impl Histogram {
    pub fn new(bins: usize) -> Self {
        Self {
            counts: vec![0.0; bins.max(1)],
            min: 0.0,
            max: 0.0,
            initialized: false,
        }
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn range(&self) -> Option<(f32, f32)> {
        self.initialized.then_some((self.min, self.max))
    }

    pub fn total(&self) -> f32 {
        self.counts.iter().sum()
    }

    pub fn observe(&mut self, data: &[f32]) {
        let Some((lo, hi)) = batch_min_max(data.iter().copied().filter(|x| x.is_finite())) else {
            return;
        };

        if !self.initialized {
            self.min = lo;
            self.max = hi;
            self.initialized = true;
        } else if lo < self.min || hi > self.max {
            self.rebin(lo.min(self.min), hi.max(self.max));
        }

        for &x in data.iter().filter(|x| x.is_finite()) {
            let bin = self.bin_of(x);
            self.counts[bin] += 1.0;
        }
    }

    fn bin_width(&self) -> f32 {
        (self.max - self.min) / self.bins() as f32
    }

    fn bin_of(&self, x: f32) -> usize {
        let width = self.bin_width();
        if width <= 0.0 {
            return 0;
        }
        (((x - self.min) / width) as usize).min(self.bins() - 1)
    }

    /// Spread existing counts into a wider range by bin centre
    fn rebin(&mut self, new_min: f32, new_max: f32) {
        let old_width = self.bin_width();
        let old_min = self.min;
        let bins = self.bins();
        let old = std::mem::replace(&mut self.counts, vec![0.0; bins]);
        self.min = new_min;
        self.max = new_max;
        for (i, count) in old.into_iter().enumerate().filter(|(_, c)| *c > 0.0) {
            let centre = old_min + (i as f32 + 0.5) * old_width;
            let bin = self.bin_of(centre);
            self.counts[bin] += count;
        }
    }

    /// Squared quantization error if `[start_bin, end_bin]` were mapped onto
    /// `levels` evenly spaced codes.
    fn quantization_error(&self, start_bin: usize, end_bin: usize, levels: usize) -> f32 {
        let width = self.bin_width();
        let lo = self.min + start_bin as f32 * width;
        let hi = self.min + (end_bin + 1) as f32 * width;
        let step = (hi - lo) / (levels.max(2) - 1) as f32;
        if step <= 0.0 {
            return 0.0;
        }

        self.counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0.0)
            .map(|(i, &count)| {
                let centre = self.min + (i as f32 + 0.5) * width;
                let code = ((centre.clamp(lo, hi) - lo) / step).round();
                let restored = lo + code * step;
                count * (centre - restored).powi(2)
            })
            .sum()
    }

    /// Narrow the observed range by trimming tails while the L2 error keeps
    /// improving. Returns the chosen `(min, max)`.
    pub fn search_range(&self, levels: usize) -> Option<(f32, f32)> {
        let (min, max) = self.range()?;
        let total = self.total();
        if total <= 0.0 || max - min <= f32::EPSILON {
            return Some((min, max));
        }

        let mut cumulative = Vec::with_capacity(self.bins());
        let mut running = 0.0;
        for &c in &self.counts {
            running += c;
            cumulative.push(running / total);
        }
        let first_at_least = |q: f32| cumulative.partition_point(|&c| c < q).min(self.bins() - 1);

        let stride = 1e-5;
        let (mut alpha, mut beta) = (0.0f32, 1.0f32);
        let (mut start, mut end) = (0usize, self.bins() - 1);
        let mut best = self.quantization_error(start, end, levels);

        while alpha < beta {
            let next_alpha = alpha + stride;
            let next_beta = beta - stride;
            let left = first_at_least(next_alpha);
            let right = first_at_least(next_beta);

            let (mut next_start, mut next_end) = (start, end);
            if left.saturating_sub(start) > end.saturating_sub(right) {
                next_start = left;
                alpha = next_alpha;
            } else {
                next_end = right;
                beta = next_beta;
            }

            if next_start == start && next_end == end {
                continue;
            }
            if next_start > next_end {
                break;
            }

            let error = self.quantization_error(next_start, next_end, levels);
            if error > best {
                break;
            }
            best = error;
            start = next_start;
            end = next_end;
        }

        let width = self.bin_width();
        Some((
            min + start as f32 * width,
            min + (end + 1) as f32 * width,
        ))
    }
}
