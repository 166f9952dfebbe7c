// ============================================================
// Layer 4 — IQ Normalizer
// ============================================================
// Recordings from different receivers arrive at very different
// amplitudes. Before they share one dataset, each record can be
// rescaled so that its I and Q columns have unit variance.
//
// For every record (an L x 2 matrix) and every column c:
//
//   std_c = sqrt( mean( (x_c - mean(x_c))² ) )     population std
//   x_c  ← x_c / std_c                             no centering
//
// Why is the mean not subtracted?
//   The mean is only used to measure spread. A DC offset or
//   carrier leak is part of what the receiver captured, and the
//   datasets this feeds were scaled the same way, so it survives
//   normalization.
//
// Columns with zero spread (constant, or a single sample) are
// left unchanged.

use ndarray::{Array3, ArrayViewMut1};

/// Smallest standard deviation treated as non-zero.
const MIN_STD: f64 = 10.0 * f64::EPSILON;

pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Scale every record of `iq` ([n, L, 2]) in place.
    pub fn scale_records(&self, iq: &mut Array3<f32>) {
        for mut record in iq.outer_iter_mut() {
            for mut column in record.columns_mut() {
                scale_column(&mut column);
            }
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn scale_column(column: &mut ArrayViewMut1<f32>) {
    let n = column.len();
    if n == 0 {
        return;
    }
    let mean = column.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
    let var = column
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    let std = var.sqrt();

    if !std.is_finite() || std < MIN_STD {
        return;
    }
    column.mapv_inplace(|v| (f64::from(v) / std) as f32);
}
