//! Parallel computation implementations for statistical operations
//!
//! Each reduction walks the lanes along the reduced axis with `Zip::par_map_collect`,
//! skipping NaN and infinite values. A lane without any finite value reduces to NaN
//! (0 for sums).

use crate::errors::Result;
use ndarray::{ArrayD, ArrayView1, Axis, Zip};

fn reduce_lanes<F>(data: &ArrayD<f32>, axis: usize, f: F) -> ArrayD<f32>
where
    F: Fn(ArrayView1<'_, f32>) -> f32 + Sync + Send,
{
    log::debug!(
        "Reducing axis {axis} of {:?} across {} threads",
        data.shape(),
        rayon::current_num_threads()
    );
    Zip::from(data.lanes(Axis(axis))).par_map_collect(f)
}

/// Computes mean along an axis using parallel processing
///
/// Values are accumulated in f64 to avoid precision loss.
///
/// # Errors
///
/// Returns an error if the axis is invalid.
pub fn parallel_mean_axis(data: &ArrayD<f32>, axis: usize) -> Result<ArrayD<f32>> {
    Ok(reduce_lanes(data, axis, |lane| {
        let mut sum = 0.0_f64;
        let mut count = 0_u32;
        for &value in lane {
            if value.is_finite() {
                sum += f64::from(value);
                count += 1;
            }
        }

        if count > 0 {
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum / f64::from(count)) as f32
            }
        } else {
            f32::NAN
        }
    }))
}

/// Computes sum along an axis using parallel processing
///
/// # Errors
///
/// Returns an error if the axis is invalid.
pub fn parallel_sum_axis(data: &ArrayD<f32>, axis: usize) -> Result<ArrayD<f32>> {
    Ok(reduce_lanes(data, axis, |lane| {
        lane.iter().filter(|x| x.is_finite()).sum()
    }))
}

/// Computes minimum along an axis using parallel processing
///
/// # Errors
///
/// Returns an error if the axis is invalid.
pub fn parallel_min_axis(data: &ArrayD<f32>, axis: usize) -> Result<ArrayD<f32>> {
    Ok(reduce_lanes(data, axis, |lane| {
        let min = lane
            .iter()
            .filter(|x| x.is_finite())
            .fold(f32::INFINITY, |acc, &x| acc.min(x));
        if min == f32::INFINITY {
            f32::NAN
        } else {
            min
        }
    }))
}

/// Computes maximum along an axis using parallel processing
///
/// # Errors
///
/// Returns an error if the axis is invalid.
pub fn parallel_max_axis(data: &ArrayD<f32>, axis: usize) -> Result<ArrayD<f32>> {
    Ok(reduce_lanes(data, axis, |lane| {
        let max = lane
            .iter()
            .filter(|x| x.is_finite())
            .fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
        if max == f32::NEG_INFINITY {
            f32::NAN
        } else {
            max
        }
    }))
}
