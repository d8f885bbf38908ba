//! Core statistical operations and traits
//!
//! This module defines the fundamental types and traits for statistical operations.

use crate::errors::{Result, RuZaVisError};
use ndarray::ArrayD;
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Supported statistical operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOperation {
    /// Arithmetic mean
    Mean,
    /// Sum of values
    Sum,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
}

impl StatOperation {
    /// Get the string representation of the operation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for StatOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatOperation {
    type Err = RuZaVisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            "min" | "minimum" => Ok(Self::Min),
            "max" | "maximum" => Ok(Self::Max),
            other => Err(RuZaVisError::InvalidArgument(format!(
                "unknown reduction '{other}', expected mean, sum, min or max"
            ))),
        }
    }
}

/// Trait for types that can perform statistical reductions along an axis
pub trait StatisticalReduction<T> {
    /// Perform a statistical reduction along the specified axis
    ///
    /// # Errors
    ///
    /// Returns an error if the axis is out of bounds for the array.
    fn reduce_along_axis(&self, axis: usize, operation: StatOperation) -> Result<ArrayD<T>>;
}

impl StatisticalReduction<f32> for ArrayD<f32> {
    fn reduce_along_axis(&self, axis: usize, operation: StatOperation) -> Result<ArrayD<f32>> {
        if axis >= self.ndim() {
            return Err(RuZaVisError::StatisticsError(format!(
                "Axis {axis} is out of bounds for array with {} dimensions",
                self.ndim()
            )));
        }

        match operation {
            StatOperation::Mean => super::parallel::parallel_mean_axis(self, axis),
            StatOperation::Sum => super::parallel::parallel_sum_axis(self, axis),
            StatOperation::Min => super::parallel::parallel_min_axis(self, axis),
            StatOperation::Max => super::parallel::parallel_max_axis(self, axis),
        }
    }
}

/// Quick statistics over the finite values of an array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Number of finite values
    pub valid: usize,
    /// Number of elements, including NaN
    pub total: usize,
}

#[derive(Clone, Copy)]
struct Moments {
    count: usize,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl Moments {
    const EMPTY: Moments = Moments {
        count: 0,
        sum: 0.0,
        sum_sq: 0.0,
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    fn push(mut self, x: f64) -> Self {
        self.count += 1;
        self.sum += x;
        self.sum_sq += x * x;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        self
    }

    fn merge(self, other: Self) -> Self {
        Moments {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Compute min/max/mean/std over the finite values, in parallel
///
/// Values are accumulated in f64. When no value is finite, every statistic is NaN.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(data: &ArrayD<f32>) -> SummaryStats {
    let values: Vec<f32> = data.iter().copied().collect();
    let moments = values
        .par_iter()
        .filter(|x| x.is_finite())
        .fold(|| Moments::EMPTY, |m, &x| m.push(f64::from(x)))
        .reduce(|| Moments::EMPTY, Moments::merge);

    if moments.count == 0 {
        return SummaryStats {
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            std_dev: f64::NAN,
            valid: 0,
            total: values.len(),
        };
    }

    let n = moments.count as f64;
    let mean = moments.sum / n;
    let variance = (moments.sum_sq / n - mean * mean).max(0.0);
    SummaryStats {
        min: moments.min,
        max: moments.max,
        mean,
        std_dev: variance.sqrt(),
        valid: moments.count,
        total: values.len(),
    }
}
