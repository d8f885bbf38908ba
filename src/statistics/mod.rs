//! Statistical computations and parallel reduction operations
//!
//! This module provides reductions (mean, sum, min, max) over one dimension of
//! a materialized selection, and summary statistics of a whole selection, using
//! parallel processing.
//!
//! # Organization
//!
//! - [`operations`]: Core statistical operations and traits
//! - [`parallel`]: Parallel computation implementations

pub mod operations;
pub mod parallel;

// Re-export the main types and functions for convenience
pub use operations::{summarize, StatOperation, StatisticalReduction, SummaryStats};
pub use parallel::{parallel_max_axis, parallel_mean_axis, parallel_min_axis, parallel_sum_axis};
