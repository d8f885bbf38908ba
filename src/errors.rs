//! Centralized error handling for RuZaVis
//!
//! Every fallible operation in the crate returns [`Result`], so failures from the
//! chunked-array stores, the parquet reader and the image encoder reach the user
//! with the context of what was being opened or selected.

use thiserror::Error;

/// Main error type for RuZaVis operations
#[derive(Debug, Error)]
pub enum RuZaVisError {
    /// Store location could not be interpreted
    #[error("Invalid store location '{location}': {message}")]
    InvalidLocation { location: String, message: String },

    /// Store could not be opened or read
    #[error("Store error: {0}")]
    Store(String),

    /// Zarr array could not be opened
    #[error("Zarr array open error: {0}")]
    ArrayOpen(#[from] zarrs::array::ArrayCreateError),

    /// Zarr array could not be read or decoded
    #[error("Zarr array error: {0}")]
    Array(#[from] zarrs::array::ArrayError),

    /// Low level zarrs storage error
    #[error("Storage error: {0}")]
    Storage(#[from] zarrs::storage::StorageError),

    /// Variable not found in the dataset
    #[error("Variable '{var}' not found in dataset")]
    VariableNotFound { var: String },

    /// Dimension not found in variable
    #[error("Dimension '{dim}' not found in variable '{var}'")]
    DimensionNotFound { var: String, dim: String },

    /// Dimension has no coordinate variable to select labels from
    #[error("Dimension '{dim}' has no coordinate values; use a positional selection like {dim}=#0")]
    CoordinateNotFound { dim: String },

    /// Coordinate label does not exist
    #[error("Label '{label}' not found in coordinate '{dim}'")]
    LabelNotFound { dim: String, label: String },

    /// Label range selected nothing
    #[error("Selection '{spec}' on '{dim}' matched no coordinate values")]
    EmptySelection { dim: String, spec: String },

    /// Coordinate is not monotonic over the selected range
    #[error("Coordinate '{dim}' is not monotonic; label ranges need a sorted coordinate")]
    NonMonotonic { dim: String },

    /// Invalid selection specification
    #[error("Invalid selection: {message}")]
    InvalidSelection { message: String },

    /// Element type we cannot convert to f32
    #[error("Unsupported data type '{dtype}' for variable '{var}'")]
    UnsupportedDataType { var: String, dtype: String },

    /// Invalid time value or units
    #[error("Invalid time: {0}")]
    Time(String),

    /// Statistics computation errors
    #[error("Statistics computation error: {0}")]
    StatisticsError(String),

    /// Solar PV record errors
    #[error("PV data error: {0}")]
    Pv(String),

    /// Catalogue configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid command-line or plotting argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayShape(#[from] ndarray::ShapeError),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Parquet read errors
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow conversion errors
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Image encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Background task failed to complete
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for RuZaVis operations
pub type Result<T> = std::result::Result<T, RuZaVisError>;
