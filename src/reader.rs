//! Async access to datasets
//!
//! The array stores are synchronous, so every read is moved onto tokio's
//! blocking pool. Frames are streamed one index of the leading dimension at a
//! time so large arrays never have to be materialized at once.

use crate::dataset::Dataset;
use crate::errors::{Result, RuZaVisError};
use async_trait::async_trait;
use futures::Stream;
use ndarray::{ArrayD, Axis};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;

/// Stream of arrays produced by a [`StreamingDataReader`]
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<ArrayD<f32>>> + Send + 'static>>;

/// Metadata for array-like data
#[derive(Debug, Clone)]
pub struct DataArrayMetadata {
    pub name: String,
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    pub dtype: String,
    pub dimensions: Vec<String>,
    pub attributes: HashMap<String, JsonValue>,
}

/// Basic data source interface for reading arrays
#[async_trait]
pub trait DataReader {
    /// List all available arrays in the data source
    async fn list_arrays(&self) -> Result<Vec<String>>;

    /// Get metadata for a specific array
    async fn get_metadata(&self, array_name: &str) -> Result<DataArrayMetadata>;

    /// Read an entire array
    async fn read_array(&self, array_name: &str) -> Result<ArrayD<f32>>;

    /// Read a hyper-slab given as one half-open range per dimension
    async fn read_slice(&self, array_name: &str, ranges: &[Range<u64>]) -> Result<ArrayD<f32>>;
}

/// Streaming interface for frame-by-frame processing of large arrays
pub trait StreamingDataReader: DataReader {
    /// Stream the sub-arrays at each index of the leading dimension, which is dropped
    fn stream_frames(&self, array_name: &str) -> FrameStream;
}

/// [`DataReader`] over a shared [`Dataset`]
#[derive(Clone)]
pub struct DatasetReader {
    dataset: Arc<Dataset>,
}

impl DatasetReader {
    #[must_use]
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self { dataset }
    }

    /// Open a location on the blocking pool
    pub async fn open(location: &str) -> Result<Self> {
        let location = location.to_string();
        let dataset = tokio::task::spawn_blocking(move || Dataset::open_str(&location)).await??;
        Ok(Self::new(Arc::new(dataset)))
    }

    #[must_use]
    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Dataset) -> Result<T> + Send + 'static,
    {
        let dataset = Arc::clone(&self.dataset);
        tokio::task::spawn_blocking(move || f(&dataset)).await?
    }
}

#[async_trait]
impl DataReader for DatasetReader {
    async fn list_arrays(&self) -> Result<Vec<String>> {
        Ok(self.dataset.variables().map(|v| v.name.clone()).collect())
    }

    async fn get_metadata(&self, array_name: &str) -> Result<DataArrayMetadata> {
        let info = self.dataset.variable(array_name)?;
        let to_usize = |v: &[u64]| -> Result<Vec<usize>> {
            v.iter()
                .map(|n| {
                    usize::try_from(*n).map_err(|_| {
                        RuZaVisError::InvalidArgument(format!("'{array_name}' is too large for this platform"))
                    })
                })
                .collect()
        };
        Ok(DataArrayMetadata {
            name: info.name.clone(),
            shape: to_usize(&info.shape)?,
            chunks: to_usize(&info.chunks)?,
            dtype: info.dtype.clone(),
            dimensions: info.dimensions.clone(),
            attributes: info.attributes.clone().into_iter().collect(),
        })
    }

    async fn read_array(&self, array_name: &str) -> Result<ArrayD<f32>> {
        let name = array_name.to_string();
        self.blocking(move |ds| ds.read_all(&name)).await
    }

    async fn read_slice(&self, array_name: &str, ranges: &[Range<u64>]) -> Result<ArrayD<f32>> {
        let name = array_name.to_string();
        let ranges = ranges.to_vec();
        self.blocking(move |ds| ds.read(&name, &ranges)).await
    }
}

impl StreamingDataReader for DatasetReader {
    fn stream_frames(&self, array_name: &str) -> FrameStream {
        let dataset = Arc::clone(&self.dataset);
        let array_name = array_name.to_string();

        Box::pin(async_stream::stream! {
            let shape = match dataset.variable(&array_name) {
                Ok(info) if info.ndim() > 0 => info.shape.clone(),
                Ok(_) => {
                    yield Err(RuZaVisError::InvalidSelection {
                        message: format!("'{array_name}' is a scalar and has no frames"),
                    });
                    return;
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for index in 0..shape[0] {
                let mut ranges: Vec<Range<u64>> = shape.iter().map(|n| 0..*n).collect();
                ranges[0] = index..index + 1;

                let ds = Arc::clone(&dataset);
                let name = array_name.clone();
                let frame = tokio::task::spawn_blocking(move || ds.read(&name, &ranges)).await;
                match frame {
                    Ok(Ok(frame)) => yield Ok(frame.index_axis_move(Axis(0), 0)),
                    Ok(Err(e)) => {
                        yield Err(e);
                        return;
                    }
                    Err(e) => {
                        yield Err(RuZaVisError::Task(e));
                        return;
                    }
                }
            }
        })
    }
}
