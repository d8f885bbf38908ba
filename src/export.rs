//! Writing selections as local Zarr v2 groups
//!
//! The layout follows what xarray writes: one directory per array holding
//! `.zarray`, `.zattrs` (with `_ARRAY_DIMENSIONS`) and uncompressed C-order
//! chunks named `i.j.k`, plus consolidated `.zmetadata` at the group root.
//! Arrays are created and filled through zarrs; zarrs has no v2
//! consolidation, so `.zmetadata` is assembled from the stored documents.

use crate::coords::{CoordValues, Coordinate};
use crate::errors::{Result, RuZaVisError};
use crate::select::SelectedArray;
use chrono::NaiveDateTime;
use ndarray::{ArrayD, Slice};
use rayon::prelude::*;
use serde_json::{json, Map, Value as JsonValue};
use std::fmt;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zarrs::array::{Array, ArrayMetadata, ArrayMetadataV2, Element, FillValueMetadata};
use zarrs::filesystem::FilesystemStore;
use zarrs::metadata::v2::DataTypeMetadataV2;
use zarrs::storage::{
    ListableStorageTraits, ReadableStorageTraits, StoreKey, StorePrefix, WritableStorageTraits,
};

/// Units written for time coordinates
pub const TIME_UNITS: &str = "seconds since 1970-01-01";

/// Writer for a local Zarr v2 group
#[derive(Clone)]
pub struct ZarrWriter {
    root: PathBuf,
    store: Arc<FilesystemStore>,
    chunk_shape: Option<Vec<usize>>,
}

impl fmt::Debug for ZarrWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZarrWriter")
            .field("root", &self.root)
            .field("chunk_shape", &self.chunk_shape)
            .finish()
    }
}

impl ZarrWriter {
    /// Create the group directory (and `.zgroup`) if needed
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.exists() && !root.is_dir() {
            return Err(RuZaVisError::Store(format!(
                "{} exists and is not a directory",
                root.display()
            )));
        }
        std::fs::create_dir_all(&root)?;
        let store = Arc::new(
            FilesystemStore::new(&root)
                .map_err(|e| RuZaVisError::Store(format!("{}: {e}", root.display())))?,
        );
        let writer = Self {
            root,
            store,
            chunk_shape: None,
        };

        writer.set_json(".zgroup", &json!({ "zarr_format": 2 }))?;
        if writer.get_json(".zattrs")?.is_none() {
            writer.set_json(".zattrs", &json!({}))?;
        }
        Ok(writer)
    }

    /// Use a fixed chunk shape for data arrays instead of the default
    #[must_use]
    pub fn with_chunks(mut self, chunk_shape: Vec<usize>) -> Self {
        self.chunk_shape = Some(chunk_shape);
        self
    }

    /// Default chunking: whole trailing 2-D plane, one index along leading dimensions
    fn default_chunks(shape: &[usize]) -> Vec<usize> {
        let n = shape.len();
        shape
            .iter()
            .enumerate()
            .map(|(i, &len)| if i + 2 >= n { len.max(1) } else { 1 })
            .collect()
    }

    /// Write an `<f4` array with NaN fill
    pub fn write_array(
        &self,
        name: &str,
        data: &ArrayD<f32>,
        dims: &[String],
        attributes: Map<String, JsonValue>,
    ) -> Result<()> {
        let chunks = match &self.chunk_shape {
            Some(c) if c.len() == data.ndim() => c.clone(),
            Some(c) => {
                return Err(RuZaVisError::InvalidArgument(format!(
                    "chunk shape {c:?} does not match {} dimensions",
                    data.ndim()
                )))
            }
            None => Self::default_chunks(data.shape()),
        };
        self.write_chunked(
            name,
            data,
            &chunks,
            dims,
            attributes,
            "<f4",
            (f32::NAN, FillValueMetadata::from("NaN")),
        )
    }

    /// Write a coordinate variable: time as `<i8` seconds, numeric as `<f8`
    ///
    /// Text coordinates cannot be stored this way and return `false`.
    pub fn write_coordinate(&self, coordinate: &Coordinate) -> Result<bool> {
        let dims = [coordinate.name.clone()];
        let len = coordinate.len();
        match &coordinate.values {
            CoordValues::Time(values) => {
                let seconds: Vec<i64> = values.iter().map(epoch_seconds).collect();
                let data = ArrayD::from_shape_vec(vec![len], seconds)?;
                let mut attrs = Map::new();
                attrs.insert("units".into(), json!(TIME_UNITS));
                attrs.insert("calendar".into(), json!("proleptic_gregorian"));
                self.write_chunked(
                    &coordinate.name,
                    &data,
                    &[len.max(1)],
                    &dims,
                    attrs,
                    "<i8",
                    (0_i64, FillValueMetadata::from(0_i64)),
                )?;
            }
            CoordValues::Numeric(values) => {
                let data = ArrayD::from_shape_vec(vec![len], values.clone())?;
                self.write_chunked(
                    &coordinate.name,
                    &data,
                    &[len.max(1)],
                    &dims,
                    Map::new(),
                    "<f8",
                    (f64::NAN, FillValueMetadata::from("NaN")),
                )?;
            }
            CoordValues::Labels(_) => return Ok(false),
        }
        Ok(true)
    }

    /// Replace the array `name` with `data`, stored uncompressed in `chunks`
    #[allow(clippy::too_many_arguments)]
    fn write_chunked<T>(
        &self,
        name: &str,
        data: &ArrayD<T>,
        chunks: &[usize],
        dims: &[String],
        mut attributes: Map<String, JsonValue>,
        dtype: &str,
        (fill, fill_metadata): (T, FillValueMetadata),
    ) -> Result<()>
    where
        T: Element + Clone + Send + Sync,
    {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(RuZaVisError::InvalidArgument(format!(
                "'{name}' is not a valid array name"
            )));
        }
        if dims.len() != data.ndim() {
            return Err(RuZaVisError::InvalidArgument(format!(
                "{} dimension names for '{name}' with {} dimensions",
                dims.len(),
                data.ndim()
            )));
        }
        let chunk_shape = chunks
            .iter()
            .map(|&c| NonZeroU64::new(c as u64))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                RuZaVisError::InvalidArgument(format!("chunk shape {chunks:?} has a zero extent"))
            })?;

        let prefix = StorePrefix::new(format!("{name}/"))
            .map_err(|e| RuZaVisError::Store(e.to_string()))?;
        self.store.erase_prefix(&prefix)?;

        let shape = data.shape().to_vec();
        let metadata = ArrayMetadataV2::new(
            shape.iter().map(|&n| n as u64).collect(),
            chunk_shape
                .try_into()
                .map_err(|e| RuZaVisError::InvalidArgument(format!("chunk shape {chunks:?}: {e:?}")))?,
            DataTypeMetadataV2::Simple(dtype.to_string()),
            fill_metadata,
            None,
            None,
        );
        let mut array = Array::new_with_metadata(
            self.store.clone(),
            &format!("/{name}"),
            ArrayMetadata::V2(metadata),
        )?;
        attributes.insert("_ARRAY_DIMENSIONS".into(), json!(dims));
        array.attributes_mut().extend(attributes);
        array.store_metadata()?;

        let grid: Vec<usize> = shape
            .iter()
            .zip(chunks)
            .map(|(len, chunk)| len.div_ceil(*chunk))
            .collect();
        let num_chunks: usize = grid.iter().product();

        log::info!(
            "Writing array '{name}' {shape:?} in {num_chunks} chunks of {chunks:?} across {} threads",
            rayon::current_num_threads()
        );

        // edge chunks are padded to the full chunk shape with the fill value
        (0..num_chunks).into_par_iter().try_for_each(|flat| -> Result<()> {
            let index = unravel(flat, &grid);
            let mut chunk = ArrayD::from_elem(chunks.to_vec(), fill.clone());
            let source = data.slice_each_axis(|ax| {
                let start = index[ax.axis.index()] * chunks[ax.axis.index()];
                let end = (start + chunks[ax.axis.index()]).min(ax.len);
                Slice::from(start..end)
            });
            chunk
                .slice_each_axis_mut(|ax| Slice::from(0..source.shape()[ax.axis.index()]))
                .assign(&source);

            let chunk_indices: Vec<u64> = index.iter().map(|&i| i as u64).collect();
            array.store_chunk(&chunk_indices, chunk)?;
            Ok(())
        })
    }

    fn set_json(&self, key: &str, value: &JsonValue) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.store.set(&store_key(key)?, bytes.into())?;
        Ok(())
    }

    fn get_json(&self, key: &str) -> Result<Option<JsonValue>> {
        match self.store.get(&store_key(key)?)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write `.zmetadata` covering every array directly under the group
    pub fn consolidate(&self) -> Result<()> {
        let mut metadata = Map::new();
        for key in [".zgroup", ".zattrs"] {
            if let Some(value) = self.get_json(key)? {
                metadata.insert(key.to_string(), value);
            }
        }

        let listing = self.store.list_dir(&StorePrefix::root())?;
        let mut names: Vec<String> = listing
            .prefixes()
            .iter()
            .map(|p| p.as_str().trim_end_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();

        let mut arrays = 0;
        for name in &names {
            let Some(zarray) = self.get_json(&format!("{name}/.zarray"))? else {
                continue;
            };
            metadata.insert(format!("{name}/.zarray"), zarray);
            if let Some(zattrs) = self.get_json(&format!("{name}/.zattrs"))? {
                metadata.insert(format!("{name}/.zattrs"), zattrs);
            }
            arrays += 1;
        }

        let consolidated = json!({
            "metadata": metadata,
            "zarr_consolidated_format": 1
        });
        self.set_json(".zmetadata", &consolidated)?;
        log::debug!("Consolidated {arrays} arrays in {}", self.root.display());
        Ok(())
    }

    /// Write a selection with its coordinates and consolidate the group
    pub fn write_selection(&self, selected: &SelectedArray) -> Result<()> {
        println!(
            "✏️ Writing selection '{}' {:?} to {}",
            selected.variable,
            selected.shape(),
            self.root.display()
        );

        let mut attributes = Map::new();
        if let Some(units) = &selected.units {
            attributes.insert("units".into(), json!(units));
        }
        if !selected.fixed.is_empty() {
            let fixed: Map<String, JsonValue> = selected
                .fixed
                .iter()
                .map(|(d, l)| (d.clone(), json!(l)))
                .collect();
            attributes.insert("selection".into(), JsonValue::Object(fixed));
        }
        if !selected.reductions.is_empty() {
            let methods: Vec<String> = selected
                .reductions
                .iter()
                .map(|(op, dim)| format!("{dim}: {op}"))
                .collect();
            attributes.insert("cell_methods".into(), json!(methods.join(" ")));
        }

        let mut labels = Map::new();
        for coordinate in selected.coords.iter().flatten() {
            if !self.write_coordinate(coordinate)? {
                let values: Vec<String> = (0..coordinate.len())
                    .filter_map(|i| coordinate.label(i))
                    .collect();
                labels.insert(coordinate.name.clone(), json!(values));
            }
        }
        if !labels.is_empty() {
            attributes.insert("coordinate_labels".into(), JsonValue::Object(labels));
        }

        self.write_array(&selected.variable, &selected.data, &selected.dims, attributes)?;
        self.consolidate()?;

        println!("✅ Successfully wrote '{}'", selected.variable);
        Ok(())
    }
}

fn epoch_seconds(t: &NaiveDateTime) -> i64 {
    (*t - NaiveDateTime::default()).num_seconds()
}

fn unravel(mut flat: usize, grid: &[usize]) -> Vec<usize> {
    let mut index = vec![0; grid.len()];
    for (i, &n) in grid.iter().enumerate().rev() {
        index[i] = flat % n;
        flat /= n;
    }
    index
}

fn store_key(key: &str) -> Result<StoreKey> {
    StoreKey::new(key).map_err(|e| RuZaVisError::Store(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unravels_in_c_order() {
        assert_eq!(unravel(0, &[2, 3]), vec![0, 0]);
        assert_eq!(unravel(4, &[2, 3]), vec![1, 1]);
        assert_eq!(unravel(0, &[]), Vec::<usize>::new());
    }

    #[test]
    fn default_chunks_split_leading_dimensions() {
        assert_eq!(ZarrWriter::default_chunks(&[5, 4, 3]), vec![1, 4, 3]);
        assert_eq!(ZarrWriter::default_chunks(&[7]), vec![7]);
        assert_eq!(ZarrWriter::default_chunks(&[0, 2]), vec![1, 2]);
    }

    #[test]
    fn pads_edge_chunks_with_fill() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ZarrWriter::create(dir.path()).unwrap().with_chunks(vec![2, 2]);
        let data = ArrayD::from_shape_vec(vec![3, 3], (0..9).map(|v| v as f32).collect()).unwrap();
        writer
            .write_array("v", &data, &["y".into(), "x".into()], Map::new())
            .unwrap();

        let zarray = writer.get_json("v/.zarray").unwrap().unwrap();
        assert_eq!(zarray["dtype"], "<f4");
        assert_eq!(zarray["chunks"], json!([2, 2]));
        assert!(zarray["compressor"].is_null());

        let store = Arc::new(FilesystemStore::new(dir.path()).unwrap());
        let array = Array::open(store, "/v").unwrap();
        let corner: ArrayD<f32> = array.retrieve_chunk(&[1, 1]).unwrap();
        assert_eq!(corner.shape(), &[2, 2]);
        assert_eq!(corner[[0, 0]], 8.0);
        assert!(corner[[0, 1]].is_nan());
        assert!(corner[[1, 1]].is_nan());

        writer.consolidate().unwrap();
        let zmeta = writer.get_json(".zmetadata").unwrap().unwrap();
        assert_eq!(zmeta["metadata"]["v/.zattrs"]["_ARRAY_DIMENSIONS"], json!(["y", "x"]));
        assert!(zmeta["metadata"].get("v/.zarray").is_some());
    }

    #[test]
    fn rejects_zero_chunks_and_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let data = ArrayD::from_elem(vec![2], 1.0_f32);
        let writer = ZarrWriter::create(dir.path()).unwrap().with_chunks(vec![0]);
        assert!(writer.write_array("v", &data, &["x".into()], Map::new()).is_err());

        let writer = ZarrWriter::create(dir.path()).unwrap();
        assert!(writer.write_array(".hidden", &data, &["x".into()], Map::new()).is_err());
        assert!(writer.write_array("v", &data, &[], Map::new()).is_err());
    }
}
