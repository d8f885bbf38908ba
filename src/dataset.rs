//! Opened datasets: variable discovery, coordinates and hyper-slab reads
//!
//! A [`Dataset`] is a read-only view of a Zarr group written by xarray (or any
//! other tool following the same conventions). Variable metadata is parsed from
//! the raw JSON documents, preferring consolidated metadata so that a remote
//! archive is described with a single request. Array handles are opened lazily
//! and kept for the lifetime of the dataset.
//!
//! All methods here perform blocking I/O. Async callers go through
//! [`crate::reader`].

use crate::coords::{self, CoordValues, Coordinate};
use crate::errors::{Result, RuZaVisError};
use crate::store::{open_store, StoreHandle, StoreLocation};
use ndarray::ArrayD;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::{Arc, Mutex};
use zarrs::array::{Array, ArrayBytes, ArrayMetadata, ArrayMetadataV2, ArraySubset};
use zarrs::storage::ReadableStorageTraits;

type ZarrArray = Array<dyn ReadableStorageTraits>;

/// Element type of a stored variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    /// numpy `datetime64` with its unit (`ns`, `s`, ...)
    DateTime64(String),
    /// Variable length or fixed width text, with the fixed width in characters if any
    Text(Option<usize>),
    Other(String),
}

impl ElementKind {
    /// Parse a Zarr v2 `dtype` string such as `<f4`, `|u1` or `<M8[ns]`
    #[must_use]
    pub fn from_v2(dtype: &str) -> Self {
        let code = dtype.trim_start_matches(['<', '>', '|', '=']);
        match code {
            "f4" => Self::F32,
            "f8" => Self::F64,
            "i1" => Self::I8,
            "i2" => Self::I16,
            "i4" => Self::I32,
            "i8" => Self::I64,
            "u1" => Self::U8,
            "u2" => Self::U16,
            "u4" => Self::U32,
            "u8" => Self::U64,
            "O" => Self::Text(None),
            _ if code.starts_with("M8[") && code.ends_with(']') => {
                Self::DateTime64(code[3..code.len() - 1].to_string())
            }
            _ if code.starts_with('U') || code.starts_with('S') => {
                Self::Text(code[1..].parse().ok())
            }
            _ => Self::Other(dtype.to_string()),
        }
    }

    /// Parse a Zarr v3 `data_type` (a name or an object with `name` and `configuration`)
    #[must_use]
    pub fn from_v3(data_type: &JsonValue) -> Self {
        let name = data_type
            .as_str()
            .or_else(|| data_type.get("name").and_then(JsonValue::as_str))
            .unwrap_or("unknown");
        match name {
            "float32" => Self::F32,
            "float64" => Self::F64,
            "int8" => Self::I8,
            "int16" => Self::I16,
            "int32" => Self::I32,
            "int64" => Self::I64,
            "uint8" => Self::U8,
            "uint16" => Self::U16,
            "uint32" => Self::U32,
            "uint64" => Self::U64,
            "string" => Self::Text(None),
            "numpy.datetime64" => {
                let unit = data_type
                    .pointer("/configuration/unit")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("ns");
                Self::DateTime64(unit.to_string())
            }
            other => Self::Other(other.to_string()),
        }
    }

    /// Size of one element in bytes, when fixed
    #[must_use]
    pub fn size_bytes(&self) -> Option<usize> {
        match self {
            Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 => Some(2),
            Self::F32 | Self::I32 | Self::U32 => Some(4),
            Self::F64 | Self::I64 | Self::U64 | Self::DateTime64(_) => Some(8),
            Self::Text(Some(width)) => Some(width * 4),
            Self::Text(None) | Self::Other(_) => None,
        }
    }

    /// Whether values convert to floating point
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text(_) | Self::Other(_) | Self::DateTime64(_))
    }
}

/// Metadata for one variable (a Zarr array in the dataset group)
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub name: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    pub kind: ElementKind,
    /// Numeric `fill_value` of the array metadata, which also marks chunks never written
    pub fill_value: Option<f64>,
    pub attributes: Map<String, JsonValue>,
}

impl VariableInfo {
    /// Build from v2 `.zarray` and `.zattrs` documents
    pub fn from_v2(name: &str, zarray: &JsonValue, zattrs: Option<&JsonValue>) -> Result<Self> {
        let shape = json_u64_list(zarray.get("shape"), name, "shape")?;
        let chunks = json_u64_list(zarray.get("chunks"), name, "chunks").unwrap_or_default();
        let dtype = match zarray.get("dtype") {
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(RuZaVisError::Store(format!(
                    "array '{name}' metadata has no dtype"
                )))
            }
        };
        let attributes = zattrs
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default();
        let dimensions = dimension_names(
            attributes.get("_ARRAY_DIMENSIONS"),
            shape.len(),
        );

        Ok(Self {
            name: name.to_string(),
            dimensions,
            shape,
            chunks,
            kind: ElementKind::from_v2(&dtype),
            fill_value: numeric_fill(zarray.get("fill_value")),
            dtype,
            attributes,
        })
    }

    /// Build from a v3 `zarr.json` array document
    pub fn from_v3(name: &str, zarr_json: &JsonValue) -> Result<Self> {
        let shape = json_u64_list(zarr_json.get("shape"), name, "shape")?;
        let chunks = json_u64_list(
            zarr_json.pointer("/chunk_grid/configuration/chunk_shape"),
            name,
            "chunk_shape",
        )
        .unwrap_or_default();
        let data_type = zarr_json.get("data_type").cloned().unwrap_or(JsonValue::Null);
        let dtype = match &data_type {
            JsonValue::String(s) => s.clone(),
            other => other
                .get("name")
                .and_then(JsonValue::as_str)
                .map_or_else(|| other.to_string(), str::to_string),
        };
        let attributes = zarr_json
            .get("attributes")
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default();
        let names = zarr_json
            .get("dimension_names")
            .filter(|v| !v.is_null())
            .or_else(|| attributes.get("_ARRAY_DIMENSIONS"));
        let dimensions = dimension_names(names, shape.len());

        Ok(Self {
            name: name.to_string(),
            dimensions,
            shape,
            chunks,
            kind: ElementKind::from_v3(&data_type),
            fill_value: numeric_fill(zarr_json.get("fill_value")),
            dtype,
            attributes,
        })
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[must_use]
    pub fn total_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Position of a dimension by name
    pub fn axis_of(&self, dim: &str) -> Result<usize> {
        self.dimensions
            .iter()
            .position(|d| d == dim)
            .ok_or_else(|| RuZaVisError::DimensionNotFound {
                var: self.name.clone(),
                dim: dim.to_string(),
            })
    }

    /// Whether this variable is the coordinate of its own (single) dimension
    #[must_use]
    pub fn is_coordinate(&self) -> bool {
        self.dimensions.len() == 1 && self.dimensions[0] == self.name
    }

    /// A string attribute such as `units` or `long_name`
    #[must_use]
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(JsonValue::as_str)
    }

    /// A numeric attribute such as `scale_factor`
    #[must_use]
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.parse().ok(),
            JsonValue::Array(values) => values.first().and_then(JsonValue::as_f64),
            _ => None,
        }
    }
}

fn json_u64_list(value: Option<&JsonValue>, name: &str, field: &str) -> Result<Vec<u64>> {
    value
        .and_then(JsonValue::as_array)
        .ok_or_else(|| RuZaVisError::Store(format!("array '{name}' metadata has no {field}")))?
        .iter()
        .map(|v| {
            v.as_u64().ok_or_else(|| {
                RuZaVisError::Store(format!("array '{name}' has an invalid {field} entry: {v}"))
            })
        })
        .collect()
}

/// Fill values given as numbers; `"NaN"` and other encodings need no masking
fn numeric_fill(value: Option<&JsonValue>) -> Option<f64> {
    value.and_then(JsonValue::as_f64).filter(|v| v.is_finite())
}

fn dimension_names(value: Option<&JsonValue>, ndim: usize) -> Vec<String> {
    let names: Vec<Option<String>> = value
        .and_then(JsonValue::as_array)
        .map(|names| {
            names
                .iter()
                .map(|n| n.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    (0..ndim)
        .map(|i| {
            names
                .get(i)
                .cloned()
                .flatten()
                .unwrap_or_else(|| format!("dim_{i}"))
        })
        .collect()
}

/// An opened dataset
pub struct Dataset {
    store: StoreHandle,
    variables: BTreeMap<String, VariableInfo>,
    arrays: Mutex<HashMap<String, Arc<ZarrArray>>>,
    coordinates: Mutex<HashMap<String, Option<Coordinate>>>,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("location", self.store.location())
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dataset {
    /// Open a dataset and discover its variables
    pub fn open(location: &StoreLocation) -> Result<Self> {
        let store = open_store(location)?;
        let variables = discover_variables(&store)?;
        log::info!(
            "Discovered {} variables in {}",
            variables.len(),
            store.location()
        );
        Ok(Self {
            store,
            variables,
            arrays: Mutex::new(HashMap::new()),
            coordinates: Mutex::new(HashMap::new()),
        })
    }

    /// Open from a location string
    pub fn open_str(location: &str) -> Result<Self> {
        Self::open(&StoreLocation::parse(location)?)
    }

    #[must_use]
    pub fn location(&self) -> &StoreLocation {
        self.store.location()
    }

    /// All variables, sorted by name
    pub fn variables(&self) -> impl Iterator<Item = &VariableInfo> {
        self.variables.values()
    }

    /// Variables that are not coordinates of a dimension
    pub fn data_variables(&self) -> impl Iterator<Item = &VariableInfo> {
        self.variables.values().filter(|v| !v.is_coordinate())
    }

    /// Names of all dimensions with their lengths, sorted by name
    #[must_use]
    pub fn dimensions(&self) -> BTreeMap<String, u64> {
        let mut dims = BTreeMap::new();
        for var in self.variables.values() {
            for (name, len) in var.dimensions.iter().zip(&var.shape) {
                dims.entry(name.clone()).or_insert(*len);
            }
        }
        dims
    }

    /// Metadata of one variable
    pub fn variable(&self, name: &str) -> Result<&VariableInfo> {
        self.variables
            .get(name)
            .ok_or_else(|| RuZaVisError::VariableNotFound {
                var: name.to_string(),
            })
    }

    /// Whether a coordinate variable exists for `dim`
    #[must_use]
    pub fn has_coordinate(&self, dim: &str) -> bool {
        self.variables.get(dim).is_some_and(VariableInfo::is_coordinate)
    }

    /// Read and decode the coordinate of `dim`, `None` when the dimension has none
    pub fn coordinate(&self, dim: &str) -> Result<Option<Coordinate>> {
        if let Some(cached) = lock(&self.coordinates).get(dim) {
            return Ok(cached.clone());
        }

        let coordinate = if self.has_coordinate(dim) {
            let info = self.variable(dim)?;
            match self.decode_coordinate(info) {
                Ok(c) => Some(c),
                Err(e) => {
                    log::warn!("Coordinate '{dim}' could not be decoded ({e}); positional selection only");
                    None
                }
            }
        } else {
            None
        };

        lock(&self.coordinates).insert(dim.to_string(), coordinate.clone());
        Ok(coordinate)
    }

    fn decode_coordinate(&self, info: &VariableInfo) -> Result<Coordinate> {
        let array = self.array(&info.name)?;
        let subset = ArraySubset::new_with_ranges(&[0..info.shape[0]]);
        let units = info.attr_str("units").filter(|u| u.contains(" since "));

        let values = match (&info.kind, units) {
            (ElementKind::DateTime64(unit), _) => {
                let raw = array.retrieve_array_subset::<Vec<i64>>(&subset)?;
                CoordValues::Time(coords::decode_datetime64(&raw, unit)?)
            }
            (ElementKind::I64, Some(units)) => {
                let raw = array.retrieve_array_subset::<Vec<i64>>(&subset)?;
                CoordValues::Time(coords::decode_time_i64(&raw, units)?)
            }
            (kind, Some(units)) if kind.is_numeric() => {
                let raw = read_as_f64(&array, &subset, info)?;
                CoordValues::Time(coords::decode_time_f64(&raw, units)?)
            }
            (kind, None) if kind.is_numeric() => {
                CoordValues::Numeric(read_as_f64(&array, &subset, info)?)
            }
            (ElementKind::Text(width), _) => CoordValues::Labels(read_text(&array, &subset, *width)?),
            (_, _) => {
                return Err(RuZaVisError::UnsupportedDataType {
                    var: info.name.clone(),
                    dtype: info.dtype.clone(),
                })
            }
        };

        Ok(Coordinate::new(info.name.clone(), values))
    }

    /// Read a hyper-slab of a variable as `f32`, with CF fill values masked and scaling applied
    pub fn read(&self, var: &str, ranges: &[Range<u64>]) -> Result<ArrayD<f32>> {
        let info = self.variable(var)?;
        if ranges.len() != info.ndim() {
            return Err(RuZaVisError::InvalidSelection {
                message: format!(
                    "'{var}' has {} dimensions but {} ranges were given",
                    info.ndim(),
                    ranges.len()
                ),
            });
        }
        for ((range, len), dim) in ranges.iter().zip(&info.shape).zip(&info.dimensions) {
            if range.start >= range.end || range.end > *len {
                return Err(RuZaVisError::InvalidSelection {
                    message: format!(
                        "range {}..{} is invalid for dimension '{dim}' of length {len}",
                        range.start, range.end
                    ),
                });
            }
        }

        let array = self.array(var)?;
        let subset = ArraySubset::new_with_ranges(ranges);
        log::debug!("Reading {var} {ranges:?}");
        let mut data = read_as_f32(&array, &subset, info)?;
        apply_cf_decoding(&mut data, info);
        Ok(data)
    }

    /// Read a whole variable
    pub fn read_all(&self, var: &str) -> Result<ArrayD<f32>> {
        let info = self.variable(var)?;
        let ranges: Vec<Range<u64>> = info.shape.iter().map(|&len| 0..len).collect();
        self.read(var, &ranges)
    }

    fn array(&self, name: &str) -> Result<Arc<ZarrArray>> {
        if let Some(array) = lock(&self.arrays).get(name) {
            return Ok(array.clone());
        }
        let path = format!("/{name}");
        let array = match &self.variable(name)?.kind {
            ElementKind::DateTime64(_) => self.open_datetime64(name, &path)?,
            _ => Array::open(self.store.readable(), &path)?,
        };
        let array = Arc::new(array);
        lock(&self.arrays).insert(name.to_string(), array.clone());
        Ok(array)
    }
}

impl Dataset {
    /// zarrs has no v2 `<M8` data type; the ticks are read as `<i8` of the same byte order
    fn open_datetime64(&self, name: &str, path: &str) -> Result<ZarrArray> {
        let Some(bytes) = self.store.get(&format!("{name}/.zarray"))? else {
            return Ok(Array::open(self.store.readable(), path)?);
        };
        let mut zarray: JsonValue = serde_json::from_slice(&bytes)?;
        if !zarray.is_object() {
            return Err(RuZaVisError::Store(format!("'{name}/.zarray' is not an object")));
        }
        let order = zarray
            .get("dtype")
            .and_then(JsonValue::as_str)
            .and_then(|d| d.chars().next())
            .filter(|c| matches!(c, '<' | '>'))
            .unwrap_or('<');
        zarray["dtype"] = JsonValue::String(format!("{order}i8"));
        if !zarray["fill_value"].is_i64() {
            zarray["fill_value"] = JsonValue::Null;
        }
        log::debug!("Reading datetime64 array '{name}' as {order}i8");

        let metadata: ArrayMetadataV2 = serde_json::from_value(zarray)?;
        Ok(Array::new_with_metadata(
            self.store.readable(),
            path,
            ArrayMetadata::V2(metadata),
        )?)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

macro_rules! retrieve_cast {
    ($array:expr, $subset:expr, $ty:ty, $out:ty) => {
        $array
            .retrieve_array_subset::<ArrayD<$ty>>($subset)?
            .mapv(|v| v as $out)
    };
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn read_as_f32(array: &ZarrArray, subset: &ArraySubset, info: &VariableInfo) -> Result<ArrayD<f32>> {
    let data = match info.kind {
        ElementKind::F32 => array.retrieve_array_subset::<ArrayD<f32>>(subset)?,
        ElementKind::F64 => retrieve_cast!(array, subset, f64, f32),
        ElementKind::I8 => retrieve_cast!(array, subset, i8, f32),
        ElementKind::I16 => retrieve_cast!(array, subset, i16, f32),
        ElementKind::I32 => retrieve_cast!(array, subset, i32, f32),
        ElementKind::I64 => retrieve_cast!(array, subset, i64, f32),
        ElementKind::U8 => retrieve_cast!(array, subset, u8, f32),
        ElementKind::U16 => retrieve_cast!(array, subset, u16, f32),
        ElementKind::U32 => retrieve_cast!(array, subset, u32, f32),
        ElementKind::U64 => retrieve_cast!(array, subset, u64, f32),
        _ => {
            return Err(RuZaVisError::UnsupportedDataType {
                var: info.name.clone(),
                dtype: info.dtype.clone(),
            })
        }
    };
    Ok(data)
}

#[allow(clippy::cast_precision_loss)]
fn read_as_f64(array: &ZarrArray, subset: &ArraySubset, info: &VariableInfo) -> Result<Vec<f64>> {
    let data = match info.kind {
        ElementKind::F32 => retrieve_cast!(array, subset, f32, f64),
        ElementKind::F64 => array.retrieve_array_subset::<ArrayD<f64>>(subset)?,
        ElementKind::I8 => retrieve_cast!(array, subset, i8, f64),
        ElementKind::I16 => retrieve_cast!(array, subset, i16, f64),
        ElementKind::I32 => retrieve_cast!(array, subset, i32, f64),
        ElementKind::I64 => retrieve_cast!(array, subset, i64, f64),
        ElementKind::U8 => retrieve_cast!(array, subset, u8, f64),
        ElementKind::U16 => retrieve_cast!(array, subset, u16, f64),
        ElementKind::U32 => retrieve_cast!(array, subset, u32, f64),
        ElementKind::U64 => retrieve_cast!(array, subset, u64, f64),
        _ => {
            return Err(RuZaVisError::UnsupportedDataType {
                var: info.name.clone(),
                dtype: info.dtype.clone(),
            })
        }
    };
    Ok(data.into_iter().collect())
}

/// Text coordinates: variable length strings, or fixed width UTF-32 (`<U`) decoded by hand
fn read_text(array: &ZarrArray, subset: &ArraySubset, width: Option<usize>) -> Result<Vec<String>> {
    let Some(width) = width else {
        return Ok(array.retrieve_array_subset::<Vec<String>>(subset)?);
    };
    let bytes = array.retrieve_array_subset::<ArrayBytes<'static>>(subset)?;
    let raw = bytes
        .into_fixed()
        .map_err(|e| RuZaVisError::Store(format!("text coordinate is not fixed width: {e}")))?;
    let raw: &[u8] = &raw;
    Ok(decode_utf32_fixed(raw, width))
}

/// Decode little-endian UTF-32 strings of `width` characters, trailing NULs stripped
#[must_use]
pub fn decode_utf32_fixed(raw: &[u8], width: usize) -> Vec<String> {
    if width == 0 {
        return Vec::new();
    }
    raw.chunks_exact(width * 4)
        .map(|item| {
            item.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .take_while(|&c| c != 0)
                .filter_map(char::from_u32)
                .collect()
        })
        .collect()
}

/// Mask the metadata fill value and `_FillValue`/`missing_value` to NaN, then
/// apply `scale_factor` and `add_offset`
#[allow(clippy::cast_possible_truncation)]
pub fn apply_cf_decoding(data: &mut ArrayD<f32>, info: &VariableInfo) {
    let fills: Vec<f32> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|key| info.attr_f64(key))
        .chain(info.fill_value)
        .filter(|v| !v.is_nan())
        .map(|v| v as f32)
        .collect();
    let scale = info.attr_f64("scale_factor").map(|v| v as f32);
    let offset = info.attr_f64("add_offset").map(|v| v as f32);

    if fills.is_empty() && scale.is_none() && offset.is_none() {
        return;
    }

    data.mapv_inplace(|v| {
        if fills.contains(&v) {
            f32::NAN
        } else {
            v * scale.unwrap_or(1.0) + offset.unwrap_or(0.0)
        }
    });
}

/// Find the dataset's arrays and parse their metadata
fn discover_variables(store: &StoreHandle) -> Result<BTreeMap<String, VariableInfo>> {
    if let Some(bytes) = store.get(".zmetadata")? {
        log::debug!("Using consolidated v2 metadata");
        let consolidated: JsonValue = serde_json::from_slice(&bytes)?;
        return from_consolidated_v2(&consolidated);
    }

    if let Some(bytes) = store.get("zarr.json")? {
        let root: JsonValue = serde_json::from_slice(&bytes)?;
        if let Some(metadata) = root
            .pointer("/consolidated_metadata/metadata")
            .and_then(JsonValue::as_object)
        {
            log::debug!("Using consolidated v3 metadata");
            let mut variables = BTreeMap::new();
            for (name, node) in metadata {
                if name.contains('/') || node.get("node_type").and_then(JsonValue::as_str) != Some("array") {
                    continue;
                }
                variables.insert(name.clone(), VariableInfo::from_v3(name, node)?);
            }
            return Ok(variables);
        }
    }

    let Some(prefixes) = store.list_root_prefixes()? else {
        return Err(RuZaVisError::Store(format!(
            "cannot discover variables in {}: no consolidated metadata and the store is not listable",
            store.location()
        )));
    };

    let mut variables = BTreeMap::new();
    for name in prefixes {
        if let Some(zarray) = store.get(&format!("{name}/.zarray"))? {
            let zarray: JsonValue = serde_json::from_slice(&zarray)?;
            let zattrs: Option<JsonValue> = store
                .get(&format!("{name}/.zattrs"))?
                .map(|b| serde_json::from_slice(&b))
                .transpose()?;
            variables.insert(name.clone(), VariableInfo::from_v2(&name, &zarray, zattrs.as_ref())?);
        } else if let Some(zarr_json) = store.get(&format!("{name}/zarr.json"))? {
            let node: JsonValue = serde_json::from_slice(&zarr_json)?;
            if node.get("node_type").and_then(JsonValue::as_str) == Some("array") {
                variables.insert(name.clone(), VariableInfo::from_v3(&name, &node)?);
            }
        }
    }
    Ok(variables)
}

/// Parse the `metadata` map of a v2 `.zmetadata` document
pub fn from_consolidated_v2(consolidated: &JsonValue) -> Result<BTreeMap<String, VariableInfo>> {
    let metadata = consolidated
        .get("metadata")
        .and_then(JsonValue::as_object)
        .ok_or_else(|| RuZaVisError::Store("consolidated metadata has no 'metadata' map".into()))?;

    let mut variables = BTreeMap::new();
    for (key, zarray) in metadata {
        let Some(name) = key.strip_suffix("/.zarray") else {
            continue;
        };
        if name.contains('/') {
            continue;
        }
        let zattrs = metadata.get(&format!("{name}/.zattrs"));
        variables.insert(name.to_string(), VariableInfo::from_v2(name, zarray, zattrs)?);
    }
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_v2_dtypes() {
        assert_eq!(ElementKind::from_v2("<f4"), ElementKind::F32);
        assert_eq!(ElementKind::from_v2("|u1"), ElementKind::U8);
        assert_eq!(
            ElementKind::from_v2("<M8[ns]"),
            ElementKind::DateTime64("ns".into())
        );
        assert_eq!(ElementKind::from_v2("<U6"), ElementKind::Text(Some(6)));
        assert_eq!(ElementKind::from_v2("|O"), ElementKind::Text(None));
        assert!(matches!(ElementKind::from_v2("<c8"), ElementKind::Other(_)));
    }

    #[test]
    fn parses_v3_dtypes() {
        assert_eq!(ElementKind::from_v3(&json!("int16")), ElementKind::I16);
        assert_eq!(
            ElementKind::from_v3(&json!({"name": "numpy.datetime64", "configuration": {"unit": "s", "scale_factor": 1}})),
            ElementKind::DateTime64("s".into())
        );
    }

    #[test]
    fn consolidated_metadata_lists_top_level_arrays() {
        let consolidated = json!({
            "zarr_consolidated_format": 1,
            "metadata": {
                ".zgroup": {"zarr_format": 2},
                "data/.zarray": {"shape": [4, 3, 2], "chunks": [1, 3, 2], "dtype": "<f4"},
                "data/.zattrs": {"_ARRAY_DIMENSIONS": ["time", "y", "x"], "units": "K"},
                "time/.zarray": {"shape": [4], "chunks": [4], "dtype": "<i8"},
                "time/.zattrs": {"_ARRAY_DIMENSIONS": ["time"], "units": "seconds since 2020-07-01"},
                "nested/inner/.zarray": {"shape": [1], "chunks": [1], "dtype": "<f4"}
            }
        });
        let vars = from_consolidated_v2(&consolidated).unwrap();
        assert_eq!(vars.len(), 2);
        let data = &vars["data"];
        assert_eq!(data.dimensions, vec!["time", "y", "x"]);
        assert_eq!(data.chunks, vec![1, 3, 2]);
        assert_eq!(data.attr_str("units"), Some("K"));
        assert!(!data.is_coordinate());
        assert!(vars["time"].is_coordinate());
    }

    #[test]
    fn unnamed_dimensions_get_placeholders() {
        let info = VariableInfo::from_v3(
            "v",
            &json!({"node_type": "array", "shape": [2, 5], "data_type": "float32",
                    "dimension_names": ["level", null]}),
        )
        .unwrap();
        assert_eq!(info.dimensions, vec!["level", "dim_1"]);
        assert!(info.axis_of("dim_1").is_ok());
        assert!(info.axis_of("time").is_err());
    }

    #[test]
    fn cf_decoding_masks_and_scales() {
        let mut info = VariableInfo::from_v2(
            "v",
            &json!({"shape": [3], "chunks": [3], "dtype": "<i2"}),
            Some(&json!({"_FillValue": -1, "scale_factor": 0.5, "add_offset": 10.0})),
        )
        .unwrap();
        let mut data = ArrayD::from_shape_vec(vec![3], vec![-1.0_f32, 0.0, 4.0]).unwrap();
        apply_cf_decoding(&mut data, &info);
        assert!(data[[0]].is_nan());
        assert_eq!(data[[1]], 10.0);
        assert_eq!(data[[2]], 12.0);

        info.attributes.clear();
        let mut untouched = ArrayD::from_shape_vec(vec![1], vec![-1.0_f32]).unwrap();
        apply_cf_decoding(&mut untouched, &info);
        assert_eq!(untouched[[0]], -1.0);
    }

    #[test]
    fn metadata_fill_value_is_masked_before_scaling() {
        let info = VariableInfo::from_v2(
            "t",
            &json!({"shape": [3], "chunks": [3], "dtype": "<i2", "fill_value": -32767}),
            Some(&json!({"scale_factor": 0.5, "add_offset": 1.0})),
        )
        .unwrap();
        assert_eq!(info.fill_value, Some(-32767.0));

        let mut data = ArrayD::from_shape_vec(vec![3], vec![-32767.0_f32, 2.0, -32767.0]).unwrap();
        apply_cf_decoding(&mut data, &info);
        assert!(data[[0]].is_nan());
        assert_eq!(data[[1]], 2.0);
        assert!(data[[2]].is_nan());

        let nan_fill = VariableInfo::from_v2(
            "v",
            &json!({"shape": [1], "chunks": [1], "dtype": "<f4", "fill_value": "NaN"}),
            None,
        )
        .unwrap();
        assert_eq!(nan_fill.fill_value, None);
    }

    #[test]
    fn decodes_fixed_width_utf32() {
        let mut raw = Vec::new();
        for s in ["HRV", "IR_016"] {
            let mut chars: Vec<u32> = s.chars().map(|c| c as u32).collect();
            chars.resize(6, 0);
            for c in chars {
                raw.extend_from_slice(&c.to_le_bytes());
            }
        }
        assert_eq!(decode_utf32_fixed(&raw, 6), vec!["HRV", "IR_016"]);
    }
}
