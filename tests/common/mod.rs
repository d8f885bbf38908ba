//! Fixtures shared by the integration tests

#![allow(dead_code)]

use arrow::array::{ArrayRef, Float64Array, Int64Array, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use ndarray::ArrayD;
use parquet::arrow::ArrowWriter;
use ru_za_vis::coords::{CoordValues, Coordinate};
use ru_za_vis::export::ZarrWriter;
use serde_json::{json, Map};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// 2020-07-01 at `h:m`
pub fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 7, 1)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// Value stored at `(t, y, x)` in the HRV fixture
pub fn hrv_value(t: usize, y: usize, x: usize) -> f32 {
    (t * 100 + y * 10 + x) as f32
}

/// A `(time, y, x, channel)` store like the HRV satellite data
///
/// - `time`: every 5 minutes from 2020-07-01T08:00
/// - `y`: descending `ny-1, ..., 0` (north up)
/// - `x`: ascending `0.0, 0.5, ...`
/// - `channel`: length 1, no coordinate
pub fn write_hrv(dir: &Path, times: usize, ny: usize, nx: usize) -> PathBuf {
    let root = dir.join("hrv.zarr");
    let writer = ZarrWriter::create(&root).unwrap();

    let data = ArrayD::from_shape_fn(vec![times, ny, nx, 1], |ix| hrv_value(ix[0], ix[1], ix[2]));
    let mut attrs = Map::new();
    attrs.insert("units".into(), json!("reflectance"));
    writer
        .write_array("data", &data, &dims(&["time", "y", "x", "channel"]), attrs)
        .unwrap();

    let time = (0..times)
        .map(|i| at(8, 0) + Duration::minutes(5 * i as i64))
        .collect();
    writer
        .write_coordinate(&Coordinate::new("time", CoordValues::Time(time)))
        .unwrap();
    let y = (0..ny).rev().map(|v| v as f64).collect();
    writer
        .write_coordinate(&Coordinate::new("y", CoordValues::Numeric(y)))
        .unwrap();
    let x = (0..nx).map(|v| v as f64 * 0.5).collect();
    writer
        .write_coordinate(&Coordinate::new("x", CoordValues::Numeric(x)))
        .unwrap();

    writer.consolidate().unwrap();
    root
}

/// Write `bytes` at `key` below `root`, creating parent directories
pub fn put(root: &Path, key: &str, bytes: &[u8]) {
    let path = root.join(key);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// An unconsolidated v2 group laid out the way xarray writes it
///
/// - `data`: `<f4` over `(time, channel)`, values `1, 2, 3`
/// - `time`: `<M8[ns]` at 08:00, 08:05 and 08:10
/// - `channel`: `<U6` holding `"HRV"`
/// - `temp`: packed `<i2` over `x` with fill `-32767`, only its first chunk stored
pub fn write_xarray_v2(dir: &Path) -> PathBuf {
    let root = dir.join("xarray.zarr");
    put(&root, ".zgroup", br#"{"zarr_format": 2}"#);
    put(&root, ".zattrs", b"{}");

    let zarray = |dtype: &str, shape: &[u64], chunks: &[u64], fill: serde_json::Value| {
        json!({
            "shape": shape,
            "chunks": chunks,
            "dtype": dtype,
            "fill_value": fill,
            "compressor": null,
            "filters": null,
            "order": "C",
            "zarr_format": 2
        })
        .to_string()
    };

    put(&root, "data/.zarray", zarray("<f4", &[3, 1], &[3, 1], json!("NaN")).as_bytes());
    put(&root, "data/.zattrs", br#"{"_ARRAY_DIMENSIONS": ["time", "channel"]}"#);
    let data: Vec<u8> = [1.0_f32, 2.0, 3.0].iter().flat_map(|v| v.to_le_bytes()).collect();
    put(&root, "data/0.0", &data);

    put(&root, "time/.zarray", zarray("<M8[ns]", &[3], &[3], json!(null)).as_bytes());
    put(&root, "time/.zattrs", br#"{"_ARRAY_DIMENSIONS": ["time"]}"#);
    let ticks: Vec<u8> = [at(8, 0), at(8, 5), at(8, 10)]
        .iter()
        .flat_map(|t| t.and_utc().timestamp_nanos_opt().unwrap().to_le_bytes())
        .collect();
    put(&root, "time/0", &ticks);

    put(&root, "channel/.zarray", zarray("<U6", &[1], &[1], json!(null)).as_bytes());
    put(&root, "channel/.zattrs", br#"{"_ARRAY_DIMENSIONS": ["channel"]}"#);
    let mut label: Vec<u8> = "HRV".chars().flat_map(|c| (c as u32).to_le_bytes()).collect();
    label.resize(6 * 4, 0);
    put(&root, "channel/0", &label);

    put(&root, "temp/.zarray", zarray("<i2", &[4], &[2], json!(-32767)).as_bytes());
    put(
        &root,
        "temp/.zattrs",
        br#"{"_ARRAY_DIMENSIONS": ["x"], "scale_factor": 0.01, "add_offset": 273.15}"#,
    );
    let packed: Vec<u8> = [100_i16, -32767].iter().flat_map(|v| v.to_le_bytes()).collect();
    put(&root, "temp/0", &packed);

    root
}

/// Pack the store at `root` into `<root>.zip`, entries named relative to `root`
pub fn zip_store(root: &Path) -> PathBuf {
    let archive = root.with_extension("zarr.zip");
    let mut writer = ZipWriter::new(fs::File::create(&archive).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let name = path.strip_prefix(root).unwrap().to_str().unwrap().replace('\\', "/");
            writer.start_file(name, options).unwrap();
            writer.write_all(&fs::read(&path).unwrap()).unwrap();
        }
    }
    writer.finish().unwrap();
    archive
}

pub fn dims(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Write PV rows `(timestamp, ss_id, power)` the way the published parquet files lay them out
pub fn write_pv_parquet(path: &Path, rows: &[(NaiveDateTime, i64, Option<f64>)]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("timestamp", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
        Field::new("ss_id", DataType::Int64, false),
        Field::new("generation_wh", DataType::Float64, true),
        Field::new("power", DataType::Float64, true),
    ]));

    let timestamps: Vec<i64> = rows
        .iter()
        .map(|(t, _, _)| t.and_utc().timestamp_nanos_opt().unwrap())
        .collect();
    let ids: Vec<i64> = rows.iter().map(|(_, id, _)| *id).collect();
    let power: Vec<Option<f64>> = rows.iter().map(|(_, _, p)| *p).collect();
    let generation: Vec<Option<f64>> = power.iter().map(|p| p.map(|v| v * 1000.0 / 12.0)).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampNanosecondArray::from(timestamps)),
        Arc::new(Int64Array::from(ids)),
        Arc::new(Float64Array::from(generation)),
        Arc::new(Float64Array::from(power)),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();

    let file = std::fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// Twelve 5-minute readings per hour from `start` for `hours` hours
pub fn pv_rows(ss_id: i64, start: NaiveDateTime, hours: usize) -> Vec<(NaiveDateTime, i64, Option<f64>)> {
    (0..hours * 12)
        .map(|i| (start + Duration::minutes(5 * i as i64), ss_id, Some(i as f64 / 100.0)))
        .collect()
}
