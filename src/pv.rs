//! Solar PV generation records
//!
//! PV data is published as monthly parquet files with one row per site and
//! five-minute timestamp, written from a pandas frame indexed by
//! `(timestamp, ss_id)`. Only the `timestamp`, `ss_id` and `power` columns are
//! read; other columns (such as `generation_wh`) are ignored.

use crate::coords::{CoordValues, Coordinate};
use crate::errors::{Result, RuZaVisError};
use crate::select::SelectedArray;
use crate::store::{read_file, StoreLocation};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{Duration, NaiveDateTime};
use ndarray::Array2;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::ChunkReader;
use std::collections::BTreeMap;
use std::path::Path;

/// Time series of one site: `(timestamp, power)` sorted by time
pub type SiteSeries = Vec<(NaiveDateTime, f32)>;

/// Default resolution of the PV records
pub const DEFAULT_STEP_MINUTES: i64 = 5;

/// PV records grouped by site
#[derive(Debug, Clone, Default)]
pub struct PvRecords {
    by_site: BTreeMap<i64, SiteSeries>,
}

impl PvRecords {
    /// Read a local parquet file
    pub fn from_parquet(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            RuZaVisError::Pv(format!("cannot open {}: {e}", path.display()))
        })?;
        log::info!("Reading PV records from {}", path.display());
        Self::from_reader(file)
    }

    /// Read parquet bytes already in memory
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        Self::from_reader(bytes)
    }

    /// Read from a local path or an HTTP URL
    pub fn fetch(location: &StoreLocation) -> Result<Self> {
        match location {
            StoreLocation::Local(path) => Self::from_parquet(path),
            StoreLocation::Remote(_) => Self::from_bytes(read_file(location)?),
        }
    }

    fn from_reader<R: ChunkReader + 'static>(reader: R) -> Result<Self> {
        let batches = ParquetRecordBatchReaderBuilder::try_new(reader)?.build()?;

        let mut records = PvRecords::default();
        let mut skipped = 0_usize;
        for batch in batches {
            let batch = batch?;
            let timestamps = timestamps_ns(column(&batch, "timestamp")?)?;
            let ss_ids = cast(column(&batch, "ss_id")?, &DataType::Int64)?;
            let ss_ids = ss_ids
                .as_primitive_opt::<Int64Type>()
                .ok_or_else(|| RuZaVisError::Pv("ss_id column is not integer".into()))?;
            let power = cast(column(&batch, "power")?, &DataType::Float64)?;
            let power = power
                .as_primitive_opt::<Float64Type>()
                .ok_or_else(|| RuZaVisError::Pv("power column is not numeric".into()))?;

            for (row, ns) in timestamps.iter().enumerate() {
                let (Some(ns), false) = (ns, ss_ids.is_null(row)) else {
                    skipped += 1;
                    continue;
                };
                let Some(timestamp) = from_epoch_nanos(*ns) else {
                    skipped += 1;
                    continue;
                };
                #[allow(clippy::cast_possible_truncation)]
                let value = if power.is_null(row) {
                    f32::NAN
                } else {
                    power.value(row) as f32
                };
                records
                    .by_site
                    .entry(ss_ids.value(row))
                    .or_default()
                    .push((timestamp, value));
            }
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} PV rows with a null timestamp or site id");
        }
        for series in records.by_site.values_mut() {
            series.sort_by_key(|(t, _)| *t);
        }
        log::info!(
            "Loaded {} PV records for {} sites",
            records.len(),
            records.by_site.len()
        );
        Ok(records)
    }

    /// Build from in-memory series
    #[must_use]
    pub fn from_series(series: BTreeMap<i64, SiteSeries>) -> Self {
        let mut by_site = series;
        for s in by_site.values_mut() {
            s.sort_by_key(|(t, _)| *t);
        }
        Self { by_site }
    }

    /// Total number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_site.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct site ids, sorted
    #[must_use]
    pub fn sites(&self) -> Vec<i64> {
        self.by_site.keys().copied().collect()
    }

    /// Time series of one site
    #[must_use]
    pub fn site(&self, ss_id: i64) -> Option<&[(NaiveDateTime, f32)]> {
        self.by_site.get(&ss_id).map(Vec::as_slice)
    }

    /// Earliest and latest timestamps
    #[must_use]
    pub fn time_span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.by_site.values().filter_map(|s| s.first()).map(|(t, _)| *t).min()?;
        let last = self.by_site.values().filter_map(|s| s.last()).map(|(t, _)| *t).max()?;
        Some((first, last))
    }

    /// Records with `start <= timestamp <= end`
    #[must_use]
    pub fn window(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let by_site = self
            .by_site
            .iter()
            .filter_map(|(id, series)| {
                let slice = window_slice(series, start, end);
                (!slice.is_empty()).then(|| (*id, slice.to_vec()))
            })
            .collect();
        Self { by_site }
    }

    /// Power values of one site with `start <= timestamp <= end`, in time order
    #[must_use]
    pub fn values(&self, ss_id: i64, start: NaiveDateTime, end: NaiveDateTime) -> Vec<f32> {
        self.by_site
            .get(&ss_id)
            .map(|series| window_slice(series, start, end).iter().map(|(_, v)| *v).collect())
            .unwrap_or_default()
    }

    /// Site x time grid from `start` to `end` inclusive at `step`, NaN where no record exists
    pub fn to_matrix(
        &self,
        sites: &[i64],
        start: NaiveDateTime,
        end: NaiveDateTime,
        step: Duration,
    ) -> Result<(Array2<f32>, Vec<NaiveDateTime>)> {
        let step_ns = step
            .num_nanoseconds()
            .filter(|ns| *ns > 0)
            .ok_or_else(|| RuZaVisError::InvalidArgument("step must be positive".into()))?;
        if end < start {
            return Err(RuZaVisError::InvalidArgument(format!(
                "end {end} is before start {start}"
            )));
        }

        let mut times = Vec::new();
        let mut t = start;
        while t <= end {
            times.push(t);
            t += step;
        }

        let mut matrix = Array2::from_elem((sites.len(), times.len()), f32::NAN);
        for (row, id) in sites.iter().enumerate() {
            let Some(series) = self.by_site.get(id) else {
                log::warn!("PV site {id} has no records");
                continue;
            };
            for (timestamp, value) in window_slice(series, start, end) {
                let Some(offset_ns) = (*timestamp - start).num_nanoseconds() else {
                    continue;
                };
                if offset_ns % step_ns != 0 {
                    continue;
                }
                if let Ok(col) = usize::try_from(offset_ns / step_ns) {
                    if col < times.len() {
                        matrix[[row, col]] = *value;
                    }
                }
            }
        }
        Ok((matrix, times))
    }

    /// [`Self::to_matrix`] as a `(ss_id, time)` selection ready for rendering
    pub fn to_selection(
        &self,
        sites: &[i64],
        start: NaiveDateTime,
        end: NaiveDateTime,
        step: Duration,
    ) -> Result<SelectedArray> {
        let (matrix, times) = self.to_matrix(sites, start, end, step)?;
        let mut selected = SelectedArray::from_data(
            "power",
            matrix.into_dyn(),
            vec!["ss_id".to_string(), "time".to_string()],
        )?;
        let labels = sites.iter().map(ToString::to_string).collect();
        selected.coords = vec![
            Some(Coordinate::new("ss_id", CoordValues::Labels(labels))),
            Some(Coordinate::new("time", CoordValues::Time(times))),
        ];
        Ok(selected)
    }
}

fn window_slice(series: &[(NaiveDateTime, f32)], start: NaiveDateTime, end: NaiveDateTime) -> &[(NaiveDateTime, f32)] {
    let lo = series.partition_point(|(t, _)| *t < start);
    let hi = series.partition_point(|(t, _)| *t <= end);
    if lo >= hi {
        &[]
    } else {
        &series[lo..hi]
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RuZaVisError::Pv(format!("parquet file has no '{name}' column")))
}

fn from_epoch_nanos(ns: i64) -> Option<NaiveDateTime> {
    NaiveDateTime::default().checked_add_signed(Duration::nanoseconds(ns))
}

/// Timestamps in nanoseconds since the epoch; Arrow timestamps of any unit or raw int64 nanoseconds
fn timestamps_ns(column: &ArrayRef) -> Result<Vec<Option<i64>>> {
    let factor: i64 = match column.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => 1_000_000_000,
        DataType::Timestamp(TimeUnit::Millisecond, _) => 1_000_000,
        DataType::Timestamp(TimeUnit::Microsecond, _) => 1_000,
        DataType::Timestamp(TimeUnit::Nanosecond, _) | DataType::Int64 => 1,
        other => {
            return Err(RuZaVisError::Pv(format!(
                "timestamp column has unsupported type {other:?}"
            )))
        }
    };
    let raw = cast(column, &DataType::Int64)?;
    let raw = raw
        .as_primitive_opt::<Int64Type>()
        .ok_or_else(|| RuZaVisError::Pv("timestamp column could not be read as int64".into()))?;
    Ok(raw.iter().map(|v| v.and_then(|x| x.checked_mul(factor))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 7, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn records() -> PvRecords {
        let mut series = BTreeMap::new();
        series.insert(7, vec![(at(8, 5), 0.2), (at(8, 0), 0.1), (at(8, 15), 0.4)]);
        series.insert(3, vec![(at(8, 0), 1.0)]);
        PvRecords::from_series(series)
    }

    #[test]
    fn series_are_sorted_and_windowed_inclusively() {
        let pv = records();
        assert_eq!(pv.sites(), vec![3, 7]);
        assert_eq!(pv.site(7).unwrap()[0].0, at(8, 0));
        assert_eq!(pv.values(7, at(8, 0), at(8, 5)), vec![0.1, 0.2]);
        assert_eq!(pv.window(at(8, 5), at(8, 15)).len(), 2);
        assert_eq!(pv.time_span(), Some((at(8, 0), at(8, 15))));
    }

    #[test]
    fn matrix_has_nan_gaps() {
        let pv = records();
        let (m, times) = pv
            .to_matrix(&[7, 3, 99], at(8, 0), at(8, 15), Duration::minutes(5))
            .unwrap();
        assert_eq!(m.dim(), (3, 4));
        assert_eq!(times.len(), 4);
        assert_eq!(m[[0, 1]], 0.2);
        assert!(m[[0, 2]].is_nan());
        assert_eq!(m[[1, 0]], 1.0);
        assert!(m.row(2).iter().all(|v| v.is_nan()));
        assert!(pv.to_matrix(&[7], at(9, 0), at(8, 0), Duration::minutes(5)).is_err());
    }

    #[test]
    fn selection_labels_sites_and_times() {
        let selected = records()
            .to_selection(&[3, 7], at(8, 0), at(8, 10), Duration::minutes(5))
            .unwrap();
        assert_eq!(selected.shape(), &[2, 3]);
        assert_eq!(selected.dims, vec!["ss_id", "time"]);
        assert_eq!(selected.coordinate("ss_id").unwrap().label(1).as_deref(), Some("7"));
        assert_eq!(
            selected.coordinate("time").unwrap().label(2).as_deref(),
            Some("2020-07-01T08:10:00")
        );
    }
}
