//! Training-sample extraction
//!
//! For every hourly image time `t` between 08:00 and 16:00 of each day, and
//! every PV site with a known pixel location, a sample pairs
//!
//! - the site's twelve 5-minute PV readings in `[t, t+55min]`,
//! - the HRV satellite frames of the same hour cropped around the site, and
//! - the `12 * horizon` PV readings that follow, as targets.
//!
//! Sites with missing readings or crops falling outside the image are skipped.

use crate::coords::TIME_FORMAT;
use crate::dataset::Dataset;
use crate::errors::{Result, RuZaVisError};
use crate::pv::PvRecords;
use crate::store::{read_file, StoreLocation};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use futures::Stream;
use ndarray::{s, Array3, ArrayD, Axis, Ix3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;

/// Readings per hour at the 5-minute PV resolution
pub const STEPS_PER_HOUR: usize = 12;

/// First image time of each day
pub const DAY_START_HOUR: u32 = 8;
/// Image times stop before this hour
pub const DAY_END_HOUR: u32 = 17;

/// Pixel locations of PV sites, per satellite grid (`hrv`, `nonhrv`, ...)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SiteLocations {
    grids: BTreeMap<String, BTreeMap<String, (i64, i64)>>,
}

impl SiteLocations {
    /// Parse the `{ "hrv": { "<ss_id>": [x, y] } }` JSON document
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read from a local path or URL
    pub fn fetch(location: &StoreLocation) -> Result<Self> {
        let bytes = read_file(location)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// `(x, y)` pixel location of every site on one grid, keyed by numeric site id
    pub fn grid(&self, name: &str) -> Result<BTreeMap<i64, (i64, i64)>> {
        let grid = self.grids.get(name).ok_or_else(|| {
            RuZaVisError::InvalidArgument(format!("site locations have no '{name}' grid"))
        })?;
        grid.iter()
            .map(|(id, xy)| {
                id.trim()
                    .parse::<i64>()
                    .map(|id| (id, *xy))
                    .map_err(|_| RuZaVisError::InvalidArgument(format!("site id '{id}' is not an integer")))
            })
            .collect()
    }

    /// Names of the grids present
    pub fn grid_names(&self) -> impl Iterator<Item = &str> {
        self.grids.keys().map(String::as_str)
    }
}

/// Parameters of sample extraction
#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Half-width of the HRV crop; crops are `2 * crop_size` pixels square
    pub crop_size: usize,
    /// Hours of PV targets
    pub horizon: u32,
    /// Sites to use; all sites with a location when `None`
    pub sites: Option<Vec<i64>>,
    /// HRV variable name in the satellite dataset
    pub variable: String,
    /// Site location grid to use
    pub grid: String,
}

impl SampleConfig {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            crop_size: 1,
            horizon: 1,
            sites: None,
            variable: "data".to_string(),
            grid: "hrv".to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.end_date < self.start_date {
            return Err(RuZaVisError::InvalidArgument(format!(
                "end date {} is before start date {}",
                self.end_date, self.start_date
            )));
        }
        if self.crop_size == 0 {
            return Err(RuZaVisError::InvalidArgument(
                "crop size must be at least 1".to_string(),
            ));
        }
        if self.horizon == 0 {
            return Err(RuZaVisError::InvalidArgument(
                "horizon must be at least 1 hour".to_string(),
            ));
        }
        Ok(())
    }
}

/// One training sample
#[derive(Debug, Clone)]
pub struct Sample {
    pub time: NaiveDateTime,
    /// Timestamps of the targets
    pub time_ids: Vec<String>,
    pub site_id: i64,
    pub pv_features: Vec<f32>,
    /// `(12, 2c, 2c)` HRV crop
    pub hrv_features: Array3<f32>,
    pub pv_targets: Vec<f32>,
}

/// JSON-lines form of a [`Sample`]
#[derive(Debug, Serialize)]
pub struct SampleRecord<'a> {
    pub time: String,
    pub site_id: i64,
    pub time_ids: &'a [String],
    pub pv_features: &'a [f32],
    pub pv_targets: &'a [f32],
    pub hrv_shape: [usize; 3],
    pub hrv_features: Vec<f32>,
}

impl Sample {
    #[must_use]
    pub fn to_record(&self) -> SampleRecord<'_> {
        let (t, h, w) = self.hrv_features.dim();
        SampleRecord {
            time: self.time.format(TIME_FORMAT).to_string(),
            site_id: self.site_id,
            time_ids: &self.time_ids,
            pv_features: &self.pv_features,
            pv_targets: &self.pv_targets,
            hrv_shape: [t, h, w],
            hrv_features: self.hrv_features.iter().copied().collect(),
        }
    }
}

/// Hourly image times from 08:00 while before 17:00, for every day in the inclusive range
#[must_use]
pub fn image_times(start_date: NaiveDate, end_date: NaiveDate) -> Vec<NaiveDateTime> {
    let day_start = NaiveTime::from_hms_opt(DAY_START_HOUR, 0, 0).unwrap_or_default();
    let day_end = NaiveTime::from_hms_opt(DAY_END_HOUR, 0, 0).unwrap_or_default();

    let mut times = Vec::new();
    for date in start_date.iter_days().take_while(|d| *d <= end_date) {
        let mut current = date.and_time(day_start);
        while current.time() < day_end && current.date() == date {
            times.push(current);
            current += Duration::hours(1);
        }
    }
    times
}

/// Target timestamps: every 5 minutes from `t+1h` to `t+horizon h+55min`
#[must_use]
pub fn target_time_ids(time: NaiveDateTime, horizon: u32) -> Vec<String> {
    let first = time + Duration::hours(1);
    (0..STEPS_PER_HOUR * horizon as usize)
        .map(|i| (first + Duration::minutes(5 * i as i64)).format(TIME_FORMAT).to_string())
        .collect()
}

/// Extracts samples from an HRV dataset and PV records
pub struct SampleExtractor {
    hrv: Arc<Dataset>,
    pv: Arc<PvRecords>,
    sites: Vec<(i64, (i64, i64))>,
    config: SampleConfig,
}

impl SampleExtractor {
    pub fn new(
        hrv: Arc<Dataset>,
        pv: Arc<PvRecords>,
        locations: &SiteLocations,
        config: SampleConfig,
    ) -> Result<Self> {
        config.validate()?;
        let info = hrv.variable(&config.variable)?;
        if !(3..=4).contains(&info.ndim()) {
            return Err(RuZaVisError::InvalidArgument(format!(
                "'{}' must be (time, y, x) or (time, y, x, channel), got ({})",
                config.variable,
                info.dimensions.join(", ")
            )));
        }

        let grid = locations.grid(&config.grid)?;
        let sites: Vec<(i64, (i64, i64))> = match &config.sites {
            Some(wanted) => wanted
                .iter()
                .filter_map(|id| match grid.get(id) {
                    Some(xy) => Some((*id, *xy)),
                    None => {
                        log::warn!("Site {id} has no '{}' location; skipping", config.grid);
                        None
                    }
                })
                .collect(),
            None => grid.into_iter().collect(),
        };
        log::info!("Extracting samples for {} sites", sites.len());

        Ok(Self {
            hrv,
            pv,
            sites,
            config,
        })
    }

    #[must_use]
    pub fn image_times(&self) -> Vec<NaiveDateTime> {
        image_times(self.config.start_date, self.config.end_date)
    }

    /// Samples for one image time; blocking
    pub fn samples_at(&self, time: NaiveDateTime) -> Result<Vec<Sample>> {
        let first_hour_end = time + Duration::minutes(55);
        let target_start = time + Duration::hours(1);
        let target_end = time + Duration::hours(i64::from(self.config.horizon)) + Duration::minutes(55);
        let n_targets = STEPS_PER_HOUR * self.config.horizon as usize;

        let info = self.hrv.variable(&self.config.variable)?;
        let time_dim = &info.dimensions[0];
        let coordinate = self
            .hrv
            .coordinate(time_dim)?
            .ok_or_else(|| RuZaVisError::CoordinateNotFound {
                dim: time_dim.clone(),
            })?;
        let frames = match coordinate.range(
            &time.format(TIME_FORMAT).to_string(),
            &first_hour_end.format(TIME_FORMAT).to_string(),
        ) {
            Ok(r) if r.len() == STEPS_PER_HOUR => r,
            Ok(r) => {
                log::debug!("{time}: {} HRV frames instead of {STEPS_PER_HOUR}", r.len());
                return Ok(Vec::new());
            }
            Err(RuZaVisError::EmptySelection { .. }) => {
                log::debug!("{time}: no HRV frames");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let (ny, nx) = (info.shape[1], info.shape[2]);
        let c = self.config.crop_size as i64;
        let candidates: Vec<(i64, Range<u64>, Range<u64>)> = self
            .sites
            .iter()
            .filter_map(|&(id, (x, y))| {
                let rows = crop_range(y, c, ny)?;
                let cols = crop_range(x, c, nx)?;
                Some((id, rows, cols))
            })
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // one read covering every crop of this hour
        let y0 = candidates.iter().map(|(_, r, _)| r.start).min().unwrap_or(0);
        let y1 = candidates.iter().map(|(_, r, _)| r.end).max().unwrap_or(0);
        let x0 = candidates.iter().map(|(_, _, r)| r.start).min().unwrap_or(0);
        let x1 = candidates.iter().map(|(_, _, r)| r.end).max().unwrap_or(0);
        let mut ranges = vec![frames.start as u64..frames.end as u64, y0..y1, x0..x1];
        if info.ndim() == 4 {
            ranges.push(0..1);
        }
        let block = self.hrv.read(&self.config.variable, &ranges)?;
        let block = squeeze_channel(block)?;

        let time_ids = target_time_ids(time, self.config.horizon);
        let mut samples = Vec::new();
        for (site_id, rows, cols) in candidates {
            let pv_features = self.pv.values(site_id, time, first_hour_end);
            let pv_targets = self.pv.values(site_id, target_start, target_end);
            if pv_features.len() != STEPS_PER_HOUR || pv_targets.len() != n_targets {
                continue;
            }

            let (r0, r1) = ((rows.start - y0) as usize, (rows.end - y0) as usize);
            let (c0, c1) = ((cols.start - x0) as usize, (cols.end - x0) as usize);
            let hrv_features = block.slice(s![.., r0..r1, c0..c1]).to_owned();

            samples.push(Sample {
                time,
                time_ids: time_ids.clone(),
                site_id,
                pv_features,
                hrv_features,
                pv_targets,
            });
        }
        log::debug!("{time}: {} samples", samples.len());
        Ok(samples)
    }

    /// Stream samples for every image time, reading each hour on the blocking pool
    pub fn stream(self: Arc<Self>) -> Pin<Box<dyn Stream<Item = Result<Sample>> + Send + 'static>> {
        Box::pin(async_stream::stream! {
            for time in self.image_times() {
                let extractor = Arc::clone(&self);
                let result = tokio::task::spawn_blocking(move || extractor.samples_at(time)).await;
                match result {
                    Ok(Ok(samples)) => {
                        for sample in samples {
                            yield Ok(sample);
                        }
                    }
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

/// `[center - c, center + c)` when it lies inside `0..len`
fn crop_range(center: i64, c: i64, len: u64) -> Option<Range<u64>> {
    let start = u64::try_from(center - c).ok()?;
    let end = u64::try_from(center + c).ok()?;
    (end <= len && start < end).then_some(start..end)
}

fn squeeze_channel(block: ArrayD<f32>) -> Result<Array3<f32>> {
    let block = if block.ndim() == 4 {
        block.index_axis_move(Axis(3), 0)
    } else {
        block
    };
    Ok(block.into_dimensionality::<Ix3>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 7, d).unwrap()
    }

    #[test]
    fn image_times_are_hourly_from_eight_to_sixteen() {
        let times = image_times(date(1), date(2));
        assert_eq!(times.len(), 18);
        assert_eq!(times[0].format(TIME_FORMAT).to_string(), "2020-07-01T08:00:00");
        assert_eq!(times[8].format(TIME_FORMAT).to_string(), "2020-07-01T16:00:00");
        assert_eq!(times[9].format(TIME_FORMAT).to_string(), "2020-07-02T08:00:00");
        assert!(image_times(date(3), date(2)).is_empty());
    }

    #[test]
    fn target_ids_cover_the_horizon() {
        let t = date(1).and_hms_opt(8, 0, 0).unwrap();
        let ids = target_time_ids(t, 2);
        assert_eq!(ids.len(), 24);
        assert_eq!(ids[0], "2020-07-01T09:00:00");
        assert_eq!(ids[23], "2020-07-01T10:55:00");
    }

    #[test]
    fn crops_must_fit_inside_the_image() {
        assert_eq!(crop_range(5, 2, 10), Some(3..7));
        assert_eq!(crop_range(1, 2, 10), None);
        assert_eq!(crop_range(9, 2, 10), None);
        assert_eq!(crop_range(8, 2, 10), Some(6..10));
    }

    #[test]
    fn site_locations_parse_numeric_ids() {
        let locations =
            SiteLocations::from_json_str(r#"{"hrv": {"2607": [10, 20], " 7 ": [1, 2]}, "nonhrv": {}}"#)
                .unwrap();
        let hrv = locations.grid("hrv").unwrap();
        assert_eq!(hrv.get(&2607), Some(&(10, 20)));
        assert_eq!(hrv.get(&7), Some(&(1, 2)));
        assert!(locations.grid("weather").is_err());
        assert_eq!(locations.grid_names().collect::<Vec<_>>(), vec!["hrv", "nonhrv"]);

        let bad = SiteLocations::from_json_str(r#"{"hrv": {"abc": [0, 0]}}"#).unwrap();
        assert!(bad.grid("hrv").is_err());
    }
}
