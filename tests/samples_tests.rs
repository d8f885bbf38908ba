//! Training-sample extraction and the async reader layer

mod common;

use chrono::{Duration, NaiveDate};
use common::{at, hrv_value, write_hrv};
use futures::StreamExt;
use ru_za_vis::dataset::Dataset;
use ru_za_vis::pv::PvRecords;
use ru_za_vis::reader::{DataReader, DatasetReader, StreamingDataReader};
use ru_za_vis::samples::{Sample, SampleConfig, SampleExtractor, SiteLocations};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};

const LOCATIONS: &str = r#"{
    "hrv": {"1": [2, 3], "2": [0, 0], "3": [4, 4]},
    "nonhrv": {"1": [0, 1]}
}"#;

/// Readings every 5 minutes for site 1 from 08:00 to 10:55, valued by minutes since 08:00
fn pv_records() -> PvRecords {
    let series = (0..36)
        .map(|i| (at(8, 0) + Duration::minutes(5 * i), (5 * i) as f32))
        .collect();
    PvRecords::from_series(BTreeMap::from([(1, series)]))
}

fn extractor(dir: &std::path::Path, horizon: u32) -> Arc<SampleExtractor> {
    let root = write_hrv(dir, 24, 6, 6);
    let hrv = Dataset::open_str(root.to_str().unwrap()).unwrap();
    let locations = SiteLocations::from_json_str(LOCATIONS).unwrap();

    let day = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();
    let mut config = SampleConfig::new(day, day);
    config.horizon = horizon;
    Arc::new(SampleExtractor::new(Arc::new(hrv), Arc::new(pv_records()), &locations, config).unwrap())
}

async fn collect(extractor: Arc<SampleExtractor>) -> Vec<Sample> {
    extractor
        .stream()
        .map(|s| s.unwrap())
        .collect::<Vec<_>>()
        .await
}

#[tokio::test]
async fn test_samples_pair_pv_with_hrv_crops() {
    let dir = tempdir().unwrap();
    let extractor = extractor(dir.path(), 1);
    assert_eq!(extractor.image_times().len(), 9);

    let samples = collect(extractor).await;
    // 08:00 and 09:00 have a full hour of frames; sites 2 (edge) and 3 (no PV) are skipped
    assert_eq!(samples.len(), 2);

    let first = &samples[0];
    assert_eq!(first.site_id, 1);
    assert_eq!(first.time, at(8, 0));
    assert_eq!(first.pv_features.len(), 12);
    assert_eq!(first.pv_features[0], 0.0);
    assert_eq!(first.pv_targets.len(), 12);
    assert_eq!(first.pv_targets[0], 60.0);
    assert_eq!(first.time_ids[0], "2020-07-01T09:00:00");
    assert_eq!(first.time_ids[11], "2020-07-01T09:55:00");

    // crop rows y-1..y+1, columns x-1..x+1 around (x=2, y=3)
    assert_eq!(first.hrv_features.dim(), (12, 2, 2));
    assert_eq!(first.hrv_features[[0, 0, 0]], hrv_value(0, 2, 1));
    assert_eq!(first.hrv_features[[11, 1, 1]], hrv_value(11, 3, 2));

    let second = &samples[1];
    assert_eq!(second.time, at(9, 0));
    assert_eq!(second.hrv_features[[0, 0, 0]], hrv_value(12, 2, 1));
    assert_eq!(second.pv_targets[11], 175.0);
}

#[tokio::test]
async fn test_longer_horizon_needs_more_targets() {
    let dir = tempdir().unwrap();
    let samples = collect(extractor(dir.path(), 2)).await;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].pv_targets.len(), 24);
    assert_eq!(samples[0].time_ids.last().unwrap(), "2020-07-01T10:55:00");
}

#[tokio::test]
async fn test_sample_records_serialize_as_json_lines() {
    let dir = tempdir().unwrap();
    let samples = collect(extractor(dir.path(), 1)).await;

    let line = serde_json::to_string(&samples[0].to_record()).unwrap();
    assert!(!line.contains('\n'));
    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["site_id"], 1);
    assert_eq!(value["time"], "2020-07-01T08:00:00");
    assert_eq!(value["hrv_shape"], serde_json::json!([12, 2, 2]));
    assert_eq!(value["hrv_features"].as_array().unwrap().len(), 48);
}

#[test]
fn test_unknown_sites_and_invalid_config() {
    let dir = tempdir().unwrap();
    let root = write_hrv(dir.path(), 12, 6, 6);
    let hrv = Arc::new(Dataset::open_str(root.to_str().unwrap()).unwrap());
    let pv = Arc::new(pv_records());
    let locations = SiteLocations::from_json_str(LOCATIONS).unwrap();
    let day = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();

    let mut config = SampleConfig::new(day, day);
    config.sites = Some(vec![1, 99]);
    let extractor = SampleExtractor::new(hrv.clone(), pv.clone(), &locations, config).unwrap();
    assert_eq!(extractor.samples_at(at(8, 0)).unwrap().len(), 1);

    let mut config = SampleConfig::new(day, day);
    config.crop_size = 0;
    assert!(SampleExtractor::new(hrv.clone(), pv.clone(), &locations, config).is_err());

    let mut config = SampleConfig::new(day, day);
    config.grid = "weather".to_string();
    assert!(SampleExtractor::new(hrv.clone(), pv.clone(), &locations, config).is_err());

    let mut config = SampleConfig::new(day, day);
    config.variable = "time".to_string();
    assert!(SampleExtractor::new(hrv, pv, &locations, config).is_err());
}

#[tokio::test]
async fn test_reader_lists_and_reads() {
    let dir = tempdir().unwrap();
    let root = write_hrv(dir.path(), 3, 4, 5);
    let reader = assert_ok!(DatasetReader::open(root.to_str().unwrap()).await);

    let arrays = reader.list_arrays().await.unwrap();
    assert_eq!(arrays, vec!["data", "time", "x", "y"]);

    let meta = reader.get_metadata("data").await.unwrap();
    assert_eq!(meta.shape, vec![3, 4, 5, 1]);
    assert_eq!(meta.dimensions, vec!["time", "y", "x", "channel"]);
    assert_eq!(meta.dtype, "<f4");
    assert!(meta.attributes.contains_key("units"));

    let slab = reader.read_slice("data", &[2..3, 1..2, 0..5, 0..1]).await.unwrap();
    assert_eq!(slab.shape(), &[1, 1, 5, 1]);
    assert_eq!(slab[[0, 0, 4, 0]], hrv_value(2, 1, 4));

    let all = reader.read_array("x").await.unwrap();
    assert_eq!(all.as_slice().unwrap(), &[0.0, 0.5, 1.0, 1.5, 2.0]);

    assert_err!(reader.get_metadata("missing").await);
    assert_err!(reader.read_slice("data", &[0..1]).await);
}

#[tokio::test]
async fn test_reader_streams_frames() {
    let dir = tempdir().unwrap();
    let root = write_hrv(dir.path(), 3, 4, 5);
    let reader = DatasetReader::open(root.to_str().unwrap()).await.unwrap();

    let frames: Vec<_> = reader.stream_frames("data").collect().await;
    assert_eq!(frames.len(), 3);
    for (t, frame) in frames.into_iter().enumerate() {
        let frame = assert_ok!(frame);
        assert_eq!(frame.shape(), &[4, 5, 1]);
        assert_eq!(frame[[3, 4, 0]], hrv_value(t, 3, 4));
    }

    let errors: Vec<_> = reader.stream_frames("missing").collect().await;
    assert_eq!(errors.len(), 1);
    assert_err!(&errors[0]);
}
