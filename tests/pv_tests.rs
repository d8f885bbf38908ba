//! Reading PV parquet files and gridding them

mod common;

use chrono::Duration;
use common::{at, pv_rows, write_pv_parquet};
use ru_za_vis::errors::RuZaVisError;
use ru_za_vis::pv::PvRecords;
use ru_za_vis::render::{plot, PlotOptions};
use ru_za_vis::store::StoreLocation;
use tempfile::tempdir;

#[test]
fn test_read_parquet_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("7.parquet");
    let mut rows = pv_rows(2607, at(8, 0), 2);
    rows.extend(pv_rows(7, at(9, 0), 1));
    rows.push((at(10, 0), 7, None));
    write_pv_parquet(&path, &rows);

    let records = PvRecords::from_parquet(&path).unwrap();
    assert_eq!(records.len(), 24 + 12 + 1);
    assert_eq!(records.sites(), vec![7, 2607]);
    assert_eq!(records.time_span(), Some((at(8, 0), at(10, 0))));

    let series = records.site(7).unwrap();
    assert_eq!(series.first().unwrap().0, at(9, 0));
    assert!(series.last().unwrap().1.is_nan());

    let first_hour = records.values(2607, at(8, 0), at(8, 55));
    assert_eq!(first_hour.len(), 12);
    assert_eq!(first_hour[1], 0.01_f64 as f32);
}

#[test]
fn test_fetch_local_location() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pv.parquet");
    write_pv_parquet(&path, &pv_rows(1, at(8, 0), 1));

    let location = StoreLocation::parse(path.to_str().unwrap()).unwrap();
    let records = PvRecords::fetch(&location).unwrap();
    assert_eq!(records.len(), 12);

    let missing = StoreLocation::parse(dir.path().join("none.parquet").to_str().unwrap()).unwrap();
    assert!(PvRecords::fetch(&missing).is_err());
}

#[test]
fn test_window_and_matrix() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pv.parquet");
    let mut rows = pv_rows(1, at(8, 0), 1);
    rows.extend(pv_rows(2, at(8, 30), 1));
    write_pv_parquet(&path, &rows);
    let records = PvRecords::from_parquet(&path).unwrap();

    let window = records.window(at(8, 0), at(8, 25));
    assert_eq!(window.sites(), vec![1]);
    assert_eq!(window.len(), 6);

    let (matrix, times) = records
        .to_matrix(&[1, 2], at(8, 0), at(9, 0), Duration::minutes(5))
        .unwrap();
    assert_eq!(matrix.dim(), (2, 13));
    assert_eq!(times.last(), Some(&at(9, 0)));
    assert_eq!(matrix[[0, 11]], 0.11_f64 as f32);
    assert!(matrix[[0, 12]].is_nan());
    assert!(matrix[[1, 5]].is_nan());
    assert_eq!(matrix[[1, 6]], 0.0);

    let (coarse, _) = records
        .to_matrix(&[1], at(8, 0), at(9, 0), Duration::minutes(15))
        .unwrap();
    assert_eq!(coarse.dim(), (1, 5));
    assert_eq!(coarse[[0, 1]], 0.03_f64 as f32);
}

#[test]
fn test_plot_site_time_grid() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pv.parquet");
    let mut rows = pv_rows(1, at(8, 0), 1);
    rows.extend(pv_rows(2, at(8, 0), 1));
    write_pv_parquet(&path, &rows);
    let records = PvRecords::from_parquet(&path).unwrap();

    let selected = records
        .to_selection(&[1, 2, 3], at(8, 0), at(8, 55), Duration::minutes(5))
        .unwrap();
    let options = PlotOptions {
        scale: 3,
        ..PlotOptions::default()
    };
    let (width, height, _) = plot(&selected, &options, &dir.path().join("pv.png")).unwrap();
    assert_eq!((width, height), (12 * 3, 3 * 3));
}

#[test]
fn test_missing_column_is_reported() {
    use arrow::array::{ArrayRef, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;

    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.parquet");
    let schema = Arc::new(Schema::new(vec![Field::new("ss_id", DataType::Int64, false)]));
    let ids: ArrayRef = Arc::new(Int64Array::from(vec![1, 2]));
    let batch = RecordBatch::try_new(schema.clone(), vec![ids]).unwrap();
    let mut writer = ArrowWriter::try_new(std::fs::File::create(&path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    match PvRecords::from_parquet(&path) {
        Err(RuZaVisError::Pv(message)) => assert!(message.contains("timestamp")),
        other => panic!("expected a missing column error, got {other:?}"),
    }
}
