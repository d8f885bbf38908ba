//! Rendering selections to PNG and exporting them as Zarr

mod common;

use common::{hrv_value, write_hrv};
use ru_za_vis::coords::CoordValues;
use ru_za_vis::dataset::Dataset;
use ru_za_vis::errors::RuZaVisError;
use ru_za_vis::export::ZarrWriter;
use ru_za_vis::render::{plot, Colormap, PlotOptions, COLORBAR_GAP, COLORBAR_WIDTH, GUTTER, STRIP_HEIGHT};
use ru_za_vis::select::{SelectedArray, Selection};
use ru_za_vis::statistics::StatOperation;
use tempfile::tempdir;

fn select(dataset: &Dataset, specs: &[&str]) -> SelectedArray {
    Selection::parse_all(specs)
        .unwrap()
        .materialize(dataset, "data")
        .unwrap()
}

fn greys() -> PlotOptions {
    PlotOptions {
        colormap: Colormap::Greys,
        vmin: Some(0.0),
        vmax: Some(hrv_value(0, 3, 4)),
        ..PlotOptions::default()
    }
}

#[test]
fn test_plot_heatmap_png() {
    let dir = tempdir().unwrap();
    let dataset = Dataset::open_str(write_hrv(dir.path(), 2, 4, 5).to_str().unwrap()).unwrap();
    let selected = select(&dataset, &["time=#0", "channel=#0"]);

    let path = dir.path().join("plots").join("frame.png");
    let options = PlotOptions { scale: 2, ..greys() };
    let (width, height, range) = plot(&selected, &options, &path).unwrap();
    assert_eq!((width, height), (10, 8));
    assert_eq!(range.vmin, 0.0);

    let image = image::open(&path).unwrap().to_rgb8();
    assert_eq!(image.dimensions(), (10, 8));
    // y is descending, so row 0 stays on top; the smallest value is at the top left
    assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
    assert_eq!(image.get_pixel(9, 7).0, [255, 255, 255]);
}

#[test]
fn test_plot_grid_strip_and_colorbar() {
    let dir = tempdir().unwrap();
    let dataset = Dataset::open_str(write_hrv(dir.path(), 4, 4, 5).to_str().unwrap()).unwrap();

    let frames = select(&dataset, &["time=#0..#4", "channel=#0"]);
    let options = PlotOptions { colorbar: true, ..greys() };
    let (width, height, _) = plot(&frames, &options, &dir.path().join("grid.png")).unwrap();
    assert_eq!(width, 2 * 5 + GUTTER + COLORBAR_GAP + COLORBAR_WIDTH);
    assert_eq!(height, 2 * 4 + GUTTER);

    let row = select(&dataset, &["time=#0", "channel=#0", "y=#0"]);
    let (width, height, _) = plot(&row, &greys(), &dir.path().join("strip.png")).unwrap();
    assert_eq!((width, height), (5, STRIP_HEIGHT));
}

#[test]
fn test_plot_rejects_four_dimensions() {
    let dir = tempdir().unwrap();
    let dataset = Dataset::open_str(write_hrv(dir.path(), 2, 4, 5).to_str().unwrap()).unwrap();
    let everything = select(&dataset, &[]);
    assert_eq!(everything.ndim(), 4);

    let result = plot(&everything, &greys(), &dir.path().join("nope.png"));
    assert!(matches!(result, Err(RuZaVisError::InvalidSelection { .. })));
    assert!(!dir.path().join("nope.png").exists());
}

#[test]
fn test_export_round_trip() {
    let dir = tempdir().unwrap();
    let dataset = Dataset::open_str(write_hrv(dir.path(), 6, 4, 5).to_str().unwrap()).unwrap();
    let selected = select(
        &dataset,
        &["time=2020-07-01T08:00..2020-07-01T08:15", "channel=#0"],
    )
    .reduce(StatOperation::Mean, "x")
    .unwrap();
    assert_eq!(selected.dims, vec!["time", "y"]);

    let out = dir.path().join("export.zarr");
    ZarrWriter::create(&out)
        .unwrap()
        .write_selection(&selected)
        .unwrap();

    let reopened = Dataset::open_str(out.to_str().unwrap()).unwrap();
    let info = reopened.variable("data").unwrap();
    assert_eq!(info.dimensions, vec!["time", "y"]);
    assert_eq!(info.shape, vec![4, 4]);
    assert_eq!(info.attr_str("cell_methods"), Some("x: mean"));
    assert_eq!(info.attr_str("units"), Some("reflectance"));
    assert_eq!(info.attributes["selection"]["channel"], "#0");

    let data = reopened.read_all("data").unwrap();
    assert_eq!(data, selected.data);

    let time = reopened.coordinate("time").unwrap().unwrap();
    assert_eq!(Some(&time), selected.coordinate("time"));
    let y = reopened.coordinate("y").unwrap().unwrap();
    assert_eq!(y.values, CoordValues::Numeric(vec![3.0, 2.0, 1.0, 0.0]));

    // writing again replaces the array
    let single = select(&dataset, &["time=#0", "channel=#0"]);
    ZarrWriter::create(&out)
        .unwrap()
        .write_selection(&single)
        .unwrap();
    let reopened = Dataset::open_str(out.to_str().unwrap()).unwrap();
    assert_eq!(reopened.variable("data").unwrap().dimensions, vec!["y", "x"]);
}
