//! RuZaVis: exploring chunked Zarr datasets and solar PV records
//!
//! A Rust library for the ClimateHack solar nowcasting data: satellite imagery,
//! weather and aerosol forecasts stored as (zipped) Zarr groups, and solar PV
//! generation records stored as parquet. RuZaVis opens local or remote stores,
//! selects slices by coordinate label, reduces them in parallel and renders them
//! as PNG images.
//!
//! ## Key Features
//!
//! - **Remote Stores**: Zarr v2/v3 directories and `.zip` archives over HTTP or on disk
//! - **Label Selection**: xarray-style selection by timestamp, channel name or numeric value
//! - **Parallel Processing**: NaN-skipping reductions over any dimension using Rayon
//! - **Rendering**: Heatmaps, panel grids and colour bars written as PNG
//! - **PV Records**: Windowing and site x time grids of parquet PV data
//! - **Training Samples**: PV readings paired with HRV crops, streamed asynchronously
//!
//! ## Module Organization
//!
//! - [`store`]: Store locations and opening local or remote stores
//! - [`dataset`]: Variable discovery, hyper-slab reads and CF decoding
//! - [`coords`]: Coordinate decoding and label resolution
//! - [`select`]: Selection specs and materialized selections
//! - [`statistics`]: Statistical computations and parallel reductions
//! - [`render`]: Colormaps and PNG rendering
//! - [`export`]: Writing selections as consolidated Zarr v2 stores
//! - [`pv`]: Solar PV generation records
//! - [`samples`]: Training-sample extraction
//! - [`reader`]: Async reader traits over datasets
//! - [`config`]: Dataset catalogue
//! - [`metadata`]: Dataset inspection reports
//! - [`parallel`]: Parallel processing configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use ru_za_vis::prelude::*;
//!
//! # fn main() -> ru_za_vis::Result<()> {
//! let catalogue = Catalogue::climatehack();
//! let dataset = Dataset::open(&catalogue.resolve("hrv", "2020-07")?)?;
//!
//! let selection = Selection::parse_all(&["time=2020-07-01T12:00", "channel=#0"])?;
//! let selected = selection.materialize(&dataset, "data")?;
//!
//! let options = PlotOptions { colormap: Colormap::Greys, ..PlotOptions::default() };
//! render::plot(&selected, &options, std::path::Path::new("hrv.png"))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coords;
pub mod dataset;
pub mod errors;
pub mod export;
pub mod metadata;
pub mod parallel;
pub mod pv;
pub mod reader;
pub mod render;
pub mod samples;
pub mod select;
pub mod statistics;
pub mod store;

pub use errors::{Result, RuZaVisError};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::config::Catalogue;
    pub use crate::coords::{CoordValues, Coordinate};
    pub use crate::dataset::{Dataset, VariableInfo};
    pub use crate::errors::{Result, RuZaVisError};
    pub use crate::export::ZarrWriter;
    pub use crate::parallel::ParallelConfig;
    pub use crate::pv::PvRecords;
    pub use crate::reader::{DataReader, DatasetReader, StreamingDataReader};
    pub use crate::render::{self, Colormap, Orientation, PlotOptions};
    pub use crate::samples::{Sample, SampleConfig, SampleExtractor, SiteLocations};
    pub use crate::select::{DimSpec, SelectedArray, Selection};
    pub use crate::statistics::{StatOperation, StatisticalReduction};
    pub use crate::store::StoreLocation;
}
