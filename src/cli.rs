//! Defines command-line interface options using `clap` for the RuZaVis application.

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args as ClapArgs, Parser, Subcommand};
use ru_za_vis::config::Catalogue;
use ru_za_vis::coords::parse_datetime;
use ru_za_vis::errors::{Result, RuZaVisError};
use ru_za_vis::render::{Colormap, Orientation, PlotOptions};
use ru_za_vis::select::DimSpec;
use ru_za_vis::statistics::StatOperation;
use ru_za_vis::store::StoreLocation;
use std::path::PathBuf;

/// A CLI tool for exploring ClimateHack satellite, weather, aerosol and PV data
#[derive(Parser, Debug)]
#[command(
    version,
    name = "RuZaVis",
    about = "App for selecting, reducing and rendering Zarr datasets and solar PV records"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the variables and dimensions of a dataset
    Inspect {
        #[command(flatten)]
        source: SourceArgs,

        /// Describe a specific variable (data type, shape, chunks and attributes)
        #[arg(long)]
        describe: Option<String>,

        /// Print the labels of a dimension's coordinate
        #[arg(long)]
        coords: Option<String>,
    },

    /// Select a slice of a variable by coordinate labels, then reduce, summarize, plot or export it
    Select(SelectArgs),

    /// Inspect or plot solar PV generation records
    Pv(PvArgs),

    /// Extract training samples pairing PV readings with HRV crops
    Samples(SamplesArgs),

    /// Print the dataset catalogue
    Catalogue {
        /// Catalogue JSON file. Defaults to the public ClimateHack 2023 data.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Also resolve every entry for this month, formatted as YYYY-MM
        #[arg(long)]
        month: Option<String>,
    },
}

/// Where a dataset comes from: an explicit location or a catalogue entry
#[derive(ClapArgs, Debug, Clone)]
pub struct SourceArgs {
    /// Local path or http(s) URL of a Zarr store (directory or .zip)
    #[arg(short, long, conflicts_with = "dataset")]
    pub store: Option<String>,

    /// Catalogue dataset name, e.g. hrv, nonhrv, weather, aerosols
    #[arg(short, long, requires = "month")]
    pub dataset: Option<String>,

    /// Month of the catalogue dataset, formatted as YYYY-MM
    #[arg(short, long)]
    pub month: Option<String>,

    /// Catalogue JSON file. Defaults to the public ClimateHack 2023 data.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl SourceArgs {
    pub fn catalogue(&self) -> Result<Catalogue> {
        Catalogue::load(self.config.as_deref())
    }

    pub fn location(&self) -> Result<StoreLocation> {
        match (&self.store, &self.dataset, &self.month) {
            (Some(store), _, _) => StoreLocation::parse(store),
            (None, Some(name), Some(month)) => self.catalogue()?.resolve(name, month),
            _ => Err(RuZaVisError::InvalidArgument(
                "give either --store <LOCATION> or --dataset <NAME> --month <YYYY-MM>".to_string(),
            )),
        }
    }
}

/// Colour mapping options shared by the plotting subcommands
#[derive(ClapArgs, Debug, Clone)]
pub struct PlotArgs {
    /// Colormap: viridis, magma, greys, rdbu or solar
    #[arg(long, value_parser = parse_colormap)]
    pub colormap: Option<Colormap>,

    /// Lower bound of the colour scale
    #[arg(long, allow_hyphen_values = true)]
    pub vmin: Option<f32>,

    /// Upper bound of the colour scale
    #[arg(long, allow_hyphen_values = true)]
    pub vmax: Option<f32>,

    /// Use the data minimum and maximum instead of the 2nd and 98th percentiles
    #[arg(long, default_value_t = false)]
    pub no_robust: bool,

    /// Pixels per cell
    #[arg(long, default_value_t = 1)]
    pub scale: u32,

    /// Append a colour bar
    #[arg(long, default_value_t = false)]
    pub colorbar: bool,

    /// Vertical orientation: auto, keep or flip
    #[arg(long, value_parser = parse_orientation, default_value = "auto")]
    pub orientation: Orientation,
}

impl PlotArgs {
    /// Options with `fallback` used when no colormap was given
    #[must_use]
    pub fn options(&self, fallback: Option<Colormap>) -> PlotOptions {
        PlotOptions {
            colormap: self.colormap.or(fallback).unwrap_or_default(),
            vmin: self.vmin,
            vmax: self.vmax,
            robust: !self.no_robust,
            scale: self.scale,
            colorbar: self.colorbar,
            orientation: self.orientation,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct SelectArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Variable to select. Defaults to the catalogue entry's variable.
    #[arg(long)]
    pub var: Option<String>,

    /// Selection per dimension: dim=label, dim~label (nearest), dim=a..b, dim=#i or dim=#i..#j
    #[arg(long = "sel", value_parser = parse_sel_arg)]
    pub selections: Vec<DimSpec>,

    /// Reduce over a dimension after selecting, formatted as <op>:<dimension> (op: mean, sum, min, max)
    #[arg(long = "reduce", value_parser = parse_reduce_arg)]
    pub reductions: Vec<(StatOperation, String)>,

    /// Compute quick statistics (min/mean/max/std) of the selection
    #[arg(long)]
    pub summary: bool,

    /// Render the selection to a PNG file
    #[arg(long)]
    pub plot: Option<PathBuf>,

    #[command(flatten)]
    pub plot_args: PlotArgs,

    /// Write the selection as a consolidated Zarr v2 store
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct PvArgs {
    /// Local path or http(s) URL of a PV parquet file
    #[arg(short, long, conflicts_with = "month")]
    pub file: Option<String>,

    /// Month of the catalogue's PV data, formatted as YYYY-MM
    #[arg(short, long)]
    pub month: Option<String>,

    /// Catalogue JSON file. Defaults to the public ClimateHack 2023 data.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Comma separated site ids. Defaults to every site.
    #[arg(long, value_delimiter = ',')]
    pub sites: Vec<i64>,

    /// Start of the time window, e.g. 2020-07-01T08:00
    #[arg(long, value_parser = parse_datetime_arg)]
    pub start: Option<NaiveDateTime>,

    /// End of the time window, inclusive
    #[arg(long, value_parser = parse_datetime_arg)]
    pub end: Option<NaiveDateTime>,

    /// Grid resolution in minutes
    #[arg(long, default_value_t = 5)]
    pub step: i64,

    /// Render the site x time grid to a PNG file
    #[arg(long)]
    pub plot: Option<PathBuf>,

    #[command(flatten)]
    pub plot_args: PlotArgs,
}

#[derive(ClapArgs, Debug)]
pub struct SamplesArgs {
    /// HRV satellite store. Defaults to the catalogue's hrv entry for --month.
    #[arg(long)]
    pub hrv: Option<String>,

    /// PV parquet file. Defaults to the catalogue's pv entry for --month.
    #[arg(long)]
    pub pv: Option<String>,

    /// Site location JSON. Defaults to the catalogue's site locations.
    #[arg(long)]
    pub site_locations: Option<String>,

    /// Month used to resolve catalogue entries, formatted as YYYY-MM
    #[arg(short, long)]
    pub month: Option<String>,

    /// Catalogue JSON file. Defaults to the public ClimateHack 2023 data.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// First day, formatted as YYYY-MM-DD
    #[arg(long, value_parser = parse_date_arg, default_value = "2020-07-01")]
    pub start_date: NaiveDate,

    /// Last day (inclusive), formatted as YYYY-MM-DD
    #[arg(long, value_parser = parse_date_arg, default_value = "2020-07-30")]
    pub end_date: NaiveDate,

    /// Half-width of the HRV crop in pixels
    #[arg(long, default_value_t = 1)]
    pub crop_size: usize,

    /// Hours of PV targets
    #[arg(long, default_value_t = 1)]
    pub horizon: u32,

    /// Comma separated site ids. Defaults to every site with a location.
    #[arg(long, value_delimiter = ',')]
    pub sites: Vec<i64>,

    /// Write samples as JSON lines. If not set, prints counts only.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl SamplesArgs {
    /// Explicit location, or the catalogue entry `name` for `--month`
    pub fn resolve(&self, explicit: Option<&str>, name: &str) -> Result<StoreLocation> {
        if let Some(location) = explicit {
            return StoreLocation::parse(location);
        }
        let month = self.month.as_deref().ok_or_else(|| {
            RuZaVisError::InvalidArgument(format!("give --{name} <LOCATION> or --month <YYYY-MM>"))
        })?;
        Catalogue::load(self.config.as_deref())?.resolve(name, month)
    }

    pub fn site_locations_location(&self) -> Result<StoreLocation> {
        if let Some(location) = &self.site_locations {
            return StoreLocation::parse(location);
        }
        Catalogue::load(self.config.as_deref())?
            .site_locations()
            .unwrap_or_else(|| {
                Err(RuZaVisError::InvalidArgument(
                    "give --site-locations <LOCATION>".to_string(),
                ))
            })
    }
}

pub fn parse_reduce_arg(s: &str) -> std::result::Result<(StatOperation, String), String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [op, dim] if !dim.trim().is_empty() => {
            let op = op.parse::<StatOperation>().map_err(|e| e.to_string())?;
            Ok((op, dim.trim().to_string()))
        }
        _ => Err("Invalid format: Expected '<operation>:<dimension>'.".to_string()),
    }
}

fn parse_sel_arg(s: &str) -> std::result::Result<DimSpec, String> {
    s.parse::<DimSpec>().map_err(|e| e.to_string())
}

fn parse_colormap(s: &str) -> std::result::Result<Colormap, String> {
    s.parse::<Colormap>().map_err(|e| e.to_string())
}

fn parse_orientation(s: &str) -> std::result::Result<Orientation, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(Orientation::Auto),
        "keep" => Ok(Orientation::Keep),
        "flip" => Ok(Orientation::Flip),
        other => Err(format!("Invalid orientation '{other}': expected auto, keep or flip")),
    }
}

fn parse_datetime_arg(s: &str) -> std::result::Result<NaiveDateTime, String> {
    parse_datetime(s).map_err(|e| e.to_string())
}

fn parse_date_arg(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{s}': {e} (expected YYYY-MM-DD)"))
}
