//! Entry point for the RuZaVis application.
//! Handles CLI parsing, logging and thread setup, and dispatches the inspect,
//! select, pv, samples and catalogue subcommands.

mod cli;

use chrono::Duration;
use clap::Parser;
use cli::{Args, Command, PvArgs, SamplesArgs, SelectArgs, SourceArgs};
use futures::StreamExt;
use ru_za_vis::config::Catalogue;
use ru_za_vis::dataset::Dataset;
use ru_za_vis::errors::{Result, RuZaVisError};
use ru_za_vis::export::ZarrWriter;
use ru_za_vis::metadata::{describe_coordinate, describe_variable, print_dataset_summary, print_summary};
use ru_za_vis::parallel::{get_parallel_info, ParallelConfig};
use ru_za_vis::pv::PvRecords;
use ru_za_vis::render::{plot, Colormap, Orientation};
use ru_za_vis::samples::{SampleConfig, SampleExtractor, SiteLocations};
use ru_za_vis::select::Selection;
use ru_za_vis::store::StoreLocation;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command-line arguments
    let args = Args::parse();

    let level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    println!(
        r#"
------------------------------------------------------------------
        ______      _____      _   _ _
        | ___ \    |___  /     | | | (_)
        | |_/ /   _   / /  __ _| | | |_ ___
        |    / | | | / /  / _` | | | | / __|
        | |\ \ |_| |./ /__| (_| \ \_/ / \__ \
        \_| \_\__,_|\_____/\__,_|\___/|_|___/
            Rust-based Zarr and solar PV explorer
------------------------------------------------------------------
"#
    );

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    ParallelConfig::new(args.threads).setup_global_pool()?;
    if args.verbose {
        get_parallel_info().print_info();
    }

    match args.command {
        Command::Samples(samples) => run_samples(samples).await,
        Command::Inspect {
            source,
            describe,
            coords,
        } => blocking(move || run_inspect(&source, describe.as_deref(), coords.as_deref())).await,
        Command::Select(select) => blocking(move || run_select(&select)).await,
        Command::Pv(pv) => blocking(move || run_pv(&pv)).await,
        Command::Catalogue { config, month } => {
            blocking(move || {
                let catalogue = Catalogue::load(config.as_deref())?;
                print_catalogue(&catalogue, month.as_deref())
            })
            .await
        }
    }
}

/// Run on the blocking pool; the stores do blocking I/O, including HTTP
async fn blocking<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn open_dataset(source: &SourceArgs) -> Result<Dataset> {
    let location = source.location()?;
    let dataset = Dataset::open(&location)?;
    println!("Successfully opened dataset: {location}");
    Ok(dataset)
}

fn run_inspect(source: &SourceArgs, describe: Option<&str>, coords: Option<&str>) -> Result<()> {
    let dataset = open_dataset(source)?;
    match (describe, coords) {
        (None, None) => print_dataset_summary(&dataset),
        (describe, coords) => {
            if let Some(var) = describe {
                describe_variable(&dataset, var)?;
            }
            if let Some(dim) = coords {
                describe_coordinate(&dataset, dim)?;
            }
        }
    }
    Ok(())
}

fn run_select(args: &SelectArgs) -> Result<()> {
    let entry = match &args.source.dataset {
        Some(name) => Some(args.source.catalogue()?.entry(name)?.clone()),
        None => None,
    };
    let var = args
        .var
        .clone()
        .or_else(|| entry.as_ref().and_then(|e| e.variable.clone()))
        .ok_or_else(|| RuZaVisError::InvalidArgument("give --var <VARIABLE>".to_string()))?;

    let dataset = open_dataset(&args.source)?;
    let selection = Selection::new(args.selections.clone());
    let mut selected = selection.materialize(&dataset, &var)?;
    println!(
        "✂️ Selected {} with shape {:?} over ({})",
        selected.title(),
        selected.shape(),
        selected.dims.join(", ")
    );

    for (op, dim) in &args.reductions {
        selected = selected.reduce(*op, dim)?;
        println!("🧮 {} -> shape {:?}", selected.title(), selected.shape());
    }

    let nothing_requested = args.plot.is_none() && args.export.is_none();
    if args.summary || nothing_requested {
        print_summary(&selected.title(), &selected.summary());
    }

    if let Some(path) = &args.plot {
        let options = args
            .plot_args
            .options(entry.as_ref().and_then(|e| e.colormap));
        let (width, height, range) = plot(&selected, &options, path)?;
        println!(
            "✅ Saved {width}x{height} {} plot to {} (range {} to {})",
            options.colormap,
            path.display(),
            range.vmin,
            range.vmax
        );
    }

    if let Some(dir) = &args.export {
        ZarrWriter::create(dir)?.write_selection(&selected)?;
    }

    if nothing_requested {
        println!("\n💡 Tip: Use --plot <FILE.png> to render the selection or --export <DIR> to save it");
    }
    Ok(())
}

fn run_pv(args: &PvArgs) -> Result<()> {
    let location = match (&args.file, &args.month) {
        (Some(file), _) => StoreLocation::parse(file)?,
        (None, Some(month)) => Catalogue::load(args.config.as_deref())?.resolve("pv", month)?,
        (None, None) => {
            return Err(RuZaVisError::InvalidArgument(
                "give --file <LOCATION> or --month <YYYY-MM>".to_string(),
            ))
        }
    };
    let records = PvRecords::fetch(&location)?;

    println!("\n PV Records");
    println!("==============");
    println!("    Source: {location}");
    println!("    Records: {}", records.len());
    println!("    Sites: {}", records.sites().len());
    let Some((first, last)) = records.time_span() else {
        println!("   (No records found)");
        return Ok(());
    };
    println!("    Time span: {first} to {last}");

    let start = args.start.unwrap_or(first);
    let end = args.end.unwrap_or(last);
    let sites = if args.sites.is_empty() {
        records.sites()
    } else {
        args.sites.clone()
    };

    let window = records.window(start, end);
    println!("\n Window {start} to {end}");
    println!("================================");
    println!("    Records: {}", window.len());
    for id in sites.iter().take(10) {
        let values = window.values(*id, start, end);
        let valid: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if valid.is_empty() {
            println!("    {id}: no readings");
        } else {
            let mean = valid.iter().map(|v| f64::from(*v)).sum::<f64>() / valid.len() as f64;
            println!("    {id}: {} readings, mean power {mean:.4}", valid.len());
        }
    }
    if sites.len() > 10 {
        println!("    ... and {} more sites", sites.len() - 10);
    }

    if let Some(path) = &args.plot {
        let selected = window.to_selection(&sites, start, end, Duration::minutes(args.step))?;
        let mut options = args
            .plot_args
            .options(Some(Colormap::Solar));
        if options.orientation == Orientation::Auto {
            options.orientation = Orientation::Keep;
        }
        let (width, height, _) = plot(&selected, &options, path)?;
        println!("✅ Saved {width}x{height} site x time plot to {}", path.display());
    }
    Ok(())
}

async fn run_samples(args: SamplesArgs) -> Result<()> {
    let hrv_location = args.resolve(args.hrv.as_deref(), "hrv")?;
    let pv_location = args.resolve(args.pv.as_deref(), "pv")?;
    let sites_location = args.site_locations_location()?;

    let (hrv, pv, locations) = tokio::task::spawn_blocking(move || -> Result<_> {
        let hrv = Dataset::open(&hrv_location)?;
        let pv = PvRecords::fetch(&pv_location)?;
        let locations = SiteLocations::fetch(&sites_location)?;
        Ok((hrv, pv, locations))
    })
    .await??;

    let mut config = SampleConfig::new(args.start_date, args.end_date);
    config.crop_size = args.crop_size;
    config.horizon = args.horizon;
    if !args.sites.is_empty() {
        config.sites = Some(args.sites.clone());
    }

    let extractor = Arc::new(SampleExtractor::new(
        Arc::new(hrv),
        Arc::new(pv),
        &locations,
        config,
    )?);
    println!(
        "🛰️ Extracting samples for {} image times from {} to {}",
        extractor.image_times().len(),
        args.start_date,
        args.end_date
    );

    let mut writer = match &args.output {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };

    let mut count = 0_usize;
    let mut stream = extractor.stream();
    while let Some(sample) = stream.next().await {
        let sample = sample?;
        if let Some(writer) = writer.as_mut() {
            serde_json::to_writer(&mut *writer, &sample.to_record())?;
            writer.write_all(b"\n")?;
        }
        count += 1;
    }
    if let Some(mut writer) = writer {
        writer.flush()?;
    }

    println!("✅ Extracted {count} samples");
    if let Some(path) = &args.output {
        println!("   Saved to {}", path.display());
    }
    Ok(())
}

fn print_catalogue(catalogue: &Catalogue, month: Option<&str>) -> Result<()> {
    println!("\n Catalogue");
    println!("=============");
    if !catalogue.base_url.is_empty() {
        println!("    Base: {}", catalogue.base_url);
    }
    for entry in &catalogue.datasets {
        let variable = entry.variable.as_deref().unwrap_or("-");
        let colormap = entry.colormap.map_or_else(|| "-".to_string(), |c| c.to_string());
        println!(
            "    {} ({}): {} [variable: {variable}, colormap: {colormap}]",
            entry.name, entry.kind, entry.path
        );
        if let Some(month) = month {
            println!("      └─ {}", catalogue.resolve(&entry.name, month)?);
        }
    }
    if let Some(locations) = catalogue.site_locations() {
        println!("    Site locations: {}", locations?);
    }
    println!("\n💡 Tip: Use inspect --dataset <name> --month <YYYY-MM> to open an entry");
    Ok(())
}
