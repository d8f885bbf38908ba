//! Dataset inspection and variable description
//!
//! Reports are printed to stdout; they only read metadata and coordinates,
//! never full data variables.

use crate::coords::{CoordValues, Coordinate};
use crate::dataset::{Dataset, VariableInfo};
use crate::errors::{Result, RuZaVisError};
use crate::statistics::SummaryStats;
use serde_json::Value as JsonValue;

/// Attributes shown next to each variable in listings
const KEY_ATTRIBUTES: [&str; 3] = ["units", "long_name", "_FillValue"];

/// How many labels of a coordinate to show at each end
const PREVIEW_LABELS: usize = 3;

/// Structured metadata for a variable
#[derive(Debug, Clone)]
pub struct VariableMetadata {
    pub name: String,
    pub data_type: String,
    pub dimensions: Vec<DimensionInfo>,
    pub total_elements: u64,
    pub estimated_size_bytes: Option<u64>,
}

/// Information about a dimension
#[derive(Debug, Clone)]
pub struct DimensionInfo {
    pub name: String,
    pub length: u64,
    pub chunk: u64,
    pub has_coordinate: bool,
}

/// Get structured metadata for a variable
pub fn get_variable_metadata(dataset: &Dataset, var_name: &str) -> Result<VariableMetadata> {
    let info = dataset.variable(var_name)?;
    let dimensions = info
        .dimensions
        .iter()
        .zip(&info.shape)
        .zip(&info.chunks)
        .map(|((name, length), chunk)| DimensionInfo {
            name: name.clone(),
            length: *length,
            chunk: *chunk,
            has_coordinate: dataset.has_coordinate(name),
        })
        .collect();

    let total_elements = info.total_elements();
    Ok(VariableMetadata {
        name: info.name.clone(),
        data_type: info.dtype.clone(),
        dimensions,
        total_elements,
        estimated_size_bytes: info
            .kind
            .size_bytes()
            .map(|size| total_elements.saturating_mul(size as u64)),
    })
}

/// Prints the location, dimensions and variables of a dataset.
pub fn print_dataset_summary(dataset: &Dataset) {
    println!("\n===== Dataset =====");
    println!("📂 {}", dataset.location());
    println!(
        "   {} variables, {} dimensions",
        dataset.variables().count(),
        dataset.dimensions().len()
    );
    list_variables_and_dimensions(dataset);
}

/// Lists all variables and dimensions in a clean, organized format.
pub fn list_variables_and_dimensions(dataset: &Dataset) {
    println!("\n Dimensions");
    println!("==============");

    let dimensions = dataset.dimensions();
    if dimensions.is_empty() {
        println!("   (No dimensions found)");
    } else {
        for (name, length) in &dimensions {
            let marker = if dataset.has_coordinate(name) { "" } else { " (no coordinate)" };
            println!("    {name} = {length}{marker}");
        }
    }

    println!("\n Data Variables");
    println!("==================");
    let mut any = false;
    for var in dataset.data_variables() {
        any = true;
        print_variable_line(var);
    }
    if !any {
        println!("   (No data variables found)");
    }

    println!("\n Coordinates");
    println!("===============");
    let mut any = false;
    for var in dataset.variables().filter(|v| v.is_coordinate()) {
        any = true;
        print_variable_line(var);
    }
    if !any {
        println!("   (No coordinate variables found)");
    }

    println!("\n💡 Tip: Use --describe <variable> to see all attributes of a variable");
    println!("💡 Tip: Use select --sel <dim>=<label> to pick a slice by coordinate label");
}

fn print_variable_line(var: &VariableInfo) {
    if var.dimensions.is_empty() {
        println!("    {} ({}): scalar", var.name, var.dtype);
    } else {
        let shape: Vec<String> = var.shape.iter().map(ToString::to_string).collect();
        println!(
            "    {} ({}): [{}] = ({})",
            var.name,
            var.dtype,
            var.dimensions.join(", "),
            shape.join(" × ")
        );
    }

    let key_attrs: Vec<String> = KEY_ATTRIBUTES
        .iter()
        .filter_map(|key| var.attributes.get(*key).map(|v| format!("{key}: {}", format_attribute(v))))
        .collect();
    if !key_attrs.is_empty() {
        println!("      └─ {}", key_attrs.join(", "));
    }
}

/// Describes a specific variable showing its data type, shape, chunking and all attributes.
pub fn describe_variable(dataset: &Dataset, var_name: &str) -> Result<()> {
    let info = dataset.variable(var_name)?;
    let meta = get_variable_metadata(dataset, var_name)?;

    println!("\n Variable Description: {var_name}");
    println!("={}", "=".repeat(var_name.len() + 25));
    println!(" Data type: {}", meta.data_type);

    if meta.dimensions.is_empty() {
        println!(" Dimensions: (scalar)");
        println!(" Shape: ()");
    } else {
        println!(" Dimensions: [{}]", info.dimensions.join(", "));
        let shape: Vec<String> = info.shape.iter().map(ToString::to_string).collect();
        println!(" Shape: ({})", shape.join(" × "));

        println!("\n Dimension Details:");
        for dim in &meta.dimensions {
            let coordinate = if dim.has_coordinate { "" } else { ", no coordinate" };
            println!("    {} = {} (chunk {}{coordinate})", dim.name, dim.length, dim.chunk);
        }
    }

    if info.attributes.is_empty() {
        println!("\n  Attributes: (none)");
    } else {
        println!("\n  Attributes:");
        for (name, value) in &info.attributes {
            println!("   • {name}: {}", format_attribute(value));
        }
    }

    println!("\n Storage Information:");
    println!("    Total elements: {}", meta.total_elements);
    match (info.kind.size_bytes(), meta.estimated_size_bytes) {
        (Some(element), Some(total)) => {
            println!("    Element size: {element} bytes");
            println!("    Uncompressed size: {}", format_bytes(total));
        }
        _ => println!("    Element size: variable"),
    }

    println!("\n💡 Tip: Use select --var {var_name} --reduce mean:<dimension> to reduce over a dimension");
    Ok(())
}

/// Prints the decoded labels of a dimension's coordinate.
pub fn describe_coordinate(dataset: &Dataset, dim: &str) -> Result<()> {
    let coordinate = dataset
        .coordinate(dim)?
        .ok_or_else(|| RuZaVisError::CoordinateNotFound { dim: dim.to_string() })?;

    let kind = match coordinate.values {
        CoordValues::Time(_) => "time",
        CoordValues::Numeric(_) => "numeric",
        CoordValues::Labels(_) => "text",
    };
    println!("\n Coordinate: {dim}");
    println!("={}", "=".repeat(dim.len() + 13));
    println!("    Kind: {kind}");
    println!("    Length: {}", coordinate.len());
    if !coordinate.is_empty() && !matches!(coordinate.values, CoordValues::Labels(_)) {
        let order = if coordinate.is_ascending() { "ascending" } else { "descending" };
        println!("    Order: {order}");
    }
    println!("    Labels: {}", preview_labels(&coordinate));
    Ok(())
}

/// First and last labels of a coordinate, eliding the middle
#[must_use]
pub fn preview_labels(coordinate: &Coordinate) -> String {
    let n = coordinate.len();
    let labels = |range: std::ops::Range<usize>| -> Vec<String> {
        range.filter_map(|i| coordinate.label(i)).collect()
    };
    if n <= PREVIEW_LABELS * 2 {
        labels(0..n).join(", ")
    } else {
        format!(
            "{}, ..., {}",
            labels(0..PREVIEW_LABELS).join(", "),
            labels(n - PREVIEW_LABELS..n).join(", ")
        )
    }
}

/// Prints quick statistics of a selection.
pub fn print_summary(title: &str, stats: &SummaryStats) {
    println!("\n Summary for: {title}");
    println!("================================");
    if stats.valid == 0 {
        println!("   (No valid values: all {} cells are NaN)", stats.total);
        return;
    }
    println!("   Min: {}", stats.min);
    println!("   Max: {}", stats.max);
    println!("   Mean: {:.4}", stats.mean);
    println!("   Std Dev: {:.4}", stats.std_dev);
    println!("   Valid: {} of {}", stats.valid, stats.total);
}

fn format_attribute(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(total_bytes: u64) -> String {
    if total_bytes < 1024 {
        format!("{total_bytes} bytes")
    } else if total_bytes < 1024 * 1024 {
        format!("{:.2} KB", total_bytes as f64 / 1024.0)
    } else if total_bytes < 1024 * 1024 * 1024 {
        format!("{:.2} MB", total_bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", total_bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn byte_sizes_are_humanized() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn long_coordinates_are_elided() {
        let short = Coordinate::new("channel", CoordValues::Labels(vec!["HRV".into(), "IR_016".into()]));
        assert_eq!(preview_labels(&short), "HRV, IR_016");

        let day = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();
        let times = (0..10)
            .map(|h| day.and_hms_opt(h, 0, 0).unwrap())
            .collect();
        let long = Coordinate::new("time", CoordValues::Time(times));
        let preview = preview_labels(&long);
        assert!(preview.starts_with("2020-07-01T00:00:00, "));
        assert!(preview.contains(", ..., "));
        assert!(preview.ends_with("2020-07-01T09:00:00"));
    }
}
