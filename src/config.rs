//! Dataset catalogue
//!
//! A catalogue names the monthly stores of each data source. Paths may use
//! `{year}` and `{month}` placeholders and are resolved against `base_url`
//! unless they are absolute paths or URLs themselves.

use crate::errors::{Result, RuZaVisError};
use crate::render::Colormap;
use crate::store::StoreLocation;
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Public ClimateHack 2023 data on Hugging Face
pub const CLIMATEHACK_BASE_URL: &str =
    "https://huggingface.co/datasets/climatehackai/climatehackai-2023/resolve/main";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Satellite,
    Weather,
    Aerosols,
    Pv,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatasetKind::Satellite => "satellite",
            DatasetKind::Weather => "weather",
            DatasetKind::Aerosols => "aerosols",
            DatasetKind::Pv => "pv",
        };
        write!(f, "{name}")
    }
}

/// One catalogue entry
#[derive(Debug, Clone, Serialize)]
pub struct DatasetEntry {
    pub name: String,
    pub kind: DatasetKind,
    pub path: String,
    /// Variable plotted by default
    pub variable: Option<String>,
    /// Colormap used by default
    pub colormap: Option<Colormap>,
}

impl DatasetEntry {
    fn new(name: &str, kind: DatasetKind, path: &str, variable: Option<&str>, colormap: Option<Colormap>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            path: path.to_string(),
            variable: variable.map(str::to_string),
            colormap,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Catalogue {
    pub base_url: String,
    pub datasets: Vec<DatasetEntry>,
    pub site_locations: Option<String>,
}

// Names must be non-empty and unique; colormaps must be known.
impl<'de> Deserialize<'de> for Catalogue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct EntryHelper {
            name: String,
            kind: DatasetKind,
            path: String,
            variable: Option<String>,
            colormap: Option<String>,
        }

        #[derive(Deserialize)]
        struct CatalogueHelper {
            #[serde(default)]
            base_url: String,
            datasets: Vec<EntryHelper>,
            site_locations: Option<String>,
        }

        let helper = CatalogueHelper::deserialize(deserializer)?;

        let mut seen = HashSet::new();
        let mut datasets = Vec::with_capacity(helper.datasets.len());
        for entry in helper.datasets {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                return Err(D::Error::custom("dataset name must not be empty"));
            }
            if !seen.insert(name.clone()) {
                return Err(D::Error::custom(format!("duplicate dataset name '{name}'")));
            }
            if entry.path.trim().is_empty() {
                return Err(D::Error::custom(format!("dataset '{name}' has an empty path")));
            }
            let colormap = entry
                .colormap
                .map(|c| c.parse::<Colormap>())
                .transpose()
                .map_err(|e| D::Error::custom(format!("dataset '{name}': {e}")))?;

            datasets.push(DatasetEntry {
                name,
                kind: entry.kind,
                path: entry.path,
                variable: entry.variable,
                colormap,
            });
        }

        Ok(Catalogue {
            base_url: helper.base_url,
            datasets,
            site_locations: helper.site_locations,
        })
    }
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::climatehack()
    }
}

impl Catalogue {
    /// The public ClimateHack 2023 data
    #[must_use]
    pub fn climatehack() -> Self {
        use DatasetKind::*;
        Self {
            base_url: CLIMATEHACK_BASE_URL.to_string(),
            datasets: vec![
                DatasetEntry::new("hrv", Satellite, "satellite-hrv/{year}/{month}.zarr.zip", Some("data"), Some(Colormap::Greys)),
                DatasetEntry::new("nonhrv", Satellite, "satellite-nonhrv/{year}/{month}.zarr.zip", Some("data"), Some(Colormap::Greys)),
                DatasetEntry::new("weather", Weather, "weather/{year}/{month}.zarr.zip", Some("t_500"), Some(Colormap::RdBu)),
                DatasetEntry::new("aerosols", Aerosols, "aerosols/{year}/{month}.zarr.zip", Some("co_conc"), Some(Colormap::Magma)),
                DatasetEntry::new("pv", Pv, "pv/{year}/{month}.parquet", None, Some(Colormap::Solar)),
            ],
            site_locations: Some("indices.json".to_string()),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| RuZaVisError::Config(format!("cannot open {}: {e}", path.display())))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| RuZaVisError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RuZaVisError::Config(e.to_string()))
    }

    /// Read `path`, or use the built-in catalogue
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::climatehack()),
        }
    }

    pub fn entry(&self, name: &str) -> Result<&DatasetEntry> {
        self.datasets.iter().find(|d| d.name == name).ok_or_else(|| {
            let known: Vec<&str> = self.datasets.iter().map(|d| d.name.as_str()).collect();
            RuZaVisError::Config(format!(
                "unknown dataset '{name}' (known: {})",
                known.join(", ")
            ))
        })
    }

    /// Location of `name` for the month `YYYY-MM`
    pub fn resolve(&self, name: &str, month: &str) -> Result<StoreLocation> {
        let entry = self.entry(name)?;
        let (year, month) = parse_month(month)?;
        let path = entry
            .path
            .replace("{year}", &year.to_string())
            .replace("{month}", &month.to_string());
        StoreLocation::parse(&self.join(&path))
    }

    /// Location of the site location document, if the catalogue has one
    pub fn site_locations(&self) -> Option<Result<StoreLocation>> {
        self.site_locations
            .as_deref()
            .map(|p| StoreLocation::parse(&self.join(p)))
    }

    fn join(&self, path: &str) -> String {
        let absolute = path.starts_with("http://") || path.starts_with("https://") || path.starts_with('/');
        if absolute || self.base_url.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }
}

/// `YYYY-MM` into `(year, month)`
pub fn parse_month(month: &str) -> Result<(i32, u32)> {
    let invalid = || RuZaVisError::Config(format!("invalid month '{month}', expected YYYY-MM"));
    let (y, m) = month.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let m: u32 = m.parse().map_err(|_| invalid())?;
    if y.len() != 4 || !(1..=12).contains(&m) {
        return Err(invalid());
    }
    Ok((year, m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn builtin_catalogue_resolves_monthly_archives() {
        let catalogue = Catalogue::climatehack();
        let loc = catalogue.resolve("hrv", "2020-07").unwrap();
        assert!(loc.is_remote());
        assert!(loc.is_archive());
        assert_eq!(
            loc.to_string(),
            format!("{CLIMATEHACK_BASE_URL}/satellite-hrv/2020/7.zarr.zip")
        );
        assert!(catalogue.resolve("pv", "2021-13").is_err());
        assert!(catalogue.resolve("radar", "2020-07").is_err());
        assert!(catalogue.site_locations().unwrap().unwrap().is_remote());
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("catalogue.json");
        let mut file = File::create(&file_path).unwrap();
        let store = dir.path().join("hrv");
        write!(
            file,
            r#"{{
                "base_url": "",
                "datasets": [
                    {{"name": "hrv", "kind": "satellite", "path": "{}", "variable": "data", "colormap": "Greys"}},
                    {{"name": "pv", "kind": "pv", "path": "/data/pv/{{year}}-{{month}}.parquet"}}
                ]
            }}"#,
            store.display()
        )
        .unwrap();

        let catalogue = Catalogue::from_file(&file_path).unwrap();
        assert_eq!(catalogue.datasets.len(), 2);
        assert_eq!(catalogue.datasets[0].colormap, Some(Colormap::Greys));
        assert_eq!(catalogue.datasets[1].kind, DatasetKind::Pv);
        assert_eq!(
            catalogue.resolve("pv", "2021-01").unwrap().to_string(),
            "/data/pv/2021-1.parquet"
        );
        assert!(catalogue.site_locations().is_none());
    }

    #[test]
    fn invalid_catalogues_are_rejected() {
        let duplicate = r#"{"datasets": [
            {"name": "a", "kind": "weather", "path": "x"},
            {"name": "a", "kind": "weather", "path": "y"}
        ]}"#;
        assert!(Catalogue::from_json_str(duplicate).is_err());

        let empty = r#"{"datasets": [{"name": " ", "kind": "weather", "path": "x"}]}"#;
        assert!(Catalogue::from_json_str(empty).is_err());

        let kind = r#"{"datasets": [{"name": "a", "kind": "radar", "path": "x"}]}"#;
        assert!(Catalogue::from_json_str(kind).is_err());

        let colormap = r#"{"datasets": [{"name": "a", "kind": "weather", "path": "x", "colormap": "jet"}]}"#;
        assert!(Catalogue::from_json_str(colormap).is_err());
    }

    #[test]
    fn months_must_be_well_formed() {
        assert_eq!(parse_month("2020-07").unwrap(), (2020, 7));
        assert_eq!(parse_month("2021-12").unwrap(), (2021, 12));
        assert!(parse_month("2020-00").is_err());
        assert!(parse_month("20-07").is_err());
        assert!(parse_month("2020/07").is_err());
    }
}
