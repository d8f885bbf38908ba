//! Selection specs and materialization
//!
//! A selection is a list of per-dimension specs:
//!
//! | spec            | meaning                          | dimension |
//! |-----------------|----------------------------------|-----------|
//! | `dim=value`     | exact coordinate label           | dropped   |
//! | `dim~value`     | nearest coordinate label         | dropped   |
//! | `dim=a..b`      | inclusive label range            | kept      |
//! | `dim=#i`        | position                         | dropped   |
//! | `dim=#i..#j`    | half-open position range         | kept      |
//!
//! Dimensions without a spec are read whole.

use crate::coords::Coordinate;
use crate::dataset::Dataset;
use crate::errors::{Result, RuZaVisError};
use crate::statistics::{summarize, StatOperation, StatisticalReduction, SummaryStats};
use ndarray::{ArrayD, Axis};
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// How one dimension is selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Label(String),
    Nearest(String),
    LabelRange(String, String),
    Index(usize),
    IndexRange(usize, usize),
}

impl Selector {
    /// Whether the dimension survives the selection
    #[must_use]
    pub fn keeps_dimension(&self) -> bool {
        matches!(self, Self::LabelRange(..) | Self::IndexRange(..))
    }

    fn needs_coordinate(&self) -> bool {
        matches!(
            self,
            Self::Label(_) | Self::Nearest(_) | Self::LabelRange(..)
        )
    }
}

/// A selector bound to a dimension name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimSpec {
    pub dim: String,
    pub selector: Selector,
}

impl fmt::Display for DimSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Selector::Label(v) => write!(f, "{}={v}", self.dim),
            Selector::Nearest(v) => write!(f, "{}~{v}", self.dim),
            Selector::LabelRange(a, b) => write!(f, "{}={a}..{b}", self.dim),
            Selector::Index(i) => write!(f, "{}=#{i}", self.dim),
            Selector::IndexRange(i, j) => write!(f, "{}=#{i}..#{j}", self.dim),
        }
    }
}

impl FromStr for DimSpec {
    type Err = RuZaVisError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| RuZaVisError::InvalidSelection {
            message: format!("'{s}': {message}"),
        };

        let split = s
            .find(['=', '~'])
            .ok_or_else(|| invalid("expected dim=value, dim~value, dim=a..b or dim=#i"))?;
        let dim = s[..split].trim();
        let value = s[split + 1..].trim();
        if dim.is_empty() {
            return Err(invalid("missing dimension name"));
        }
        if value.is_empty() {
            return Err(invalid("missing value"));
        }

        let selector = if s[split..].starts_with('~') {
            Selector::Nearest(value.to_string())
        } else if let Some(positional) = value.strip_prefix('#') {
            let parse_index = |text: &str| {
                text.trim()
                    .trim_start_matches('#')
                    .parse::<usize>()
                    .map_err(|_| invalid("positions must be non-negative integers"))
            };
            match positional.split_once("..") {
                Some((start, end)) => {
                    let (start, end) = (parse_index(start)?, parse_index(end)?);
                    if start >= end {
                        return Err(invalid("position range must have start < end"));
                    }
                    Selector::IndexRange(start, end)
                }
                None => Selector::Index(parse_index(positional)?),
            }
        } else if let Some((lo, hi)) = value.split_once("..") {
            let (lo, hi) = (lo.trim(), hi.trim());
            if lo.is_empty() || hi.is_empty() {
                return Err(invalid("label ranges need both bounds"));
            }
            Selector::LabelRange(lo.to_string(), hi.to_string())
        } else {
            Selector::Label(value.to_string())
        };

        Ok(DimSpec {
            dim: dim.to_string(),
            selector,
        })
    }
}

/// A set of per-dimension specs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub specs: Vec<DimSpec>,
}

/// Index ranges to read plus what survives the selection
#[derive(Debug, Clone)]
pub struct ResolvedSelection {
    /// One range per variable dimension
    pub ranges: Vec<Range<u64>>,
    /// Whether each variable dimension is kept
    pub kept: Vec<bool>,
    /// Names of kept dimensions
    pub dims: Vec<String>,
    /// Sliced coordinates of kept dimensions
    pub coords: Vec<Option<Coordinate>>,
    /// Dropped dimensions with the label (or position) they were fixed at
    pub fixed: Vec<(String, String)>,
}

impl ResolvedSelection {
    /// Shape of the selected array after squeezing
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.ranges
            .iter()
            .zip(&self.kept)
            .filter(|(_, kept)| **kept)
            .map(|(r, _)| usize::try_from(r.end - r.start).unwrap_or(usize::MAX))
            .collect()
    }
}

impl Selection {
    #[must_use]
    pub fn new(specs: Vec<DimSpec>) -> Self {
        Self { specs }
    }

    /// Parse every spec string
    pub fn parse_all<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        specs
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<DimSpec>>>()
            .map(Self::new)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Turn the specs into index ranges for `var`
    pub fn resolve(&self, dataset: &Dataset, var: &str) -> Result<ResolvedSelection> {
        let info = dataset.variable(var)?;

        let mut seen = HashSet::new();
        for spec in &self.specs {
            info.axis_of(&spec.dim)?;
            if !seen.insert(spec.dim.as_str()) {
                return Err(RuZaVisError::InvalidSelection {
                    message: format!("dimension '{}' is selected more than once", spec.dim),
                });
            }
        }

        let mut resolved = ResolvedSelection {
            ranges: Vec::with_capacity(info.ndim()),
            kept: Vec::with_capacity(info.ndim()),
            dims: Vec::new(),
            coords: Vec::new(),
            fixed: Vec::new(),
        };

        for (dim, &len) in info.dimensions.iter().zip(&info.shape) {
            let spec = self.specs.iter().find(|s| &s.dim == dim);
            let needs_coordinate = spec.is_some_and(|s| s.selector.needs_coordinate());
            let coordinate = dataset.coordinate(dim)?;
            if let Some(c) = &coordinate {
                if c.len() as u64 != len {
                    return Err(RuZaVisError::InvalidSelection {
                        message: format!(
                            "coordinate '{dim}' has {} values but the dimension has length {len}",
                            c.len()
                        ),
                    });
                }
            }
            if needs_coordinate && coordinate.is_none() {
                return Err(RuZaVisError::CoordinateNotFound { dim: dim.clone() });
            }

            let Some(spec) = spec else {
                resolved.ranges.push(0..len);
                resolved.kept.push(true);
                resolved.dims.push(dim.clone());
                resolved.coords.push(coordinate);
                continue;
            };

            let range = resolve_dim(spec, coordinate.as_ref(), len)?;
            log::debug!("{spec} -> {range:?}");

            if spec.selector.keeps_dimension() {
                let sliced = coordinate.map(|c| c.slice(to_usize(&range)));
                resolved.dims.push(dim.clone());
                resolved.coords.push(sliced);
                resolved.kept.push(true);
            } else {
                let index = usize::try_from(range.start).unwrap_or(usize::MAX);
                let label = coordinate
                    .and_then(|c| c.label(index))
                    .unwrap_or_else(|| format!("#{index}"));
                resolved.fixed.push((dim.clone(), label));
                resolved.kept.push(false);
            }
            resolved.ranges.push(range);
        }

        Ok(resolved)
    }

    /// Resolve, read and squeeze the selection of `var`
    pub fn materialize(&self, dataset: &Dataset, var: &str) -> Result<SelectedArray> {
        let resolved = self.resolve(dataset, var)?;
        let mut data = dataset.read(var, &resolved.ranges)?;

        for (axis, kept) in resolved.kept.iter().enumerate().rev() {
            if !kept {
                data = data.index_axis_move(Axis(axis), 0);
            }
        }

        let info = dataset.variable(var)?;
        Ok(SelectedArray {
            variable: var.to_string(),
            units: info.attr_str("units").map(str::to_string),
            data,
            dims: resolved.dims,
            coords: resolved.coords,
            fixed: resolved.fixed,
            reductions: Vec::new(),
        })
    }
}

fn resolve_dim(spec: &DimSpec, coordinate: Option<&Coordinate>, len: u64) -> Result<Range<u64>> {
    let out_of_bounds = |i: usize| RuZaVisError::InvalidSelection {
        message: format!(
            "position {i} is out of bounds for dimension '{}' of length {len}",
            spec.dim
        ),
    };
    let coordinate = || {
        coordinate.ok_or_else(|| RuZaVisError::CoordinateNotFound {
            dim: spec.dim.clone(),
        })
    };

    let range = match &spec.selector {
        Selector::Index(i) => {
            let i = *i as u64;
            if i >= len {
                return Err(out_of_bounds(i as usize));
            }
            i..i + 1
        }
        Selector::IndexRange(i, j) => {
            if *j as u64 > len {
                return Err(out_of_bounds(*j));
            }
            *i as u64..*j as u64
        }
        Selector::Label(label) => {
            let i = coordinate()?.exact(label)? as u64;
            i..i + 1
        }
        Selector::Nearest(label) => {
            let i = coordinate()?.nearest(label)? as u64;
            i..i + 1
        }
        Selector::LabelRange(lo, hi) => {
            let r = coordinate()?.range(lo, hi)?;
            r.start as u64..r.end as u64
        }
    };
    Ok(range)
}

fn to_usize(range: &Range<u64>) -> Range<usize> {
    let start = usize::try_from(range.start).unwrap_or(usize::MAX);
    let end = usize::try_from(range.end).unwrap_or(usize::MAX);
    start..end
}

/// A materialized selection: data plus the labels of what is left
#[derive(Debug, Clone)]
pub struct SelectedArray {
    pub variable: String,
    pub units: Option<String>,
    pub data: ArrayD<f32>,
    /// Kept dimension names, one per axis of `data`
    pub dims: Vec<String>,
    /// Coordinates of kept dimensions
    pub coords: Vec<Option<Coordinate>>,
    /// Dropped dimensions and the label they were fixed at
    pub fixed: Vec<(String, String)>,
    /// Reductions applied after selection, in order
    pub reductions: Vec<(StatOperation, String)>,
}

impl SelectedArray {
    /// Build from raw data, with positional dimensions and no coordinates
    pub fn from_data(variable: impl Into<String>, data: ArrayD<f32>, dims: Vec<String>) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(RuZaVisError::InvalidArgument(format!(
                "{} dimension names for an array with {} dimensions",
                dims.len(),
                data.ndim()
            )));
        }
        Ok(Self {
            variable: variable.into(),
            units: None,
            coords: vec![None; dims.len()],
            data,
            dims,
            fixed: Vec::new(),
            reductions: Vec::new(),
        })
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Coordinate of a kept dimension
    #[must_use]
    pub fn coordinate(&self, dim: &str) -> Option<&Coordinate> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .and_then(|i| self.coords[i].as_ref())
    }

    /// Reduce one kept dimension, dropping it and its coordinate
    pub fn reduce(mut self, op: StatOperation, dim: &str) -> Result<Self> {
        let axis = self
            .dims
            .iter()
            .position(|d| d == dim)
            .ok_or_else(|| RuZaVisError::DimensionNotFound {
                var: self.variable.clone(),
                dim: dim.to_string(),
            })?;

        log::info!("Computing {op} of {} over {dim}", self.variable);
        self.data = self.data.reduce_along_axis(axis, op)?;
        self.dims.remove(axis);
        self.coords.remove(axis);
        self.reductions.push((op, dim.to_string()));
        Ok(self)
    }

    /// Summary statistics over the finite values
    #[must_use]
    pub fn summary(&self) -> SummaryStats {
        summarize(&self.data)
    }

    /// One-line description such as `data [channel=HRV] mean(time)`
    #[must_use]
    pub fn title(&self) -> String {
        let mut title = self.variable.clone();
        if !self.fixed.is_empty() {
            let fixed: Vec<String> = self.fixed.iter().map(|(d, l)| format!("{d}={l}")).collect();
            title.push_str(&format!(" [{}]", fixed.join(", ")));
        }
        for (op, dim) in &self.reductions {
            title.push_str(&format!(" {op}({dim})"));
        }
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> DimSpec {
        s.parse().unwrap()
    }

    #[test]
    fn parses_every_selector_form() {
        assert_eq!(spec("channel=HRV").selector, Selector::Label("HRV".into()));
        assert_eq!(
            spec("time~2020-07-01T12:02").selector,
            Selector::Nearest("2020-07-01T12:02".into())
        );
        assert_eq!(
            spec("latitude = 60 .. 50").selector,
            Selector::LabelRange("60".into(), "50".into())
        );
        assert_eq!(spec("level=#3").selector, Selector::Index(3));
        assert_eq!(spec("x=#10..#20").selector, Selector::IndexRange(10, 20));
        assert_eq!(spec("x=#10..20").selector, Selector::IndexRange(10, 20));
    }

    #[test]
    fn negative_numeric_ranges_split_on_dots() {
        assert_eq!(
            spec("longitude=-10.5..2.25").selector,
            Selector::LabelRange("-10.5".into(), "2.25".into())
        );
    }

    #[test]
    fn rejects_malformed_specs() {
        for bad in ["time", "=3", "time=", "x=#5..#5", "x=#-1", "x=#a", "t=..b"] {
            assert!(bad.parse::<DimSpec>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn display_round_trips() {
        for s in ["t=2020-07-01", "t~5", "t=1..2", "t=#0", "t=#0..#4"] {
            assert_eq!(spec(s).to_string(), s);
        }
    }

    #[test]
    fn reduce_drops_dimension_and_records_it() {
        let data = ArrayD::from_shape_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 5.0, f32::NAN, 7.0]).unwrap();
        let selected = SelectedArray::from_data("v", data, vec!["y".into(), "x".into()]).unwrap();
        let reduced = selected.reduce(StatOperation::Mean, "y").unwrap();
        assert_eq!(reduced.dims, vec!["x"]);
        assert_eq!(reduced.data.as_slice().unwrap(), &[3.0, 2.0, 5.0]);
        assert_eq!(reduced.title(), "v mean(y)");
        assert!(reduced.reduce(StatOperation::Max, "y").is_err());
    }
}
