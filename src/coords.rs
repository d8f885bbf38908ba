//! Coordinate values and label resolution
//!
//! Coordinates are the 1-D arrays that label a dimension (`time`, `latitude`,
//! `channel`, `level`, ...). Selection by label follows xarray's `.sel`:
//! exact labels, nearest labels and inclusive label ranges.

use crate::errors::{Result, RuZaVisError};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::ops::Range;

/// Display format for time labels
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Decoded coordinate values
#[derive(Debug, Clone, PartialEq)]
pub enum CoordValues {
    Time(Vec<NaiveDateTime>),
    Numeric(Vec<f64>),
    Labels(Vec<String>),
}

/// A named coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub values: CoordValues,
}

impl Coordinate {
    #[must_use]
    pub fn new(name: impl Into<String>, values: CoordValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.values {
            CoordValues::Time(v) => v.len(),
            CoordValues::Numeric(v) => v.len(),
            CoordValues::Labels(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human readable label at `index`
    #[must_use]
    pub fn label(&self, index: usize) -> Option<String> {
        match &self.values {
            CoordValues::Time(v) => v.get(index).map(|t| t.format(TIME_FORMAT).to_string()),
            CoordValues::Numeric(v) => v.get(index).map(|x| format!("{x}")),
            CoordValues::Labels(v) => v.get(index).cloned(),
        }
    }

    /// Keep only the values in `range`
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Coordinate {
        let values = match &self.values {
            CoordValues::Time(v) => CoordValues::Time(v[range].to_vec()),
            CoordValues::Numeric(v) => CoordValues::Numeric(v[range].to_vec()),
            CoordValues::Labels(v) => CoordValues::Labels(v[range].to_vec()),
        };
        Coordinate::new(self.name.clone(), values)
    }

    /// Whether the values increase from the first to the last element
    #[must_use]
    pub fn is_ascending(&self) -> bool {
        match &self.values {
            CoordValues::Time(v) => v.first() < v.last(),
            CoordValues::Numeric(v) => match (v.first(), v.last()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            CoordValues::Labels(_) => false,
        }
    }

    /// Index of the value equal to `label`
    pub fn exact(&self, label: &str) -> Result<usize> {
        let found = match &self.values {
            CoordValues::Time(v) => {
                let t = parse_datetime(label)?;
                v.iter().position(|x| *x == t)
            }
            CoordValues::Numeric(v) => {
                let x = self.parse_numeric(label)?;
                v.iter().position(|y| *y == x)
            }
            CoordValues::Labels(v) => v.iter().position(|y| y == label.trim()),
        };
        found.ok_or_else(|| self.missing(label))
    }

    /// Index of the value closest to `label`
    pub fn nearest(&self, label: &str) -> Result<usize> {
        if self.is_empty() {
            return Err(self.missing(label));
        }
        let found = match &self.values {
            CoordValues::Time(v) => {
                let t = parse_datetime(label)?;
                v.iter()
                    .enumerate()
                    .min_by_key(|(_, x)| (**x - t).num_milliseconds().unsigned_abs())
                    .map(|(i, _)| i)
            }
            CoordValues::Numeric(v) => {
                let x = self.parse_numeric(label)?;
                v.iter()
                    .enumerate()
                    .filter(|(_, y)| y.is_finite())
                    .min_by(|(_, a), (_, b)| (*a - x).abs().total_cmp(&(*b - x).abs()))
                    .map(|(i, _)| i)
            }
            CoordValues::Labels(_) => {
                return Err(RuZaVisError::InvalidSelection {
                    message: format!(
                        "nearest selection is not available for text coordinate '{}'",
                        self.name
                    ),
                })
            }
        };
        found.ok_or_else(|| self.missing(label))
    }

    /// Inclusive label range, bounds accepted in either order
    pub fn range(&self, lo: &str, hi: &str) -> Result<Range<usize>> {
        let spec = format!("{lo}..{hi}");
        let matches: Vec<usize> = match &self.values {
            CoordValues::Time(v) => {
                let (a, b) = ordered(parse_datetime(lo)?, parse_datetime(hi)?);
                v.iter()
                    .enumerate()
                    .filter(|(_, t)| **t >= a && **t <= b)
                    .map(|(i, _)| i)
                    .collect()
            }
            CoordValues::Numeric(v) => {
                let (a, b) = ordered(self.parse_numeric(lo)?, self.parse_numeric(hi)?);
                v.iter()
                    .enumerate()
                    .filter(|(_, x)| **x >= a && **x <= b)
                    .map(|(i, _)| i)
                    .collect()
            }
            CoordValues::Labels(_) => {
                let (i, j) = ordered(self.exact(lo)?, self.exact(hi)?);
                return Ok(i..j + 1);
            }
        };

        let (Some(&first), Some(&last)) = (matches.first(), matches.last()) else {
            return Err(RuZaVisError::EmptySelection {
                dim: self.name.clone(),
                spec,
            });
        };
        if last - first + 1 != matches.len() {
            return Err(RuZaVisError::NonMonotonic {
                dim: self.name.clone(),
            });
        }
        Ok(first..last + 1)
    }

    fn parse_numeric(&self, label: &str) -> Result<f64> {
        label
            .trim()
            .parse::<f64>()
            .map_err(|_| RuZaVisError::InvalidSelection {
                message: format!("'{label}' is not a number for coordinate '{}'", self.name),
            })
    }

    fn missing(&self, label: &str) -> RuZaVisError {
        RuZaVisError::LabelNotFound {
            dim: self.name.clone(),
            label: label.to_string(),
        }
    }
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if b < a {
        (b, a)
    } else {
        (a, b)
    }
}

/// Parse a timestamp label such as `2020-07-01T12:00`, `2020-07-01 12:00:00` or `2020-07-01`
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim().trim_end_matches('Z');
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(t);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| RuZaVisError::Time(format!("cannot parse '{s}' as a timestamp")))
}

/// Length of one CF/numpy time unit in nanoseconds
fn unit_nanos(unit: &str) -> Option<i64> {
    let nanos = match unit.trim().to_ascii_lowercase().as_str() {
        "ns" | "nanosecond" | "nanoseconds" => 1,
        "us" | "microsecond" | "microseconds" => 1_000,
        "ms" | "millisecond" | "milliseconds" => 1_000_000,
        "s" | "second" | "seconds" => 1_000_000_000,
        "m" | "minute" | "minutes" => 60_000_000_000,
        "h" | "hour" | "hours" => 3_600_000_000_000,
        "d" | "day" | "days" => 86_400_000_000_000,
        _ => return None,
    };
    Some(nanos)
}

/// Parse CF time units of the form `<unit> since <reference>`
pub fn parse_time_units(units: &str) -> Option<(i64, NaiveDateTime)> {
    let (unit, reference) = units.split_once(" since ")?;
    let nanos = unit_nanos(unit)?;
    // References sometimes carry a trailing timezone such as "+00:00" or " UTC"
    let reference = reference.trim().trim_end_matches(" UTC").trim_end_matches("+00:00");
    let reference = parse_datetime(reference).ok()?;
    Some((nanos, reference))
}

/// Decode integer offsets with CF units
pub fn decode_time_i64(values: &[i64], units: &str) -> Result<Vec<NaiveDateTime>> {
    let (nanos, reference) = parse_time_units(units)
        .ok_or_else(|| RuZaVisError::Time(format!("unsupported time units '{units}'")))?;
    values
        .iter()
        .map(|&v| {
            v.checked_mul(nanos)
                .map(|n| reference + Duration::nanoseconds(n))
                .ok_or_else(|| RuZaVisError::Time(format!("offset {v} overflows with '{units}'")))
        })
        .collect()
}

/// Decode floating point offsets with CF units
pub fn decode_time_f64(values: &[f64], units: &str) -> Result<Vec<NaiveDateTime>> {
    let (nanos, reference) = parse_time_units(units)
        .ok_or_else(|| RuZaVisError::Time(format!("unsupported time units '{units}'")))?;
    values
        .iter()
        .map(|&v| {
            if v.is_finite() {
                #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
                let offset = (v * nanos as f64).round() as i64;
                Ok(reference + Duration::nanoseconds(offset))
            } else {
                Err(RuZaVisError::Time(format!("non-finite time offset {v}")))
            }
        })
        .collect()
}

/// Decode numpy `datetime64[<unit>]` values counted from the Unix epoch
pub fn decode_datetime64(values: &[i64], unit: &str) -> Result<Vec<NaiveDateTime>> {
    let nanos = unit_nanos(unit)
        .ok_or_else(|| RuZaVisError::Time(format!("unsupported datetime64 unit '{unit}'")))?;
    // NaiveDateTime's default is the Unix epoch
    let epoch = NaiveDateTime::default();
    values
        .iter()
        .map(|&v| {
            v.checked_mul(nanos)
                .map(|n| epoch + Duration::nanoseconds(n))
                .ok_or_else(|| RuZaVisError::Time(format!("datetime64 value {v} overflows")))
        })
        .collect()
}
