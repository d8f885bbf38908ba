//! Named colormaps and lookup tables
//!
//! Each colormap is a list of evenly spaced sRGB control points. Lookup tables
//! interpolate between neighbouring points in linear sRGB.

use crate::errors::{Result, RuZaVisError};
use palette::{LinSrgb, Mix, Srgb};
use std::fmt;
use std::str::FromStr;

/// Number of entries in a lookup table
pub const LUT_SIZE: usize = 256;

/// Colour used for NaN cells
pub const NAN_COLOR: [u8; 3] = [160, 160, 160];

/// Supported colormaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colormap {
    /// Perceptually uniform, dark blue to yellow
    #[default]
    Viridis,
    /// Perceptually uniform, black to pale yellow
    Magma,
    /// Black to white
    Greys,
    /// Diverging, red (low) to blue (high)
    RdBu,
    /// Black through red and orange to white
    Solar,
}

const VIRIDIS: &[u32] = &[
    0x44_01_54, 0x47_2d_7b, 0x3b_52_8b, 0x2c_72_8e, 0x21_91_8c, 0x28_ae_80, 0x5e_c9_62,
    0xad_dc_30, 0xfd_e7_25,
];
const MAGMA: &[u32] = &[
    0x00_00_04, 0x1c_10_44, 0x4f_12_7b, 0x81_25_81, 0xb5_36_7a, 0xe5_50_64, 0xfb_87_61,
    0xfe_c2_87, 0xfc_fd_bf,
];
const GREYS: &[u32] = &[0x00_00_00, 0xff_ff_ff];
const RDBU: &[u32] = &[
    0x67_00_1f, 0xb2_18_2b, 0xd6_60_4d, 0xf4_a5_82, 0xf7_f7_f7, 0x92_c5_de, 0x43_93_c3,
    0x21_66_ac, 0x05_30_61,
];
const SOLAR: &[u32] = &[0x00_00_00, 0x5a_00_00, 0xb4_2d_00, 0xff_8c_00, 0xff_d2_4d, 0xff_ff_ff];

impl Colormap {
    pub const ALL: [Colormap; 5] = [
        Colormap::Viridis,
        Colormap::Magma,
        Colormap::Greys,
        Colormap::RdBu,
        Colormap::Solar,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Viridis => "viridis",
            Self::Magma => "magma",
            Self::Greys => "greys",
            Self::RdBu => "rdbu",
            Self::Solar => "solar",
        }
    }

    const fn stops(self) -> &'static [u32] {
        match self {
            Self::Viridis => VIRIDIS,
            Self::Magma => MAGMA,
            Self::Greys => GREYS,
            Self::RdBu => RDBU,
            Self::Solar => SOLAR,
        }
    }

    /// Colour at position `t` in `[0, 1]`, clamped
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn color_at(self, t: f32) -> [u8; 3] {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let segments = (stops.len() - 1) as f32;
        let pos = t * segments;
        let i = (pos.floor() as usize).min(stops.len() - 2);
        let frac = pos - i as f32;

        let a = linear(stops[i]);
        let b = linear(stops[i + 1]);
        let mixed: Srgb<u8> = Srgb::from_linear(a.mix(b, frac));
        [mixed.red, mixed.green, mixed.blue]
    }

    /// Precomputed lookup table
    #[must_use]
    pub fn lut(self) -> ColorLut {
        ColorLut::new(self)
    }
}

fn linear(hex: u32) -> LinSrgb<f32> {
    let [_, r, g, b] = hex.to_be_bytes();
    Srgb::new(r, g, b).into_linear()
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl serde::Serialize for Colormap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl FromStr for Colormap {
    type Err = RuZaVisError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|c| c.name()).collect();
                RuZaVisError::InvalidArgument(format!(
                    "unknown colormap '{s}', expected one of: {}",
                    names.join(", ")
                ))
            })
    }
}

/// A colormap sampled at [`LUT_SIZE`] points
#[derive(Debug, Clone)]
pub struct ColorLut {
    colors: Vec<[u8; 3]>,
}

impl ColorLut {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(colormap: Colormap) -> Self {
        let colors = (0..LUT_SIZE)
            .map(|i| colormap.color_at(i as f32 / (LUT_SIZE - 1) as f32))
            .collect();
        Self { colors }
    }

    /// Colour for a normalized value; NaN maps to [`NAN_COLOR`]
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn color(&self, t: f32) -> [u8; 3] {
        if t.is_nan() {
            return NAN_COLOR;
        }
        let i = (t.clamp(0.0, 1.0) * (LUT_SIZE - 1) as f32).round() as usize;
        self.colors[i.min(LUT_SIZE - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_match_control_points() {
        assert_eq!(Colormap::Greys.color_at(0.0), [0, 0, 0]);
        assert_eq!(Colormap::Greys.color_at(1.0), [255, 255, 255]);
        assert_eq!(Colormap::Viridis.color_at(0.0), [0x44, 0x01, 0x54]);
        assert_eq!(Colormap::Viridis.color_at(1.0), [0xfd, 0xe7, 0x25]);
    }

    #[test]
    fn out_of_range_values_clamp() {
        let lut = Colormap::Magma.lut();
        assert_eq!(lut.color(-3.0), lut.color(0.0));
        assert_eq!(lut.color(7.0), lut.color(1.0));
        assert_eq!(lut.color(f32::NAN), NAN_COLOR);
    }

    #[test]
    fn greys_is_monotonic() {
        let lut = Colormap::Greys.lut();
        let mut last = 0;
        for i in 0..=10 {
            let [r, g, b] = lut.color(i as f32 / 10.0);
            assert_eq!(r, g);
            assert_eq!(g, b);
            assert!(r >= last);
            last = r;
        }
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("RdBu".parse::<Colormap>().unwrap(), Colormap::RdBu);
        assert_eq!(" solar ".parse::<Colormap>().unwrap(), Colormap::Solar);
        assert!("jet".parse::<Colormap>().is_err());
    }
}
