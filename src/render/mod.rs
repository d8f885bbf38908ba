//! Rendering selections to PNG images
//!
//! - 1-D selections become a single-row strip
//! - 2-D selections become a heatmap, one cell per element
//! - 3-D selections become a grid of panels along the leading dimension
//!
//! All panels of an image share one [`ValueRange`]. Cells are scaled by an
//! integer factor with nearest-neighbour sampling, and NaN is drawn in
//! [`colormap::NAN_COLOR`].

pub mod colormap;

pub use colormap::{ColorLut, Colormap, NAN_COLOR};

use crate::errors::{Result, RuZaVisError};
use crate::select::SelectedArray;
use image::{Rgb, RgbImage};
use ndarray::{ArrayD, ArrayView2, Axis, Ix2};
use rayon::prelude::*;
use std::path::Path;

/// Gap between grid panels, in pixels
pub const GUTTER: u32 = 2;
/// Height of a 1-D strip before scaling
pub const STRIP_HEIGHT: u32 = 16;
/// Width of the colour bar
pub const COLORBAR_WIDTH: u32 = 16;
/// Gap between the image and the colour bar
pub const COLORBAR_GAP: u32 = 4;
/// Largest accepted image side
pub const MAX_SIDE: u32 = 32_768;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Lower and upper value mapped to the ends of the colormap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub vmin: f32,
    pub vmax: f32,
}

impl ValueRange {
    /// Explicit range; equal bounds are widened by 0.5 on each side
    pub fn new(vmin: f32, vmax: f32) -> Result<Self> {
        if !vmin.is_finite() || !vmax.is_finite() {
            return Err(RuZaVisError::InvalidArgument(
                "vmin and vmax must be finite".to_string(),
            ));
        }
        if vmin > vmax {
            return Err(RuZaVisError::InvalidArgument(format!(
                "vmin ({vmin}) is greater than vmax ({vmax})"
            )));
        }
        Ok(Self::widened(vmin, vmax))
    }

    fn widened(vmin: f32, vmax: f32) -> Self {
        if vmin == vmax {
            Self {
                vmin: vmin - 0.5,
                vmax: vmax + 0.5,
            }
        } else {
            Self { vmin, vmax }
        }
    }

    /// Range of the finite values, or the 2nd to 98th percentile when `robust`
    ///
    /// Without any finite value the range is `[-0.5, 0.5]`.
    #[must_use]
    pub fn from_data(data: &ArrayD<f32>, robust: bool) -> Self {
        let mut values: Vec<f32> = data.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return Self::widened(0.0, 0.0);
        }
        values.par_sort_unstable_by(f32::total_cmp);

        let (lo, hi) = if robust {
            (percentile(&values, 2.0), percentile(&values, 98.0))
        } else {
            (values[0], values[values.len() - 1])
        };
        Self::widened(lo, hi)
    }

    /// Explicit bounds where given, data-derived bounds otherwise
    pub fn resolve(data: &ArrayD<f32>, vmin: Option<f32>, vmax: Option<f32>, robust: bool) -> Result<Self> {
        match (vmin, vmax) {
            (Some(lo), Some(hi)) => Self::new(lo, hi),
            (lo, hi) => {
                let auto = Self::from_data(data, robust);
                let lo = lo.unwrap_or(auto.vmin);
                let hi = hi.unwrap_or(auto.vmax);
                Self::new(lo, hi)
            }
        }
    }

    /// Map a value to `[0, 1]` (values outside the range fall outside too; NaN stays NaN)
    #[must_use]
    pub fn normalize(&self, v: f32) -> f32 {
        (v - self.vmin) / (self.vmax - self.vmin)
    }
}

/// Linear-interpolated percentile of sorted values (numpy's default method)
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentile(sorted: &[f32], q: f64) -> f32 {
    match sorted.len() {
        0 => f32::NAN,
        1 => sorted[0],
        n => {
            let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = rank - lo as f64;
            let a = f64::from(sorted[lo]);
            let b = f64::from(sorted[hi]);
            (a + (b - a) * frac) as f32
        }
    }
}

/// Vertical direction of 2-D panels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Flip when the row coordinate ascends, so larger values are drawn on top
    #[default]
    Auto,
    /// Row 0 at the top
    Keep,
    /// Row 0 at the bottom
    Flip,
}

/// Plot configuration
#[derive(Debug, Clone)]
pub struct PlotOptions {
    pub colormap: Colormap,
    pub vmin: Option<f32>,
    pub vmax: Option<f32>,
    /// Use the 2nd/98th percentiles when bounds are not given
    pub robust: bool,
    /// Pixels per cell
    pub scale: u32,
    pub colorbar: bool,
    pub orientation: Orientation,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            colormap: Colormap::default(),
            vmin: None,
            vmax: None,
            robust: true,
            scale: 1,
            colorbar: false,
            orientation: Orientation::Auto,
        }
    }
}

impl PlotOptions {
    fn validate(&self) -> Result<()> {
        if self.scale == 0 {
            return Err(RuZaVisError::InvalidArgument(
                "scale must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Render one 2-D panel into `image` at (`x0`, `y0`)
#[allow(clippy::cast_possible_truncation)]
fn draw_panel(
    image: &mut RgbImage,
    panel: ArrayView2<'_, f32>,
    x0: u32,
    y0: u32,
    range: ValueRange,
    lut: &ColorLut,
    scale: u32,
    flip: bool,
) {
    let (rows, cols) = panel.dim();
    for r in 0..rows {
        let src_row = if flip { rows - 1 - r } else { r };
        for c in 0..cols {
            let color = Rgb(lut.color(range.normalize(panel[[src_row, c]])));
            let px = x0 + c as u32 * scale;
            let py = y0 + r as u32 * scale;
            for dy in 0..scale {
                for dx in 0..scale {
                    image.put_pixel(px + dx, py + dy, color);
                }
            }
        }
    }
}

fn checked_side(side: u64, what: &str) -> Result<u32> {
    u32::try_from(side)
        .ok()
        .filter(|s| *s <= MAX_SIDE && *s > 0)
        .ok_or_else(|| {
            RuZaVisError::InvalidArgument(format!(
                "image {what} of {side} pixels is out of range (1..={MAX_SIDE}); select a smaller region or lower the scale"
            ))
        })
}

/// Render a 2-D array as a heatmap
pub fn render_heatmap(
    data: ArrayView2<'_, f32>,
    range: ValueRange,
    colormap: Colormap,
    scale: u32,
    flip: bool,
) -> Result<RgbImage> {
    let (rows, cols) = data.dim();
    let width = checked_side(cols as u64 * u64::from(scale), "width")?;
    let height = checked_side(rows as u64 * u64::from(scale), "height")?;

    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);
    draw_panel(&mut image, data, 0, 0, range, &colormap.lut(), scale, flip);
    Ok(image)
}

/// Render a 1-D array as a strip of [`STRIP_HEIGHT`] rows
pub fn render_strip(data: &ArrayD<f32>, range: ValueRange, colormap: Colormap, scale: u32) -> Result<RgbImage> {
    if data.ndim() != 1 {
        return Err(RuZaVisError::InvalidArgument(format!(
            "strip needs a 1-D array, got {} dimensions",
            data.ndim()
        )));
    }
    let row = data.view().insert_axis(Axis(0));
    let row = row
        .into_dimensionality::<Ix2>()
        .map_err(RuZaVisError::ArrayShape)?;
    let stretched = row.broadcast((STRIP_HEIGHT as usize, data.len())).ok_or_else(|| {
        RuZaVisError::InvalidArgument("cannot broadcast strip".to_string())
    })?;
    render_heatmap(stretched, range, colormap, scale, false)
}

/// Render a 3-D array as a grid of 2-D panels along axis 0
///
/// Panels are laid out row by row in `ceil(sqrt(n))` columns separated by [`GUTTER`] pixels.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn render_grid(
    data: &ArrayD<f32>,
    range: ValueRange,
    colormap: Colormap,
    scale: u32,
    flip: bool,
) -> Result<RgbImage> {
    if data.ndim() != 3 {
        return Err(RuZaVisError::InvalidArgument(format!(
            "grid needs a 3-D array, got {} dimensions",
            data.ndim()
        )));
    }
    let (n, rows, cols) = (data.shape()[0], data.shape()[1], data.shape()[2]);
    if n == 0 {
        return Err(RuZaVisError::InvalidArgument("grid has no panels".to_string()));
    }
    let (grid_cols, grid_rows) = grid_layout(n);

    let panel_w = cols as u64 * u64::from(scale);
    let panel_h = rows as u64 * u64::from(scale);
    let gutter = u64::from(GUTTER);
    let width = checked_side(grid_cols as u64 * panel_w + (grid_cols as u64 - 1) * gutter, "width")?;
    let height = checked_side(grid_rows as u64 * panel_h + (grid_rows as u64 - 1) * gutter, "height")?;

    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);
    let lut = colormap.lut();
    for (i, panel) in data.axis_iter(Axis(0)).enumerate() {
        let panel = panel
            .into_dimensionality::<Ix2>()
            .map_err(RuZaVisError::ArrayShape)?;
        let x0 = (i % grid_cols) as u64 * (panel_w + gutter);
        let y0 = (i / grid_cols) as u64 * (panel_h + gutter);
        draw_panel(&mut image, panel, x0 as u32, y0 as u32, range, &lut, scale, flip);
    }
    Ok(image)
}

/// Columns and rows of the panel grid for `n` panels
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn grid_layout(n: usize) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }
    let mut cols = (n as f64).sqrt().ceil() as usize;
    while cols * cols < n {
        cols += 1;
    }
    (cols, n.div_ceil(cols))
}

/// Append a vertical colour bar (maximum at the top) to the right of `image`
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn with_colorbar(image: &RgbImage, colormap: Colormap) -> RgbImage {
    let (w, h) = image.dimensions();
    let mut out = RgbImage::from_pixel(w + COLORBAR_GAP + COLORBAR_WIDTH, h, BACKGROUND);
    for (x, y, p) in image.enumerate_pixels() {
        out.put_pixel(x, y, *p);
    }
    let lut = colormap.lut();
    for y in 0..h {
        let t = if h > 1 {
            1.0 - y as f32 / (h - 1) as f32
        } else {
            1.0
        };
        let color = Rgb(lut.color(t));
        for x in 0..COLORBAR_WIDTH {
            out.put_pixel(w + COLORBAR_GAP + x, y, color);
        }
    }
    out
}

/// Whether panels of `selected` should be drawn bottom-up
#[must_use]
pub fn should_flip(selected: &SelectedArray, orientation: Orientation) -> bool {
    match orientation {
        Orientation::Keep => false,
        Orientation::Flip => true,
        Orientation::Auto => {
            let ndim = selected.ndim();
            ndim >= 2
                && selected.coords[ndim - 2]
                    .as_ref()
                    .is_some_and(crate::coords::Coordinate::is_ascending)
        }
    }
}

/// Render a selection to an image
pub fn render(selected: &SelectedArray, options: &PlotOptions) -> Result<(RgbImage, ValueRange)> {
    options.validate()?;
    let range = ValueRange::resolve(&selected.data, options.vmin, options.vmax, options.robust)?;
    let flip = should_flip(selected, options.orientation);

    let image = match selected.ndim() {
        0 => {
            let as_strip = selected.data.clone().insert_axis(Axis(0));
            render_strip(&as_strip, range, options.colormap, options.scale)?
        }
        1 => render_strip(&selected.data, range, options.colormap, options.scale)?,
        2 => {
            let view = selected
                .data
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(RuZaVisError::ArrayShape)?;
            render_heatmap(view, range, options.colormap, options.scale, flip)?
        }
        3 => render_grid(&selected.data, range, options.colormap, options.scale, flip)?,
        n => {
            return Err(RuZaVisError::InvalidSelection {
                message: format!(
                    "cannot plot {n} dimensions ({}); select or reduce down to at most 3",
                    selected.dims.join(", ")
                ),
            })
        }
    };

    let image = if options.colorbar {
        with_colorbar(&image, options.colormap)
    } else {
        image
    };
    Ok((image, range))
}

/// Render a selection and write it as PNG
pub fn plot(selected: &SelectedArray, options: &PlotOptions, path: &Path) -> Result<(u32, u32, ValueRange)> {
    let (image, range) = render(selected, options)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image.save_with_format(path, image::ImageFormat::Png)?;
    log::info!(
        "Wrote {}x{} PNG to {}",
        image.width(),
        image.height(),
        path.display()
    );
    Ok((image.width(), image.height(), range))
}
