//! Color compositing and adjustment filters.
//!
//! All of these are best effort: when a surface or buffer cannot be made the
//! input raster is returned unchanged and a warning is logged.

use rayon::prelude::*;

use super::normalize::fixed_alpha;
use crate::error::{Error, Result};
use crate::raster::{premultiply, unpremultiply, Color, RasterBuffer, BYTES_PER_PIXEL};
use crate::surface::{BlendMode, Surface};

// Rec. 709 luma, as used by color-controls saturation
const LUMA: [f32; 3] = [0.2125, 0.7154, 0.0721];

fn best_effort(
    name: &str,
    raster: &RasterBuffer,
    op: impl FnOnce() -> Result<RasterBuffer>,
) -> RasterBuffer {
    match op() {
        Ok(out) => out,
        Err(e) => {
            log::warn!("{name} skipped: {e}");
            raster.clone()
        }
    }
}

fn surface_for(raster: &RasterBuffer) -> Result<Surface> {
    Surface::new(raster.width(), raster.height())
}

fn snapshot(surface: &Surface, raster: &RasterBuffer) -> Result<RasterBuffer> {
    surface.make_image(
        fixed_alpha(raster.alpha_info()),
        surface.width() as usize * BYTES_PER_PIXEL,
        raster.scale(),
    )
}

/// Paint `color` through the image's alpha, then lay the image back on top
/// at `fraction` opacity.
///
/// A fraction of 0 leaves a flat silhouette in `color`; 1 restores the
/// original wherever it is opaque.
pub fn overlay(raster: &RasterBuffer, color: Color, fraction: f32) -> RasterBuffer {
    best_effort("Overlay", raster, || {
        let mut surface = surface_for(raster)?;
        surface.fill(color, BlendMode::Copy);
        surface.draw(raster, BlendMode::DestinationIn, 1.0)?;
        if fraction > 0.0 {
            surface.draw(raster, BlendMode::SourceAtop, fraction)?;
        }
        snapshot(&surface, raster)
    })
}

/// Composite a constant `color` field over the image, cropped to its extent
pub fn tint(raster: &RasterBuffer, color: Color) -> RasterBuffer {
    best_effort("Tint", raster, || {
        let mut surface = surface_for(raster)?;
        surface.draw(raster, BlendMode::Copy, 1.0)?;
        surface.fill(color, BlendMode::SourceOver);
        snapshot(&surface, raster)
    })
}

/// Per-pixel color filter working on straight (non-premultiplied) RGB in `0..=1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorFilter {
    /// Saturation around Rec. 709 luma, then an additive brightness shift and
    /// contrast around mid grey. The identity is `(0, 1, 1)`.
    Controls {
        brightness: f32,
        contrast: f32,
        saturation: f32,
    },
    /// Scale by `2^ev`
    Exposure { ev: f32 },
}

impl ColorFilter {
    #[inline]
    fn apply(self, rgb: [f32; 3]) -> [f32; 3] {
        match self {
            ColorFilter::Controls {
                brightness,
                contrast,
                saturation,
            } => {
                let luma: f32 = rgb.iter().zip(LUMA).map(|(c, w)| c * w).sum();
                rgb.map(|c| {
                    let c = luma + (c - luma) * saturation + brightness;
                    ((c - 0.5) * contrast + 0.5).clamp(0.0, 1.0)
                })
            }
            ColorFilter::Exposure { ev } => {
                let gain = ev.exp2();
                rgb.map(|c| (c * gain).clamp(0.0, 1.0))
            }
        }
    }
}

/// Run `filters` in order over every pixel. Alpha is untouched.
pub fn apply_filters(raster: &RasterBuffer, filters: &[ColorFilter]) -> Result<RasterBuffer> {
    let mut rgba = raster.to_premultiplied_rgba();

    rgba.par_chunks_mut(BYTES_PER_PIXEL).for_each(|px| {
        let [r, g, b, a] = unpremultiply([px[0], px[1], px[2], px[3]]);
        if a == 0 {
            return;
        }
        let rgb = filters.iter().fold(
            [r, g, b].map(|c| c as f32 / 255.0),
            |rgb, filter| filter.apply(rgb),
        );
        let [r, g, b] = rgb.map(|c| (c * 255.0).round() as u8);
        px.copy_from_slice(&premultiply([r, g, b, a]));
    });

    RasterBuffer::from_premultiplied_rgba(
        raster.width(),
        raster.height(),
        &rgba,
        fixed_alpha(raster.alpha_info()),
        raster.width() as usize * BYTES_PER_PIXEL,
        raster.scale(),
    )
}

/// Color controls followed by exposure, in that order
pub fn adjust(
    raster: &RasterBuffer,
    brightness: f32,
    contrast: f32,
    saturation: f32,
    exposure: f32,
) -> RasterBuffer {
    best_effort("Adjust", raster, || {
        if raster.is_empty() {
            return Err(Error::ResourceExhausted {
                width: raster.width(),
                height: raster.height(),
            });
        }
        apply_filters(
            raster,
            &[
                ColorFilter::Controls {
                    brightness,
                    contrast,
                    saturation,
                },
                ColorFilter::Exposure { ev: exposure },
            ],
        )
    })
}
