//! Software 2D drawing surface.
//!
//! Every transform that needs to "draw" an image goes through a [`Surface`]:
//! it holds premultiplied RGBA in `0..=255`, supports an optional rounded-rect
//! clip, and composites images or flat colors with a small set of blend modes.

use fast_image_resize as fr;
use fr::images::Image as FrImage;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::raster::{alloc_pixels, AlphaInfo, Color, RasterBuffer, BYTES_PER_PIXEL};

// samples per axis when computing clip coverage
const CLIP_SUPERSAMPLE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlendMode {
    /// Replace destination
    Copy,
    SourceOver,
    /// Keep destination where source is opaque
    DestinationIn,
    /// Draw source only where destination is opaque
    SourceAtop,
}

impl BlendMode {
    #[inline]
    fn blend(self, s: [f32; 4], d: [f32; 4]) -> [f32; 4] {
        let (sa, da) = (s[3], d[3]);
        let mut out = [0.0; 4];
        for c in 0..4 {
            out[c] = match self {
                BlendMode::Copy => s[c],
                BlendMode::SourceOver => s[c] + d[c] * (1.0 - sa),
                BlendMode::DestinationIn => d[c] * sa,
                BlendMode::SourceAtop => s[c] * da + d[c] * (1.0 - sa),
            };
        }
        out
    }
}

pub(crate) struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    clip: Option<Vec<f32>>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
            .filter(|&n| n > 0)
            .ok_or(Error::ResourceExhausted { width, height })?;

        Ok(Self {
            width,
            height,
            pixels: alloc_pixels(len, width, height)?,
            clip: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Restrict later drawing to a rounded rectangle covering the surface.
    ///
    /// Corner radii are bounded by the half extents, so an oversized radius
    /// turns the clip into an ellipse.
    pub fn clip_to_rounded_rect(&mut self, radius: f64) {
        let (w, h) = (self.width as f64, self.height as f64);
        let rx = radius.max(0.0).min(w / 2.0);
        let ry = radius.max(0.0).min(h / 2.0);
        let width = self.width as usize;

        let mut coverage = vec![0.0f32; width * self.height as usize];
        coverage
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cov) in row.iter_mut().enumerate() {
                    *cov = pixel_coverage(x as f64, y as f64, w, h, rx, ry);
                }
            });

        self.clip = Some(coverage);
    }

    pub fn fill(&mut self, color: Color, mode: BlendMode) {
        let src = color.premultiplied();
        let clip = self.clip.as_deref();
        for (i, px) in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let coverage = clip.map_or(1.0, |c| c[i]);
            composite(px, src, mode, coverage);
        }
    }

    /// Draw `image` stretched over the whole surface at `alpha` opacity
    pub fn draw(&mut self, image: &RasterBuffer, mode: BlendMode, alpha: f32) -> Result<()> {
        let src = image.to_premultiplied_rgba();
        let src = if image.dimensions() == (self.width, self.height) {
            src
        } else {
            scale_rgba(src, image.width(), image.height(), self.width, self.height)?
        };

        let alpha = alpha.clamp(0.0, 1.0);
        let clip = self.clip.as_deref();
        self.pixels
            .par_chunks_mut(BYTES_PER_PIXEL)
            .zip(src.par_chunks(BYTES_PER_PIXEL))
            .enumerate()
            .for_each(|(i, (dst, s))| {
                let coverage = clip.map_or(1.0, |c| c[i]);
                let s = [
                    s[0] as f32 / 255.0 * alpha,
                    s[1] as f32 / 255.0 * alpha,
                    s[2] as f32 / 255.0 * alpha,
                    s[3] as f32 / 255.0 * alpha,
                ];
                composite(dst, s, mode, coverage);
            });

        Ok(())
    }

    /// Premultiplied RGBA pixels, tightly packed
    #[cfg(test)]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Snapshot the surface into a buffer stored in `alpha` layout
    pub fn make_image(
        &self,
        alpha: AlphaInfo,
        bytes_per_row: usize,
        scale: f32,
    ) -> Result<RasterBuffer> {
        RasterBuffer::from_premultiplied_rgba(
            self.width,
            self.height,
            &self.pixels,
            alpha,
            bytes_per_row,
            scale,
        )
    }
}

#[inline]
fn composite(dst: &mut [u8], src: [f32; 4], mode: BlendMode, coverage: f32) {
    if coverage <= 0.0 {
        return;
    }
    let d = [
        dst[0] as f32 / 255.0,
        dst[1] as f32 / 255.0,
        dst[2] as f32 / 255.0,
        dst[3] as f32 / 255.0,
    ];
    let b = mode.blend(src, d);
    for c in 0..4 {
        let v = d[c] + coverage * (b[c] - d[c]);
        dst[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

/// Fraction of the pixel at (`x`, `y`) inside the rounded rect
fn pixel_coverage(x: f64, y: f64, w: f64, h: f64, rx: f64, ry: f64) -> f32 {
    // interior pixels away from every corner are fully covered
    if (x >= rx && x + 1.0 <= w - rx) || (y >= ry && y + 1.0 <= h - ry) {
        return 1.0;
    }

    let step = 1.0 / CLIP_SUPERSAMPLE as f64;
    let mut inside = 0;
    for sy in 0..CLIP_SUPERSAMPLE {
        for sx in 0..CLIP_SUPERSAMPLE {
            let px = x + (sx as f64 + 0.5) * step;
            let py = y + (sy as f64 + 0.5) * step;
            if inside_rounded_rect(px, py, w, h, rx, ry) {
                inside += 1;
            }
        }
    }
    inside as f32 / (CLIP_SUPERSAMPLE * CLIP_SUPERSAMPLE) as f32
}

fn inside_rounded_rect(x: f64, y: f64, w: f64, h: f64, rx: f64, ry: f64) -> bool {
    if x < 0.0 || y < 0.0 || x > w || y > h {
        return false;
    }
    if rx <= 0.0 || ry <= 0.0 {
        return true;
    }

    let dx = if x < rx {
        rx - x
    } else if x > w - rx {
        x - (w - rx)
    } else {
        0.0
    };
    let dy = if y < ry {
        ry - y
    } else if y > h - ry {
        y - (h - ry)
    } else {
        0.0
    };

    (dx / rx).powi(2) + (dy / ry).powi(2) <= 1.0
}

/// Box-filter rescale of packed 4-channel pixels. Channels are treated
/// independently, so premultiplied input stays premultiplied.
pub(crate) fn scale_rgba(
    src: Vec<u8>,
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> Result<Vec<u8>> {
    let exhausted = || Error::ResourceExhausted {
        width: dst_width,
        height: dst_height,
    };

    let src_image = FrImage::from_vec_u8(src_width, src_height, src, fr::PixelType::U8x4)
        .map_err(|_| exhausted())?;

    let len = dst_width as usize * dst_height as usize * BYTES_PER_PIXEL;
    let dst_buffer = alloc_pixels(len, dst_width, dst_height)?;
    let mut dst_image =
        FrImage::from_vec_u8(dst_width, dst_height, dst_buffer, fr::PixelType::U8x4)
            .map_err(|_| exhausted())?;

    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Box))
        .use_alpha(false);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|_| exhausted())?;

    Ok(dst_image.into_vec())
}
