//! Iterated box blur approximating a gaussian

use rayon::prelude::*;

use super::normalize::{fixed_alpha, redraw};
use crate::error::{Error, Result};
use crate::raster::{alloc_pixels, RasterBuffer, BYTES_PER_PIXEL};

/// Widest box the convolution accepts. Keeps every window sum of 8-bit
/// samples within `u64`.
pub const MAX_KERNEL: u32 = (1 << 24) - 1;

/// Kernel and pass count derived from a requested blur radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurParameters {
    pub radius: f64,
    /// Box width in pixels, always odd and at most [`MAX_KERNEL`]
    pub kernel: u32,
    pub iterations: u32,
}

impl BlurParameters {
    pub fn new(radius: f64) -> Self {
        // feGaussianBlur: d = floor(s * 3 * sqrt(2 * pi) / 4 + 0.5)
        let s = radius.max(2.0);
        let d = (s * 3.0 * (2.0 * std::f64::consts::PI).sqrt() / 4.0 + 0.5).floor();
        let mut kernel = d.min(MAX_KERNEL as f64) as u32;
        if kernel % 2 == 0 {
            kernel += 1;
        }

        let iterations = if radius < 0.5 {
            1
        } else if radius < 1.5 {
            2
        } else {
            3
        };

        Self {
            radius,
            kernel,
            iterations,
        }
    }
}

/// Blur `raster` with a box kernel sized for `radius`.
///
/// The input is redrawn into its fixed layout first. When buffers cannot be
/// allocated, or the radius is not finite, the input comes back unchanged.
pub fn blur(raster: &RasterBuffer, radius: f64) -> RasterBuffer {
    if !radius.is_finite() {
        log::warn!("Blur skipped: radius {radius} is not finite");
        return raster.clone();
    }

    match try_blur(raster, radius) {
        Ok(blurred) => blurred,
        Err(e) => {
            log::warn!("Blur skipped: {e}");
            raster.clone()
        }
    }
}

fn try_blur(raster: &RasterBuffer, radius: f64) -> Result<RasterBuffer> {
    let params = BlurParameters::new(radius);
    log::debug!(
        "Blurring {}x{} with radius {radius}: kernel {}, {} passes",
        raster.width(),
        raster.height(),
        params.kernel,
        params.iterations
    );

    let alpha = fixed_alpha(raster.alpha_info());
    let source = redraw(raster, alpha, raster.bytes_per_row())?;
    let (width, height) = source.dimensions();
    let (row_bytes, scale) = (source.bytes_per_row(), source.scale());

    let mut input = source.into_data();
    let mut output = alloc_pixels(input.len(), width, height)?;

    for _ in 0..params.iterations {
        box_convolve(
            &input,
            &mut output,
            width,
            height,
            row_bytes,
            params.kernel,
            params.kernel,
        )?;
        std::mem::swap(&mut input, &mut output);
    }

    Ok(RasterBuffer::from_parts(
        width, height, row_bytes, alpha, input, scale,
    ))
}

/// Sum of the window of radius `r` around sample `i` of an `n`-sample line.
///
/// Positions past either end repeat `first` or `last`. `prefix(k)` is the
/// sum of the first `k` samples.
fn window_sum(
    i: usize,
    n: usize,
    r: usize,
    first: u64,
    last: u64,
    prefix: impl Fn(usize) -> u64,
) -> u64 {
    let below = r.saturating_sub(i) as u64;
    let above = (i + r).saturating_sub(n - 1) as u64;
    let start = i.saturating_sub(r);
    let end = (i + r).min(n - 1) + 1;
    below * first + above * last + prefix(end) - prefix(start)
}

/// Box-average every channel of a 4-byte-per-pixel buffer into `dst`.
///
/// Samples outside the image repeat the nearest edge pixel, so boxes wider
/// than the image are fine. Kernel widths must be odd so the box is
/// centered, and are capped at [`MAX_KERNEL`]. Stride padding in `dst` is
/// left as is.
pub fn box_convolve(
    src: &[u8],
    dst: &mut [u8],
    width: u32,
    height: u32,
    row_bytes: usize,
    kernel_x: u32,
    kernel_y: u32,
) -> Result<()> {
    debug_assert!(kernel_x % 2 == 1 && kernel_y % 2 == 1);
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return Ok(());
    }

    let (kernel_x, kernel_y) = (kernel_x.min(MAX_KERNEL), kernel_y.min(MAX_KERNEL));
    let row_len = w * BYTES_PER_PIXEL;
    let rx = (kernel_x / 2) as usize;
    let ry = (kernel_y / 2) as usize;

    // horizontal sums stay unrounded so the result is a true 2D box average
    let mut sums: Vec<u64> = Vec::new();
    sums.try_reserve_exact(row_len * h)
        .map_err(|_| Error::ResourceExhausted { width, height })?;
    sums.resize(row_len * h, 0);

    sums.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, out)| {
            let row = &src[y * row_bytes..y * row_bytes + row_len];
            let mut prefix = vec![0u64; w + 1];

            for c in 0..BYTES_PER_PIXEL {
                for x in 0..w {
                    prefix[x + 1] = prefix[x] + row[x * BYTES_PER_PIXEL + c] as u64;
                }
                let first = row[c] as u64;
                let last = row[(w - 1) * BYTES_PER_PIXEL + c] as u64;
                for x in 0..w {
                    out[x * BYTES_PER_PIXEL + c] = window_sum(x, w, rx, first, last, |k| prefix[k]);
                }
            }
        });

    // running column totals: row y holds the sum of rows 0..=y
    for y in 1..h {
        let (done, rest) = sums.split_at_mut(y * row_len);
        for (s, above) in rest[..row_len].iter_mut().zip(&done[(y - 1) * row_len..]) {
            *s += above;
        }
    }

    let totals = &sums;
    let prefix = |k: usize, i: usize| if k == 0 { 0 } else { totals[(k - 1) * row_len + i] };
    let area = kernel_x as u64 * kernel_y as u64;
    dst.par_chunks_mut(row_bytes)
        .take(h)
        .enumerate()
        .for_each(|(y, out)| {
            for (i, d) in out[..row_len].iter_mut().enumerate() {
                let first = prefix(1, i);
                let last = prefix(h, i) - prefix(h - 1, i);
                let sum = window_sum(y, h, ry, first, last, |k| prefix(k, i));
                *d = ((sum + area / 2) / area) as u8;
            }
        });

    Ok(())
}
