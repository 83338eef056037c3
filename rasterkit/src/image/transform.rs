//! Geometric transforms: aspect fitting, shrinking resize, rounded corners

use super::normalize::{fixed, fixed_alpha};
use crate::error::{Error, Result};
use crate::raster::{RasterBuffer, Size};
use crate::surface::{BlendMode, Surface};

/// How an image is sized into bounds
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContentMode {
    /// Largest aspect-preserving size inside the bounds
    #[default]
    Fit,
    /// Smallest aspect-preserving size covering the bounds
    Fill,
    /// Exactly the bounds
    Stretch,
}

impl ContentMode {
    pub fn target_size(self, size: Size, bounds: Size) -> Size {
        match self {
            ContentMode::Fit => constrain_to_fit(size, bounds),
            ContentMode::Fill => constrain_to_fill(size, bounds),
            ContentMode::Stretch => bounds,
        }
    }
}

/// Candidates matching the bounds' height and width respectively
fn aspect_candidates(size: Size, bounds: Size) -> (f64, f64) {
    let aspect = size.aspect_ratio();
    let aspect_width = (aspect * bounds.height).round();
    let aspect_height = (bounds.width / aspect).round();
    (aspect_width, aspect_height)
}

/// Scale `size` to fit inside `bounds`, keeping its aspect ratio
pub fn constrain_to_fit(size: Size, bounds: Size) -> Size {
    let (aspect_width, aspect_height) = aspect_candidates(size, bounds);
    if aspect_width > bounds.width {
        Size::new(bounds.width, aspect_height)
    } else {
        Size::new(aspect_width, bounds.height)
    }
}

/// Scale `size` to cover `bounds`, keeping its aspect ratio. One side may
/// overflow.
pub fn constrain_to_fill(size: Size, bounds: Size) -> Size {
    let (aspect_width, aspect_height) = aspect_candidates(size, bounds);
    if aspect_width < bounds.width {
        Size::new(bounds.width, aspect_height)
    } else {
        Size::new(aspect_width, bounds.height)
    }
}

/// Shrink `raster` to `size`.
///
/// Only downscaling is supported: a target larger than the source on either
/// axis, or not positive, is rejected and the source left untouched. The
/// result keeps the source's row stride, scale factor and fixed alpha layout.
pub fn resize(raster: &RasterBuffer, size: Size) -> Result<RasterBuffer> {
    let source_size = raster.size();
    let invalid = || Error::InvalidGeometry {
        target: size,
        source_size,
    };

    if !(size.width > 0.0 && size.height > 0.0)
        || size.width > source_size.width
        || size.height > source_size.height
    {
        log::warn!(
            "Invalid resizing target size {size}: must be positive and no larger than {source_size}"
        );
        return Err(invalid());
    }

    let (width, height) = (size.width as u32, size.height as u32);
    if width == 0 || height == 0 {
        return Err(invalid());
    }

    let source = fixed(raster)?;
    let mut surface = Surface::new(width, height)?;
    surface.draw(&source, BlendMode::Copy, 1.0)?;

    log::debug!(
        "Resized {}x{} to {width}x{height}",
        raster.width(),
        raster.height()
    );

    surface.make_image(
        fixed_alpha(source.alpha_info()),
        source.bytes_per_row(),
        source.scale(),
    )
}

/// Draw `raster` into `size`, clipped to a rounded rectangle of `radius`.
///
/// Radii past half the shorter side give an elliptical outline. If no
/// surface can be made the input comes back unchanged.
pub fn round_corners(raster: &RasterBuffer, radius: f64, size: Size) -> RasterBuffer {
    match try_round_corners(raster, radius, size) {
        Ok(rounded) => rounded,
        Err(e) => {
            log::warn!("Round corner skipped: {e}");
            raster.clone()
        }
    }
}

fn try_round_corners(raster: &RasterBuffer, radius: f64, size: Size) -> Result<RasterBuffer> {
    let (width, height) = (size.width.max(0.0) as u32, size.height.max(0.0) as u32);
    let mut surface = Surface::new(width, height)?;
    surface.clip_to_rounded_rect(radius);
    surface.draw(raster, BlendMode::Copy, 1.0)?;
    surface.make_image(
        fixed_alpha(raster.alpha_info()),
        width as usize * 4,
        raster.scale(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::AlphaInfo;
    use imageproc::image::{Rgba, RgbaImage};

    fn assert_close(actual: [u8; 4], expected: [u8; 4]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((*a as i32 - e as i32).abs() <= 1, "{actual:?} != {expected:?}");
        }
    }

    fn solid(width: u32, height: u32) -> RasterBuffer {
        RasterBuffer::from_rgba8(
            RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255])),
            1.0,
        )
    }

    #[test]
    fn fit_stays_inside_bounds() {
        let cases = [
            (Size::new(400.0, 200.0), Size::new(100.0, 100.0)),
            (Size::new(200.0, 400.0), Size::new(100.0, 100.0)),
            (Size::new(1920.0, 1080.0), Size::new(333.0, 187.0)),
            (Size::new(3.0, 7.0), Size::new(50.0, 10.0)),
            (Size::new(100.0, 100.0), Size::new(37.0, 91.0)),
        ];

        for (size, bounds) in cases {
            let fit = constrain_to_fit(size, bounds);
            assert!(fit.width <= bounds.width, "{size} in {bounds} -> {fit}");
            assert!(fit.height <= bounds.height, "{size} in {bounds} -> {fit}");
            // one side matches the bounds, the other keeps the aspect ratio
            assert!(fit.width == bounds.width || fit.height == bounds.height);
            let expected = size.aspect_ratio();
            let tolerance = 1.0 / fit.height.min(fit.width).max(1.0) * expected.max(1.0);
            assert!((fit.aspect_ratio() - expected).abs() <= tolerance + 1e-9);
        }
    }

    #[test]
    fn fit_examples() {
        let fit = constrain_to_fit(Size::new(400.0, 200.0), Size::new(100.0, 100.0));
        assert_eq!(fit, Size::new(100.0, 50.0));
        let fit = constrain_to_fit(Size::new(200.0, 400.0), Size::new(100.0, 100.0));
        assert_eq!(fit, Size::new(50.0, 100.0));
    }

    #[test]
    fn fill_covers_bounds() {
        let fill = constrain_to_fill(Size::new(400.0, 200.0), Size::new(100.0, 100.0));
        assert_eq!(fill, Size::new(200.0, 100.0));
        let fill = constrain_to_fill(Size::new(200.0, 400.0), Size::new(100.0, 100.0));
        assert_eq!(fill, Size::new(100.0, 200.0));
    }

    #[test]
    fn zero_height_uses_unit_aspect() {
        let fit = constrain_to_fit(Size::new(10.0, 0.0), Size::new(30.0, 20.0));
        assert_eq!(fit, Size::new(20.0, 20.0));
    }

    #[test]
    fn content_mode_parses_lowercase() {
        assert_eq!("fill".parse::<ContentMode>().unwrap(), ContentMode::Fill);
        assert_eq!(ContentMode::Stretch.to_string(), "stretch");
        assert_eq!(
            ContentMode::Stretch.target_size(Size::new(1.0, 1.0), Size::new(5.0, 9.0)),
            Size::new(5.0, 9.0)
        );
    }

    #[test]
    fn resize_shrinks_and_keeps_stride() {
        let src = solid(8, 6);
        let out = resize(&src, Size::new(4.0, 3.0)).unwrap();

        assert_eq!(out.dimensions(), (4, 3));
        assert_eq!(out.bytes_per_row(), src.bytes_per_row());
        assert_eq!(out.alpha_info(), AlphaInfo::PremultipliedFirst);
        assert_close(out.pixel(1, 1), [200, 100, 50, 255]);
    }

    #[test]
    fn resize_rejects_growth_and_empty_targets() {
        let src = solid(8, 6);
        for target in [
            Size::new(9.0, 6.0),
            Size::new(8.0, 7.0),
            Size::new(0.0, 3.0),
            Size::new(4.0, -1.0),
            Size::new(0.5, 0.5),
        ] {
            assert!(
                matches!(resize(&src, target), Err(Error::InvalidGeometry { .. })),
                "{target}"
            );
        }
    }

    #[test]
    fn resize_to_same_size_is_allowed() {
        let src = solid(5, 5);
        assert_eq!(resize(&src, src.size()).unwrap().dimensions(), (5, 5));
    }

    #[test]
    fn round_corners_clears_corners() {
        let out = round_corners(&solid(10, 10), 4.0, Size::new(20.0, 20.0));
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.pixel(0, 0)[3], 0);
        assert_close(out.pixel(10, 10), [200, 100, 50, 255]);
    }

    #[test]
    fn round_corners_into_nothing_returns_input() {
        let src = solid(3, 3);
        assert_eq!(round_corners(&src, 4.0, Size::new(0.0, 10.0)), src);
    }
}
