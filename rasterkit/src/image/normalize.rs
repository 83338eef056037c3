//! Canonicalization of decoded rasters into the 32-bit, 8-bit-per-component
//! layout every transform works on.

use std::borrow::Cow;

use imageproc::image::DynamicImage;

use crate::error::Result;
use crate::raster::{AlphaInfo, RasterBuffer, BYTES_PER_PIXEL};
use crate::surface::{BlendMode, Surface};

/// Bit layout a codec reported for a decoded raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_component: u32,
    pub bits_per_pixel: u32,
    pub alpha: AlphaInfo,
}

impl PixelFormat {
    pub fn of(image: &DynamicImage) -> Self {
        let color = image.color();
        let channels = color.channel_count() as u32;
        let bits_per_pixel = color.bits_per_pixel() as u32;

        let alpha = if color.has_alpha() {
            AlphaInfo::Last
        } else {
            AlphaInfo::None
        };

        Self {
            bits_per_component: bits_per_pixel / channels.max(1),
            bits_per_pixel,
            alpha,
        }
    }

    /// 32-bit pixels, 8-bit components and a real alpha position
    pub fn is_argb8888(&self) -> bool {
        self.bits_per_pixel == 32 && self.bits_per_component == 8 && self.alpha != AlphaInfo::None
    }
}

/// Layout a redraw targets for a source with `alpha`.
///
/// Opaque sources become none-skip-first. The second test holds for every
/// value, so all alpha-bearing layouts, including already premultiplied and
/// skip layouts, come out premultiplied-first.
pub fn fixed_alpha(alpha: AlphaInfo) -> AlphaInfo {
    if alpha == AlphaInfo::None {
        AlphaInfo::NoneSkipFirst
    } else if alpha != AlphaInfo::NoneSkipFirst || alpha != AlphaInfo::NoneSkipLast {
        AlphaInfo::PremultipliedFirst
    } else {
        alpha
    }
}

/// Bring a codec raster into canonical layout.
///
/// Straight RGBA8 is adopted without copying; every other layout is redrawn
/// into the fixed layout for its alpha.
pub fn normalize(image: DynamicImage, scale: f32) -> Result<RasterBuffer> {
    let format = PixelFormat::of(&image);

    let image = match image {
        DynamicImage::ImageRgba8(rgba) if format.is_argb8888() => {
            return Ok(RasterBuffer::from_rgba8(rgba, scale));
        }
        other => other,
    };

    let target = fixed_alpha(format.alpha);
    log::trace!(
        "Redrawing {:?} ({} bpc, {} bpp) as {target:?}",
        image.color(),
        format.bits_per_component,
        format.bits_per_pixel
    );

    let straight = RasterBuffer::from_rgba8(image.into_rgba8(), scale);
    let row_bytes = straight.width() as usize * BYTES_PER_PIXEL;
    redraw(&straight, target, row_bytes)
}

/// Draw `raster` into a fresh surface and store it in `alpha` layout
pub fn redraw(raster: &RasterBuffer, alpha: AlphaInfo, bytes_per_row: usize) -> Result<RasterBuffer> {
    let mut surface = Surface::new(raster.width(), raster.height())?;
    surface.draw(raster, BlendMode::Copy, 1.0)?;
    surface.make_image(alpha, bytes_per_row, raster.scale())
}

/// A raster usable by pixel-level filters: already 32-bit ARGB8888 buffers
/// pass through, anything else is redrawn.
pub fn fixed(raster: &RasterBuffer) -> Result<Cow<'_, RasterBuffer>> {
    let format = PixelFormat {
        bits_per_component: raster.bits_per_component(),
        bits_per_pixel: raster.bits_per_pixel(),
        alpha: raster.alpha_info(),
    };

    if format.is_argb8888() {
        return Ok(Cow::Borrowed(raster));
    }

    redraw(raster, fixed_alpha(raster.alpha_info()), raster.bytes_per_row()).map(Cow::Owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn opaque_layouts_become_skip_first() {
        assert_eq!(fixed_alpha(AlphaInfo::None), AlphaInfo::NoneSkipFirst);
    }

    #[test]
    fn every_alpha_layout_becomes_premultiplied_first() {
        for alpha in [
            AlphaInfo::PremultipliedLast,
            AlphaInfo::PremultipliedFirst,
            AlphaInfo::Last,
            AlphaInfo::First,
            AlphaInfo::NoneSkipLast,
            AlphaInfo::NoneSkipFirst,
        ] {
            assert_eq!(fixed_alpha(alpha), AlphaInfo::PremultipliedFirst);
        }
    }

    #[test]
    fn rgba8_is_adopted_without_redraw() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 40]));

        let buf = normalize(DynamicImage::ImageRgba8(img.clone()), 1.0).unwrap();
        assert_eq!(buf.alpha_info(), AlphaInfo::Last);
        assert_eq!(buf.data(), img.as_raw().as_slice());
    }

    #[test]
    fn rgb_is_redrawn_as_skip_first() {
        let img = RgbImage::from_pixel(3, 1, Rgb([1, 2, 3]));
        let buf = normalize(DynamicImage::ImageRgb8(img), 2.0).unwrap();

        assert_eq!(buf.alpha_info(), AlphaInfo::NoneSkipFirst);
        assert_eq!(buf.bytes_per_row(), 12);
        assert_eq!(buf.scale(), 2.0);
        assert_eq!(&buf.data()[0..4], &[255, 1, 2, 3]);
    }

    #[test]
    fn gray_is_expanded() {
        let img = GrayImage::from_pixel(1, 1, Luma([77]));
        let format = PixelFormat::of(&DynamicImage::ImageLuma8(img.clone()));
        assert_eq!(format.bits_per_pixel, 8);
        assert!(!format.is_argb8888());

        let buf = normalize(DynamicImage::ImageLuma8(img), 1.0).unwrap();
        assert_eq!(buf.pixel(0, 0), [77, 77, 77, 255]);
    }

    #[test]
    fn sixteen_bit_alpha_is_premultiplied_first() {
        let img = DynamicImage::ImageRgba16(imageproc::image::ImageBuffer::from_pixel(
            1,
            1,
            Rgba([65535u16, 0, 0, 32896]),
        ));
        let format = PixelFormat::of(&img);
        assert_eq!(format.bits_per_component, 16);

        let buf = normalize(img, 1.0).unwrap();
        assert_eq!(buf.alpha_info(), AlphaInfo::PremultipliedFirst);
        assert_eq!(&buf.data()[0..4], &[128, 128, 0, 0]);
    }

    #[test]
    fn canonical_raster_passes_through_fixed() {
        let buf = RasterBuffer::from_rgba8(RgbaImage::new(2, 2), 1.0);
        assert!(matches!(fixed(&buf).unwrap(), Cow::Borrowed(_)));
    }
}
