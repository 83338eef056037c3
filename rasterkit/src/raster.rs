//! Canonical decoded pixel storage

use std::fmt;

use imageproc::image::RgbaImage;

use crate::error::{Error, Result};

pub const BITS_PER_COMPONENT: u32 = 8;
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// `width / height`, or 1.0 for a zero height
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0.0 {
            1.0
        } else {
            self.width / self.height
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Straight-alpha color with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(red: f32, green: f32, blue: f32) -> Self {
        Self::rgba(red, green, blue, 1.0)
    }

    pub const fn rgba(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Premultiplied components in `0.0..=1.0`
    pub(crate) fn premultiplied(&self) -> [f32; 4] {
        let a = self.alpha.clamp(0.0, 1.0);
        [
            self.red.clamp(0.0, 1.0) * a,
            self.green.clamp(0.0, 1.0) * a,
            self.blue.clamp(0.0, 1.0) * a,
            a,
        ]
    }
}

#[derive(Debug)]
pub struct ParseColorError(String);

impl fmt::Display for ParseColorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Invalid hex color: ")?;
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseColorError {}

impl std::str::FromStr for Color {
    type Err = ParseColorError;

    /// Parses `#RRGGBB` or `#RRGGBBAA`, the leading `#` being optional
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(ParseColorError(s.to_string()));
        }

        let mut channels = [255u8; 4];
        for (i, channel) in channels.iter_mut().enumerate().take(hex.len() / 2) {
            *channel = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseColorError(s.to_string()))?;
        }

        let [r, g, b, a] = channels.map(|c| c as f32 / 255.0);
        Ok(Color::rgba(r, g, b, a))
    }
}

/// Where the alpha channel sits in a 32-bit pixel and whether color is
/// premultiplied by it. Color components are always in R, G, B order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaInfo {
    /// No alpha channel at all (packed RGB, never a 32-bit layout)
    None,
    PremultipliedLast,
    PremultipliedFirst,
    Last,
    First,
    NoneSkipLast,
    NoneSkipFirst,
}

impl AlphaInfo {
    pub fn is_premultiplied(self) -> bool {
        matches!(self, AlphaInfo::PremultipliedFirst | AlphaInfo::PremultipliedLast)
    }

    pub fn is_opaque(self) -> bool {
        matches!(
            self,
            AlphaInfo::None | AlphaInfo::NoneSkipFirst | AlphaInfo::NoneSkipLast
        )
    }

    /// Read one stored pixel as premultiplied RGBA
    #[inline]
    pub(crate) fn decode(self, px: [u8; 4]) -> [u8; 4] {
        match self {
            AlphaInfo::PremultipliedFirst => [px[1], px[2], px[3], px[0]],
            AlphaInfo::PremultipliedLast => px,
            AlphaInfo::First => premultiply([px[1], px[2], px[3], px[0]]),
            AlphaInfo::Last => premultiply(px),
            AlphaInfo::NoneSkipFirst => [px[1], px[2], px[3], 255],
            AlphaInfo::NoneSkipLast | AlphaInfo::None => [px[0], px[1], px[2], 255],
        }
    }

    /// Store one premultiplied RGBA pixel in this layout
    #[inline]
    pub(crate) fn encode(self, rgba: [u8; 4]) -> [u8; 4] {
        let [r, g, b, a] = rgba;
        match self {
            AlphaInfo::PremultipliedFirst => [a, r, g, b],
            AlphaInfo::PremultipliedLast => rgba,
            AlphaInfo::First => {
                let [r, g, b, a] = unpremultiply(rgba);
                [a, r, g, b]
            }
            AlphaInfo::Last => unpremultiply(rgba),
            // opaque targets keep the color as composited over black
            AlphaInfo::NoneSkipFirst => [255, r, g, b],
            AlphaInfo::NoneSkipLast | AlphaInfo::None => [r, g, b, 255],
        }
    }
}

#[inline]
pub(crate) fn premultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let mul = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
    [mul(r), mul(g), mul(b), a]
}

#[inline]
pub(crate) fn unpremultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    if a == 0 {
        return [0, 0, 0, 0];
    }
    let div = |c: u8| ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8;
    [div(r), div(g), div(b), a]
}

/// Allocate a zeroed pixel buffer, reporting allocation failure instead of aborting
pub(crate) fn alloc_pixels(len: usize, width: u32, height: u32) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| Error::ResourceExhausted { width, height })?;
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Decoded image in a 32-bit, 8-bit-per-component layout.
///
/// A buffer is never mutated once built; every transform produces a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    bytes_per_row: usize,
    alpha: AlphaInfo,
    data: Vec<u8>,
    scale: f32,
}

impl RasterBuffer {
    pub(crate) fn from_parts(
        width: u32,
        height: u32,
        bytes_per_row: usize,
        alpha: AlphaInfo,
        data: Vec<u8>,
        scale: f32,
    ) -> Self {
        debug_assert!(bytes_per_row >= width as usize * BYTES_PER_PIXEL);
        debug_assert!(data.len() >= bytes_per_row * height as usize);
        debug_assert!(alpha != AlphaInfo::None);
        Self {
            width,
            height,
            bytes_per_row,
            alpha,
            data,
            scale,
        }
    }

    /// Wrap straight-alpha RGBA pixels without copying
    pub fn from_rgba8(img: RgbaImage, scale: f32) -> Self {
        let (width, height) = img.dimensions();
        Self::from_parts(
            width,
            height,
            width as usize * BYTES_PER_PIXEL,
            AlphaInfo::Last,
            img.into_raw(),
            scale,
        )
    }

    /// Build a buffer from tightly packed premultiplied RGBA, stored in `alpha`
    /// layout with `bytes_per_row` stride.
    pub(crate) fn from_premultiplied_rgba(
        width: u32,
        height: u32,
        rgba: &[u8],
        alpha: AlphaInfo,
        bytes_per_row: usize,
        scale: f32,
    ) -> Result<Self> {
        let row_len = width as usize * BYTES_PER_PIXEL;
        let bytes_per_row = bytes_per_row.max(row_len);
        let mut data = alloc_pixels(bytes_per_row * height as usize, width, height)?;

        if row_len > 0 {
            for (dst_row, src_row) in data
                .chunks_exact_mut(bytes_per_row)
                .zip(rgba.chunks_exact(row_len))
            {
                for (dst, src) in dst_row[..row_len]
                    .chunks_exact_mut(BYTES_PER_PIXEL)
                    .zip(src_row.chunks_exact(BYTES_PER_PIXEL))
                {
                    dst.copy_from_slice(&alpha.encode([src[0], src[1], src[2], src[3]]));
                }
            }
        }

        Ok(Self::from_parts(width, height, bytes_per_row, alpha, data, scale))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixel size as a floating point `Size`
    pub fn size(&self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }

    /// Size in display points, pixels divided by the scale factor
    pub fn point_size(&self) -> Size {
        let scale = if self.scale > 0.0 { self.scale as f64 } else { 1.0 };
        Size::new(self.width as f64 / scale, self.height as f64 / scale)
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn bits_per_component(&self) -> u32 {
        BITS_PER_COMPONENT
    }

    pub fn bits_per_pixel(&self) -> u32 {
        BITS_PER_COMPONENT * BYTES_PER_PIXEL as u32
    }

    pub fn alpha_info(&self) -> AlphaInfo {
        self.alpha
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub(crate) fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Rows of pixel bytes, excluding stride padding
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let row_len = self.width as usize * BYTES_PER_PIXEL;
        self.data
            .chunks(self.bytes_per_row.max(1))
            .take(self.height as usize)
            .map(move |row| &row[..row_len])
    }

    /// Premultiplied RGBA value of one pixel
    ///
    /// # Panics
    ///
    /// Panics if `x` or `y` lies outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} buffer",
            self.width,
            self.height
        );
        let i = y as usize * self.bytes_per_row + x as usize * BYTES_PER_PIXEL;
        let px = &self.data[i..i + BYTES_PER_PIXEL];
        self.alpha.decode([px[0], px[1], px[2], px[3]])
    }

    /// Tightly packed premultiplied RGBA copy of the pixels
    pub fn to_premultiplied_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for row in self.rows() {
            for px in row.chunks_exact(BYTES_PER_PIXEL) {
                out.extend_from_slice(&self.alpha.decode([px[0], px[1], px[2], px[3]]));
            }
        }
        out
    }

    /// Straight-alpha RGBA image, the layout encoders expect
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut rgba = self.to_premultiplied_rgba();
        if !self.alpha.is_opaque() {
            for px in rgba.chunks_exact_mut(BYTES_PER_PIXEL) {
                let straight = unpremultiply([px[0], px[1], px[2], px[3]]);
                px.copy_from_slice(&straight);
            }
        }
        RgbaImage::from_raw(self.width, self.height, rgba)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::image::Rgba;

    #[test]
    fn parse_hex_colors() {
        let c: Color = "#FF000080".parse().unwrap();
        assert_eq!(c.red, 1.0);
        assert_eq!(c.green, 0.0);
        assert!((c.alpha - 128.0 / 255.0).abs() < 1e-6);

        let opaque: Color = "00ff00".parse().unwrap();
        assert_eq!(opaque, Color::rgb(0.0, 1.0, 0.0));

        assert!("#12345".parse::<Color>().is_err());
        assert!("#GG0000".parse::<Color>().is_err());
    }

    #[test]
    fn aspect_ratio_of_zero_height_is_one() {
        assert_eq!(Size::new(10.0, 0.0).aspect_ratio(), 1.0);
        assert_eq!(Size::new(10.0, 5.0).aspect_ratio(), 2.0);
    }

    #[test]
    fn layouts_store_channels_in_place() {
        let rgba = [200, 100, 50, 255];
        assert_eq!(AlphaInfo::PremultipliedFirst.encode(rgba), [255, 200, 100, 50]);
        assert_eq!(AlphaInfo::NoneSkipFirst.encode(rgba), [255, 200, 100, 50]);
        assert_eq!(AlphaInfo::PremultipliedLast.encode(rgba), rgba);
        assert_eq!(AlphaInfo::PremultipliedFirst.decode([255, 200, 100, 50]), rgba);
    }

    #[test]
    fn straight_alpha_is_premultiplied_on_read() {
        let px = AlphaInfo::Last.decode([255, 0, 0, 128]);
        assert_eq!(px, [128, 0, 0, 128]);
        assert_eq!(unpremultiply(px), [255, 0, 0, 128]);
        assert_eq!(unpremultiply([0, 0, 0, 0]), [0, 0, 0, 0]);
    }

    #[test]
    fn stride_padding_is_skipped() {
        let rgba = [10, 20, 30, 255, 40, 50, 60, 255];
        let buf =
            RasterBuffer::from_premultiplied_rgba(1, 2, &rgba, AlphaInfo::PremultipliedFirst, 16, 1.0)
                .unwrap();
        assert_eq!(buf.bytes_per_row(), 16);
        assert_eq!(buf.data().len(), 32);
        assert_eq!(buf.pixel(0, 1), [40, 50, 60, 255]);
        assert_eq!(buf.to_premultiplied_rgba(), rgba.to_vec());
    }

    #[test]
    #[should_panic(expected = "outside 1x2 buffer")]
    fn pixel_in_stride_padding_panics() {
        // x = 1 still indexes inside the padded row
        let buf = RasterBuffer::from_premultiplied_rgba(
            1,
            2,
            &[0; 8],
            AlphaInfo::PremultipliedFirst,
            16,
            1.0,
        )
        .unwrap();
        buf.pixel(1, 0);
    }

    #[test]
    fn rgba_image_round_trips_through_buffer() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([255, 128, 0, 255]));
        let buf = RasterBuffer::from_rgba8(img.clone(), 2.0);
        assert_eq!(buf.point_size(), Size::new(1.5, 1.0));
        assert_eq!(buf.to_rgba_image(), img);
    }
}
