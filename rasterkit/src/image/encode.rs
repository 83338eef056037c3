//! Image encoding: PNG, JPEG and animated GIF

use std::borrow::Cow;

use gif::{DisposalMethod, Repeat};
use imageproc::image::{ColorType, DynamicImage, GenericImageView};

use super::animated::FrameSet;
use crate::error::{Error, Result};

// NeuQuant sampling speed for GIF palette generation, 1 (best) to 30 (fastest)
const GIF_QUANTIZE_SPEED: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

/// Compress an image to JPEG format with the specified quality
pub fn compress_to_jpeg<W>(img: &DynamicImage, writer: &mut W, quality: u8) -> Result<()>
where
    W: std::io::Write,
{
    use imageproc::image::ImageEncoder;

    let encoder = imageproc::image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality);

    // JPEG carries no alpha channel
    let img = match img.color() {
        ColorType::L8 | ColorType::Rgb8 => Cow::Borrowed(img),
        _ => Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8())),
    };

    let (width, height) = img.dimensions();
    encoder
        .write_image(img.as_bytes(), width, height, img.color().into())
        .map_err(|e| Error::Encode(format!("Failed to compress image to JPEG: {e}")))
}

/// Compress an image to PNG format with the specified compression level
pub fn compress_to_png<W>(
    img: &DynamicImage,
    writer: &mut W,
    compression: PngCompression,
) -> Result<()>
where
    W: std::io::Write,
{
    use imageproc::image::codecs::png::{CompressionType, FilterType, PngEncoder};
    use imageproc::image::ImageEncoder;

    let compression_type = match compression {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    };

    let is_grayscale = img.color() == ColorType::L8 || img.color() == ColorType::La8;

    let encoder = PngEncoder::new_with_quality(
        writer,
        compression_type,
        if is_grayscale {
            FilterType::NoFilter
        } else {
            FilterType::Adaptive
        },
    );

    let (width, height) = img.dimensions();
    encoder
        .write_image(img.as_bytes(), width, height, img.color().into())
        .map_err(|e| Error::Encode(format!("Failed to compress image to PNG: {e}")))
}

/// Serialize `frames` as an animated GIF.
///
/// Every frame gets the same delay: `duration / frame_count` when `duration`
/// is positive, otherwise the set's own total divided evenly. Variable
/// per-frame timing is not written back. `loop_count` 0 loops forever.
pub fn encode_gif(frames: &FrameSet, loop_count: u16, duration: Option<f64>) -> Result<Vec<u8>> {
    if frames.is_empty() {
        return Err(Error::Encode("No frames to encode".to_string()));
    }

    let frame_count = frames.len() as f64;
    let frame_duration = match duration {
        Some(duration) if duration > 0.0 => duration / frame_count,
        _ => frames.duration() / frame_count,
    };
    let delay = centiseconds(frame_duration);

    let (width, height) = frames
        .frames()
        .iter()
        .fold((0, 0), |(w, h), f| (w.max(f.width()), h.max(f.height())));
    let (width, height) = gif_dimensions(width, height)?;

    log::debug!(
        "Encoding {} frames as {width}x{height} GIF, delay {delay}cs, loop count {loop_count}",
        frames.len()
    );

    let mut encoder = gif::Encoder::new(Vec::new(), width, height, &[])?;

    // the looping extension has to precede the first image
    let repeat = match loop_count {
        0 => Repeat::Infinite,
        n => Repeat::Finite(n),
    };
    encoder.set_repeat(repeat)?;

    for (i, raster) in frames.frames().iter().enumerate() {
        let (frame_width, frame_height) = gif_dimensions(raster.width(), raster.height())?;
        let mut rgba = raster.to_rgba_image().into_raw();

        let mut frame =
            gif::Frame::from_rgba_speed(frame_width, frame_height, &mut rgba, GIF_QUANTIZE_SPEED);
        frame.delay = delay;
        frame.dispose = DisposalMethod::Background;

        encoder.write_frame(&frame)?;
        log::trace!("Wrote GIF frame {i}");
    }

    encoder
        .into_inner()
        .map_err(|e| Error::Encode(format!("Failed to finalize GIF: {e}")))
}

/// Seconds to GIF centiseconds. Non-finite durations (a still image's
/// infinite display time) are written as no delay.
fn centiseconds(seconds: f64) -> u16 {
    if !seconds.is_finite() {
        return 0;
    }
    (seconds * 100.0).round().clamp(0.0, u16::MAX as f64) as u16
}

fn gif_dimensions(width: u32, height: u32) -> Result<(u16, u16)> {
    match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(Error::Encode(format!(
            "{width}x{height} is outside GIF limits (1-65535 per side)"
        ))),
    }
}
