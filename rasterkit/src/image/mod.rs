//! Decoding, transforming and re-encoding still and animated images

pub mod animated;
pub mod blur;
pub mod codec;
pub mod color;
pub mod encode;
pub mod normalize;
pub mod timing;
pub mod transform;

use std::sync::Arc;

use imageproc::image::DynamicImage;
use rayon::prelude::*;

pub use animated::{AnimationSource, AnimationState, FrameSet};
pub use encode::{compress_to_jpeg, compress_to_png, encode_gif, PngCompression};
pub use transform::ContentMode;

use crate::config::OutputFormat;
use crate::error::Result;
use crate::format::ImageFormat;
use crate::raster::{RasterBuffer, Size, BYTES_PER_PIXEL};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Display scale attached to every decoded raster
    pub scale: f32,
    /// Total animation duration in seconds; 0 keeps the container's timing
    pub duration: f64,
    /// Decode every frame up front instead of keeping a lazy source
    pub preload_all_frames: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            duration: 0.0,
            preload_all_frames: true,
        }
    }
}

/// A decoded image and, for animated sources, its frames.
///
/// `raster` is the representative still: the image itself, or the first
/// frame of an animation.
#[derive(Debug)]
pub struct Image {
    raster: RasterBuffer,
    format: ImageFormat,
    animation: AnimationState,
    data: Option<Arc<[u8]>>,
}

impl Image {
    /// Sniff and decode encoded bytes
    pub fn from_data(data: Vec<u8>, options: &DecodeOptions) -> Result<Self> {
        let format = ImageFormat::classify(&data);
        log::debug!("Decoding {} bytes as {format}", data.len());

        if format.is_animated_container() {
            return Self::from_animated(data.into(), options);
        }

        let raw = codec::decode_single_frame(&data, format)?;
        let raster = normalize::normalize(raw, options.scale)?;
        Ok(Self {
            raster,
            format,
            animation: AnimationState::None,
            data: None,
        })
    }

    fn from_animated(data: Arc<[u8]>, options: &DecodeOptions) -> Result<Self> {
        let mut animation = animated::decode_animated(Arc::clone(&data), options)?;

        let raster = match &mut animation {
            AnimationState::Materialized(frames) => frames.first().cloned(),
            AnimationState::Lazy(source) => Some(source.decode_frame(0)?),
            AnimationState::None => None,
        }
        .ok_or_else(|| crate::Error::Decode("animated source has no frames".to_string()))?;

        Ok(Self {
            raster,
            format: ImageFormat::Gif,
            animation,
            data: Some(data),
        })
    }

    /// Wrap an already decoded still
    pub fn from_raster(raster: RasterBuffer) -> Self {
        Self {
            raster,
            format: ImageFormat::Unknown,
            animation: AnimationState::None,
            data: None,
        }
    }

    /// Wrap decoded frames. Returns `None` for an empty set.
    pub fn from_frames(frames: FrameSet) -> Option<Self> {
        let raster = frames.first()?.clone();
        Some(Self {
            raster,
            format: ImageFormat::Unknown,
            animation: AnimationState::Materialized(frames),
            data: None,
        })
    }

    pub fn raster(&self) -> &RasterBuffer {
        &self.raster
    }

    /// Format the image was decoded from
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn animation(&self) -> &AnimationState {
        &self.animation
    }

    /// Original encoded bytes of an animated source, while unmodified
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn size(&self) -> Size {
        self.raster.size()
    }

    pub fn scale(&self) -> f32 {
        self.raster.scale()
    }

    pub fn is_animated(&self) -> bool {
        self.animation.is_animated()
    }

    pub fn frame_count(&self) -> usize {
        self.animation.frame_count()
    }

    /// Total animation duration in seconds, 0 for a still image
    pub fn duration(&self) -> f64 {
        self.animation.duration()
    }

    pub fn loop_count(&self) -> u16 {
        match &self.animation {
            AnimationState::None => 0,
            AnimationState::Materialized(frames) => frames.loop_count(),
            AnimationState::Lazy(source) => source.loop_count(),
        }
    }

    /// Decoded frames, if any have been materialized
    pub fn frames(&self) -> Option<&FrameSet> {
        match &self.animation {
            AnimationState::Materialized(frames) => Some(frames),
            _ => None,
        }
    }

    /// Decode every frame of a lazy source now. A no-op otherwise.
    pub fn materialize(&mut self) -> Result<()> {
        if let AnimationState::Lazy(source) = &mut self.animation {
            let frames = source.materialize()?;
            self.animation = AnimationState::Materialized(frames);
        }
        Ok(())
    }

    /// Force the still into the fixed layout at `scale`.
    ///
    /// Animated images are returned as they are so no frames are dropped.
    pub fn decoded(self, scale: f32) -> Result<Self> {
        if self.is_animated() {
            return Ok(self);
        }

        let alpha = normalize::fixed_alpha(self.raster.alpha_info());
        let row_bytes = self.raster.width() as usize * BYTES_PER_PIXEL;
        let raster = normalize::redraw(&self.raster, alpha, row_bytes)?.with_scale(scale);
        Ok(Self { raster, ..self })
    }

    /// Apply `f` to the still, or to every frame of an animation in
    /// parallel. Lazy sources are decoded first. Frame timing is kept; the
    /// original encoded bytes are dropped since they no longer match.
    pub fn map_frames<F>(mut self, f: F) -> Result<Self>
    where
        F: Fn(&RasterBuffer) -> Result<RasterBuffer> + Sync,
    {
        self.materialize()?;

        match self.animation {
            AnimationState::Materialized(frames) => {
                let mapped = frames
                    .frames()
                    .par_iter()
                    .map(&f)
                    .collect::<Result<Vec<_>>>()?;
                let frames = frames.replace_frames(mapped);
                let raster = frames.first().cloned().unwrap_or(self.raster);

                Ok(Self {
                    raster,
                    format: self.format,
                    animation: AnimationState::Materialized(frames),
                    data: None,
                })
            }
            _ => Ok(Self {
                raster: f(&self.raster)?,
                format: self.format,
                animation: AnimationState::None,
                data: None,
            }),
        }
    }

    pub fn png_representation(&self, compression: PngCompression) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        compress_to_png(&self.dynamic_image(), &mut out, compression)?;
        Ok(out)
    }

    pub fn jpeg_representation(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        compress_to_jpeg(&self.dynamic_image(), &mut out, quality)?;
        Ok(out)
    }

    /// GIF bytes for this image. The original bytes come back untouched when
    /// the image was decoded from a GIF and not modified since.
    pub fn gif_representation(&self) -> Result<Vec<u8>> {
        match &self.data {
            Some(data) if self.format == ImageFormat::Gif => Ok(data.to_vec()),
            _ => self.gif_representation_with(None, 0),
        }
    }

    /// Encode the frames as a GIF. A positive `duration` replaces the total
    /// animation duration; `loop_count` 0 loops forever.
    pub fn gif_representation_with(&self, duration: Option<f64>, loop_count: u16) -> Result<Vec<u8>> {
        match &self.animation {
            AnimationState::Materialized(frames) => encode_gif(frames, loop_count, duration),
            AnimationState::Lazy(source) => {
                let mut reader = AnimationSource::new(Arc::clone(source.shared_data()), self.scale())?;
                encode_gif(&reader.materialize()?, loop_count, duration)
            }
            AnimationState::None => {
                let still = FrameSet::new([(self.raster.clone(), f64::INFINITY)]);
                encode_gif(&still, loop_count, duration)
            }
        }
    }

    pub fn encode(&self, output: &OutputFormat) -> Result<Vec<u8>> {
        match *output {
            OutputFormat::Png { compression } => self.png_representation(compression),
            OutputFormat::Jpeg { quality } => self.jpeg_representation(quality),
            OutputFormat::Gif {
                loop_count,
                duration,
            } => match duration {
                Some(duration) => self.gif_representation_with(Some(duration), loop_count),
                None if loop_count == self.loop_count() => self.gif_representation(),
                None => self.gif_representation_with(None, loop_count),
            },
        }
    }

    fn dynamic_image(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.raster.to_rgba_image())
    }
}
