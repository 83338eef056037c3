//! Multi-frame decoding: eager frame sets and lazy per-index sources

use std::fmt;
use std::sync::Arc;

use super::codec::{FrameDecoder, GifDecoder};
use super::normalize::normalize;
use super::timing::duration_for;
use super::DecodeOptions;
use crate::error::{Error, Result};
use crate::raster::RasterBuffer;

/// Decoded frames with their display durations in seconds.
///
/// `frames` and `durations` always have the same length. The total is the
/// sum of the per-frame durations, or infinite for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSet {
    frames: Vec<RasterBuffer>,
    durations: Vec<f64>,
    duration: f64,
    loop_count: u16,
}

impl FrameSet {
    pub fn new(frames: impl IntoIterator<Item = (RasterBuffer, f64)>) -> Self {
        let (frames, durations): (Vec<_>, Vec<_>) = frames.into_iter().unzip();
        let duration = total_duration(&durations);
        Self {
            frames,
            durations,
            duration,
            loop_count: 0,
        }
    }

    /// Frames sharing `duration` evenly
    pub fn uniform(frames: Vec<RasterBuffer>, duration: f64) -> Self {
        let each = duration / frames.len().max(1) as f64;
        let durations = vec![each; frames.len()];
        Self {
            frames,
            durations,
            duration,
            loop_count: 0,
        }
    }

    pub fn with_loop_count(mut self, loop_count: u16) -> Self {
        self.loop_count = loop_count;
        self
    }

    /// Replace the total duration, spreading it evenly over the frames
    pub fn with_duration(self, duration: f64) -> Self {
        let loop_count = self.loop_count;
        Self::uniform(self.frames, duration).with_loop_count(loop_count)
    }

    pub fn frames(&self) -> &[RasterBuffer] {
        &self.frames
    }

    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn loop_count(&self) -> u16 {
        self.loop_count
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first(&self) -> Option<&RasterBuffer> {
        self.frames.first()
    }

    /// Swap in new frames of the same count, keeping timing
    pub(crate) fn replace_frames(self, frames: Vec<RasterBuffer>) -> Self {
        debug_assert_eq!(frames.len(), self.durations.len());
        Self { frames, ..self }
    }
}

fn total_duration(durations: &[f64]) -> f64 {
    if durations.len() == 1 {
        f64::INFINITY
    } else {
        durations.iter().sum()
    }
}

/// Decode every frame of `source`, all or nothing.
///
/// Any frame failing to decode, or lacking timing metadata in a multi-frame
/// source, fails the whole decode.
pub fn decode(source: &mut dyn FrameDecoder, scale: f32) -> Result<FrameSet> {
    let frame_count = source.frame_count();
    if frame_count == 0 {
        return Err(Error::Decode("animated source has no frames".to_string()));
    }

    let mut frames = Vec::with_capacity(frame_count);
    for index in 0..frame_count {
        let raw = source.decode_frame(index)?;

        let duration = if frame_count == 1 {
            f64::INFINITY
        } else {
            let properties = source.frame_properties(index).ok_or_else(|| {
                Error::Decode(format!("frame {index} has no timing properties"))
            })?;
            duration_for(frame_count, &properties)
        };

        frames.push((normalize(raw, scale)?, duration));
    }

    let frames = FrameSet::new(frames).with_loop_count(source.loop_count());
    log::debug!(
        "Decoded {} frames, total duration {:.3}s",
        frames.len(),
        frames.duration()
    );
    Ok(frames)
}

/// Undecoded multi-frame container with frame access on demand.
///
/// Owned by one holder; `decode_frame` borrows it mutably so only one frame
/// decode runs at a time.
pub struct AnimationSource {
    data: Arc<[u8]>,
    decoder: Box<dyn FrameDecoder>,
    scale: f32,
}

impl AnimationSource {
    /// Wrap encoded GIF bytes
    pub fn new(data: impl Into<Arc<[u8]>>, scale: f32) -> Result<Self> {
        let data = data.into();
        let decoder = GifDecoder::new(Arc::clone(&data))?;
        Ok(Self::with_decoder(data, Box::new(decoder), scale))
    }

    pub fn with_decoder(data: Arc<[u8]>, decoder: Box<dyn FrameDecoder>, scale: f32) -> Self {
        Self {
            data,
            decoder,
            scale,
        }
    }

    pub(crate) fn shared_data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub fn frame_count(&self) -> usize {
        self.decoder.frame_count()
    }

    pub fn loop_count(&self) -> u16 {
        self.decoder.loop_count()
    }

    pub fn frame_duration(&self, index: usize) -> Option<f64> {
        let properties = self.decoder.frame_properties(index)?;
        Some(duration_for(self.frame_count(), &properties))
    }

    pub fn duration(&self) -> f64 {
        let durations: Vec<f64> = (0..self.frame_count())
            .map(|i| self.frame_duration(i).unwrap_or(0.0))
            .collect();
        total_duration(&durations)
    }

    pub fn decode_frame(&mut self, index: usize) -> Result<RasterBuffer> {
        let raw = self.decoder.decode_frame(index)?;
        normalize(raw, self.scale)
    }

    /// Decode every frame now
    pub fn materialize(&mut self) -> Result<FrameSet> {
        decode(self.decoder.as_mut(), self.scale)
    }
}

impl fmt::Debug for AnimationSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AnimationSource")
            .field("bytes", &self.data.len())
            .field("frames", &self.frame_count())
            .field("scale", &self.scale)
            .finish()
    }
}

/// Frame state of an image, chosen once at decode time
#[derive(Debug, Default)]
pub enum AnimationState {
    #[default]
    None,
    Materialized(FrameSet),
    Lazy(AnimationSource),
}

impl AnimationState {
    pub fn is_animated(&self) -> bool {
        !matches!(self, AnimationState::None)
    }

    pub fn frame_count(&self) -> usize {
        match self {
            AnimationState::None => 1,
            AnimationState::Materialized(frames) => frames.len(),
            AnimationState::Lazy(source) => source.frame_count(),
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            AnimationState::None => 0.0,
            AnimationState::Materialized(frames) => frames.duration(),
            AnimationState::Lazy(source) => source.duration(),
        }
    }
}

/// Decode an animated GIF per `options`: fully when preloading, otherwise
/// as a lazy source over the bytes.
pub fn decode_animated(data: Arc<[u8]>, options: &DecodeOptions) -> Result<AnimationState> {
    let mut source = AnimationSource::new(data, options.scale)?;

    if !options.preload_all_frames {
        log::debug!("Keeping {} frames for on-demand decode", source.frame_count());
        return Ok(AnimationState::Lazy(source));
    }

    let frames = source.materialize()?;
    let frames = if options.duration > 0.0 {
        frames.with_duration(options.duration)
    } else {
        frames
    };
    Ok(AnimationState::Materialized(frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::timing::FrameProperties;
    use imageproc::image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};

    struct MockDecoder {
        delays: Vec<Option<f64>>,
        fail_at: Option<usize>,
    }

    impl FrameDecoder for MockDecoder {
        fn frame_count(&self) -> usize {
            self.delays.len()
        }

        fn frame_properties(&self, index: usize) -> Option<FrameProperties> {
            self.delays.get(index).map(|delay| FrameProperties {
                unclamped_delay: None,
                delay: *delay,
            })
        }

        fn decode_frame(&mut self, index: usize) -> Result<DynamicImage> {
            if self.fail_at == Some(index) {
                return Err(Error::Decode(format!("corrupt frame {index}")));
            }
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                2,
                2,
                Rgb([index as u8, 0, 0]),
            )))
        }
    }

    fn mock(delays: &[f64]) -> MockDecoder {
        MockDecoder {
            delays: delays.iter().copied().map(Some).collect(),
            fail_at: None,
        }
    }

    #[test]
    fn sub_threshold_delay_is_replaced() {
        let mut source = mock(&[0.08, 0.005, 0.12, 0.10]);
        let frames = decode(&mut source, 1.0).unwrap();

        assert_eq!(frames.len(), 4);
        assert_eq!(frames.durations(), &[0.08, 0.10, 0.12, 0.10]);
        assert!((frames.duration() - 0.40).abs() < 1e-9);
        // frames are normalized on the way in
        assert_eq!(frames.frames()[2].pixel(0, 0), [2, 0, 0, 255]);
    }

    #[test]
    fn single_frame_is_infinite() {
        let mut source = mock(&[0.05]);
        let frames = decode(&mut source, 1.0).unwrap();
        assert_eq!(frames.durations(), &[f64::INFINITY]);
        assert_eq!(frames.duration(), f64::INFINITY);
    }

    #[test]
    fn one_bad_frame_fails_everything() {
        let mut source = MockDecoder {
            fail_at: Some(2),
            ..mock(&[0.1, 0.1, 0.1])
        };
        assert!(matches!(decode(&mut source, 1.0), Err(Error::Decode(_))));
    }

    /// Claims two frames but only carries metadata for the first
    struct ShortMetadata(MockDecoder);

    impl FrameDecoder for ShortMetadata {
        fn frame_count(&self) -> usize {
            2
        }

        fn frame_properties(&self, index: usize) -> Option<FrameProperties> {
            self.0.frame_properties(index)
        }

        fn decode_frame(&mut self, index: usize) -> Result<DynamicImage> {
            self.0.decode_frame(index)
        }
    }

    #[test]
    fn missing_frame_metadata_fails() {
        let mut source = ShortMetadata(mock(&[0.1]));
        assert!(matches!(decode(&mut source, 1.0), Err(Error::Decode(_))));
    }

    #[test]
    fn empty_source_fails() {
        assert!(decode(&mut mock(&[]), 1.0).is_err());
    }

    #[test]
    fn empty_delay_fields_use_default() {
        let mut source = MockDecoder {
            delays: vec![None, Some(0.2)],
            fail_at: None,
        };
        let frames = decode(&mut source, 1.0).unwrap();
        assert_eq!(frames.durations(), &[0.1, 0.2]);
    }

    #[test]
    fn duration_override_divides_evenly() {
        let frame = RasterBuffer::from_rgba8(RgbaImage::from_pixel(1, 1, Rgba([0; 4])), 1.0);
        let frames = FrameSet::new(vec![(frame.clone(), 0.1), (frame.clone(), 0.3)])
            .with_loop_count(2)
            .with_duration(1.0);
        assert_eq!(frames.durations(), &[0.5, 0.5]);
        assert_eq!(frames.duration(), 1.0);
        assert_eq!(frames.loop_count(), 2);
    }

    #[test]
    fn lazy_source_decodes_on_demand() {
        let data: Arc<[u8]> = Arc::from(&b"not read by the mock"[..]);
        let mut source = AnimationSource::with_decoder(data, Box::new(mock(&[0.05, 0.005])), 2.0);

        assert_eq!(source.frame_count(), 2);
        assert_eq!(source.frame_duration(1), Some(0.1));
        assert!((source.duration() - 0.15).abs() < 1e-9);

        let frame = source.decode_frame(1).unwrap();
        assert_eq!(frame.scale(), 2.0);
        assert_eq!(frame.pixel(0, 0), [1, 0, 0, 255]);

        let state = AnimationState::Lazy(source);
        assert!(state.is_animated());
        assert_eq!(state.frame_count(), 2);
    }
}
