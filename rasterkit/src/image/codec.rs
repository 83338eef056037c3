//! Single-frame decoding: still images through the `image` codecs, GIF
//! frames through the `gif` crate with disposal-aware compositing.

use std::io::Cursor;
use std::sync::Arc;

use gif::{ColorOutput, DisposalMethod, Repeat};
use imageproc::image::{
    load_from_memory, load_from_memory_with_format, DynamicImage, ImageFormat as CodecFormat,
    Rgba, RgbaImage,
};

use super::timing::FrameProperties;
use crate::error::{Error, Result};
use crate::format::ImageFormat;

/// Per-index access to the frames of an encoded multi-frame container.
///
/// One decode may be in flight per decoder; `decode_frame` takes `&mut self`.
pub trait FrameDecoder {
    fn frame_count(&self) -> usize;

    /// Timing metadata of a frame, `None` when the container has none for it
    fn frame_properties(&self, index: usize) -> Option<FrameProperties>;

    fn decode_frame(&mut self, index: usize) -> Result<DynamicImage>;

    /// Number of times the animation plays, 0 meaning forever
    fn loop_count(&self) -> u16 {
        0
    }
}

/// Decode a still image. `Unknown` lets the codecs guess from the content.
pub fn decode_single_frame(data: &[u8], format: ImageFormat) -> Result<DynamicImage> {
    let result = match format {
        ImageFormat::Png => load_from_memory_with_format(data, CodecFormat::Png),
        ImageFormat::Jpeg => load_from_memory_with_format(data, CodecFormat::Jpeg),
        ImageFormat::Gif => load_from_memory_with_format(data, CodecFormat::Gif),
        ImageFormat::Unknown => load_from_memory(data),
    };
    result.map_err(|e| Error::Decode(e.to_string()))
}

#[derive(Debug, Clone, Copy)]
struct GifFrameInfo {
    // centiseconds
    delay: u16,
}

/// Lazily composited GIF frames.
///
/// Construction scans the container once for frame count, delays and loop
/// count. Frames are decoded on demand; walking forward reuses the running
/// canvas, going backwards restarts from the first frame.
pub struct GifDecoder {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    frames: Vec<GifFrameInfo>,
    loop_count: u16,
    cursor: Option<Compositor>,
}

impl GifDecoder {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();

        let mut options = gif::DecodeOptions::new();
        options.set_color_output(ColorOutput::Indexed);
        let mut decoder = options.read_info(Cursor::new(Arc::clone(&data)))?;

        let width = decoder.width() as u32;
        let height = decoder.height() as u32;

        let mut frames = Vec::new();
        while let Some(frame) = decoder.read_next_frame()? {
            frames.push(GifFrameInfo { delay: frame.delay });
        }

        let loop_count = match decoder.repeat() {
            Repeat::Infinite => 0,
            // no looping extension: the animation plays once
            Repeat::Finite(n) => n.max(1),
        };

        log::debug!(
            "Scanned GIF: {width}x{height}, {} frames, loop count {loop_count}",
            frames.len()
        );

        Ok(Self {
            data,
            width,
            height,
            frames,
            loop_count,
            cursor: None,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameDecoder for GifDecoder {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame_properties(&self, index: usize) -> Option<FrameProperties> {
        self.frames.get(index).map(|info| {
            let seconds = info.delay as f64 / 100.0;
            FrameProperties {
                unclamped_delay: Some(seconds),
                delay: Some(seconds),
            }
        })
    }

    fn decode_frame(&mut self, index: usize) -> Result<DynamicImage> {
        if index >= self.frames.len() {
            return Err(Error::Decode(format!(
                "frame {index} out of range ({} frames)",
                self.frames.len()
            )));
        }

        let restart = self.cursor.as_ref().map_or(true, |c| c.next_index > index);
        if restart {
            self.cursor = Some(Compositor::new(Arc::clone(&self.data))?);
        }

        let Some(cursor) = self.cursor.as_mut() else {
            return Err(Error::Decode("GIF compositor unavailable".to_string()));
        };

        loop {
            let frame_index = cursor.next_index;
            let composed = cursor
                .advance()?
                .ok_or_else(|| Error::Decode(format!("GIF ended before frame {index}")))?;
            if frame_index == index {
                log::trace!("Decoded GIF frame {index}");
                return Ok(DynamicImage::ImageRgba8(composed));
            }
        }
    }

    fn loop_count(&self) -> u16 {
        self.loop_count
    }
}

/// Running canvas over a sequential GIF decoder
struct Compositor {
    decoder: gif::Decoder<Cursor<Arc<[u8]>>>,
    canvas: RgbaImage,
    next_index: usize,
}

impl Compositor {
    fn new(data: Arc<[u8]>) -> Result<Self> {
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(ColorOutput::RGBA);
        let decoder = options.read_info(Cursor::new(data))?;

        let canvas = RgbaImage::from_pixel(
            decoder.width() as u32,
            decoder.height() as u32,
            Rgba([0, 0, 0, 0]),
        );

        Ok(Self {
            decoder,
            canvas,
            next_index: 0,
        })
    }

    /// Composite the next frame and return the full canvas as displayed
    fn advance(&mut self) -> Result<Option<RgbaImage>> {
        let Some(frame) = self.decoder.read_next_frame()? else {
            return Ok(None);
        };

        let (width, height) = self.canvas.dimensions();
        let left = frame.left as u32;
        let top = frame.top as u32;
        let frame_width = frame.width as u32;
        let frame_height = frame.height as u32;
        let dispose = frame.dispose;

        let previous = (dispose == DisposalMethod::Previous).then(|| self.canvas.clone());

        for (i, px) in frame.buffer.chunks_exact(4).enumerate() {
            let x = left + i as u32 % frame_width.max(1);
            let y = top + i as u32 / frame_width.max(1);
            // transparent frame pixels leave the canvas untouched
            if x < width && y < height && px[3] > 0 {
                self.canvas.put_pixel(x, y, Rgba([px[0], px[1], px[2], px[3]]));
            }
        }

        let composed = self.canvas.clone();

        match dispose {
            DisposalMethod::Background => {
                for y in top..(top + frame_height).min(height) {
                    for x in left..(left + frame_width).min(width) {
                        self.canvas.put_pixel(x, y, Rgba([0, 0, 0, 0]));
                    }
                }
            }
            DisposalMethod::Previous => {
                if let Some(previous) = previous {
                    self.canvas = previous;
                }
            }
            _ => {}
        }

        self.next_index += 1;
        Ok(Some(composed))
    }
}
