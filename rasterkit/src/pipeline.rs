//! Ordered transform lists applied to whole images

use crate::error::Result;
use crate::image::{blur, color, transform, ContentMode, Image};
use crate::raster::{Color, RasterBuffer, Size};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Shrink into `width`x`height` according to `mode`
    Resize {
        width: f64,
        height: f64,
        #[serde(default)]
        mode: ContentMode,
    },
    RoundCorner {
        radius: f64,
    },
    Blur {
        radius: f64,
    },
    Overlay {
        color: Color,
        fraction: f32,
    },
    Tint {
        color: Color,
    },
    Adjust {
        brightness: f32,
        contrast: f32,
        saturation: f32,
        exposure: f32,
    },
}

impl Operation {
    /// Only resize can fail; the filters fall back to their input
    pub fn apply(&self, raster: &RasterBuffer) -> Result<RasterBuffer> {
        let out = match *self {
            Operation::Resize {
                width,
                height,
                mode,
            } => {
                let target = mode.target_size(raster.size(), Size::new(width, height));
                transform::resize(raster, target)?
            }
            Operation::RoundCorner { radius } => {
                transform::round_corners(raster, radius, raster.size())
            }
            Operation::Blur { radius } => blur::blur(raster, radius),
            Operation::Overlay { color, fraction } => color::overlay(raster, color, fraction),
            Operation::Tint { color } => color::tint(raster, color),
            Operation::Adjust {
                brightness,
                contrast,
                saturation,
                exposure,
            } => color::adjust(raster, brightness, contrast, saturation, exposure),
        };
        Ok(out)
    }
}

fn apply_all(raster: &RasterBuffer, operations: &[Operation]) -> Result<RasterBuffer> {
    let mut current = raster.clone();
    for operation in operations {
        log::trace!("Applying {operation:?}");
        current = operation.apply(&current)?;
    }
    Ok(current)
}

/// Run `operations` in order over the image, frame by frame for animations
pub fn process(image: Image, operations: &[Operation]) -> Result<Image> {
    if operations.is_empty() {
        return Ok(image);
    }

    log::debug!(
        "Processing {} frame(s) with {} operation(s)",
        image.frame_count(),
        operations.len()
    );
    image.map_frames(|raster| apply_all(raster, operations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{DecodeOptions, FrameSet};
    use crate::Error;
    use imageproc::image::{Rgba, RgbaImage};

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RasterBuffer {
        RasterBuffer::from_rgba8(RgbaImage::from_pixel(width, height, Rgba(rgba)), 1.0)
    }

    #[test]
    fn operations_run_in_order() {
        let image = Image::from_raster(solid(40, 20, [0, 0, 255, 255]));
        let operations = [
            Operation::Resize {
                width: 20.0,
                height: 20.0,
                mode: ContentMode::Fit,
            },
            Operation::Tint {
                color: Color::rgb(1.0, 0.0, 0.0),
            },
            Operation::RoundCorner { radius: 6.0 },
        ];

        let out = process(image, &operations).unwrap();
        let raster = out.raster();
        assert_eq!(raster.dimensions(), (20, 10));
        assert_eq!(raster.pixel(0, 0)[3], 0);
        assert_eq!(raster.pixel(10, 5), [255, 0, 0, 255]);
    }

    #[test]
    fn every_frame_is_transformed() {
        let frames = FrameSet::new([
            (solid(8, 8, [255, 0, 0, 255]), 0.1),
            (solid(8, 8, [0, 255, 0, 255]), 0.3),
        ])
        .with_loop_count(4);
        let image = Image::from_frames(frames).unwrap();

        let out = process(
            image,
            &[Operation::Resize {
                width: 4.0,
                height: 4.0,
                mode: ContentMode::Stretch,
            }],
        )
        .unwrap();

        let frames = out.frames().unwrap();
        assert_eq!(frames.durations(), &[0.1, 0.3]);
        assert_eq!(frames.loop_count(), 4);
        assert!(frames.frames().iter().all(|f| f.dimensions() == (4, 4)));
        assert_eq!(out.raster().dimensions(), (4, 4));
    }

    #[test]
    fn growing_resize_fails_the_pipeline() {
        let image = Image::from_raster(solid(4, 4, [0, 0, 0, 255]));
        let result = process(
            image,
            &[Operation::Resize {
                width: 8.0,
                height: 8.0,
                mode: ContentMode::Stretch,
            }],
        );
        assert!(matches!(result, Err(Error::InvalidGeometry { .. })));
    }

    #[test]
    fn no_operations_keep_original_bytes() {
        let frames = FrameSet::uniform(vec![solid(2, 2, [0, 0, 0, 255]); 2], 0.2);
        let data = crate::image::encode_gif(&frames, 0, None).unwrap();
        let image = Image::from_data(data.clone(), &DecodeOptions::default()).unwrap();

        let out = process(image, &[]).unwrap();
        assert_eq!(out.data(), Some(data.as_slice()));
    }

    #[test]
    fn operation_json_is_tagged() {
        let json = serde_json::to_string(&Operation::RoundCorner { radius: 2.0 }).unwrap();
        assert_eq!(json, r#"{"op":"round_corner","radius":2.0}"#);

        let op: Operation =
            serde_json::from_str(r#"{"op":"resize","width":3,"height":4}"#).unwrap();
        assert_eq!(
            op,
            Operation::Resize {
                width: 3.0,
                height: 4.0,
                mode: ContentMode::Fit
            }
        );
    }
}
