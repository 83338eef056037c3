pub mod config;
pub mod error;
pub mod format;
pub mod image;
pub mod pipeline;
pub mod raster;
mod surface;

// Re-export commonly used types
pub use config::{Config, OutputFormat};
pub use error::{Error, Result};
pub use format::ImageFormat;
pub use image::{AnimationState, ContentMode, DecodeOptions, FrameSet, Image, PngCompression};
pub use pipeline::{process, Operation};
pub use raster::{AlphaInfo, Color, RasterBuffer, Size};
