use crate::raster::Size;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or truncated input, or the codec rejected a frame
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    /// Requested target size is outside what the transform accepts
    #[error("invalid target size {target} for source of size {source_size}")]
    InvalidGeometry { target: Size, source_size: Size },

    /// A drawing surface or scratch buffer could not be allocated
    #[error("could not allocate a {width}x{height} buffer")]
    ResourceExhausted { width: u32, height: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<gif::DecodingError> for Error {
    fn from(e: gif::DecodingError) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<gif::EncodingError> for Error {
    fn from(e: gif::EncodingError) -> Self {
        Error::Encode(e.to_string())
    }
}
