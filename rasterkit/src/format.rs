//! Encoding detection from leading magic bytes

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_MARKER: u8 = 0xFF;
const GIF_SIGNATURE: [u8; 3] = *b"GIF";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, strum::Display,
)]
pub enum ImageFormat {
    #[strum(to_string = "PNG")]
    Png,
    #[strum(to_string = "JPEG")]
    Jpeg,
    #[strum(to_string = "GIF")]
    Gif,
    #[strum(to_string = "unknown")]
    Unknown,
}

impl ImageFormat {
    /// Classify encoded bytes by their signature. Only the first 8 bytes are
    /// looked at; anything shorter than 3 bytes is `Unknown`.
    pub fn classify(data: &[u8]) -> Self {
        if data.starts_with(&PNG_SIGNATURE) {
            return ImageFormat::Png;
        }

        match data {
            [a, b, c, ..] if [*a, *b] == JPEG_SOI && *c == JPEG_MARKER => ImageFormat::Jpeg,
            [a, b, c, ..] if [*a, *b, *c] == GIF_SIGNATURE => ImageFormat::Gif,
            _ => ImageFormat::Unknown,
        }
    }

    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ImageFormat::Png => Some("png"),
            ImageFormat::Jpeg => Some("jpg"),
            ImageFormat::Gif => Some("gif"),
            ImageFormat::Unknown => None,
        }
    }

    pub fn is_animated_container(&self) -> bool {
        matches!(self, ImageFormat::Gif)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_needs_full_signature() {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&[0, 0, 0, 13]);
        assert_eq!(ImageFormat::classify(&data), ImageFormat::Png);

        // 7 of 8 signature bytes is not a PNG
        assert_eq!(ImageFormat::classify(&PNG_SIGNATURE[..7]), ImageFormat::Unknown);

        let mut broken = PNG_SIGNATURE;
        broken[7] = 0x0B;
        assert_eq!(ImageFormat::classify(&broken), ImageFormat::Unknown);
    }

    #[test]
    fn jpeg_soi_and_marker() {
        assert_eq!(
            ImageFormat::classify(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]),
            ImageFormat::Jpeg
        );
        assert_eq!(ImageFormat::classify(&[0xFF, 0xD8, 0xFF]), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::classify(&[0xFF, 0xD8, 0x00]), ImageFormat::Unknown);
    }

    #[test]
    fn gif_prefix() {
        assert_eq!(ImageFormat::classify(b"GIF89a\x01\x00"), ImageFormat::Gif);
        assert_eq!(ImageFormat::classify(b"GIF"), ImageFormat::Gif);
        assert_eq!(ImageFormat::classify(b"GIX89a"), ImageFormat::Unknown);
    }

    #[test]
    fn short_or_empty_input_is_unknown() {
        assert_eq!(ImageFormat::classify(&[]), ImageFormat::Unknown);
        assert_eq!(ImageFormat::classify(&[0xFF]), ImageFormat::Unknown);
        assert_eq!(ImageFormat::classify(&[0xFF, 0xD8]), ImageFormat::Unknown);
        assert_eq!(ImageFormat::classify(b"GI"), ImageFormat::Unknown);
    }

    #[test]
    fn display_names() {
        assert_eq!(ImageFormat::Png.to_string(), "PNG");
        assert_eq!(ImageFormat::Unknown.to_string(), "unknown");
    }
}
