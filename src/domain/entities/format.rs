//! Encoded image format detection.

/// Encoded format of an image byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    /// Unknown or unsupported format.
    #[default]
    Undefined,
    /// JPEG.
    Jpeg,
    /// PNG.
    Png,
    /// GIF.
    Gif,
    /// TIFF (either byte order).
    Tiff,
    /// WebP.
    WebP,
}

impl ImageFormat {
    /// Classifies a buffer by inspecting its magic prefix.
    ///
    /// Pure and allocation free; only the first twelve bytes are examined.
    #[must_use]
    pub fn detect(data: &[u8]) -> Self {
        match data {
            [0xFF, 0xD8, 0xFF, ..] => Self::Jpeg,
            [0x89, b'P', b'N', b'G', ..] => Self::Png,
            [b'G', b'I', b'F', b'8', ..] => Self::Gif,
            [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Self::Tiff,
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Self::WebP,
            _ => Self::Undefined,
        }
    }

    /// Returns the MIME type for this format, if known.
    #[must_use]
    pub const fn mime_type(self) -> Option<&'static str> {
        match self {
            Self::Jpeg => Some("image/jpeg"),
            Self::Png => Some("image/png"),
            Self::Gif => Some("image/gif"),
            Self::Tiff => Some("image/tiff"),
            Self::WebP => Some("image/webp"),
            Self::Undefined => None,
        }
    }

    /// Returns the conventional file extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::WebP => "webp",
            Self::Undefined => "bin",
        }
    }

    /// Returns true if the format was recognised.
    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Undefined)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::Png => write!(f, "png"),
            Self::Gif => write!(f, "gif"),
            Self::Tiff => write!(f, "tiff"),
            Self::WebP => write!(f, "webp"),
        }
    }
}
