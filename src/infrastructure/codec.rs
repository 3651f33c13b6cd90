//! Image decoding helpers shared by the cache and the loader.

use std::io::Cursor;

use bytes::Bytes;
use image::DynamicImage;
use image::imageops::FilterType;

use crate::domain::entities::ImageFormat;
use crate::domain::errors::LoadError;

/// Decodes encoded bytes on the blocking pool.
///
/// # Errors
/// Returns `InvalidData` if the bytes are empty, not a recognised format, or
/// fail to decode.
pub async fn decode(data: Bytes) -> Result<DynamicImage, LoadError> {
    validate(&data)?;
    tokio::task::spawn_blocking(move || image::load_from_memory(&data))
        .await
        .map_err(|e| LoadError::invalid_data(format!("Decode task panicked: {e}")))?
        .map_err(|e| LoadError::invalid_data(format!("Failed to decode image: {e}")))
}

/// Cheap validity check used when decoding is disabled.
///
/// # Errors
/// Returns `InvalidData` for empty buffers and unrecognised formats.
pub fn validate(data: &[u8]) -> Result<ImageFormat, LoadError> {
    if data.is_empty() {
        return Err(LoadError::invalid_data("Image data is empty"));
    }
    let format = ImageFormat::detect(data);
    if !format.is_known() {
        return Err(LoadError::invalid_data("Unrecognised image format"));
    }
    Ok(format)
}

/// Shrinks `img` so its longest side is at most `max_dimension`, keeping the
/// aspect ratio. Smaller images are returned unchanged.
#[must_use]
pub fn scale_down(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    if max_dimension == 0 || (img.width() <= max_dimension && img.height() <= max_dimension) {
        return img;
    }
    img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

/// Encodes `img` as PNG.
///
/// # Errors
/// Returns error if the encoder rejects the image.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A small valid PNG.
    pub fn png_bytes(width: u32, height: u32) -> Bytes {
        let img = DynamicImage::new_rgb8(width, height);
        Bytes::from(encode_png(&img).unwrap())
    }
}
