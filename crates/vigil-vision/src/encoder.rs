//! JPEG encoding.
//!
//! Frames are RGBA; JPEG has no alpha channel, so alpha is dropped.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbaImage};
use tracing::trace;
use vigil_core::error::CoreError;
use vigil_core::ports::oracle::EncodedImage;

pub const JPEG_MIME: &str = "image/jpeg";

/// Encodes `image` as baseline JPEG at `quality` (1-100).
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, CoreError> {
    let (w, h) = image.dimensions();
    let rgb: Vec<u8> = image
        .as_raw()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    let mut buf = Vec::with_capacity(rgb.len() / 8);
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode(&rgb, w, h, ExtendedColorType::Rgb8)
        .map_err(|e| CoreError::Internal(format!("JPEG encoding failed: {e}")))?;

    trace!(width = w, height = h, bytes = buf.len(), "JPEG encoded");
    Ok(buf)
}

/// JPEG payload for the classification oracle.
pub fn encode_for_oracle(image: &RgbaImage, quality: u8) -> Result<EncodedImage, CoreError> {
    Ok(EncodedImage {
        mime_type: JPEG_MIME,
        data: encode_jpeg(image, quality)?,
        width: image.width(),
        height: image.height(),
    })
}
