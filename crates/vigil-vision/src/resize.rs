//! Image downscaling.
//!
//! fast_image_resize based; frames are reduced so their longest edge stays
//! within a limit before they are stored or sent anywhere.

use fast_image_resize::{images::Image as FirImage, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::RgbaImage;
use tracing::debug;
use vigil_core::error::CoreError;

/// Target size keeping the aspect ratio, longest edge at most `max_edge`.
///
/// Returns the input size when it already fits. Never returns a zero edge.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_edge || longest == 0 {
        return (width, height);
    }
    let scale = max_edge as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_edge);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_edge);
    (w, h)
}

/// Bilinear resize to exactly `width` x `height`.
pub fn fast_resize(image: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage, CoreError> {
    let (src_w, src_h) = image.dimensions();

    if src_w == width && src_h == height {
        return Ok(image.clone());
    }
    if src_w == 0 || src_h == 0 {
        return Err(CoreError::Internal("source image has zero size".to_string()));
    }
    if width == 0 || height == 0 {
        return Err(CoreError::Internal("target image has zero size".to_string()));
    }

    let src_image = FirImage::from_vec_u8(src_w, src_h, image.as_raw().clone(), PixelType::U8x4)
        .map_err(|e| CoreError::Internal(format!("failed to wrap source image: {e}")))?;

    let mut dst_image = FirImage::new(width, height, PixelType::U8x4);

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(
        fast_image_resize::FilterType::Bilinear,
    ));

    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| CoreError::Internal(format!("resize failed: {e}")))?;

    let result = RgbaImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| CoreError::Internal("failed to build resized image".to_string()))?;

    debug!(src_w, src_h, width, height, "image resized");

    Ok(result)
}

/// Downscales `image` so its longest edge is at most `max_edge`; returns it
/// untouched when it already fits.
pub fn limit_edge(image: RgbaImage, max_edge: u32) -> Result<RgbaImage, CoreError> {
    let (w, h) = image.dimensions();
    let (tw, th) = fit_within(w, h, max_edge);
    if (tw, th) == (w, h) {
        return Ok(image);
    }
    fast_resize(&image, tw, th)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn fit_keeps_small_images() {
        assert_eq!(fit_within(800, 600, 1280), (800, 600));
        assert_eq!(fit_within(720, 720, 720), (720, 720));
    }

    #[test]
    fn fit_scales_longest_edge() {
        assert_eq!(fit_within(1920, 1080, 720), (720, 405));
        assert_eq!(fit_within(1080, 1920, 720), (405, 720));
    }

    #[test]
    fn fit_never_zero() {
        assert_eq!(fit_within(10_000, 1, 100), (100, 1));
    }

    #[test]
    fn resize_changes_dimensions() {
        let img = RgbaImage::from_pixel(200, 100, Rgba([255, 0, 0, 255]));
        let resized = fast_resize(&img, 100, 50).unwrap();
        assert_eq!(resized.dimensions(), (100, 50));
        assert_eq!(resized.get_pixel(50, 25), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn resize_rejects_zero_target() {
        let img = RgbaImage::new(10, 10);
        assert!(fast_resize(&img, 0, 10).is_err());
    }

    #[test]
    fn limit_edge_downscales() {
        let img = RgbaImage::new(1600, 1200);
        let out = limit_edge(img, 800).unwrap();
        assert_eq!(out.dimensions(), (800, 600));
    }

    #[test]
    fn limit_edge_passthrough() {
        let img = RgbaImage::from_pixel(8, 4, Rgba([1, 2, 3, 4]));
        let out = limit_edge(img.clone(), 16).unwrap();
        assert_eq!(out, img);
    }
}
