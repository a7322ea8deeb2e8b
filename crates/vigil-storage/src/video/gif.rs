//! Animated GIF encoding.

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, RgbaImage};
use std::borrow::Cow;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;
use vigil_core::error::CoreError;

/// Quantizer speed, 1 (best) to 30 (fastest)
const GIF_SPEED: i32 = 10;

/// Writes `frames` as a looping GIF at `fps`.
pub fn encode_gif(frames: &[Cow<'_, RgbaImage>], fps: f32, out: &Path) -> Result<(), CoreError> {
    if frames.is_empty() {
        return Err(CoreError::Write("GIF needs at least one frame".to_string()));
    }
    if !(fps.is_finite() && fps > 0.0) {
        return Err(CoreError::Write(format!("invalid frame rate {fps}")));
    }

    let file = File::create(out)?;
    let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), GIF_SPEED);
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| CoreError::Write(format!("GIF header: {e}")))?;

    let delay = Delay::from_saturating_duration(Duration::from_secs_f32(1.0 / fps));
    for frame in frames {
        let gif_frame = image::Frame::from_parts(frame.as_ref().clone(), 0, 0, delay);
        encoder
            .encode_frame(gif_frame)
            .map_err(|e| CoreError::Write(format!("GIF frame: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, Rgba};
    use std::io::BufReader;

    #[test]
    fn writes_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.gif");
        let frames: Vec<Cow<'_, RgbaImage>> = (0..3u8)
            .map(|i| Cow::Owned(RgbaImage::from_pixel(8, 6, Rgba([i * 80, 0, 0, 255]))))
            .collect();

        encode_gif(&frames, 2.0, &path).unwrap();

        let decoder = GifDecoder::new(BufReader::new(File::open(&path).unwrap())).unwrap();
        let decoded = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].buffer().dimensions(), (8, 6));
        let (num, den) = decoded[0].delay().numer_denom_ms();
        assert_eq!(num / den, 500);
    }

    #[test]
    fn empty_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(encode_gif(&[], 1.0, &dir.path().join("x.gif")).is_err());
    }
}
