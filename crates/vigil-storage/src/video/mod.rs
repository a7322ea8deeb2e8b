//! Video encoders.
//!
//! - [`ffmpeg`]: H.264 MP4 through an ffmpeg subprocess
//! - [`gif`]: animated GIF, pure Rust
//! - [`avi`]: Motion-JPEG AVI (RIFF), pure Rust

pub mod avi;
pub mod ffmpeg;
pub mod gif;

use image::RgbaImage;
use std::borrow::Cow;
use tracing::warn;
use vigil_core::error::CoreError;
use vigil_core::models::frame::Frame;
use vigil_vision::resize::fast_resize;

/// Frame images at one common size (the first frame's).
///
/// A region never changes size during a session, so the resize branch only
/// runs if the capture backend changed resolution mid-episode.
pub fn uniform_frames(frames: &[Frame]) -> Result<Vec<Cow<'_, RgbaImage>>, CoreError> {
    let Some(first) = frames.first() else {
        return Ok(Vec::new());
    };
    let (w, h) = first.image.dimensions();

    frames
        .iter()
        .map(|frame| {
            if frame.image.dimensions() == (w, h) {
                Ok(Cow::Borrowed(&frame.image))
            } else {
                warn!(
                    seq = frame.seq,
                    from = ?frame.image.dimensions(),
                    to = ?(w, h),
                    "frame size changed inside episode, resizing"
                );
                fast_resize(&frame.image, w, h).map(Cow::Owned)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Instant;

    #[test]
    fn mismatched_frames_are_resized() {
        let frames = vec![
            Frame::new(1, Instant::now(), Utc::now(), RgbaImage::new(40, 30)),
            Frame::new(2, Instant::now(), Utc::now(), RgbaImage::new(80, 60)),
        ];
        let uniform = uniform_frames(&frames).unwrap();
        assert!(matches!(uniform[0], Cow::Borrowed(_)));
        assert_eq!(uniform[1].dimensions(), (40, 30));
    }

    #[test]
    fn empty_input() {
        assert!(uniform_frames(&[]).unwrap().is_empty());
    }
}
