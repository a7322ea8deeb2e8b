//! Live preview port.
//!
//! Implementation: `vigil-vision::preview::FilePreview`.

use crate::models::episode::RecordingState;
use crate::models::frame::Frame;

/// Receives the latest frame and recording state once per tick.
///
/// `publish` must return immediately; it is called on the sampling path.
pub trait PreviewSink: Send + Sync {
    fn publish(&self, frame: &Frame, state: RecordingState);
}
