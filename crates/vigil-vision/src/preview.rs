//! Live preview.
//!
//! The sampling path hands the latest frame to a `watch` channel (latest
//! wins, never blocks). A background task renders it with a state-coloured
//! border and replaces `preview.jpg` atomically, at most once per refresh
//! period.

use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vigil_core::config::PreviewConfig;
use vigil_core::error::CoreError;
use vigil_core::models::episode::RecordingState;
use vigil_core::models::frame::Frame;
use vigil_core::ports::preview::PreviewSink;

use crate::encoder::encode_jpeg;
use crate::resize::limit_edge;

/// Preview file name inside the run directory
pub const PREVIEW_FILE_NAME: &str = "preview.jpg";

const BORDER_PX: u32 = 4;
const ACTIVE_COLOR: Rgba<u8> = Rgba([220, 30, 30, 255]);
const IDLE_COLOR: Rgba<u8> = Rgba([30, 180, 60, 255]);
const PREVIEW_JPEG_QUALITY: u8 = 75;

struct Snapshot {
    seq: u64,
    state: RecordingState,
    image: RgbaImage,
}

/// File-backed preview
pub struct FilePreview {
    tx: watch::Sender<Option<Arc<Snapshot>>>,
}

impl FilePreview {
    /// Starts the render task writing to `<dir>/preview.jpg`.
    ///
    /// The task ends once the `FilePreview` is dropped.
    pub fn spawn(dir: &Path, config: &PreviewConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = watch::channel(None);
        let path = dir.join(PREVIEW_FILE_NAME);
        let handle = tokio::spawn(render_loop(rx, path, config.refresh(), config.max_edge));
        (Self { tx }, handle)
    }
}

impl PreviewSink for FilePreview {
    fn publish(&self, frame: &Frame, state: RecordingState) {
        let snapshot = Snapshot {
            seq: frame.seq,
            state,
            image: frame.image.clone(),
        };
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }
}

async fn render_loop(
    mut rx: watch::Receiver<Option<Arc<Snapshot>>>,
    path: PathBuf,
    refresh: Duration,
    max_edge: u32,
) {
    while rx.changed().await.is_ok() {
        let Some(snapshot) = rx.borrow_and_update().clone() else {
            continue;
        };

        let target = path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let rendered = render(&snapshot.image, snapshot.state, max_edge)?;
            write_atomic(&target, &rendered)?;
            Ok::<u64, CoreError>(snapshot.seq)
        })
        .await;

        match result {
            Ok(Ok(seq)) => debug!(seq, path = %path.display(), "preview updated"),
            Ok(Err(e)) => warn!(error = %e, "preview update failed"),
            Err(e) => warn!(error = %e, "preview task failed"),
        }

        tokio::time::sleep(refresh).await;
    }
    debug!("preview stopped");
}

/// Downscales `image` and draws a border coloured by `state`.
pub fn render(image: &RgbaImage, state: RecordingState, max_edge: u32) -> Result<Vec<u8>, CoreError> {
    let mut canvas = limit_edge(image.clone(), max_edge)?;
    let color = match state {
        RecordingState::Active => ACTIVE_COLOR,
        RecordingState::Idle => IDLE_COLOR,
    };
    draw_border(&mut canvas, BORDER_PX, color);
    encode_jpeg(&canvas, PREVIEW_JPEG_QUALITY)
}

fn draw_border(image: &mut RgbaImage, thickness: u32, color: Rgba<u8>) {
    let (w, h) = image.dimensions();
    for (x, y, px) in image.enumerate_pixels_mut() {
        if x < thickness || y < thickness || x + thickness >= w || y + thickness >= h {
            *px = color;
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let tmp = path.with_extension("jpg.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
