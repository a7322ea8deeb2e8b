//! H.264 MP4 through an ffmpeg subprocess.
//!
//! Raw RGBA frames are piped to ffmpeg's stdin; no intermediate files.

use image::RgbaImage;
use std::borrow::Cow;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;
use vigil_core::error::CoreError;

const STDERR_TAIL_CHARS: usize = 400;

/// `true` if `ffmpeg -version` runs successfully.
pub fn ffmpeg_available(ffmpeg: &str) -> bool {
    match Command::new(ffmpeg)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(e) => {
            debug!(ffmpeg, error = %e, "ffmpeg not runnable");
            false
        }
    }
}

fn encode_args(width: u32, height: u32, fps: f32, out: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{width}x{height}"),
        "-r".into(),
        format!("{fps:.3}"),
        "-i".into(),
        "-".into(),
        // yuv420p needs even dimensions
        "-vf".into(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-movflags".into(),
        "+faststart".into(),
        out.to_string_lossy().into_owned(),
    ]
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    text.chars().skip(skip).collect()
}

/// Encodes same-sized `frames` to an H.264 MP4 at `out`.
pub fn encode_mp4(
    ffmpeg: &str,
    frames: &[Cow<'_, RgbaImage>],
    fps: f32,
    out: &Path,
) -> Result<(), CoreError> {
    let Some(first) = frames.first() else {
        return Err(CoreError::Write("MP4 needs at least one frame".to_string()));
    };
    let (width, height) = first.dimensions();

    let mut child = Command::new(ffmpeg)
        .args(encode_args(width, height, fps, out))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CoreError::Write(format!("failed to start {ffmpeg}: {e}")))?;

    // stdin is dropped at the end of this block so ffmpeg sees EOF.
    let pipe_result = {
        let Some(mut stdin) = child.stdin.take() else {
            return Err(CoreError::Write("ffmpeg stdin unavailable".to_string()));
        };
        frames
            .iter()
            .try_for_each(|frame| stdin.write_all(frame.as_raw()))
    };

    let output = child
        .wait_with_output()
        .map_err(|e| CoreError::Write(format!("ffmpeg did not finish: {e}")))?;

    if !output.status.success() {
        return Err(CoreError::Write(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            stderr_tail(&output.stderr)
        )));
    }
    pipe_result.map_err(|e| CoreError::Write(format!("ffmpeg pipe failed: {e}")))?;

    debug!(frames = frames.len(), path = %out.display(), "mp4 encoded");
    Ok(())
}
