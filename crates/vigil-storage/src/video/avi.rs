//! Motion-JPEG AVI writer.
//!
//! Layout (all sizes little-endian `u32`, chunks padded to even length):
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     avih              main header
//!     LIST 'strl'
//!       strh 'vids'     stream header, handler 'MJPG'
//!       strf            BITMAPINFOHEADER, compression 'MJPG'
//!   LIST 'movi'
//!     00dc <jpeg>       one chunk per frame
//!   idx1                keyframe index, offsets relative to 'movi'
//! ```

use std::io::Write;
use vigil_core::error::CoreError;

const AVIF_HASINDEX: u32 = 0x0000_0010;
const AVIIF_KEYFRAME: u32 = 0x0000_0010;
const AVIH_LEN: u32 = 56;
const STRH_LEN: u32 = 56;
const STRF_LEN: u32 = 40;
const RATE_SCALE: u32 = 1000;

struct RiffBuf(Vec<u8>);

impl RiffBuf {
    fn fourcc(&mut self, code: &[u8; 4]) {
        self.0.extend_from_slice(code);
    }

    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn u16(&mut self, v: u16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn i16(&mut self, v: i16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
}

fn to_u32(v: u64, what: &str) -> Result<u32, CoreError> {
    u32::try_from(v).map_err(|_| CoreError::Write(format!("AVI {what} exceeds 4 GiB")))
}

/// Writes `jpegs` (already JPEG-encoded frames of `width` x `height`) as an
/// MJPEG AVI played back at `fps`.
pub fn write_mjpeg_avi<W: Write>(
    out: &mut W,
    jpegs: &[Vec<u8>],
    width: u32,
    height: u32,
    fps: f32,
) -> Result<(), CoreError> {
    if jpegs.is_empty() {
        return Err(CoreError::Write("AVI needs at least one frame".to_string()));
    }
    if !(fps.is_finite() && fps > 0.0) {
        return Err(CoreError::Write(format!("invalid frame rate {fps}")));
    }

    let frame_count = to_u32(jpegs.len() as u64, "frame count")?;
    let max_frame = jpegs.iter().map(Vec::len).max().unwrap_or(0) as u64;
    let movi_payload: u64 = jpegs
        .iter()
        .map(|j| 8 + j.len() as u64 + (j.len() as u64 & 1))
        .sum();

    let strl_size = 4 + (8 + STRH_LEN) + (8 + STRF_LEN);
    let hdrl_size = 4 + (8 + AVIH_LEN) + (8 + strl_size);
    let movi_size = to_u32(4 + movi_payload, "movi list")?;
    let idx1_size = to_u32(16 * jpegs.len() as u64, "index")?;
    let riff_size = to_u32(
        4 + (8 + hdrl_size as u64) + (8 + movi_size as u64) + (8 + idx1_size as u64),
        "file",
    )?;

    let usec_per_frame = (1_000_000.0 / fps).round() as u32;
    let rate = ((fps * RATE_SCALE as f32).round() as u32).max(1);
    let suggested_buffer = to_u32(max_frame, "frame")?;
    let max_bytes_per_sec = (max_frame as f64 * fps as f64).min(u32::MAX as f64) as u32;
    let frame_w = i32::try_from(width).map_err(|_| CoreError::Write("frame too wide".into()))?;
    let frame_h = i32::try_from(height).map_err(|_| CoreError::Write("frame too tall".into()))?;

    let mut buf = RiffBuf(Vec::with_capacity(riff_size as usize + 8));

    buf.fourcc(b"RIFF");
    buf.u32(riff_size);
    buf.fourcc(b"AVI ");

    // -- hdrl --
    buf.fourcc(b"LIST");
    buf.u32(hdrl_size);
    buf.fourcc(b"hdrl");

    buf.fourcc(b"avih");
    buf.u32(AVIH_LEN);
    buf.u32(usec_per_frame);
    buf.u32(max_bytes_per_sec);
    buf.u32(0); // padding granularity
    buf.u32(AVIF_HASINDEX);
    buf.u32(frame_count);
    buf.u32(0); // initial frames
    buf.u32(1); // streams
    buf.u32(suggested_buffer);
    buf.u32(width);
    buf.u32(height);
    for _ in 0..4 {
        buf.u32(0);
    }

    buf.fourcc(b"LIST");
    buf.u32(strl_size);
    buf.fourcc(b"strl");

    buf.fourcc(b"strh");
    buf.u32(STRH_LEN);
    buf.fourcc(b"vids");
    buf.fourcc(b"MJPG");
    buf.u32(0); // flags
    buf.u16(0); // priority
    buf.u16(0); // language
    buf.u32(0); // initial frames
    buf.u32(RATE_SCALE);
    buf.u32(rate);
    buf.u32(0); // start
    buf.u32(frame_count);
    buf.u32(suggested_buffer);
    buf.u32(u32::MAX); // quality: driver default
    buf.u32(0); // sample size
    buf.i16(0);
    buf.i16(0);
    buf.i16(i16::try_from(width).unwrap_or(i16::MAX));
    buf.i16(i16::try_from(height).unwrap_or(i16::MAX));

    buf.fourcc(b"strf");
    buf.u32(STRF_LEN);
    buf.u32(STRF_LEN);
    buf.i32(frame_w);
    buf.i32(frame_h);
    buf.u16(1); // planes
    buf.u16(24); // bit count
    buf.fourcc(b"MJPG");
    buf.u32(width.saturating_mul(height).saturating_mul(3));
    buf.u32(0);
    buf.u32(0);
    buf.u32(0);
    buf.u32(0);

    // -- movi --
    buf.fourcc(b"LIST");
    buf.u32(movi_size);
    let movi_fourcc_pos = buf.0.len();
    buf.fourcc(b"movi");

    let mut index = Vec::with_capacity(jpegs.len());
    for jpeg in jpegs {
        let offset = (buf.0.len() - movi_fourcc_pos) as u32;
        let len = jpeg.len() as u32;
        index.push((offset, len));

        buf.fourcc(b"00dc");
        buf.u32(len);
        buf.0.extend_from_slice(jpeg);
        if len & 1 == 1 {
            buf.0.push(0);
        }
    }

    // -- idx1 --
    buf.fourcc(b"idx1");
    buf.u32(idx1_size);
    for (offset, len) in index {
        buf.fourcc(b"00dc");
        buf.u32(AVIIF_KEYFRAME);
        buf.u32(offset);
        buf.u32(len);
    }

    debug_assert_eq!(buf.0.len(), riff_size as usize + 8);

    out.write_all(&buf.0)?;
    out.flush()?;
    Ok(())
}
