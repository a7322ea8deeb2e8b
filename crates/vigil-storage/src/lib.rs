//! # vigil-storage
//!
//! Local persistence of closed episodes under a run-scoped directory:
//!
//! ```text
//! <output>/<run_id>/episode_001_20260118_143005.mp4   primary video (or .gif)
//! <output>/<run_id>/episode_001_20260118_143005.avi   Motion-JPEG AVI
//! <output>/<run_id>/episode_001_20260118_143005.jpg   representative still
//! <output>/<run_id>/episode_001_20260118_143005.json  manifest
//! ```

pub mod episode_writer;
pub mod manifest;
pub mod video;
