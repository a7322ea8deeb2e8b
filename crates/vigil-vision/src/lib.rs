//! # vigil-vision
//!
//! Screen-side image handling: xcap region capture, the tick-driven frame
//! sampler, fast_image_resize downscaling, JPEG encoding and the live preview.

pub mod capture;
pub mod encoder;
pub mod preview;
pub mod resize;
pub mod sampler;
