//! Port interfaces (traits).
//!
//! The port layer of the hexagonal architecture. Adapter crates implement
//! these traits and `vigil-app` wires them together as `Arc<dyn T>`.
//!
//! Async traits use the `async_trait` macro so they stay object safe.

pub mod episode_sink;
pub mod frame_source;
pub mod oracle;
pub mod preview;
