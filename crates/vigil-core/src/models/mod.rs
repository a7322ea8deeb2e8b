//! Vigil domain models.
//!
//! Plain data shared between the sampler, classifier, controller and writer.

pub mod episode;
pub mod frame;
pub mod region;
pub mod session;
pub mod verdict;
