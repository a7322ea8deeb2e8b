//! # vigil-core
//!
//! Vigil domain models, port (trait) definitions, error type and configuration.
//! Every adapter crate shares the types and interfaces declared here.
//!
//! ## Layout
//!
//! - [`models`]: domain data structures (region, frame, verdict, episode)
//! - [`ports`]: hexagonal-architecture port interfaces (async_trait)
//! - [`error`]: core error type (thiserror)
//! - [`config`]: application configuration structs
//! - [`config_manager`]: layered configuration loading
//! - [`throttle`]: rate-limited warning helper

pub mod config;
pub mod config_manager;
pub mod error;
pub mod models;
pub mod ports;
pub mod throttle;
