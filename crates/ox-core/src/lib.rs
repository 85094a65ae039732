//! Core types for the oxide-360 content and profile subsystem
//!
//! This crate provides the foundational error handling, configuration,
//! host clock, and text helpers shared by the storage crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod text;
pub mod time;

pub use config::Config;
pub use error::{ContentError, EmulatorError, ProfileError, Result, VfsError};
