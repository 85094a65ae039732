//! Content package management for oxide-360
//!
//! Persistent per-title, per-user content packages: save data,
//! marketplace content, and profile records. Each package is a container
//! file mounted into the virtual file namespace on demand under a
//! caller-chosen root name.

pub mod descriptor;
pub mod manager;
pub mod package;
pub mod title;

pub use descriptor::{AggregateContentDescriptor, ContentDescriptor, ContentType};
pub use manager::ContentManager;
pub use package::ContentPackage;
pub use title::{TitleContext, TitleState};
