// warden-common/src/lib.rs
pub mod cache;
pub mod config;
pub mod error;
pub mod model;

// Re-export key types
pub use cache::ArtifactCache;
pub use config::Options;
pub use error::{Result, WardenError};
pub use model::{ArtifactId, Platform, Target};
