// warden-common/src/model/mod.rs
pub mod artifact;

// Re-export
pub use artifact::{ArtifactId, Platform, Target};
