// warden-core/src/update/mod.rs
pub mod newest;
pub mod version;

pub use newest::{find_newest, FindOptions, ScanReport};
