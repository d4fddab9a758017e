// warden-aio/src/lib.rs
//! Filesystem and archive IO for warden (directories, extraction, cache entries)

pub mod extract;
pub mod fs;
pub mod store;

pub use extract::{extract_tar_gz, extract_tar_gz_async};
pub use store::{install_archive, store_archive};
