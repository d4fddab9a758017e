// warden-net/src/lib.rs
pub mod http;
pub mod validation;

pub use http::{DistributionEndpoint, Fetcher};
pub use validation::{validate_url, verify_gzip};
