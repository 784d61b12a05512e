#![forbid(unsafe_code)]

pub const CRATE_NAME: &str = "intake-api";

pub const API_VERSION: &str = "v1";

pub mod errors;
pub mod wire;
pub mod ws;

pub use errors::{ApiError, ApiErrorCode};
