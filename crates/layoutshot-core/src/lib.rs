//! layoutshot core: capture request, layered configuration, error taxonomy.

pub mod config;
pub mod error;

pub use config::{CaptureConfig, CaptureRequest, LaunchSettings, Readiness, Viewport};
pub use error::{Error, ErrorKind, Result};
