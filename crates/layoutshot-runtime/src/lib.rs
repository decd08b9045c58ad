//! layoutshot runtime: the screenshot capturer.

pub mod capturer;
pub mod output;
pub mod types;

pub use capturer::Capturer;
pub use types::{CaptureReport, Step};
