//! Runtime types.

use std::path::PathBuf;

use serde::Serialize;

/// Capture steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Start the browser process.
    Launch,
    /// Open and attach to one page.
    #[serde(rename = "open-page")]
    OpenPage,
    /// Apply the viewport size.
    Viewport,
    /// Load the target URL.
    Navigate,
    /// Wait for readiness and the pre-capture delay.
    Settle,
    /// Grab the PNG from the browser.
    Capture,
    /// Write the PNG to the output path.
    Persist,
    /// Shut the browser down. Runs on every path once launch succeeded.
    Close,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Launch => "launch",
            Self::OpenPage => "open-page",
            Self::Viewport => "viewport",
            Self::Navigate => "navigate",
            Self::Settle => "settle",
            Self::Capture => "capture",
            Self::Persist => "persist",
            Self::Close => "close",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of a successful capture.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    #[serde(rename = "outputPath")]
    pub output_path: PathBuf,
    #[serde(rename = "targetUrl")]
    pub target_url: String,
    /// Image width in pixels, decoded from the PNG.
    pub width: u32,
    /// Image height in pixels; exceeds the viewport for long full-page captures.
    pub height: u32,
    #[serde(rename = "bytesWritten")]
    pub bytes_written: u64,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    #[serde(rename = "capturedAt")]
    pub captured_at: String,
}
