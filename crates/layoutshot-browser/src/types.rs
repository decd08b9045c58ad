//! DevTools protocol payloads: only the fields the capturer reads or sends.

use serde::{Deserialize, Serialize};

/// `Target.createTarget` result.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTargetResult {
    #[serde(rename = "targetId")]
    pub target_id: String,
}

/// `Target.attachToTarget` result.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachToTargetResult {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// `Page.navigate` result. `errorText` is set when the load itself failed,
/// e.g. `net::ERR_CONNECTION_REFUSED`.
#[derive(Debug, Clone, Deserialize)]
pub struct NavigateResult {
    #[serde(rename = "frameId")]
    pub frame_id: String,
    #[serde(rename = "errorText", default)]
    pub error_text: Option<String>,
}

/// Content size reported by `Page.getLayoutMetrics`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ContentSize {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// `Page.getLayoutMetrics` result. Older Chromium only reports `contentSize`.
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutMetrics {
    #[serde(rename = "cssContentSize", default)]
    pub css_content_size: Option<ContentSize>,
    #[serde(rename = "contentSize", default)]
    pub content_size: Option<ContentSize>,
}

impl LayoutMetrics {
    pub fn content(&self) -> Option<ContentSize> {
        self.css_content_size.or(self.content_size)
    }
}

/// Clip rectangle for `Page.captureScreenshot`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

/// `Page.captureScreenshot` parameters.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureScreenshotParams {
    pub format: &'static str,
    #[serde(rename = "captureBeyondViewport")]
    pub capture_beyond_viewport: bool,
    #[serde(rename = "fromSurface")]
    pub from_surface: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<ClipRect>,
}

/// `Page.captureScreenshot` result. `data` is base64-encoded image bytes.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureScreenshotResult {
    pub data: String,
}

/// `Emulation.setDeviceMetricsOverride` parameters.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceMetrics {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "deviceScaleFactor")]
    pub device_scale_factor: f64,
    pub mobile: bool,
}

/// Remote object inside a `Runtime.evaluate` result.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteObject {
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// `Runtime.evaluate` result.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateResult {
    pub result: RemoteObject,
    #[serde(rename = "exceptionDetails", default)]
    pub exception_details: Option<serde_json::Value>,
}
