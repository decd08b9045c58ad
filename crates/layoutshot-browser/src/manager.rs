//! Chromium-backed implementation of the browser seam.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use tracing::{debug, info};

use layoutshot_core::{Error, LaunchSettings, Result, Viewport};

use crate::cdp::{CdpClient, CdpError};
use crate::config::ChromeConfig;
use crate::driver::{BrowserHandle, BrowserLauncher, PageHandle};
use crate::process::BrowserProcess;
use crate::types::*;

/// Launches a fresh headless Chromium per capture.
pub struct ChromeLauncher {
    config: ChromeConfig,
}

impl ChromeLauncher {
    pub fn new(config: ChromeConfig) -> Self {
        Self { config }
    }

    /// Resolve the executable and build a launcher from core settings.
    pub fn from_settings(settings: &LaunchSettings) -> Result<Self> {
        Ok(Self::new(ChromeConfig::from_settings(settings)?))
    }

    /// Spawn Chromium and connect to its DevTools endpoint.
    pub async fn launch_chrome(&self) -> Result<ChromeBrowser> {
        info!("Launching {}", self.config.executable.display());
        let (mut process, ws_url) = BrowserProcess::spawn(&self.config).await?;
        debug!("DevTools endpoint: {}", ws_url);

        let client = match CdpClient::connect(&ws_url, self.config.command_timeout).await {
            Ok(client) => client,
            Err(e) => {
                let _ = process.shutdown(Duration::ZERO).await;
                return Err(Error::Launch(format!(
                    "cannot connect to DevTools at {}: {}",
                    ws_url, e
                )));
            }
        };

        Ok(ChromeBrowser {
            process,
            client: Arc::new(client),
            shutdown_grace: self.config.shutdown_grace,
            closed: false,
        })
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserHandle>> {
        Ok(Box::new(self.launch_chrome().await?))
    }
}

/// A running Chromium with an open DevTools connection.
pub struct ChromeBrowser {
    process: BrowserProcess,
    client: Arc<CdpClient>,
    shutdown_grace: Duration,
    closed: bool,
}

impl ChromeBrowser {
    /// Open a page and return the concrete type.
    pub async fn open_page(&self) -> Result<ChromePage> {
        let target: CreateTargetResult = self
            .client
            .call_as("Target.createTarget", json!({ "url": "about:blank" }), None)
            .await
            .map_err(|e| Error::Launch(format!("cannot open page: {}", e)))?;

        let attached: AttachToTargetResult = self
            .client
            .call_as(
                "Target.attachToTarget",
                json!({ "targetId": target.target_id, "flatten": true }),
                None,
            )
            .await
            .map_err(|e| Error::Launch(format!("cannot attach to page: {}", e)))?;

        let page = ChromePage::attach(self.client.clone(), attached.session_id, target.target_id);
        page.enable().await?;
        debug!("Opened page {}", page.target_id);
        Ok(page)
    }
}

#[async_trait]
impl BrowserHandle for ChromeBrowser {
    fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    async fn new_page(&mut self) -> Result<Box<dyn PageHandle>> {
        Ok(Box::new(self.open_page().await?))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Chromium often drops the socket before answering Browser.close.
        match tokio::time::timeout(
            self.shutdown_grace,
            self.client.call("Browser.close", json!({}), None),
        )
        .await
        {
            Ok(Ok(_)) | Ok(Err(CdpError::Disconnected)) => {}
            Ok(Err(e)) => debug!("Browser.close: {}", e),
            Err(_) => debug!("Browser.close unanswered after {:?}", self.shutdown_grace),
        }

        self.process.shutdown(self.shutdown_grace).await?;
        info!("Chromium shut down");
        Ok(())
    }
}

/// One attached page (flattened CDP session).
pub struct ChromePage {
    client: Arc<CdpClient>,
    session_id: String,
    target_id: String,
}

impl ChromePage {
    pub(crate) fn attach(client: Arc<CdpClient>, session_id: String, target_id: String) -> Self {
        Self {
            client,
            session_id,
            target_id,
        }
    }

    async fn enable(&self) -> Result<()> {
        self.client
            .call("Page.enable", json!({}), Some(self.session_id.as_str()))
            .await
            .map_err(|e| Error::Launch(format!("Page.enable: {}", e)))?;
        Ok(())
    }

    /// Full-page clip: document size, never smaller than the viewport.
    async fn full_page_clip(&self, viewport: Viewport) -> Result<ClipRect> {
        let metrics: LayoutMetrics = self
            .client
            .call_as("Page.getLayoutMetrics", json!({}), Some(self.session_id.as_str()))
            .await
            .map_err(|e| Error::Capture(e.to_string()))?;

        let (width, height) = metrics
            .content()
            .map(|c| (c.width.ceil(), c.height.ceil()))
            .unwrap_or((0.0, 0.0));

        Ok(ClipRect {
            x: 0.0,
            y: 0.0,
            width: width.max(f64::from(viewport.width)),
            height: height.max(f64::from(viewport.height)),
            scale: 1.0,
        })
    }
}

#[async_trait]
impl PageHandle for ChromePage {
    async fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        let metrics = DeviceMetrics {
            width: viewport.width,
            height: viewport.height,
            device_scale_factor: 1.0,
            mobile: false,
        };
        let params =
            serde_json::to_value(&metrics).map_err(|e| Error::Capture(e.to_string()))?;
        self.client
            .call(
                "Emulation.setDeviceMetricsOverride",
                params,
                Some(self.session_id.as_str()),
            )
            .await
            .map_err(|e| Error::Capture(format!("cannot set viewport {}: {}", viewport, e)))?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        // Subscribe first so a fast load event is not missed.
        let mut events = self.client.subscribe();
        let started = Instant::now();

        // Page.navigate answers only once the response commits, so it gets
        // the navigation timeout rather than the client's command timeout.
        let navigation = self
            .client
            .call_with_timeout(
                "Page.navigate",
                json!({ "url": url }),
                Some(self.session_id.as_str()),
                timeout,
            )
            .await
            .map_err(|e| match e {
                CdpError::Timeout { .. } => {
                    Error::Navigation(format!("{} did not respond within {:?}", url, timeout))
                }
                other => Error::Navigation(format!("{}: {}", url, other)),
            })?;
        let navigation: NavigateResult = serde_json::from_value(navigation)
            .map_err(|e| Error::Navigation(format!("{}: bad Page.navigate reply: {}", url, e)))?;

        if let Some(error_text) = navigation.error_text.filter(|t| !t.is_empty()) {
            return Err(Error::Navigation(format!("{}: {}", url, error_text)));
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        CdpClient::wait_for_event(
            &mut events,
            "Page.loadEventFired",
            Some(self.session_id.as_str()),
            remaining,
        )
        .await
        .map_err(|e| match e {
            CdpError::Timeout { .. } => Error::Navigation(format!(
                "{} did not finish loading within {:?}",
                url, timeout
            )),
            other => Error::Navigation(format!("{}: {}", url, other)),
        })?;

        debug!(frame = %navigation.frame_id, "Loaded {}", url);
        Ok(())
    }

    async fn has_selector(&mut self, selector: &str) -> Result<bool> {
        let literal =
            serde_json::to_string(selector).map_err(|e| Error::Navigation(e.to_string()))?;
        let evaluated: EvaluateResult = self
            .client
            .call_as(
                "Runtime.evaluate",
                json!({
                    "expression": format!("document.querySelector({}) !== null", literal),
                    "returnByValue": true,
                }),
                Some(self.session_id.as_str()),
            )
            .await
            .map_err(|e| Error::Navigation(format!("selector check failed: {}", e)))?;

        if evaluated.exception_details.is_some() {
            return Err(Error::Navigation(format!("invalid selector {:?}", selector)));
        }
        Ok(evaluated
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn capture_png(&mut self, viewport: Viewport, full_page: bool) -> Result<Vec<u8>> {
        let clip = if full_page {
            Some(self.full_page_clip(viewport).await?)
        } else {
            None
        };
        let params = CaptureScreenshotParams {
            format: "png",
            capture_beyond_viewport: full_page,
            from_surface: true,
            clip,
        };
        let params = serde_json::to_value(&params).map_err(|e| Error::Capture(e.to_string()))?;

        let shot: CaptureScreenshotResult = self
            .client
            .call_as("Page.captureScreenshot", params, Some(self.session_id.as_str()))
            .await
            .map_err(|e| Error::Capture(e.to_string()))?;

        BASE64
            .decode(shot.data.as_bytes())
            .map_err(|e| Error::Capture(format!("screenshot payload is not base64: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ok, spawn_devtools, Reply};
    use serde_json::Value;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn page_on<F>(handler: F) -> ChromePage
    where
        F: Fn(&Value) -> Reply + Send + Sync + 'static,
    {
        let url = spawn_devtools(handler).await;
        let client = CdpClient::connect(&url, TIMEOUT).await.unwrap();
        ChromePage::attach(Arc::new(client), "S1".into(), "T1".into())
    }

    fn loaded(req: &Value) -> Reply {
        Reply::Messages(vec![
            ok(req, json!({ "frameId": "F1", "loaderId": "L1" })),
            json!({ "method": "Page.loadEventFired", "params": { "timestamp": 1.0 }, "sessionId": "S1" }),
        ])
    }

    #[tokio::test]
    async fn test_navigate_waits_for_load() {
        let mut page = page_on(loaded).await;
        page.navigate("http://localhost:3002/train/1", TIMEOUT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_navigate_connection_refused() {
        let mut page = page_on(|req| {
            Reply::Messages(vec![ok(
                req,
                json!({ "frameId": "F1", "errorText": "net::ERR_CONNECTION_REFUSED" }),
            )])
        })
        .await;

        let err = page
            .navigate("http://localhost:3002/train/1", TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Navigation(_)));
        assert!(err.to_string().contains("ERR_CONNECTION_REFUSED"));
    }

    #[tokio::test]
    async fn test_navigate_load_timeout() {
        let mut page = page_on(|req| Reply::Messages(vec![ok(req, json!({ "frameId": "F1" }))])).await;

        let err = page
            .navigate("http://localhost:3002/slow", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Navigation(_)));
        assert!(err.to_string().contains("did not finish loading"));
    }

    #[tokio::test]
    async fn test_navigate_outlasts_command_timeout() {
        // Client default is far shorter than the navigation timeout; the
        // endpoint never answers Page.navigate.
        let url = spawn_devtools(|_| Reply::Messages(vec![])).await;
        let client = CdpClient::connect(&url, Duration::from_millis(100)).await.unwrap();
        let mut page = ChromePage::attach(Arc::new(client), "S1".into(), "T1".into());

        let started = Instant::now();
        let err = page
            .navigate("http://localhost:3002/train/1", Duration::from_millis(800))
            .await
            .unwrap_err();

        assert!(started.elapsed() >= Duration::from_millis(750));
        assert!(matches!(err, Error::Navigation(_)));
        assert!(err.to_string().contains("did not respond within 800ms"));
    }

    #[tokio::test]
    async fn test_full_page_capture_clip() {
        let png = vec![0x89, b'P', b'N', b'G'];
        let encoded = BASE64.encode(&png);
        let mut page = page_on(move |req| match req["method"].as_str() {
            Some("Page.getLayoutMetrics") => Reply::Messages(vec![ok(
                req,
                json!({ "cssContentSize": { "x": 0.0, "y": 0.0, "width": 1200.4, "height": 3000.2 } }),
            )]),
            Some("Page.captureScreenshot") => {
                let clip = &req["params"]["clip"];
                // Width grows to the viewport, height follows the document.
                assert_eq!(clip["width"], 1920.0);
                assert_eq!(clip["height"], 3001.0);
                assert_eq!(req["params"]["captureBeyondViewport"], true);
                Reply::Messages(vec![ok(req, json!({ "data": encoded }))])
            }
            _ => Reply::Messages(vec![ok(req, json!({}))]),
        })
        .await;

        let bytes = page
            .capture_png(Viewport::new(1920, 1080), true)
            .await
            .unwrap();
        assert_eq!(bytes, png);
    }

    #[tokio::test]
    async fn test_viewport_capture_has_no_clip() {
        let mut page = page_on(|req| {
            assert_ne!(req["method"], "Page.getLayoutMetrics");
            assert!(req["params"].get("clip").is_none());
            Reply::Messages(vec![ok(req, json!({ "data": "iVBORw==" }))])
        })
        .await;

        let bytes = page
            .capture_png(Viewport::new(800, 600), false)
            .await
            .unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[tokio::test]
    async fn test_has_selector() {
        let mut page = page_on(|req| {
            let expression = req["params"]["expression"].as_str().unwrap_or_default();
            let found = expression.contains("#board");
            Reply::Messages(vec![ok(
                req,
                json!({ "result": { "type": "boolean", "value": found } }),
            )])
        })
        .await;

        assert!(page.has_selector("#board").await.unwrap());
        assert!(!page.has_selector(".missing").await.unwrap());
    }
}
