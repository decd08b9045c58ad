//! Capturer: runs one screenshot from launch to shutdown.
//!
//! Steps run strictly in order: launch, open page, viewport, navigate,
//! settle, capture, persist. Once launch succeeds the browser is closed on
//! every exit path before [`Capturer::capture`] returns.
//!
//! The default settle step is a fixed timer with no readiness signal, so a
//! page that renders slower than the pre-capture delay is captured
//! half-drawn. [`Readiness::Selector`] narrows that window.

use std::time::Instant;

use tracing::{debug, info, warn, Instrument};

use layoutshot_browser::{BrowserHandle, BrowserLauncher, PageHandle};
use layoutshot_core::{CaptureRequest, Error, Readiness, Result};

use crate::output;
use crate::types::{CaptureReport, Step};

/// Screenshot capturer over any [`BrowserLauncher`].
pub struct Capturer<L> {
    launcher: L,
}

impl<L: BrowserLauncher> Capturer<L> {
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    /// Capture `request.target_url` to `request.output_path`.
    pub async fn capture(&self, request: &CaptureRequest) -> Result<CaptureReport> {
        request.validate()?;
        let span = tracing::info_span!("capture", url = %request.target_url);
        self.capture_validated(request).instrument(span).await
    }

    async fn capture_validated(&self, request: &CaptureRequest) -> Result<CaptureReport> {
        let started = Instant::now();

        info!(step = %Step::Launch, "Launching browser");
        let mut browser = self
            .launcher
            .launch()
            .await
            .map_err(reclassify(Step::Launch))?;
        debug!(pid = ?browser.pid(), "Browser ready");

        let outcome = run_page(browser.as_mut(), request).await;

        info!(step = %Step::Close, "Closing browser");
        if let Err(e) = browser.close().await {
            // The process guard still kills Chromium when the handle drops.
            warn!("Browser shutdown reported an error: {}", e);
        }
        drop(browser);

        let (width, height, bytes_written) = outcome?;
        let report = CaptureReport {
            output_path: request.output_path.clone(),
            target_url: request.target_url.clone(),
            width,
            height,
            bytes_written,
            elapsed_ms: started.elapsed().as_millis() as u64,
            captured_at: chrono::Utc::now().to_rfc3339(),
        };
        info!(
            "Captured {} at {}x{} in {}ms",
            report.output_path.display(),
            width,
            height,
            report.elapsed_ms
        );
        Ok(report)
    }
}

/// Everything between launch and close. Returns `(width, height, bytes)`.
async fn run_page(
    browser: &mut dyn BrowserHandle,
    request: &CaptureRequest,
) -> Result<(u32, u32, u64)> {
    info!(step = %Step::OpenPage, "Opening page");
    let mut page = browser
        .new_page()
        .await
        .map_err(reclassify(Step::OpenPage))?;

    info!(step = %Step::Viewport, viewport = %request.viewport, "Setting viewport");
    page.set_viewport(request.viewport)
        .await
        .map_err(reclassify(Step::Viewport))?;

    info!(step = %Step::Navigate, "Navigating to {}", request.target_url);
    page.navigate(&request.target_url, request.navigation_timeout)
        .await
        .map_err(reclassify(Step::Navigate))?;

    settle(page.as_mut(), request)
        .await
        .map_err(reclassify(Step::Settle))?;

    info!(step = %Step::Capture, full_page = request.full_page, "Capturing");
    let bytes = page
        .capture_png(request.viewport, request.full_page)
        .await
        .map_err(reclassify(Step::Capture))?;
    let (width, height) = output::png_dimensions(&bytes)?;

    info!(step = %Step::Persist, "Writing {}", request.output_path.display());
    output::write_atomically(&request.output_path, &bytes)?;

    Ok((width, height, bytes.len() as u64))
}

async fn settle(page: &mut dyn PageHandle, request: &CaptureRequest) -> Result<()> {
    if let Readiness::Selector {
        selector,
        poll_interval,
    } = &request.readiness
    {
        info!(step = %Step::Settle, "Waiting for {}", selector);
        let deadline = tokio::time::Instant::now() + request.navigation_timeout;
        loop {
            if page.has_selector(selector).await? {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Navigation(format!(
                    "selector {:?} did not appear within {:?}",
                    selector, request.navigation_timeout
                )));
            }
            tokio::time::sleep(*poll_interval).await;
        }
    }

    if !request.pre_capture_delay.is_zero() {
        info!(step = %Step::Settle, "Waiting {:?} before capture", request.pre_capture_delay);
        tokio::time::sleep(request.pre_capture_delay).await;
    }
    Ok(())
}

/// Attribute step-agnostic faults to the step that raised them.
fn reclassify(step: Step) -> impl Fn(Error) -> Error {
    move |e| match e {
        Error::Protocol(msg) => match step {
            Step::Launch | Step::OpenPage => Error::Launch(msg),
            Step::Navigate | Step::Settle => Error::Navigation(msg),
            _ => Error::Capture(msg),
        },
        other => other,
    }
}
