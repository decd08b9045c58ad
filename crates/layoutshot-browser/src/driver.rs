//! Browser-automation seam between the capturer and a concrete browser.

use std::time::Duration;

use async_trait::async_trait;
use layoutshot_core::{Result, Viewport};

/// Starts a browser for one capture run.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserHandle>>;
}

/// A running browser owned by a single capture run.
#[async_trait]
pub trait BrowserHandle: Send {
    /// OS process id, when the browser is a local process.
    fn pid(&self) -> Option<u32>;

    /// Open a blank page. Failures are [`Error::Launch`](layoutshot_core::Error::Launch).
    async fn new_page(&mut self) -> Result<Box<dyn PageHandle>>;

    /// Shut the browser down. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// One page inside a [`BrowserHandle`].
#[async_trait]
pub trait PageHandle: Send {
    async fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    /// Navigate and wait for the load event. Failures are
    /// [`Error::Navigation`](layoutshot_core::Error::Navigation).
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Whether `selector` currently matches an element.
    async fn has_selector(&mut self, selector: &str) -> Result<bool>;

    /// Capture PNG bytes. With `full_page` the image covers the whole
    /// document and is never smaller than `viewport`.
    async fn capture_png(&mut self, viewport: Viewport, full_page: bool) -> Result<Vec<u8>>;
}
