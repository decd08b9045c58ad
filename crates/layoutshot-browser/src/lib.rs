//! Browser collaborator: Chromium lifecycle and the DevTools protocol.
//!
//! Launches a headless Chromium with a throwaway profile, speaks CDP to it
//! over a WebSocket, and exposes the handful of page operations a
//! screenshot needs behind the [`BrowserLauncher`] seam.

pub mod cdp;
pub mod config;
pub mod driver;
pub mod manager;
pub mod process;
pub mod types;

#[cfg(test)]
mod mock;

pub use cdp::{CdpClient, CdpError, CdpEvent};
pub use config::ChromeConfig;
pub use driver::{BrowserHandle, BrowserLauncher, PageHandle};
pub use manager::{ChromeBrowser, ChromeLauncher, ChromePage};
pub use process::BrowserProcess;
