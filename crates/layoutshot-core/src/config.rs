//! Capture configuration: built-in defaults, JSON config file, environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_TARGET_URL: &str = "http://localhost:3002/train/1";
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1920;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 1080;
pub const DEFAULT_PRE_DELAY_MS: u64 = 3000;
pub const DEFAULT_OUTPUT_PATH: &str = "current-layout.png";
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 20_000;

/// Config file picked up from the working directory when none is named.
pub const DEFAULT_CONFIG_FILE: &str = "layoutshot.json";

pub const ENV_CONFIG: &str = "LAYOUTSHOT_CONFIG";
pub const ENV_URL: &str = "LAYOUTSHOT_URL";
pub const ENV_WIDTH: &str = "LAYOUTSHOT_WIDTH";
pub const ENV_HEIGHT: &str = "LAYOUTSHOT_HEIGHT";
pub const ENV_DELAY_MS: &str = "LAYOUTSHOT_DELAY_MS";
pub const ENV_OUTPUT: &str = "LAYOUTSHOT_OUTPUT";
pub const ENV_TIMEOUT_MS: &str = "LAYOUTSHOT_TIMEOUT_MS";
pub const ENV_CHROME: &str = "LAYOUTSHOT_CHROME";

/// Page viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT)
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How the capturer decides the page has settled after navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Sleep for the pre-capture delay and nothing else.
    FixedDelay,
    /// Poll until `selector` matches an element, then sleep for the pre-capture delay.
    Selector {
        selector: String,
        poll_interval: Duration,
    },
}

/// One screenshot operation. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub target_url: String,
    pub viewport: Viewport,
    pub pre_capture_delay: Duration,
    pub output_path: PathBuf,
    /// Capture the whole scrollable page rather than just the viewport.
    pub full_page: bool,
    pub navigation_timeout: Duration,
    pub readiness: Readiness,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.into(),
            viewport: Viewport::default(),
            pre_capture_delay: Duration::from_millis(DEFAULT_PRE_DELAY_MS),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            full_page: true,
            navigation_timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
            readiness: Readiness::FixedDelay,
        }
    }
}

impl CaptureRequest {
    /// Check the request invariants. The delay is unsigned so it is never negative.
    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::Config(format!(
                "viewport dimensions must be positive, got {}",
                self.viewport
            )));
        }

        let url = url::Url::parse(&self.target_url)
            .map_err(|e| Error::Config(format!("invalid target URL {:?}: {}", self.target_url, e)))?;
        if !matches!(url.scheme(), "http" | "https" | "file") {
            return Err(Error::Config(format!(
                "unsupported URL scheme {:?} in {}",
                url.scheme(),
                self.target_url
            )));
        }

        if self.output_path.as_os_str().is_empty() {
            return Err(Error::Config("output path is empty".into()));
        }
        if self.navigation_timeout.is_zero() {
            return Err(Error::Config("navigation timeout must be positive".into()));
        }
        if let Readiness::Selector {
            selector,
            poll_interval,
        } = &self.readiness
        {
            if selector.trim().is_empty() {
                return Err(Error::Config("readiness selector is empty".into()));
            }
            if poll_interval.is_zero() {
                return Err(Error::Config("poll interval must be positive".into()));
            }
        }
        Ok(())
    }
}

/// Browser launch parameters handed to the browser collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSettings {
    /// Explicit Chromium executable. Searched for on `PATH` when absent.
    pub chrome_path: Option<PathBuf>,
    pub no_sandbox: bool,
    pub launch_timeout: Duration,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            no_sandbox: false,
            launch_timeout: Duration::from_millis(DEFAULT_LAUNCH_TIMEOUT_MS),
        }
    }
}

/// Persisted capture configuration. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CaptureConfig {
    #[serde(default = "default_target_url")]
    pub target_url: String,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_pre_delay_ms")]
    pub pre_delay_ms: u64,
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    #[serde(default = "default_true")]
    pub full_page: bool,
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    /// CSS selector to wait for before the pre-capture delay starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<PathBuf>,
    #[serde(default)]
    pub no_sandbox: bool,
    #[serde(default = "default_launch_timeout_ms")]
    pub launch_timeout_ms: u64,
}

fn default_target_url() -> String {
    DEFAULT_TARGET_URL.into()
}
fn default_viewport_width() -> u32 {
    DEFAULT_VIEWPORT_WIDTH
}
fn default_viewport_height() -> u32 {
    DEFAULT_VIEWPORT_HEIGHT
}
fn default_pre_delay_ms() -> u64 {
    DEFAULT_PRE_DELAY_MS
}
fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}
fn default_true() -> bool {
    true
}
fn default_navigation_timeout_ms() -> u64 {
    DEFAULT_NAVIGATION_TIMEOUT_MS
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_launch_timeout_ms() -> u64 {
    DEFAULT_LAUNCH_TIMEOUT_MS
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            pre_delay_ms: DEFAULT_PRE_DELAY_MS,
            output_path: default_output_path(),
            full_page: true,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            wait_for: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            chrome_path: None,
            no_sandbox: false,
            launch_timeout_ms: DEFAULT_LAUNCH_TIMEOUT_MS,
        }
    }
}

impl CaptureConfig {
    /// Load config from a JSON file. Unlike discovery, the file must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: CaptureConfig = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Find the config file: explicit path, then `LAYOUTSHOT_CONFIG`, then
    /// `layoutshot.json` in `base_dir`. Falls back to defaults when none exists.
    pub fn discover<F>(explicit: Option<&Path>, base_dir: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = lookup(ENV_CONFIG).filter(|p| !p.is_empty()) {
            return Self::load(Path::new(&path));
        }
        let fallback = base_dir.join(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            return Self::load(&fallback);
        }
        Ok(Self::default())
    }

    /// Override fields from `LAYOUTSHOT_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL) {
            self.target_url = url;
        }
        if let Some(v) = lookup(ENV_WIDTH) {
            self.viewport_width = parse_env(ENV_WIDTH, &v)?;
        }
        if let Some(v) = lookup(ENV_HEIGHT) {
            self.viewport_height = parse_env(ENV_HEIGHT, &v)?;
        }
        if let Some(v) = lookup(ENV_DELAY_MS) {
            self.pre_delay_ms = parse_env(ENV_DELAY_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_OUTPUT) {
            self.output_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_TIMEOUT_MS) {
            self.navigation_timeout_ms = parse_env(ENV_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_CHROME).filter(|v| !v.is_empty()) {
            self.chrome_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Build and validate the capture request.
    pub fn to_request(&self) -> Result<CaptureRequest> {
        let readiness = match &self.wait_for {
            Some(selector) => Readiness::Selector {
                selector: selector.clone(),
                poll_interval: Duration::from_millis(self.poll_interval_ms),
            },
            None => Readiness::FixedDelay,
        };
        let request = CaptureRequest {
            target_url: self.target_url.clone(),
            viewport: Viewport::new(self.viewport_width, self.viewport_height),
            pre_capture_delay: Duration::from_millis(self.pre_delay_ms),
            output_path: self.output_path.clone(),
            full_page: self.full_page,
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            readiness,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn launch_settings(&self) -> LaunchSettings {
        LaunchSettings {
            chrome_path: self.chrome_path.clone(),
            no_sandbox: self.no_sandbox,
            launch_timeout: Duration::from_millis(self.launch_timeout_ms),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}={:?}: {}", key, value, e)))
}
