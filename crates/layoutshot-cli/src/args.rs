//! Command-line flags. Every flag is optional; unset flags leave the value
//! from the config file, environment, or built-in defaults in place.

use std::path::PathBuf;

use clap::Parser;

use layoutshot_core::CaptureConfig;

#[derive(Parser, Debug, Default)]
#[command(name = "layoutshot")]
#[command(about = "Capture a full-page screenshot of a running web app")]
#[command(version)]
pub struct Cli {
    /// Page to capture
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Viewport width in CSS pixels
    #[arg(long, value_name = "N")]
    pub width: Option<u32>,

    /// Viewport height in CSS pixels
    #[arg(long, value_name = "N")]
    pub height: Option<u32>,

    /// Milliseconds to wait after load before capturing
    #[arg(long = "delay-ms", value_name = "N")]
    pub delay_ms: Option<u64>,

    /// Where to write the PNG
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Capture only the viewport instead of the whole scrollable page
    #[arg(long = "viewport-only")]
    pub viewport_only: bool,

    /// Navigation timeout in milliseconds
    #[arg(long = "timeout-ms", value_name = "N")]
    pub timeout_ms: Option<u64>,

    /// Poll for this CSS selector before the delay starts
    #[arg(long = "wait-for", value_name = "SELECTOR")]
    pub wait_for: Option<String>,

    /// Chromium executable to launch
    #[arg(long, value_name = "PATH")]
    pub chrome: Option<PathBuf>,

    /// Pass --no-sandbox to Chromium (containers running as root)
    #[arg(long = "no-sandbox")]
    pub no_sandbox: bool,

    /// JSON config file (defaults to $LAYOUTSHOT_CONFIG or ./layoutshot.json)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply_to(&self, config: &mut CaptureConfig) {
        if let Some(url) = &self.url {
            config.target_url = url.clone();
        }
        if let Some(width) = self.width {
            config.viewport_width = width;
        }
        if let Some(height) = self.height {
            config.viewport_height = height;
        }
        if let Some(delay) = self.delay_ms {
            config.pre_delay_ms = delay;
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if self.viewport_only {
            config.full_page = false;
        }
        if let Some(timeout) = self.timeout_ms {
            config.navigation_timeout_ms = timeout;
        }
        if let Some(selector) = &self.wait_for {
            config.wait_for = Some(selector.clone());
        }
        if let Some(chrome) = &self.chrome {
            config.chrome_path = Some(chrome.clone());
        }
        if self.no_sandbox {
            config.no_sandbox = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use layoutshot_core::config::{DEFAULT_OUTPUT_PATH, DEFAULT_TARGET_URL};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("layoutshot").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_command_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_flags_keeps_defaults() {
        let mut config = CaptureConfig::default();
        parse(&[]).apply_to(&mut config);

        assert_eq!(config.target_url, DEFAULT_TARGET_URL);
        assert_eq!(config.viewport_width, 1920);
        assert_eq!(config.viewport_height, 1080);
        assert_eq!(config.pre_delay_ms, 3000);
        assert_eq!(config.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
        assert!(config.full_page);
        assert!(!config.no_sandbox);
    }

    #[test]
    fn test_flags_override() {
        let mut config = CaptureConfig::default();
        parse(&[
            "--url",
            "http://127.0.0.1:8080/board",
            "--width",
            "1280",
            "--height",
            "720",
            "--delay-ms",
            "0",
            "-o",
            "shots/board.png",
            "--viewport-only",
            "--timeout-ms",
            "5000",
            "--wait-for",
            "#board",
            "--chrome",
            "/opt/chromium/chrome",
            "--no-sandbox",
        ])
        .apply_to(&mut config);

        assert_eq!(config.target_url, "http://127.0.0.1:8080/board");
        assert_eq!((config.viewport_width, config.viewport_height), (1280, 720));
        assert_eq!(config.pre_delay_ms, 0);
        assert_eq!(config.output_path, PathBuf::from("shots/board.png"));
        assert!(!config.full_page);
        assert_eq!(config.navigation_timeout_ms, 5000);
        assert_eq!(config.wait_for.as_deref(), Some("#board"));
        assert_eq!(config.chrome_path, Some(PathBuf::from("/opt/chromium/chrome")));
        assert!(config.no_sandbox);
    }

    #[test]
    fn test_absent_flags_keep_file_values() {
        let mut config = CaptureConfig {
            viewport_width: 800,
            wait_for: Some("main".into()),
            ..CaptureConfig::default()
        };
        parse(&["--height", "600"]).apply_to(&mut config);

        assert_eq!(config.viewport_width, 800);
        assert_eq!(config.viewport_height, 600);
        assert_eq!(config.wait_for.as_deref(), Some("main"));
    }

    #[test]
    fn test_rejects_malformed_numbers() {
        let err = Cli::try_parse_from(["layoutshot", "--width", "wide"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
