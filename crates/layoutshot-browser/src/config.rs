//! Chromium launch configuration: executable discovery and command line.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use layoutshot_core::{Error, LaunchSettings, Result};

/// Executable names searched for on `PATH`, in order.
const CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Absolute install locations checked after `PATH`.
const WELL_KNOWN_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/usr/bin/chromium",
    "/snap/bin/chromium",
];

/// Fallback env var shared with other Chromium tooling.
const ENV_CHROME_FALLBACK: &str = "CHROME";

/// Resolved launch configuration for one Chromium process.
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    pub executable: PathBuf,
    pub headless: bool,
    pub no_sandbox: bool,
    /// Time allowed for Chromium to print its DevTools endpoint.
    pub launch_timeout: Duration,
    /// Per-command CDP response timeout.
    pub command_timeout: Duration,
    /// Time allowed for a graceful exit before the process is killed.
    pub shutdown_grace: Duration,
    pub extra_args: Vec<String>,
}

impl ChromeConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            headless: true,
            no_sandbox: false,
            launch_timeout: Duration::from_secs(20),
            command_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            extra_args: Vec::new(),
        }
    }

    /// Resolve the executable from settings, `CHROME`, `PATH` and well-known locations.
    pub fn from_settings(settings: &LaunchSettings) -> Result<Self> {
        if let Some(explicit) = settings.chrome_path.as_deref() {
            if !explicit.is_file() {
                return Err(Error::Launch(format!(
                    "Chromium executable {} does not exist",
                    explicit.display()
                )));
            }
        }

        let path_var = std::env::var_os("PATH").unwrap_or_default();
        let executable = resolve_executable(
            settings.chrome_path.as_deref(),
            |k| std::env::var(k).ok(),
            &path_var,
        )
        .ok_or_else(|| {
            Error::Launch(format!(
                "no Chromium executable found (tried {}); set LAYOUTSHOT_CHROME or --chrome",
                CANDIDATES.join(", ")
            ))
        })?;

        Ok(Self {
            no_sandbox: settings.no_sandbox,
            launch_timeout: settings.launch_timeout,
            ..Self::new(executable)
        })
    }

    /// Command-line arguments for a launch using `user_data_dir` as the profile.
    pub fn args(&self, user_data_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--remote-debugging-port=0".to_string(),
            format!("--user-data-dir={}", user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-gpu".to_string(),
            "--disable-extensions".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--hide-scrollbars".to_string(),
            "--mute-audio".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        if self.no_sandbox {
            args.push("--no-sandbox".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push("about:blank".to_string());
        args
    }
}

/// Pick the Chromium executable. An explicit path wins and must exist.
pub fn resolve_executable<F>(explicit: Option<&Path>, lookup: F, path_var: &OsStr) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return path.is_file().then(|| path.to_path_buf());
    }

    if let Some(path) = lookup(ENV_CHROME_FALLBACK).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
    }

    for dir in std::env::split_paths(path_var) {
        for name in CANDIDATES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    WELL_KNOWN_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("my-chrome");
        std::fs::write(&exe, b"").unwrap();

        let found = resolve_executable(Some(&exe), |_| None, OsStr::new(""));
        assert_eq!(found, Some(exe));

        let missing = dir.path().join("nope");
        assert_eq!(
            resolve_executable(Some(&missing), |_| None, OsStr::new("")),
            None
        );
    }

    #[test]
    fn test_missing_explicit_path_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-chrome");
        let settings = LaunchSettings {
            chrome_path: Some(missing.clone()),
            ..LaunchSettings::default()
        };

        let err = ChromeConfig::from_settings(&settings).unwrap_err();
        assert!(matches!(err, Error::Launch(_)));
        let message = err.to_string();
        assert!(message.contains(&missing.display().to_string()));
        assert!(!message.contains("chromium-browser"));
    }

    #[test]
    fn test_explicit_path_settings() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("my-chrome");
        std::fs::write(&exe, b"").unwrap();
        let settings = LaunchSettings {
            chrome_path: Some(exe.clone()),
            no_sandbox: true,
            launch_timeout: Duration::from_secs(7),
        };

        let config = ChromeConfig::from_settings(&settings).unwrap();
        assert_eq!(config.executable, exe);
        assert!(config.no_sandbox);
        assert_eq!(config.launch_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_path_search_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("chromium"), b"").unwrap();
        std::fs::write(first.path().join("google-chrome"), b"").unwrap();

        let path_var: OsString =
            std::env::join_paths([first.path(), second.path()]).unwrap();
        let found = resolve_executable(None, |_| None, &path_var).unwrap();
        assert_eq!(found, first.path().join("google-chrome"));
    }

    #[test]
    fn test_chrome_env_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("chrome-from-env");
        std::fs::write(&exe, b"").unwrap();
        let exe_str = exe.to_string_lossy().to_string();

        let found = resolve_executable(
            None,
            |k| (k == "CHROME").then(|| exe_str.clone()),
            OsStr::new(""),
        );
        assert_eq!(found, Some(exe));
    }

    #[test]
    fn test_args() {
        let mut config = ChromeConfig::new("/usr/bin/chromium");
        config.no_sandbox = true;
        let args = config.args(Path::new("/tmp/profile"));

        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));

        config.headless = false;
        config.no_sandbox = false;
        let args = config.args(Path::new("/tmp/profile"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(!args.contains(&"--no-sandbox".to_string()));
    }
}
